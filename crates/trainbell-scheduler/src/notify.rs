//! Notification envelopes — what goes to the push channel.
//! Platform hints are attached here so dispatch stays a thin transport.

use trainbell_core::NotificationEvent;
use trainbell_core::config::MessagesConfig;

/// Which transition a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A training slot exists two days out.
    Lookahead,
    /// Tomorrow's slots were demoted for lack of participants.
    Shortfall,
    /// A demoted slot has enough participants again.
    Recovery,
}

impl NotificationKind {
    pub fn body<'a>(&self, messages: &'a MessagesConfig) -> &'a str {
        match self {
            NotificationKind::Lookahead => &messages.lookahead,
            NotificationKind::Shortfall => &messages.shortfall,
            NotificationKind::Recovery => &messages.recovery,
        }
    }
}

/// Android `priority` for messages that must wake the device.
pub const ANDROID_PRIORITY_HIGH: &str = "high";

/// A notification plus the delivery hints every platform gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub event: NotificationEvent,
    pub android_priority: &'static str,
    /// Value of the `apns-priority` header ("10" = immediate).
    pub apns_priority: u8,
}

impl MessageEnvelope {
    /// Topic broadcast with immediate delivery on both platforms.
    pub fn broadcast(event: NotificationEvent) -> Self {
        Self {
            event,
            android_priority: ANDROID_PRIORITY_HIGH,
            apns_priority: 10,
        }
    }

    /// Body of an FCM HTTP v1 `messages:send` request.
    pub fn to_fcm_request(&self) -> serde_json::Value {
        serde_json::json!({
            "message": {
                "topic": self.event.topic,
                "notification": {
                    "title": self.event.title,
                    "body": self.event.body,
                },
                "android": {
                    "priority": self.android_priority,
                },
                "apns": {
                    "headers": {
                        "apns-priority": self.apns_priority.to_string(),
                    },
                },
            }
        })
    }

    /// Flat JSON for generic webhooks.
    pub fn to_webhook_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.event.title,
            "body": self.event.body,
            "topic": self.event.topic,
            "android_priority": self.android_priority,
            "apns_priority": self.apns_priority,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fcm_request_shape() {
        let env = MessageEnvelope::broadcast(NotificationEvent::new("訓練通知", "已恢復訓練", "trainingNotice"));
        let req = env.to_fcm_request();
        assert_eq!(req["message"]["topic"], "trainingNotice");
        assert_eq!(req["message"]["notification"]["title"], "訓練通知");
        assert_eq!(req["message"]["notification"]["body"], "已恢復訓練");
        assert_eq!(req["message"]["android"]["priority"], "high");
        assert_eq!(req["message"]["apns"]["headers"]["apns-priority"], "10");
    }

    #[test]
    fn test_kind_bodies() {
        let messages = MessagesConfig::default();
        assert_eq!(NotificationKind::Lookahead.body(&messages), "後天有訓練記得登記");
        assert_eq!(NotificationKind::Shortfall.body(&messages), "明天人數不足改自主訓練");
        assert_eq!(NotificationKind::Recovery.body(&messages), "已恢復訓練");
    }

    #[test]
    fn test_webhook_payload() {
        let env = MessageEnvelope::broadcast(NotificationEvent::new("t", "b", "topic"));
        let payload = env.to_webhook_payload();
        assert_eq!(payload["topic"], "topic");
        assert_eq!(payload["apns_priority"], 10);
        assert!(payload["timestamp"].is_string());
    }
}
