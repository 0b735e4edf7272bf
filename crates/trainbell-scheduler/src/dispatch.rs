//! Notification dispatch — actually sends envelopes to the configured channel.
//! Supports: FCM HTTP v1 topic messages, generic HTTP webhook, log-only.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use trainbell_core::config::NotifyConfig;
use trainbell_core::{NotificationEvent, Notifier, Result, TrainbellError};

use crate::fcm_auth::{FcmAuth, ServiceAccountKey};
use crate::notify::MessageEnvelope;

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/v1/projects";
const SEND_TIMEOUT_SECS: u64 = 10;

/// Where notifications go.
#[derive(Debug, Clone)]
pub enum NotifyTarget {
    /// Firebase Cloud Messaging, topic broadcast.
    Fcm {
        project_id: String,
        auth: Arc<FcmAuth>,
    },
    /// Generic HTTP webhook — POST with JSON body.
    Webhook {
        url: String,
        headers: Vec<(String, String)>,
    },
    /// Write to the log only.
    Log,
}

impl NotifyTarget {
    /// Build the target named by `config.target`.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        match config.target.as_str() {
            "fcm" => Self::fcm_from_config(config),
            "webhook" => {
                if config.webhook_url.is_empty() {
                    return Err(TrainbellError::Config(
                        "notify.target = \"webhook\" needs webhook_url".into(),
                    ));
                }
                Ok(NotifyTarget::Webhook {
                    url: config.webhook_url.clone(),
                    headers: config.webhook_headers.clone(),
                })
            }
            "log" => Ok(NotifyTarget::Log),
            other => Err(TrainbellError::Config(format!(
                "unknown notify.target '{other}' (expected fcm, webhook or log)"
            ))),
        }
    }

    /// Credentials in order: `fcm_service_account`, `fcm_access_token`,
    /// then the GOOGLE_APPLICATION_CREDENTIALS and TRAINBELL_FCM_TOKEN env vars.
    fn fcm_from_config(config: &NotifyConfig) -> Result<Self> {
        let env = |name: &str| std::env::var(name).unwrap_or_default();
        let key_path = if config.fcm_service_account.is_empty() && config.fcm_access_token.is_empty() {
            env("GOOGLE_APPLICATION_CREDENTIALS")
        } else {
            config.fcm_service_account.clone()
        };

        let (auth, key_project) = if !key_path.is_empty() {
            let path = PathBuf::from(shellexpand::tilde(&key_path).to_string());
            let key = ServiceAccountKey::load(&path)?;
            let project = key.project_id.clone();
            (FcmAuth::service_account(key)?, project)
        } else {
            let token = if config.fcm_access_token.is_empty() {
                env("TRAINBELL_FCM_TOKEN")
            } else {
                config.fcm_access_token.clone()
            };
            if token.is_empty() {
                return Err(TrainbellError::Config(
                    "notify.target = \"fcm\" needs fcm_service_account (or GOOGLE_APPLICATION_CREDENTIALS) \
                     or a fixed access token (fcm_access_token or TRAINBELL_FCM_TOKEN)"
                        .into(),
                ));
            }
            tracing::warn!("⚠️ Using a fixed FCM access token; it is not refreshed and stops working when it expires");
            (FcmAuth::Static(token), None)
        };

        let project_id = if config.fcm_project_id.is_empty() {
            key_project.unwrap_or_default()
        } else {
            config.fcm_project_id.clone()
        };
        if project_id.is_empty() {
            return Err(TrainbellError::Config(
                "notify.target = \"fcm\" needs fcm_project_id".into(),
            ));
        }
        Ok(NotifyTarget::Fcm {
            project_id,
            auth: Arc::new(auth),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotifyTarget::Fcm { .. } => "fcm",
            NotifyTarget::Webhook { .. } => "webhook",
            NotifyTarget::Log => "log",
        }
    }
}

/// [`Notifier`] backed by one [`NotifyTarget`].
pub struct Dispatcher {
    target: NotifyTarget,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(target: NotifyTarget) -> Self {
        Self {
            target,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        NotifyTarget::from_config(config).map(Self::new)
    }

    pub fn target(&self) -> &NotifyTarget {
        &self.target
    }
}

#[async_trait]
impl Notifier for Dispatcher {
    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let envelope = MessageEnvelope::broadcast(event.clone());
        let result = dispatch(&self.client, &envelope, &self.target).await;
        if let Err(e) = &result {
            tracing::error!("❌ Notification via {} failed: {e}", self.target.name());
        }
        result
    }
}

/// Send one envelope to one target.
pub async fn dispatch(
    client: &reqwest::Client,
    envelope: &MessageEnvelope,
    target: &NotifyTarget,
) -> Result<()> {
    match target {
        NotifyTarget::Fcm { project_id, auth } => send_fcm(client, project_id, auth, envelope).await,
        NotifyTarget::Webhook { url, headers } => send_webhook(client, url, headers, envelope).await,
        NotifyTarget::Log => {
            tracing::info!(
                "📢 [{}] {}: {}",
                envelope.event.topic,
                envelope.event.title,
                envelope.event.body
            );
            Ok(())
        }
    }
}

/// Send a topic message via the FCM HTTP v1 API.
async fn send_fcm(
    client: &reqwest::Client,
    project_id: &str,
    auth: &FcmAuth,
    envelope: &MessageEnvelope,
) -> Result<()> {
    let url = format!("{FCM_ENDPOINT}/{project_id}/messages:send");
    let access_token = auth.access_token(client).await?;
    let resp = client
        .post(&url)
        .bearer_auth(&access_token)
        .json(&envelope.to_fcm_request())
        .timeout(std::time::Duration::from_secs(SEND_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| TrainbellError::NotificationDelivery(format!("FCM send failed: {e}")))?;

    let status = resp.status();
    if status.is_success() {
        // FCM answers with {"name": "projects/<id>/messages/<message-id>"}.
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        tracing::info!(
            "✅ FCM notification sent to '{}': {}",
            envelope.event.topic,
            body["name"].as_str().unwrap_or("(no message id)")
        );
        Ok(())
    } else {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            auth.invalidate().await;
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TrainbellError::NotificationDelivery(format!(
            "FCM API error {status}: {body}"
        )))
    }
}

/// POST the envelope as JSON.
async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    envelope: &MessageEnvelope,
) -> Result<()> {
    let mut req = client
        .post(url)
        .json(&envelope.to_webhook_payload())
        .timeout(std::time::Duration::from_secs(SEND_TIMEOUT_SECS));

    for (key, value) in headers {
        req = req.header(key.as_str(), value.as_str());
    }

    let resp = req
        .send()
        .await
        .map_err(|e| TrainbellError::NotificationDelivery(format!("Webhook send failed: {e}")))?;

    if resp.status().is_success() {
        tracing::info!("✅ Webhook notification sent to {}: {}", url, envelope.event.title);
        Ok(())
    } else {
        let status = resp.status();
        Err(TrainbellError::NotificationDelivery(format!("Webhook error {status}")))
    }
}
