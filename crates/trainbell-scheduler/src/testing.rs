//! Test doubles shared by the checker tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use trainbell_core::config::TrainbellConfig;
use trainbell_core::{NotificationEvent, Notifier, Result, TrainbellError};

use crate::jobs::JobSettings;

/// Remembers every event it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationEvent>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TrainbellError::NotificationDelivery("push channel down".into()));
        }
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn settings() -> JobSettings {
    JobSettings::from_config(&TrainbellConfig::default()).unwrap()
}

/// 2026-03-10 18:00 in Taipei.
pub fn evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}
