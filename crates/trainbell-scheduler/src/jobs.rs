//! Job settings and the deadline-bounded entry points shared by the
//! scheduler loop, the change watcher and the CLI.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use trainbell_core::config::{MessagesConfig, RulesConfig, TrainbellConfig};
use trainbell_core::{
    NotificationEvent, Notifier, ReferenceCalendar, Result, SlotChange, SlotStore, TrainbellError,
};

use crate::capacity::{CapacityOutcome, adjust_capacity};
use crate::lookahead::{LookaheadOutcome, check_lookahead};
use crate::notify::NotificationKind;
use crate::recovery::{RecoveryOutcome, handle_change};

/// Everything the checkers read besides the store: thresholds, calendar,
/// and notification texts.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub rules: RulesConfig,
    pub calendar: ReferenceCalendar,
    pub topic: String,
    pub title: String,
    pub messages: MessagesConfig,
}

impl JobSettings {
    pub fn from_config(config: &TrainbellConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rules: config.rules.clone(),
            calendar: config.calendar()?,
            topic: config.notify.topic.clone(),
            title: config.notify.title.clone(),
            messages: config.messages.clone(),
        })
    }

    /// The broadcast event announcing `kind`.
    pub fn event(&self, kind: NotificationKind) -> NotificationEvent {
        NotificationEvent::new(&self.title, kind.body(&self.messages), &self.topic)
    }
}

/// The two clock-driven checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Lookahead,
    Capacity,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Lookahead => write!(f, "lookahead"),
            JobKind::Capacity => write!(f, "capacity"),
        }
    }
}

/// Result of one scheduled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReport {
    Lookahead(LookaheadOutcome),
    Capacity(CapacityOutcome),
}

/// The checkers wired to a store and a notifier, each invocation bounded by
/// a deadline.
pub struct SlotJobs {
    store: Arc<dyn SlotStore>,
    notifier: Arc<dyn Notifier>,
    settings: JobSettings,
    deadline: Duration,
}

impl SlotJobs {
    pub fn new(
        store: Arc<dyn SlotStore>,
        notifier: Arc<dyn Notifier>,
        settings: JobSettings,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
            deadline,
        }
    }

    /// Run one daily check as of `now`.
    pub async fn run(&self, kind: JobKind, now: DateTime<Utc>) -> Result<JobReport> {
        let store = self.store.as_ref();
        let notifier = self.notifier.as_ref();
        let name = kind.to_string();
        match kind {
            JobKind::Lookahead => {
                with_deadline(&name, self.deadline, check_lookahead(store, notifier, &self.settings, now))
                    .await
                    .map(JobReport::Lookahead)
            }
            JobKind::Capacity => {
                with_deadline(&name, self.deadline, adjust_capacity(store, notifier, &self.settings, now))
                    .await
                    .map(JobReport::Capacity)
            }
        }
    }

    /// Run the recovery watcher for one change.
    pub async fn on_change(&self, change: &SlotChange) -> Result<RecoveryOutcome> {
        with_deadline(
            "recovery",
            self.deadline,
            handle_change(
                self.store.as_ref(),
                self.notifier.as_ref(),
                &self.settings,
                &change.before,
                &change.after,
            ),
        )
        .await
    }
}

/// Fail with `Deadline` if `fut` does not finish within `limit`.
pub async fn with_deadline<T, F>(job: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TrainbellError::Deadline {
            job: job.to_string(),
            secs: limit.as_secs(),
        }),
    }
}
