//! # Trainbell Scheduler
//!
//! The slot state machine and everything that drives it.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (tokio interval, cron in UTC+08:00)
//!   ├── "0 18 * * *" → lookahead: training slot in 2 days? → reminder
//!   └── "0 18 * * *" → capacity:  tomorrow's training slots with ≤2 people
//!                                  → one atomic demotion batch → one notice
//!
//! Change watcher (polls the store's change feed)
//!   └── before/after of one slot → participant set changed?
//!         selfTraining and ≥3 people → promote → recovery notice
//!
//! Notifier → Dispatcher
//!   ├── FCM HTTP v1 (topic broadcast, service-account tokens refreshed)
//!   ├── Webhook (HTTP POST)
//!   └── Log
//! ```
//!
//! Every check is a stateless function of the current time and the store;
//! nothing is remembered between runs.

pub mod capacity;
pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod fcm_auth;
pub mod jobs;
pub mod lookahead;
pub mod notify;
pub mod recovery;

#[cfg(test)]
pub(crate) mod testing;

pub use capacity::{CapacityOutcome, adjust_capacity};
pub use dispatch::{Dispatcher, NotifyTarget};
pub use engine::{DrainReport, SchedulerEngine, drain_changes, spawn_change_watcher, spawn_scheduler};
pub use fcm_auth::{FcmAuth, ServiceAccountKey};
pub use jobs::{JobKind, JobReport, JobSettings, SlotJobs};
pub use lookahead::{LookaheadOutcome, check_lookahead};
pub use notify::{MessageEnvelope, NotificationKind};
pub use recovery::{RecoveryOutcome, handle_change, participants_changed};
