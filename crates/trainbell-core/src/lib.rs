//! # Trainbell Core
//!
//! Shared vocabulary for the slot watcher: the `TrainingSlot` record, the
//! error taxonomy, configuration, the reference calendar, and the traits
//! behind which the record store and the push channel live.

pub mod calendar;
pub mod config;
pub mod error;
pub mod slot;
pub mod traits;

pub use calendar::ReferenceCalendar;
pub use config::TrainbellConfig;
pub use error::{Result, TrainbellError};
pub use slot::{NotificationEvent, SlotChange, SlotId, SlotQuery, SlotType, SlotUpdate, TrainingSlot};
pub use traits::{ChangeFeed, Notifier, SlotStore};
