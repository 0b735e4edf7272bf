//! # Trainbell Store
//!
//! Implementations of [`SlotStore`](trainbell_core::SlotStore) and
//! [`ChangeFeed`](trainbell_core::ChangeFeed).
//!
//! - [`SqliteSlotStore`]: durable store. An `AFTER UPDATE` trigger copies
//!   every update into a `slot_changes` outbox, so edits made by any process
//!   sharing the database file reach the recovery watcher.
//! - [`MemorySlotStore`]: in-process store with failure switches, for tests
//!   and dry runs.

pub mod memory;
pub mod sqlite;

pub use memory::MemorySlotStore;
pub use sqlite::SqliteSlotStore;
