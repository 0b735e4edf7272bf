//! Seams to the outside world: the record store, its change feed, and the
//! push channel.

pub mod notifier;
pub mod store;

pub use notifier::Notifier;
pub use store::{ChangeFeed, SlotStore};
