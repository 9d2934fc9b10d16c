//! Persisted resource state and change history.

pub mod store;

pub use store::{HistoryEntry, ResourceState, Status, Store};
