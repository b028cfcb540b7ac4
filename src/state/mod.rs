//! Components A and B: persistence (snapshots + audit log) and the in-memory
//! State Store that owns every entity and serializes all mutations through it.

pub mod events;
pub mod persistence;
pub mod store;

pub use events::StateEvent;
pub use persistence::{AuditOutcome, AuditRecord, Persistence};
pub use store::{StateSnapshot, StateStore};
