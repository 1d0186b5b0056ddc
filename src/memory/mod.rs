//! Ephemeral per-session semantic memory.
//!
//! [`store::SessionMemory`] owns one session's collection;
//! [`constraints::ConstraintTracker`] layers constraint tracking on top of it.

pub mod constraints;
pub mod stats;
pub mod store;
pub mod types;
