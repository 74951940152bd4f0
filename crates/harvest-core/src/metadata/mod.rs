//! Sidecar metadata persistence.

pub mod atomic;

pub use atomic::{atomic_read_json, atomic_write_json};
