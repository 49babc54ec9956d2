//! Testing utilities for sqlsync.
//!
//! Provides an in-memory execution collaborator so migrations can be listed,
//! applied and rolled back without a database.

mod memory;

pub use memory::MemoryConnector;
