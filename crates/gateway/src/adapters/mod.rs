// Rust guideline compliant 2026-03-07

//! Concrete adapters for the domain ports: the shared buffer and the
//! `SQLite` measurement store.

pub mod shared_buffer;
pub mod sqlite_store;
