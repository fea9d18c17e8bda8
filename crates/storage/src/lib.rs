//! Storage backends for Sproutline.
//!
//! Implements the [`sproutline_core::Storage`] trait:
//! - `SqliteStorage` — production backend, single database file
//! - `InMemoryStorage` — tests and ephemeral development sessions

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
