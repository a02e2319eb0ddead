//! Forget Storage - Entity store backends
//!
//! This crate provides the backends the traversal engine loads entities
//! from and writes erasure results back to.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod migration;
pub mod traits;

#[cfg(feature = "redb")]
pub mod redb;

pub mod memory;

pub use error::{StorageError, StorageResult};
pub use migration::{Migratable, SchemaVersion, CURRENT_VERSION};
pub use traits::StorageBackend;

#[cfg(feature = "redb")]
pub use redb::RedbStore;

pub use memory::MemoryStore;
