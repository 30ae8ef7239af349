//! Persistence contexts behind the repository.
//!
//! # Responsibility
//! - `SqliteContextProvider`: operational context running queries and the
//!   hook-driven save pipeline over one owned connection.
//! - `MetadataContextProvider`: separately configured context that only
//!   describes entity shapes for clients.
//!
//! # Invariants
//! - Metadata is never produced by the operational context instance.

pub mod bundle;
pub mod metadata;
pub mod provider;

pub use bundle::{
    EntityInfo, EntityState, KeyMapping, SaveBundle, SaveError, SaveMap, SaveResult,
};
pub use metadata::MetadataContextProvider;
pub use provider::SqliteContextProvider;
