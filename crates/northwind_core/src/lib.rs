//! Core domain logic for the Northwind session-scoped unit of work.
//! This crate owns the storage schema, query descriptors, save pipeline and
//! session ownership rules.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{ConfigError, NorthwindConfig};
pub use context::{
    EntityInfo, EntityState, KeyMapping, MetadataContextProvider, SaveError, SaveMap, SaveResult,
    SqliteContextProvider,
};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError, LoggingSettings};
pub use model::entities::{
    Category, Customer, Employee, EmployeeTerritory, InternationalOrder, Order, OrderDetail,
    Product, Region, Supplier, Territory, UserPartial,
};
pub use model::meta::EntityKind;
pub use model::session::{UserSessionId, GUEST_USER_SESSION_ID};
pub use repo::northwind_repo::{CustomerFilterOptions, NorthwindRepository, FULL_RESET_TOKEN};
pub use repo::query::{EntityQuery, Filter, Include, Queryable};
pub use repo::save_guard::EntitySaveGuard;
pub use repo::{RepoError, RepoResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
