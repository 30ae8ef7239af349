//! Session-scoped Northwind unit of work.
//!
//! # Responsibility
//! - Expose lazily evaluated entity queries filtered by session ownership.
//! - Forward save bundles to the operational context after registering the
//!   save guard once.
//! - Serve metadata from a dedicated metadata context.
//! - Reset rows added by the current session, or by every session.
//!
//! # Invariants
//! - `user_session_id()` never returns the nil UUID.
//! - The save guard is built at most once, bound to the session id current
//!   at the first save.
//! - Reset deletes tables in a fixed order inside one transaction.

use crate::context::bundle::{EntityInfo, KeyMapping, SaveError, SaveMap, SaveResult};
use crate::context::metadata::MetadataContextProvider;
use crate::context::provider::SqliteContextProvider;
use crate::db::DbResult;
use crate::model::entities::{
    Category, Customer, Employee, EmployeeTerritory, InternationalOrder, Order, OrderDetail,
    Product, Region, Supplier, Territory, UserPartial,
};
use crate::model::meta::SESSION_COLUMN;
use crate::model::session::UserSessionId;
use crate::repo::query::{EntityQuery, Filter, Include, Queryable};
use crate::repo::save_guard::EntitySaveGuard;
use crate::repo::RepoResult;
use log::{error, info};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;
use uuid::Uuid;

/// Token in reset options selecting deletion across all sessions.
pub const FULL_RESET_TOKEN: &str = "fullreset";

/// Order year kept by `customers_and_1998_orders`.
const ORDERS_YEAR: i32 = 1998;

/// Tables cleared by reset, in deletion order, with their report labels.
const RESET_TABLES: &[(&str, &str)] = &[
    ("customers", "Customers"),
    ("employees", "Employees"),
    ("products", "Products"),
    ("order_details", "OrderDetails"),
    ("international_orders", "InternationalOrders"),
    ("orders", "Orders"),
    ("users", "Users"),
];

/// Optional customer filters accepted by `customers_with_filter_options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerFilterOptions {
    /// Exact company name; ignored when empty.
    #[serde(default)]
    pub company_name: Option<String>,
    /// Customer ids to keep; ignored when empty.
    #[serde(default)]
    pub ids: Option<Vec<Uuid>>,
}

/// Unit of work over the Northwind context for one session.
pub struct NorthwindRepository {
    provider: SqliteContextProvider,
    user_session_id: UserSessionId,
    save_guard: Option<Rc<EntitySaveGuard>>,
}

impl NorthwindRepository {
    /// Creates a repository over an injected operational context.
    pub fn new(provider: SqliteContextProvider) -> Self {
        Self {
            provider,
            user_session_id: UserSessionId::guest(),
            save_guard: None,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        SqliteContextProvider::open(path).map(Self::new)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        SqliteContextProvider::open_in_memory().map(Self::new)
    }

    /// Current session id; the guest id until one is set.
    pub fn user_session_id(&self) -> UserSessionId {
        self.user_session_id
    }

    /// Sets the session id. The nil UUID selects the guest session.
    pub fn set_user_session_id(&mut self, value: Uuid) {
        self.user_session_id = UserSessionId::new(value);
    }

    pub fn provider(&self) -> &SqliteContextProvider {
        &self.provider
    }

    /// Guard bound on first save, if a save has happened.
    pub fn save_guard(&self) -> Option<&EntitySaveGuard> {
        self.save_guard.as_deref()
    }

    /// Client metadata from a freshly built metadata-only context.
    pub fn metadata(&self) -> RepoResult<String> {
        let metadata_provider = MetadataContextProvider::new();
        Ok(metadata_provider.metadata()?)
    }

    /// Materializes a query against this unit of work's connection.
    pub fn load<T: Queryable>(&self, query: &EntityQuery<T>) -> RepoResult<Vec<T>> {
        query.load(self.provider.connection())
    }

    pub fn first<T: Queryable>(&self, query: &EntityQuery<T>) -> RepoResult<Option<T>> {
        query.first(self.provider.connection())
    }

    pub fn count<T: Queryable>(&self, query: &EntityQuery<T>) -> RepoResult<u64> {
        query.count(self.provider.connection())
    }

    /// Applies a save bundle through the guarded save pipeline.
    ///
    /// Errors from the pipeline are returned unchanged.
    pub fn save_changes(
        &mut self,
        save_bundle: &serde_json::Value,
    ) -> Result<SaveResult, SaveError> {
        self.prepare_save_guard();
        self.provider.save_changes(save_bundle)
    }

    pub fn categories(&self) -> EntityQuery<Category> {
        EntityQuery::new()
    }

    pub fn customers(&self) -> EntityQuery<Customer> {
        self.for_current_session()
    }

    pub fn customers_and_orders(&self) -> EntityQuery<Customer> {
        self.for_current_session().include(Include::Orders)
    }

    /// Customers carrying only their orders dated in 1998.
    pub fn customers_and_1998_orders(&self) -> EntityQuery<Customer> {
        self.for_current_session().include(Include::OrdersInYear(ORDERS_YEAR))
    }

    pub fn customers_starting_with_a(&self) -> EntityQuery<Customer> {
        self.for_current_session().filter(Filter::StartsWith {
            column: "company_name",
            prefix: "A".to_string(),
        })
    }

    /// Customers narrowed by optional company name and id filters.
    pub fn customers_with_filter_options(
        &self,
        options: Option<&CustomerFilterOptions>,
    ) -> EntityQuery<Customer> {
        let mut query = self.for_current_session();
        let Some(options) = options else {
            return query;
        };

        if let Some(company_name) = options.company_name.as_deref().filter(|name| !name.is_empty())
        {
            query = query.filter(Filter::Eq {
                column: "company_name",
                value: Value::Text(company_name.to_string()),
            });
        }

        if let Some(ids) = options.ids.as_ref().filter(|ids| !ids.is_empty()) {
            query = query.filter(Filter::In {
                column: "customer_id",
                values: ids
                    .iter()
                    .map(|id| Value::Text(id.hyphenated().to_string()))
                    .collect(),
            });
        }

        query
    }

    pub fn employees(&self) -> EntityQuery<Employee> {
        self.for_current_session()
    }

    pub fn employee_territories(&self) -> EntityQuery<EmployeeTerritory> {
        EntityQuery::new()
    }

    /// Orders with customer and details; `0` keeps every order.
    pub fn orders_for_product(&self, product_id: i64) -> EntityQuery<Order> {
        let query = self
            .for_current_session()
            .include(Include::Customer)
            .include(Include::OrderDetails);
        if product_id == 0 {
            query
        } else {
            query.filter(Filter::HasOrderDetailForProduct(product_id))
        }
    }

    pub fn orders(&self) -> EntityQuery<Order> {
        self.for_current_session()
    }

    pub fn international_orders(&self) -> EntityQuery<InternationalOrder> {
        self.for_current_session()
    }

    pub fn orders_and_customers(&self) -> EntityQuery<Order> {
        self.for_current_session().include(Include::Customer)
    }

    pub fn orders_and_details(&self) -> EntityQuery<Order> {
        self.for_current_session().include(Include::OrderDetails)
    }

    pub fn order_details(&self) -> EntityQuery<OrderDetail> {
        self.for_current_session()
    }

    pub fn products(&self) -> EntityQuery<Product> {
        self.for_current_session()
    }

    pub fn regions(&self) -> EntityQuery<Region> {
        EntityQuery::new()
    }

    pub fn suppliers(&self) -> EntityQuery<Supplier> {
        EntityQuery::new()
    }

    pub fn territories(&self) -> EntityQuery<Territory> {
        EntityQuery::new()
    }

    /// Users restricted to id, user name and names.
    pub fn user_partials(&self) -> EntityQuery<UserPartial> {
        self.for_current_session()
    }

    /// One visible user with email and role names, or `None`.
    pub fn get_user_by_id(&self, id: i64) -> RepoResult<Option<UserPartial>> {
        let query = self.user_partials().filter(Filter::Eq {
            column: "id",
            value: Value::Integer(id),
        });
        let Some(mut user) = self.first(&query)? else {
            return Ok(None);
        };

        let conn = self.provider.connection();
        let email = conn
            .query_row("SELECT email FROM users WHERE id = ?1;", [id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();

        let mut stmt = conn.prepare(
            "SELECT r.name
             FROM user_roles ur
             INNER JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = ?1
             ORDER BY r.name ASC;",
        )?;
        let roles = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        user.email = email;
        user.roles = Some(roles);
        Ok(Some(user))
    }

    /// Deletes session-added rows and reports per-table counts.
    ///
    /// `options` containing `fullreset` deletes rows added by any session;
    /// otherwise only rows owned by the current session are deleted.
    /// Baseline rows (`user_session_id IS NULL`) are never deleted.
    pub fn reset(&mut self, options: &str) -> RepoResult<String> {
        let started_at = Instant::now();
        let full_reset = options.contains(FULL_RESET_TOKEN);

        let result = self.delete_session_rows(full_reset);

        match &result {
            Ok(summary) => info!(
                "event=reset module=repo status=ok full_reset={} duration_ms={} summary=\"{}\"",
                full_reset,
                started_at.elapsed().as_millis(),
                summary
            ),
            Err(err) => error!(
                "event=reset module=repo status=error full_reset={} duration_ms={} error={}",
                full_reset,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn delete_session_rows(&mut self, full_reset: bool) -> RepoResult<String> {
        let session = self.user_session_id.to_db();
        let tx = self.provider.connection_mut().transaction()?;
        let mut parts = Vec::with_capacity(RESET_TABLES.len());
        for (table, label) in RESET_TABLES {
            let deleted = if full_reset {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE {SESSION_COLUMN} IS NOT NULL;"),
                    [],
                )?
            } else {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE {SESSION_COLUMN} = ?1;"),
                    params![session],
                )?
            };
            parts.push(format!("{deleted} {label}"));
        }
        tx.commit()?;
        Ok(format!("reset deleted: {}", parts.join("; ")))
    }

    fn for_current_session<T: Queryable>(&self) -> EntityQuery<T> {
        EntityQuery::new().visible_to(self.user_session_id)
    }

    fn prepare_save_guard(&mut self) {
        if self.save_guard.is_some() {
            return;
        }

        let guard = Rc::new(EntitySaveGuard::new(self.user_session_id));
        let before_entity = Rc::clone(&guard);
        self.provider
            .add_before_save_entity(Box::new(move |conn: &Connection, info: &mut EntityInfo| {
                before_entity.before_save_entity(conn, info)
            }));
        let before_batch = Rc::clone(&guard);
        self.provider
            .add_before_save_entities(Box::new(move |conn: &Connection, map: &mut SaveMap| {
                before_batch.before_save_entities(conn, map)
            }));
        let after_batch = Rc::clone(&guard);
        self.provider
            .add_after_save_entities(Box::new(move |map: &SaveMap, key_mappings: &[KeyMapping]| {
                after_batch.after_save_entities(map, key_mappings)
            }));

        info!(
            "event=save_guard_init module=repo status=ok guest_session={}",
            guard.user_session_id().is_guest()
        );
        self.save_guard = Some(guard);
    }
}
