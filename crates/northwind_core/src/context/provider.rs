//! SQLite-backed operational context provider and save pipeline.
//!
//! # Responsibility
//! - Own the operational connection for one unit of work.
//! - Run save bundles through before-entity, before-batch and after-batch
//!   hooks, then apply them in one transaction.
//!
//! # Invariants
//! - A failing hook, conversion or statement rolls back the whole bundle.
//! - Inserts and updates run parent-first, including rows whose parent is
//!   a row of the same kind; deletes run child-first.
//! - Temporary keys are replaced with database keys, and foreign keys in
//!   the same bundle that referenced them are rewritten before use.

use crate::context::bundle::{
    column_value, EntityInfo, EntityState, KeyMapping, SaveBundle, SaveError, SaveMap,
    SaveResult,
};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::meta::{EntityKind, SESSION_COLUMN};
use log::{error, info};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

/// Hook run for each entity before it is saved. Returning `false` drops the
/// entity from the bundle.
pub type BeforeSaveEntityHook =
    Box<dyn Fn(&Connection, &mut EntityInfo) -> Result<bool, SaveError>>;
/// Hook run once over the whole save map before any statement executes.
pub type BeforeSaveEntitiesHook =
    Box<dyn Fn(&Connection, &mut SaveMap) -> Result<(), SaveError>>;
/// Hook run after all statements succeed and before commit.
pub type AfterSaveEntitiesHook =
    Box<dyn Fn(&SaveMap, &[KeyMapping]) -> Result<(), SaveError>>;

/// Operational persistence context for one unit of work.
pub struct SqliteContextProvider {
    conn: Connection,
    before_save_entity: Vec<BeforeSaveEntityHook>,
    before_save_entities: Vec<BeforeSaveEntitiesHook>,
    after_save_entities: Vec<AfterSaveEntitiesHook>,
}

impl SqliteContextProvider {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            before_save_entity: Vec::new(),
            before_save_entities: Vec::new(),
            after_save_entities: Vec::new(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn add_before_save_entity(&mut self, hook: BeforeSaveEntityHook) {
        self.before_save_entity.push(hook);
    }

    pub fn add_before_save_entities(&mut self, hook: BeforeSaveEntitiesHook) {
        self.before_save_entities.push(hook);
    }

    pub fn add_after_save_entities(&mut self, hook: AfterSaveEntitiesHook) {
        self.after_save_entities.push(hook);
    }

    /// Registered hook counts as `(before_entity, before_batch, after_batch)`.
    pub fn hook_counts(&self) -> (usize, usize, usize) {
        (
            self.before_save_entity.len(),
            self.before_save_entities.len(),
            self.after_save_entities.len(),
        )
    }

    /// Applies a save bundle atomically.
    ///
    /// # Errors
    /// - `InvalidBundle` / `UnknownEntityType` for malformed input.
    /// - Any error raised by a registered hook.
    /// - `Validation` for missing or mistyped property values.
    /// - `Concurrency` when an update/delete matches no row.
    /// - `Db` for constraint and transport failures, including deferred
    ///   foreign-key checks at commit.
    pub fn save_changes(&mut self, bundle: &Value) -> Result<SaveResult, SaveError> {
        let started_at = Instant::now();
        let result = self.save_changes_inner(bundle);
        match &result {
            Ok(saved) => info!(
                "event=save_changes module=context status=ok entities={} key_mappings={} \
                 duration_ms={}",
                saved.entities.len(),
                saved.key_mappings.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=save_changes module=context status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn save_changes_inner(&mut self, bundle: &Value) -> Result<SaveResult, SaveError> {
        let bundle = SaveBundle::from_json(bundle)?;
        let infos = bundle
            .entities
            .into_iter()
            .map(EntityInfo::from_bundle_entity)
            .collect::<Result<Vec<_>, _>>()?;

        let tx = self.conn.transaction()?;
        let conn: &Connection = &tx;

        let mut save_map = SaveMap::new();
        'entities: for mut info in infos {
            if info.state == EntityState::Unchanged {
                continue;
            }
            for hook in &self.before_save_entity {
                if !hook(conn, &mut info)? {
                    continue 'entities;
                }
            }
            save_map.entry(info.kind).or_default().push(info);
        }

        for hook in &self.before_save_entities {
            hook(conn, &mut save_map)?;
        }

        for infos in save_map.values_mut() {
            order_self_references(infos);
        }

        let mut key_mappings = Vec::new();
        let mut resolved_keys: HashMap<(EntityKind, String), Value> = HashMap::new();

        for infos in save_map.values_mut() {
            for info in infos.iter_mut() {
                match info.state {
                    EntityState::Added => {
                        rewrite_temp_foreign_keys(info, &resolved_keys);
                        if let Some(mapping) = insert_entity(conn, info)? {
                            resolved_keys.insert(
                                (info.kind, mapping.temp_value.to_string()),
                                mapping.real_value.clone(),
                            );
                            key_mappings.push(mapping);
                        }
                    }
                    EntityState::Modified => {
                        rewrite_temp_foreign_keys(info, &resolved_keys);
                        update_entity(conn, info)?;
                    }
                    EntityState::Deleted | EntityState::Unchanged => {}
                }
            }
        }

        for infos in save_map.values().rev() {
            for info in infos.iter().filter(|info| info.state == EntityState::Deleted) {
                delete_entity(conn, info)?;
            }
        }

        for hook in &self.after_save_entities {
            hook(&save_map, &key_mappings)?;
        }

        tx.commit()?;

        let entities = save_map
            .into_values()
            .flatten()
            .map(|info| {
                let mut values = info.values;
                values.insert("$type".to_string(), Value::from(info.kind.name()));
                Value::Object(values)
            })
            .collect();

        Ok(SaveResult {
            entities,
            key_mappings,
        })
    }
}

/// Looks up the stored owner of one row.
///
/// Returns `None` when the row does not exist and `Some(None)` for baseline
/// rows without an owner.
pub fn lookup_owner(
    conn: &Connection,
    kind: EntityKind,
    key_values: &[SqlValue],
) -> Result<Option<Option<String>>, SaveError> {
    let meta = kind.meta();
    let predicate = key_predicate(meta.keys);
    let sql = format!(
        "SELECT {SESSION_COLUMN} FROM {} WHERE {predicate};",
        meta.table
    );
    let owner = conn
        .query_row(&sql, params_from_iter(key_values.iter()), |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()?;
    Ok(owner)
}

fn key_predicate(keys: &[&str]) -> String {
    keys.iter()
        .map(|key| format!("{key} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Reorders one kind's rows so rows referencing another row of the same kind
/// by its bundle key come after that row. Cycles keep bundle order.
fn order_self_references(infos: &mut Vec<EntityInfo>) {
    let Some(kind) = infos.first().map(|info| info.kind) else {
        return;
    };
    let meta = kind.meta();
    let self_refs: Vec<&str> = meta
        .columns
        .iter()
        .filter(|column| column.references == Some(kind))
        .map(|column| column.property)
        .collect();
    let Some(key) = meta.key_columns().next() else {
        return;
    };
    if self_refs.is_empty() {
        return;
    }

    let mut remaining = std::mem::take(infos);
    while !remaining.is_empty() {
        let unplaced_keys: Vec<Value> = remaining
            .iter()
            .filter(|info| info.state == EntityState::Added)
            .filter_map(|info| info.property(key.property).cloned())
            .collect();
        let (ready, blocked): (Vec<EntityInfo>, Vec<EntityInfo>) =
            remaining.into_iter().partition(|info| {
                info.state == EntityState::Deleted
                    || self_refs.iter().all(|property| match info.property(property) {
                        Some(parent) if !parent.is_null() => {
                            info.property(key.property) == Some(parent)
                                || !unplaced_keys.contains(parent)
                        }
                        _ => true,
                    })
            });
        if ready.is_empty() {
            infos.extend(blocked);
            return;
        }
        infos.extend(ready);
        remaining = blocked;
    }
}

fn rewrite_temp_foreign_keys(
    info: &mut EntityInfo,
    resolved_keys: &HashMap<(EntityKind, String), Value>,
) {
    for column in info.meta().columns {
        let Some(target) = column.references else {
            continue;
        };
        let Some(current) = info.values.get(column.property) else {
            continue;
        };
        if let Some(real) = resolved_keys.get(&(target, current.to_string())) {
            info.values.insert(column.property.to_string(), real.clone());
        }
    }
}

fn insert_entity(
    conn: &Connection,
    info: &mut EntityInfo,
) -> Result<Option<KeyMapping>, SaveError> {
    let meta = info.meta();
    let mut columns = Vec::new();
    let mut binds = Vec::new();

    for column in meta.columns {
        if meta.key_generated && meta.is_key(column.column) {
            continue;
        }
        let value = match info.values.get(column.property) {
            Some(value) => value.clone(),
            None if meta.concurrency_column == Some(column.column) => Value::from(0),
            None => Value::Null,
        };
        binds.push(column_value(meta, column, &value)?);
        columns.push(column.column);
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        meta.table,
        columns.join(", ")
    );
    conn.execute(&sql, params_from_iter(binds))?;

    if !meta.key_generated {
        return Ok(None);
    }

    let Some(key) = meta.key_columns().next() else {
        return Ok(None);
    };
    let real_value = Value::from(conn.last_insert_rowid());
    let temp_value = info
        .values
        .insert(key.property.to_string(), real_value.clone())
        .unwrap_or(Value::Null);

    Ok(Some(KeyMapping {
        entity_type_name: meta.name.to_string(),
        temp_value,
        real_value,
    }))
}

fn update_entity(conn: &Connection, info: &mut EntityInfo) -> Result<(), SaveError> {
    let meta = info.meta();
    let mut assignments = Vec::new();
    let mut binds = Vec::new();

    for column in meta.columns {
        if meta.is_key(column.column)
            || column.column == SESSION_COLUMN
            || meta.concurrency_column == Some(column.column)
        {
            continue;
        }
        if let Some(value) = info.values.get(column.property) {
            binds.push(column_value(meta, column, value)?);
            assignments.push(format!("{} = ?", column.column));
        }
    }

    if let Some(version_column) = meta.concurrency_column {
        assignments.push(format!("{version_column} = {version_column} + 1"));
    }
    if assignments.is_empty() {
        return Ok(());
    }

    let mut predicate = key_predicate(meta.keys);
    binds.extend(info.key_values()?);
    let expected_version = versioned_predicate(info, &mut predicate, &mut binds)?;

    let sql = format!(
        "UPDATE {} SET {} WHERE {predicate};",
        meta.table,
        assignments.join(", ")
    );
    let changed = conn.execute(&sql, params_from_iter(binds))?;
    if changed == 0 {
        return Err(SaveError::Concurrency {
            entity_type: meta.name,
            key: info.key_display(),
        });
    }

    if let (Some(version_column), Some(expected)) = (meta.concurrency_column, expected_version) {
        if let Some(column) = meta.column(version_column) {
            info.set_property(column.property, Value::from(expected + 1));
        }
    }
    Ok(())
}

fn delete_entity(conn: &Connection, info: &EntityInfo) -> Result<(), SaveError> {
    let meta = info.meta();
    let mut predicate = key_predicate(meta.keys);
    let mut binds = info.key_values()?;
    versioned_predicate(info, &mut predicate, &mut binds)?;

    let sql = format!("DELETE FROM {} WHERE {predicate};", meta.table);
    let changed = conn.execute(&sql, params_from_iter(binds))?;
    if changed == 0 {
        return Err(SaveError::Concurrency {
            entity_type: meta.name,
            key: info.key_display(),
        });
    }
    Ok(())
}

/// Appends the optimistic concurrency check when the client sent a version.
fn versioned_predicate(
    info: &EntityInfo,
    predicate: &mut String,
    binds: &mut Vec<SqlValue>,
) -> Result<Option<i64>, SaveError> {
    let Some(version_column) = info.meta().concurrency_column else {
        return Ok(None);
    };
    let Some(value) = info.concurrency_value() else {
        return Ok(None);
    };
    let expected = value.as_i64().ok_or_else(|| {
        SaveError::validation(info.kind, format!("invalid row version `{value}`"))
    })?;
    predicate.push_str(&format!(" AND {version_column} = ?"));
    binds.push(SqlValue::Integer(expected));
    Ok(Some(expected))
}
