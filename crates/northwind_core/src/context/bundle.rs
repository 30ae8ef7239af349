//! Save bundle wire shapes, save results and save errors.
//!
//! # Invariants
//! - Property values are converted to column values only through
//!   `column_value`, which enforces nullability and data types.
//! - `SaveError` is returned to callers as-is; no layer re-wraps it.

use crate::db::DbError;
use crate::model::meta::{ColumnMeta, DataType, EntityKind, EntityMeta};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Storage format for date-time columns.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Batch of entity changes submitted together.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBundle {
    pub entities: Vec<BundleEntity>,
    #[serde(default)]
    pub save_options: Option<Value>,
}

impl SaveBundle {
    pub fn from_json(value: &Value) -> Result<Self, SaveError> {
        Self::deserialize(value).map_err(SaveError::InvalidBundle)
    }
}

/// One changed entity: its property values plus change-tracking aspect.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntity {
    pub entity_aspect: EntityAspect,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAspect {
    pub entity_type_name: String,
    pub entity_state: EntityState,
    #[serde(default)]
    pub original_values_map: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// Entity change as seen by save hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub kind: EntityKind,
    pub state: EntityState,
    pub values: Map<String, Value>,
    pub original_values: Map<String, Value>,
}

impl EntityInfo {
    pub fn from_bundle_entity(entity: BundleEntity) -> Result<Self, SaveError> {
        let type_name = entity.entity_aspect.entity_type_name;
        let kind = EntityKind::from_type_name(&type_name)
            .ok_or(SaveError::UnknownEntityType(type_name))?;
        Ok(Self {
            kind,
            state: entity.entity_aspect.entity_state,
            values: entity.values,
            original_values: entity.entity_aspect.original_values_map,
        })
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.kind.meta()
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Key column values in key declaration order.
    pub fn key_values(&self) -> Result<Vec<SqlValue>, SaveError> {
        let meta = self.meta();
        meta.key_columns()
            .map(|column| {
                let value = self.property(column.property).unwrap_or(&Value::Null);
                column_value(meta, column, value)
            })
            .collect()
    }

    /// Key rendered for error messages, e.g. `10248/11`.
    pub fn key_display(&self) -> String {
        let meta = self.meta();
        meta.key_columns()
            .map(|column| match self.property(column.property) {
                Some(Value::String(text)) => text.clone(),
                Some(value) => value.to_string(),
                None => "?".to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Value to compare against the stored concurrency column.
    pub fn concurrency_value(&self) -> Option<&Value> {
        let column = self.meta().concurrency_column?;
        let property = self.meta().column(column)?.property;
        self.original_values
            .get(property)
            .or_else(|| self.values.get(property))
    }
}

/// Changes grouped by entity type, iterated parent-first.
pub type SaveMap = BTreeMap<EntityKind, Vec<EntityInfo>>;

/// Temporary client key replaced by a database-assigned key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMapping {
    pub entity_type_name: String,
    pub temp_value: Value,
    pub real_value: Value,
}

/// Outcome of a committed save.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    /// Saved entities with final keys, row versions and ownership.
    pub entities: Vec<Value>,
    pub key_mappings: Vec<KeyMapping>,
}

/// Save pipeline failure. The whole bundle is rolled back.
#[derive(Debug)]
pub enum SaveError {
    InvalidBundle(serde_json::Error),
    UnknownEntityType(String),
    Validation {
        entity_type: &'static str,
        message: String,
    },
    /// Row changed or vanished since the client read it.
    Concurrency {
        entity_type: &'static str,
        key: String,
    },
    Db(DbError),
}

impl SaveError {
    pub fn validation(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Validation {
            entity_type: kind.name(),
            message: message.into(),
        }
    }
}

impl Display for SaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBundle(err) => write!(f, "invalid save bundle: {err}"),
            Self::UnknownEntityType(name) => write!(f, "unknown entity type `{name}`"),
            Self::Validation {
                entity_type,
                message,
            } => write!(f, "{entity_type} failed validation: {message}"),
            Self::Concurrency { entity_type, key } => write!(
                f,
                "{entity_type} {key} was modified or deleted by another save"
            ),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBundle(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::UnknownEntityType(_) | Self::Validation { .. } | Self::Concurrency { .. } => None,
        }
    }
}

impl From<DbError> for SaveError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SaveError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Converts one property value to its column value.
pub fn column_value(
    meta: &EntityMeta,
    column: &ColumnMeta,
    value: &Value,
) -> Result<SqlValue, SaveError> {
    let invalid = || {
        SaveError::validation(
            meta.kind,
            format!(
                "{} expects {:?}, got {value}",
                column.property, column.data_type
            ),
        )
    };

    if value.is_null() {
        if column.nullable {
            return Ok(SqlValue::Null);
        }
        return Err(SaveError::validation(
            meta.kind,
            format!("{} is required", column.property),
        ));
    }

    let converted = match column.data_type {
        DataType::Guid => {
            let text = value.as_str().ok_or_else(invalid)?;
            let id = Uuid::parse_str(text).map_err(|_| invalid())?;
            SqlValue::Text(id.hyphenated().to_string())
        }
        DataType::Int32 | DataType::Int64 => SqlValue::Integer(value.as_i64().ok_or_else(invalid)?),
        DataType::Decimal => SqlValue::Real(value.as_f64().ok_or_else(invalid)?),
        DataType::String => SqlValue::Text(value.as_str().ok_or_else(invalid)?.to_string()),
        DataType::DateTime => {
            let text = value.as_str().ok_or_else(invalid)?;
            let parsed = parse_date_time(text).ok_or_else(invalid)?;
            SqlValue::Text(parsed.format(DATE_TIME_FORMAT).to_string())
        }
        DataType::Boolean => SqlValue::Integer(i64::from(value.as_bool().ok_or_else(invalid)?)),
    };
    Ok(converted)
}

/// Accepts RFC 3339, zone-less ISO date-times and bare dates.
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT) {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
