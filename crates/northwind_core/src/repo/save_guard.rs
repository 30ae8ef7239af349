//! Session-scoped save guard.
//!
//! # Responsibility
//! - Stamp the bound session id onto added rows.
//! - Reject saves that touch reference data, baseline rows or rows owned by
//!   another session.
//! - Reject added or modified rows pointing at parents the session cannot see.
//!
//! # Invariants
//! - The session id is fixed at construction and never changes.
//! - The guard never writes to the database; it only reads ownership.

use crate::context::bundle::{column_value, EntityInfo, EntityState, KeyMapping, SaveError, SaveMap};
use crate::context::provider::lookup_owner;
use crate::model::meta::{EntityKind, SESSION_PROPERTY};
use crate::model::session::UserSessionId;
use log::{info, warn};
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

/// Hook object enforcing row ownership during saves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySaveGuard {
    user_session_id: UserSessionId,
}

impl EntitySaveGuard {
    pub fn new(user_session_id: UserSessionId) -> Self {
        Self { user_session_id }
    }

    pub fn user_session_id(&self) -> UserSessionId {
        self.user_session_id
    }

    /// Per-entity check. Returns `Ok(false)` to drop unchanged entities.
    pub fn before_save_entity(
        &self,
        conn: &Connection,
        info: &mut EntityInfo,
    ) -> Result<bool, SaveError> {
        let meta = info.meta();
        if !meta.session_scoped {
            return Err(self.reject(info.kind, "is read-only reference data".to_string()));
        }

        match info.state {
            EntityState::Added => {
                self.stamp(info);
                Ok(true)
            }
            EntityState::Modified | EntityState::Deleted => {
                let key_values = info.key_values()?;
                match lookup_owner(conn, info.kind, &key_values)? {
                    // Missing rows surface as concurrency conflicts when applied.
                    None => Ok(true),
                    Some(None) => Err(self.reject(
                        info.kind,
                        format!(
                            "{} is shared baseline data and cannot be changed",
                            info.key_display()
                        ),
                    )),
                    Some(Some(owner)) if self.owns(&owner) => {
                        self.stamp(info);
                        Ok(true)
                    }
                    Some(Some(_)) => Err(self.reject(
                        info.kind,
                        format!("{} belongs to another session", info.key_display()),
                    )),
                }
            }
            EntityState::Unchanged => Ok(false),
        }
    }

    /// Batch check: every referenced parent must be visible to the session
    /// or be added in the same bundle.
    pub fn before_save_entities(
        &self,
        conn: &Connection,
        map: &mut SaveMap,
    ) -> Result<(), SaveError> {
        for infos in map.values() {
            for info in infos.iter().filter(|info| {
                matches!(info.state, EntityState::Added | EntityState::Modified)
            }) {
                self.check_parents(conn, map, info)?;
            }
        }
        Ok(())
    }

    /// Post-save summary.
    pub fn after_save_entities(
        &self,
        map: &SaveMap,
        key_mappings: &[KeyMapping],
    ) -> Result<(), SaveError> {
        let saved: usize = map.values().map(Vec::len).sum();
        info!(
            "event=save_guard_after module=save_guard status=ok entities={} key_mappings={} \
             guest_session={}",
            saved,
            key_mappings.len(),
            self.user_session_id.is_guest()
        );
        Ok(())
    }

    fn stamp(&self, info: &mut EntityInfo) {
        info.set_property(SESSION_PROPERTY, Value::from(self.user_session_id.to_db()));
    }

    fn check_parents(
        &self,
        conn: &Connection,
        map: &SaveMap,
        info: &EntityInfo,
    ) -> Result<(), SaveError> {
        let meta = info.meta();
        for column in meta.columns {
            let Some(target) = column.references else {
                continue;
            };
            let target_meta = target.meta();
            if !target_meta.session_scoped {
                continue;
            }
            let Some(value) = info
                .property(column.property)
                .filter(|value| !value.is_null())
            else {
                continue;
            };
            if added_in_batch(map, target, value) {
                continue;
            }
            let Some(key_column) = target_meta.key_columns().next() else {
                continue;
            };
            let key_value = column_value(target_meta, key_column, value)?;
            match lookup_owner(conn, target, &[key_value])? {
                // Missing parents fail the deferred foreign-key check at commit.
                None | Some(None) => {}
                Some(Some(owner)) if self.owns(&owner) => {}
                Some(Some(_)) => {
                    return Err(self.reject(
                        info.kind,
                        format!(
                            "{} references {} {} owned by another session",
                            info.key_display(),
                            target.name(),
                            value
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn owns(&self, owner: &str) -> bool {
        Uuid::parse_str(owner).is_ok_and(|owner| owner == self.user_session_id.as_uuid())
    }

    fn reject(&self, kind: EntityKind, message: String) -> SaveError {
        warn!(
            "event=save_guard_reject module=save_guard status=error entity_type={} reason={}",
            kind.name(),
            message
        );
        SaveError::validation(kind, message)
    }
}

fn added_in_batch(map: &SaveMap, kind: EntityKind, key: &Value) -> bool {
    let Some(key_column) = kind.meta().key_columns().next() else {
        return false;
    };
    map.get(&kind).is_some_and(|infos| {
        infos.iter().any(|info| {
            info.state == EntityState::Added && info.property(key_column.property) == Some(key)
        })
    })
}
