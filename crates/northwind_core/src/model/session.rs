//! Session identity for row ownership.
//!
//! # Invariants
//! - A `UserSessionId` is never the nil UUID; nil input becomes the guest id.
//! - The value is an already-validated UUID, never free-form caller text.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Well-known session id shared by callers without their own session.
pub const GUEST_USER_SESSION_ID: Uuid = Uuid::from_u128(0x12345678_9abc_def0_1234_56789abcdef0);

/// Identifier tying rows to the session that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Uuid", into = "Uuid")]
pub struct UserSessionId(Uuid);

impl UserSessionId {
    /// Returns the guest session id.
    pub const fn guest() -> Self {
        Self(GUEST_USER_SESSION_ID)
    }

    /// Normalizes `value`: the nil UUID maps to the guest id.
    pub fn new(value: Uuid) -> Self {
        if value.is_nil() {
            Self::guest()
        } else {
            Self(value)
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0 == GUEST_USER_SESSION_ID
    }

    /// Storage form used in `user_session_id` columns.
    pub fn to_db(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for UserSessionId {
    fn default() -> Self {
        Self::guest()
    }
}

impl From<Uuid> for UserSessionId {
    fn from(value: Uuid) -> Self {
        Self::new(value)
    }
}

impl From<UserSessionId> for Uuid {
    fn from(value: UserSessionId) -> Self {
        value.0
    }
}

impl Display for UserSessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{UserSessionId, GUEST_USER_SESSION_ID};
    use uuid::Uuid;

    #[test]
    fn guest_id_matches_well_known_value() {
        assert_eq!(
            GUEST_USER_SESSION_ID.to_string(),
            "12345678-9abc-def0-1234-56789abcdef0"
        );
    }

    #[test]
    fn nil_normalizes_to_guest() {
        let id = UserSessionId::new(Uuid::nil());
        assert!(id.is_guest());
        assert_eq!(id.as_uuid(), GUEST_USER_SESSION_ID);
    }

    #[test]
    fn non_nil_is_kept_verbatim() {
        let raw = Uuid::new_v4();
        assert_eq!(UserSessionId::new(raw).as_uuid(), raw);
    }

    #[test]
    fn deserializing_nil_yields_guest() {
        let id: UserSessionId =
            serde_json::from_str("\"00000000-0000-0000-0000-000000000000\"").expect("uuid json");
        assert!(id.is_guest());
    }
}
