//! Northwind domain model.
//!
//! # Responsibility
//! - Define entity shapes returned by repository queries.
//! - Describe per-entity storage metadata shared by the save pipeline and
//!   the metadata document.
//! - Own the session identity rules (`UserSessionId`).
//!
//! # Invariants
//! - Session-saveable entities carry a nullable `user_session_id`; `None`
//!   marks shared baseline rows.
//! - `UserPartial` never exposes more than id, names, email and role names.

pub mod entities;
pub mod meta;
pub mod session;
