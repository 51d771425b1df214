//! User Data Structures
//!
//! A user owns mindmaps and authenticates with a password hash. The hash is
//! never serialized outward; summaries go through [`UserInfo`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identifier
    pub id: i64,

    /// Unique, non-empty login name
    pub username: String,

    /// SHA-256 digest of the password
    #[serde(skip_serializing, default)]
    pub password_hash: Vec<u8>,

    pub active: bool,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,
}

/// Values required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Vec<u8>,
    pub active: bool,
}

/// Conjunctive lookup predicate; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub active: Option<bool>,
}

impl UserFilter {
    pub fn by_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }
}

/// Partial update applied by the store
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password_hash: Option<Vec<u8>>,
    pub active: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password_hash.is_none() && self.active.is_none()
    }
}

/// Presentation summary of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub active: bool,
    pub created: DateTime<Utc>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            active: user.active,
            created: user.created,
        }
    }
}

impl fmt::Display for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (id {}, {})",
            self.username,
            self.id,
            if self.active { "active" } else { "inactive" }
        )
    }
}
