//! Database entity and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A forum category, recorded the first time the feed listed it.
/// `created_at` is set once and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Category {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A forum tag. Same lifecycle as [`Category`], independent namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Tag {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A digest recipient. The surrounding mail system owns these rows; this job
/// only ever advances `last_notified_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub last_notified_at: DateTime<Utc>,
}

/// Per-user novelty computed for one run: every category/tag name whose
/// creation time lies past the user's watermark. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub user: User,
    pub categories: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

/// How many rows one reconciliation actually inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub new_categories: u64,
    pub new_tags: u64,
}
