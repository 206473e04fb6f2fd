//! Revision model
//!
//! A revision is one atomic, ordered schema change: a unique id, a pointer
//! to its parent, the branch that authored it, and the forward/reverse
//! scripts realizing it. Records are immutable once written to the store.

pub mod chain;
pub mod store;

pub use chain::{ChainSnapshot, RevisionWalk};
pub use store::RevisionStore;

use crate::diff::MigrationScript;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique revision token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(Uuid);

impl RevisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form used in artifact file names and log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..12].to_string()
    }
}

impl Default for RevisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for RevisionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One migration revision. `branch_tag` is fixed at authoring time and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: RevisionId,
    /// `None` only for the root revision.
    pub parent_id: Option<RevisionId>,
    pub branch_tag: String,
    /// Human-readable label: the message supplied at authoring time, or the
    /// branch name when no message was given.
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub up_sql: String,
    pub down_sql: String,
}

impl Revision {
    pub fn new(
        parent_id: Option<RevisionId>,
        branch_tag: impl Into<String>,
        label: impl Into<String>,
        script: MigrationScript,
    ) -> Self {
        Self {
            id: RevisionId::new(),
            parent_id,
            branch_tag: branch_tag.into(),
            label: label.into(),
            created_at: Utc::now(),
            up_sql: script.up_sql,
            down_sql: script.down_sql,
        }
    }
}
