use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::{Error, Kind};

/// Optional per-migration metadata read from `meta.yaml`. Unknown keys are
/// tolerated; every field defaults the way an absent `meta.yaml` would.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationMeta {
    pub timeout_sec: Option<u64>,
    pub online_safe: bool,
    #[serde(default = "default_reversible")]
    pub reversible: bool,
    pub tags: Vec<String>,
    pub requires: Vec<String>,
    pub pre_hooks: Vec<String>,
    pub post_hooks: Vec<String>,
}

fn default_reversible() -> bool {
    true
}

impl MigrationMeta {
    pub fn empty() -> MigrationMeta {
        MigrationMeta {
            timeout_sec: None,
            online_safe: false,
            reversible: true,
            tags: Vec::new(),
            requires: Vec::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }
}

/// An immutable migration discovered on disk by the [`crate::loader`]. Never
/// mutated after construction.
#[derive(Clone, Debug)]
pub struct MigrationDefinition {
    pub migration_id: String,
    pub dir: PathBuf,
    pub up_sql: PathBuf,
    pub down_sql: PathBuf,
    pub verify_sql: Option<PathBuf>,
    pub meta: MigrationMeta,
    pub checksum: String,
}

impl MigrationDefinition {
    /// A migration is reversible when `meta.reversible` is not false and
    /// `down.sql` is non-empty after trimming.
    pub fn is_reversible(&self) -> Result<bool, Error> {
        if !self.meta.reversible {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&self.down_sql)?;
        Ok(!content.trim().is_empty())
    }
}

impl fmt::Display for MigrationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.migration_id)
    }
}

/// The lifecycle state of a tracked migration, persisted as the `status`
/// column of `schema_migrations`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationStatus {
    Running,
    Applied,
    Failed,
    Reverted,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::Running => "running",
            MigrationStatus::Applied => "applied",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Reverted => "reverted",
        };
        write!(f, "{s}")
    }
}

impl FromStr for MigrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(MigrationStatus::Running),
            "applied" => Ok(MigrationStatus::Applied),
            "failed" => Ok(MigrationStatus::Failed),
            "reverted" => Ok(MigrationStatus::Reverted),
            other => Err(Kind::Format(format!("unknown migration status `{other}`")).into()),
        }
    }
}

/// The durable, per-migration bookkeeping row.
#[derive(Clone, Debug)]
pub struct MigrationState {
    pub migration_id: String,
    pub checksum: String,
    pub status: MigrationStatus,
    pub applied_at: Option<OffsetDateTime>,
    pub applied_by: Option<String>,
    pub execution_ms: Option<i32>,
    pub verify_ok: Option<bool>,
    pub log_ref: Option<String>,
}

/// The result of [`crate::planner::plan_up`].
#[derive(Debug)]
pub struct PlanUp {
    pub pending: Vec<MigrationDefinition>,
    pub already_applied: Vec<MigrationDefinition>,
}

/// The result of [`crate::planner::plan_down`], already in execution order
/// (descending id).
#[derive(Debug)]
pub struct PlanDown {
    pub pending: Vec<MigrationDefinition>,
}

/// The outcome of one `verify.sql` invocation.
#[derive(Clone, Debug)]
pub struct VerifyResult {
    pub migration_id: String,
    pub ok: bool,
    pub details: Option<String>,
}
