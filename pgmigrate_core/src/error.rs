use std::path::PathBuf;
use thiserror::Error as TError;

/// An error that occurred while loading, planning, or executing migrations.
///
/// Carries a [`Kind`] plus, for execution failures, the id of the migration
/// that was running when the failure happened so callers don't have to
/// re-parse the message to find out what broke.
#[derive(Debug, TError)]
#[error("{kind}")]
pub struct Error {
    kind: Kind,
}

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error { kind }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }
}

impl From<Kind> for Error {
    fn from(kind: Kind) -> Error {
        Error::new(kind)
    }
}

/// The taxonomy of errors pgmigrate can raise. Every variant carries a
/// human-readable message; the CLI maps any of these to exit code 1.
#[derive(Debug, TError)]
pub enum Kind {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("migration directory malformed: {0}")]
    Format(String),

    #[error("advisory lock {0} is held by another process")]
    LockHeld(i64),

    #[error("migration {0} checksum does not match the file on disk; run repair")]
    ChecksumMismatch(String),

    #[error("migration {0} is marked running; use retry or reset-failed")]
    InProgress(String),

    #[error("migration {0} previously failed and is blocking forward progress")]
    PreviousFailure(String),

    #[error("target migration {0} is not reachable")]
    TargetUnreachable(String),

    #[error("target migration {0} has not been applied")]
    TargetNotApplied(String),

    #[error("migration {0} is irreversible")]
    Irreversible(String),

    #[error("migration {0} uses tags not allowed by this profile")]
    TagNotAllowed(String),

    #[error("migration {migration} requires {requires} to be applied first")]
    MissingDependency { migration: String, requires: String },

    #[error("migration {0} failed: {1}")]
    Execution(String, String),

    #[error("include cycle detected at {0}")]
    IncludeCycle(PathBuf),

    #[error("included file not found: {0}")]
    IncludeNotFound(PathBuf),

    #[error("production confirmation required: pass --confirm-prod in non-interactive mode")]
    ProdConfirmationRequired,

    #[error("confirmation rejected")]
    ConfirmationRejected,

    #[error("aborted by user")]
    UserAborted,

    #[error("migration {0} is not tracked in schema_migrations")]
    NotTracked(String),

    #[error("migration {0} not found on disk")]
    UnknownMigration(String),

    #[error("io error: {0}")]
    Io(#[source] std::io::Error),

    #[error("invalid meta.yaml: {0}")]
    Yaml(#[source] serde_yaml::Error),

    #[error("database error: {0}")]
    Postgres(#[source] tokio_postgres::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::new(Kind::Io(err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Error {
        Error::new(Kind::Yaml(err))
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Error {
        Error::new(Kind::Postgres(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
