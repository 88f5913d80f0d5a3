//! Postgres-backed bookkeeping: the `schema_migrations` table and the
//! session-scoped advisory lock that serializes concurrent runs against the
//! same database.
//!
//! Ported from `original_source/db.py`. Identifiers that come from
//! configuration (the schema name) are interpolated with
//! `quote_identifier`, matching `psycopg.sql.Identifier`'s escaping rather
//! than string formatting directly into the query text.

use time::OffsetDateTime;
use tokio_postgres::{Client, Transaction};

use crate::error::{Error, Kind};
use crate::model::{MigrationDefinition, MigrationState, MigrationStatus};

/// Quote a Postgres identifier the way `psycopg.sql.Identifier` does:
/// wrap in double quotes, doubling any embedded quote.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_name(schema: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier("schema_migrations"))
}

/// Index names are derived from the schema name too, so they go through
/// `quote_identifier` the same as every other identifier here.
fn index_name(schema: &str, suffix: &str) -> String {
    quote_identifier(&format!("idx_{schema}_schema_migrations_{suffix}"))
}

/// A live connection to the target database plus the resolved schema name
/// bookkeeping lives in.
pub struct Store {
    client: Client,
    schema: String,
}

impl Store {
    pub fn new(client: Client, schema: String) -> Store {
        Store { client, schema }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Create the bookkeeping schema/table/indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        let table = table_name(&self.schema);
        self.client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {};",
                quote_identifier(&self.schema)
            ))
            .await?;
        self.client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    migration_id TEXT UNIQUE NOT NULL,
                    checksum TEXT NOT NULL,
                    applied_at TIMESTAMPTZ,
                    applied_by TEXT,
                    status TEXT NOT NULL,
                    execution_ms INTEGER,
                    verify_ok BOOLEAN,
                    log_ref TEXT
                );"
            ))
            .await?;
        self.client
            .batch_execute(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table} (migration_id);",
                index_name(&self.schema, "migration_id")
            ))
            .await?;
        self.client
            .batch_execute(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table} (status);",
                index_name(&self.schema, "status")
            ))
            .await?;
        Ok(())
    }

    /// Open an explicit transaction on the underlying connection. Used by
    /// the executor to run a migration's up-script and its verify step as
    /// one atomic unit: a failing verify rolls back the script, not just
    /// the bookkeeping row.
    pub async fn begin(&mut self) -> Result<Transaction<'_>, Error> {
        self.client.transaction().await.map_err(Error::from)
    }

    /// All bookkeeping rows, ordered by migration id.
    pub async fn fetch_states(&self) -> Result<Vec<MigrationState>, Error> {
        let table = table_name(&self.schema);
        let rows = self
            .client
            .query(&format!("SELECT * FROM {table} ORDER BY migration_id"), &[])
            .await?;

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str: String = row.get("status");
            states.push(MigrationState {
                migration_id: row.get("migration_id"),
                checksum: row.get("checksum"),
                status: status_str.parse()?,
                applied_at: row.get("applied_at"),
                applied_by: row.get("applied_by"),
                execution_ms: row.get("execution_ms"),
                verify_ok: row.get("verify_ok"),
                log_ref: row.get("log_ref"),
            });
        }
        Ok(states)
    }

    /// Insert or update the bookkeeping row for `migration`, recording a
    /// fresh status transition.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_status(
        &self,
        migration: &MigrationDefinition,
        status: MigrationStatus,
        applied_by: Option<&str>,
        applied_at: Option<OffsetDateTime>,
        execution_ms: Option<i32>,
        verify_ok: Option<bool>,
        log_ref: Option<&str>,
    ) -> Result<(), Error> {
        let table = table_name(&self.schema);
        let status = status.to_string();
        self.client
            .execute(
                &format!(
                    "INSERT INTO {table}
                        (migration_id, checksum, status, applied_by, applied_at, execution_ms, verify_ok, log_ref)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (migration_id) DO UPDATE SET
                        checksum = EXCLUDED.checksum,
                        status = EXCLUDED.status,
                        applied_by = EXCLUDED.applied_by,
                        applied_at = EXCLUDED.applied_at,
                        execution_ms = EXCLUDED.execution_ms,
                        verify_ok = EXCLUDED.verify_ok,
                        log_ref = EXCLUDED.log_ref"
                ),
                &[
                    &migration.migration_id,
                    &migration.checksum,
                    &status,
                    &applied_by,
                    &applied_at,
                    &execution_ms,
                    &verify_ok,
                    &log_ref,
                ],
            )
            .await?;
        Ok(())
    }

    /// Reset an existing row to `status`, clearing `applied_at`,
    /// `applied_by`, `execution_ms`, and `verify_ok` — the update
    /// `retry`/`reset-failed` apply before re-running or discarding a
    /// migration. `checksum` and `log_ref` are left untouched.
    pub async fn reset_to(&self, migration_id: &str, status: MigrationStatus) -> Result<(), Error> {
        let table = table_name(&self.schema);
        let status = status.to_string();
        let affected = self
            .client
            .execute(
                &format!(
                    "UPDATE {table} SET status = $1, applied_at = NULL, applied_by = NULL,
                        execution_ms = NULL, verify_ok = NULL
                     WHERE migration_id = $2"
                ),
                &[&status, &migration_id],
            )
            .await?;
        if affected == 0 {
            return Err(Kind::NotTracked(migration_id.to_string()).into());
        }
        Ok(())
    }

    /// Overwrite the stored checksum for `migration_id` to match the file
    /// currently on disk.
    pub async fn repair_checksum(&self, migration_id: &str, checksum: &str) -> Result<(), Error> {
        let table = table_name(&self.schema);
        let affected = self
            .client
            .execute(
                &format!("UPDATE {table} SET checksum = $1 WHERE migration_id = $2"),
                &[&checksum, &migration_id],
            )
            .await?;
        if affected == 0 {
            return Err(Kind::NotTracked(migration_id.to_string()).into());
        }
        Ok(())
    }

    /// Delete the bookkeeping row for a reverted migration.
    pub async fn delete_state(&self, migration_id: &str) -> Result<(), Error> {
        let table = table_name(&self.schema);
        self.client
            .execute(
                &format!("DELETE FROM {table} WHERE migration_id = $1"),
                &[&migration_id],
            )
            .await?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<String, Error> {
        let row = self.client.query_one("SELECT current_user", &[]).await?;
        Ok(row.get(0))
    }

    /// Attempt to take the session-scoped advisory lock for `lock_key`.
    /// Returns `Ok(true)` if acquired.
    pub async fn try_advisory_lock(&self, lock_key: i64) -> Result<bool, Error> {
        let row = self
            .client
            .query_one("SELECT pg_try_advisory_lock($1)", &[&lock_key])
            .await?;
        Ok(row.get(0))
    }

    pub async fn advisory_unlock(&self, lock_key: i64) -> Result<(), Error> {
        self.client
            .execute("SELECT pg_advisory_unlock($1)", &[&lock_key])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_and_doubles_embedded_quotes() {
        assert_eq!(quote_identifier("public"), "\"public\"");
        assert_eq!(quote_identifier("weird\"schema"), "\"weird\"\"schema\"");
    }

    #[test]
    fn table_name_is_schema_qualified() {
        assert_eq!(table_name("public"), "\"public\".\"schema_migrations\"");
    }

    #[test]
    fn index_name_is_quoted_as_one_identifier() {
        assert_eq!(
            index_name("public", "status"),
            "\"idx_public_schema_migrations_status\""
        );
        assert_eq!(
            index_name("weird\"schema", "migration_id"),
            "\"idx_weird\"\"schema_schema_migrations_migration_id\""
        );
    }
}
