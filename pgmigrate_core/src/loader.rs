//! Scans a migrations directory on disk into an ordered list of
//! [`MigrationDefinition`]s. Mirrors `original_source/loader.py`: one
//! directory per migration, sorted lexicographically by directory name,
//! each requiring `up.sql`/`down.sql` and tolerating a missing
//! `verify.sql`/`meta.yaml`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Error, Kind};
use crate::model::{MigrationDefinition, MigrationMeta};

fn load_meta(path: &Path) -> Result<MigrationMeta, Error> {
    if !path.exists() {
        return Ok(MigrationMeta::empty());
    }
    let contents = std::fs::read_to_string(path)?;
    let meta: MigrationMeta = serde_yaml::from_str(&contents)?;
    Ok(meta)
}

fn checksum(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

/// Load and validate every migration directory under `root`.
///
/// Entries are visited at depth 1 only: files directly under `root` and
/// nested subdirectories inside a migration's own directory are ignored.
pub fn load_migrations(root: &Path) -> Result<Vec<MigrationDefinition>, Error> {
    if !root.exists() {
        return Err(Kind::Format(format!("migrations directory does not exist: {}", root.display())).into());
    }

    let mut entries: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.path().to_path_buf())
        .collect();
    entries.sort();

    let mut migrations = Vec::with_capacity(entries.len());
    for dir in entries {
        let migration_id = dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Kind::Format(format!("non-utf8 migration directory name: {}", dir.display())))?
            .to_string();

        let up_sql = dir.join("up.sql");
        let down_sql = dir.join("down.sql");
        let verify_sql = dir.join("verify.sql");
        let meta_yaml = dir.join("meta.yaml");

        if !up_sql.is_file() {
            return Err(Kind::Format(format!("migration {migration_id} is missing up.sql")).into());
        }
        if !down_sql.is_file() {
            return Err(Kind::Format(format!("migration {migration_id} is missing down.sql")).into());
        }

        let up_content = std::fs::read_to_string(&up_sql)?;
        let checksum = checksum(&up_content);
        let verify_sql = verify_sql.is_file().then_some(verify_sql);
        let meta = load_meta(&meta_yaml)?;

        migrations.push(MigrationDefinition {
            migration_id,
            dir,
            up_sql,
            down_sql,
            verify_sql,
            meta,
            checksum,
        });
    }

    Ok(migrations)
}

/// Verify migration directories are in strict ascending lexicographic order.
///
/// `load_migrations` already sorts by directory name, so this only ever
/// fails on duplicate ids; it is kept as a standalone check so callers can
/// validate loaders that bypass the filesystem (e.g. in tests).
pub fn require_sequential(migrations: &[MigrationDefinition]) -> Result<(), Error> {
    let mut previous: Option<&str> = None;
    for migration in migrations {
        if let Some(prev) = previous {
            if migration.migration_id.as_str() <= prev {
                return Err(Kind::Format("migrations are not in strict ascending order".into()).into());
            }
        }
        previous = Some(migration.migration_id.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_migration(root: &Path, id: &str, up: &str, down: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("up.sql"), up).unwrap();
        std::fs::write(dir.join("down.sql"), down).unwrap();
    }

    #[test]
    fn loads_in_sorted_order_with_checksums() {
        let tmp = TempDir::new().unwrap();
        write_migration(tmp.path(), "0002_add_index", "create index;", "drop index;");
        write_migration(tmp.path(), "0001_init", "create table t();", "drop table t;");

        let migrations = load_migrations(tmp.path()).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].migration_id, "0001_init");
        assert_eq!(migrations[1].migration_id, "0002_add_index");
        assert_ne!(migrations[0].checksum, migrations[1].checksum);
        assert_eq!(migrations[0].checksum.len(), 64);
        require_sequential(&migrations).unwrap();
    }

    #[test]
    fn missing_up_sql_is_format_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("0001_init")).unwrap();
        std::fs::write(tmp.path().join("0001_init").join("down.sql"), "drop table t;").unwrap();

        let err = load_migrations(tmp.path()).unwrap_err();
        assert!(matches!(err.kind(), Kind::Format(_)));
    }

    #[test]
    fn missing_directory_is_format_error() {
        let err = load_migrations(Path::new("/no/such/migrations")).unwrap_err();
        assert!(matches!(err.kind(), Kind::Format(_)));
    }

    #[test]
    fn absent_verify_and_meta_are_tolerated() {
        let tmp = TempDir::new().unwrap();
        write_migration(tmp.path(), "0001_init", "create table t();", "drop table t;");

        let migrations = load_migrations(tmp.path()).unwrap();
        assert!(migrations[0].verify_sql.is_none());
        assert_eq!(migrations[0].meta, MigrationMeta::empty());
    }

    #[test]
    fn meta_yaml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        write_migration(tmp.path(), "0001_init", "create table t();", "drop table t;");
        std::fs::write(
            tmp.path().join("0001_init").join("meta.yaml"),
            "online_safe: true\ntags:\n  - destructive\nrequires:\n  - 0000_bootstrap\n",
        )
        .unwrap();

        let migrations = load_migrations(tmp.path()).unwrap();
        let meta = &migrations[0].meta;
        assert!(meta.online_safe);
        assert_eq!(meta.tags, vec!["destructive".to_string()]);
        assert_eq!(meta.requires, vec!["0000_bootstrap".to_string()]);
        assert!(meta.reversible);
    }

    #[test]
    fn ignores_non_directory_entries() {
        let tmp = TempDir::new().unwrap();
        write_migration(tmp.path(), "0001_init", "create table t();", "drop table t;");
        std::fs::write(tmp.path().join("README.md"), "notes").unwrap();

        let migrations = load_migrations(tmp.path()).unwrap();
        assert_eq!(migrations.len(), 1);
    }
}
