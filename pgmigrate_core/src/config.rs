//! Loads `migrate.yaml` and resolves the effective [`ProfileConfig`] for a
//! named profile, applying CLI overrides and the `PG_DSN` environment
//! variable. Kept in the core crate, not the CLI, matching the teacher's own
//! placement of config loading in `refinery_core::config`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Kind};

const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_TIMEOUT_SEC: u64 = 600;
const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";
const DEFAULT_LOG_DIR: &str = ".migrate-logs";

/// The effective, fully-resolved runtime parameters for one target database.
#[derive(Clone, Debug)]
pub struct ProfileConfig {
    pub name: String,
    pub dsn: String,
    pub schema: String,
    pub app_env: Option<String>,
    pub confirm_prod: bool,
    pub timeout_sec: u64,
    pub log_dir: PathBuf,
    pub migrations_dir: PathBuf,
    pub lock_key: i64,
    pub allow_tags: Vec<String>,
    pub interactive: bool,
}

#[derive(Debug, Deserialize)]
struct RawGlobal {
    lock_key: Option<i64>,
    timeout_sec: Option<u64>,
    log_dir: Option<String>,
    schema: Option<String>,
    app_env: Option<String>,
    confirm_prod: Option<bool>,
    migrations_dir: Option<String>,
    allow_tags: Option<Vec<String>>,
    interactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    dsn: Option<String>,
    schema: Option<String>,
    app_env: Option<String>,
    confirm_prod: Option<bool>,
    timeout_sec: Option<u64>,
    log_dir: Option<String>,
    migrations_dir: Option<String>,
    lock_key: Option<i64>,
    allow_tags: Option<Vec<String>>,
    interactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    default_profile: String,
    #[serde(default)]
    global: Option<RawGlobal>,
    profiles: HashMap<String, RawProfile>,
}

/// The raw, parsed-but-unresolved configuration file: a set of named
/// profiles plus global defaults and which profile to use absent an
/// explicit `--env`.
#[derive(Debug)]
pub struct GlobalConfig {
    base_dir: PathBuf,
    default_profile: String,
    global: RawGlobal,
    profiles: HashMap<String, RawProfile>,
}

/// Load and validate a `migrate.yaml` file at `path`.
pub fn load_config(path: &Path) -> Result<GlobalConfig, Error> {
    if !path.exists() {
        return Err(Kind::Config(format!("config file not found: {}", path.display())).into());
    }
    let contents = std::fs::read_to_string(path)?;
    let raw: RawConfig = serde_yaml::from_str(&contents)?;
    if raw.profiles.is_empty() {
        return Err(Kind::Config("no profiles defined in config".into()).into());
    }
    if !raw.profiles.contains_key(&raw.default_profile) {
        return Err(Kind::Config(format!(
            "default profile '{}' is not defined in profiles",
            raw.default_profile
        ))
        .into());
    }
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(GlobalConfig {
        base_dir,
        default_profile: raw.default_profile,
        global: raw.global.unwrap_or(RawGlobal {
            lock_key: None,
            timeout_sec: None,
            log_dir: None,
            schema: None,
            app_env: None,
            confirm_prod: None,
            migrations_dir: None,
            allow_tags: None,
            interactive: None,
        }),
        profiles: raw.profiles,
    })
}

fn resolve_path(value: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Overrides supplied on the command line, applied after profile/global
/// resolution.
#[derive(Default)]
pub struct ProfileOverrides {
    pub dsn: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub migrations_dir: Option<PathBuf>,
    pub timeout_sec: Option<u64>,
    pub interactive: Option<bool>,
    pub confirm_prod: Option<bool>,
}

/// Resolve the effective [`ProfileConfig`] for `profile_name` (or the
/// config's default profile), applying `overrides` and finally the `PG_DSN`
/// environment variable.
pub fn resolve_profile(
    config: &GlobalConfig,
    profile_name: Option<&str>,
    overrides: ProfileOverrides,
) -> Result<ProfileConfig, Error> {
    let name = profile_name.unwrap_or(&config.default_profile);
    let raw = config
        .profiles
        .get(name)
        .ok_or_else(|| Kind::Config(format!("profile '{name}' not found")))?;

    let dsn = overrides
        .dsn
        .or_else(|| raw.dsn.clone())
        .ok_or_else(|| Kind::Config(format!("profile '{name}' is missing 'dsn'")))?;

    let schema = raw
        .schema
        .clone()
        .or_else(|| config.global.schema.clone())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

    let app_env = raw.app_env.clone().or_else(|| config.global.app_env.clone());

    let confirm_prod = overrides.confirm_prod.unwrap_or(
        raw.confirm_prod
            .or(config.global.confirm_prod)
            .unwrap_or(false),
    );

    let timeout_sec = overrides.timeout_sec.unwrap_or(
        raw.timeout_sec
            .or(config.global.timeout_sec)
            .unwrap_or(DEFAULT_TIMEOUT_SEC),
    );

    let migrations_dir = overrides.migrations_dir.unwrap_or_else(|| {
        let value = raw
            .migrations_dir
            .clone()
            .or_else(|| config.global.migrations_dir.clone())
            .unwrap_or_else(|| DEFAULT_MIGRATIONS_DIR.to_string());
        resolve_path(&value, &config.base_dir)
    });

    let log_dir = overrides.log_dir.unwrap_or_else(|| {
        let value = raw
            .log_dir
            .clone()
            .or_else(|| config.global.log_dir.clone())
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
        resolve_path(&value, &config.base_dir)
    });

    let lock_key = raw
        .lock_key
        .or(config.global.lock_key)
        .ok_or_else(|| Kind::Config("'lock_key' must be set globally or per profile".into()))?;

    let allow_tags = raw
        .allow_tags
        .clone()
        .or_else(|| config.global.allow_tags.clone())
        .unwrap_or_default();

    let interactive = overrides.interactive.unwrap_or(
        raw.interactive
            .or(config.global.interactive)
            .unwrap_or(true),
    );

    let dsn = std::env::var("PG_DSN").unwrap_or(dsn);

    Ok(ProfileConfig {
        name: name.to_string(),
        dsn,
        schema,
        app_env,
        confirm_prod,
        timeout_sec,
        log_dir,
        migrations_dir,
        lock_key,
        allow_tags,
        interactive,
    })
}
