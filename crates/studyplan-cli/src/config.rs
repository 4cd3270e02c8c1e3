//! Configuration file management for studyplan.
//!
//! Provides a TOML-based config file at `~/.config/studyplan/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use studyplan_core::planner::PlannerConfig;
use studyplan_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    /// Scheduling tunables; missing keys take their defaults.
    #[serde(default)]
    pub planner: PlannerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the studyplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/studyplan` or
/// `~/.config/studyplan`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("studyplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("studyplan")
}

/// Return the path to the studyplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Parse the config file at `path`.
pub fn read_config(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize `config` to `path`, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn write_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The URL may carry a password.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

pub fn save_config(config: &ConfigFile) -> Result<()> {
    write_config(&config_path(), config)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct StudyplanConfig {
    pub db_config: DbConfig,
    pub planner: PlannerConfig,
}

impl StudyplanConfig {
    /// Resolve configuration.
    ///
    /// - DB URL: `cli_db_url` > `STUDYPLAN_DATABASE_URL` env > `database.url`
    ///   in the config file > `DbConfig::DEFAULT_URL`
    /// - Planner: `[planner]` in the config file > defaults, validated
    ///
    /// A missing config file is fine; an unreadable or invalid one is an
    /// error.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            Some(read_config(&path)?)
        } else {
            None
        };

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let planner = file_config.map(|cfg| cfg.planner).unwrap_or_default();
        planner
            .validate()
            .with_context(|| format!("invalid [planner] section in {}", path.display()))?;

        Ok(Self {
            db_config: DbConfig::new(db_url),
            planner,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
