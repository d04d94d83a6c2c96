// Configuration loading and parsing (fiveside.toml).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::league::draft::SquadLimits;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// fiveside.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire fiveside.toml file. Every
/// section is optional; missing sections fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    storage: Option<StorageSection>,
    #[serde(default)]
    session: Option<SessionSection>,
    #[serde(default)]
    draft: Option<DraftSection>,
    #[serde(default)]
    log: Option<LogSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SessionSection {
    cache_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DraftSection {
    #[serde(default)]
    budget: Option<u32>,
    #[serde(default)]
    max_squad: Option<usize>,
    #[serde(default)]
    max_starters: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct LogSection {
    filter: String,
}

/// The assembled application config.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file holding all league documents.
    pub db_path: String,
    /// JSON file remembering who was signed in and where.
    pub session_cache_path: String,
    /// Draft caps applied to every league this instance manages.
    pub limits: SquadLimits,
    /// Tracing env-filter directive.
    pub log_filter: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load configuration from `fiveside.toml` under `base_dir`. A missing file
/// is not an error; everything has a default.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("fiveside.toml");

    let file: ConfigFile = if path.exists() {
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?
    } else {
        ConfigFile::default()
    };

    let data_dir = default_data_dir();

    let db_path = file
        .storage
        .map(|s| s.path)
        .unwrap_or_else(|| data_dir.join("fiveside.db").to_string_lossy().into_owned());

    let session_cache_path = file
        .session
        .map(|s| s.cache_path)
        .unwrap_or_else(|| data_dir.join("session.json").to_string_lossy().into_owned());

    let defaults = SquadLimits::default();
    let limits = match file.draft {
        Some(d) => SquadLimits {
            budget: d.budget.unwrap_or(defaults.budget),
            max_squad: d.max_squad.unwrap_or(defaults.max_squad),
            max_starters: d.max_starters.unwrap_or(defaults.max_starters),
        },
        None => defaults,
    };

    let log_filter = file
        .log
        .map(|l| l.filter)
        .unwrap_or_else(|| "info".to_string());

    let config = Config {
        db_path,
        session_cache_path,
        limits,
        log_filter,
    };

    validate(&config)?;

    Ok(config)
}

/// Convenience wrapper: loads config relative to the current working
/// directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::ReadError {
        path: PathBuf::from("."),
        message: e.to_string(),
    })?;
    load_config_from(&cwd)
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "fiveside")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.limits.budget == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.budget".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.limits.max_squad == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.max_squad".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.limits.max_starters > config.limits.max_squad {
        return Err(ConfigError::ValidationError {
            field: "draft.max_starters".into(),
            message: format!(
                "must not exceed draft.max_squad ({})",
                config.limits.max_squad
            ),
        });
    }

    if config.db_path.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "storage.path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("fiveside-config-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = temp_dir("missing");
        let config = load_config_from(&dir).unwrap();
        assert_eq!(config.limits, SquadLimits::default());
        assert_eq!(config.log_filter, "info");
        assert!(config.db_path.ends_with("fiveside.db"));
    }

    #[test]
    fn full_file_overrides_everything() {
        let dir = temp_dir("full");
        fs::write(
            dir.join("fiveside.toml"),
            r#"
            [storage]
            path = "/tmp/test.db"

            [session]
            cache_path = "/tmp/session.json"

            [draft]
            budget = 100
            max_squad = 11
            max_starters = 7

            [log]
            filter = "fiveside=debug"
            "#,
        )
        .unwrap();

        let config = load_config_from(&dir).unwrap();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.session_cache_path, "/tmp/session.json");
        assert_eq!(
            config.limits,
            SquadLimits {
                budget: 100,
                max_squad: 11,
                max_starters: 7
            }
        );
        assert_eq!(config.log_filter, "fiveside=debug");
    }

    #[test]
    fn partial_draft_section_keeps_other_defaults() {
        let dir = temp_dir("partial");
        fs::write(dir.join("fiveside.toml"), "[draft]\nbudget = 80\n").unwrap();

        let config = load_config_from(&dir).unwrap();
        assert_eq!(config.limits.budget, 80);
        assert_eq!(config.limits.max_squad, SquadLimits::default().max_squad);
    }

    #[test]
    fn starters_exceeding_squad_is_rejected() {
        let dir = temp_dir("starters");
        fs::write(
            dir.join("fiveside.toml"),
            "[draft]\nmax_squad = 5\nmax_starters = 6\n",
        )
        .unwrap();

        let err = load_config_from(&dir).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "draft.max_starters"
        ));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let dir = temp_dir("budget");
        fs::write(dir.join("fiveside.toml"), "[draft]\nbudget = 0\n").unwrap();
        let err = load_config_from(&dir).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "draft.budget"
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = temp_dir("parse");
        fs::write(dir.join("fiveside.toml"), "[draft\nbudget = ").unwrap();
        let err = load_config_from(&dir).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
