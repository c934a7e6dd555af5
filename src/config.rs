//! Configuration for the taskboard server

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,

    /// Restrict every task operation to the owner of the task
    #[serde(default = "default_enforce_ownership")]
    pub enforce_ownership: bool,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskboard.sqlite")
}

/// Upper bound on session lifetime (ten years)
pub const MAX_SESSION_TTL_HOURS: u32 = 24 * 365 * 10;

fn default_session_ttl_hours() -> u32 {
    24 * 7
}

fn default_enforce_ownership() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            enforce_ownership: default_enforce_ownership(),
        }
    }
}

impl AuthConfig {
    /// Session lifetime, capped at [`MAX_SESSION_TTL_HOURS`]
    pub fn session_ttl(&self) -> chrono::Duration {
        let hours = self.session_ttl_hours.min(MAX_SESSION_TTL_HOURS);
        chrono::Duration::hours(i64::from(hours))
    }
}

impl Config {
    /// Default config path
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("TASKBOARD_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Ok(local);
        }

        // Docker default
        let data_config = PathBuf::from("/data/config.toml");
        if data_config.exists() {
            return Ok(data_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("taskboard");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ttl = self.auth.session_ttl_hours;
        if ttl == 0 || ttl > MAX_SESSION_TTL_HOURS {
            bail!(
                "auth.session_ttl_hours must be between 1 and {MAX_SESSION_TTL_HOURS}, got {ttl}"
            );
        }
        Ok(())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let with_comments = format!(
            "# taskboard configuration\n\
             # Every key is optional; omitted keys take the values shown here.\n\n\
             {content}\n\n\
             # enforce_ownership = false lets any logged-in user act on any task.\n"
        );

        std::fs::write(path, with_comments).context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.database.path, PathBuf::from("taskboard.sqlite"));
        assert_eq!(cfg.auth.session_ttl_hours, 168);
        assert!(cfg.auth.enforce_ownership);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [auth]
            enforce_ownership = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert!(!cfg.auth.enforce_ownership);
        assert_eq!(cfg.auth.session_ttl(), chrono::Duration::hours(168));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.server.port = 8181;
        cfg.save_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# taskboard configuration"));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 8181);
    }

    #[test]
    fn out_of_range_session_ttl_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for ttl in [0, u32::MAX] {
            std::fs::write(&path, format!("[auth]\nsession_ttl_hours = {ttl}\n")).unwrap();
            let err = Config::load_from(&path).unwrap_err();
            assert!(err.to_string().contains("session_ttl_hours"), "{err}");
        }
    }

    #[test]
    fn session_ttl_is_capped() {
        let auth = AuthConfig {
            session_ttl_hours: u32::MAX,
            enforce_ownership: true,
        };
        assert_eq!(
            auth.session_ttl(),
            chrono::Duration::hours(i64::from(MAX_SESSION_TTL_HOURS))
        );
    }
}
