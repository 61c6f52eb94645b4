//! Developer configuration for the mirror store
//!
//! The config file is optional. When it exists and sets `dev_mode = true`,
//! reports run against a mirror of the production data instead of the
//! primary store. The file is re-read on every check so dev mode can be
//! toggled without a restart.
//!
//! ```toml
//! dev_mode = true
//! db_host = "127.0.0.1"
//! db_port = 3307
//! db_name = "/var/lib/tally/mirror.db"
//! db_user = "readonly"
//! db_password = "secret"
//! db_prefix = "wp_"
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

use crate::types::Result;

/// Mirror connection parameters
#[derive(Clone, Default, Deserialize)]
pub struct DevConfig {
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default = "default_host", rename = "db_host")]
    pub host: String,
    #[serde(default, rename = "db_port")]
    pub port: Option<u16>,
    /// Database name; the SQLite connector treats it as a file path
    #[serde(default, rename = "db_name")]
    pub database: String,
    #[serde(default, rename = "db_user")]
    pub user: String,
    #[serde(default, rename = "db_password")]
    pub password: String,
    #[serde(default, rename = "db_prefix")]
    pub table_prefix: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl DevConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Table prefix to use in dev mode, if one is set and non-empty
    pub fn prefix(&self) -> Option<&str> {
        self.table_prefix.as_deref().filter(|p| !p.is_empty())
    }
}

impl fmt::Debug for DevConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevConfig")
            .field("dev_mode", &self.dev_mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("table_prefix", &self.table_prefix)
            .finish()
    }
}

/// Where the developer config comes from
pub trait DevConfigSource: Send + Sync {
    /// Current config, or `None` when there is none
    fn load(&self) -> Option<DevConfig>;
}

/// TOML file re-read on every call
#[derive(Debug, Clone)]
pub struct FileDevConfig {
    path: PathBuf,
}

impl FileDevConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DevConfigSource for FileDevConfig {
    fn load(&self) -> Option<DevConfig> {
        if !self.path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read dev config");
                return None;
            }
        };

        match DevConfig::from_toml(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Invalid dev config, dev mode disabled");
                None
            }
        }
    }
}

/// In-process config, settable at runtime. Used when no config file is
/// configured, and by tests.
#[derive(Debug, Default)]
pub struct StaticDevConfig {
    config: RwLock<Option<DevConfig>>,
}

impl StaticDevConfig {
    /// No config at all; dev mode is off
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(config: DevConfig) -> Self {
        Self {
            config: RwLock::new(Some(config)),
        }
    }

    pub fn set(&self, config: Option<DevConfig>) {
        if let Ok(mut guard) = self.config.write() {
            *guard = config;
        }
    }

    /// Flip dev mode, creating an empty config if none is set
    pub fn set_dev_mode(&self, enabled: bool) {
        if let Ok(mut guard) = self.config.write() {
            guard.get_or_insert_with(DevConfig::default).dev_mode = enabled;
        }
    }
}

impl DevConfigSource for StaticDevConfig {
    fn load(&self) -> Option<DevConfig> {
        self.config.read().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let config = DevConfig::from_toml(
            r#"
            dev_mode = true
            db_host = "127.0.0.1"
            db_port = 3307
            db_name = "mirror.db"
            db_user = "reader"
            db_password = "hunter2"
            db_prefix = "live_"
            "#,
        )
        .unwrap();

        assert!(config.dev_mode);
        assert_eq!(config.port, Some(3307));
        assert_eq!(config.database, "mirror.db");
        assert_eq!(config.prefix(), Some("live_"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_defaults() {
        let config = DevConfig::from_toml("").unwrap();
        assert!(!config.dev_mode);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.prefix(), None);
    }

    #[test]
    fn test_file_source_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.toml");
        let source = FileDevConfig::new(&path);

        assert!(source.load().is_none());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "dev_mode = true").unwrap();
        drop(file);
        assert!(source.load().map(|c| c.dev_mode).unwrap_or(false));

        std::fs::write(&path, "dev_mode = false\n").unwrap();
        assert!(!source.load().map(|c| c.dev_mode).unwrap_or(false));

        std::fs::write(&path, "dev_mode = [not toml").unwrap();
        assert!(source.load().is_none());
    }

    #[test]
    fn test_static_source_toggle() {
        let source = StaticDevConfig::disabled();
        assert!(source.load().is_none());
        source.set_dev_mode(true);
        assert!(source.load().unwrap().dev_mode);
        source.set(None);
        assert!(source.load().is_none());
    }
}
