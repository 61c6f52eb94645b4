//! Configuration for tally
//!
//! CLI arguments with environment variable fallbacks, using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::cache::CacheConfig;
use crate::settings::{DateRangePreset, DEFAULT_CACHE_DURATION_SECS};

/// tally - sales and subscription analytics API
#[derive(Parser, Debug, Clone)]
#[command(name = "tally")]
#[command(about = "Cached sales and subscription reports over a shop database")]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:8090")]
    pub listen: SocketAddr,

    /// Path of the primary shop database (SQLite)
    #[arg(long, env = "PRIMARY_DB", default_value = "tally.db")]
    pub primary_db: PathBuf,

    /// Table prefix of the primary database
    #[arg(long, env = "TABLE_PREFIX", default_value = "wp_")]
    pub table_prefix: String,

    /// Developer config file (TOML). When it enables dev mode, reports run
    /// against the mirror database it names.
    #[arg(long, env = "DEV_CONFIG")]
    pub dev_config: Option<PathBuf>,

    /// Report cache duration in seconds (0 disables caching)
    #[arg(long, env = "CACHE_DURATION", default_value_t = DEFAULT_CACHE_DURATION_SECS)]
    pub cache_duration: u64,

    /// Default dashboard date range (30, 90, 365 or all)
    #[arg(long, env = "DEFAULT_RANGE", default_value = "365")]
    pub default_range: String,

    /// Interval of the expired cache entry purge, in seconds
    #[arg(long, env = "CACHE_PURGE_INTERVAL_SECS", default_value = "60")]
    pub cache_purge_interval_secs: u64,

    /// Create the shop tables in the primary database if missing
    #[arg(long, env = "INIT_SCHEMA", default_value = "false")]
    pub init_schema: bool,

    /// JWT secret for verifying bearer tokens (required unless auth is disabled)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds, for tokens issued by this process
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Disable authentication. Local development only.
    #[arg(long, env = "INSECURE_NO_AUTH", default_value = "false")]
    pub insecure_no_auth: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.insecure_no_auth {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required unless INSECURE_NO_AUTH is set".to_string()),
                Some(secret) if secret.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be text or json, got {}", self.log_format));
        }

        if !self
            .table_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err("TABLE_PREFIX may only contain letters, digits and underscores".to_string());
        }

        Ok(())
    }

    /// Default range preset; unknown values fall back to the last 365 days
    pub fn default_range_preset(&self) -> DateRangePreset {
        DateRangePreset::from_stored(&self.default_range)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default().with_cleanup_interval(self.cache_purge_interval_secs)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["tally"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--insecure-no-auth"]);
        assert_eq!(args.cache_duration, 3600);
        assert_eq!(args.table_prefix, "wp_");
        assert_eq!(args.default_range_preset(), DateRangePreset::Last365Days);
        assert_eq!(args.cache_config().cleanup_interval.as_secs(), 60);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_secret_required() {
        let args = parse(&[]);
        if args.jwt_secret.is_none() && !args.insecure_no_auth {
            assert!(args.validate().is_err());
        }

        let args = parse(&["--jwt-secret", "short"]);
        if !args.insecure_no_auth {
            assert!(args.validate().is_err());
        }
    }

    #[test]
    fn test_bad_prefix_and_format() {
        let args = parse(&["--insecure-no-auth", "--table-prefix", "wp-"]);
        assert!(args.validate().is_err());

        let args = parse(&["--insecure-no-auth", "--log-format", "xml"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_unknown_range_falls_back() {
        let args = parse(&["--insecure-no-auth", "--default-range", "45"]);
        assert_eq!(args.default_range_preset(), DateRangePreset::Last365Days);
    }
}
