use std::path::{Path, PathBuf};

/// Box office configuration
///
/// # Environment variables
///
/// Every field can be overridden from the environment:
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | WORK_DIR | /var/lib/box-office | Working directory (database, logs) |
/// | DATABASE_PATH | orders.redb | Database file, relative to WORK_DIR unless absolute |
/// | LOG_LEVEL | info | tracing level |
/// | LOG_DIR | (unset) | Daily rolling log files when set |
/// | LOG_JSON | false | JSON log lines |
/// | ENVIRONMENT | development | development / staging / production |
/// | GATEWAY_API_BASE | https://api.stripe.com | Payment gateway REST base URL |
/// | GATEWAY_API_VERSION | 2020-08-27 | Pinned gateway API version |
/// | GATEWAY_TIMEOUT_MS | 30000 | Gateway request timeout (ms) |
/// | GATEWAY_WEBHOOK_SECRET | (unset) | Signing secret for inbound webhooks |
/// | EXCHANGE_RATES_PATH | (unset) | JSON rate table; no conversions when unset |
/// | DEFERRED_MAX_RETRIES | 3 | Attempts per deferred job before giving up |
/// | AGGREGATE_TTL_SECS | 300 | Age after which cached event aggregates are dropped |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/box-office LOG_LEVEL=debug cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for the database and logs
    pub work_dir: String,
    pub database_path: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub log_json: bool,
    /// development | staging | production
    pub environment: String,

    // === Payment gateway ===
    pub gateway_api_base: String,
    pub gateway_api_version: String,
    pub gateway_timeout_ms: u64,
    pub webhook_secret: Option<String>,

    pub exchange_rates_path: Option<String>,
    pub deferred_max_retries: u32,
    pub aggregate_ttl_secs: u64,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Unset variables fall back to defaults.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/box-office".into()),
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "orders.redb".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            log_json: std::env::var("LOG_JSON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            gateway_api_base: std::env::var("GATEWAY_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            gateway_api_version: std::env::var("GATEWAY_API_VERSION")
                .unwrap_or_else(|_| "2020-08-27".into()),
            gateway_timeout_ms: std::env::var("GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30000),
            webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),

            exchange_rates_path: std::env::var("EXCHANGE_RATES_PATH")
                .ok()
                .filter(|s| !s.is_empty()),
            deferred_max_retries: std::env::var("DEFERRED_MAX_RETRIES")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            aggregate_ttl_secs: std::env::var("AGGREGATE_TTL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),
        }
    }

    /// Override the storage location
    ///
    /// Mostly used by tests.
    pub fn with_overrides(work_dir: impl Into<String>, database_path: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.database_path = database_path.into();
        config
    }

    /// Resolved database file
    pub fn database_file(&self) -> PathBuf {
        let path = Path::new(&self.database_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.work_dir).join(path)
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_file_relative_to_work_dir() {
        let config = Config::with_overrides("/tmp/bo", "orders.redb");
        assert_eq!(config.database_file(), PathBuf::from("/tmp/bo/orders.redb"));

        let config = Config::with_overrides("/tmp/bo", "/data/orders.redb");
        assert_eq!(config.database_file(), PathBuf::from("/data/orders.redb"));
    }

    #[test]
    fn test_environment_helpers() {
        let mut config = Config::with_overrides("/tmp", "db.redb");
        config.environment = "production".into();
        assert!(config.is_production());
        assert!(!config.is_development());
    }
}
