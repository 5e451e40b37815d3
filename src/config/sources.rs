use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "BOOKFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/bookfetch.toml";
const ENV_PREFIX: &str = "BOOKFETCH";
const ENV_SEPARATOR: &str = "__";
const EMAIL_ENV_VAR: &str = "BOOKFETCH_EMAIL";
const PASSWORD_ENV_VAR: &str = "BOOKFETCH_PASSWORD";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (explicit path, `BOOKFETCH_CONFIG`, or the default location)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = explicit_path.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    let mut config = load_from_sources(config_path)?;

    load_secrets(&mut config);

    Ok(config)
}

/// Account credentials are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    if let Ok(email) = env::var(EMAIL_ENV_VAR) {
        config.archive.email = Some(email);
    }
    if let Ok(password) = env::var(PASSWORD_ENV_VAR) {
        config.archive.password = Some(password);
    }
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // BOOKFETCH__DOWNLOAD__CONCURRENCY -> download.concurrency
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
