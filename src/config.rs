use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::apply::CleanupPolicy;
use crate::export::ImageRequirement;
use crate::manifest::SchemaVersion;

/// Main configuration structure for release-bundle
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReleaseBundleConfig {
    /// Remote store connection
    pub api: ApiConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Defaults for `apply`
    pub apply: ApplyConfig,
    /// Defaults for `create`
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the remote store
    pub url: String,
    /// Path segment of the API version, e.g. `v7`
    pub api_version: String,
    /// API token (can be set via env var)
    pub token: Option<String>,
    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level, used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplyConfig {
    /// Schema used when neither the command line nor the bundle names one
    pub schema: SchemaVersion,
    /// Pause between placeholder releases created by revision backfill
    pub backfill_delay_ms: u64,
    /// Placeholder writes per second; replaces the fixed delay when set
    pub backfill_rate_per_second: Option<u32>,
    /// What to remove from stale releases when forcing a duplicate
    pub cleanup_policy: CleanupPolicy,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExportConfig {
    pub require_images: ImageRequirement,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.balena-cloud.com".to_string(),
            api_version: "v7".to_string(),
            token: None, // Read from env var or .release-bundle-rc
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 20,
            burst_capacity: 10,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            schema: SchemaVersion::default(),
            backfill_delay_ms: 1000,
            backfill_rate_per_second: None,
            cleanup_policy: CleanupPolicy::default(),
        }
    }
}

impl ReleaseBundleConfig {
    /// Load configuration from the current directory.
    ///
    /// Precedence, lowest first:
    /// 1. Default values
    /// 2. Configuration files (release-bundle.toml, .release-bundle-rc)
    /// 3. Environment variables (`RELEASE_BUNDLE__API__URL`, ...)
    pub fn load() -> Result<Self> {
        Self::load_from_dir(Path::new("."))
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("release-bundle.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path).format(FileFormat::Toml));
        }

        let rc_path = dir.join(".release-bundle-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("RELEASE_BUNDLE")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: ReleaseBundleConfig = builder.build()?.try_deserialize()?;

        if loaded.api.token.is_none() {
            if let Ok(token) = std::env::var("RELEASE_BUNDLE_API_TOKEN") {
                loaded.api.token = Some(token);
            }
        }

        Ok(loaded)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ReleaseBundleConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ReleaseBundleConfig::load_env_file();
        ReleaseBundleConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ReleaseBundleConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::debug!("Configuration loaded successfully");
    Ok(())
}
