use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/vidtube.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on token cookies.
    /// Default: true for production safety. Set to false for local
    /// development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Signing secret for access tokens.
    /// Overridden by VIDTUBE_ACCESS_SECRET when set.
    pub access_token_secret: String,

    /// Signing secret for refresh tokens.
    /// Overridden by VIDTUBE_REFRESH_SECRET when set.
    pub refresh_token_secret: String,

    /// Access-token lifetime in minutes. Access tokens are stateless:
    /// once issued they stay valid until this elapses.
    pub access_ttl_minutes: u64,

    /// Refresh-token lifetime in days.
    pub refresh_ttl_days: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: "change-me-access-secret-32-bytes!".to_string(),
            refresh_token_secret: "change-me-refresh-secret-32-byte!".to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_days: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory where stored media (avatars, cover images) lands.
    pub storage_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_path: "media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Environment wins over the config file for signing secrets, so
    /// deployments never need to write them to disk.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("VIDTUBE_ACCESS_SECRET") {
            self.auth.access_token_secret = secret;
        }
        if let Ok(secret) = std::env::var("VIDTUBE_REFRESH_SECRET") {
            self.auth.refresh_token_secret = secret;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("vidtube").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".vidtube").join("config.toml"));
        }

        paths
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.access_token_secret.len() < 32 || self.auth.refresh_token_secret.len() < 32 {
            anyhow::bail!("Token secrets must be at least 32 bytes");
        }

        if self.auth.access_token_secret == self.auth.refresh_token_secret {
            anyhow::bail!("Access and refresh token secrets must differ");
        }

        if self.auth.access_ttl_minutes == 0 || self.auth.refresh_ttl_days == 0 {
            anyhow::bail!("Token lifetimes must be non-zero");
        }

        if self.general.max_db_connections == 0 {
            anyhow::bail!("max_db_connections must be at least 1");
        }

        Ok(())
    }
}
