use serde::Deserialize;

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub apple: AppleConfig,
    pub application: ApplicationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expiration_minutes: u64,
}

/// App Store Server API credentials. All three of issuer_id / key_id /
/// private_key_pem must be present before any outbound call is attempted.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleConfig {
    #[serde(default)]
    pub issuer_id: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    /// PKCS#8 PEM body of the .p8 signing key downloaded from App Store
    /// Connect.
    #[serde(default)]
    pub private_key_pem: Option<String>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Include raw error detail in responses. Off in production: detail can
    /// carry upstream bodies and operator paths.
    #[serde(default)]
    pub debug_errors: bool,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("SUBSTATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl AppleConfig {
    /// Resolve the credential triple, failing before any network call when
    /// one is absent.
    pub fn credentials(&self) -> Result<(&str, &str, &str)> {
        let issuer_id = self
            .issuer_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Configuration("apple.issuer_id is not set".to_string()))?;
        let key_id = self
            .key_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Configuration("apple.key_id is not set".to_string()))?;
        let pem = self
            .private_key_pem
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ApiError::Configuration("apple.private_key_pem is not set".to_string())
            })?;

        Ok((issuer_id, key_id, pem))
    }
}
