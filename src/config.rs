use crate::auth::jwt::JwtConfig;
use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_REGION: &str = "ca-central-1";
const DEFAULT_JWT_EXPIRY_HOURS: i64 = 168;
const DEFAULT_JWT_SHORT_EXPIRY_HOURS: i64 = 24;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where memes, users and images are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// DynamoDB tables and an S3 bucket.
    Aws,
    /// Process memory; everything is lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(StoreBackend::Aws),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("expected 'aws' or 'memory', got '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store_backend: StoreBackend,
    /// Empty when the memory backend is selected.
    pub meme_bucket_name: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub memes_table: String,
    pub users_table: String,
    pub user_identities_table: String,
    pub jwt: JwtConfig,
    /// TTF/OTF used for captions on the server-side render.
    pub font_path: Option<PathBuf>,
    /// Prefix for the URLs of uploaded images, e.g. `https://memes.example.com`.
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables, reading `.env` first
    /// when one is present.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!(".env file loaded from path: {}", path.display()),
            Err(e) if e.not_found() => tracing::debug!(".env file not found, relying on environment variables"),
            Err(e) => return Err(e.into()),
        }
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let hours = |key: &str, raw: String| -> Result<i64, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::InvalidVar(key.into(), e.to_string()))
        };

        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let store_backend = match var("STORE_BACKEND") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidVar("STORE_BACKEND".into(), e))?,
            None => StoreBackend::Aws,
        };

        let meme_bucket_name = match (var("MEME_BUCKET_NAME"), store_backend) {
            (Some(name), _) => name,
            (None, StoreBackend::Memory) => String::new(),
            (None, StoreBackend::Aws) => return Err(ConfigError::MissingVar("MEME_BUCKET_NAME".into())),
        };

        let secret = var("JWT_SECRET").ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".into()))?;
        let standard_expiry_hours = match var("JWT_EXPIRY_HOURS") {
            Some(raw) => hours("JWT_EXPIRY_HOURS", raw)?,
            None => DEFAULT_JWT_EXPIRY_HOURS,
        };
        let short_expiry_hours = match var("JWT_SHORT_EXPIRY_HOURS") {
            Some(raw) => hours("JWT_SHORT_EXPIRY_HOURS", raw)?,
            None => DEFAULT_JWT_SHORT_EXPIRY_HOURS,
        };

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidVar("MAX_UPLOAD_BYTES".into(), e.to_string())
                })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{bind_address}"))
            .trim_end_matches('/')
            .to_string();

        Ok(Config {
            bind_address,
            store_backend,
            meme_bucket_name,
            aws_region: var("AWS_DEFAULT_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            localstack_endpoint: var("AWS_ENDPOINT_URL"),
            memes_table: var("MEMES_TABLE").unwrap_or_else(|| "memes".to_string()),
            users_table: var("USERS_TABLE").unwrap_or_else(|| "users".to_string()),
            user_identities_table: var("USER_IDENTITIES_TABLE").unwrap_or_else(|| "user_identities".to_string()),
            jwt: JwtConfig {
                secret,
                standard_expiry_hours,
                short_expiry_hours,
            },
            font_path: var("MEME_FONT_PATH").map(PathBuf::from),
            public_base_url,
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn memory_backend_needs_only_a_secret() {
        let config = config(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.jwt.standard_expiry_hours, 168);
        assert_eq!(config.jwt.short_expiry_hours, 24);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.memes_table, "memes");
        assert_eq!(config.public_base_url, "http://0.0.0.0:3000");
    }

    #[test]
    fn aws_backend_requires_a_bucket() {
        assert_matches!(
            config(&[("JWT_SECRET", "s3cret")]),
            Err(ConfigError::MissingVar(var)) if var == "MEME_BUCKET_NAME"
        );
        let config = config(&[("JWT_SECRET", "s3cret"), ("MEME_BUCKET_NAME", "memes-bucket")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Aws);
        assert_eq!(config.aws_region, "ca-central-1");
    }

    #[test]
    fn missing_secret_and_bad_numbers_are_errors() {
        assert_matches!(
            config(&[("STORE_BACKEND", "memory")]),
            Err(ConfigError::MissingVar(var)) if var == "JWT_SECRET"
        );
        assert_matches!(
            config(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", "x"), ("JWT_EXPIRY_HOURS", "week")]),
            Err(ConfigError::InvalidVar(var, _)) if var == "JWT_EXPIRY_HOURS"
        );
        assert_matches!(
            config(&[("STORE_BACKEND", "cloud"), ("JWT_SECRET", "x")]),
            Err(ConfigError::InvalidVar(var, _)) if var == "STORE_BACKEND"
        );
    }

    #[test]
    fn public_base_url_loses_its_trailing_slash() {
        let config = config(&[
            ("STORE_BACKEND", "memory"),
            ("JWT_SECRET", "x"),
            ("PUBLIC_BASE_URL", "https://memes.example.com/"),
        ])
        .unwrap();
        assert_eq!(config.public_base_url, "https://memes.example.com");
    }
}
