use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Direct,
    Signed,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(StorageBackend::Direct),
            "signed" => Ok(StorageBackend::Signed),
            other => Err(format!("unknown storage backend {other:?}")),
        }
    }
}

pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub auth_url: String,
    pub storage_backend: StorageBackend,
    pub storage_url: String,
    pub storage_key: Option<String>,
    pub signed_url_ttl: Duration,
    pub collaborator_timeout: Duration,
    pub cors_max_age: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let storage_backend = try_load("STORAGE_BACKEND", "direct")?;

        let storage_key = match storage_backend {
            StorageBackend::Signed => Some(read_secret("STORAGE_KEY")?),
            StorageBackend::Direct => None,
        };

        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            store_backend: try_load("STORE_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://redis:6379")?,
            auth_url: try_load("AUTH_URL", "http://auth:3000")?,
            storage_backend,
            storage_url: try_load("STORAGE_URL", "http://storage:9000")?,
            storage_key,
            signed_url_ttl: Duration::from_secs(try_load("SIGNED_URL_TTL_SECS", "900")?),
            collaborator_timeout: Duration::from_millis(try_load(
                "COLLABORATOR_TIMEOUT_MS",
                "2000",
            )?),
            cors_max_age: Duration::from_secs(try_load("CORS_MAX_AGE_SECS", "3600")?),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

pub fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(value) => Ok(value),
        Err(e) => bail!("Invalid {key} value {raw:?}: {e}"),
    }
}

/// Docker secret first, then an environment variable of the same name.
fn read_secret(secret_name: &str) -> Result<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(s) => Ok(s.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");

            var(secret_name)
                .map(|s| s.trim().to_string())
                .with_context(|| format!("Secret {secret_name} not found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Redis".parse::<StoreBackend>(), Ok(StoreBackend::Redis));
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert!("postgres".parse::<StoreBackend>().is_err());

        assert_eq!("signed".parse::<StorageBackend>(), Ok(StorageBackend::Signed));
        assert_eq!("DIRECT".parse::<StorageBackend>(), Ok(StorageBackend::Direct));
    }

    #[test]
    fn test_default_used_when_unset() {
        let port: u16 = try_load("HUB_TEST_UNSET_PORT", "1111").unwrap();

        assert_eq!(port, 1111);
    }

    #[test]
    fn test_bad_default_is_error() {
        let result: Result<u16> = try_load("HUB_TEST_UNSET_NUMBER", "many");

        assert!(result.is_err());
    }
}
