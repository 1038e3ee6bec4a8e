use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::warn;

use super::{
    auth::RemoteAuth,
    config::{Config, StorageBackend, StoreBackend},
    database::RedisStore,
    memory::MemoryStore,
    service::CatalogService,
    storage::{DirectStorage, ObjectStorage, SignedStorage},
    store::CatalogStore,
};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct State {
    pub service: CatalogService,
}

impl State {
    pub async fn new(config: &Config) -> Result<Arc<Self>> {
        // total deadline is enforced per call by the service
        let http = Client::builder()
            .connect_timeout(config.collaborator_timeout.min(CONNECT_TIMEOUT))
            .build()
            .context("Failed to build HTTP client")?;

        let store: Arc<dyn CatalogStore> = match config.store_backend {
            StoreBackend::Redis => Arc::new(
                RedisStore::connect(&config.redis_url)
                    .await
                    .context("Failed to connect to Redis")?,
            ),
            StoreBackend::Memory => {
                warn!("Using in-memory store, catalog is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let storage: Arc<dyn ObjectStorage> = match (config.storage_backend, &config.storage_key) {
            (StorageBackend::Signed, Some(key)) => Arc::new(SignedStorage::new(
                http.clone(),
                &config.storage_url,
                key.clone(),
                config.signed_url_ttl,
            )),
            _ => Arc::new(DirectStorage),
        };

        let auth = Arc::new(RemoteAuth::new(http, &config.auth_url));

        Ok(Self::with_service(CatalogService::new(
            store,
            storage,
            auth,
            config.collaborator_timeout,
        )))
    }

    pub fn with_service(service: CatalogService) -> Arc<Self> {
        Arc::new(Self { service })
    }
}
