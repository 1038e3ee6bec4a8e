//! # Catalog Operations
//!
//! Every operation the HTTP layer exposes, independent of transport.
//!
//! - Reads are open to everyone, mutations call [`Identity::require_admin`] first
//! - Ids are checked before touching the store, `0` is a validation error
//! - Each collaborator call runs under the configured deadline via [`bounded`]
//! - Deleting a missing id reports `NotFound` every time

use std::{sync::Arc, time::Duration};

use catalog::{Apk, ApkId, ApkPatch, Category, CategoryId, CreateApk, check_id};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::{
    auth::{AuthProvider, Credentials, Identity},
    error::{AppError, Collaborator},
    storage::ObjectStorage,
    store::CatalogStore,
    utils::bounded,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Download {
    pub url: String,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    storage: Arc<dyn ObjectStorage>,
    auth: Arc<dyn AuthProvider>,
    timeout: Duration,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            auth,
            timeout,
        }
    }

    pub async fn identify(&self, credentials: &Credentials) -> Result<Identity, AppError> {
        bounded(
            Collaborator::Auth,
            self.timeout,
            self.auth.identify(credentials),
        )
        .await
    }

    pub async fn list(&self, category: Option<CategoryId>) -> Result<Vec<Apk>, AppError> {
        bounded(
            Collaborator::Database,
            self.timeout,
            self.store.list_apks(category),
        )
        .await
    }

    pub async fn get(&self, id: ApkId) -> Result<Apk, AppError> {
        let id = check_id(id)?;

        bounded(Collaborator::Database, self.timeout, self.store.get_apk(id))
            .await?
            .ok_or(AppError::NotFound(id))
    }

    pub async fn create(&self, identity: &Identity, input: CreateApk) -> Result<Apk, AppError> {
        identity.require_admin()?;

        let new = input.validate()?;

        let apk = bounded(
            Collaborator::Database,
            self.timeout,
            self.store.create_apk(new, Utc::now()),
        )
        .await?;

        info!("Created apk {} ({} {})", apk.id, apk.name, apk.version);

        Ok(apk)
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: ApkId,
        patch: ApkPatch,
    ) -> Result<Apk, AppError> {
        identity.require_admin()?;

        let id = check_id(id)?;
        let patch = patch.validate()?;

        let apk = bounded(
            Collaborator::Database,
            self.timeout,
            self.store.update_apk(id, patch, Utc::now()),
        )
        .await?
        .ok_or(AppError::NotFound(id))?;

        info!("Updated apk {id}");

        Ok(apk)
    }

    pub async fn delete(&self, identity: &Identity, id: ApkId) -> Result<(), AppError> {
        identity.require_admin()?;

        let id = check_id(id)?;
        let deleted = bounded(
            Collaborator::Database,
            self.timeout,
            self.store.delete_apk(id),
        )
        .await?;

        if !deleted {
            return Err(AppError::NotFound(id));
        }

        info!("Deleted apk {id}");

        Ok(())
    }

    pub async fn download(&self, id: ApkId) -> Result<Download, AppError> {
        let id = check_id(id)?;

        let target = bounded(
            Collaborator::Database,
            self.timeout,
            self.store.record_download(id),
        )
        .await?
        .ok_or(AppError::NotFound(id))?;

        let url = bounded(
            Collaborator::Storage,
            self.timeout,
            self.storage.download_url(&target),
        )
        .await?;

        info!("Download #{} of apk {id}", target.download_count);

        Ok(Download { url })
    }

    pub async fn categories(&self) -> Result<Vec<Category>, AppError> {
        bounded(
            Collaborator::Database,
            self.timeout,
            self.store.list_categories(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use catalog::{DownloadTarget, ValidationError};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        auth::{RemoteAuth, Role, User},
        memory::MemoryStore,
        storage::DirectStorage,
    };

    struct NoAuth;

    #[async_trait]
    impl AuthProvider for NoAuth {
        async fn identify(&self, _: &Credentials) -> Result<Identity, AppError> {
            Ok(Identity::Anonymous)
        }
    }

    struct SlowStorage;

    #[async_trait]
    impl ObjectStorage for SlowStorage {
        async fn download_url(&self, target: &DownloadTarget) -> Result<String, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(target.file_url.clone())
        }
    }

    fn service_with(store: Arc<MemoryStore>, storage: Arc<dyn ObjectStorage>) -> CatalogService {
        CatalogService::new(store, storage, Arc::new(NoAuth), Duration::from_secs(2))
    }

    fn service() -> (CatalogService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (service_with(store.clone(), Arc::new(DirectStorage)), store)
    }

    fn admin() -> Identity {
        Identity::User(User {
            id: "admin".into(),
            name: Some("Admin".into()),
            role: Role::Admin,
        })
    }

    fn member() -> Identity {
        Identity::User(User {
            id: "member".into(),
            name: None,
            role: Role::User,
        })
    }

    fn maps() -> CreateApk {
        CreateApk {
            name: Some("Maps".into()),
            version: Some("1.2.0".into()),
            file_url: Some("https://x/maps.apk".into()),
            file_key: Some("k1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_maps_scenario() {
        let (service, _) = service();

        let apk = service.create(&admin(), maps()).await.unwrap();
        assert_eq!(apk.id, 1);
        assert_eq!(apk.download_count, 0);

        for _ in 0..3 {
            let download = service.download(1).await.unwrap();
            assert_eq!(download.url, "https://x/maps.apk");
        }

        assert_eq!(service.get(1).await.unwrap().download_count, 3);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (service, _) = service();

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(service.create(&admin(), maps()).await.unwrap().id);
        }
        service.delete(&admin(), ids[4]).await.unwrap();
        ids.push(service.create(&admin(), maps()).await.unwrap().id);

        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[tokio::test]
    async fn test_update_name_keeps_other_fields() {
        let (service, _) = service();
        let input = CreateApk {
            description: Some("Offline maps".into()),
            photo_url: Some("https://x/maps.png".into()),
            ..maps()
        };
        let before = service.create(&admin(), input).await.unwrap();
        service.download(before.id).await.unwrap();
        let before = service.get(before.id).await.unwrap();

        let patch = ApkPatch {
            name: Some("X".into()),
            ..Default::default()
        };
        service.update(&admin(), before.id, patch).await.unwrap();

        let after = service.get(before.id).await.unwrap();
        assert_eq!(
            after,
            Apk {
                name: "X".into(),
                updated_at: after.updated_at,
                ..before
            }
        );
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (service, store) = service();

        let result = service.update(&admin(), 42, ApkPatch::default()).await;

        assert!(matches!(result, Err(AppError::NotFound(42))));
        assert!(store.list_apks(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let (service, _) = service();
        let apk = service.create(&admin(), maps()).await.unwrap();

        service.delete(&admin(), apk.id).await.unwrap();

        assert!(matches!(service.get(apk.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            service.delete(&admin(), apk.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_downloads_all_counted() {
        let (service, _) = service();
        let id = service.create(&admin(), maps()).await.unwrap().id;

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.download(id).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(service.get(id).await.unwrap().download_count, 64);
    }

    #[tokio::test]
    async fn test_create_without_file_url() {
        let (service, store) = service();
        let input = CreateApk {
            file_url: None,
            ..maps()
        };

        let result = service.create(&admin(), input).await;

        assert!(matches!(
            result,
            Err(AppError::Validation(ValidationError::MissingField("fileUrl")))
        ));
        assert!(store.list_apks(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_mutations_rejected() {
        let (service, store) = service();
        let apk = service.create(&admin(), maps()).await.unwrap();
        let before = store.list_apks(None).await.unwrap();

        for identity in [member(), Identity::Anonymous] {
            assert!(matches!(
                service.create(&identity, maps()).await,
                Err(AppError::Unauthorized)
            ));
            assert!(matches!(
                service
                    .update(
                        &identity,
                        apk.id,
                        ApkPatch {
                            name: Some("Hijacked".into()),
                            ..Default::default()
                        }
                    )
                    .await,
                Err(AppError::Unauthorized)
            ));
            assert!(matches!(
                service.delete(&identity, apk.id).await,
                Err(AppError::Unauthorized)
            ));
        }

        assert_eq!(store.list_apks(None).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_category_rejected() {
        let (service, store) = service();
        let games = store.create_category("Games").await.unwrap();

        let input = CreateApk {
            category_id: Some(games.id + 1),
            ..maps()
        };
        assert!(matches!(
            service.create(&admin(), input).await,
            Err(AppError::Validation(ValidationError::UnknownCategory(_)))
        ));

        let input = CreateApk {
            category_id: Some(games.id),
            ..maps()
        };
        let apk = service.create(&admin(), input).await.unwrap();
        assert_eq!(apk.category_id, Some(games.id));
        assert_eq!(service.list(Some(games.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_id_is_validation_error() {
        let (service, _) = service();

        assert!(matches!(
            service.get(0).await,
            Err(AppError::Validation(ValidationError::InvalidId))
        ));
        assert!(matches!(
            service.download(0).await,
            Err(AppError::Validation(ValidationError::InvalidId))
        ));
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let (service, _) = service();

        assert!(matches!(
            service.download(3).await,
            Err(AppError::NotFound(3))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_storage_times_out() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, Arc::new(SlowStorage));
        let apk = service.create(&admin(), maps()).await.unwrap();

        assert!(matches!(
            service.download(apk.id).await,
            Err(AppError::Timeout(Collaborator::Storage))
        ));
    }

    #[tokio::test]
    async fn test_auth_deadline_reported_as_timeout() {
        let deadline = Duration::from_millis(150);
        let client = reqwest::Client::builder().timeout(deadline).build().unwrap();
        let base_url = crate::auth::tests::silent_server().await;
        let service = CatalogService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DirectStorage),
            Arc::new(RemoteAuth::new(client, &base_url)),
            deadline,
        );
        let credentials = Credentials {
            authorization: Some("Bearer abc".into()),
            cookie: None,
        };

        for _ in 0..5 {
            assert!(matches!(
                service.identify(&credentials).await,
                Err(AppError::Timeout(Collaborator::Auth))
            ));
        }
    }
}
