//! # Catalog Store
//!
//! Persistence seam for APKs and categories. [`RedisStore`](crate::database::RedisStore)
//! is the durable implementation, [`MemoryStore`](crate::memory::MemoryStore) backs tests
//! and single-process development.
//!
//! Implementations must make [`CatalogStore::record_download`] atomic: the existence
//! check, the increment and the read of the file location happen as one operation at the
//! store, so concurrent downloads never lose a count.

use async_trait::async_trait;
use catalog::{Apk, ApkId, ApkPatch, Category, CategoryId, DownloadTarget, NewApk};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Unknown category {0}")]
    UnknownCategory(CategoryId),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All APKs in ascending id order, optionally only those in `category`.
    async fn list_apks(&self, category: Option<CategoryId>) -> StoreResult<Vec<Apk>>;

    async fn get_apk(&self, id: ApkId) -> StoreResult<Option<Apk>>;

    /// Fails with [`StoreError::UnknownCategory`] when `new.category_id` names no category.
    /// The check and the write are one operation, so a concurrent category removal cannot
    /// leave a dangling reference.
    async fn create_apk(&self, new: NewApk, now: DateTime<Utc>) -> StoreResult<Apk>;

    /// Returns `None` when `id` does not exist. Never creates a record. A `category_id` in
    /// the patch is checked atomically, as in [`CatalogStore::create_apk`].
    async fn update_apk(
        &self,
        id: ApkId,
        patch: ApkPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Apk>>;

    /// Returns whether a record was removed.
    async fn delete_apk(&self, id: ApkId) -> StoreResult<bool>;

    /// Bumps the download counter by one and returns the file location, or `None` when
    /// `id` does not exist.
    async fn record_download(&self, id: ApkId) -> StoreResult<Option<DownloadTarget>>;

    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    async fn create_category(&self, name: &str) -> StoreResult<Category>;

    /// Removes the category and clears `category_id` on every APK that pointed at it.
    /// Returns the number of APKs that were detached, or `None` if it did not exist.
    async fn delete_category(&self, id: CategoryId) -> StoreResult<Option<usize>>;
}
