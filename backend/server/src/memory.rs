//! Process-local store. Only valid while a single server instance owns the catalog.

use std::collections::BTreeMap;

use async_trait::async_trait;
use catalog::{Apk, ApkId, ApkPatch, Category, CategoryId, DownloadTarget, NewApk};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::store::{CatalogStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    next_apk_id: ApkId,
    next_category_id: CategoryId,
    apks: BTreeMap<ApkId, Apk>,
    categories: BTreeMap<CategoryId, Category>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn check_category(&self, category_id: Option<CategoryId>) -> StoreResult<()> {
        match category_id {
            Some(id) if !self.categories.contains_key(&id) => {
                Err(StoreError::UnknownCategory(id))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_apks(&self, category: Option<CategoryId>) -> StoreResult<Vec<Apk>> {
        let inner = self.inner.lock();

        Ok(inner
            .apks
            .values()
            .filter(|apk| category.is_none() || apk.category_id == category)
            .cloned()
            .collect())
    }

    async fn get_apk(&self, id: ApkId) -> StoreResult<Option<Apk>> {
        Ok(self.inner.lock().apks.get(&id).cloned())
    }

    async fn create_apk(&self, new: NewApk, now: DateTime<Utc>) -> StoreResult<Apk> {
        let mut inner = self.inner.lock();
        inner.check_category(new.category_id)?;

        inner.next_apk_id += 1;
        let apk = Apk::from_new(inner.next_apk_id, new, now);
        inner.apks.insert(apk.id, apk.clone());

        Ok(apk)
    }

    async fn update_apk(
        &self,
        id: ApkId,
        patch: ApkPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Apk>> {
        let mut inner = self.inner.lock();
        if !inner.apks.contains_key(&id) {
            return Ok(None);
        }
        inner.check_category(patch.category_id)?;

        Ok(inner.apks.get_mut(&id).map(|apk| {
            apk.apply(patch, now);
            apk.clone()
        }))
    }

    async fn delete_apk(&self, id: ApkId) -> StoreResult<bool> {
        Ok(self.inner.lock().apks.remove(&id).is_some())
    }

    async fn record_download(&self, id: ApkId) -> StoreResult<Option<DownloadTarget>> {
        let mut inner = self.inner.lock();

        Ok(inner.apks.get_mut(&id).map(|apk| {
            apk.download_count += 1;

            DownloadTarget {
                file_url: apk.file_url.clone(),
                file_key: apk.file_key.clone(),
                download_count: apk.download_count,
            }
        }))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.inner.lock().categories.values().cloned().collect())
    }

    async fn create_category(&self, name: &str) -> StoreResult<Category> {
        let mut inner = self.inner.lock();

        inner.next_category_id += 1;
        let category = Category {
            id: inner.next_category_id,
            name: name.to_string(),
        };
        inner.categories.insert(category.id, category.clone());

        Ok(category)
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<Option<usize>> {
        let mut inner = self.inner.lock();

        if inner.categories.remove(&id).is_none() {
            return Ok(None);
        }

        let mut detached = 0;
        for apk in inner.apks.values_mut() {
            if apk.category_id == Some(id) {
                apk.category_id = None;
                detached += 1;
            }
        }

        Ok(Some(detached))
    }
}
