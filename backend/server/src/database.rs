//! # Redis
//!
//! Durable catalog store.
//!
//! Core purpose is to hold APK records and categories, and to do the atomic download
//! increments so several server instances can share one catalog.
//!
//! ## Layout
//!
//! - `apk:next_id`: id sequence, `INCR` hands out fresh ids, never reused
//! - `apks`: sorted set of live ids (score = id), gives ordered listing
//! - `apk:{id}`: hash per record, absent optional fields are simply not stored
//! - `category:next_id`: category id sequence
//! - `categories`: hash of category id to name
//!
//! ## Atomicity
//!
//! - Downloads run one Lua script: existence check, `HINCRBY download_count 1`, read of
//!   the file location. No read-modify-write leaves the server.
//! - Updates run one Lua script that refuses to write to a missing key, so an update
//!   racing a delete cannot leave a half record behind.
//! - Create and update check `categoryId` against `categories` inside the same script as
//!   the write, so a category removed in between is never referenced.
//! - Delete is a `MULTI` pipeline over the record hash and the `apks` index.
//! - Timestamps are stored as unix milliseconds.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use catalog::{Apk, ApkId, ApkPatch, Category, CategoryId, DownloadTarget, NewApk};
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, Script, Value,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::{debug, info};

use crate::store::{CatalogStore, StoreError, StoreResult};

pub const APK_SEQUENCE: &str = "apk:next_id";
pub const APK_INDEX: &str = "apks";
pub const APK_PREFIX: &str = "apk:";
pub const CATEGORY_SEQUENCE: &str = "category:next_id";
pub const CATEGORIES: &str = "categories";

const NAME: &str = "name";
const VERSION: &str = "version";
const DESCRIPTION: &str = "description";
const CATEGORY_ID: &str = "category_id";
const FILE_URL: &str = "file_url";
const FILE_KEY: &str = "file_key";
const PHOTO_URL: &str = "photo_url";
const PHOTO_KEY: &str = "photo_key";
const DOWNLOAD_COUNT: &str = "download_count";
const FILE_SIZE: &str = "file_size";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// Scripts answer this when the given category id is not in `categories`.
const UNKNOWN_CATEGORY: i64 = -1;

const CREATE_SCRIPT: &str = r#"
if ARGV[1] ~= '' and redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
    return -1
end
local id = redis.call('INCR', KEYS[2])
redis.call('HSET', ARGV[2] .. id, unpack(ARGV, 3))
redis.call('ZADD', KEYS[3], id, id)
return id
"#;

const UPDATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
if ARGV[1] ~= '' and redis.call('HEXISTS', KEYS[2], ARGV[1]) == 0 then
    return -1
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
return redis.call('HGETALL', KEYS[1])
"#;

const DOWNLOAD_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
local count = redis.call('HINCRBY', KEYS[1], 'download_count', 1)
local location = redis.call('HMGET', KEYS[1], 'file_url', 'file_key')
return {count, location[1], location[2]}
"#;

const DELETE_CATEGORY_SCRIPT: &str = r#"
if redis.call('HDEL', KEYS[1], ARGV[1]) == 0 then
    return -1
end
local detached = 0
for _, id in ipairs(redis.call('ZRANGE', KEYS[2], 0, -1)) do
    local key = ARGV[2] .. id
    if redis.call('HGET', key, 'category_id') == ARGV[1] then
        redis.call('HDEL', key, 'category_id')
        detached = detached + 1
    end
end
return detached
"#;

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis at {redis_url}");

    Ok(connection_manager)
}

pub struct RedisStore {
    connection: ConnectionManager,
    create_script: Script,
    update_script: Script,
    download_script: Script,
    delete_category_script: Script,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            create_script: Script::new(CREATE_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
            download_script: Script::new(DOWNLOAD_SCRIPT),
            delete_category_script: Script::new(DELETE_CATEGORY_SCRIPT),
        }
    }

    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        Ok(Self::new(init_redis(redis_url).await?))
    }
}

pub fn apk_key(id: ApkId) -> String {
    format!("{APK_PREFIX}{id}")
}

fn millis(time: DateTime<Utc>) -> String {
    time.timestamp_millis().to_string()
}

/// Empty when there is nothing to check, the scripts skip the lookup then.
fn category_arg(category_id: Option<CategoryId>) -> String {
    category_id.map(|id| id.to_string()).unwrap_or_default()
}

fn flatten(fields: Vec<(&'static str, String)>) -> Vec<String> {
    fields
        .into_iter()
        .flat_map(|(name, value)| [name.to_string(), value])
        .collect()
}

fn push_opt(fields: &mut Vec<(&'static str, String)>, name: &'static str, value: &Option<String>) {
    if let Some(value) = value {
        fields.push((name, value.clone()));
    }
}

pub fn apk_fields(apk: &Apk) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        (NAME, apk.name.clone()),
        (VERSION, apk.version.clone()),
        (FILE_URL, apk.file_url.clone()),
        (FILE_KEY, apk.file_key.clone()),
        (DOWNLOAD_COUNT, apk.download_count.to_string()),
        (CREATED_AT, millis(apk.created_at)),
        (UPDATED_AT, millis(apk.updated_at)),
    ];

    push_opt(&mut fields, DESCRIPTION, &apk.description);
    push_opt(&mut fields, PHOTO_URL, &apk.photo_url);
    push_opt(&mut fields, PHOTO_KEY, &apk.photo_key);
    if let Some(category_id) = apk.category_id {
        fields.push((CATEGORY_ID, category_id.to_string()));
    }
    if let Some(file_size) = apk.file_size {
        fields.push((FILE_SIZE, file_size.to_string()));
    }

    fields
}

/// Flattened `field value field value ...` arguments for the update script.
pub fn patch_args(patch: &ApkPatch, now: DateTime<Utc>) -> Vec<String> {
    let mut fields = vec![(UPDATED_AT, millis(now))];

    push_opt(&mut fields, NAME, &patch.name);
    push_opt(&mut fields, VERSION, &patch.version);
    push_opt(&mut fields, DESCRIPTION, &patch.description);
    push_opt(&mut fields, FILE_URL, &patch.file_url);
    push_opt(&mut fields, FILE_KEY, &patch.file_key);
    push_opt(&mut fields, PHOTO_URL, &patch.photo_url);
    push_opt(&mut fields, PHOTO_KEY, &patch.photo_key);
    if let Some(category_id) = patch.category_id {
        fields.push((CATEGORY_ID, category_id.to_string()));
    }
    if let Some(file_size) = patch.file_size {
        fields.push((FILE_SIZE, file_size.to_string()));
    }

    flatten(fields)
}

pub fn apk_from_fields(id: ApkId, mut fields: HashMap<String, String>) -> StoreResult<Apk> {
    let key = apk_key(id);

    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.clone(),
        reason,
    };

    let mut take = |name: &str| -> StoreResult<String> {
        fields
            .remove(name)
            .ok_or_else(|| corrupt(format!("missing {name}")))
    };

    let name = take(NAME)?;
    let version = take(VERSION)?;
    let file_url = take(FILE_URL)?;
    let file_key = take(FILE_KEY)?;
    let download_count = take(DOWNLOAD_COUNT)?;
    let created_at = take(CREATED_AT)?;
    let updated_at = take(UPDATED_AT)?;

    let number = |name: &str, raw: &str| -> StoreResult<u64> {
        raw.parse()
            .map_err(|e| corrupt(format!("bad {name} {raw:?}: {e}")))
    };

    let timestamp = |name: &str, raw: &str| -> StoreResult<DateTime<Utc>> {
        raw.parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| corrupt(format!("bad {name} {raw:?}")))
    };

    Ok(Apk {
        id,
        name,
        version,
        description: fields.remove(DESCRIPTION),
        category_id: fields
            .remove(CATEGORY_ID)
            .map(|raw| number(CATEGORY_ID, &raw))
            .transpose()?,
        file_url,
        file_key,
        photo_url: fields.remove(PHOTO_URL),
        photo_key: fields.remove(PHOTO_KEY),
        download_count: number(DOWNLOAD_COUNT, &download_count)?,
        file_size: fields
            .remove(FILE_SIZE)
            .map(|raw| number(FILE_SIZE, &raw))
            .transpose()?,
        created_at: timestamp(CREATED_AT, &created_at)?,
        updated_at: timestamp(UPDATED_AT, &updated_at)?,
    })
}

#[async_trait]
impl CatalogStore for RedisStore {
    async fn list_apks(&self, category: Option<CategoryId>) -> StoreResult<Vec<Apk>> {
        let mut conn = self.connection.clone();

        let ids: Vec<ApkId> = conn.zrange(APK_INDEX, 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(apk_key(*id));
        }
        let records: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut apks = Vec::with_capacity(ids.len());
        for (id, fields) in ids.into_iter().zip(records) {
            // deleted between the index read and the fetch
            if fields.is_empty() {
                continue;
            }

            let apk = apk_from_fields(id, fields)?;
            if category.is_none() || apk.category_id == category {
                apks.push(apk);
            }
        }

        Ok(apks)
    }

    async fn get_apk(&self, id: ApkId) -> StoreResult<Option<Apk>> {
        let mut conn = self.connection.clone();

        let fields: HashMap<String, String> = conn.hgetall(apk_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        apk_from_fields(id, fields).map(Some)
    }

    async fn create_apk(&self, new: NewApk, now: DateTime<Utc>) -> StoreResult<Apk> {
        let mut conn = self.connection.clone();

        // the id is handed out by the script, fields do not depend on it
        let mut apk = Apk::from_new(0, new, now);

        let id: i64 = self
            .create_script
            .key(CATEGORIES)
            .key(APK_SEQUENCE)
            .key(APK_INDEX)
            .arg(category_arg(apk.category_id))
            .arg(APK_PREFIX)
            .arg(flatten(apk_fields(&apk)))
            .invoke_async(&mut conn)
            .await?;

        match (id, apk.category_id) {
            (UNKNOWN_CATEGORY, Some(category_id)) => {
                Err(StoreError::UnknownCategory(category_id))
            }
            _ => {
                apk.id = ApkId::try_from(id).map_err(|e| StoreError::Corrupt {
                    key: APK_SEQUENCE.to_string(),
                    reason: format!("bad id {id}: {e}"),
                })?;

                debug!("Stored apk {}", apk.id);

                Ok(apk)
            }
        }
    }

    async fn update_apk(
        &self,
        id: ApkId,
        patch: ApkPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Apk>> {
        let mut conn = self.connection.clone();

        let reply: Value = self
            .update_script
            .key(apk_key(id))
            .key(CATEGORIES)
            .arg(category_arg(patch.category_id))
            .arg(patch_args(&patch, now))
            .invoke_async(&mut conn)
            .await?;

        match (reply, patch.category_id) {
            (Value::Nil, _) => Ok(None),
            (Value::Int(UNKNOWN_CATEGORY), Some(category_id)) => {
                Err(StoreError::UnknownCategory(category_id))
            }
            (fields, _) => apk_from_fields(id, redis::from_redis_value(&fields)?).map(Some),
        }
    }

    async fn delete_apk(&self, id: ApkId) -> StoreResult<bool> {
        let mut conn = self.connection.clone();

        let (deleted, _unindexed): (u64, u64) = redis::pipe()
            .atomic()
            .del(apk_key(id))
            .zrem(APK_INDEX, id)
            .query_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }

    async fn record_download(&self, id: ApkId) -> StoreResult<Option<DownloadTarget>> {
        let mut conn = self.connection.clone();

        let location: Option<(u64, String, String)> = self
            .download_script
            .key(apk_key(id))
            .invoke_async(&mut conn)
            .await?;

        Ok(location.map(|(download_count, file_url, file_key)| DownloadTarget {
            file_url,
            file_key,
            download_count,
        }))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut conn = self.connection.clone();

        let raw: HashMap<String, String> = conn.hgetall(CATEGORIES).await?;

        let mut categories = raw
            .into_iter()
            .map(|(id, name)| {
                let id = id.parse().map_err(|e| StoreError::Corrupt {
                    key: CATEGORIES.to_string(),
                    reason: format!("bad id {id:?}: {e}"),
                })?;

                Ok(Category { id, name })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        categories.sort_by_key(|category| category.id);

        Ok(categories)
    }

    async fn create_category(&self, name: &str) -> StoreResult<Category> {
        let mut conn = self.connection.clone();

        let id: CategoryId = conn.incr(CATEGORY_SEQUENCE, 1).await?;
        let _: () = conn.hset(CATEGORIES, id, name).await?;

        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<Option<usize>> {
        let mut conn = self.connection.clone();

        let detached: i64 = self
            .delete_category_script
            .key(CATEGORIES)
            .key(APK_INDEX)
            .arg(id)
            .arg(APK_PREFIX)
            .invoke_async(&mut conn)
            .await?;

        Ok(usize::try_from(detached).ok())
    }
}
