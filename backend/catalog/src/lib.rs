//! # Catalog
//!
//! Records shared between the server and the seed tool.
//!
//! ## Records
//! - [`Apk`]: one downloadable package. `download_count` only ever goes up, and only
//!   through the store's atomic increment.
//! - [`Category`]: a label that APKs may point at. APKs hold the reference, categories
//!   own nothing.
//!
//! ## Inputs
//! - [`CreateApk`]: raw create payload. Every field is optional on the wire so that a
//!   missing `fileUrl` surfaces as a [`ValidationError`] instead of a decode failure.
//!   [`CreateApk::validate`] turns it into a [`NewApk`].
//! - [`ApkPatch`]: partial update, absent fields are left alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ApkId = u64;
pub type CategoryId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Apk {
    pub id: ApkId,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub file_url: String,
    pub file_key: String,
    pub photo_url: Option<String>,
    pub photo_key: Option<String>,
    pub download_count: u64,
    pub file_size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Apk {
    pub fn from_new(id: ApkId, new: NewApk, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            version: new.version,
            description: new.description,
            category_id: new.category_id,
            file_url: new.file_url,
            file_key: new.file_key,
            photo_url: new.photo_url,
            photo_key: new.photo_key,
            download_count: 0,
            file_size: new.file_size,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies every field present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: ApkPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(version) = patch.version {
            self.version = version;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = Some(category_id);
        }
        if let Some(file_url) = patch.file_url {
            self.file_url = file_url;
        }
        if let Some(file_key) = patch.file_key {
            self.file_key = file_key;
        }
        if let Some(photo_url) = patch.photo_url {
            self.photo_url = Some(photo_url);
        }
        if let Some(photo_key) = patch.photo_key {
            self.photo_key = Some(photo_key);
        }
        if let Some(file_size) = patch.file_size {
            self.file_size = Some(file_size);
        }

        self.updated_at = now;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// What a download needs from the record after its counter was bumped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTarget {
    pub file_url: String,
    pub file_key: String,
    pub download_count: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {0} must not be blank")]
    BlankField(&'static str),

    #[error("Id must be a positive integer")]
    InvalidId,

    #[error("Unknown category {0}")]
    UnknownCategory(CategoryId),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApk {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub file_url: Option<String>,
    pub file_key: Option<String>,
    pub photo_url: Option<String>,
    pub photo_key: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewApk {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub file_url: String,
    pub file_key: String,
    pub photo_url: Option<String>,
    pub photo_key: Option<String>,
    pub file_size: Option<u64>,
}

impl CreateApk {
    pub fn validate(self) -> Result<NewApk, ValidationError> {
        Ok(NewApk {
            name: required("name", self.name)?,
            version: required("version", self.version)?,
            description: optional(self.description),
            category_id: self.category_id,
            file_url: required("fileUrl", self.file_url)?,
            file_key: required("fileKey", self.file_key)?,
            photo_url: optional(self.photo_url),
            photo_key: optional(self.photo_key),
            file_size: self.file_size,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApkPatch {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub file_url: Option<String>,
    pub file_key: Option<String>,
    pub photo_url: Option<String>,
    pub photo_key: Option<String>,
    pub file_size: Option<u64>,
}

impl ApkPatch {
    /// Rejects blanked-out required fields and trims the rest.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            name: present("name", self.name)?,
            version: present("version", self.version)?,
            description: self.description.map(|s| s.trim().to_string()),
            category_id: self.category_id,
            file_url: present("fileUrl", self.file_url)?,
            file_key: present("fileKey", self.file_key)?,
            photo_url: self.photo_url.map(|s| s.trim().to_string()),
            photo_key: self.photo_key.map(|s| s.trim().to_string()),
            file_size: self.file_size,
        })
    }
}

pub fn check_id(id: u64) -> Result<u64, ValidationError> {
    if id == 0 {
        return Err(ValidationError::InvalidId);
    }

    Ok(id)
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }

    Ok(trimmed.to_string())
}

fn present(field: &'static str, value: Option<String>) -> Result<Option<String>, ValidationError> {
    match value {
        Some(s) if s.trim().is_empty() => Err(ValidationError::BlankField(field)),
        Some(s) => Ok(Some(s.trim().to_string())),
        None => Ok(None),
    }
}

// form inputs send "" for untouched optional fields
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
