use std::sync::Arc;

use axum::{
    Json,
    extract::{
        self, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
};
use catalog::{ApkPatch, CategoryId, CreateApk};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{Credentials, Identity},
    error::AppError,
    state::State,
};

type AppState = extract::State<Arc<State>>;

#[derive(Deserialize)]
pub struct ListFilter {
    category: Option<CategoryId>,
}

/// Mutating handlers call [`Identity::require_admin`] on the result before the path or
/// body rejections are looked at.
async fn identity(state: &State, headers: &HeaderMap) -> Result<Identity, AppError> {
    state
        .service
        .identify(&Credentials::from_headers(headers))
        .await
}

pub async fn list_apks_handler(
    extract::State(state): AppState,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filter) = filter?;

    Ok(Json(state.service.list(filter.category).await?))
}

pub async fn get_apk_handler(
    extract::State(state): AppState,
    id: Result<Path<u64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;

    Ok(Json(state.service.get(id).await?))
}

pub async fn create_apk_handler(
    extract::State(state): AppState,
    headers: HeaderMap,
    payload: Result<Json<CreateApk>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let identity = identity(&state, &headers).await?;
    identity.require_admin()?;
    let Json(input) = payload?;

    let apk = state.service.create(&identity, input).await?;

    Ok((StatusCode::CREATED, Json(apk)))
}

pub async fn update_apk_handler(
    extract::State(state): AppState,
    id: Result<Path<u64>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<ApkPatch>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let identity = identity(&state, &headers).await?;
    identity.require_admin()?;
    let Path(id) = id?;
    let Json(patch) = payload?;

    Ok(Json(state.service.update(&identity, id, patch).await?))
}

pub async fn delete_apk_handler(
    extract::State(state): AppState,
    id: Result<Path<u64>, PathRejection>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let identity = identity(&state, &headers).await?;
    identity.require_admin()?;
    let Path(id) = id?;

    state.service.delete(&identity, id).await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn download_handler(
    extract::State(state): AppState,
    id: Result<Path<u64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;

    Ok(Json(state.service.download(id).await?))
}

/// Same as [`download_handler`] but answers with a 303 so plain links work.
pub async fn download_redirect_handler(
    extract::State(state): AppState,
    id: Result<Path<u64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;

    let download = state.service.download(id).await?;

    Ok(Redirect::to(&download.url))
}

pub async fn categories_handler(
    extract::State(state): AppState,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service.categories().await?))
}

pub async fn me_handler(
    extract::State(state): AppState,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let identity = identity(&state, &headers).await?;

    Ok(Json(json!({ "user": identity.user() })))
}
