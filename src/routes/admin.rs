use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::{Flag, Id, Language, NewLanguage, RemediationReport};
use crate::require_role;

use super::{active_user, field_error, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemoveAndBanRequest {
    pub flag_ids: Vec<Id>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/flags",
    responses(
        (status = 200, description = "All flags", body = [Flag]),
        (status = 403, description = "Forbidden – Admins only")
    )
)]
pub async fn list_flags(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    active_user(&data, &auth).await?;
    Ok(HttpResponse::Ok().json(data.repo.list_flags().await?))
}

/// Deletes every flagged snippet and disables its author. Either the whole
/// batch is applied or, when any flag id is unknown, nothing is.
#[utoipa::path(
    post,
    path = "/api/v1/admin/flags/remove-and-ban",
    request_body = RemoveAndBanRequest,
    responses(
        (status = 200, description = "Removed snippets and banned users", body = RemediationReport),
        (status = 400, description = "No flags selected"),
        (status = 403, description = "Forbidden – Admins only"),
        (status = 404, description = "Unknown flag id")
    )
)]
pub async fn remove_and_ban(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<RemoveAndBanRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let admin = active_user(&data, &auth).await?;
    if payload.flag_ids.is_empty() {
        return Err(ApiError::BadRequest);
    }
    let report = data.repo.remove_and_ban(&payload.flag_ids).await?;
    tracing::warn!(
        admin = %admin.username,
        snippets = ?report.snippets_removed,
        users = ?report.users_banned,
        "flagged snippets removed and authors banned"
    );
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/languages",
    request_body = NewLanguage,
    responses(
        (status = 201, description = "Language created", body = Language),
        (status = 400, description = "Missing name or slug"),
        (status = 403, description = "Forbidden – Admins only"),
        (status = 409, description = "Slug already used")
    )
)]
pub async fn create_language(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewLanguage>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    active_user(&data, &auth).await?;
    if payload.name.trim().is_empty() {
        return Err(field_error("name", "required", "This field is required."));
    }
    if payload.resolved_slug().is_empty() {
        return Err(field_error("slug", "required", "This field is required."));
    }
    let language = data.repo.create_language(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(language))
}
