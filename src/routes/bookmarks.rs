use actix_web::{web, HttpResponse};

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{snippet_url, Bookmark, Id};

use super::{active_user, see_other, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/bookmarks",
    responses(
        (status = 200, description = "Caller's bookmarks, newest first", body = [Bookmark]),
        (status = 401, description = "Sign in required")
    )
)]
pub async fn user_bookmarks(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    let bookmarks = data.repo.list_bookmarks(user.id).await?;
    Ok(HttpResponse::Ok().json(bookmarks))
}

/// Idempotent: bookmarking twice keeps the first row.
#[utoipa::path(
    post,
    path = "/api/v1/bookmarks/{id}/add",
    params(("id" = Id, Path, description = "Snippet id")),
    responses(
        (status = 303, description = "Redirect to the snippet"),
        (status = 404, description = "Snippet not found")
    )
)]
pub async fn add_bookmark(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    let (_, created) = data.repo.add_bookmark(user.id, snippet.id).await?;
    if created {
        log::debug!("user {} bookmarked snippet {}", user.id, snippet.id);
    }
    Ok(see_other(snippet_url(snippet.id)))
}

#[utoipa::path(
    post,
    path = "/api/v1/bookmarks/{id}/delete",
    params(("id" = Id, Path, description = "Snippet id")),
    responses(
        (status = 303, description = "Redirect to the snippet"),
        (status = 404, description = "Snippet not found")
    )
)]
pub async fn delete_bookmark(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    data.repo.remove_bookmark(user.id, snippet.id).await?;
    Ok(see_other(snippet_url(snippet.id)))
}
