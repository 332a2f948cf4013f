use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::models::{AuthorScore, LanguageScore, SnippetScore};

use super::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/popular/authors",
    responses((status = 200, description = "Authors by snippet count", body = [AuthorScore]))
)]
pub async fn top_authors(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.top_authors().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/popular/languages",
    responses((status = 200, description = "Languages by snippet count", body = [LanguageScore]))
)]
pub async fn top_languages(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.top_languages().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/popular/bookmarks",
    responses((status = 200, description = "Snippets by bookmark count", body = [SnippetScore]))
)]
pub async fn most_bookmarked(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.most_bookmarked().await?))
}
