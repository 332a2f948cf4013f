use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{Language, Snippet, SnippetFilter};

use super::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct LanguagePage {
    pub language: Language,
    pub snippets: Vec<Snippet>,
}

#[utoipa::path(
    get,
    path = "/api/v1/languages",
    responses((status = 200, description = "Languages in alphabetical order", body = [Language]))
)]
pub async fn language_list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_languages().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/languages/{slug}",
    params(("slug" = String, Path, description = "Language slug")),
    responses(
        (status = 200, description = "Language and its snippets", body = LanguagePage),
        (status = 404, description = "Language not found")
    )
)]
pub async fn language_detail(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let language = data.repo.get_language_by_slug(&path.into_inner()).await?;
    let snippets = data.repo.list_snippets(SnippetFilter::by_language(language.id)).await?;
    Ok(HttpResponse::Ok().json(LanguagePage { language, snippets }))
}
