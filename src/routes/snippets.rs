use actix_web::{http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{snippet_url, FlagKind, Id, Language, NewFlag, NewSnippet, RatingValue, Snippet, SnippetFilter, SnippetInput};
use crate::notify::{dispatch, AdminMessage};
use crate::pages::SnippetPage;
use crate::repo::RepoError;

use super::{active_user, field_error, not_blank, see_other, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SnippetForm {
    #[validate(length(max = 255), custom(function = "not_blank"))]
    pub title: String,
    pub language_id: Id,
    #[validate(custom(function = "not_blank"))]
    pub description: String,
    #[validate(custom(function = "not_blank"))]
    pub code: String,
}

impl From<SnippetForm> for SnippetInput {
    fn from(f: SnippetForm) -> Self {
        SnippetInput { title: f.title, language_id: f.language_id, description: f.description, code: f.code }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SnippetDetail {
    pub snippet: Snippet,
    pub language: Language,
    pub author: String,
    /// Sum of all ratings, 0 when unrated.
    pub score: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FlagRequest {
    /// `spam` or `inappropriate`.
    pub flag: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RateQuery {
    /// `1` or `-1`.
    pub rating: Option<String>,
}

/// Validates the form and checks that the chosen language exists.
async fn checked_input(data: &AppState, form: SnippetForm) -> Result<SnippetInput, ApiError> {
    form.validate()?;
    match data.repo.get_language(form.language_id).await {
        Ok(_) => Ok(form.into()),
        Err(RepoError::NotFound) => Err(field_error("language_id", "invalid_choice", "Select a valid language.")),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/snippets",
    responses((status = 200, description = "All snippets, newest first", body = [Snippet]))
)]
pub async fn snippet_list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let snippets = data.repo.list_snippets(SnippetFilter::default()).await?;
    Ok(HttpResponse::Ok().json(snippets))
}

#[utoipa::path(
    post,
    path = "/api/v1/snippets",
    request_body = SnippetForm,
    responses(
        (status = 201, description = "Snippet created", body = Snippet),
        (status = 400, description = "Invalid form"),
        (status = 429, description = "Too many snippets")
    )
)]
pub async fn snippet_add(auth: Auth, data: web::Data<AppState>, payload: web::Json<SnippetForm>) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_snippet(user.id) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let input = checked_input(&data, payload.into_inner()).await?;
    let snippet = data.repo.create_snippet(NewSnippet { author_id: user.id, input }).await?;
    tracing::info!(snippet_id = snippet.id, author_id = user.id, "snippet created");
    Ok(HttpResponse::Created().json(snippet))
}

#[utoipa::path(
    get,
    path = "/api/v1/snippets/{id}",
    params(("id" = Id, Path, description = "Snippet id")),
    responses(
        (status = 200, description = "Snippet with language, author and score", body = SnippetDetail),
        (status = 404, description = "Snippet not found")
    )
)]
pub async fn snippet_detail(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    let language = data.repo.get_language(snippet.language_id).await?;
    let author = data.repo.get_user(snippet.author_id).await?;
    let score = data.repo.snippet_score(snippet.id).await?;
    Ok(HttpResponse::Ok().json(SnippetDetail { snippet, language, author: author.username, score }))
}

#[utoipa::path(
    put,
    path = "/api/v1/snippets/{id}",
    params(("id" = Id, Path, description = "Snippet id")),
    request_body = SnippetForm,
    responses(
        (status = 200, description = "Snippet updated", body = Snippet),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Snippet not found")
    )
)]
pub async fn snippet_edit(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SnippetForm>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    if snippet.author_id != user.id {
        return Err(ApiError::Forbidden);
    }
    let input = checked_input(&data, payload.into_inner()).await?;
    let updated = data.repo.update_snippet(snippet.id, input).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn snippet_download(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    let language = data.repo.get_language(snippet.language_id).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, language.mime_type))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}.{}", snippet.id, language.file_extension),
        ))
        .body(snippet.code))
}

pub async fn snippet_raw(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((header::CONTENT_DISPOSITION, "inline"))
        .body(snippet.code))
}

#[utoipa::path(
    post,
    path = "/api/v1/snippets/{id}/flag",
    params(("id" = Id, Path, description = "Snippet id")),
    request_body = FlagRequest,
    responses(
        (status = 303, description = "Flag recorded, redirect to the snippet"),
        (status = 400, description = "Unknown flag kind"),
        (status = 429, description = "Too many flags")
    )
)]
pub async fn snippet_flag(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<FlagRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    let kind = FlagKind::parse(&payload.flag)
        .ok_or_else(|| field_error("flag", "invalid_choice", "Select a valid choice."))?;
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_flag(user.id) {
            return Err(ApiError::TooManyRequests);
        }
    }
    data.repo.create_flag(NewFlag { snippet_id: snippet.id, user_id: user.id, flag: kind }).await?;
    let msg = AdminMessage {
        subject: format!("Snippet flagged: \"{}\"", snippet.title),
        body: format!(
            "{} flagged as {} by {}\n\nAdmin link: {}",
            snippet.title,
            kind,
            user.username,
            data.settings.absolute("/api/v1/admin/flags"),
        ),
    };
    dispatch(data.notifier.clone(), msg);
    Ok(see_other(snippet_url(snippet.id)))
}

#[utoipa::path(
    post,
    path = "/api/v1/snippets/{id}/rate",
    params(("id" = Id, Path, description = "Snippet id"), RateQuery),
    responses((status = 303, description = "Redirect to the snippet, rating stored when valid"))
)]
pub async fn snippet_rate(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<RateQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &auth).await?;
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    if let Some(value) = query.rating.as_deref().and_then(RatingValue::parse) {
        data.repo.rate_snippet(user.id, snippet.id, value).await?;
    }
    Ok(see_other(snippet_url(snippet.id)))
}

/// HTML detail page with bookmark and rating controls for signed-in viewers.
pub async fn snippet_page(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let snippet = data.repo.get_snippet(path.into_inner()).await?;
    let language = data.repo.get_language(snippet.language_id).await?;
    let author = data.repo.get_user(snippet.author_id).await?;
    let score = data.repo.snippet_score(snippet.id).await?;
    let viewer = match auth.as_ref().and_then(|a| a.0.user_id()) {
        Some(id) => match data.repo.get_user(id).await {
            Ok(u) => Some(u),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let page = SnippetPage {
        site_name: data.settings.site_name.as_deref(),
        snippet: &snippet,
        language: &language,
        author: &author,
        score,
        viewer: viewer.as_ref(),
    };
    let html = data.pages.snippet_detail(page, &*data.repo).await?;
    Ok(HttpResponse::Ok().content_type("text/html; charset=utf-8").body(html))
}
