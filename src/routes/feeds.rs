use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::feeds::FeedKind;

use super::AppState;

const ATOM: &str = "application/atom+xml; charset=utf-8";

async fn render(data: &AppState, kind: FeedKind) -> Result<HttpResponse, ApiError> {
    let feed = data.feeds.build(&*data.repo, &kind).await?;
    Ok(HttpResponse::Ok().content_type(ATOM).body(feed.to_string()))
}

pub async fn latest(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    render(&data, FeedKind::Latest).await
}

pub async fn by_author(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let author = data.repo.get_user_by_username(&path.into_inner()).await?;
    render(&data, FeedKind::ByAuthor(author)).await
}

pub async fn by_language(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let language = data.repo.get_language_by_slug(&path.into_inner()).await?;
    render(&data, FeedKind::ByLanguage(language)).await
}
