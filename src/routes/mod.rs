use std::borrow::Cow;
use std::sync::Arc;

use actix_web::{http::header, web, HttpResponse};
use validator::{ValidationError, ValidationErrors};

use crate::auth::Auth;
use crate::config::Settings;
use crate::error::ApiError;
use crate::feeds::Feeds;
use crate::models::User;
use crate::notify::{AdminNotifier, LogNotifier};
use crate::pages::Pages;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::template::TemplateSyntaxError;

pub mod accounts;
pub mod admin;
pub mod bookmarks;
pub mod feeds;
pub mod languages;
pub mod popular;
pub mod snippets;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/accounts/signup").route(web::post().to(accounts::signup)))
            .service(web::resource("/accounts/login").route(web::post().to(accounts::login)))
            .service(web::resource("/users/{username}").route(web::get().to(accounts::author_detail)))
            .service(
                web::resource("/snippets")
                    .route(web::get().to(snippets::snippet_list))
                    .route(web::post().to(snippets::snippet_add)),
            )
            .service(
                web::resource("/snippets/{id}")
                    .route(web::get().to(snippets::snippet_detail))
                    .route(web::put().to(snippets::snippet_edit)),
            )
            .service(web::resource("/snippets/{id}/download").route(web::get().to(snippets::snippet_download)))
            .service(web::resource("/snippets/{id}/raw").route(web::get().to(snippets::snippet_raw)))
            .service(web::resource("/snippets/{id}/flag").route(web::post().to(snippets::snippet_flag)))
            .service(web::resource("/snippets/{id}/rate").route(web::post().to(snippets::snippet_rate)))
            .service(web::resource("/bookmarks").route(web::get().to(bookmarks::user_bookmarks)))
            .service(web::resource("/bookmarks/{id}/add").route(web::post().to(bookmarks::add_bookmark)))
            .service(web::resource("/bookmarks/{id}/delete").route(web::post().to(bookmarks::delete_bookmark)))
            .service(web::resource("/languages").route(web::get().to(languages::language_list)))
            .service(web::resource("/languages/{slug}").route(web::get().to(languages::language_detail)))
            .service(web::resource("/popular/authors").route(web::get().to(popular::top_authors)))
            .service(web::resource("/popular/languages").route(web::get().to(popular::top_languages)))
            .service(web::resource("/popular/bookmarks").route(web::get().to(popular::most_bookmarked)))
            .service(web::resource("/admin/flags").route(web::get().to(admin::list_flags)))
            .service(web::resource("/admin/flags/remove-and-ban").route(web::post().to(admin::remove_and_ban)))
            .service(web::resource("/admin/languages").route(web::post().to(admin::create_language))),
    );
    // HTML page and feeds live outside the API prefix
    cfg.route("/snippets/{id}/", web::get().to(snippets::snippet_page));
    cfg.service(
        web::scope("/feeds")
            .route("/latest/", web::get().to(feeds::latest))
            .route("/author/{username}/", web::get().to(feeds::by_author))
            .route("/language/{slug}/", web::get().to(feeds::by_language)),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub settings: Arc<Settings>,
    pub pages: Arc<Pages>,
    pub feeds: Feeds,
    pub notifier: Arc<dyn AdminNotifier>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

impl AppState {
    /// Compiles the page templates; a syntax error here is fatal for startup.
    pub fn new(repo: Arc<dyn Repo>, settings: Settings) -> Result<Self, TemplateSyntaxError> {
        Ok(Self {
            repo,
            feeds: Feeds::new(&settings),
            settings: Arc::new(settings),
            pages: Arc::new(Pages::load()?),
            notifier: Arc::new(LogNotifier),
            rate_limiter: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AdminNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }
}

/// Re-read the caller's account. Deleted accounts are unauthorized,
/// disabled ones forbidden.
pub(crate) async fn active_user(data: &AppState, auth: &Auth) -> Result<User, ApiError> {
    let id = auth.0.user_id().ok_or(ApiError::Unauthorized)?;
    let user = data.repo.get_user(id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::Unauthorized,
        other => other.into(),
    })?;
    if !user.is_active {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

pub(crate) fn see_other(location: String) -> HttpResponse {
    HttpResponse::SeeOther().insert_header((header::LOCATION, location)).finish()
}

/// Single field-level error, shaped like the ones the validator derive produces.
pub(crate) fn field_error(field: &'static str, code: &'static str, message: &'static str) -> ApiError {
    let mut errs = ValidationErrors::new();
    errs.add(field, ValidationError::new(code).with_message(Cow::Borrowed(message)));
    ApiError::Validation(errs)
}

/// Whitespace-only input counts as missing.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required").with_message(Cow::Borrowed("This field is required.")));
    }
    Ok(())
}
