use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{create_jwt, hash_password, verify_password, Role};
use crate::error::ApiError;
use crate::models::{NewUser, Snippet, SnippetFilter, User};
use crate::repo::RepoError;

use super::{field_error, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 30, message = "Ensure this value has at most 30 characters."))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 30, message = "Ensure this value has at most 30 characters."))]
    pub password1: String,
    #[validate(must_match(other = "password1", message = "The two passwords are not same."))]
    pub password2: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorPage {
    pub author: User,
    pub snippets: Vec<Snippet>,
}

#[utoipa::path(
    post,
    path = "/api/v1/accounts/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn signup(data: web::Data<AppState>, payload: web::Json<SignupRequest>) -> Result<HttpResponse, ApiError> {
    let form = payload.into_inner();
    form.validate()?;
    let taken = || field_error("username", "taken", "This username has been taken.");
    match data.repo.get_user_by_username(&form.username).await {
        Ok(_) => return Err(taken()),
        Err(RepoError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    let password_hash = hash_password(&form.password1).map_err(|e| {
        log::error!("signup hashing failed: {e}");
        ApiError::Internal
    })?;
    let new = NewUser { username: form.username, email: form.email, password_hash, is_staff: false };
    // a concurrent signup can still win the unique index
    let user = data.repo.create_user(new).await.map_err(|e| match e {
        RepoError::Conflict => taken(),
        other => other.into(),
    })?;
    tracing::info!(user_id = user.id, "account created");
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    post,
    path = "/api/v1/accounts/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Bearer token", body = TokenResponse),
        (status = 401, description = "Bad credentials or disabled account")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let (user, hash) = data.repo.get_credentials(&payload.username).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::Unauthorized,
        other => other.into(),
    })?;
    let verified = hash.as_deref().is_some_and(|h| verify_password(&payload.password, h));
    if !user.is_active || !verified {
        return Err(ApiError::Unauthorized);
    }
    let mut roles = vec![Role::User];
    if user.is_staff || data.settings.is_bootstrap_admin(&user.username) {
        roles.push(Role::Admin);
    }
    let token = create_jwt(user.id, &user.username, roles).map_err(|e| {
        log::error!("token issue failed: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Author username")),
    responses(
        (status = 200, description = "Author and their snippets", body = AuthorPage),
        (status = 404, description = "No such user")
    )
)]
pub async fn author_detail(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let author = data.repo.get_user_by_username(&path.into_inner()).await?;
    let snippets = data.repo.list_snippets(SnippetFilter::by_author(author.id)).await?;
    Ok(HttpResponse::Ok().json(AuthorPage { author, snippets }))
}
