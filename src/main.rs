use std::sync::Arc;

use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context as _;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use snipshare::notify::{AdminNotifier, LogNotifier, WebhookNotifier};
use snipshare::openapi::ApiDoc;
use snipshare::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use snipshare::repo::Repo;
use snipshare::{config, AppState, SecurityHeaders, Settings};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping snipshare server");

    let settings = Settings::from_env();
    info!("Public base URL: {}", settings.base_url);
    info!("Admin webhook configured: {}", settings.admin_webhook_url.is_some());

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(snipshare::repo::inmem::InMemRepo::new())
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set for postgres-store")?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .context("failed to create Pg pool")?;
        let pg = snipshare::repo::pg::PgRepo::new(pool);
        pg.migrate().await.context("migrations failed")?;
        info!("Using Postgres repository backend");
        Arc::new(pg)
    };

    let notifier: Arc<dyn AdminNotifier> = match &settings.admin_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env());

    let bind = (settings.bind_addr.clone(), settings.port);
    // template syntax errors abort startup
    let state = AppState::new(repo, settings)
        .context("built-in page templates failed to compile")?
        .with_notifier(notifier)
        .with_rate_limiter(limiter);

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((bind.0.as_str(), bind.1))?;

    info!("Listening on http://{}:{}", bind.0, bind.1);

    server.run().await?;
    Ok(())
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let required = vec!["JWT_SECRET"];

    let mut missing = Vec::new();
    for var in required {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    if env::var("BASE_URL").is_err() {
        eprintln!("Warning: BASE_URL not set, feed and notification links will point at http://localhost:8080");
    }
}
