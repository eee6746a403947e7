//! Synapse site backend
//!
//! Content API for the company site with SQLite persistence, admin credentials
//! and a client-side freshness cache for the published collections.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod mail;
pub mod models;
pub mod ratelimit;
pub mod uploads;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::Config;
use credentials::CredentialStore;
use db::Repository;
use mail::Mailer;
use ratelimit::RateLimiter;
use uploads::{ImageStore, PUBLIC_PREFIX};

/// Multipart framing allowance on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub credentials: CredentialStore,
    pub images: Arc<ImageStore>,
    pub mailer: Arc<Mailer>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the database, image directory and credential store described by `config`.
    pub async fn initialize(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = db::init_database(&config.db_path).await?;
        let repo = Arc::new(Repository::new(pool));

        let credentials = CredentialStore::new(repo.clone(), &config.pepper)?;
        let images = Arc::new(ImageStore::open(&config.upload_dir, config.max_upload_bytes).await?);
        let mailer = Arc::new(Mailer::from_config(&config.mail)?);
        let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));

        Ok(Self {
            repo,
            credentials,
            images,
            mailer,
            limiter,
            config: Arc::new(config),
        })
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();
    let upload_limit = state.images.max_bytes() + FORM_OVERHEAD_BYTES;

    // Admin routes
    let admin_routes = Router::new()
        .route("/setup-admin", post(api::setup_admin))
        .route("/admin/services", get(api::list_admin_services))
        .route("/admin/projects", get(api::list_admin_projects))
        .route("/addService", post(api::add_service))
        .route(
            "/addProject",
            post(api::add_project).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/deleteService", delete(api::delete_service))
        .route("/deleteProject", delete(api::delete_project))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Public routes
    let public_routes = Router::new()
        .route("/services", get(api::list_services))
        .route("/projects", get(api::list_projects))
        .route("/contact", post(api::submit_contact))
        .route("/login-admin", post(api::login_admin));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", public_routes.merge(admin_routes))
        .nest_service(PUBLIC_PREFIX, ServeDir::new(state.images.dir()))
        .merge(health_routes)
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            ratelimit::rate_limit_layer,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
