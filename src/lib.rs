pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod websocket;

use actix_cors::Cors;
use actix_web::{http::header, web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use auth::{ConnectionAuthenticator, CredentialVerifier, Handshake, JwtVerifier};
pub use db::{DbOperations, Identity, IdentityResolver, MessageStore, StoredMessage};
pub use websocket::{Broadcaster, Gateway};

/// Health check endpoint handler
/// Returns server status, a timestamp, and the number of live sessions
pub async fn health_check(broadcaster: web::Data<Broadcaster>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": broadcaster.session_count().await,
    }))
}

/// Routes served by the gateway. Expects `web::Data<Gateway>` and
/// `web::Data<Broadcaster>` to be registered on the app.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ws", web::get().to(websocket::websocket_route));
}

/// Cross-origin policy for browser clients.
pub fn cors_policy(config: &crate::config::CorsConfig) -> Cors {
    let cors = if config.allowed_origin == "*" {
        Cors::default().allow_any_origin()
    } else {
        Cors::default().allowed_origin(&config.allowed_origin)
    };

    let cors = cors
        .allowed_methods(config.allowed_methods.iter().map(String::as_str))
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(config.max_age);

    if config.supports_credentials {
        cors.supports_credentials()
    } else {
        cors
    }
}
