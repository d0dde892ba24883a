use actix_web::{web, App, HttpServer};
use chat_gateway::{configure_routes, cors_policy, AppError, DbOperations, Gateway, JwtVerifier, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> chat_gateway::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Load configuration
    let config = Settings::new()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
    info!("Configuration loaded successfully ({})", config.environment);

    // Collaborators
    let db = Arc::new(DbOperations::connect(&config.database).await?);
    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));

    // The gateway and its broadcast handle are built once and injected into every worker.
    let gateway = Gateway::new(&config.gateway, verifier, db.clone(), db.clone());
    let broadcaster = web::Data::new(gateway.broadcaster());
    let gateway = web::Data::new(gateway);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!(
        "Gateway ready to accept connections at ws://{}:{}/ws (allowed origin: {})",
        config.server.host, config.server.port, config.cors.allowed_origin
    );

    let cors = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors_policy(&cors))
            .app_data(gateway.clone())
            .app_data(broadcaster.clone())
            .configure(configure_routes)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    db.close().await;
    info!("Gateway shut down");

    Ok(())
}
