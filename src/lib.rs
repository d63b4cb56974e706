use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, put},
    Router,
};

use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Backend, Config, ServerConfig};
use crate::errors::StartupError;
use crate::repositories::couchdb::CouchCustomerRepository;
use crate::repositories::memory::MemoryCustomerRepository;
use crate::repositories::postgres::PgCustomerRepository;
use crate::repositories::CustomerRepository;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod utils;

/// Shared handler state: the storage backend picked at startup.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn CustomerRepository>,
}

impl AppState {
    pub fn new(repository: Arc<dyn CustomerRepository>) -> Self {
        Self { repository }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/customers/:id/deactivate",
            put(handlers::customer::deactivate),
        )
        .route(
            "/customers/:id/restore",
            put(handlers::customer::restore).patch(handlers::customer::restore),
        )
        .route(
            "/customers/:id",
            get(handlers::customer::read)
                .put(handlers::customer::update)
                .delete(handlers::customer::delete),
        )
        .route(
            "/customers",
            get(handlers::customer::list).post(handlers::customer::create),
        )
        .route("/health", get(handlers::home::health))
        .route("/", get(handlers::home::index))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn axum() -> Result<(), StartupError> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let repository = connect_repository(&config).await?;

    let app = router(AppState::new(repository));

    let server = match &config.server {
        Some(server) => server.clone(),
        None => ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        },
    };
    let addr = format!("{}:{}", server.host, server.port).parse::<SocketAddr>()?;

    tracing::info!("listening on {}", addr);
    axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect_repository(config: &Config) -> Result<Arc<dyn CustomerRepository>, StartupError> {
    tracing::info!("Using {:?} backend", config.backend);

    let repository: Arc<dyn CustomerRepository> = match config.backend {
        Backend::Postgres => {
            let pg = match &config.pg {
                Some(pg) => pg,
                None => return Err(StartupError::MissingParameter("pg.url".to_string())),
            };

            Arc::new(PgCustomerRepository::connect(pg).await?)
        }
        Backend::Couchdb => {
            let credentials = config.couch_credentials()?;

            Arc::new(
                CouchCustomerRepository::connect(
                    &credentials,
                    &config.database_name,
                    config.admin_party,
                    config.retry_policy()?,
                )
                .await?,
            )
        }
        Backend::Memory => Arc::new(MemoryCustomerRepository::new()),
    };

    Ok(repository)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutting down");
}
