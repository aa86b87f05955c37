mod error;
mod routes;
mod storage;

use axum::{Router, extract::FromRef, routing::get};
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use gantt_runtime_config::{CONFIG_FILE_NAME, GanttConfig};
use storage::Db;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/categories", get(routes::reads::list_categories))
        .route("/projects", get(routes::reads::list_projects))
        .route("/tasks", get(routes::reads::list_tasks));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantt_server=info,gantt_store=info,tower_http=info".into()),
        )
        .init();

    let config: GanttConfig = gantt_runtime_config::load(Path::new(CONFIG_FILE_NAME))?;
    tracing::info!("store: {}", config.store.path.display());

    // Migration and backfill finish before the listener exists.
    let db = storage::init_db(&config.store)?;
    tracing::info!("database initialized");

    let app = app(AppState { db });

    tracing::info!("starting server at {}", config.server.base_url);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port)).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
