//! REST API.
//!
//! Every route speaks JSON with camelCase keys. Project paths travel as a
//! single base64 URL segment (see [`crate::projects::ProjectPath`]).

mod error;
mod handlers;
mod middleware;
mod static_files;

use std::sync::Arc;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::analyzer::Analyzer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{ChatBackend, OpenAiClient};
use crate::postmortem::{PostmortemStore, SharedStore};
use crate::secrets::CredentialStore;
use crate::workspace::Workspace;

pub use error::{ApiError, ApiResult};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<Config>,
    workspace: Workspace,
    credentials: CredentialStore,
    postmortems: SharedStore,
    analyzer: Analyzer,
}

impl AppState {
    /// Open the data directory and stores described by `config`, using the
    /// OpenAI-compatible client for model calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let backend = Arc::new(OpenAiClient::new(&config.llm)?);
        Self::with_backend(config, backend)
    }

    /// Like [`AppState::open`] with an explicit chat backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or database cannot be opened.
    pub fn with_backend(config: Config, backend: Arc<dyn ChatBackend>) -> Result<Self> {
        let workspace = Workspace::open(&config)?;
        let credentials = CredentialStore::new(config.credentials_path());
        let postmortems = SharedStore::new(PostmortemStore::open(config.postmortem_db_path())?);
        let analyzer = Analyzer::new(
            &config,
            workspace.clone(),
            credentials.clone(),
            postmortems.clone(),
            backend,
        );

        Ok(Self {
            config: Arc::new(config),
            workspace,
            credentials,
            postmortems,
            analyzer,
        })
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The data directory.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The API-key store.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The postmortem store.
    #[must_use]
    pub fn postmortems(&self) -> &SharedStore {
        &self.postmortems
    }

    /// The analyzer.
    #[must_use]
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    use handlers::{
        analyze_postmortem, analyze_project, clear_key, create_postmortem, delete_postmortem,
        delete_rule, generate_rule, get_global_rules, get_postmortem, get_scan_paths, healthz,
        key_status, list_files, list_postmortems, list_projects, list_rules, sanity_check,
        save_global_rules, save_rule, save_scan_paths, store_key,
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/global-rules",
            get(get_global_rules).post(save_global_rules),
        )
        .route("/api/scan-paths", get(get_scan_paths).post(save_scan_paths))
        .route("/api/projects", get(list_projects))
        .route(
            "/api/projects/:project/rules",
            get(list_rules).post(save_rule),
        )
        .route(
            "/api/projects/:project/rules/:filename",
            delete(delete_rule),
        )
        .route("/api/projects/:project/files", get(list_files))
        .route(
            "/api/projects/:project/postmortems",
            get(list_postmortems).post(create_postmortem),
        )
        .route(
            "/api/projects/:project/postmortems/analyze",
            post(analyze_project),
        )
        .route("/api/generate-rule", post(generate_rule))
        .route(
            "/api/settings/api-key",
            get(key_status).post(store_key).delete(clear_key),
        )
        .route("/api/sanity-check", post(sanity_check))
        .route(
            "/api/postmortems/:id",
            get(get_postmortem).delete(delete_postmortem),
        )
        .route("/api/postmortems/:id/analyze", post(analyze_postmortem))
        .fallback(static_files::static_or_not_found)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::cors_middleware,
        ))
        .layer(from_fn(middleware::request_tracing_middleware))
        .with_state(state)
}

/// Serve the API on `listener` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(state);

    info!("rulekeeper listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::internal(format!("server failed: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
