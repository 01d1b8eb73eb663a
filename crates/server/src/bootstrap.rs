use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use mercalytica_agent::{ConversationOrchestrator, HttpAgentProvider, TurnCoordinator};
use mercalytica_core::config::{AppConfig, ConfigError, LoadOptions};
use mercalytica_db::{SessionStore, StoreError};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::chat::{self, ChatState};
use crate::health;
use crate::pdf::ReportRenderer;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<SessionStore>,
    pub coordinator: Arc<TurnCoordinator>,
    pub renderer: Arc<ReportRenderer>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        "starting application bootstrap"
    );

    let store = Arc::new(SessionStore::open(&config.database).await?);
    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        store_mode = store.mode().as_str(),
        "session store initialized"
    );

    let renderer = Arc::new(ReportRenderer::new(&config.reports));
    let orchestrator = ConversationOrchestrator::new(
        Arc::new(HttpAgentProvider::new(config.llm.clone())),
        renderer.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    );
    let coordinator = Arc::new(
        TurnCoordinator::new(store.clone(), Arc::new(orchestrator))
            .with_serialized_turns(config.chat.serialize_turns),
    );

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        serialize_turns = config.chat.serialize_turns,
        reports_dir = %config.reports.output_dir.display(),
        "application bootstrap complete"
    );

    Ok(Application { config, store, coordinator, renderer })
}

impl Application {
    pub fn router(&self) -> Router {
        let chat_state =
            ChatState::new(self.coordinator.clone(), self.renderer.output_dir().to_path_buf());

        chat::router(chat_state)
            .merge(health::router(self.store.clone()))
            .layer(cors_layer(&self.config.server.cors_allowed_origins))
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(
                    event_name = "system.bootstrap.cors_origin_skipped",
                    origin = %origin,
                    error = %error,
                    "ignoring invalid CORS origin"
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use mercalytica_core::config::AppConfig;
    use mercalytica_db::StoreMode;
    use tower::ServiceExt;

    use crate::bootstrap::bootstrap_with_config;

    fn test_config(database_url: String, reports_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = database_url;
        config.database.max_connections = 1;
        config.database.timeout_secs = 2;
        config.reports.output_dir = reports_dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn reachable_database_bootstraps_durable_store_and_ready_health() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap_with_config(test_config("sqlite::memory:".to_string(), dir.path()))
            .await
            .expect("bootstrap");

        assert_eq!(app.store.mode(), StoreMode::Durable);

        let response = app
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unreachable_database_bootstraps_in_fallback_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(
            format!("sqlite://{}", dir.path().join("absent/chat.db").display()),
            dir.path(),
        );
        config.database.create_if_missing = false;

        let app = bootstrap_with_config(config).await.expect("bootstrap never fails on store");

        assert_eq!(app.store.mode(), StoreMode::Fallback);

        let response = app
            .router()
            .oneshot(Request::get("/api/chatBot/history/unknown").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn configured_origin_receives_cors_headers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config("sqlite::memory:".to_string(), dir.path());
        config.server.cors_allowed_origins =
            vec!["http://localhost:5173".to_string(), "bad\norigin".to_string()];
        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let response = app
            .router()
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).map(|v| v.as_bytes()),
            Some(&b"http://localhost:5173"[..])
        );
    }
}
