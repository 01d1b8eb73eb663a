use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use mercalytica_db::{SessionStore, StoreMode};

#[derive(Clone)]
pub struct HealthState {
    store: Arc<SessionStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(store: Arc<SessionStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store })
}

/// Fallback mode is reported as `degraded` but still answers 200: chat keeps working,
/// only durability is lost. A durable store that stops answering is a 503.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(&state.store).await;

    let (status, status_code) = match store.status {
        "ready" => ("ready", StatusCode::OK),
        "fallback" => ("degraded", StatusCode::OK),
        _ => ("unavailable", StatusCode::SERVICE_UNAVAILABLE),
    };

    let payload = HealthResponse {
        status,
        service: HealthCheck {
            status: "ready",
            detail: "mercalytica-server runtime initialized".to_string(),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    (status_code, Json(payload))
}

async fn store_check(store: &SessionStore) -> HealthCheck {
    if store.mode() == StoreMode::Fallback {
        return HealthCheck {
            status: "fallback",
            detail: "in-memory session store; history is lost on restart".to_string(),
        };
    }

    match store.probe().await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "unavailable", detail: format!("database query failed: {error}") }
        }
    }
}
