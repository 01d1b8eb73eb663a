//! Chat HTTP surface.
//!
//! - `POST /api/chatBot`                       run one chat turn
//! - `GET  /api/chatBot/history/{sessionId}`   ordered messages of a session
//! - `GET  /api/chatBot/myHistory/{ownerId}`   every session of an owner
//! - `GET  /api/reports/download/{filename}`   a generated report artifact

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use mercalytica_agent::TurnCoordinator;
use mercalytica_core::{ApplicationError, InterfaceError, Message, SessionKey, StoreRecord};

use crate::pdf::ReportFormat;

pub const REPORT_DOWNLOAD_PREFIX: &str = "/api/reports/download";

#[derive(Clone)]
pub struct ChatState {
    coordinator: Arc<TurnCoordinator>,
    reports_dir: PathBuf,
}

impl ChatState {
    pub fn new(coordinator: Arc<TurnCoordinator>, reports_dir: PathBuf) -> Self {
        Self { coordinator, reports_dir }
    }
}

/// Accepts a single message object as well as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessages {
    Many(Vec<Message>),
    One(Message),
}

impl IncomingMessages {
    fn into_vec(self) -> Vec<Message> {
        match self {
            Self::Many(messages) => messages,
            Self::One(message) => vec![message],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(alias = "id_session")]
    pub session_id: String,
    #[serde(alias = "user_id")]
    pub owner_id: String,
    pub messages: IncomingMessages,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub report_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/chatBot", post(post_chat))
        .route("/api/chatBot/history/{session_id}", get(session_history))
        .route("/api/chatBot/myHistory/{owner_id}", get(owner_history))
        .route("/api/reports/download/{filename}", get(download_report))
        .with_state(state)
}

async fn post_chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let Json(request) = payload.map_err(|rejection| {
        warn!(
            event_name = "http.chat.invalid_body",
            correlation_id = %correlation_id,
            error = %rejection.body_text(),
            "chat request body rejected"
        );
        ApiError::new(ApplicationError::Validation(rejection.body_text()), &correlation_id)
    })?;

    let messages = request.messages.into_vec();
    let problem = if request.session_id.trim().is_empty() {
        Some("sessionId must not be blank")
    } else if request.owner_id.trim().is_empty() {
        Some("ownerId must not be blank")
    } else if messages.is_empty() {
        Some("messages must not be empty")
    } else {
        None
    };
    if let Some(problem) = problem {
        return Err(ApiError::new(ApplicationError::Validation(problem.to_string()), &correlation_id));
    }

    let key = SessionKey::new(request.owner_id, request.session_id);
    let response = state.coordinator.handle_turn(&key, messages).await.map_err(|turn_error| {
        error!(
            event_name = "http.chat.turn_failed",
            correlation_id = %correlation_id,
            session_id = %key.session_id,
            error = %turn_error,
            "chat turn failed"
        );
        ApiError::new(ApplicationError::Persistence(turn_error.to_string()), &correlation_id)
    })?;

    info!(
        event_name = "http.chat.turn_completed",
        correlation_id = %correlation_id,
        session_id = %key.session_id,
        report = response.report_file.is_some(),
        "chat turn completed"
    );

    Ok(Json(ChatReply {
        message: response.text,
        report_url: response
            .report_file
            .map(|filename| format!("{REPORT_DOWNLOAD_PREFIX}/{filename}")),
    }))
}

async fn session_history(
    State(state): State<ChatState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    state.coordinator.store().history(&session_id).await.map(Json).map_err(|store_error| {
        let correlation_id = Uuid::new_v4().to_string();
        error!(
            event_name = "http.chat.history_failed",
            correlation_id = %correlation_id,
            session_id = %session_id,
            error = %store_error,
            "session history read failed"
        );
        ApiError::new(ApplicationError::Persistence(store_error.to_string()), &correlation_id)
    })
}

async fn owner_history(
    State(state): State<ChatState>,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<StoreRecord>>, ApiError> {
    state.coordinator.store().sessions_by_owner(&owner_id).await.map(Json).map_err(|store_error| {
        let correlation_id = Uuid::new_v4().to_string();
        error!(
            event_name = "http.chat.owner_history_failed",
            correlation_id = %correlation_id,
            error = %store_error,
            "owner session listing failed"
        );
        ApiError::new(ApplicationError::Persistence(store_error.to_string()), &correlation_id)
    })
}

/// Plain `report_*` names with a known extension; anything that could leave the
/// reports directory is rejected.
fn is_report_filename(filename: &str) -> bool {
    filename.starts_with("report_")
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
        && ReportFormat::from_filename(filename).is_some()
}

async fn download_report(
    State(state): State<ChatState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let format = match ReportFormat::from_filename(&filename) {
        Some(format) if is_report_filename(&filename) => format,
        _ => {
            return Err(ApiError::new(
                ApplicationError::Validation(format!("`{filename}` is not a report file name")),
                &correlation_id,
            ));
        }
    };

    let bytes = match tokio::fs::read(state.reports_dir.join(&filename)).await {
        Ok(bytes) => bytes,
        Err(io_error) if io_error.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::new(
                ApplicationError::NotFound(format!("report `{filename}`")),
                &correlation_id,
            ));
        }
        Err(io_error) => {
            error!(
                event_name = "http.reports.read_failed",
                correlation_id = %correlation_id,
                error = %io_error,
                "report artifact could not be read"
            );
            return Err(ApiError::new(
                ApplicationError::Persistence(io_error.to_string()),
                &correlation_id,
            ));
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from(bytes),
    )
        .into_response())
}
