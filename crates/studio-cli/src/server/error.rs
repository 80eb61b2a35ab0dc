//! Error type shared by every handler.
//!
//! Client mistakes come back with their message. Anything unexpected is
//! logged in full and the caller only sees a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use studio_contracts::pipeline::ExternalTool;
use studio_engine::StageError;
use thiserror::Error;
use tracing::error;

const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing fields, undecodable payloads, unknown actions.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("internal error: {err}")]
    Internal {
        err: anyhow::Error,
        suggestion: Option<&'static str>,
    },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Like `From<StageError>`, but unexpected failures carry `suggestion`.
    pub fn stage_with_suggestion(err: StageError, suggestion: &'static str) -> Self {
        match err {
            StageError::Internal(err) => ApiError::Internal {
                err,
                suggestion: Some(suggestion),
            },
            other => ApiError::Stage(other),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal {
            err,
            suggestion: None,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::from(anyhow::Error::new(err).context("stage task did not finish"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, failure(&message)),
            ApiError::Stage(StageError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, failure(&message))
            }
            ApiError::Stage(err @ StageError::ModelUnavailable { .. }) => {
                (StatusCode::BAD_REQUEST, classified(&err))
            }
            ApiError::Stage(err @ StageError::AccessDenied { .. }) => {
                (StatusCode::FORBIDDEN, classified(&err))
            }
            ApiError::Stage(StageError::Internal(err)) => internal(&err, None),
            ApiError::Internal { err, suggestion } => internal(&err, suggestion),
        };
        (status, Json(body)).into_response()
    }
}

fn failure(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

fn classified(err: &StageError) -> Value {
    let tools: &[ExternalTool] = err.external_tools();
    json!({
        "success": false,
        "error": err.to_string(),
        "suggestion": err.suggestion(),
        "externalTools": tools,
    })
}

fn internal(err: &anyhow::Error, suggestion: Option<&'static str>) -> (StatusCode, Value) {
    error!(error = ?err, "request failed");
    let mut body = failure(INTERNAL_MESSAGE);
    if let Some(suggestion) = suggestion {
        body["suggestion"] = Value::from(suggestion);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, body)
}
