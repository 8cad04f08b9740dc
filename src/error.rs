//! Error handling

use axum::response::{IntoResponse, Redirect};
use tracing::info;

use crate::flow::FlowError;

/// Errors surfaced by the web handlers.
#[derive(Debug)]
pub enum CastingError {
    /// When you didn't do the right thing
    BadRequest,
    /// Missing or mismatched CSRF token
    Unauthorized,
    /// The action doesn't fit the current screen; send them back to it
    WrongStage,
    /// When an internal server error occurs
    InternalServerError(String),
}

impl std::fmt::Display for CastingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest => write!(f, "Bad request"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::WrongStage => write!(f, "Action does not match the current screen"),
            Self::InternalServerError(message) => write!(f, "Internal server error: {message}"),
        }
    }
}

impl std::error::Error for CastingError {}

impl From<tower_sessions::session::Error> for CastingError {
    fn from(err: tower_sessions::session::Error) -> Self {
        CastingError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for CastingError {
    fn from(err: axum::http::Error) -> Self {
        CastingError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for CastingError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        info!("Rejected multipart body: {}", err);
        CastingError::BadRequest
    }
}

impl From<FlowError> for CastingError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::InvalidOption(_) => CastingError::BadRequest,
            FlowError::WrongStage(_) | FlowError::Unseeded => CastingError::WrongStage,
            FlowError::InvalidBracketSize(_) => CastingError::InternalServerError(err.to_string()),
        }
    }
}

impl IntoResponse for CastingError {
    fn into_response(self) -> axum::response::Response {
        match self {
            CastingError::WrongStage => Redirect::to("/").into_response(),
            CastingError::BadRequest => {
                info!("Bad request received");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Bad Request"));
                *response.status_mut() = axum::http::StatusCode::BAD_REQUEST;
                response
            }
            CastingError::Unauthorized => {
                info!("Unauthorized request received");
                let mut response = axum::response::Response::new(axum::body::Body::from(
                    "Unauthorized: invalid or missing session.",
                ));
                *response.status_mut() = axum::http::StatusCode::UNAUTHORIZED;
                response
            }
            CastingError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Internal server error"));
                *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}
