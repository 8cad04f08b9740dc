pub(crate) use super::AppState;
pub(crate) use super::flash::{self, Notice};
pub(crate) use super::{csrf, store};
pub(crate) use crate::error::CastingError;
pub(crate) use crate::flow::{Action, Stage, reduce};
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Form, Multipart, State};
pub(crate) use axum::response::{IntoResponse, Redirect, Response};
pub(crate) use serde::Deserialize;
pub(crate) use tower_sessions::Session;
pub(crate) use tracing::{debug, info, warn};
