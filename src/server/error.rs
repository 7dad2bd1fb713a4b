//! Error responses for the HTTP surface.
//!
//! API clients get `{"error": "..."}`; browsers posting the upload form get a
//! small HTML fragment with a link back to the form. The choice follows the
//! request's `Accept` header.
//!
//! Internal and filesystem faults are reported with a generic message; the
//! detail is already in the request's log span.

use crate::error::RequestError;
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// How the client wants errors rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStyle {
    Json,
    Html,
}

impl ReplyStyle {
    /// HTML when `text/html` is listed ahead of (or without) `application/json`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let accept = headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match (accept.find("text/html"), accept.find("application/json")) {
            (Some(html), Some(json)) if html < json => ReplyStyle::Html,
            (Some(_), None) => ReplyStyle::Html,
            _ => ReplyStyle::Json,
        }
    }
}

/// A [`RequestError`] paired with the style to render it in.
#[derive(Debug)]
pub struct ApiError {
    pub error: RequestError,
    pub style: ReplyStyle,
}

impl ApiError {
    pub fn new(error: RequestError, style: ReplyStyle) -> Self {
        Self { error, style }
    }

    fn client_message(&self) -> String {
        match &self.error {
            e if e.is_client_error() => e.to_string(),
            RequestError::Conversion(e) => format!("Conversion failed: {e}"),
            e if e.status_code() == 403 => "Permission denied on the server".to_owned(),
            _ => "Internal server error".to_owned(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.client_message();
        match self.style {
            ReplyStyle::Json => (status, Json(json!({ "error": message }))).into_response(),
            ReplyStyle::Html => (
                status,
                Html(format!(
                    "<h3>{}</h3><a href='/'>Go Back</a>",
                    quick_xml::escape::escape(message.as_str())
                )),
            )
                .into_response(),
        }
    }
}
