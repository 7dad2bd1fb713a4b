//! Route handlers.

use super::error::{ApiError, ReplyStyle};
use crate::error::RequestError;
use crate::format::Format;
use crate::lifecycle::{ConversionRequest, ConversionService, ConvertedFile};
use crate::router;
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

static INDEX_HTML: &str = include_str!("../../static/index.html");

/// `GET /`: the upload form.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /formats`: `{source: [targets…]}`.
pub async fn formats() -> Json<BTreeMap<Format, Vec<Format>>> {
    Json(router::capabilities())
}

/// `POST /convert`: multipart `file` + `target_format`; replies with the
/// converted file as an attachment.
pub async fn convert(
    State(service): State<Arc<ConversionService>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let style = ReplyStyle::from_headers(&headers);
    let fail = |error: RequestError| ApiError::new(error, style);

    let multipart =
        multipart.map_err(|rejection| fail(RequestError::InvalidInput(rejection.body_text())))?;
    let limit = service.config().max_upload_bytes;
    let request = read_upload(multipart, limit).await.map_err(fail)?;
    let file = service.convert(request).await.map_err(fail)?;
    Ok(attachment(file))
}

fn multipart_error(e: MultipartError, limit: usize) -> RequestError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RequestError::PayloadTooLarge { limit }
    } else {
        RequestError::InvalidInput(format!("malformed upload: {}", e.body_text()))
    }
}

/// Pull `file` and `target_format` out of the form, enforcing the size
/// ceiling while the file streams in.
async fn read_upload(
    mut multipart: Multipart,
    limit: usize,
) -> Result<ConversionRequest, RequestError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut target_format: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mut data = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| multipart_error(e, limit))?
                {
                    if data.len() + chunk.len() > limit {
                        return Err(RequestError::PayloadTooLarge { limit });
                    }
                    data.extend_from_slice(&chunk);
                }
                debug!(file_name = %name, size_bytes = data.len(), "received file upload");
                file = Some((name, data));
            }
            "target_format" | "conversion_type" => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                target_format = Some(value);
            }
            other => debug!(field = %other, "ignoring unknown form field"),
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| RequestError::InvalidInput("no file part in the request".into()))?;
    let target_format = target_format
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| RequestError::InvalidInput("target_format is required".into()))?;
    Ok(ConversionRequest::new(file_name, data, target_format))
}

fn attachment(file: ConvertedFile) -> Response {
    let headers = [
        (CONTENT_TYPE, file.mime().to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.file_name()),
        ),
        (CONTENT_LENGTH, file.len().to_string()),
    ];
    (headers, Body::from_stream(file.into_stream())).into_response()
}
