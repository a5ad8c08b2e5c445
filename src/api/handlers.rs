//! HTTP endpoint handlers
//!
//! Each handler pulls what it needs out of the request, calls one service
//! method and turns the result into JSON (or raw bytes for downloads).
//! Service errors become `{"detail": "..."}` bodies via [`ApiError`].

use crate::api::AppState;
use crate::services::{FileListing, ShareError, ShareReceipt, Upload};
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write;
use tracing::{error, warn};

/// Multipart field carrying uploaded files.
const FILES_FIELD: &str = "files";

/// Detail sent for internal failures; the cause is only logged.
const INTERNAL_DETAIL: &str = "Internal server error";

/// Form body of the text endpoints.
#[derive(Debug, Deserialize)]
pub struct MessageForm {
    pub message: String,
}

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Share(#[from] ShareError),

    #[error("invalid upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Multipart(e) => e.status(),
            ApiError::Share(e) => match e {
                ShareError::NotFoundOrExpired | ShareError::FileNotFound => StatusCode::NOT_FOUND,
                ShareError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                ShareError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ShareError::DuplicateKey(_)
                | ShareError::StorageIo(_)
                | ShareError::Archive(_)
                | ShareError::NetworkAddressUnresolvable(_)
                | ShareError::QrEncoding(_)
                | ShareError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::Share(ShareError::DuplicateKey(pin)) => {
                error!(pin = %pin, "PIN allocator returned a PIN that is in use")
            }
            _ if status.is_server_error() => error!(status = %status, error = %self, "Request failed"),
            ApiError::Multipart(_) => warn!(error = %self, "Rejected upload"),
            _ => {}
        }

        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            INTERNAL_DETAIL.to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Content-Disposition` for a download named `name`.
///
/// Plain ASCII names go in a quoted `filename`; anything else is
/// percent-encoded into `filename*`.
fn attachment(name: &str) -> HeaderValue {
    let plain = name
        .bytes()
        .all(|b| (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ');

    let value = if plain {
        format!("attachment; filename=\"{}\"", name)
    } else {
        let mut encoded = String::with_capacity(name.len() * 3);
        for b in name.bytes() {
            if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                encoded.push(b as char);
            } else {
                let _ = write!(encoded, "%{:02X}", b);
            }
        }
        format!("attachment; filename*=UTF-8''{}", encoded)
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello, world!" }))
}

/// POST /api/text/share
pub async fn share_text(
    State(state): State<AppState>,
    Form(form): Form<MessageForm>,
) -> ApiResult<Json<ShareReceipt>> {
    Ok(Json(state.text.share(form.message).await?))
}

/// GET /api/text/{pin}
pub async fn fetch_text(
    State(state): State<AppState>,
    Path(pin): Path<String>,
) -> ApiResult<Json<Value>> {
    let message = state.text.fetch(&pin)?;
    Ok(Json(json!({ "message": message })))
}

/// POST /api/text/{pin}
pub async fn replace_text(
    State(state): State<AppState>,
    Path(pin): Path<String>,
    Form(form): Form<MessageForm>,
) -> ApiResult<Json<Value>> {
    state.text.replace(&pin, form.message)?;
    Ok(Json(json!({ "status": "updated" })))
}

/// POST /api/file/share
pub async fn share_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ShareReceipt>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        uploads.push(Upload { name, data });
    }

    Ok(Json(state.files.share(uploads).await?))
}

/// GET /api/file/{pin}
pub async fn list_files(
    State(state): State<AppState>,
    Path(pin): Path<String>,
) -> ApiResult<Json<FileListing>> {
    Ok(Json(state.files.list(&pin).await?))
}

/// GET /api/file/{pin}/all
pub async fn download_all(
    State(state): State<AppState>,
    Path(pin): Path<String>,
) -> ApiResult<Response> {
    let archive = state.files.fetch_archive(&pin).await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename={}", archive.filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/x-zip-compressed")),
            (CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}

/// GET /api/file/{pin}/{filename}
pub async fn download_file(
    State(state): State<AppState>,
    Path((pin, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (name, data) = state.files.fetch_one(&pin, &filename).await?;

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_DISPOSITION, attachment(&name)),
        ],
        data,
    )
        .into_response())
}
