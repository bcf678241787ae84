use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::Json;
use axum::response::{IntoResponse, Response};
use tracing::instrument;

use crate::content::Content;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::content::UploadAcceptedResponse;
use crate::state::AppState;

/// Header carrying the SHA-256 of the served bytes.
pub const CHECKSUM_HEADER: &str = "x-content-checksum";
/// Header naming the backend class (`text` or `blob`).
pub const CLASS_HEADER: &str = "x-content-class";

/// Room for multipart boundaries and the optional `filename` field.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Body limit for uploads; oversized payloads are rejected with 413.
pub fn upload_body_limit(max_payload_size: u64) -> DefaultBodyLimit {
    let limit = max_payload_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    post,
    path = "/content",
    tag = "Content",
    operation_id = "uploadContent",
    summary = "Upload content",
    description = "Accepts a file for asynchronous persistence. The `file` multipart field is required; \
        an optional `filename` field overrides the name sent with the file. Names ending in `.txt` \
        are stored as text and must be valid UTF-8; everything else is stored as a blob. \
        Re-uploading a filename replaces its content once processed.",
    request_body(content_type = "multipart/form-data", description = "File upload with optional filename"),
    responses(
        (status = 202, description = "Accepted for processing", body = UploadAcceptedResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 413, description = "Payload too large (PAYLOAD_TOO_LARGE)", body = ErrorBody),
        (status = 503, description = "Queue unavailable (UNAVAILABLE)", body = ErrorBody),
        (status = 504, description = "Queue timed out (TIMEOUT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = %auth_user.user_id))]
pub async fn upload_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let limit = state.gateway.max_payload_size();
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut filename_override: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit, "Multipart error"))?
    {
        match field.name() {
            Some("file") => {
                let name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, limit, "Failed to read file"))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("filename") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read filename: {e}")))?;
                filename_override = Some(text);
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let filename = match filename_override {
        Some(name) if !name.trim().is_empty() => name,
        _ => file_name
            .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?,
    };

    let accepted = state
        .gateway
        .submit_upload(&filename, bytes, Some(auth_user.user_id))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAcceptedResponse::from(accepted)),
    ))
}

#[utoipa::path(
    get,
    path = "/content/{filename}",
    tag = "Content",
    operation_id = "getContent",
    summary = "Download content",
    description = "Returns the stored bytes for a filename. Blob checksums are verified on every read; \
        a record whose bytes are missing or altered yields `CORRUPTED`. Content uploaded but not yet \
        processed is `NOT_FOUND`.",
    params(("filename" = String, Path, description = "Content key")),
    responses(
        (status = 200, description = "Content bytes", content_type = "application/octet-stream",
            headers(
                ("X-Content-Checksum" = String, description = "SHA-256 of the body, hex"),
                ("X-Content-Class" = String, description = "`text` or `blob`"),
            )),
        (status = 304, description = "Not modified (If-None-Match matched)"),
        (status = 400, description = "Invalid filename (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No content (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Stored bytes do not match metadata (CORRUPTED)", body = ErrorBody),
        (status = 503, description = "Backend unavailable (UNAVAILABLE)", body = ErrorBody),
        (status = 504, description = "Backend timed out (TIMEOUT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, headers))]
pub async fn get_content(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let content = state.router.fetch_content(&filename).await?;
    build_content_response(content, &headers)
}

#[utoipa::path(
    delete,
    path = "/content/{filename}",
    tag = "Content",
    operation_id = "deleteContent",
    summary = "Delete content",
    description = "Deletes the content for a filename from its backend. For blobs the metadata row \
        is removed first; bytes that fail to delete are reclaimed later by the orphan sweep.",
    params(("filename" = String, Path, description = "Content key")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Invalid filename (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No content (NOT_FOUND)", body = ErrorBody),
        (status = 503, description = "Backend unavailable (UNAVAILABLE)", body = ErrorBody),
        (status = 504, description = "Backend timed out (TIMEOUT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn delete_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<StatusCode, AppError> {
    state.router.delete_content(&filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The body limit layer trips before the whole upload is read, so the
/// exact size is unknown; report it as just over the limit.
fn multipart_error(err: MultipartError, limit: u64, context: &str) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            actual: limit.saturating_add(1),
            limit,
        }
    } else {
        AppError::Validation(format!("{context}: {err}"))
    }
}

fn build_content_response(content: Content, headers: &HeaderMap) -> Result<Response, AppError> {
    let checksum = content.checksum.to_hex();
    let etag_value = format!("\"{checksum}\"");
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &content.content_type)
        .header(header::CONTENT_LENGTH, content.bytes.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&content.filename),
        )
        .header(header::ETAG, &etag_value)
        .header(
            header::LAST_MODIFIED,
            content
                .updated_at
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        )
        .header(CHECKSUM_HEADER, &checksum)
        .header(CLASS_HEADER, content.class.as_str())
        .body(Body::from(content.bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Build a safe `Content-Disposition` header value.
fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    // RFC 5987 percent-encoding for filename*.
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                String::from(b as char)
            }
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("inline; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
