//! Streaming download of separated stems.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::handlers::separation::parse_job_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Target format (`mp3`, `wav`, `flac`, `aac`). Anything else is ignored.
    pub format: Option<String>,
}

/// GET /api/download/{job_id}/{filename}?format=
///
/// Streams an output file, converted on the fly when `format` asks for it.
/// A converted scratch file lives exactly as long as the response body.
pub async fn download(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> AppResult<Response> {
    let id = parse_job_id(&job_id)?;
    let artifact = state
        .engine
        .download(id, &filename, query.format.as_deref())
        .await?;

    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    tracing::debug!(
        job_id = %id,
        file = %filename,
        served_as = %artifact.filename,
        converted = artifact.is_converted(),
        "Serving download",
    );

    // The stream owns the scratch file; dropping the body deletes it.
    let temp = artifact.temp;
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _keep = &temp;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.mime_type)
        .header(header::CONTENT_LENGTH, length.to_string())
        .header(header::CONTENT_DISPOSITION, content_disposition(&artifact.filename))
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// `attachment` disposition with an ASCII fallback name and, when the name
/// is not plain ASCII, an RFC 5987 `filename*` parameter.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut value = format!("attachment; filename=\"{fallback}\"");
    if fallback != filename {
        value.push_str("; filename*=UTF-8''");
        for byte in filename.bytes() {
            if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
                value.push(byte as char);
            } else {
                value.push_str(&format!("%{byte:02X}"));
            }
        }
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_names_are_quoted() {
        assert_eq!(
            content_disposition("song-Vocals.mp3"),
            "attachment; filename=\"song-Vocals.mp3\""
        );
    }

    #[test]
    fn non_ascii_names_get_an_encoded_variant() {
        assert_eq!(
            content_disposition("café.wav"),
            "attachment; filename=\"caf_.wav\"; filename*=UTF-8''caf%C3%A9.wav"
        );
    }
}
