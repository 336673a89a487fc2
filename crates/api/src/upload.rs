//! Validation and sanitizing of uploaded audio file names.

use std::sync::LazyLock;

use regex::Regex;
use stemsep_core::error::EngineError;

/// Extensions accepted by `POST /api/separate`.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a"];

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("valid regex"));

/// Lowercased extension of `name` if it is an accepted audio type.
pub fn allowed_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Non-ASCII characters are dropped, path separators and whitespace become
/// `_`, anything outside `[A-Za-z0-9_.-]` is removed and leading or trailing
/// dots and underscores are trimmed. May return an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if matches!(c, '/' | '\\') { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Validate an uploaded file name and return the name it is stored under.
pub fn validate_upload_name(name: &str) -> Result<String, EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InputValidation("No selected file".to_string()));
    }
    let ext = allowed_extension(name).ok_or_else(|| {
        EngineError::InputValidation(format!(
            "File type not allowed. Allowed types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))
    })?;

    let sanitized = sanitize_filename(name);
    if allowed_extension(&sanitized).as_deref() == Some(ext.as_str())
        && sanitized.len() > ext.len() + 1
    {
        Ok(sanitized)
    } else {
        Ok(format!("upload.{ext}"))
    }
}
