//! On-demand format conversion of separated stems for download.
//!
//! Conversion is best effort: an unknown format is ignored and a failed
//! transcode falls back to serving the original file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempPath;

use crate::error::EngineError;
use crate::postprocess::STEM_NAMES;

/// Formats a stem can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Aac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [Self::Mp3, Self::Wav, Self::Flac, Self::Aac];

    /// Case-insensitive lookup by file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Aac => "aac",
        }
    }

    /// Encoder flags passed to the transcoder.
    pub fn codec_args(self) -> &'static [&'static str] {
        match self {
            Self::Mp3 => &["-c:a", "libmp3lame", "-q:a", "2"],
            Self::Wav => &["-c:a", "pcm_s16le"],
            Self::Flac => &["-c:a", "flac"],
            Self::Aac => &["-c:a", "aac", "-b:a", "256k"],
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
            Self::Aac => "audio/aac",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim())
            .ok_or_else(|| EngineError::InputValidation(format!("unsupported audio format: {s}")))
    }
}

/// MIME type for a file extension, including the upload-only formats.
pub fn mime_for_extension(ext: &str) -> &'static str {
    if let Some(format) = AudioFormat::from_extension(ext) {
        return format.mime_type();
    }
    match ext.to_ascii_lowercase().as_str() {
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Transcoder
// ---------------------------------------------------------------------------

/// Converts one audio file into another format.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, src: &Path, dst: &Path, format: AudioFormat)
        -> Result<(), EngineError>;
}

/// Runs `ffmpeg -i <src> -y <codec flags> <dst>`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    bin: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        format: AudioFormat,
    ) -> Result<(), EngineError> {
        let output = tokio::process::Command::new(&self.bin)
            .arg("-i")
            .arg(src)
            .arg("-y")
            .args(format.codec_args())
            .arg(dst)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                EngineError::Unexpected(format!("failed to start {}: {e}", self.bin.display()))
            })?;

        if !output.status.success() {
            return Err(EngineError::ProcessFailure {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Download preparation
// ---------------------------------------------------------------------------

/// A file ready to be streamed to a client.
///
/// When `temp` is set, `path` points at a converted scratch file that is
/// deleted as soon as the artifact (or whoever took `temp`) is dropped.
#[derive(Debug)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    /// Name suggested to the client in `Content-Disposition`.
    pub filename: String,
    pub mime_type: &'static str,
    pub temp: Option<TempPath>,
}

impl DownloadArtifact {
    pub fn is_converted(&self) -> bool {
        self.temp.is_some()
    }
}

/// Prepares stems for download, converting them when asked.
#[derive(Clone)]
pub struct ConversionService {
    transcoder: Arc<dyn Transcoder>,
    scratch_dir: Option<PathBuf>,
}

impl ConversionService {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            scratch_dir: None,
        }
    }

    /// Create converted files under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        self
    }

    /// Resolve `source` into a downloadable artifact.
    ///
    /// `job_prefix` is stripped from the suggested file name. The transcoder
    /// runs only when `requested` names a known format different from the
    /// source's own.
    pub async fn prepare(
        &self,
        source: &Path,
        job_prefix: &str,
        requested: Option<&str>,
    ) -> DownloadArtifact {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let original_ext = extension_of(&name).to_ascii_lowercase();

        let target = requested
            .filter(|r| !r.trim().is_empty())
            .and_then(|r| match r.parse::<AudioFormat>() {
                Ok(format) => Some(format),
                Err(_) => {
                    tracing::debug!(requested = r, "Ignoring unknown download format");
                    None
                }
            })
            .filter(|format| format.extension() != original_ext);

        if let Some(format) = target {
            match self.convert(source, format).await {
                Ok(temp) => {
                    tracing::info!(file = %name, format = %format, "Converted download");
                    return DownloadArtifact {
                        path: temp.to_path_buf(),
                        filename: download_filename(&name, job_prefix, format.extension()),
                        mime_type: format.mime_type(),
                        temp: Some(temp),
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        file = %name,
                        format = %format,
                        error = %e,
                        "Conversion failed, serving original",
                    );
                }
            }
        }

        DownloadArtifact {
            path: source.to_path_buf(),
            filename: download_filename(&name, job_prefix, &original_ext),
            mime_type: mime_for_extension(&original_ext),
            temp: None,
        }
    }

    /// Transcode into a fresh scratch file. The file is removed on error.
    async fn convert(&self, source: &Path, format: AudioFormat) -> Result<TempPath, EngineError> {
        let suffix = format!(".{}", format.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("stemsep-").suffix(&suffix);
        let file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let temp = file.into_temp_path();

        self.transcoder.transcode(source, &temp, format).await?;
        Ok(temp)
    }
}

fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx + 1..],
        _ => "",
    }
}

/// File name offered to the client: `<clean name>[-<Stem>].<ext>`.
///
/// The stem comes from a `(Stem)` marker or a trailing `-Stem`, so both raw
/// and normalized separator outputs map to the same shape.
pub fn download_filename(name: &str, job_prefix: &str, ext: &str) -> String {
    let name = name
        .strip_prefix(job_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .filter(|_| !job_prefix.is_empty())
        .unwrap_or(name);

    let base = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };

    let mut clean = base.to_string();
    let mut stem = None;

    for candidate in STEM_NAMES {
        let marker = format!("({candidate})");
        if clean.contains(&marker) {
            stem.get_or_insert(*candidate);
            clean = clean.replace(&marker, "");
        }
    }
    if stem.is_none() {
        for candidate in STEM_NAMES {
            if let Some(rest) = clean.strip_suffix(&format!("-{candidate}")) {
                stem = Some(*candidate);
                clean = rest.to_string();
                break;
            }
        }
    }

    while clean.contains("  ") || clean.contains("__") {
        clean = clean.replace("  ", " ").replace("__", "_");
    }
    let clean = clean.trim_matches(|c| matches!(c, '_' | '-' | ' '));
    let clean = if clean.is_empty() { "track" } else { clean };

    let mut out = clean.to_string();
    if let Some(stem) = stem {
        out.push('-');
        out.push_str(stem);
    }
    if !ext.is_empty() {
        out.push('.');
        out.push_str(ext);
    }
    out
}
