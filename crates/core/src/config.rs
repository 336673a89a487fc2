use std::path::PathBuf;
use std::time::Duration;

use crate::progress::ProgressSchedule;

/// Well-known install locations probed when the companion binary is not on `PATH`.
pub const DEFAULT_FALLBACK_DIRS: &[&str] = &[
    "/usr/bin",
    "/usr/local/bin",
    "/bin",
    "/opt/homebrew/bin",
    "/opt/local/bin",
    "/snap/bin",
];

pub const DEFAULT_MODEL: &str = "UVR-MDX-NET-Inst_HQ_3.onnx";

/// How to find the external binaries a job needs.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Separator executable (name looked up on `PATH`, or a path).
    pub separator_bin: PathBuf,
    /// Companion codec binary injected into the separator's environment.
    pub companion_bin: String,
    /// Environment variable the companion's resolved path is exported under.
    pub companion_env: String,
    /// Directories searched after `PATH`.
    pub fallback_dirs: Vec<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            separator_bin: PathBuf::from("audio-separator"),
            companion_bin: "ffmpeg".to_string(),
            companion_env: "FFMPEG_PATH".to_string(),
            fallback_dirs: DEFAULT_FALLBACK_DIRS.iter().map(PathBuf::from).collect(),
        }
    }
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where uploads are staged before a job picks them up.
    pub upload_dir: PathBuf,
    /// Root of the per-job output directories.
    pub output_dir: PathBuf,
    pub default_model: String,
    pub toolchain: ToolchainConfig,
    /// Transcoder used for download conversion.
    pub transcoder_bin: PathBuf,
    /// Directory for converted download scratch files. `None` uses the
    /// system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// Upper bound between two progress updates of a silent process.
    pub poll_interval: Duration,
    /// Grace period after both streams close before the process is killed.
    pub drain_timeout: Duration,
    pub schedule: ProgressSchedule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            default_model: DEFAULT_MODEL.to_string(),
            toolchain: ToolchainConfig::default(),
            transcoder_bin: PathBuf::from("ffmpeg"),
            scratch_dir: None,
            poll_interval: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(5),
            schedule: ProgressSchedule::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                      |
    /// |----------------------|------------------------------|
    /// | `UPLOAD_DIR`         | `uploads`                    |
    /// | `OUTPUT_DIR`         | `outputs`                    |
    /// | `DEFAULT_MODEL`      | `UVR-MDX-NET-Inst_HQ_3.onnx` |
    /// | `SEPARATOR_BIN`      | `audio-separator`            |
    /// | `COMPANION_BIN`      | `ffmpeg`                     |
    /// | `TRANSCODER_BIN`     | `ffmpeg`                     |
    /// | `SCRATCH_DIR`        | system temp dir              |
    /// | `PROGRESS_POLL_MS`   | `500` (must be non-zero)     |
    /// | `DRAIN_TIMEOUT_SECS` | `5`                          |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let upload_dir = env_or("UPLOAD_DIR", defaults.upload_dir);
        let output_dir = env_or("OUTPUT_DIR", defaults.output_dir);
        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or(defaults.default_model);

        let toolchain = ToolchainConfig {
            separator_bin: env_or("SEPARATOR_BIN", defaults.toolchain.separator_bin),
            companion_bin: std::env::var("COMPANION_BIN")
                .unwrap_or(defaults.toolchain.companion_bin),
            ..defaults.toolchain
        };
        let transcoder_bin = env_or("TRANSCODER_BIN", defaults.transcoder_bin);
        let scratch_dir = std::env::var_os("SCRATCH_DIR").map(PathBuf::from);

        let poll_interval = poll_interval_from(parse_env("PROGRESS_POLL_MS"))
            .unwrap_or(defaults.poll_interval);
        let drain_timeout = parse_env("DRAIN_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.drain_timeout);

        Self {
            upload_dir,
            output_dir,
            default_model,
            toolchain,
            transcoder_bin,
            scratch_dir,
            poll_interval,
            drain_timeout,
            schedule: defaults.schedule,
        }
    }
}

fn env_or(key: &str, default: PathBuf) -> PathBuf {
    std::env::var_os(key).map(PathBuf::from).unwrap_or(default)
}

/// A zero interval would stall the progress ticker, so it is rejected.
fn poll_interval_from(millis: Option<u64>) -> Option<Duration> {
    match millis? {
        0 => {
            tracing::warn!("Ignoring PROGRESS_POLL_MS=0, the poll interval must be non-zero");
            None
        }
        ms => Some(Duration::from_millis(ms)),
    }
}

fn parse_env(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid numeric setting");
            None
        }
    }
}
