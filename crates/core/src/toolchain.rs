//! Resolution and probing of the external binaries a job depends on.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ToolchainConfig;
use crate::error::EngineError;

/// Find an executable by searching `PATH`, then each of `fallback_dirs`.
///
/// A `name` containing a path separator is checked as-is.
pub fn resolve_binary(name: &str, fallback_dirs: &[PathBuf]) -> Result<PathBuf, EngineError> {
    let mut searched = Vec::new();

    if name.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
        searched.push(candidate);
    } else {
        if let Some(path_var) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path_var) {
                let candidate = dir.join(name);
                if is_executable(&candidate) {
                    return Ok(candidate);
                }
            }
        }
        for dir in fallback_dirs {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
            searched.push(candidate);
        }
    }

    Err(EngineError::DependencyMissing {
        binary: name.to_string(),
        searched,
    })
}

/// Resolve the companion codec binary configured for the separator.
pub fn resolve_companion(config: &ToolchainConfig) -> Result<PathBuf, EngineError> {
    resolve_binary(&config.companion_bin, &config.fallback_dirs)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ---------------------------------------------------------------------------
// Installation probe
// ---------------------------------------------------------------------------

/// Status of one external dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub message: String,
}

/// Result of probing every external dependency.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationReport {
    pub all_installed: bool,
    pub dependencies: std::collections::BTreeMap<String, DependencyStatus>,
    pub message: String,
}

/// Probe the companion binary and the separator and report what works.
pub async fn check_installation(config: &ToolchainConfig) -> InstallationReport {
    let mut dependencies = std::collections::BTreeMap::new();

    dependencies.insert(
        config.companion_bin.clone(),
        probe_companion(config).await,
    );
    dependencies.insert(
        "audio_separator".to_string(),
        probe_separator(&config.separator_bin).await,
    );

    let all_installed = dependencies.values().all(|d| d.installed);
    let message = if all_installed {
        "All dependencies installed and working"
    } else {
        "Some dependencies are missing"
    };

    InstallationReport {
        all_installed,
        dependencies,
        message: message.to_string(),
    }
}

async fn probe_companion(config: &ToolchainConfig) -> DependencyStatus {
    let path = match resolve_companion(config) {
        Ok(path) => path,
        Err(e) => {
            return DependencyStatus {
                installed: false,
                path: None,
                version: None,
                message: e.to_string(),
            }
        }
    };

    match run_version(&path, "-version").await {
        Ok(stdout) => DependencyStatus {
            installed: true,
            path: Some(path.to_string_lossy().into_owned()),
            version: stdout.lines().next().map(str::to_string),
            message: format!("{} is installed and working", config.companion_bin),
        },
        Err(e) => DependencyStatus {
            installed: false,
            path: Some(path.to_string_lossy().into_owned()),
            version: None,
            message: e,
        },
    }
}

async fn probe_separator(separator: &Path) -> DependencyStatus {
    match run_version(separator, "--version").await {
        Ok(stdout) => DependencyStatus {
            installed: true,
            path: None,
            version: Some(stdout.trim().to_string()),
            message: "audio-separator is installed and working".to_string(),
        },
        Err(e) => DependencyStatus {
            installed: false,
            path: None,
            version: None,
            message: format!("audio-separator is not installed or not working properly: {e}"),
        },
    }
}

async fn run_version(bin: &Path, flag: &str) -> Result<String, String> {
    let output = tokio::process::Command::new(bin)
        .arg(flag)
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        return Err(format!(
            "exit code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
