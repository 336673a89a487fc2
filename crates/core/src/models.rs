//! Catalog of separation models reported by the separator tool.

use std::path::PathBuf;
use std::process::Stdio;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::DEFAULT_MODEL;

/// Used when the tool runs but lists nothing recognizable.
pub const DEFAULT_MODELS: &[&str] = &[
    DEFAULT_MODEL,
    "UVR_MDXNET_KARA_2.onnx",
    "Kim_Vocal_2.onnx",
    "UVR-MDX-NET-Inst_3.onnx",
];

const MODEL_EXTENSIONS: &[&str] = &[".onnx", ".ckpt", ".pt", ".pth", ".yaml"];

/// Models offered to clients. `note` explains a fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelList {
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ModelList {
    fn fallback(models: &[&str], note: &str) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            note: Some(note.to_string()),
        }
    }
}

/// Extract model file names from `--list_models` output.
///
/// Per line, the first token with a model file extension wins; otherwise
/// the first token. Headers and rule lines are skipped.
pub fn parse_model_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Available models"))
        .filter(|line| !line.chars().all(|c| matches!(c, '-' | '=' | ' ')))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let first = tokens.clone().next()?;
            let named = tokens.find(|t| MODEL_EXTENSIONS.iter().any(|ext| t.ends_with(ext)));
            Some(named.unwrap_or(first).to_string())
        })
        .collect()
}

/// Lazily populated, refreshable model list.
pub struct ModelCatalog {
    separator_bin: PathBuf,
    cache: RwLock<Option<ModelList>>,
}

impl ModelCatalog {
    pub fn new(separator_bin: impl Into<PathBuf>) -> Self {
        Self {
            separator_bin: separator_bin.into(),
            cache: RwLock::new(None),
        }
    }

    /// Return the cached list, querying the tool on first use or when
    /// `force_refresh` is set. Fallback lists are never cached.
    pub async fn list(&self, force_refresh: bool) -> ModelList {
        if !force_refresh {
            if let Some(cached) = self.cache.read().await.as_ref() {
                return cached.clone();
            }
        }

        let list = self.fetch().await;
        if list.note.is_none() {
            *self.cache.write().await = Some(list.clone());
        }
        list
    }

    async fn fetch(&self) -> ModelList {
        let output = tokio::process::Command::new(&self.separator_bin)
            .arg("--list_models")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let models = parse_model_list(&String::from_utf8_lossy(&output.stdout));
                if models.is_empty() {
                    tracing::warn!("Separator listed no models, using defaults");
                    return ModelList::fallback(
                        DEFAULT_MODELS,
                        "No models reported, using default models",
                    );
                }
                tracing::debug!(count = models.len(), "Loaded model list");
                ModelList { models, note: None }
            }
            Ok(output) => {
                tracing::warn!(
                    code = ?output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Model listing failed",
                );
                ModelList::fallback(&DEFAULT_MODELS[..2], "Using default models due to error")
            }
            Err(e) => {
                tracing::error!(
                    bin = %self.separator_bin.display(),
                    error = %e,
                    "Could not run separator for model listing",
                );
                ModelList::fallback(&DEFAULT_MODELS[..1], "Using default model due to error")
            }
        }
    }
}
