//! Facade over the store, supervisor, conversion and catalog services.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::conversion::{ConversionService, DownloadArtifact, FfmpegTranscoder, Transcoder};
use crate::error::CoreError;
use crate::job::{JobRecord, ProgressView, ResultView};
use crate::models::{ModelCatalog, ModelList};
use crate::store::JobStore;
use crate::supervisor::{JobHandle, JobSpec, ProcessSupervisor};
use crate::toolchain::{check_installation, InstallationReport};
use crate::types::JobId;

/// Entry point for submitting and observing separation jobs.
pub struct SeparationEngine {
    config: Arc<EngineConfig>,
    store: Arc<JobStore>,
    supervisor: ProcessSupervisor,
    conversion: ConversionService,
    models: ModelCatalog,
}

impl SeparationEngine {
    /// Build an engine that converts downloads with the configured ffmpeg.
    pub fn new(config: EngineConfig) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder_bin.clone()));
        Self::with_transcoder(config, transcoder)
    }

    pub fn with_transcoder(config: EngineConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(JobStore::new());
        Self {
            supervisor: ProcessSupervisor::new(store.clone(), config.clone()),
            conversion: ConversionService::new(transcoder)
                .with_scratch_dir(config.scratch_dir.clone()),
            models: ModelCatalog::new(config.toolchain.separator_bin.clone()),
            config,
            store,
        }
    }

    /// Create the upload and output roots.
    pub async fn init(&self) -> Result<(), CoreError> {
        for dir in [&self.config.upload_dir, &self.config.output_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                CoreError::Internal(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Where the upload for job `id` with sanitized name `name` is staged.
    pub fn upload_path(&self, id: JobId, name: &str) -> PathBuf {
        self.config.upload_dir.join(format!("{id}_{name}"))
    }

    /// Register a job for an already-staged `input` and start supervising it.
    ///
    /// Returns as soon as the record exists and the supervisor task is
    /// spawned. Without a model the configured default is used.
    pub async fn submit(
        &self,
        id: JobId,
        input: PathBuf,
        model: Option<String>,
    ) -> Result<JobHandle, CoreError> {
        if !tokio::fs::metadata(&input)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(CoreError::Validation(format!(
                "input file {} does not exist",
                input.display()
            )));
        }

        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        let output_dir = self.config.output_dir.join(id.to_string());

        self.store
            .create(JobRecord::queued(
                id,
                input.clone(),
                output_dir.clone(),
                Some(model.clone()),
            ))
            .await?;

        tracing::info!(job_id = %id, model = %model, input = %input.display(), "Job submitted");

        Ok(self.supervisor.spawn(JobSpec {
            id,
            input_path: input,
            output_dir,
            model: Some(model),
        }))
    }

    pub async fn progress(&self, id: JobId) -> Option<ProgressView> {
        self.store.get(id).await.map(|r| r.progress_view())
    }

    pub async fn result(&self, id: JobId) -> Option<ResultView> {
        self.store.get(id).await.map(|r| r.result_view())
    }

    pub async fn job(&self, id: JobId) -> Result<JobRecord, CoreError> {
        self.store.get(id).await.ok_or_else(|| CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        })
    }

    /// Resolve an output file of job `id` for download, converting it to
    /// `format` when possible.
    ///
    /// `filename` must be a single plain path component.
    pub async fn download(
        &self,
        id: JobId,
        filename: &str,
        format: Option<&str>,
    ) -> Result<DownloadArtifact, CoreError> {
        let record = self.job(id).await?;

        let not_found = || CoreError::NotFound {
            entity: "File",
            id: filename.to_string(),
        };
        if !is_plain_file_name(filename) {
            return Err(not_found());
        }

        let path = record.output_dir.join(filename);
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(not_found());
        }

        Ok(self
            .conversion
            .prepare(&path, &id.to_string(), format)
            .await)
    }

    pub async fn models(&self, force_refresh: bool) -> ModelList {
        self.models.list(force_refresh).await
    }

    pub async fn check_installation(&self) -> InstallationReport {
        check_installation(&self.config.toolchain).await
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}
