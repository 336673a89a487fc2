//! Job records and the read-side views handed to pollers.

use std::path::PathBuf;

use serde::Serialize;

use crate::types::{JobId, Timestamp};

/// Progress assigned to a freshly submitted job.
pub const INITIAL_PROGRESS: u8 = 5;

/// Lifecycle state of a separation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Whether this state is final. Terminal records never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A single job as held by the [`JobStore`](crate::store::JobStore).
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    /// Heuristic progress, 0..=100.
    pub progress: u8,
    pub status_message: String,
    /// Set only when `state` is `Failed`.
    pub error_detail: Option<String>,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub model: Option<String>,
    /// Normalized output file names, set on success.
    pub output_files: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// Build the initial `Queued` record for a newly submitted job.
    pub fn queued(
        id: JobId,
        input_path: PathBuf,
        output_dir: PathBuf,
        model: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            state: JobState::Queued,
            progress: INITIAL_PROGRESS,
            status_message: "File uploaded".to_string(),
            error_detail: None,
            input_path,
            output_dir,
            model,
            output_files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn progress_view(&self) -> ProgressView {
        ProgressView {
            progress: self.progress,
            status: self.status_message.clone(),
            complete: self.state.is_terminal(),
            error: self.error_detail.clone(),
        }
    }

    pub fn result_view(&self) -> ResultView {
        match self.state {
            JobState::Succeeded => ResultView::Succeeded {
                job_id: self.id,
                success: true,
                message: "Separation completed successfully".to_string(),
                output_files: self.output_files.clone(),
            },
            JobState::Failed => ResultView::Failed {
                job_id: self.id,
                success: false,
                error: self
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            JobState::Queued | JobState::Running => ResultView::Pending {
                job_id: self.id,
                success: false,
                message: "Job still in progress".to_string(),
                status: self.status_message.clone(),
                progress: self.progress,
            },
        }
    }
}

/// Partial update applied atomically to one record.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub progress: Option<u8>,
    pub status_message: Option<String>,
    pub error_detail: Option<String>,
    pub output_files: Option<Vec<String>>,
}

impl JobUpdate {
    pub fn running(status: impl Into<String>, progress: u8) -> Self {
        Self {
            state: Some(JobState::Running),
            progress: Some(progress),
            status_message: Some(status.into()),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status_message: Some(status.into()),
            ..Self::default()
        }
    }

    /// Terminal success write: progress 100 plus the produced files.
    pub fn succeeded(output_files: Vec<String>) -> Self {
        Self {
            state: Some(JobState::Succeeded),
            progress: Some(100),
            status_message: Some("Complete".to_string()),
            error_detail: None,
            output_files: Some(output_files),
        }
    }

    /// Terminal failure write: progress is forced to 0.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Failed),
            progress: Some(0),
            status_message: Some("Error".to_string()),
            error_detail: Some(error.into()),
            output_files: None,
        }
    }
}

/// Response shape of the progress poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub progress: u8,
    pub status: String,
    pub complete: bool,
    pub error: Option<String>,
}

/// Response shape of the result poll; the three variants never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultView {
    Succeeded {
        job_id: JobId,
        success: bool,
        message: String,
        output_files: Vec<String>,
    },
    Failed {
        job_id: JobId,
        success: bool,
        error: String,
    },
    Pending {
        job_id: JobId,
        success: bool,
        message: String,
        status: String,
        progress: u8,
    },
}
