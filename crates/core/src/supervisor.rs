//! Supervision of one external separator process per job.
//!
//! A supervisor task owns the whole run: dependency resolution, spawn,
//! stream multiplexing, progress estimation and the single terminal write.
//! Every failure is turned into a `Failed` record; nothing propagates out
//! of the task. The uploaded input file is deleted exactly once, on every
//! exit path, by an [`UploadGuard`].

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::job::JobUpdate;
use crate::postprocess::normalize_outputs;
use crate::progress::{status_for_line, ProgressEstimator, SPAWN_PROGRESS};
use crate::separator::{normalize_model, SeparatorCommand};
use crate::store::JobStore;
use crate::toolchain::resolve_companion;
use crate::types::JobId;

/// Everything a supervisor needs to run one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub model: Option<String>,
}

/// How a supervised run ended. Mirrors the terminal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { output_files: Vec<String> },
    Failed { error: String },
}

/// Handle to a running supervisor task.
///
/// Dropping the handle detaches the task; it keeps running to completion.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the supervisor to write its terminal record.
    pub async fn wait(self) -> JobOutcome {
        self.task.await.unwrap_or_else(|e| JobOutcome::Failed {
            error: format!("supervisor task aborted: {e}"),
        })
    }
}

/// Deletes the uploaded input file when dropped, unless released.
#[derive(Debug)]
pub struct UploadGuard {
    path: Option<PathBuf>,
}

impl UploadGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Hand ownership of the file to someone else without deleting it.
    pub fn release(mut self) -> Option<PathBuf> {
        self.path.take()
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed uploaded input"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove uploaded input",
            ),
        }
    }
}

/// Spawns and watches separator processes, writing their state to the store.
#[derive(Clone)]
pub struct ProcessSupervisor {
    store: Arc<JobStore>,
    config: Arc<EngineConfig>,
    estimator: ProgressEstimator,
}

impl ProcessSupervisor {
    pub fn new(store: Arc<JobStore>, config: Arc<EngineConfig>) -> Self {
        let estimator = ProgressEstimator::new(config.schedule);
        Self {
            store,
            config,
            estimator,
        }
    }

    /// Start supervising `spec` in a new task and return immediately.
    ///
    /// The run itself happens in an inner task so that a panic still ends
    /// in a terminal `Failed` record. The upload guard is dropped while the
    /// panic unwinds.
    pub fn spawn(&self, spec: JobSpec) -> JobHandle {
        let id = spec.id;
        let supervisor = self.clone();
        let task = tokio::spawn(async move {
            let inner = supervisor.clone();
            match tokio::spawn(async move { inner.supervise(spec).await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = format!("Unexpected error: supervisor aborted: {e}");
                    tracing::error!(job_id = %id, error = %e, "Supervisor task aborted");
                    supervisor.write(id, JobUpdate::failed(error.clone())).await;
                    JobOutcome::Failed { error }
                }
            }
        });
        JobHandle { id, task }
    }

    /// Run the job to completion and write exactly one terminal update.
    pub async fn supervise(&self, spec: JobSpec) -> JobOutcome {
        let upload = UploadGuard::new(spec.input_path.clone());
        let result = self.run(&spec).await;
        // Remove the input before pollers can observe a terminal state.
        drop(upload);

        match result {
            Ok(output_files) => {
                tracing::info!(job_id = %spec.id, files = output_files.len(), "Separation complete");
                self.write(spec.id, JobUpdate::succeeded(output_files.clone()))
                    .await;
                JobOutcome::Succeeded { output_files }
            }
            Err(e) => {
                let error = failure_detail(&e);
                tracing::error!(job_id = %spec.id, error = %e, "Separation failed");
                self.write(spec.id, JobUpdate::failed(error.clone())).await;
                JobOutcome::Failed { error }
            }
        }
    }

    async fn run(&self, spec: &JobSpec) -> Result<Vec<String>, EngineError> {
        let toolchain = &self.config.toolchain;
        let companion = resolve_companion(toolchain)?;

        self.write(spec.id, JobUpdate::running("Processing started", 10))
            .await;

        tokio::fs::create_dir_all(&spec.output_dir).await?;

        let model = normalize_model(spec.model.as_deref());
        let mut cmd = SeparatorCommand::new(
            &toolchain.separator_bin,
            &spec.input_path,
            &spec.output_dir,
            model.as_deref(),
        )
        .with_companion(&toolchain.companion_env, &companion)
        .to_command();

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            EngineError::Unexpected(format!(
                "failed to start {}: {e}",
                toolchain.separator_bin.display()
            ))
        })?;
        let started = Instant::now();

        tracing::info!(
            job_id = %spec.id,
            model = model.as_deref().unwrap_or("default"),
            companion = %companion.display(),
            "Separator process started",
        );
        self.write(
            spec.id,
            JobUpdate::running("Separation process started", SPAWN_PROGRESS),
        )
        .await;

        let (status, stderr) = self.monitor(spec.id, child, started).await?;

        if !status.success() {
            return Err(EngineError::ProcessFailure {
                exit_code: status.code(),
                stderr,
            });
        }

        let files = list_output_files(&spec.output_dir).await?;
        if files.is_empty() {
            return Err(EngineError::Unexpected(
                "separator produced no output files".to_string(),
            ));
        }

        Ok(normalize_outputs(&spec.output_dir, files, model.as_deref()).await)
    }

    /// Multiplex stdout, stderr, process exit and the progress ticker until
    /// both streams are closed and the process has exited.
    ///
    /// Returns the exit status and the verbatim stderr.
    async fn monitor(
        &self,
        id: JobId,
        mut child: Child,
        started: Instant,
    ) -> Result<(ExitStatus, String), EngineError> {
        let mut stdout = LineStream::new(
            child
                .stdout
                .take()
                .ok_or_else(|| EngineError::Unexpected("stdout was not captured".into()))?,
        );
        let mut stderr = LineStream::new(
            child
                .stderr
                .take()
                .ok_or_else(|| EngineError::Unexpected("stderr was not captured".into()))?,
        );

        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut stderr_buf = String::new();
        let mut exit_status: Option<ExitStatus> = None;
        let mut progress = SPAWN_PROGRESS;
        let mut last_status: Option<&'static str> = None;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            if !stdout_open && !stderr_open {
                if let Some(exit) = exit_status {
                    break exit;
                }
                break self.drain(id, &mut child).await?;
            }

            tokio::select! {
                line = stdout.next_line(), if stdout_open => match line? {
                    Some(line) => {
                        tracing::trace!(job_id = %id, line = %line, "separator stdout");
                        if let Some(next) = status_for_line(&line) {
                            if last_status != Some(next) {
                                last_status = Some(next);
                                self.write(id, JobUpdate::status(next)).await;
                            }
                        }
                        self.advance(id, &mut progress, started).await;
                    }
                    None => stdout_open = false,
                },
                line = stderr.next_line(), if stderr_open => match line? {
                    Some(line) => {
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                    None => stderr_open = false,
                },
                exit = child.wait(), if exit_status.is_none() => {
                    let exit = exit?;
                    tracing::debug!(job_id = %id, code = ?exit.code(), "Separator exited");
                    exit_status = Some(exit);
                }
                _ = ticker.tick() => {
                    self.advance(id, &mut progress, started).await;
                }
            }
        };

        Ok((exit, stderr_buf))
    }

    /// Both streams are closed; give the process `drain_timeout` to exit,
    /// then kill it.
    async fn drain(&self, id: JobId, child: &mut Child) -> Result<ExitStatus, EngineError> {
        match tokio::time::timeout(self.config.drain_timeout, child.wait()).await {
            Ok(exit) => Ok(exit?),
            Err(_) => {
                tracing::warn!(
                    job_id = %id,
                    timeout_ms = self.config.drain_timeout.as_millis() as u64,
                    "Separator lingered after closing its streams, killing it",
                );
                child.kill().await?;
                Ok(child.wait().await?)
            }
        }
    }

    /// Publish the elapsed-time estimate if it raises the current progress.
    async fn advance(&self, id: JobId, current: &mut u8, started: Instant) {
        if let Some(next) = self.estimator.advance(*current, started.elapsed()) {
            *current = next;
            self.write(id, JobUpdate::progress(next)).await;
        }
    }

    async fn write(&self, id: JobId, update: JobUpdate) {
        if let Err(e) = self.store.update(id, update).await {
            tracing::warn!(job_id = %id, error = %e, "Dropped job update");
        }
    }
}

/// Text stored as `error_detail` for a failed run.
fn failure_detail(err: &EngineError) -> String {
    match err {
        EngineError::ProcessFailure { stderr, .. } if !stderr.trim().is_empty() => stderr.clone(),
        EngineError::ProcessFailure {
            exit_code: Some(code),
            ..
        } => format!("separator exited with code {code}"),
        EngineError::ProcessFailure {
            exit_code: None, ..
        } => "separator was terminated by a signal".to_string(),
        other => other.to_string(),
    }
}

/// Names of the regular files directly inside `dir`, sorted.
async fn list_output_files(dir: &Path) -> Result<Vec<String>, EngineError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

/// Line reader that tolerates invalid UTF-8 and is safe to use in `select!`:
/// bytes of a partially read line stay in `buf` across cancellations.
struct LineStream<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineStream<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at EOF.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}
