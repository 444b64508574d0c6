//! Sequential batch execution.
//!
//! A batch turns an ordered list of [`JobRequest`]s into output files one job at
//! a time. Progress, status lines and per-job errors are pushed to the caller as
//! [`BatchEvent`]s. A failing job never stops the batch; only cancellation does.

use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::encoder::ProgressSink;
use crate::media::{JobRequest, MediaKind, TranscodeJob, TranscodeOptions, Transcoder};

/// Messages from a running batch to whoever is watching it
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// Overall completion in `[0, 1]`, never decreasing
    Progress(f64),
    Status(String),
    Error(String),
    /// Always the last event of a batch
    Completed { success: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: Option<MediaKind>,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    CompletedWithErrors,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub state: BatchState,
    /// One entry per request that was looked at, in order
    pub reports: Vec<JobReport>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.state == BatchState::Completed && self.failed_count() == 0
    }

    pub fn failed_count(&self) -> usize {
        self.count(|status| matches!(status, JobStatus::Failed(_)))
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(|status| matches!(status, JobStatus::Success))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|status| matches!(status, JobStatus::Skipped(_)))
    }

    fn count(&self, predicate: impl Fn(&JobStatus) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.status)).count()
    }
}

fn emit(events: &UnboundedSender<BatchEvent>, event: BatchEvent) {
    if events.send(event).is_err() {
        trace!("batch event dropped, receiver is gone");
    }
}

/// Batch-wide progress; emits only when the value grows
struct OverallProgress<'a> {
    events: &'a UnboundedSender<BatchEvent>,
    total_jobs: usize,
    last: Mutex<f64>,
}

impl<'a> OverallProgress<'a> {
    fn new(events: &'a UnboundedSender<BatchEvent>, total_jobs: usize) -> Self {
        Self {
            events,
            total_jobs,
            last: Mutex::new(0.0),
        }
    }

    fn report(&self, completed_jobs: usize, job_fraction: f64) {
        let overall = if self.total_jobs == 0 {
            1.0
        } else {
            ((completed_jobs as f64 + job_fraction.clamp(0.0, 1.0)) / self.total_jobs as f64)
                .min(1.0)
        };

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if overall >= *last {
            *last = overall;
            emit(self.events, BatchEvent::Progress(overall));
        }
    }
}

/// Progress sink handed to the transcoder for one job
struct JobProgress<'a> {
    overall: &'a OverallProgress<'a>,
    completed_jobs: usize,
}

impl ProgressSink for JobProgress<'_> {
    fn progress(&self, fraction: f64) {
        self.overall.report(self.completed_jobs, fraction);
    }

    fn warning(&self, message: &str) {
        emit(self.overall.events, BatchEvent::Error(message.to_string()));
    }
}

/// Runs batches against a [`Transcoder`]
#[derive(Clone)]
pub struct BatchCoordinator {
    transcoder: Arc<dyn Transcoder>,
}

impl BatchCoordinator {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Run every request in order on the current task
    pub async fn run(
        &self,
        requests: &[JobRequest],
        options: &TranscodeOptions,
        events: &UnboundedSender<BatchEvent>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        self.execute(Uuid::new_v4(), requests, options, events, cancel)
            .await
    }

    /// Run the batch on its own task
    pub fn spawn(&self, requests: Vec<JobRequest>, options: TranscodeOptions) -> BatchHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let batch_id = Uuid::new_v4();

        let worker = {
            let coordinator = self.clone();
            let events = events_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                coordinator
                    .execute(batch_id, &requests, &options, &events, &cancel)
                    .await
            })
        };

        let join = tokio::spawn(async move {
            match worker.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    error!("Batch {} aborted: {}", batch_id, reason);
                    emit(
                        &events_tx,
                        BatchEvent::Error(format!("An unexpected error occurred: {}", reason)),
                    );
                    emit(&events_tx, BatchEvent::Completed { success: false });
                    BatchOutcome {
                        batch_id,
                        state: BatchState::Failed,
                        reports: Vec::new(),
                    }
                }
            }
        });

        BatchHandle {
            batch_id,
            events: events_rx,
            cancel,
            join,
        }
    }

    async fn execute(
        &self,
        batch_id: Uuid,
        requests: &[JobRequest],
        options: &TranscodeOptions,
        events: &UnboundedSender<BatchEvent>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let span = info_span!("batch", id = %batch_id);
        self.process(batch_id, requests, options, events, cancel)
            .instrument(span)
            .await
    }

    async fn process(
        &self,
        batch_id: Uuid,
        requests: &[JobRequest],
        options: &TranscodeOptions,
        events: &UnboundedSender<BatchEvent>,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let total_jobs = requests.len();
        let overall = OverallProgress::new(events, total_jobs);
        let mut reports = Vec::with_capacity(total_jobs);
        let mut completed_jobs = 0;

        info!("Starting batch of {} files", total_jobs);
        emit(events, BatchEvent::Status("Starting compression...".to_string()));

        for request in requests {
            if cancel.is_cancelled() {
                return interrupted(batch_id, reports, events);
            }

            let Some(job) = TranscodeJob::from_request(request) else {
                let message = format!("Unsupported file type: {}", request.source.display());
                warn!("{}", message);
                emit(events, BatchEvent::Status(message.clone()));
                emit(events, BatchEvent::Error(message.clone()));
                reports.push(JobReport {
                    source: request.source.clone(),
                    destination: request.destination.clone(),
                    kind: None,
                    status: JobStatus::Skipped(message),
                });
                completed_jobs += 1;
                overall.report(completed_jobs, 0.0);
                continue;
            };

            let name = job.source_name();
            info!("Processing {} ({})", name, job.kind());
            let sink = JobProgress {
                overall: &overall,
                completed_jobs,
            };

            let status = match self.transcoder.transcode(&job, options, &sink, cancel).await {
                Ok(()) => {
                    completed_jobs += 1;
                    overall.report(completed_jobs, 0.0);
                    emit(
                        events,
                        BatchEvent::Status(format!("Compressed {}/{} files.", completed_jobs, total_jobs)),
                    );
                    emit(
                        events,
                        BatchEvent::Status(format!("Successfully compressed: {}", name)),
                    );
                    JobStatus::Success
                }
                Err(e) if e.is_cancelled() => {
                    warn!("Encoding of {} was terminated", name);
                    reports.push(report_for(&job, JobStatus::Failed(e.to_string())));
                    return interrupted(batch_id, reports, events);
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", name, e);
                    emit(events, BatchEvent::Status(format!("Error processing {}.", name)));
                    emit(
                        events,
                        BatchEvent::Error(format!("Error processing {}: {}", name, e)),
                    );
                    completed_jobs += 1;
                    overall.report(completed_jobs, 0.0);
                    JobStatus::Failed(e.to_string())
                }
            };
            reports.push(report_for(&job, status));
        }

        let success = !reports
            .iter()
            .any(|r| matches!(r.status, JobStatus::Failed(_)));
        let (state, message) = if success {
            (BatchState::Completed, "Compression complete!")
        } else {
            (BatchState::CompletedWithErrors, "Compression completed with errors.")
        };

        info!("{}", message);
        emit(events, BatchEvent::Progress(1.0));
        emit(events, BatchEvent::Status(message.to_string()));
        emit(events, BatchEvent::Completed { success });

        BatchOutcome {
            batch_id,
            state,
            reports,
        }
    }
}

fn report_for(job: &TranscodeJob, status: JobStatus) -> JobReport {
    JobReport {
        source: job.source().to_path_buf(),
        destination: job.destination().to_path_buf(),
        kind: Some(job.kind()),
        status,
    }
}

fn interrupted(
    batch_id: Uuid,
    reports: Vec<JobReport>,
    events: &UnboundedSender<BatchEvent>,
) -> BatchOutcome {
    info!("Batch interrupted after {} files", reports.len());
    emit(events, BatchEvent::Status("Compression interrupted.".to_string()));
    emit(events, BatchEvent::Completed { success: false });
    BatchOutcome {
        batch_id,
        state: BatchState::Cancelled,
        reports,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// A batch running on its own task
pub struct BatchHandle {
    batch_id: Uuid,
    /// Event stream; closes once the batch is over
    pub events: UnboundedReceiver<BatchEvent>,
    cancel: CancellationToken,
    join: JoinHandle<BatchOutcome>,
}

impl BatchHandle {
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Stop before the next job starts
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the batch to finish
    pub async fn outcome(self) -> BatchOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Batch supervisor failed: {}", e);
                BatchOutcome {
                    batch_id: self.batch_id,
                    state: BatchState::Failed,
                    reports: Vec::new(),
                }
            }
        }
    }
}
