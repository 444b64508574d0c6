use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::batch::{BatchEvent, BatchOutcome, JobStatus};

const BAR_LENGTH: u64 = 100;

/// Renders batch events as a terminal progress bar
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    /// Reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Apply one event; returns the batch result once `Completed` arrives
    pub fn handle(&self, event: &BatchEvent) -> Option<bool> {
        match event {
            BatchEvent::Progress(fraction) => {
                let position = (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64;
                self.bar.set_position(position.max(self.bar.position()));
                None
            }
            BatchEvent::Status(message) => {
                self.bar.set_message(message.clone());
                self.bar.println(message);
                None
            }
            BatchEvent::Error(message) => {
                self.bar.println(format!("ERROR: {}", message));
                None
            }
            BatchEvent::Completed { success } => {
                if *success {
                    self.bar.finish_with_message("Compression complete!");
                } else {
                    self.bar.abandon();
                }
                Some(*success)
            }
        }
    }

    /// Consume events until the batch completes or the channel closes
    pub async fn drain(&self, events: &mut UnboundedReceiver<BatchEvent>) -> Option<bool> {
        let mut result = None;
        while let Some(event) = events.recv().await {
            if let Some(success) = self.handle(&event) {
                result = Some(success);
            }
        }
        result
    }

    /// Print a per-file summary of a finished batch
    pub fn summarize(&self, outcome: &BatchOutcome) {
        for report in &outcome.reports {
            let line = match &report.status {
                JobStatus::Success => format!("  ok      {}", report.destination.display()),
                JobStatus::Failed(reason) => format!("  failed  {}: {}", report.source.display(), reason),
                JobStatus::Skipped(reason) => format!("  skipped {}", reason),
            };
            self.bar.println(line);
        }
        self.bar.println(format!(
            "Batch {} {:?}: {} compressed, {} failed, {} skipped",
            outcome.batch_id,
            outcome.state,
            outcome.succeeded_count(),
            outcome.failed_count(),
            outcome.skipped_count()
        ));
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}
