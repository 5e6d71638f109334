use std::time::{Duration, Instant};

use crate::bridge_command::CommandError;
use crate::editor_host::EditorHost;

/// Work that runs against the host once it is due
pub type DeferredAction = Box<dyn FnOnce(&mut dyn EditorHost) -> Result<String, CommandError>>;

struct ScheduledJob {
    due: Instant,
    label: String,
    action: DeferredAction,
}

/// Outcome of a deferred job that ran during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredOutcome {
    pub label: String,
    pub result: String,
}

/// Cooperative one-shot scheduler driven by the host tick
///
/// Nothing here sleeps: jobs are only checked, and run, when the poll loop calls
/// [`DeferredScheduler::run_due`]. Scheduled jobs cannot be cancelled.
#[derive(Default)]
pub struct DeferredScheduler {
    jobs: Vec<ScheduledJob>,
}

impl DeferredScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, label: impl Into<String>, action: DeferredAction) {
        self.jobs.push(ScheduledJob {
            due: now + delay,
            label: label.into(),
            action,
        });
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.len()
    }

    /// Take every job that is due at `now`, in due order
    pub fn take_due(&mut self, now: Instant) -> Vec<(String, DeferredAction)> {
        let (mut due, waiting): (Vec<ScheduledJob>, Vec<ScheduledJob>) =
            self.jobs.drain(..).partition(|job| job.due <= now);
        self.jobs = waiting;

        // Stable sort keeps scheduling order for jobs due at the same instant
        due.sort_by_key(|job| job.due);
        due.into_iter().map(|job| (job.label, job.action)).collect()
    }
}
