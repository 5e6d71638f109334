use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::debug_log;

/// Observable phase of the debounced trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    /// Nothing pending
    Idle,
    /// A change was observed and the action has not run yet
    Pending,
    /// The action ran less than one cooldown ago
    Cooling,
}

/// Collapses bursts of source-change notifications into at most one firing per
/// cooldown window
///
/// Notifications always re-arm the pending flag; only firing is rate limited.
/// The poll loop is the single place that calls [`DebouncedTrigger::poll`], so the
/// action always runs on the host thread.
///
/// Cooling is not a separate state: it is `Idle` seen through the elapsed-time guard
/// on `last_fired`.
#[derive(Debug, Clone)]
pub struct DebouncedTrigger {
    cooldown: Duration,
    last_fired: Instant,
    has_fired: bool,
    pending: bool,
    last_source: Option<PathBuf>,
    notification_count: u64,
}

impl DebouncedTrigger {
    /// Create an idle trigger; `created_at` counts as the last firing
    pub fn new(cooldown: Duration, created_at: Instant) -> Self {
        Self {
            cooldown,
            last_fired: created_at,
            has_fired: false,
            pending: false,
            last_source: None,
            notification_count: 0,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Record a change notification for `source`
    pub fn notify(&mut self, source: &Path) {
        self.pending = true;
        self.last_source = Some(source.to_path_buf());
        self.notification_count += 1;
        debug_log!("Source change noticed: {}", source.display());
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn last_source(&self) -> Option<&Path> {
        self.last_source.as_deref()
    }

    /// Number of notifications received since creation
    pub fn notification_count(&self) -> u64 {
        self.notification_count
    }

    pub fn phase(&self, now: Instant) -> TriggerPhase {
        if self.pending {
            TriggerPhase::Pending
        } else if self.has_fired && now.saturating_duration_since(self.last_fired) <= self.cooldown {
            TriggerPhase::Cooling
        } else {
            TriggerPhase::Idle
        }
    }

    /// Whether [`DebouncedTrigger::poll`] would fire at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.pending && now.saturating_duration_since(self.last_fired) > self.cooldown
    }

    /// Fire if a change is pending and the cooldown has elapsed
    ///
    /// Returns the most recently changed source when the caller should run the action.
    pub fn poll(&mut self, now: Instant) -> Option<PathBuf> {
        if !self.is_due(now) {
            return None;
        }

        self.pending = false;
        self.has_fired = true;
        self.last_fired = now;
        let source = self.last_source.take();
        debug_log!(
            "Refresh trigger fired for {}",
            source
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string())
        );
        Some(source.unwrap_or_default())
    }
}
