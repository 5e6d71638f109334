use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::bridge_command::{CommandReply, request_id};
use crate::bridge_dispatcher::{CommandDispatcher, DispatchContext, panic_message};
use crate::bridge_mailbox::{BridgeState, MailboxChannel};
use crate::config::BridgeConfig;
use crate::deferred_scheduler::{DeferredOutcome, DeferredScheduler};
use crate::editor_host::EditorHost;
use crate::refresh_escalation::{EscalationChain, EscalationReport};
use crate::refresh_trigger::DebouncedTrigger;
use crate::source_watcher::SourceWatcher;
use crate::{debug_log, error_log, info_log, warn_log};

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// Result written for the command handled in this tick
    pub command_result: Option<String>,
    /// Escalation run fired by the debounced trigger
    pub refresh: Option<EscalationReport>,
    /// Deferred actions that came due
    pub deferred: Vec<DeferredOutcome>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.command_result.is_none() && self.refresh.is_none() && self.deferred.is_empty()
    }
}

/// The in-editor side of the bridge
///
/// Owns the host and everything it polls. [`BridgeAgent::tick`] is meant to be called
/// from the host's per-frame callback: it never blocks and never panics out.
pub struct BridgeAgent<H: EditorHost> {
    host: H,
    mailbox: MailboxChannel,
    dispatcher: CommandDispatcher,
    trigger: DebouncedTrigger,
    escalation: EscalationChain,
    scheduler: DeferredScheduler,
    watcher: Option<SourceWatcher>,
    active: bool,
}

impl<H: EditorHost> BridgeAgent<H> {
    pub fn new(host: H, mailbox: MailboxChannel, cooldown: Duration, escalation: EscalationChain, now: Instant) -> Self {
        Self {
            host,
            mailbox,
            dispatcher: CommandDispatcher::new(),
            trigger: DebouncedTrigger::new(cooldown, now),
            escalation,
            scheduler: DeferredScheduler::new(),
            watcher: None,
            active: false,
        }
    }

    /// Agent for `project_root` using the configured mailbox, cooldown and strategies
    pub fn from_config(host: H, config: &BridgeConfig, project_root: &Path, now: Instant) -> Self {
        Self::new(
            host,
            MailboxChannel::new(config.mailbox_dir_for(project_root)),
            config.refresh_cooldown(),
            EscalationChain::new(config.refresh_strategies.clone()),
            now,
        )
    }

    /// Feed source changes seen by `watcher` into the debounced trigger
    pub fn with_watcher(mut self, watcher: SourceWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn mailbox(&self) -> &MailboxChannel {
        &self.mailbox
    }

    pub fn trigger(&self) -> &DebouncedTrigger {
        &self.trigger
    }

    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher {
        &mut self.dispatcher
    }

    pub fn pending_deferred(&self) -> usize {
        self.scheduler.pending_count()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Publish the active status so the external actor knows commands are served
    pub fn start(&mut self) {
        self.active = true;
        match self.mailbox.set_status(BridgeState::Active) {
            Ok(()) => info_log!("Bridge agent active, mailbox at {}", self.mailbox.request_path().display()),
            Err(e) => error_log!("Failed to publish bridge status: {}", e),
        }
    }

    pub fn shutdown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        match self.mailbox.set_status(BridgeState::Idle) {
            Ok(()) => info_log!("Bridge agent idle"),
            Err(e) => error_log!("Failed to publish bridge status: {}", e),
        }
    }

    /// Record a source change reported by something other than the watcher
    pub fn notify_source_changed(&mut self, path: &Path) {
        self.trigger.notify(path);
    }

    /// One cooperative poll step
    ///
    /// Order within a tick is fixed: queued source changes, then the mailbox, then the
    /// debounced trigger, then deferred actions that came due.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        if let Some(watcher) = &mut self.watcher {
            for path in watcher.drain() {
                self.trigger.notify(&path);
            }
        }

        let command_result = self.process_mailbox(now);
        let refresh = self.fire_trigger(now);
        let deferred = self.run_deferred(now);

        TickReport {
            command_result,
            refresh,
            deferred,
        }
    }

    fn process_mailbox(&mut self, now: Instant) -> Option<String> {
        let raw = match self.mailbox.try_receive() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error_log!("Failed to read bridge command: {}", e);
                return None;
            }
        };

        let mut ctx = DispatchContext {
            host: &mut self.host,
            scheduler: &mut self.scheduler,
            escalation: &self.escalation,
            now,
        };
        let result = self.dispatcher.dispatch(&raw, &mut ctx);
        debug_log!("Command result: {}", result);

        // Tagged requests get a tagged reply, bare ones a bare result string
        let body = match request_id(&raw) {
            Some(id) => CommandReply::new(id, result.clone()).encode(),
            None => result.clone(),
        };
        if let Err(e) = self.mailbox.send_result(&body) {
            error_log!("Failed to write bridge result: {}", e);
        }
        Some(result)
    }

    fn fire_trigger(&mut self, now: Instant) -> Option<EscalationReport> {
        let source = self.trigger.poll(now)?;
        info_log!("Sources changed (last: {}), refreshing", source.display());
        Some(self.escalation.run(&mut self.host))
    }

    fn run_deferred(&mut self, now: Instant) -> Vec<DeferredOutcome> {
        let mut outcomes = Vec::new();
        for (label, action) in self.scheduler.take_due(now) {
            let host: &mut dyn EditorHost = &mut self.host;
            let result = match panic::catch_unwind(AssertUnwindSafe(move || action(host))) {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => format!("Error: {}", e),
                Err(payload) => format!("Error: Handler panicked: {}", panic_message(payload)),
            };
            if result.starts_with("Error:") {
                warn_log!("Deferred {} failed: {}", label, result);
            } else {
                info_log!("Deferred {} finished: {}", label, result);
            }
            outcomes.push(DeferredOutcome { label, result });
        }
        outcomes
    }

    /// Drive the agent like an editor frame loop until `shutdown` completes
    ///
    /// Runs on the calling task; the agent is not moved to another thread.
    pub async fn run_until<F: Future>(&mut self, tick_interval: Duration, shutdown: F) {
        self.start();

        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Instant::now());
                }
                _ = &mut shutdown => {
                    info_log!("Bridge agent shutting down");
                    break;
                }
            }
        }

        self.shutdown();
    }
}

impl<H: EditorHost> Drop for BridgeAgent<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "bridge_agent_tests.rs"]
mod tests;
