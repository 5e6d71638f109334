use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::bridge_dispatcher::panic_message;
use crate::editor_host::RefreshHost;
use crate::{debug_log, info_log, warn_log};

/// One remedy the escalation chain can attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
    ForceReimport,
    RequestCompilation,
    SaveAssets,
    Repaint,
    ForceRecompile,
}

impl RefreshStrategy {
    pub const ALL: [RefreshStrategy; 5] = [
        RefreshStrategy::ForceReimport,
        RefreshStrategy::RequestCompilation,
        RefreshStrategy::SaveAssets,
        RefreshStrategy::Repaint,
        RefreshStrategy::ForceRecompile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStrategy::ForceReimport => "force_reimport",
            RefreshStrategy::RequestCompilation => "request_compilation",
            RefreshStrategy::SaveAssets => "save_assets",
            RefreshStrategy::Repaint => "repaint",
            RefreshStrategy::ForceRecompile => "force_recompile",
        }
    }

    fn apply<H: RefreshHost + ?Sized>(&self, host: &mut H) -> anyhow::Result<()> {
        match self {
            RefreshStrategy::ForceReimport => host.reimport_assets(),
            RefreshStrategy::RequestCompilation => host.request_script_compilation(),
            RefreshStrategy::SaveAssets => host.save_assets(),
            RefreshStrategy::Repaint => host.repaint_views(),
            RefreshStrategy::ForceRecompile => host.force_recompile(),
        }
    }
}

impl fmt::Display for RefreshStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single strategy attempt
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub strategy: RefreshStrategy,
    /// Error message if the strategy failed
    pub error: Option<String>,
}

/// Result of one full escalation run
#[derive(Debug, Clone)]
pub struct EscalationReport {
    pub outcomes: Vec<StrategyOutcome>,
    pub duration: Duration,
}

impl EscalationReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn summary(&self) -> String {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{} ({})", o.strategy, e)))
            .collect();

        if failures.is_empty() {
            format!("{} refresh strategies ran", self.outcomes.len())
        } else {
            format!(
                "{} of {} refresh strategies ran, failed: {}",
                self.succeeded(),
                self.outcomes.len(),
                failures.join("; ")
            )
        }
    }
}

/// Ordered list of independent refresh remedies
///
/// Every strategy is attempted on each run regardless of how the previous ones
/// went; a failure is logged and recorded, never propagated.
#[derive(Debug, Clone)]
pub struct EscalationChain {
    strategies: Vec<RefreshStrategy>,
}

impl EscalationChain {
    pub fn new(strategies: Vec<RefreshStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[RefreshStrategy] {
        &self.strategies
    }

    pub fn run<H: RefreshHost + ?Sized>(&self, host: &mut H) -> EscalationReport {
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| strategy.apply(&mut *host)));
            let error = match attempt {
                Ok(Ok(())) => {
                    debug_log!("Refresh strategy {} ran", strategy);
                    None
                }
                Ok(Err(e)) => {
                    warn_log!("Refresh strategy {} failed: {:#}", strategy, e);
                    Some(format!("{:#}", e))
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    warn_log!("Refresh strategy {} panicked: {}", strategy, message);
                    Some(format!("panicked: {}", message))
                }
            };
            outcomes.push(StrategyOutcome {
                strategy: *strategy,
                error,
            });
        }

        let report = EscalationReport {
            outcomes,
            duration: start.elapsed(),
        };
        info_log!("Refresh escalation finished: {}", report.summary());
        report
    }
}

impl Default for EscalationChain {
    fn default() -> Self {
        Self::new(RefreshStrategy::ALL.to_vec())
    }
}
