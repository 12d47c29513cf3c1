use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::automation::providers::MatchLocation;
use crate::models::MacroAction;

/// Outcome of one action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Succeeded,
    /// Image search below threshold.
    NotFound,
    /// The input dispatcher reported a failure.
    InputError,
    /// Action was disabled; no side effect was attempted.
    SkippedDisabled,
    /// Notification delivery failed or timed out. Never aborts the run.
    NotifyError,
}

/// One entry in the run's result stream. Exactly one is appended per action
/// invocation, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub action_id: String,
    pub action_type: String,
    /// Zero-based loop pass this result belongs to.
    pub pass: u32,
    pub outcome: ActionOutcome,
    pub message: String,
    pub location: Option<(u32, u32)>,
    pub confidence: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn new(action: &MacroAction, pass: u32, outcome: ActionOutcome) -> Self {
        Self {
            action_id: action.id.clone(),
            action_type: action.kind.label().to_string(),
            pass,
            outcome,
            message: String::new(),
            location: None,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_match(mut self, location: MatchLocation) -> Self {
        self.location = Some((location.x, location.y));
        self.confidence = Some(location.score);
        self
    }
}

/// Why the run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// All loop passes were executed.
    Finished,
    /// Failure policy or the consecutive-failure limit ended the run early.
    Aborted,
    /// Cancellation was requested and observed between actions.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Finished all passes, but at least one action failed along the way.
    Partial,
    Aborted,
    Cancelled,
}

/// Aggregate outcome of one `run()` invocation. Read-only once the run ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub sequence_id: String,
    pub sequence_name: String,
    pub status: RunStatus,
    pub passes_started: u32,
    pub actions_succeeded: usize,
    pub actions_failed: usize,
    pub actions_skipped: usize,
    pub notify_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ExecutionResult>,
}

impl RunSummary {
    /// Folds the result stream into a summary. Pure function of its inputs,
    /// so a recorded stream replays to the identical summary.
    ///
    /// `passes_started` comes from the runner rather than the result stream:
    /// a pass over a sequence with no enabled actions leaves no results
    /// behind but still counts.
    pub fn from_results(
        sequence_id: &str,
        sequence_name: &str,
        results: Vec<ExecutionResult>,
        passes_started: u32,
        termination: Termination,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut notify_failures = 0;
        for result in &results {
            match result.outcome {
                ActionOutcome::Succeeded => succeeded += 1,
                ActionOutcome::NotFound | ActionOutcome::InputError => failed += 1,
                ActionOutcome::SkippedDisabled => skipped += 1,
                ActionOutcome::NotifyError => notify_failures += 1,
            }
        }

        let status = match termination {
            Termination::Cancelled => RunStatus::Cancelled,
            Termination::Aborted => RunStatus::Aborted,
            Termination::Finished => {
                if failed > 0 {
                    RunStatus::Partial
                } else {
                    RunStatus::Completed
                }
            }
        };

        Self {
            sequence_id: sequence_id.to_string(),
            sequence_name: sequence_name.to_string(),
            status,
            passes_started,
            actions_succeeded: succeeded,
            actions_failed: failed,
            actions_skipped: skipped,
            notify_failures,
            started_at,
            finished_at,
            results,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// One-line progress description, used for telegram messages and logs.
    pub fn summary_line(&self) -> String {
        format!(
            "{} ok / {} failed / {} skipped over {} pass(es)",
            self.actions_succeeded, self.actions_failed, self.actions_skipped, self.passes_started
        )
    }
}
