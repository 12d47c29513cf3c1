use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::automation::providers::{Dispatcher, Locator, Notifier, NotifyEvent};
use crate::config::EngineConfig;
use crate::core::cancel::CancelToken;
use crate::core::error::EngineError;
use crate::core::result::{ActionOutcome, RunStatus, RunSummary};
use crate::core::runner::{notify_with_timeout, run_sequence};
use crate::core::validate::validate;
use crate::models::{ImageTemplate, MacroSequence};

/// Executes macro sequences. One engine allows one active run at a time;
/// overlapping input injection is unsafe, so a second `run` fails fast
/// instead of interleaving.
pub struct MacroEngine {
    config: EngineConfig,
    running: AtomicBool,
    status: Mutex<String>,
}

/// Clears the running flag even if a provider panics mid-run.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl MacroEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
            status: Mutex::new("Ready".to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current status line, for embedding UIs to poll.
    pub fn status(&self) -> String {
        self.status.lock().unwrap().clone()
    }

    /// Runs `sequence` against the given providers until all loop passes
    /// finish, the failure policy aborts, or `cancel` is triggered.
    ///
    /// Validation happens up front: an invalid sequence is rejected before
    /// any side effect. The returned summary always reflects the true
    /// partial state of the run.
    pub fn run(
        &self,
        sequence: &MacroSequence,
        templates: &[ImageTemplate],
        locator: &mut dyn Locator,
        dispatcher: &mut dyn Dispatcher,
        notifier: Arc<dyn Notifier>,
        cancel: &CancelToken,
    ) -> Result<RunSummary, EngineError> {
        let errors = validate(sequence, templates);
        if !errors.is_empty() {
            return Err(EngineError::InvalidSequence(errors));
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::RunAlreadyInProgress);
        }
        let _guard = RunGuard(&self.running);

        log::info!("starting sequence '{}'", sequence.name);
        let summary = run_sequence(
            &self.config,
            sequence,
            templates,
            locator,
            dispatcher,
            Arc::clone(&notifier),
            cancel,
            &self.status,
        );

        *self.status.lock().unwrap() = match summary.status {
            RunStatus::Completed => "Macro completed!".to_string(),
            RunStatus::Partial => "Macro finished with failures".to_string(),
            RunStatus::Aborted => "Macro aborted".to_string(),
            RunStatus::Cancelled => "Stopped by user".to_string(),
        };
        log::info!(
            "sequence '{}' finished: {:?}, {}",
            summary.sequence_name,
            summary.status,
            summary.summary_line()
        );

        // End-of-run report is best effort and bounded by the same timeout
        // as in-sequence notifications. Aborts get the error format, with
        // the failure that tripped the policy.
        if self.config.notify_on_finish && notifier.is_configured() {
            let event = if summary.status == RunStatus::Aborted {
                NotifyEvent::ErrorReport {
                    title: format!("'{}' aborted", summary.sequence_name),
                    error: last_failure_message(&summary),
                    context: summary.summary_line(),
                }
            } else {
                NotifyEvent::RunReport {
                    sequence_name: summary.sequence_name.clone(),
                    success: summary.status == RunStatus::Completed,
                    duration_secs: summary.duration_secs(),
                    detail: summary.summary_line(),
                }
            };
            if let Err(e) = notify_with_timeout(notifier, event, self.config.notify_timeout) {
                log::warn!("end-of-run report delivery failed: {e}");
            }
        }

        Ok(summary)
    }
}

fn last_failure_message(summary: &RunSummary) -> String {
    summary
        .results
        .iter()
        .rev()
        .find(|r| matches!(r.outcome, ActionOutcome::NotFound | ActionOutcome::InputError))
        .map(|r| format!("{}: {}", r.action_type, r.message))
        .unwrap_or_else(|| "run aborted".to_string())
}
