use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::automation::providers::{
    Dispatcher, InputCommand, Locator, MatchLocation, Notifier, NotifyEvent, ProviderError,
};
use crate::config::{EngineConfig, FailurePolicy};
use crate::core::cancel::CancelToken;
use crate::core::result::{ActionOutcome, ExecutionResult, RunSummary, Termination};
use crate::models::{ActionKind, ImageTemplate, MacroAction, MacroSequence};

struct RunCtx<'a> {
    config: &'a EngineConfig,
    sequence: &'a MacroSequence,
    templates: &'a [ImageTemplate],
    cancel: &'a CancelToken,
    status: &'a Mutex<String>,
    started_at: DateTime<Utc>,
}

/// Executes one validated sequence to completion. Owns the control loop:
/// loop passes, ordering, enable flags, failure policy and cancellation.
/// The caller (the engine) guarantees exclusive access to the providers.
pub(crate) fn run_sequence(
    config: &EngineConfig,
    sequence: &MacroSequence,
    templates: &[ImageTemplate],
    locator: &mut dyn Locator,
    dispatcher: &mut dyn Dispatcher,
    notifier: Arc<dyn Notifier>,
    cancel: &CancelToken,
    status: &Mutex<String>,
) -> RunSummary {
    let ctx = RunCtx {
        config,
        sequence,
        templates,
        cancel,
        status,
        started_at: Utc::now(),
    };

    let mut ordered: Vec<&MacroAction> = sequence.actions.iter().collect();
    ordered.sort_by_key(|a| a.index);

    let mut results: Vec<ExecutionResult> = Vec::new();
    let mut termination = Termination::Finished;
    let mut consecutive_failed_passes = 0u32;
    let mut passes_started = 0u32;
    let mut pass = 0u32;

    'run: while sequence.infinite_loop || pass < sequence.loop_count {
        if cancel.is_cancelled() {
            termination = Termination::Cancelled;
            break;
        }
        passes_started = pass + 1;
        if sequence.infinite_loop {
            set_status(status, format!("Loop {} (infinite)", pass + 1));
        } else {
            set_status(status, format!("Loop {}/{}", pass + 1, sequence.loop_count));
        }
        log::debug!("sequence '{}': starting pass {}", sequence.name, pass + 1);

        let mut pass_failed = false;
        for action in &ordered {
            if cancel.is_cancelled() {
                termination = Termination::Cancelled;
                break 'run;
            }
            if !action.enabled {
                results.push(ExecutionResult::new(
                    action,
                    pass,
                    ActionOutcome::SkippedDisabled,
                ));
                continue;
            }

            let result = execute_action(&ctx, action, pass, &results, locator, dispatcher, &notifier);
            let outcome = result.outcome;
            if matches!(outcome, ActionOutcome::NotFound | ActionOutcome::InputError) {
                log::warn!(
                    "sequence '{}': action #{} ({}) failed: {}",
                    sequence.name,
                    action.index,
                    action.kind.label(),
                    result.message
                );
            }
            results.push(result);

            if matches!(outcome, ActionOutcome::NotFound | ActionOutcome::InputError) {
                pass_failed = true;
                match config.failure_policy {
                    FailurePolicy::ContinuePass => {}
                    FailurePolicy::AbortPass => break,
                    FailurePolicy::AbortRun => {
                        termination = Termination::Aborted;
                        break 'run;
                    }
                }
            }

            if !config.action_delay.is_zero() && cancel.sleep(config.action_delay) {
                termination = Termination::Cancelled;
                break 'run;
            }
        }

        if pass_failed {
            consecutive_failed_passes += 1;
            if config.max_consecutive_failed_passes > 0
                && consecutive_failed_passes >= config.max_consecutive_failed_passes
            {
                log::warn!(
                    "sequence '{}': aborting after {} consecutive failed pass(es)",
                    sequence.name,
                    consecutive_failed_passes
                );
                termination = Termination::Aborted;
                break;
            }
        } else {
            consecutive_failed_passes = 0;
        }

        pass += 1;
        let has_more = sequence.infinite_loop || pass < sequence.loop_count;
        if has_more
            && sequence.loop_delay_secs > 0.0
            && cancel.sleep(Duration::from_secs_f64(sequence.loop_delay_secs))
        {
            termination = Termination::Cancelled;
            break;
        }
    }

    RunSummary::from_results(
        &sequence.id,
        &sequence.name,
        results,
        passes_started,
        termination,
        ctx.started_at,
        Utc::now(),
    )
}

fn execute_action(
    ctx: &RunCtx<'_>,
    action: &MacroAction,
    pass: u32,
    results_so_far: &[ExecutionResult],
    locator: &mut dyn Locator,
    dispatcher: &mut dyn Dispatcher,
    notifier: &Arc<dyn Notifier>,
) -> ExecutionResult {
    match &action.kind {
        ActionKind::FindImage {
            image_template_id,
            match_threshold,
        } => {
            let Some(template) = find_template(ctx, image_template_id) else {
                return ExecutionResult::new(action, pass, ActionOutcome::InputError)
                    .with_message(format!("unknown template {image_template_id}"));
            };
            let threshold = ctx.config.effective_threshold(*match_threshold, template);
            set_status(ctx.status, format!("Searching for '{}'", template.name));
            match locator.locate(template, threshold) {
                Ok(Some(location)) => ExecutionResult::new(action, pass, ActionOutcome::Succeeded)
                    .with_match(location)
                    .with_message(format!(
                        "matched '{}' at ({}, {}) score {:.3}",
                        template.name, location.x, location.y, location.score
                    )),
                Ok(None) => ExecutionResult::new(action, pass, ActionOutcome::NotFound)
                    .with_message(format!(
                        "'{}' not found above threshold {threshold:.2}",
                        template.name
                    )),
                Err(e) => ExecutionResult::new(action, pass, ActionOutcome::InputError)
                    .with_message(format!("image search failed: {e}")),
            }
        }
        ActionKind::Click {
            click_position,
            image_template_id,
        } => click_like(ctx, action, pass, locator, dispatcher, *click_position, image_template_id.as_deref(), |x, y| {
            InputCommand::Click { x, y }
        }),
        ActionKind::DoubleClick {
            click_position,
            image_template_id,
        } => click_like(ctx, action, pass, locator, dispatcher, *click_position, image_template_id.as_deref(), |x, y| {
            InputCommand::DoubleClick { x, y }
        }),
        ActionKind::RightClick {
            click_position,
            image_template_id,
        } => click_like(ctx, action, pass, locator, dispatcher, *click_position, image_template_id.as_deref(), |x, y| {
            InputCommand::RightClick { x, y }
        }),
        ActionKind::Drag {
            click_position,
            drag_to_position,
        } => {
            // Both endpoints checked by the validator.
            let (Some(from), Some(to)) = (*click_position, *drag_to_position) else {
                return ExecutionResult::new(action, pass, ActionOutcome::InputError)
                    .with_message("drag endpoints missing");
            };
            set_status(
                ctx.status,
                format!("Dragging ({}, {}) -> ({}, {})", from.0, from.1, to.0, to.1),
            );
            dispatch(action, pass, dispatcher, &InputCommand::Drag { from, to }, None)
        }
        ActionKind::TypeText { text_input } => {
            set_status(ctx.status, format!("Typing: {text_input}"));
            dispatch(
                action,
                pass,
                dispatcher,
                &InputCommand::TypeText {
                    text: text_input.clone(),
                },
                None,
            )
        }
        ActionKind::KeyPress { key_combination } => {
            set_status(ctx.status, format!("Keys: {}", key_combination.join("+")));
            dispatch(
                action,
                pass,
                dispatcher,
                &InputCommand::KeyPress {
                    keys: key_combination.clone(),
                },
                None,
            )
        }
        ActionKind::Scroll {
            scroll_direction,
            scroll_amount,
            click_position,
        } => {
            set_status(ctx.status, format!("Scrolling {scroll_direction:?}"));
            dispatch(
                action,
                pass,
                dispatcher,
                &InputCommand::Scroll {
                    direction: *scroll_direction,
                    amount: *scroll_amount,
                    position: *click_position,
                },
                None,
            )
        }
        ActionKind::Wait { wait_seconds } => {
            let seconds = wait_seconds.max(0.0);
            set_status(ctx.status, format!("Waiting {:.0}ms", seconds * 1000.0));
            let interrupted = ctx.cancel.sleep(Duration::from_secs_f64(seconds));
            // A wait that was invoked still yields its result; the loop
            // observes the cancellation before the next action starts.
            ExecutionResult::new(action, pass, ActionOutcome::Succeeded).with_message(if interrupted {
                format!("wait of {seconds}s interrupted by cancellation")
            } else {
                format!("waited {seconds}s")
            })
        }
        ActionKind::SendTelegram { telegram_message } => {
            set_status(ctx.status, "Sending notification".to_string());
            let event = match telegram_message {
                Some(text) if !text.is_empty() => NotifyEvent::Message(text.clone()),
                _ => {
                    // No custom text: report progress so far.
                    let so_far = RunSummary::from_results(
                        &ctx.sequence.id,
                        &ctx.sequence.name,
                        results_so_far.to_vec(),
                        pass + 1,
                        Termination::Finished,
                        ctx.started_at,
                        Utc::now(),
                    );
                    NotifyEvent::RunReport {
                        sequence_name: ctx.sequence.name.clone(),
                        success: so_far.actions_failed == 0,
                        duration_secs: so_far.duration_secs(),
                        detail: so_far.summary_line(),
                    }
                }
            };
            match notify_with_timeout(Arc::clone(notifier), event, ctx.config.notify_timeout) {
                Ok(()) => ExecutionResult::new(action, pass, ActionOutcome::Succeeded)
                    .with_message("notification delivered"),
                Err(e) => ExecutionResult::new(action, pass, ActionOutcome::NotifyError)
                    .with_message(format!("notification failed: {e}")),
            }
        }
    }
}

/// Click / double-click / right-click share the same resolution rules:
/// a fixed position wins, otherwise the referenced template is located
/// and the click lands on the match.
#[allow(clippy::too_many_arguments)]
fn click_like(
    ctx: &RunCtx<'_>,
    action: &MacroAction,
    pass: u32,
    locator: &mut dyn Locator,
    dispatcher: &mut dyn Dispatcher,
    click_position: Option<(i32, i32)>,
    image_template_id: Option<&str>,
    make_command: impl Fn(i32, i32) -> InputCommand,
) -> ExecutionResult {
    if let Some((x, y)) = click_position {
        set_status(ctx.status, format!("Clicking at ({x}, {y})"));
        return dispatch(action, pass, dispatcher, &make_command(x, y), None);
    }

    let Some(template_id) = image_template_id else {
        return ExecutionResult::new(action, pass, ActionOutcome::InputError)
            .with_message("no click position or template");
    };
    let Some(template) = find_template(ctx, template_id) else {
        return ExecutionResult::new(action, pass, ActionOutcome::InputError)
            .with_message(format!("unknown template {template_id}"));
    };

    let threshold = ctx.config.effective_threshold(None, template);
    set_status(ctx.status, format!("Searching for '{}'", template.name));
    match locator.locate(template, threshold) {
        Ok(Some(location)) => {
            set_status(
                ctx.status,
                format!("Clicking '{}' at ({}, {})", template.name, location.x, location.y),
            );
            dispatch(
                action,
                pass,
                dispatcher,
                &make_command(location.x as i32, location.y as i32),
                Some(location),
            )
        }
        Ok(None) => ExecutionResult::new(action, pass, ActionOutcome::NotFound).with_message(
            format!("'{}' not found above threshold {threshold:.2}", template.name),
        ),
        Err(e) => ExecutionResult::new(action, pass, ActionOutcome::InputError)
            .with_message(format!("image search failed: {e}")),
    }
}

fn dispatch(
    action: &MacroAction,
    pass: u32,
    dispatcher: &mut dyn Dispatcher,
    command: &InputCommand,
    location: Option<MatchLocation>,
) -> ExecutionResult {
    match dispatcher.perform(command) {
        Ok(()) => {
            let mut result = ExecutionResult::new(action, pass, ActionOutcome::Succeeded);
            if let Some(location) = location {
                result = result.with_match(location);
            }
            result
        }
        Err(e) => ExecutionResult::new(action, pass, ActionOutcome::InputError)
            .with_message(format!("input dispatch failed: {e}")),
    }
}

fn find_template<'a>(ctx: &RunCtx<'a>, template_id: &str) -> Option<&'a ImageTemplate> {
    ctx.templates.iter().find(|t| t.id == template_id)
}

fn set_status(status: &Mutex<String>, text: String) {
    *status.lock().unwrap() = text;
}

/// Runs delivery on a helper thread and waits at most `timeout` for the
/// outcome. The run loop is never blocked longer than that; a late delivery
/// still completes in the background but is reported as a failure.
pub(crate) fn notify_with_timeout(
    notifier: Arc<dyn Notifier>,
    event: NotifyEvent,
    timeout: Duration,
) -> Result<(), ProviderError> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(notifier.notify(&event));
    });
    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(_) => Err(ProviderError(format!(
            "delivery timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    pub(crate) enum LocatorScript {
        Found(MatchLocation),
        NeverFound,
        Fail(String),
    }

    pub(crate) struct ScriptedLocator {
        pub script: LocatorScript,
        pub calls: usize,
    }

    impl ScriptedLocator {
        pub fn found(x: u32, y: u32, score: f32) -> Self {
            Self {
                script: LocatorScript::Found(MatchLocation { x, y, score }),
                calls: 0,
            }
        }

        pub fn never_found() -> Self {
            Self {
                script: LocatorScript::NeverFound,
                calls: 0,
            }
        }
    }

    impl Locator for ScriptedLocator {
        fn locate(
            &mut self,
            _template: &ImageTemplate,
            _threshold: f32,
        ) -> Result<Option<MatchLocation>, ProviderError> {
            self.calls += 1;
            match &self.script {
                LocatorScript::Found(location) => Ok(Some(*location)),
                LocatorScript::NeverFound => Ok(None),
                LocatorScript::Fail(message) => Err(ProviderError(message.clone())),
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingDispatcher {
        pub commands: Vec<InputCommand>,
        pub fail: bool,
    }

    impl Dispatcher for RecordingDispatcher {
        fn perform(&mut self, command: &InputCommand) -> Result<(), ProviderError> {
            if self.fail {
                return Err(ProviderError("target window gone".to_string()));
            }
            self.commands.push(command.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct StubNotifier {
        pub fail: bool,
        pub delay: Option<Duration>,
        pub deliveries: Mutex<Vec<NotifyEvent>>,
    }

    impl Notifier for StubNotifier {
        fn notify(&self, event: &NotifyEvent) -> Result<(), ProviderError> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if self.fail {
                return Err(ProviderError("delivery refused".to_string()));
            }
            self.deliveries.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::ScrollDirection;

    fn fast_sequence() -> MacroSequence {
        let mut seq = MacroSequence::new("runner test");
        seq.loop_delay_secs = 0.0;
        seq
    }

    fn run(
        config: &EngineConfig,
        sequence: &MacroSequence,
        templates: &[ImageTemplate],
        locator: &mut ScriptedLocator,
        dispatcher: &mut RecordingDispatcher,
        notifier: Arc<dyn Notifier>,
    ) -> RunSummary {
        let cancel = CancelToken::new();
        let status = Mutex::new(String::new());
        run_sequence(
            config, sequence, templates, locator, dispatcher, notifier, &cancel, &status,
        )
    }

    #[test]
    fn test_continue_pass_policy_runs_remaining_actions() {
        let mut seq = fast_sequence();
        seq.add_action(ActionKind::Click {
            click_position: Some((1, 1)),
            image_template_id: None,
        });
        seq.add_action(ActionKind::KeyPress {
            key_combination: vec!["enter".to_string()],
        });

        let config = EngineConfig {
            failure_policy: FailurePolicy::ContinuePass,
            ..EngineConfig::default()
        };
        let mut locator = ScriptedLocator::never_found();
        let mut dispatcher = RecordingDispatcher {
            fail: true,
            ..Default::default()
        };
        let summary = run(
            &config,
            &seq,
            &[],
            &mut locator,
            &mut dispatcher,
            Arc::new(StubNotifier::default()),
        );
        // Both actions ran despite the first failing.
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.actions_failed, 2);
        assert_eq!(summary.status, crate::core::result::RunStatus::Partial);
    }

    #[test]
    fn test_abort_run_policy_stops_all_passes() {
        let mut seq = fast_sequence();
        seq.add_action(ActionKind::Click {
            click_position: Some((1, 1)),
            image_template_id: None,
        });
        seq.loop_count = 5;

        let config = EngineConfig {
            failure_policy: FailurePolicy::AbortRun,
            ..EngineConfig::default()
        };
        let mut locator = ScriptedLocator::never_found();
        let mut dispatcher = RecordingDispatcher {
            fail: true,
            ..Default::default()
        };
        let summary = run(
            &config,
            &seq,
            &[],
            &mut locator,
            &mut dispatcher,
            Arc::new(StubNotifier::default()),
        );
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.status, crate::core::result::RunStatus::Aborted);
    }

    #[test]
    fn test_locator_failure_is_an_input_error() {
        let template = ImageTemplate::new(
            "t",
            "t.png",
            crate::models::CaptureRegion {
                x: 0,
                y: 0,
                width: 8,
                height: 8,
            },
        );
        let mut seq = fast_sequence();
        seq.add_action(ActionKind::FindImage {
            image_template_id: template.id.clone(),
            match_threshold: None,
        });

        let mut locator = ScriptedLocator {
            script: LocatorScript::Fail("capture failed".to_string()),
            calls: 0,
        };
        let mut dispatcher = RecordingDispatcher::default();
        let summary = run(
            &EngineConfig::default(),
            &seq,
            &[template],
            &mut locator,
            &mut dispatcher,
            Arc::new(StubNotifier::default()),
        );
        assert_eq!(summary.results[0].outcome, ActionOutcome::InputError);
        assert!(summary.results[0].message.contains("capture failed"));
    }

    #[test]
    fn test_scroll_command_carries_resolved_fields() {
        let mut seq = fast_sequence();
        seq.add_action(ActionKind::Scroll {
            scroll_direction: ScrollDirection::Down,
            scroll_amount: 5,
            click_position: Some((40, 50)),
        });
        let mut locator = ScriptedLocator::never_found();
        let mut dispatcher = RecordingDispatcher::default();
        let summary = run(
            &EngineConfig::default(),
            &seq,
            &[],
            &mut locator,
            &mut dispatcher,
            Arc::new(StubNotifier::default()),
        );
        assert_eq!(summary.status, crate::core::result::RunStatus::Completed);
        assert_eq!(
            dispatcher.commands,
            vec![InputCommand::Scroll {
                direction: ScrollDirection::Down,
                amount: 5,
                position: Some((40, 50)),
            }]
        );
    }

    #[test]
    fn test_notify_timeout_is_reported_as_failure() {
        let notifier: Arc<dyn Notifier> = Arc::new(StubNotifier {
            delay: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        let outcome = notify_with_timeout(
            notifier,
            NotifyEvent::Message("slow".to_string()),
            Duration::from_millis(50),
        );
        assert!(outcome.is_err());
    }

    #[test]
    fn test_notify_within_timeout_succeeds() {
        let notifier = Arc::new(StubNotifier::default());
        let outcome = notify_with_timeout(
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            NotifyEvent::Message("hi".to_string()),
            Duration::from_secs(1),
        );
        assert!(outcome.is_ok());
        assert_eq!(notifier.deliveries.lock().unwrap().len(), 1);
    }
}
