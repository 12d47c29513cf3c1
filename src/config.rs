use std::time::Duration;

use crate::models::{ImageTemplate, MacroDocument};

/// What the runner does with a pass after a `not_found` or `input_error`
/// outcome. The default aborts the current pass and moves on to the next
/// loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    AbortPass,
    ContinuePass,
    AbortRun,
}

/// Resolved engine configuration. The engine never reads the settings file
/// itself; the caller resolves values once and hands them in here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fallback match threshold for templates saved without one.
    pub default_threshold: f32,
    /// Pause inserted between consecutive actions.
    pub action_delay: Duration,
    pub failure_policy: FailurePolicy,
    /// Abort the run after this many consecutive failed passes. 0 = unlimited.
    pub max_consecutive_failed_passes: u32,
    /// Upper bound on how long a notification may block the run loop.
    pub notify_timeout: Duration,
    /// Send a delivery report when the run ends.
    pub notify_on_finish: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.7,
            action_delay: Duration::ZERO,
            failure_policy: FailurePolicy::AbortPass,
            max_consecutive_failed_passes: 0,
            notify_timeout: Duration::from_secs(5),
            notify_on_finish: true,
        }
    }
}

impl EngineConfig {
    /// Builds a config from a loaded document's general settings.
    pub fn from_document(doc: &MacroDocument) -> Self {
        Self {
            default_threshold: doc.match_confidence_threshold,
            action_delay: Duration::from_secs_f64(doc.action_delay_secs.max(0.0)),
            notify_on_finish: doc.telegram_config.enabled,
            ..Self::default()
        }
    }

    /// Threshold used for one image search: the action override wins, then
    /// the template default, then the configured fallback. Always clamped
    /// to [0, 1].
    pub fn effective_threshold(&self, override_threshold: Option<f32>, template: &ImageTemplate) -> f32 {
        let raw = override_threshold.unwrap_or(if template.threshold > 0.0 {
            template.threshold
        } else {
            self.default_threshold
        });
        raw.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaptureRegion;

    fn template_with_threshold(threshold: f32) -> ImageTemplate {
        let mut t = ImageTemplate::new(
            "t",
            "t.png",
            CaptureRegion {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
        );
        t.threshold = threshold;
        t
    }

    #[test]
    fn test_effective_threshold_precedence() {
        let config = EngineConfig::default();
        let template = template_with_threshold(0.8);
        assert_eq!(config.effective_threshold(Some(0.95), &template), 0.95);
        assert_eq!(config.effective_threshold(None, &template), 0.8);

        let unset = template_with_threshold(0.0);
        assert_eq!(config.effective_threshold(None, &unset), 0.7);
    }

    #[test]
    fn test_effective_threshold_is_clamped() {
        let config = EngineConfig::default();
        let template = template_with_threshold(1.5);
        assert_eq!(config.effective_threshold(None, &template), 1.0);
        assert_eq!(config.effective_threshold(Some(-0.2), &template), 0.0);
    }

    #[test]
    fn test_from_document_reads_resolved_values() {
        let mut doc = MacroDocument::default();
        doc.match_confidence_threshold = 0.85;
        doc.action_delay_secs = 0.1;
        doc.telegram_config.enabled = true;
        let config = EngineConfig::from_document(&doc);
        assert_eq!(config.default_threshold, 0.85);
        assert_eq!(config.action_delay, Duration::from_millis(100));
        assert!(config.notify_on_finish);
    }
}
