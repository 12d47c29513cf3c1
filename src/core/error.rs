use thiserror::Error;

/// One problem found while checking a sequence against the known templates.
/// The validator collects all of them instead of stopping at the first.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("action {action_id} references unknown template {template_id}")]
    UnknownTemplate {
        action_id: String,
        template_id: String,
    },
    #[error("action {action_id} threshold {value} is outside [0, 1]")]
    ThresholdOutOfRange { action_id: String, value: f32 },
    #[error("template {template_id} threshold {value} is outside [0, 1]")]
    TemplateThresholdOutOfRange { template_id: String, value: f32 },
    #[error("ordering index {index} is used more than once")]
    DuplicateIndex { index: u32 },
    #[error("ordering indices are not dense: expected 0..{expected}, found {found:?}")]
    IndicesNotDense { expected: u32, found: Vec<u32> },
    #[error("loop count must be at least 1 (got {loop_count})")]
    InvalidLoopCount { loop_count: u32 },
    #[error("action {action_id} wait duration {seconds} is not a non-negative number")]
    InvalidWaitDuration { action_id: String, seconds: f64 },
    #[error("drag action {action_id} is missing a start or end position")]
    MissingDragEndpoints { action_id: String },
    #[error("key press action {action_id} has an empty key combination")]
    EmptyKeyCombination { action_id: String },
    #[error("click action {action_id} has neither a position nor a template")]
    MissingClickTarget { action_id: String },
    #[error("sequence is disabled")]
    SequenceDisabled,
}

/// Errors the engine itself can return. Per-action failures never surface
/// here; they live in the result stream.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sequence failed validation with {} error(s)", .0.len())]
    InvalidSequence(Vec<ValidationError>),
    #[error("another macro run is already in progress")]
    RunAlreadyInProgress,
}
