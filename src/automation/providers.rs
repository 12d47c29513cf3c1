use crate::models::{ImageTemplate, Point, ScrollDirection};

/// Failure reported by a capability provider (locator, dispatcher, notifier).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Where a template matched on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchLocation {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Screen search. `threshold` arrives resolved and clamped to [0, 1];
/// `Ok(None)` means "searched, nothing above threshold".
pub trait Locator {
    fn locate(
        &mut self,
        template: &ImageTemplate,
        threshold: f32,
    ) -> Result<Option<MatchLocation>, ProviderError>;
}

/// A fully resolved input side effect. The runner converts template-relative
/// clicks into concrete coordinates before dispatch, so implementations
/// never need to search the screen themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    Click { x: i32, y: i32 },
    DoubleClick { x: i32, y: i32 },
    RightClick { x: i32, y: i32 },
    Drag { from: Point, to: Point },
    TypeText { text: String },
    KeyPress { keys: Vec<String> },
    Scroll {
        direction: ScrollDirection,
        amount: u32,
        position: Option<Point>,
    },
}

pub trait Dispatcher {
    fn perform(&mut self, command: &InputCommand) -> Result<(), ProviderError>;
}

/// Something worth telling the remote channel about.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyEvent {
    /// Free-form message from a send_telegram action.
    Message(String),
    /// End-of-run (or mid-run) delivery report.
    RunReport {
        sequence_name: String,
        success: bool,
        duration_secs: f64,
        detail: String,
    },
    ErrorReport {
        title: String,
        error: String,
        context: String,
    },
}

/// Best-effort remote notification sink. Implementations must be cheap to
/// share across threads; delivery runs off the main run loop.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotifyEvent) -> Result<(), ProviderError>;

    /// Whether delivery can work at all (credentials present, enabled).
    fn is_configured(&self) -> bool {
        true
    }
}
