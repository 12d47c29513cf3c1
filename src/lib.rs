//! Macro sequence execution engine: runs ordered lists of screen-automation
//! actions (image search, clicks, keyboard input, waits, notifications)
//! against pluggable locator / dispatcher / notifier backends.

pub mod automation;
pub mod config;
pub mod core;
pub mod models;

pub use crate::automation::providers::{
    Dispatcher, InputCommand, Locator, MatchLocation, Notifier, NotifyEvent, ProviderError,
};
pub use crate::config::{EngineConfig, FailurePolicy};
pub use crate::core::cancel::CancelToken;
pub use crate::core::engine::MacroEngine;
pub use crate::core::error::{EngineError, ValidationError};
pub use crate::core::result::{ActionOutcome, ExecutionResult, RunStatus, RunSummary};
pub use crate::core::validate::validate;
pub use crate::models::{
    ActionKind, CaptureRegion, ImageTemplate, MacroAction, MacroDocument, MacroSequence,
};
