#[cfg(feature = "autogui")]
pub mod autogui;
pub mod providers;
pub mod telegram;
