use std::time::Duration;

use crate::automation::providers::{Notifier, NotifyEvent, ProviderError};
use crate::models::TelegramConfig;

const API_BASE: &str = "https://api.telegram.org/bot";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends run events to a Telegram chat via the Bot API.
/// Delivery is best effort; callers decide what a failure means.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::blocking::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError(format!("failed to build http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn send_text(&self, text: &str) -> Result<(), ProviderError> {
        if !self.config.is_configured() {
            return Err(ProviderError("telegram is not configured".to_string()));
        }

        let url = format!("{API_BASE}{}/sendMessage", self.config.bot_token);
        let response = self
            .client
            .post(&url)
            .form(&[("chat_id", self.config.chat_id.as_str()), ("text", text)])
            .send()
            .map_err(|e| ProviderError(format!("telegram request failed: {e}")))?;

        if response.status().is_success() {
            log::debug!("telegram message delivered ({} chars)", text.len());
            Ok(())
        } else {
            Err(ProviderError(format!(
                "telegram API returned {}",
                response.status()
            )))
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, event: &NotifyEvent) -> Result<(), ProviderError> {
        self.send_text(&format_event(event))
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }
}

/// Renders an event as the chat message body.
pub fn format_event(event: &NotifyEvent) -> String {
    match event {
        NotifyEvent::Message(text) => text.clone(),
        NotifyEvent::RunReport {
            sequence_name,
            success,
            duration_secs,
            detail,
        } => {
            let verdict = if *success { "succeeded" } else { "failed" };
            format!("Macro '{sequence_name}' {verdict} after {duration_secs:.1}s\n{detail}")
        }
        NotifyEvent::ErrorReport {
            title,
            error,
            context,
        } => format!("Macro error: {title}\n{error}\n{context}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_run_report() {
        let event = NotifyEvent::RunReport {
            sequence_name: "reserve".to_string(),
            success: true,
            duration_secs: 12.34,
            detail: "5 ok / 0 failed / 1 skipped over 2 pass(es)".to_string(),
        };
        let text = format_event(&event);
        assert!(text.starts_with("Macro 'reserve' succeeded after 12.3s"));
        assert!(text.contains("5 ok"));

        let event = NotifyEvent::RunReport {
            sequence_name: "reserve".to_string(),
            success: false,
            duration_secs: 1.0,
            detail: String::new(),
        };
        assert!(format_event(&event).contains("failed"));
    }

    #[test]
    fn test_format_plain_message_passes_through() {
        let event = NotifyEvent::Message("hello".to_string());
        assert_eq!(format_event(&event), "hello");
    }

    #[test]
    fn test_unconfigured_notifier_refuses_delivery() {
        let notifier = TelegramNotifier::new(TelegramConfig::default()).unwrap();
        assert!(!notifier.is_configured());
        let result = notifier.notify(&NotifyEvent::Message("hi".to_string()));
        assert!(result.is_err());
    }
}
