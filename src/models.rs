use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

pub type Point = (i32, i32);

/// Current on-disk document version. Bump when the schema changes shape.
pub const DOCUMENT_VERSION: &str = "0.1.0";

/// Screen region a template was captured from (screen coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTemplate {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub capture_region: CaptureRegion,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_now")]
    pub created_at: DateTime<Utc>,
}

impl ImageTemplate {
    pub fn new(name: &str, file_path: &str, capture_region: CaptureRegion) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            file_path: file_path.to_string(),
            capture_region,
            threshold: default_threshold(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl Default for ScrollDirection {
    fn default() -> Self {
        ScrollDirection::Up
    }
}

/// Kind-specific payload of one macro step. The `action_type` tag strings
/// are part of the document format; renaming a variant breaks saved files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionKind {
    FindImage {
        image_template_id: String,
        #[serde(default)]
        match_threshold: Option<f32>,
    },
    Click {
        #[serde(default)]
        click_position: Option<Point>,
        #[serde(default)]
        image_template_id: Option<String>,
    },
    DoubleClick {
        #[serde(default)]
        click_position: Option<Point>,
        #[serde(default)]
        image_template_id: Option<String>,
    },
    RightClick {
        #[serde(default)]
        click_position: Option<Point>,
        #[serde(default)]
        image_template_id: Option<String>,
    },
    Drag {
        click_position: Option<Point>,
        drag_to_position: Option<Point>,
    },
    TypeText {
        text_input: String,
    },
    KeyPress {
        key_combination: Vec<String>,
    },
    Scroll {
        #[serde(default)]
        scroll_direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        scroll_amount: u32,
        #[serde(default)]
        click_position: Option<Point>,
    },
    Wait {
        wait_seconds: f64,
    },
    SendTelegram {
        #[serde(default)]
        telegram_message: Option<String>,
    },
}

impl ActionKind {
    /// Short label used in status lines and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::FindImage { .. } => "find_image",
            ActionKind::Click { .. } => "click",
            ActionKind::DoubleClick { .. } => "double_click",
            ActionKind::RightClick { .. } => "right_click",
            ActionKind::Drag { .. } => "drag",
            ActionKind::TypeText { .. } => "type_text",
            ActionKind::KeyPress { .. } => "key_press",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Wait { .. } => "wait",
            ActionKind::SendTelegram { .. } => "send_telegram",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroAction {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Position within the sequence. Unique and dense (0..n) after any edit.
    pub index: u32,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl MacroAction {
    pub fn new(index: u32, kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            enabled: true,
            index,
            description: String::new(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSequence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub actions: Vec<MacroAction>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,
    #[serde(default)]
    pub infinite_loop: bool,
    /// Pause between loop passes, in seconds.
    #[serde(default = "default_loop_delay")]
    pub loop_delay_secs: f64,
    #[serde(default = "default_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_now")]
    pub modified_at: DateTime<Utc>,
}

impl MacroSequence {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: String::new(),
            actions: Vec::new(),
            enabled: true,
            loop_count: default_loop_count(),
            infinite_loop: false,
            loop_delay_secs: default_loop_delay(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn add_action(&mut self, kind: ActionKind) -> String {
        let action = MacroAction::new(self.actions.len() as u32, kind);
        let id = action.id.clone();
        self.actions.push(action);
        self.touch();
        id
    }

    pub fn remove_action(&mut self, action_id: &str) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a.id != action_id);
        if self.actions.len() == before {
            return false;
        }
        self.reindex();
        self.touch();
        true
    }

    pub fn move_action(&mut self, action_id: &str, new_index: usize) -> bool {
        let Some(pos) = self.actions.iter().position(|a| a.id == action_id) else {
            return false;
        };
        if new_index >= self.actions.len() {
            return false;
        }
        let action = self.actions.remove(pos);
        self.actions.insert(new_index, action);
        self.reindex();
        self.touch();
        true
    }

    /// Rewrites ordering indices as dense 0..n in current vec order.
    pub fn reindex(&mut self) {
        for (i, action) in self.actions.iter_mut().enumerate() {
            action.index = i as u32;
        }
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub enabled: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

/// Everything the app persists: templates, sequences and general settings.
/// One JSON file, saved by the editor, consumed read-only by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub image_templates: Vec<ImageTemplate>,
    #[serde(default)]
    pub macro_sequences: Vec<MacroSequence>,
    #[serde(default)]
    pub telegram_config: TelegramConfig,
    #[serde(default = "default_screenshot_path")]
    pub screenshot_save_path: String,
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval_secs: u64,
    #[serde(default = "default_threshold")]
    pub match_confidence_threshold: f32,
    /// Pause inserted between consecutive actions, in seconds.
    #[serde(default = "default_action_delay")]
    pub action_delay_secs: f64,
}

impl Default for MacroDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            image_templates: Vec::new(),
            macro_sequences: Vec::new(),
            telegram_config: TelegramConfig::default(),
            screenshot_save_path: default_screenshot_path(),
            auto_save_interval_secs: default_auto_save_interval(),
            match_confidence_threshold: default_threshold(),
            action_delay_secs: default_action_delay(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read document {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write document {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse document {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl MacroDocument {
    pub fn get_template(&self, template_id: &str) -> Option<&ImageTemplate> {
        self.image_templates.iter().find(|t| t.id == template_id)
    }

    pub fn get_sequence(&self, sequence_id: &str) -> Option<&MacroSequence> {
        self.macro_sequences.iter().find(|s| s.id == sequence_id)
    }

    pub fn get_sequence_by_name(&self, name: &str) -> Option<&MacroSequence> {
        self.macro_sequences.iter().find(|s| s.name == name)
    }

    pub fn add_template(&mut self, template: ImageTemplate) {
        self.image_templates.push(template);
    }

    /// Removes a template. Sequences still referencing it fail validation,
    /// not execution.
    pub fn remove_template(&mut self, template_id: &str) -> bool {
        let before = self.image_templates.len();
        self.image_templates.retain(|t| t.id != template_id);
        self.image_templates.len() != before
    }

    pub fn add_sequence(&mut self, sequence: MacroSequence) {
        self.macro_sequences.push(sequence);
    }

    pub fn remove_sequence(&mut self, sequence_id: &str) -> bool {
        let before = self.macro_sequences.len();
        self.macro_sequences.retain(|s| s.id != sequence_id);
        self.macro_sequences.len() != before
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| DocumentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| DocumentError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(DocumentError::Serialize)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| DocumentError::Write {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        fs::write(path, json).map_err(|source| DocumentError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f32 {
    0.7
}

fn default_scroll_amount() -> u32 {
    3
}

fn default_loop_count() -> u32 {
    1
}

fn default_loop_delay() -> f64 {
    1.0
}

fn default_action_delay() -> f64 {
    0.5
}

fn default_auto_save_interval() -> u64 {
    30
}

fn default_screenshot_path() -> String {
    "assets/screenshots".to_string()
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

fn default_now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> MacroDocument {
        let mut doc = MacroDocument::default();
        let template = ImageTemplate::new(
            "confirm_button",
            "assets/templates/confirm.png",
            CaptureRegion {
                x: 100,
                y: 200,
                width: 80,
                height: 40,
            },
        );
        let template_id = template.id.clone();
        doc.add_template(template);

        let mut seq = MacroSequence::new("book seat");
        seq.add_action(ActionKind::FindImage {
            image_template_id: template_id.clone(),
            match_threshold: Some(0.9),
        });
        seq.add_action(ActionKind::Click {
            click_position: None,
            image_template_id: Some(template_id),
        });
        seq.add_action(ActionKind::TypeText {
            text_input: "hello".to_string(),
        });
        seq.add_action(ActionKind::KeyPress {
            key_combination: vec!["ctrl".to_string(), "s".to_string()],
        });
        seq.add_action(ActionKind::Wait { wait_seconds: 0.5 });
        seq.add_action(ActionKind::SendTelegram {
            telegram_message: Some("done".to_string()),
        });
        seq.loop_count = 3;
        doc.add_sequence(seq);
        doc
    }

    #[test]
    fn test_document_roundtrip_is_lossless() {
        let doc = sample_document();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro_config.json");
        doc.save_to_file(&path).unwrap();
        let loaded = MacroDocument::load_from_file(&path).unwrap();
        assert_eq!(doc, loaded);
    }

    #[test]
    fn test_action_type_tags_match_legacy_format() {
        let action = MacroAction::new(
            0,
            ActionKind::Wait {
                wait_seconds: 2.0,
            },
        );
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action_type"], "wait");
        assert_eq!(json["wait_seconds"], 2.0);

        let parsed: MacroAction = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, action);
    }

    #[test]
    fn test_missing_optional_fields_fall_back_to_defaults() {
        let json = r#"{
            "id": "a1",
            "index": 0,
            "action_type": "scroll"
        }"#;
        let action: MacroAction = serde_json::from_str(json).unwrap();
        assert!(action.enabled);
        match action.kind {
            ActionKind::Scroll {
                scroll_direction,
                scroll_amount,
                click_position,
            } => {
                assert_eq!(scroll_direction, ScrollDirection::Up);
                assert_eq!(scroll_amount, 3);
                assert_eq!(click_position, None);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_remove_and_move_keep_indices_dense() {
        let mut seq = MacroSequence::new("edit");
        let a = seq.add_action(ActionKind::Wait { wait_seconds: 1.0 });
        let b = seq.add_action(ActionKind::Wait { wait_seconds: 2.0 });
        let c = seq.add_action(ActionKind::Wait { wait_seconds: 3.0 });

        assert!(seq.move_action(&c, 0));
        let indices: Vec<u32> = seq.actions.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(seq.actions[0].id, c);

        assert!(seq.remove_action(&a));
        let indices: Vec<u32> = seq.actions.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(seq.actions[1].id, b);

        assert!(!seq.remove_action("missing"));
    }

    #[test]
    fn test_remove_template_leaves_dangling_reference() {
        let mut doc = sample_document();
        let template_id = doc.image_templates[0].id.clone();
        assert!(doc.remove_template(&template_id));
        assert!(doc.get_template(&template_id).is_none());
        // The sequence still points at the deleted template; the validator
        // is responsible for rejecting it before a run starts.
        assert!(!doc.macro_sequences[0].actions.is_empty());
    }
}
