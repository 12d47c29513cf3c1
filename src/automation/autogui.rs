use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rustautogui::{MatchMode, RustAutoGui};

use crate::automation::providers::{
    Dispatcher, InputCommand, Locator, MatchLocation, ProviderError,
};
use crate::models::{ImageTemplate, ScrollDirection};

/// Wheel ticks sent per scroll unit.
const SCROLL_INTENSITY: u32 = 120;
/// Mouse travel time for drags, in seconds.
const DRAG_SPEED: f32 = 0.3;

struct DriverInner {
    gui: RustAutoGui,
    /// Template ids already registered with the matcher.
    stored: HashSet<String>,
}

/// Screen-search and input backend over rustautogui. One OS-level driver
/// is shared by the locator and dispatcher handles; the runner serializes
/// access, the mutex just keeps the sharing sound.
pub struct AutoGuiDriver {
    inner: Arc<Mutex<DriverInner>>,
}

pub struct AutoGuiLocator {
    inner: Arc<Mutex<DriverInner>>,
}

pub struct AutoGuiDispatcher {
    inner: Arc<Mutex<DriverInner>>,
}

impl AutoGuiDriver {
    pub fn new() -> Result<Self, ProviderError> {
        let gui = RustAutoGui::new(false)
            .map_err(|e| ProviderError(format!("failed to initialize rustautogui: {e}")))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DriverInner {
                gui,
                stored: HashSet::new(),
            })),
        })
    }

    /// Splits the driver into the two provider handles the engine consumes.
    pub fn split(self) -> (AutoGuiLocator, AutoGuiDispatcher) {
        let locator = AutoGuiLocator {
            inner: Arc::clone(&self.inner),
        };
        let dispatcher = AutoGuiDispatcher { inner: self.inner };
        (locator, dispatcher)
    }
}

impl DriverInner {
    fn ensure_stored(&mut self, template: &ImageTemplate) -> Result<(), ProviderError> {
        if self.stored.contains(&template.id) {
            return Ok(());
        }

        // Fail with a readable error before the matcher sees a bad file.
        image::open(&template.file_path).map_err(|e| {
            ProviderError(format!(
                "template '{}' is not a readable image ({}): {e}",
                template.name, template.file_path
            ))
        })?;

        let r = template.capture_region;
        let region = Some((r.x.max(0) as u32, r.y.max(0) as u32, r.width, r.height));
        self.gui
            .store_template_from_file(&template.file_path, region, MatchMode::Segmented, &template.id)
            .map_err(|e| {
                ProviderError(format!("failed to load template '{}': {e}", template.name))
            })?;
        self.stored.insert(template.id.clone());
        log::debug!("registered template '{}' with search region {region:?}", template.name);
        Ok(())
    }
}

impl Locator for AutoGuiLocator {
    fn locate(
        &mut self,
        template: &ImageTemplate,
        threshold: f32,
    ) -> Result<Option<MatchLocation>, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_stored(template)?;
        match inner.gui.find_stored_image_on_screen(threshold, &template.id) {
            Ok(Some(matches)) => Ok(matches.first().map(|&(x, y, score)| MatchLocation {
                x,
                y,
                score: score as f32,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(ProviderError(format!(
                "screen search for '{}' failed: {e:?}",
                template.name
            ))),
        }
    }
}

impl Dispatcher for AutoGuiDispatcher {
    fn perform(&mut self, command: &InputCommand) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        let gui = &mut inner.gui;
        match command {
            InputCommand::Click { x, y } => click_at(gui, *x, *y, Button::Left),
            InputCommand::DoubleClick { x, y } => {
                click_at(gui, *x, *y, Button::Left)?;
                thread::sleep(Duration::from_millis(50));
                click_at(gui, *x, *y, Button::Left)
            }
            InputCommand::RightClick { x, y } => click_at(gui, *x, *y, Button::Right),
            InputCommand::Drag { from, to } => {
                move_to(gui, from.0, from.1)?;
                thread::sleep(Duration::from_millis(20));
                gui.drag_mouse(clamp(to.0) as i32, clamp(to.1) as i32, DRAG_SPEED)
                    .map_err(|e| ProviderError(format!("drag failed: {e:?}")))
            }
            InputCommand::TypeText { text } => gui
                .keyboard_input(text)
                .map_err(|e| ProviderError(format!("keyboard input failed: {e:?}"))),
            InputCommand::KeyPress { keys } => match keys.len() {
                0 => Err(ProviderError("empty key combination".to_string())),
                1 => gui
                    .keyboard_command(&keys[0])
                    .map_err(|e| ProviderError(format!("key press failed: {e:?}"))),
                2 => gui
                    .keyboard_multi_key(&keys[0], &keys[1], None)
                    .map_err(|e| ProviderError(format!("key combo failed: {e:?}"))),
                3 => gui
                    .keyboard_multi_key(&keys[0], &keys[1], Some(&keys[2]))
                    .map_err(|e| ProviderError(format!("key combo failed: {e:?}"))),
                n => Err(ProviderError(format!(
                    "key combinations of {n} keys are not supported"
                ))),
            },
            InputCommand::Scroll {
                direction,
                amount,
                position,
            } => {
                if let Some((x, y)) = position {
                    move_to(gui, *x, *y)?;
                    thread::sleep(Duration::from_millis(20));
                }
                for _ in 0..*amount {
                    let result = match direction {
                        ScrollDirection::Up => gui.scroll_up(SCROLL_INTENSITY),
                        ScrollDirection::Down => gui.scroll_down(SCROLL_INTENSITY),
                        ScrollDirection::Left => gui.scroll_left(SCROLL_INTENSITY),
                        ScrollDirection::Right => gui.scroll_right(SCROLL_INTENSITY),
                    };
                    result.map_err(|e| ProviderError(format!("scroll failed: {e:?}")))?;
                }
                Ok(())
            }
        }
    }
}

enum Button {
    Left,
    Right,
}

fn clamp(v: i32) -> u32 {
    v.max(0) as u32
}

fn move_to(gui: &mut RustAutoGui, x: i32, y: i32) -> Result<(), ProviderError> {
    gui.move_mouse_to_pos(clamp(x), clamp(y), 0.0)
        .map_err(|e| ProviderError(format!("mouse move failed: {e:?}")))
}

/// Click with one retry. Occasional first-click misses on slow window
/// managers make the stabilize-then-click dance worth it.
fn click_at(gui: &mut RustAutoGui, x: i32, y: i32, button: Button) -> Result<(), ProviderError> {
    let mut last_error = String::new();
    for attempt in 0..2 {
        if attempt > 0 {
            thread::sleep(Duration::from_millis(50));
        }
        if let Err(e) = gui.move_mouse_to_pos(clamp(x), clamp(y), 0.0) {
            last_error = format!("mouse move failed: {e:?}");
            continue;
        }
        // Short sleep to stabilize the cursor.
        thread::sleep(Duration::from_millis(20));
        let clicked = match button {
            Button::Left => gui.left_click(),
            Button::Right => gui.right_click(),
        };
        match clicked {
            Ok(_) => return Ok(()),
            Err(e) => last_error = format!("click failed: {e:?}"),
        }
    }
    Err(ProviderError(last_error))
}
