//! The input-injection side: what the agent can physically do to the desktop.
//!
//! `Hands` is the capability boundary. `EnigoHands` drives the real mouse and
//! keyboard; tests plug in recording doubles. `perform` holds the ten action
//! handlers and is the only place injection errors are turned into a plain
//! success flag.

use enigo::{
    Axis, Button, Coordinate as MouseCoordinate,
    Direction::{Click, Press, Release},
    Enigo, Key, Keyboard, Mouse, Settings,
};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::InjectionError;
use crate::types::{Action, Coordinate, DisplaySize, ScrollDirection};

/// Abstract OS input capability.
pub trait Hands {
    fn click(&mut self, at: Coordinate) -> Result<(), InjectionError>;
    fn right_click(&mut self, at: Coordinate) -> Result<(), InjectionError>;
    fn double_click(&mut self, at: Coordinate) -> Result<(), InjectionError>;
    fn move_to(&mut self, at: Coordinate, over: Duration) -> Result<(), InjectionError>;
    fn type_text(&mut self, text: &str) -> Result<(), InjectionError>;
    fn press_key(&mut self, key: &str) -> Result<(), InjectionError>;
    fn press_combo(&mut self, keys: &[String]) -> Result<(), InjectionError>;
    /// Positive scrolls up, negative scrolls down.
    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError>;
    /// Holds the left button and moves by `(dx, dy)` from the current position.
    fn drag_by(&mut self, dx: i32, dy: i32, over: Duration) -> Result<(), InjectionError>;
    fn screen_size(&self) -> Result<DisplaySize, InjectionError>;
}

/// Fixed delays the handlers wait before (or while) injecting input.
#[derive(Debug, Clone, PartialEq)]
pub struct Pacing {
    pub click_delay: Duration,
    /// Pause after focusing a coordinate before typing or scrolling.
    pub focus_delay: Duration,
    pub drag_settle: Duration,
    pub move_duration: Duration,
    pub drag_duration: Duration,
    /// Upper bound for the `wait` action.
    pub max_wait: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            click_delay: Duration::from_millis(200),
            focus_delay: Duration::from_millis(100),
            drag_settle: Duration::from_millis(100),
            move_duration: Duration::from_millis(250),
            drag_duration: Duration::from_millis(500),
            max_wait: Duration::from_secs(MAX_WAIT_SECS),
        }
    }
}

impl Pacing {
    /// No delays at all, and `wait` returns immediately.
    pub fn instant() -> Self {
        Self {
            click_delay: Duration::ZERO,
            focus_delay: Duration::ZERO,
            drag_settle: Duration::ZERO,
            move_duration: Duration::ZERO,
            drag_duration: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }
}

pub const MAX_WAIT_SECS: u64 = 30;
const GLIDE_STEP: Duration = Duration::from_millis(10);

/// Runs the handler for `action`. Injection failures are logged and reported as `false`.
pub fn perform<H: Hands + ?Sized>(action: &Action, hands: &mut H, pacing: &Pacing) -> bool {
    let kind = action.kind();
    info!(action = %kind, "Executing action");

    match dispatch(action, hands, pacing) {
        Ok(()) => {
            info!(action = %kind, "Action injected successfully");
            true
        }
        Err(e) => {
            warn!(action = %kind, error = %e, "Action failed");
            false
        }
    }
}

fn dispatch<H: Hands + ?Sized>(
    action: &Action,
    hands: &mut H,
    pacing: &Pacing,
) -> Result<(), InjectionError> {
    match action {
        Action::LeftClick(at) => {
            pause(pacing.click_delay);
            debug!(%at, "Left clicking");
            hands.click(*at)
        }
        Action::RightClick(at) => {
            pause(pacing.click_delay);
            debug!(%at, "Right clicking");
            hands.right_click(*at)
        }
        Action::DoubleClick(at) => {
            pause(pacing.click_delay);
            debug!(%at, "Double clicking");
            hands.double_click(*at)
        }
        Action::Move(at) => {
            debug!(%at, over = ?pacing.move_duration, "Moving cursor");
            hands.move_to(*at, pacing.move_duration)
        }
        Action::Type { text, at } => {
            match at {
                Some(at) => {
                    debug!(%at, "Clicking before typing");
                    hands.click(*at)?;
                    pause(pacing.focus_delay);
                }
                None => debug!("Typing at current cursor position"),
            }
            debug!(chars = text.chars().count(), "Typing text");
            hands.type_text(text)
        }
        Action::Key(key) => {
            debug!(key = %key, "Pressing key");
            hands.press_key(key)
        }
        Action::KeyCombination(keys) => {
            debug!(keys = %keys.join("+"), "Pressing key combination");
            hands.press_combo(keys)
        }
        Action::Scroll {
            direction,
            amount,
            at,
        } => {
            match at {
                Some(at) => {
                    debug!(%at, "Moving before scrolling");
                    hands.move_to(*at, Duration::ZERO)?;
                    pause(pacing.focus_delay);
                }
                None => debug!("Scrolling at current cursor position"),
            }
            let signed = signed_scroll(*direction, *amount);
            debug!(amount = signed, "Scrolling");
            hands.scroll(signed)
        }
        Action::Drag { start, end } => {
            debug!(%start, %end, "Dragging");
            hands.move_to(*start, Duration::ZERO)?;
            pause(pacing.drag_settle);
            hands.drag_by(
                end.x() - start.x(),
                end.y() - start.y(),
                pacing.drag_duration,
            )
        }
        Action::Wait(duration) => {
            let duration = (*duration).min(pacing.max_wait);
            debug!(?duration, "Waiting");
            thread::sleep(duration);
            Ok(())
        }
    }
}

/// Up keeps the amount, down negates it.
pub fn signed_scroll(direction: ScrollDirection, amount: i32) -> i32 {
    match direction {
        ScrollDirection::Up => amount,
        ScrollDirection::Down => amount.saturating_neg(),
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Real mouse and keyboard through enigo.
pub struct EnigoHands {
    enigo: Enigo,
}

impl EnigoHands {
    pub fn new() -> Result<Self, InjectionError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InjectionError::Unavailable(e.to_string()))?;
        Ok(Self { enigo })
    }

    fn cursor(&self) -> Result<(i32, i32), InjectionError> {
        self.enigo.location().map_err(input_error)
    }

    /// Moves in small linear steps so the motion takes roughly `over`.
    fn glide_to(&mut self, x: i32, y: i32, over: Duration) -> Result<(), InjectionError> {
        let steps = (over.as_millis() / GLIDE_STEP.as_millis()).max(1) as i32;
        let (from_x, from_y) = if steps > 1 { self.cursor()? } else { (x, y) };
        let tick = over / steps as u32;

        for step in 1..=steps {
            let nx = from_x + (x - from_x) * step / steps;
            let ny = from_y + (y - from_y) * step / steps;
            self.enigo
                .move_mouse(nx, ny, MouseCoordinate::Abs)
                .map_err(input_error)?;
            pause(tick);
        }
        Ok(())
    }

    fn button_click(&mut self, button: Button, at: Coordinate, times: usize) -> Result<(), InjectionError> {
        self.enigo
            .move_mouse(at.x(), at.y(), MouseCoordinate::Abs)
            .map_err(input_error)?;
        for _ in 0..times {
            self.enigo.button(button, Click).map_err(input_error)?;
        }
        Ok(())
    }
}

impl Hands for EnigoHands {
    fn click(&mut self, at: Coordinate) -> Result<(), InjectionError> {
        self.button_click(Button::Left, at, 1)
    }

    fn right_click(&mut self, at: Coordinate) -> Result<(), InjectionError> {
        self.button_click(Button::Right, at, 1)
    }

    fn double_click(&mut self, at: Coordinate) -> Result<(), InjectionError> {
        self.button_click(Button::Left, at, 2)
    }

    fn move_to(&mut self, at: Coordinate, over: Duration) -> Result<(), InjectionError> {
        self.glide_to(at.x(), at.y(), over)
    }

    fn type_text(&mut self, text: &str) -> Result<(), InjectionError> {
        self.enigo.text(text).map_err(input_error)
    }

    fn press_key(&mut self, key: &str) -> Result<(), InjectionError> {
        if key.len() > 1 && key.contains('+') {
            let keys: Vec<String> = key.split('+').map(str::to_string).collect();
            return self.press_combo(&keys);
        }
        let key = map_key(key)?;
        self.enigo.key(key, Click).map_err(input_error)
    }

    fn press_combo(&mut self, keys: &[String]) -> Result<(), InjectionError> {
        let keys = keys
            .iter()
            .map(|k| map_key(k))
            .collect::<Result<Vec<_>, _>>()?;
        let Some((last, modifiers)) = keys.split_last() else {
            return Ok(());
        };

        for key in modifiers {
            self.enigo.key(*key, Press).map_err(input_error)?;
        }
        let clicked = self.enigo.key(*last, Click).map_err(input_error);
        // Release even if the final click failed so no modifier stays held down.
        let released = release_all(modifiers, |key| {
            self.enigo.key(key, Release).map_err(input_error)
        });
        clicked.and(released)
    }

    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError> {
        // enigo treats positive lengths as scrolling down.
        self.enigo
            .scroll(amount.saturating_neg(), Axis::Vertical)
            .map_err(input_error)
    }

    fn drag_by(&mut self, dx: i32, dy: i32, over: Duration) -> Result<(), InjectionError> {
        let (x, y) = self.cursor()?;
        self.enigo.button(Button::Left, Press).map_err(input_error)?;
        let moved = self.glide_to(x + dx, y + dy, over);
        let released = self.enigo.button(Button::Left, Release).map_err(input_error);
        moved.and(released)
    }

    fn screen_size(&self) -> Result<DisplaySize, InjectionError> {
        let (width, height) = self.enigo.main_display().map_err(input_error)?;
        u32::try_from(width)
            .ok()
            .zip(u32::try_from(height).ok())
            .and_then(|(w, h)| DisplaySize::new(w, h))
            .ok_or_else(|| InjectionError::Input(format!("invalid display size {width}x{height}")))
    }
}

/// Releases `held` in reverse order. Every key gets a release attempt; the first error wins.
fn release_all(
    held: &[Key],
    mut release: impl FnMut(Key) -> Result<(), InjectionError>,
) -> Result<(), InjectionError> {
    held.iter()
        .rev()
        .map(|key| release(*key))
        .fold(Ok(()), |first, next| first.and(next))
}

fn input_error(e: enigo::InputError) -> InjectionError {
    InjectionError::Input(e.to_string())
}

/// Maps a key name as the model writes it to an enigo key.
pub fn map_key(name: &str) -> Result<Key, InjectionError> {
    let trimmed = name.trim();
    if trimmed.is_empty() && !name.is_empty() {
        return Ok(Key::Space);
    }
    let mut chars = trimmed.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(Key::Unicode(c));
    }

    let key = match trimmed.to_ascii_lowercase().as_str() {
        "control" | "ctrl" => Key::Control,
        "shift" => Key::Shift,
        "alt" | "option" => Key::Alt,
        "command" | "cmd" | "super" | "meta" | "win" | "windows" => Key::Meta,

        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "escape" | "esc" => Key::Escape,

        "up" | "uparrow" | "up_arrow" | "arrowup" => Key::UpArrow,
        "down" | "downarrow" | "down_arrow" | "arrowdown" => Key::DownArrow,
        "left" | "leftarrow" | "left_arrow" | "arrowleft" => Key::LeftArrow,
        "right" | "rightarrow" | "right_arrow" | "arrowright" => Key::RightArrow,

        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" | "pgup" | "prior" => Key::PageUp,
        "pagedown" | "page_down" | "pgdn" | "next" => Key::PageDown,
        "capslock" | "caps_lock" => Key::CapsLock,

        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        _ => return Err(InjectionError::UnknownKey(name.to_string())),
    };
    Ok(key)
}
