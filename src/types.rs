use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Pixel size of the screen the model is looking at. Detected once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    width: u32,
    height: u32,
}

impl DisplaySize {
    /// Returns `None` when either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for DisplaySize {
    fn default() -> Self {
        Self {
            width: FALLBACK_DISPLAY_WIDTH,
            height: FALLBACK_DISPLAY_HEIGHT,
        }
    }
}

impl fmt::Display for DisplaySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A screen position already checked against a `DisplaySize`.
///
/// Only `validate::validate_coordinate` hands these out, so holding one means
/// `0 <= x < width` and `0 <= y < height` for the display it was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    x: i32,
    y: i32,
}

impl Coordinate {
    pub(crate) fn within(x: i64, y: i64, display: DisplaySize) -> Option<Self> {
        let in_x = 0 <= x && x < i64::from(display.width);
        let in_y = 0 <= y && y < i64::from(display.height);
        if !(in_x && in_y) {
            return None;
        }
        // Both bounds come from u32 sizes that fit the screens enigo can address.
        let x = i32::try_from(x).ok()?;
        let y = i32::try_from(y).ok()?;
        Some(Self { x, y })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The ten automation primitives the executor knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LeftClick,
    RightClick,
    DoubleClick,
    Move,
    Type,
    Key,
    KeyCombination,
    Scroll,
    Drag,
    Wait,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::LeftClick,
        ActionKind::RightClick,
        ActionKind::DoubleClick,
        ActionKind::Move,
        ActionKind::Type,
        ActionKind::Key,
        ActionKind::KeyCombination,
        ActionKind::Scroll,
        ActionKind::Drag,
        ActionKind::Wait,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::LeftClick => "left_click",
            ActionKind::RightClick => "right_click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::Move => "move",
            ActionKind::Type => "type",
            ActionKind::Key => "key",
            ActionKind::KeyCombination => "key_combination",
            ActionKind::Scroll => "scroll",
            ActionKind::Drag => "drag",
            ActionKind::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a proposed action never reached a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The model asked for a fresh screenshot; we already sent one.
    Screenshot,
    Unknown(String),
    InvalidParameters,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Screenshot => f.write_str("screenshot requests are not allowed"),
            Rejection::Unknown(name) if name.is_empty() => f.write_str("missing action name"),
            Rejection::Unknown(name) => write!(f, "unknown action type '{}'", name),
            Rejection::InvalidParameters => f.write_str("invalid parameters"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == SCREENSHOT_ACTION {
            return Err(Rejection::Screenshot);
        }
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Rejection::Unknown(s.to_string()))
    }
}

/// One `computer` tool invocation lifted out of a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    pub name: String,
    pub parameters: Map<String, Value>,
}

impl ProposedAction {
    /// Builds from a tool-use `input` object. Non-object inputs become an empty,
    /// nameless action that the executor will skip as unknown.
    pub fn from_input(input: &Value) -> Self {
        let parameters = input.as_object().cloned().unwrap_or_default();
        let name = parameters
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { name, parameters }
    }

    pub fn kind(&self) -> Result<ActionKind, Rejection> {
        self.name.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A fully validated action, ready for a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    LeftClick(Coordinate),
    RightClick(Coordinate),
    DoubleClick(Coordinate),
    Move(Coordinate),
    Type {
        text: String,
        at: Option<Coordinate>,
    },
    Key(String),
    KeyCombination(Vec<String>),
    Scroll {
        direction: ScrollDirection,
        /// Taken as given; a negative amount reverses the direction.
        amount: i32,
        at: Option<Coordinate>,
    },
    Drag {
        start: Coordinate,
        end: Coordinate,
    },
    Wait(Duration),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::LeftClick(_) => ActionKind::LeftClick,
            Action::RightClick(_) => ActionKind::RightClick,
            Action::DoubleClick(_) => ActionKind::DoubleClick,
            Action::Move(_) => ActionKind::Move,
            Action::Type { .. } => ActionKind::Type,
            Action::Key(_) => ActionKind::Key,
            Action::KeyCombination(_) => ActionKind::KeyCombination,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::Drag { .. } => ActionKind::Drag,
            Action::Wait(_) => ActionKind::Wait,
        }
    }
}

/// Tally for one batch. Lives only for the duration of a batch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub proposed: usize,
    pub validated: usize,
    pub executed: usize,
    pub succeeded: usize,
}

impl ExecutionResult {
    pub fn success_rate(&self) -> f64 {
        if self.executed == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.executed as f64 * 100.0
    }
}

pub const COMPUTER_TOOL_NAME: &str = "computer";
pub const SCREENSHOT_ACTION: &str = "screenshot";
pub const FALLBACK_DISPLAY_WIDTH: u32 = 1024;
pub const FALLBACK_DISPLAY_HEIGHT: u32 = 768;
pub const DEFAULT_SCROLL_AMOUNT: i32 = 3;
pub const DEFAULT_WAIT_SECS: f64 = 1.0;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_size_rejects_zero_sides() {
        assert!(DisplaySize::new(0, 768).is_none());
        assert!(DisplaySize::new(1024, 0).is_none());
        assert_eq!(DisplaySize::new(1024, 768), Some(DisplaySize::default()));
    }

    #[test]
    fn action_kind_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.name().parse::<ActionKind>(), Ok(kind));
        }
    }

    #[test]
    fn screenshot_and_unknown_names_are_rejected() {
        assert_eq!("screenshot".parse::<ActionKind>(), Err(Rejection::Screenshot));
        assert_eq!(
            "triple_click".parse::<ActionKind>(),
            Err(Rejection::Unknown("triple_click".into()))
        );
    }

    #[test]
    fn proposed_action_reads_action_field() {
        let proposed = ProposedAction::from_input(&json!({
            "action": "left_click",
            "coordinate": [10, 20]
        }));
        assert_eq!(proposed.name, "left_click");
        assert_eq!(proposed.kind(), Ok(ActionKind::LeftClick));
        assert_eq!(proposed.parameters["coordinate"], json!([10, 20]));
    }

    #[test]
    fn non_object_input_is_a_nameless_action() {
        let proposed = ProposedAction::from_input(&json!("left_click"));
        assert!(proposed.name.is_empty());
        assert!(matches!(proposed.kind(), Err(Rejection::Unknown(_))));
    }

    #[test]
    fn success_rate_handles_empty_batches() {
        assert_eq!(ExecutionResult::default().success_rate(), 0.0);
        let result = ExecutionResult {
            proposed: 4,
            validated: 4,
            executed: 4,
            succeeded: 3,
        };
        assert_eq!(result.success_rate(), 75.0);
    }
}
