//! Pre-flight checks on model-proposed actions.
//!
//! Nothing here touches the input devices. Every check answers with a value or
//! `None`; bad input from the model is an expected outcome, not an error.

use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{
    Action, ActionKind, Coordinate, DEFAULT_SCROLL_AMOUNT, DEFAULT_WAIT_SECS, DisplaySize,
    ScrollDirection,
};

/// Checks a raw `[x, y]` value against the display bounds.
pub fn validate_coordinate(raw: &Value, display: DisplaySize) -> Option<Coordinate> {
    let Some([x, y]) = raw.as_array().map(Vec::as_slice) else {
        warn!(coordinate = %raw, "Invalid coordinate format: expected a list with 2 elements");
        return None;
    };

    let (Some(x), Some(y)) = (to_int(x), to_int(y)) else {
        warn!(coordinate = %raw, "Invalid coordinate format: elements are not integers");
        return None;
    };

    let coordinate = Coordinate::within(x, y, display);
    if coordinate.is_none() {
        let (display_width, display_height) = (display.width(), display.height());
        warn!(
            x,
            y,
            width = display_width,
            height = display_height,
            "Coordinates out of bounds"
        );
    }
    coordinate
}

/// Runs the per-kind precondition checks and returns the typed action on success.
pub fn validate_action(
    kind: ActionKind,
    params: &Map<String, Value>,
    display: DisplaySize,
) -> Option<Action> {
    debug!(action = %kind, params = ?params, "Validating action parameters");

    let action = match kind {
        ActionKind::LeftClick => required_coordinate(params, "coordinate", display)
            .map(Action::LeftClick),
        ActionKind::RightClick => required_coordinate(params, "coordinate", display)
            .map(Action::RightClick),
        ActionKind::DoubleClick => required_coordinate(params, "coordinate", display)
            .map(Action::DoubleClick),
        ActionKind::Move => required_coordinate(params, "coordinate", display).map(Action::Move),
        ActionKind::Drag => {
            let start = required_coordinate(params, "start_coordinate", display);
            let end = required_coordinate(params, "end_coordinate", display);
            match (start, end) {
                (Some(start), Some(end)) => Some(Action::Drag { start, end }),
                _ => None,
            }
        }
        ActionKind::Type => non_empty_str(params, "text").map(|text| Action::Type {
            text: text.to_string(),
            at: optional_coordinate(params, display),
        }),
        ActionKind::Key => non_empty_str(params, "key")
            .or_else(|| non_empty_str(params, "text"))
            .map(|key| Action::Key(key_name(key))),
        ActionKind::KeyCombination => key_list(params).map(Action::KeyCombination),
        ActionKind::Scroll => scroll_amount(params).map(|amount| Action::Scroll {
            direction: scroll_direction(params),
            amount,
            at: optional_coordinate(params, display),
        }),
        ActionKind::Wait => Some(Action::Wait(wait_duration(params))),
    };

    match &action {
        Some(_) => debug!(action = %kind, "Action validation passed"),
        None => warn!(action = %kind, "Action validation failed"),
    }
    action
}

fn required_coordinate(
    params: &Map<String, Value>,
    field: &str,
    display: DisplaySize,
) -> Option<Coordinate> {
    validate_coordinate(params.get(field).unwrap_or(&Value::Null), display)
}

/// A present-but-invalid coordinate degrades to "act at the current cursor".
fn optional_coordinate(params: &Map<String, Value>, display: DisplaySize) -> Option<Coordinate> {
    let raw = params.get("coordinate").filter(|v| !v.is_null())?;
    let coordinate = validate_coordinate(raw, display);
    if coordinate.is_none() {
        warn!(coordinate = %raw, "Ignoring invalid coordinate, acting at the current cursor position");
    }
    coordinate
}

/// Whitespace counts as content: `" "` is a valid text to type and a valid key.
fn non_empty_str<'a>(params: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Trims padding around a key name but keeps a bare space as the space key.
fn key_name(raw: &str) -> String {
    match raw.trim() {
        "" => " ".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn key_list(params: &Map<String, Value>) -> Option<Vec<String>> {
    let keys = params.get("keys")?.as_array()?;
    if keys.is_empty() {
        return None;
    }
    keys.iter()
        .map(|key| key.as_str().filter(|k| !k.is_empty()).map(key_name))
        .collect()
}

fn scroll_direction(params: &Map<String, Value>) -> ScrollDirection {
    match params.get("direction").and_then(Value::as_str) {
        Some(direction) if direction.eq_ignore_ascii_case("up") => ScrollDirection::Up,
        _ => ScrollDirection::Down,
    }
}

/// Any numeric amount is accepted, negative included. Out-of-range values saturate.
fn scroll_amount(params: &Map<String, Value>) -> Option<i32> {
    match params.get("amount") {
        None | Some(Value::Null) => Some(DEFAULT_SCROLL_AMOUNT),
        Some(raw) => to_int(raw).map(|amount| {
            i32::try_from(amount).unwrap_or(if amount < 0 { i32::MIN } else { i32::MAX })
        }),
    }
}

fn wait_duration(params: &Map<String, Value>) -> Duration {
    params
        .get("duration")
        .and_then(to_float)
        .filter(|secs| *secs >= 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_WAIT_SECS))
}

/// Integers, finite floats (truncated) and integer strings convert; nothing else does.
fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    let float = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    float.is_finite().then_some(float)
}
