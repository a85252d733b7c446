use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use self_flow::brain::{ContentBlock, parse_response};
use self_flow::error::InjectionError;
use self_flow::events::{self, AgentEvent};
use self_flow::executor::{BatchExecutor, RetryPolicy};
use self_flow::hands::{Hands, Pacing};
use self_flow::types::{Coordinate, DisplaySize, ExecutionResult};

/// Records every injected call. Fails the first `failures` calls.
#[derive(Clone, Default)]
struct RecordingHands {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<usize>>,
}

impl RecordingHands {
    fn failing(times: usize) -> Self {
        let hands = Self::default();
        *hands.failures.lock().unwrap() = times;
        hands
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&mut self, call: String) -> Result<(), InjectionError> {
        self.calls.lock().unwrap().push(call);
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(InjectionError::Input("device busy".into()));
        }
        Ok(())
    }
}

impl Hands for RecordingHands {
    fn click(&mut self, at: Coordinate) -> Result<(), InjectionError> {
        self.record(format!("click {at}"))
    }
    fn right_click(&mut self, at: Coordinate) -> Result<(), InjectionError> {
        self.record(format!("right_click {at}"))
    }
    fn double_click(&mut self, at: Coordinate) -> Result<(), InjectionError> {
        self.record(format!("double_click {at}"))
    }
    fn move_to(&mut self, at: Coordinate, _over: Duration) -> Result<(), InjectionError> {
        self.record(format!("move {at}"))
    }
    fn type_text(&mut self, text: &str) -> Result<(), InjectionError> {
        self.record(format!("type {text}"))
    }
    fn press_key(&mut self, key: &str) -> Result<(), InjectionError> {
        self.record(format!("key {key}"))
    }
    fn press_combo(&mut self, keys: &[String]) -> Result<(), InjectionError> {
        self.record(format!("combo {}", keys.join("+")))
    }
    fn scroll(&mut self, amount: i32) -> Result<(), InjectionError> {
        self.record(format!("scroll {amount}"))
    }
    fn drag_by(&mut self, dx: i32, dy: i32, _over: Duration) -> Result<(), InjectionError> {
        self.record(format!("drag_by {dx} {dy}"))
    }
    fn screen_size(&self) -> Result<DisplaySize, InjectionError> {
        Ok(DisplaySize::default())
    }
}

fn executor() -> (BatchExecutor, tokio::sync::broadcast::Receiver<AgentEvent>) {
    let (tx, rx) = events::channel();
    let executor = BatchExecutor::new(DisplaySize::default(), tx)
        .with_pacing(Pacing::instant())
        .with_retry(RetryPolicy {
            max_retries: 2,
            backoff: Duration::ZERO,
        });
    (executor, rx)
}

fn computer(input: Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: "toolu".into(),
        name: "computer".into(),
        input,
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}

#[test]
fn empty_batch_touches_nothing() {
    let (executor, _rx) = executor();
    let hands = RecordingHands::default();
    let result = executor.execute(|| Ok(hands.clone()), &[]);
    assert_eq!(result, ExecutionResult::default());
    assert!(hands.calls().is_empty());
}

#[test]
fn unknown_action_is_skipped_and_wait_runs() {
    let (executor, _rx) = executor();
    let hands = RecordingHands::default();
    let content = vec![
        computer(json!({"action": "triple_click", "coordinate": [1, 1]})),
        computer(json!({"action": "wait", "duration": 0})),
    ];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.proposed, 2);
    assert_eq!(result.validated, 1);
    assert_eq!(result.executed, 1);
    assert_eq!(result.succeeded, 1);
    assert!(hands.calls().is_empty());
}

#[test]
fn click_on_calendar_end_to_end() {
    let body = json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Clicking the calendar icon."},
            {"type": "tool_use", "id": "toolu_01", "name": "computer",
             "input": {"action": "left_click", "coordinate": [512, 384]}}
        ],
        "stop_reason": "tool_use"
    })
    .to_string();
    let response = parse_response(&body).unwrap();

    let (executor, mut rx) = executor();
    let hands = RecordingHands::default();
    let result = executor.execute(|| Ok(hands.clone()), &response.content);

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.executed, 1);
    assert_eq!(hands.calls(), vec!["click (512, 384)"]);
    let seen = drain(&mut rx);
    assert_eq!(seen.first(), Some(&AgentEvent::BatchStarted { proposed: 1 }));
    assert_eq!(seen.last(), Some(&AgentEvent::BatchFinished { result }));
}

#[test]
fn screenshot_requests_never_execute() {
    let (executor, mut rx) = executor();
    let hands = RecordingHands::default();
    let content = vec![
        computer(json!({"action": "screenshot"})),
        computer(json!({"action": "left_click", "coordinate": [10, 10]})),
    ];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.proposed, 2);
    assert_eq!(result.executed, 1);
    assert_eq!(result.succeeded, 1);
    assert_eq!(hands.calls(), vec!["click (10, 10)"]);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        AgentEvent::ActionSkipped { index: 1, action, .. } if action == "screenshot"
    )));
}

#[test]
fn unavailable_capability_reports_zero() {
    let (executor, mut rx) = executor();
    let content = vec![computer(json!({"action": "left_click", "coordinate": [1, 1]}))];
    let result = executor.execute::<RecordingHands, _>(
        || Err(InjectionError::Unavailable("no display".into())),
        &content,
    );
    assert_eq!(result, ExecutionResult::default());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [AgentEvent::CapabilityUnavailable { .. }]
    ));
}

#[test]
fn flaky_injection_is_retried_until_it_works() {
    let (executor, mut rx) = executor();
    let hands = RecordingHands::failing(2);
    let content = vec![computer(json!({"action": "left_click", "coordinate": [3, 4]}))];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.succeeded, 1);
    assert_eq!(hands.calls().len(), 3);
    let retries = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, AgentEvent::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[test]
fn persistent_failure_counts_as_executed_not_succeeded() {
    let (executor, _rx) = executor();
    let hands = RecordingHands::failing(usize::MAX);
    let content = vec![
        computer(json!({"action": "key", "key": "enter"})),
        computer(json!({"action": "wait", "duration": 0})),
    ];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.executed, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(hands.calls(), vec!["key enter"; 3]);
}

#[test]
fn invalid_actions_are_skipped_without_stopping_the_batch() {
    let (executor, _rx) = executor();
    let hands = RecordingHands::default();
    let content = vec![
        computer(json!({"action": "left_click", "coordinate": [1024, 10]})),
        computer(json!({"action": "drag", "start_coordinate": [1, 1], "end_coordinate": [2000, 5]})),
        computer(json!({"action": "type", "text": ""})),
        computer(json!({"action": "double_click", "coordinate": [1023, 767]})),
    ];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.proposed, 4);
    assert_eq!(result.validated, 1);
    assert_eq!(result.executed, 1);
    assert_eq!(result.succeeded, 1);
    assert_eq!(hands.calls(), vec!["double_click (1023, 767)"]);
}

#[test]
fn actions_run_in_emitted_order() {
    let (executor, _rx) = executor();
    let hands = RecordingHands::default();
    let content = vec![
        ContentBlock::Text {
            text: "Opening search".into(),
        },
        computer(json!({"action": "left_click", "coordinate": [100, 20]})),
        computer(json!({"action": "type", "text": "weather", "coordinate": [100, 20]})),
        computer(json!({"action": "key_combination", "keys": ["ctrl", "a"]})),
        computer(json!({"action": "scroll", "direction": "up", "amount": 5})),
        computer(json!({"action": "scroll", "amount": 5, "coordinate": [50, 50]})),
        computer(json!({"action": "drag", "start_coordinate": [10, 10], "end_coordinate": [30, 5]})),
    ];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.succeeded, 6);
    assert_eq!(
        hands.calls(),
        vec![
            "click (100, 20)",
            "click (100, 20)",
            "type weather",
            "combo ctrl+a",
            "scroll 5",
            "move (50, 50)",
            "scroll -5",
            "move (10, 10)",
            "drag_by 20 -5",
        ]
    );
}

#[test]
fn other_tools_are_ignored() {
    let (executor, _rx) = executor();
    let hands = RecordingHands::default();
    let content = vec![ContentBlock::ToolUse {
        id: "toolu".into(),
        name: "str_replace_editor".into(),
        input: json!({"action": "left_click", "coordinate": [1, 1]}),
    }];
    let result = executor.execute(|| Ok(hands.clone()), &content);
    assert_eq!(result.proposed, 0);
    assert!(hands.calls().is_empty());
}
