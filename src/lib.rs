//! Self Flow: send a screenshot and an instruction to Claude's computer-use
//! tool, then replay the proposed clicks and keystrokes on the local desktop.

pub mod brain;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod hands;
pub mod screen;
pub mod types;
pub mod ui;
pub mod validate;

pub use brain::{Brain, ContentBlock, MessageResponse};
pub use config::{Cli, Settings};
pub use events::{AgentEvent, EventSink};
pub use executor::{BatchExecutor, RetryPolicy};
pub use hands::{EnigoHands, Hands, Pacing};
pub use types::{Action, ActionKind, Coordinate, DisplaySize, ExecutionResult, ProposedAction};
