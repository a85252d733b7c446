use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::ClientError;
use crate::screen::EncodedScreenshot;
use crate::types::{COMPUTER_TOOL_NAME, DisplaySize};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const COMPUTER_USE_BETA: &str = "computer-use-2025-01-24";
const COMPUTER_TOOL_TYPE: &str = "computer_20250124";
const DISPLAY_NUMBER: u32 = 0;

pub const SYSTEM_PROMPT: &str = r#"You control a desktop computer through the "computer" tool. A screenshot of the current screen is attached to the user's message.

Rules:
1. Do NOT request a screenshot. You already have the current screen; screenshot actions are ignored.
2. Only use these actions: left_click, right_click, double_click, move, type, key, key_combination, scroll, drag, wait.
3. Coordinates are [x, y] pixels inside the display size declared by the tool.
4. Emit every action needed to complete the instruction, in the order they must happen.
5. For key use {"key": "<name>"}; for key_combination use {"keys": ["ctrl", "c"]}.
6. For scroll use "direction" ("up" or "down") and an "amount"."#;

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<RequestMessage>,
    pub tools: Vec<ComputerTool>,
}

#[derive(Debug, Serialize)]
pub struct RequestMessage {
    pub role: &'static str,
    pub content: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestContent {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
}

/// The computer-use tool declaration, sized to the current display.
#[derive(Debug, Serialize)]
pub struct ComputerTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub name: &'static str,
    pub display_width_px: u32,
    pub display_height_px: u32,
    pub display_number: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl MessageResponse {
    /// Concatenated text blocks, if the model said anything.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Talks to the Anthropic Messages API.
pub struct Brain {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl Brain {
    pub fn new(settings: &Settings) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        debug!(model = %settings.model, timeout = ?settings.request_timeout, "Initialized Anthropic client");

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            timeout: settings.request_timeout,
        })
    }

    pub fn build_request(
        &self,
        instruction: &str,
        screenshot: &EncodedScreenshot,
        display: DisplaySize,
    ) -> MessagesRequest {
        build_request(&self.model, self.max_tokens, instruction, screenshot, display)
    }

    /// Sends the instruction and screenshot, returning the model's proposed actions.
    pub async fn request_actions(
        &self,
        instruction: &str,
        screenshot: &EncodedScreenshot,
        display: DisplaySize,
    ) -> Result<MessageResponse, ClientError> {
        let request = self.build_request(instruction, screenshot, display);
        let (display_width, display_height) = (display.width(), display.height());
        info!(
            model = %self.model,
            width = display_width,
            height = display_height,
            "Sending request to Claude"
        );

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", COMPUTER_USE_BETA)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let message = api_error_message(&body);
            error!(status = status.as_u16(), %message, "Anthropic API error");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = parse_response(&body)?;
        if let Some(usage) = &parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = ?parsed.stop_reason,
                "Claude response received"
            );
        }
        Ok(parsed)
    }

    fn classify(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(e)
        }
    }
}

pub fn build_request(
    model: &str,
    max_tokens: u32,
    instruction: &str,
    screenshot: &EncodedScreenshot,
    display: DisplaySize,
) -> MessagesRequest {
    MessagesRequest {
        model: model.to_string(),
        max_tokens,
        system: SYSTEM_PROMPT.to_string(),
        messages: vec![RequestMessage {
            role: "user",
            content: vec![
                RequestContent::Text {
                    text: instruction.to_string(),
                },
                RequestContent::Image {
                    source: ImageSource {
                        source_type: "base64",
                        media_type: screenshot.media_type.clone(),
                        data: screenshot.data.clone(),
                    },
                },
            ],
        }],
        tools: vec![ComputerTool {
            tool_type: COMPUTER_TOOL_TYPE,
            name: COMPUTER_TOOL_NAME,
            display_width_px: display.width(),
            display_height_px: display.height(),
            display_number: DISPLAY_NUMBER,
        }],
    }
}

pub fn parse_response(body: &str) -> Result<MessageResponse, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Unknown API error".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}
