use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures inside the input-injection layer.
#[derive(Error, Debug)]
pub enum InjectionError {
    #[error("Input automation unavailable: {0}")]
    Unavailable(String),

    #[error("Input call failed: {0}")]
    Input(String),

    #[error("Unknown key name: {0}")]
    UnknownKey(String),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No display found to capture")]
    NoDisplay,

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Failed to write screenshot to {path}: {reason}")]
    Save { path: PathBuf, reason: String },

    #[error("Screenshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport or service-side failures talking to the model.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Anthropic API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode model response: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY is not set in environment")]
    MissingApiKey,

    #[error("Failed to load env file {path}: {reason}")]
    EnvFile { path: PathBuf, reason: String },

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
