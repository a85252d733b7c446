use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::executor::DEFAULT_MAX_RETRIES;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LOG_LEVEL: &str = "info";
const SCREENSHOT_FILE: &str = "screenshot.png";

#[derive(Parser, Debug, Clone)]
#[command(name = "agent", version, about = "Self Flow - desktop automation driven by Claude")]
pub struct Cli {
    /// Model used for computer-use requests (env: SELF_FLOW_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Extra attempts for an action whose input injection failed
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Upper bound on one model request, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Where the screenshot is written before upload
    #[arg(long)]
    pub screenshot_path: Option<PathBuf>,

    /// Read environment overrides from this file instead of ./.env
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Log at debug level regardless of LOG_LEVEL
    #[arg(short, long)]
    pub verbose: bool,
}

/// Everything the session needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub screenshot_path: PathBuf,
}

impl Settings {
    /// Resolves settings from the process environment.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_lookup(cli, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        cli: &Cli,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = lookup("ANTHROPIC_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let model = cli
            .model
            .clone()
            .or_else(|| lookup("SELF_FLOW_MODEL").filter(|m| !m.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        if cli.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                name: "max_tokens",
                reason: "must be greater than zero".to_string(),
            });
        }
        if cli.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            api_key,
            model,
            max_tokens: cli.max_tokens,
            max_retries: cli.max_retries,
            request_timeout: Duration::from_secs(cli.timeout_secs),
            screenshot_path: cli
                .screenshot_path
                .clone()
                .unwrap_or_else(default_screenshot_path),
        })
    }
}

/// Loads `.env` (or the given file). A missing default `.env` is not an error.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|_| ())
            .map_err(|e| ConfigError::EnvFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

/// The tracing filter directive: `--verbose` beats `LOG_LEVEL`, which beats `info`.
pub fn log_level(cli: &Cli, lookup: impl Fn(&str) -> Option<String>) -> String {
    if cli.verbose {
        return "debug".to_string();
    }
    lookup("LOG_LEVEL")
        .map(|level| level.trim().to_ascii_lowercase())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

fn default_screenshot_path() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("self-flow").join(SCREENSHOT_FILE))
        .unwrap_or_else(|| PathBuf::from(SCREENSHOT_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("agent").chain(args.iter().copied()))
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let err = Settings::from_lookup(&cli(&[]), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
        let err = Settings::from_lookup(&cli(&[]), env(&[("ANTHROPIC_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn defaults_apply() {
        let settings =
            Settings::from_lookup(&cli(&[]), env(&[("ANTHROPIC_API_KEY", "sk-test")])).unwrap();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.request_timeout, Duration::from_secs(120));
        assert!(settings.screenshot_path.ends_with("screenshot.png"));
    }

    #[test]
    fn flags_beat_environment() {
        let lookup = env(&[("ANTHROPIC_API_KEY", "k"), ("SELF_FLOW_MODEL", "from-env")]);
        let settings = Settings::from_lookup(&cli(&[]), &lookup).unwrap();
        assert_eq!(settings.model, "from-env");

        let settings = Settings::from_lookup(
            &cli(&["--model", "from-flag", "--max-retries", "0", "--timeout-secs", "5"]),
            &lookup,
        )
        .unwrap();
        assert_eq!(settings.model, "from-flag");
        assert_eq!(settings.max_retries, 0);
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Settings::from_lookup(
            &cli(&["--timeout-secs", "0"]),
            env(&[("ANTHROPIC_API_KEY", "k")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "timeout_secs", .. }));
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(log_level(&cli(&[]), env(&[])), "info");
        assert_eq!(log_level(&cli(&[]), env(&[("LOG_LEVEL", "WARN")])), "warn");
        assert_eq!(log_level(&cli(&["-v"]), env(&[("LOG_LEVEL", "warn")])), "debug");
    }

    #[test]
    fn explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.env");
        assert!(matches!(
            load_env_file(Some(&missing)),
            Err(ConfigError::EnvFile { .. })
        ));
    }
}
