use anyhow::{Context, Result};
use clap::Parser;
use self_flow::config::{self, Cli, Settings};
use self_flow::executor::{BatchExecutor, RetryPolicy};
use self_flow::hands::EnigoHands;
use self_flow::ui::{self, Instruction};
use self_flow::{Brain, ExecutionResult, events, screen};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::load_env_file(cli.env_file.as_deref())?;
    init_logging(&config::log_level(&cli, |name| std::env::var(name).ok()));

    info!("Starting Self Flow automation");

    let settings = Settings::load(&cli).context("Failed to load configuration")?;
    info!(model = %settings.model, "Configuration loaded");

    let brain = Brain::new(&settings)?;

    // Probing the input devices can block, keep it off the runtime threads.
    let screen_size = tokio::task::spawn_blocking(|| screen::detect_display_size(EnigoHands::new))
        .await
        .context("Display detection panicked")?;
    info!(screen = %screen_size, "Display configuration detected");

    let (event_tx, _) = events::channel();
    let reporter = events::spawn_reporter(&event_tx);
    let executor = BatchExecutor::new(screen_size, event_tx.clone()).with_retry(RetryPolicy {
        max_retries: settings.max_retries,
        ..RetryPolicy::default()
    });

    ui::display_loop_header();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut processed = 0usize;

    loop {
        ui::prompt();
        let instruction = match Instruction::from_read(lines.next_line().await) {
            Instruction::Closed => {
                info!("Input closed");
                break;
            }
            Instruction::Unreadable(reason) => {
                warn!(%reason, "Failed to read instruction");
                println!("Could not read that instruction. Please try again.");
                continue;
            }
            Instruction::Empty => {
                println!("No instruction provided. Please try again or type 'quit' to exit.");
                continue;
            }
            Instruction::Quit => {
                info!("User requested to quit");
                break;
            }
            Instruction::Run(text) => text,
        };

        processed += 1;
        info!(number = processed, %instruction, "Processing instruction");

        match run_instruction(&brain, &executor, &settings, &instruction).await {
            Ok((result, reply)) => {
                if let Some(reply) = reply {
                    println!("\nClaude: {reply}");
                }
                if result.succeeded > 0 {
                    println!("Executed {} action(s).", result.succeeded);
                } else {
                    println!("No actions were executed.");
                }
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Error processing instruction");
                println!("Error: {e:#}");
                println!("Continuing with next instruction...");
            }
        }

        println!("\nInstruction #{processed} completed. Ready for next instruction...");
    }

    drop(executor);
    drop(event_tx);
    let _ = reporter.await;

    info!(processed, "Self Flow session completed");
    println!("\nSession completed! Processed {processed} instructions.");
    Ok(())
}

/// Screenshot, ask Claude, replay. Returns the tally plus any text the model sent.
async fn run_instruction(
    brain: &Brain,
    executor: &BatchExecutor,
    settings: &Settings,
    instruction: &str,
) -> Result<(ExecutionResult, Option<String>)> {
    let path = settings.screenshot_path.clone();
    let screenshot = tokio::task::spawn_blocking(move || screen::capture_encoded(&path))
        .await
        .context("Screenshot task panicked")?
        .context("Failed to capture screen")?;

    let response = brain
        .request_actions(instruction, &screenshot, executor.display())
        .await
        .context("Claude request failed")?;
    info!(blocks = response.content.len(), "Claude response received");

    // Actions sleep and block on the input devices; run them on a blocking thread.
    let batch = executor.clone();
    let content = response.content.clone();
    let result = tokio::task::spawn_blocking(move || batch.execute(EnigoHands::new, &content))
        .await
        .context("Action execution panicked")?;

    Ok((result, response.text()))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
