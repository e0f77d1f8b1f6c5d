//! rolebridge - terminal client for rolebridge-server
//!
//! Streams translated documents to stdout. Progress, questions and errors go
//! to stderr. Ctrl+C stops the running request.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rolebridge_cli::{ClientError, StdinClarifier, StreamOutcome, TranslatorClient};
use rolebridge_common::{Stage, TranslationDirection};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status for a request the user stopped
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "rolebridge")]
#[command(about = "Translate between product and engineering language")]
#[command(version)]
struct Cli {
    /// rolebridge-server base URL
    #[arg(long, env = "ROLEBRIDGE_SERVER", default_value = "http://127.0.0.1:5780")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-shot translation with default assumptions
    Translate(DirectArgs),
    /// Print the analysis of the input as JSON
    Analyze(InputArgs),
    /// Analyze, answer the open questions, then translate
    Interactive(InputArgs),
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// pm-to-dev or dev-to-pm
    #[arg(short, long)]
    direction: TranslationDirection,

    /// Extra background for the model
    #[arg(short, long)]
    context: Option<String>,

    /// Text to translate; read from stdin when omitted
    content: Option<String>,
}

/// Direct translation takes no context
#[derive(ClapArgs, Debug)]
struct DirectArgs {
    /// pm-to-dev or dev-to-pm
    #[arg(short, long)]
    direction: TranslationDirection,

    /// Text to translate; read from stdin when omitted
    content: Option<String>,
}

async fn read_content(arg: Option<&String>) -> Result<String> {
    if let Some(content) = arg {
        return Ok(content.clone());
    }
    let mut content = String::new();
    tokio::io::stdin()
        .read_to_string(&mut content)
        .await
        .context("Failed to read input from stdin")?;
    Ok(content)
}

fn print_fragment(fragment: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(fragment.as_bytes());
    let _ = stdout.flush();
}

fn outcome_to_exit(outcome: StreamOutcome) -> ExitCode {
    match outcome {
        StreamOutcome::Completed { .. } => {
            println!();
            ExitCode::SUCCESS
        }
        StreamOutcome::Cancelled { .. } => {
            eprintln!("\nStopped.");
            ExitCode::from(EXIT_CANCELLED)
        }
        StreamOutcome::Failed { message, .. } => {
            eprintln!("\nError: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn error_to_exit(error: ClientError) -> ExitCode {
    if error.is_cancelled() {
        eprintln!("\nStopped.");
        ExitCode::from(EXIT_CANCELLED)
    } else {
        eprintln!("\nError: {}", error);
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rolebridge_cli=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = TranslatorClient::new(&cli.server)?;
    debug!(server = %client.base_url(), "Client ready");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let code = match &cli.command {
        Command::Translate(input) => {
            let content = read_content(input.content.as_ref()).await?;
            let outcome = client
                .translate(input.direction, &content, &cancel, |fragment, _| {
                    print_fragment(fragment)
                })
                .await;
            outcome_to_exit(outcome)
        }
        Command::Analyze(input) => {
            let content = read_content(input.content.as_ref()).await?;
            eprintln!("Analyzing...");
            match client
                .analyze(
                    input.direction,
                    &content,
                    input.context.as_deref(),
                    &cancel,
                    |_, _| {},
                )
                .await
            {
                Ok(analysis) => {
                    println!("{}", serde_json::to_string_pretty(&analysis)?);
                    ExitCode::SUCCESS
                }
                Err(e) => error_to_exit(e),
            }
        }
        Command::Interactive(input) => {
            let content = read_content(input.content.as_ref()).await?;
            let mut clarifier = StdinClarifier::terminal();
            eprintln!("Analyzing...");
            let result = client
                .run_interactive(
                    input.direction,
                    &content,
                    input.context.as_deref(),
                    &mut clarifier,
                    &cancel,
                    |stage, fragment| {
                        if stage == Stage::Synthesis {
                            print_fragment(fragment)
                        }
                    },
                )
                .await;
            match result {
                Ok(outcome) => {
                    if outcome.clarification_skipped {
                        eprintln!("(no questions needed, defaults applied)");
                    }
                    println!();
                    ExitCode::SUCCESS
                }
                Err(e) => error_to_exit(e),
            }
        }
    };

    Ok(code)
}
