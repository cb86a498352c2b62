//! Neura Chat - Terminal front end for the neura conductor
//!
//! Reads prompts from stdin and prints the streamed replies as they arrive.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (key from OPENROUTER_API_KEY)
//! neura-chat
//!
//! # Pick a model by display name or identifier
//! neura-chat --model "Neura Code"
//!
//! # With config file
//! neura-chat --config ~/.config/neura/conductor.toml
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=debug neura-chat
//! ```

mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use neura_conductor::{
    default_config_path, load_config_from_path, Conductor, ConductorMessage, ConfigOverrides,
    OpenRouterTransport, Rejection,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use repl::{Command, Input, Renderer};

/// Neura Chat - Streaming chat in the terminal
#[derive(Parser, Debug)]
#[command(name = "neura-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "NEURA_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model identifier or catalog name
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// API key (defaults to the key environment variable)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Completion API base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Sampling temperature
    #[arg(short = 't', long, value_name = "TEMP")]
    temperature: Option<f32>,

    /// Maximum tokens per reply
    #[arg(long, value_name = "N")]
    max_tokens: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NEURA_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(ref key) = self.api_key {
            overrides = overrides.with_api_key(key.clone());
        }
        if let Some(ref url) = self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(temperature) = self.temperature {
            overrides = overrides.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            overrides = overrides.with_max_tokens(max_tokens);
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with the reply text.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("neura_chat={level},neura_conductor={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// What the loop should do after a line of input
enum Flow {
    Continue,
    Quit,
}

/// Which wait finished first
enum Wake {
    Line(Option<String>),
    Streamed,
    Interrupt,
}

async fn write_out(stdout: &mut Stdout, text: &str) -> Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Print everything the Conductor published since the last call
async fn drain_feed(
    rx: &mut UnboundedReceiver<ConductorMessage>,
    renderer: &mut Renderer,
    stdout: &mut Stdout,
) -> Result<()> {
    let mut out = String::new();
    while let Ok(msg) = rx.try_recv() {
        if let Some(text) = renderer.render(&msg) {
            out.push_str(&text);
        }
    }
    if !out.is_empty() {
        write_out(stdout, &out).await?;
    }
    Ok(())
}

fn describe(rejection: &Rejection) -> String {
    match rejection {
        Rejection::Busy(state) => format!("! Still busy ({}), please wait\n", state.description()),
        other => format!("! {other}\n"),
    }
}

async fn handle_line(
    conductor: &mut Conductor<OpenRouterTransport>,
    line: &str,
    stdout: &mut Stdout,
) -> Result<Flow> {
    let result = match Input::parse(line) {
        Input::Empty => Ok(()),
        Input::Chat(text) => conductor.submit(&text).await,
        Input::Command(command) => match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => {
                write_out(stdout, &repl::help()).await?;
                Ok(())
            }
            Command::Models => {
                write_out(stdout, &repl::models(conductor.model())).await?;
                Ok(())
            }
            Command::History => {
                write_out(stdout, &repl::history(conductor.store())).await?;
                Ok(())
            }
            Command::Model(None) => {
                write_out(stdout, &format!("Model: {}\n", conductor.model())).await?;
                Ok(())
            }
            Command::Model(Some(name)) => match conductor.select_model(&name) {
                Ok(model) => {
                    let text = format!("Model: {model} (from the next reply on)\n");
                    write_out(stdout, &text).await?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Clear => conductor.clear(),
            Command::Regenerate(None) => conductor.regenerate_last().await,
            Command::Regenerate(Some(id)) => conductor.regenerate(id).await,
            Command::Unknown(text) => {
                write_out(stdout, &format!("Unknown command {text:?}, try /help\n")).await?;
                Ok(())
            }
        },
    };

    if let Err(rejection) = result {
        write_out(stdout, &describe(&rejection)).await?;
    }
    Ok(Flow::Continue)
}

async fn run_chat(
    mut conductor: Conductor<OpenRouterTransport>,
    mut rx: UnboundedReceiver<ConductorMessage>,
) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::new();
    let mut prompted = false;

    write_out(&mut stdout, &repl::banner(conductor.model())).await?;

    loop {
        drain_feed(&mut rx, &mut renderer, &mut stdout).await?;

        if conductor.is_idle() && !prompted {
            write_out(&mut stdout, "> ").await?;
            prompted = true;
        }

        let streaming = !conductor.is_idle();
        // Every branch here is cancel-safe
        let wake = tokio::select! {
            line = lines.next_line() => Wake::Line(line.context("Failed to read stdin")?),
            _ = conductor.poll_streaming(), if streaming => Wake::Streamed,
            _ = tokio::signal::ctrl_c() => Wake::Interrupt,
        };

        match wake {
            Wake::Line(None) | Wake::Interrupt => break,
            Wake::Line(Some(line)) => {
                prompted = false;
                if let Flow::Quit = handle_line(&mut conductor, &line, &mut stdout).await? {
                    break;
                }
            }
            Wake::Streamed => {
                if conductor.is_idle() {
                    prompted = false;
                }
            }
        }
    }

    drain_feed(&mut rx, &mut renderer, &mut stdout).await?;
    write_out(&mut stdout, "\nBye!\n").await?;
    info!(messages = conductor.store().len(), "Chat ended");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level)?;

    info!("Neura Chat starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Some(ref path) = args.config {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
    }
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let overrides = args.overrides();
    overrides.apply(&mut config);
    config.validate().context("Invalid command line options")?;

    info!(
        source = %config.source(),
        model = %config.conductor.model,
        base_url = %config.transport.base_url,
        "Configuration resolved"
    );
    if config.transport.api_key.is_none() {
        warn!(
            env = %config.api_key_env,
            "No API key configured; replies will fail until one is set"
        );
    }

    let transport =
        OpenRouterTransport::new(config.transport).context("Failed to build HTTP client")?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let conductor = Conductor::new(transport, config.conductor, tx);

    run_chat(conductor, rx).await
}
