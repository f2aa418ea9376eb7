//! Parley - answer one message from the terminal
//!
//! Runs a single turn through the orchestrator:
//! - Classifies the message and gathers file context
//! - Asks the reasoning service for a grounded answer, or runs a command
//! - Prints the spoken line and the screen payload

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use parley_core::collaborators::{DisabledReasoner, GroundedReasoner, WorkspaceFiles};
use parley_core::graph::{classify, ConversationMessage, Orchestrator, TurnState, UserIntent};
use parley_core::reasoning::AnthropicReasoner;
use parley_core::{paths, EventChannel, LocalCommandRuntime, ParleyConfig};

/// Parley - voice-and-screen code assistant
#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Answer one message: classify, ground, run, speak", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace directory (defaults to current)
    #[arg(short, long, global = true)]
    directory: Option<PathBuf>,

    /// Write logs to stderr instead of ~/.parley/logs/parley.log
    #[arg(long, global = true)]
    log_stderr: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one turn and print the answer
    Ask {
        /// The message
        text: String,

        /// File open in the editor, relative to the workspace
        #[arg(short, long)]
        file: Option<String>,

        /// Treat the text as a voice transcript
        #[arg(long)]
        voice: bool,

        /// JSON file with prior messages ([{"role": "user", "content": "..."}])
        #[arg(long)]
        history: Option<PathBuf>,

        /// Print the final turn state as JSON
        #[arg(long)]
        json: bool,

        /// Also print the event log as JSON
        #[arg(long)]
        events: bool,
    },

    /// Print how a message would be classified
    Classify { text: String },

    /// Print the effective configuration
    Config,
}

fn init_logging(log_stderr: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if log_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    // Log to file so stdout carries only the answer
    let log_dir = paths::logs_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("parley.log");
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("creating log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ParleyConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(paths::config_file);
    ParleyConfig::load_from(&path).with_context(|| format!("loading {}", path.display()))
}

fn load_history(path: &Path) -> Result<Vec<ConversationMessage>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading history {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing history {}", path.display()))
}

fn reasoner(config: &ParleyConfig) -> Arc<dyn GroundedReasoner> {
    if !config.reasoning.enabled {
        tracing::info!("Grounded reasoning disabled in config");
        return Arc::new(DisabledReasoner);
    }
    match AnthropicReasoner::from_config(
        &config.reasoning,
        config.orchestrator.reasoning_timeout(),
    ) {
        Ok(reasoner) => Arc::new(reasoner),
        Err(e) => {
            tracing::warn!("Grounded reasoning unavailable: {}", e);
            eprintln!("note: {} (code questions will get a fallback answer)", e);
            Arc::new(DisabledReasoner)
        }
    }
}

struct AskArgs {
    text: String,
    file: Option<String>,
    voice: bool,
    history: Option<PathBuf>,
    json: bool,
    events: bool,
}

async fn ask(mut config: ParleyConfig, workspace: PathBuf, args: AskArgs) -> Result<()> {
    let history = match &args.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let intent = match (args.voice, args.file) {
        (true, _) => UserIntent::voice(args.text),
        (false, Some(file)) => UserIntent::message_with_file(args.text, file),
        (false, None) => UserIntent::message(args.text),
    };

    if config.runtime.working_dir.is_none() {
        config.runtime.working_dir = Some(workspace.clone());
    }

    let events = EventChannel::new();
    let runtime = LocalCommandRuntime::spawn(&events, config.runtime.clone());
    let files = Arc::new(WorkspaceFiles::new(&workspace));

    let orchestrator = Orchestrator::builder(events.clone())
        .with_files(files.clone())
        .with_reasoner(reasoner(&config))
        .with_config(config.orchestrator.clone())
        .with_pull_request(config.pull_request.clone())
        .build();

    let state = orchestrator
        .invoke(TurnState::new(intent).with_history(history))
        .await;
    runtime.shutdown();
    tracing::info!("{}", files.stats());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else if let Some(plan) = &state.response_plan {
        println!("{}", plan.voice);
        if !plan.screen.payload.is_empty() {
            println!();
            println!("{}", plan.screen.payload);
        }
    }

    if args.events {
        println!("{}", events.history_json()?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_stderr)?;

    let config = load_config(cli.config.as_deref())?;
    let workspace = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("reading current directory")?,
    };

    match cli.command {
        Commands::Ask {
            text,
            file,
            voice,
            history,
            json,
            events,
        } => {
            tracing::info!(workspace = %workspace.display(), "Starting turn");
            ask(
                config,
                workspace,
                AskArgs {
                    text,
                    file,
                    voice,
                    history,
                    json,
                    events,
                },
            )
            .await?;
        }
        Commands::Classify { text } => {
            println!("{}", classify(&UserIntent::message(text)));
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
