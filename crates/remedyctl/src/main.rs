//! Remedy Control - CLI for the Remedy troubleshooting pipeline
//!
//! Every command that changes the system is shown first and runs only
//! after an explicit yes.

mod confirm;
mod logging;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remedy_engine::{Config, Decision, Engine, Session, SessionStore, Step};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "remedyctl")]
#[command(about = "Remedy - guided diagnostics and fixes with confirmation", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $REMEDY_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a problem and work through it
    Ask {
        /// The problem, in your own words
        #[arg(required = true)]
        query: Vec<String>,

        /// Continue an earlier session
        #[arg(long)]
        session: Option<String>,

        /// Continue the most recent session
        #[arg(long, conflicts_with = "session")]
        resume: bool,
    },

    /// Interactive session; one problem per line, "exit" to quit
    Chat {
        #[arg(long)]
        session: Option<String>,
    },

    /// Show how the policy treats a command (nothing is run)
    Check {
        #[arg(required = true)]
        command: Vec<String>,
    },

    /// Show stage progress for a session
    Status {
        /// Session id (defaults to the most recent)
        #[arg(long)]
        session: Option<String>,
    },

    /// Forget progress for one category so it starts over at stage 0
    Reset {
        category: String,

        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let store = SessionStore::default_location();

    match cli.command {
        Commands::Ask {
            query,
            session,
            resume,
        } => {
            let engine = Engine::from_config(config)?;
            let mut session = open_session(&engine, &store, session.as_deref(), resume)?;
            let outcome = drive(&engine, &mut session, &query.join(" ")).await;
            store.save(&session.snapshot())?;
            println!("Session: {}", session.id());
            outcome
        }
        Commands::Chat { session } => {
            let engine = Engine::from_config(config)?;
            let mut session = open_session(&engine, &store, session.as_deref(), false)?;
            chat(&engine, &mut session, &store).await
        }
        Commands::Check { command } => {
            let gate = remedy_engine::PolicyGate::from_config(&config.policy)?;
            render::display_decision(&gate.evaluate(&command.join(" ")));
            Ok(())
        }
        Commands::Status { session } => status(&store, session.as_deref()),
        Commands::Reset { category, session } => {
            let engine = Engine::from_config(config)?;
            let mut session = open_session(&engine, &store, session.as_deref(), true)?;
            if session.reset_category(&category) {
                store.save(&session.snapshot())?;
                println!("Reset '{}' in session {}.", category, session.id());
            } else {
                println!("No progress recorded for '{}'.", category);
            }
            Ok(())
        }
    }
}

fn open_session(
    engine: &Engine,
    store: &SessionStore,
    id: Option<&str>,
    resume_latest: bool,
) -> Result<Session> {
    if let Some(id) = id {
        let state = store
            .load(id)?
            .with_context(|| format!("No saved session '{}'", id))?;
        return Ok(engine.resume_session(state));
    }
    if resume_latest {
        if let Some(state) = store.latest()? {
            return Ok(engine.resume_session(state));
        }
    }
    Ok(engine.start_session())
}

/// Run one problem to completion, prompting at each checkpoint
async fn drive(engine: &Engine, session: &mut Session, query: &str) -> Result<()> {
    let mut step = engine.submit(session, query).await?;
    loop {
        render::display_response(step.response());
        step = match step {
            Step::Confirm(pending) => {
                let decision = if confirm::request_approval()? {
                    Decision::Approve
                } else {
                    Decision::Decline
                };
                engine.resolve(session, pending, decision).await?
            }
            Step::ManualCheck(_) => {
                let fixed = confirm::ask_yes_no("Is the problem fixed now?")?;
                engine.report_manual_outcome(session, fixed).await?
            }
            Step::Done(_) => return Ok(()),
        };
    }
}

async fn chat(engine: &Engine, session: &mut Session, store: &SessionStore) -> Result<()> {
    println!("Session {}. Describe a problem, or type 'exit'.", session.id());
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        if let Err(e) = drive(engine, session, line).await {
            error!("Round failed: {:#}", e);
            eprintln!("Error: {:#}", e);
        }
        store.save(&session.snapshot())?;
    }
    info!("Chat session {} closed", session.id());
    Ok(())
}

fn status(store: &SessionStore, id: Option<&str>) -> Result<()> {
    let state = match id {
        Some(id) => store.load(id)?,
        None => store.latest()?,
    };
    let Some(state) = state else {
        println!("No saved sessions.");
        return Ok(());
    };

    println!("Session {} (updated {})", state.session_id, state.updated_at.to_rfc3339());
    if state.categories.is_empty() {
        println!("  No categories worked on yet.");
    }
    for (category, record) in &state.categories {
        render::display_record(category, record);
    }
    Ok(())
}
