//! # SunuPeche CLI (`sunupeche`)
//!
//! Ask fishing questions from the terminal and inspect what the assistant
//! sees: the classified intent, the assembled context, tide tables, and the
//! persisted conversation history.
//!
//! ## Usage
//!
//! ```bash
//! sunupeche --config ./config/sunupeche.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sunupeche init` | Create the history database |
//! | `sunupeche sources` | List loaded reference documents |
//! | `sunupeche classify "<question>"` | Show the intent for a question |
//! | `sunupeche context "<question>"` | Show the context payload for a question |
//! | `sunupeche ask "<question>" --user <id>` | Answer one question |
//! | `sunupeche chat --user <id>` | Interactive conversation |
//! | `sunupeche tides [location]` | Show the tide block for a location |
//! | `sunupeche history --user <id>` | Show stored messages |
//! | `sunupeche sessions --user <id>` | List stored sessions |
//! | `sunupeche stats --user <id>` | Usage summary for a user |
//! | `sunupeche close <session>` | Mark a session inactive |
//!
//! API keys (`OWM_API_KEY`, `OPENAI_API_KEY`) may live in a `.env` file.
//! Logs go to stderr; set `RUST_LOG` to change the level.

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use sunupeche::classify::{Classifier, KeywordTable};
use sunupeche::config::{self, Config};
use sunupeche::context::{format_tide_block, ContextAssembler};
use sunupeche::conversation::Conversation;
use sunupeche::loader::load_reference_data;
use sunupeche::store::ChatStore;
use sunupeche::tides::TideTable;
use sunupeche::weather::EnvironmentFetcher;
use sunupeche::{migrate, sources, stats};

/// SunuPeche: a fishing assistant for Senegal grounded in live weather,
/// tide tables, and local reference data.
#[derive(Parser)]
#[command(name = "sunupeche", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sunupeche.toml`. `classify`, `context`, `tides`
    /// and `sources` fall back to built-in defaults when the file is absent.
    #[arg(long, global = true, default_value = "./config/sunupeche.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the conversation history database. Safe to run repeatedly.
    Init,

    /// List the resolved data directory and every loaded document.
    Sources,

    /// Print the intent the classifier derives from a question.
    Classify { question: String },

    /// Print the context payload that would accompany a question.
    Context { question: String },

    /// Answer a single question through the full pipeline.
    Ask {
        question: String,
        #[arg(long)]
        user: String,
    },

    /// Interactive conversation on stdin (`/clear`, `/refresh`, `/quit`).
    Chat {
        #[arg(long)]
        user: String,
    },

    /// Print today's and tomorrow's tides for a location.
    Tides { location: Option<String> },

    /// Print stored messages, oldest first.
    History {
        #[arg(long)]
        user: String,
        /// Restrict to one session.
        #[arg(long)]
        session: Option<i64>,
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// List a user's sessions, most recent first.
    Sessions {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "10")]
        limit: i64,
    },

    /// Usage summary for a user.
    Stats {
        #[arg(long)]
        user: String,
    },

    /// Mark a session inactive.
    Close { session: i64 },
}

/// Loads the config file when present, otherwise built-in defaults.
fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        Ok(Config::minimal())
    }
}

/// Opens the history store; on failure the conversation runs without one.
async fn open_store(cfg: &Config) -> Option<ChatStore> {
    match ChatStore::open(cfg).await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!("conversation history disabled: {:#}", e);
            None
        }
    }
}

async fn start_conversation(cfg: &Config, user: &str) -> Result<Conversation> {
    let store = open_store(cfg).await;
    let mut conversation = Conversation::from_config(cfg, user, store)?;
    conversation.attach(&cfg.history).await;
    Ok(conversation)
}

async fn run_chat(cfg: &Config, user: &str) -> Result<()> {
    let mut conversation = start_conversation(cfg, user).await?;
    println!("Bienvenue dans le chatbot de SunuPecheNet !");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                conversation.clear();
                println!("Historique effacé.");
            }
            "/refresh" => {
                let count = conversation.refresh();
                println!("{} documents rechargés.", count);
            }
            _ => {
                let turn = conversation.ask(question).await;
                println!("{}\n", turn.reply);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sunupeche=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Commands that can run without a config file
    match &cli.command {
        Commands::Classify { question } => {
            let cfg = load_or_minimal(&cli.config)?;
            let classifier = Classifier::new(KeywordTable::from_config(&cfg.classifier));
            let intent = classifier.classify(question);
            println!("{}", serde_json::to_string_pretty(&intent)?);
            return Ok(());
        }
        Commands::Context { question } => {
            let cfg = load_or_minimal(&cli.config)?;
            let classifier = Classifier::new(KeywordTable::from_config(&cfg.classifier));
            let intent = classifier.classify(question);
            let library = load_reference_data(&cfg.data);
            let env = EnvironmentFetcher::from_config(&cfg)?;
            let assembler =
                ContextAssembler::from_config(&cfg.context, cfg.weather.forecast_points);
            let payload = assembler
                .assemble(&intent, &library, &env, Local::now().fixed_offset())
                .await;
            print!("{}", payload);
            return Ok(());
        }
        Commands::Tides { location } => {
            let cfg = load_or_minimal(&cli.config)?;
            let default_location = &cfg.classifier.default_location;
            let table = match &cfg.tides.fixture {
                Some(path) => TideTable::from_path(path, default_location)?,
                None => TideTable::builtin(default_location),
            };
            let resolved = match location {
                Some(loc) => Classifier::new(KeywordTable::from_config(&cfg.classifier))
                    .classify(loc)
                    .location,
                None => default_location.clone(),
            };
            let now = Local::now().fixed_offset();
            let lookup = table.lookup(&resolved, now.time());
            print!("{}", format_tide_block(&lookup.schedule, now));
            return Ok(());
        }
        Commands::Sources => {
            let cfg = load_or_minimal(&cli.config)?;
            sources::list_sources(&cfg.data)?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ask { question, user } => {
            let mut conversation = start_conversation(&cfg, &user).await?;
            let turn = conversation.ask(&question).await;
            println!("{}", turn.reply);
        }
        Commands::Chat { user } => {
            run_chat(&cfg, &user).await?;
        }
        Commands::History {
            user,
            session,
            limit,
        } => {
            let store = ChatStore::open(&cfg).await?;
            stats::run_history(&store, &user, limit, session).await?;
        }
        Commands::Sessions { user, limit } => {
            let store = ChatStore::open(&cfg).await?;
            stats::run_sessions(&store, &user, limit).await?;
        }
        Commands::Stats { user } => {
            let store = ChatStore::open(&cfg).await?;
            stats::run_stats(&store, &user).await?;
        }
        Commands::Close { session } => {
            let store = ChatStore::open(&cfg).await?;
            if !store.close_session(session).await? {
                bail!("No session with id {}", session);
            }
            println!("Closed session {}", session);
        }
        Commands::Classify { .. }
        | Commands::Context { .. }
        | Commands::Tides { .. }
        | Commands::Sources => unreachable!(),
    }

    Ok(())
}
