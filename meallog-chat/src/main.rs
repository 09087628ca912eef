//! Terminal chat client for the meallog conversation engine.
//!
//! Reads one user message per line from stdin and prints the reply. The
//! conversation is kept in memory for the lifetime of the process.

use clap::Parser;
use meallog::config::{MealLogConfig, OracleProvider, StorageBackend};
use meallog::oracle::OracleFactory;
use meallog::{
    ChatService, ConversationTurn, EntryRepository, InMemoryEntryRepository, OwnerId,
    SqliteEntryRepository,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "meallog-chat", about = "Log and correct meals by chatting")]
struct Args {
    /// Path to configuration file (TOML format)
    #[arg(long, env = "MEALLOG_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Whose log to read and edit
    #[arg(long, env = "MEALLOG_OWNER", default_value = "local")]
    owner: String,

    /// Oracle provider: openai, anthropic or stub
    #[arg(long)]
    provider: Option<String>,

    /// Model name passed to the provider
    #[arg(long)]
    model: Option<String>,

    /// SQLite database file
    #[arg(long)]
    db_path: Option<PathBuf>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<MealLogConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Using configuration: {}", path.display());
                MealLogConfig::load(path)?
            }
            None => MealLogConfig::from_env()?,
        };

        if let Some(provider) = &self.provider {
            config.oracle.provider = provider.parse::<OracleProvider>()?;
        }
        if let Some(model) = &self.model {
            config.oracle.model = model.clone();
        }
        if let Some(path) = &self.db_path {
            config.storage.backend = StorageBackend::Sqlite;
            config.storage.path = path.clone();
        }
        Ok(config)
    }
}

fn open_repository(config: &MealLogConfig) -> anyhow::Result<Arc<dyn EntryRepository>> {
    Ok(match config.storage.backend {
        StorageBackend::Memory => {
            info!("Storing entries in memory; they are lost on exit");
            Arc::new(InMemoryEntryRepository::new())
        }
        StorageBackend::Sqlite => {
            let repository = SqliteEntryRepository::open(config.storage.path.clone())?;
            info!("Storing entries in {}", repository.path().display());
            Arc::new(repository)
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meallog=info".parse()?)
                .add_directive("meallog_chat=info".parse()?),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    let owner = OwnerId::new(args.owner.clone());

    let repository = open_repository(&config)?;
    let oracle = OracleFactory::create(&config.oracle)?;
    let oracle_info = oracle.info();
    info!(
        "Oracle: {} ({}), owner: {}",
        oracle_info.name, oracle_info.model, owner
    );
    let service = ChatService::from_config(&config, oracle, repository)?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation: Vec<ConversationTurn> = Vec::new();

    stdout
        .write_all(b"Tell me what you ate, or correct an earlier entry. /reset starts over, /quit exits.\n")
        .await?;
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                conversation.clear();
                if let Err(e) = service.reset(&owner).await {
                    error!("Reset failed: {}", e);
                }
                stdout.write_all(b"Conversation cleared.\n").await?;
                continue;
            }
            _ => {}
        }

        conversation.push(ConversationTurn::user(line));
        match service.handle(&owner, conversation.clone()).await {
            Ok(reply) => {
                stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
                conversation.push(ConversationTurn::assistant(reply));
            }
            Err(e) if e.is_infrastructure() => {
                error!("Turn failed: {}", e);
                stdout
                    .write_all(b"Sorry, I can't reach the service right now. Nothing was changed.\n")
                    .await?;
            }
            Err(e) => {
                error!("Turn failed: {}", e);
                stdout.write_all(format!("Error: {}\n", e).as_bytes()).await?;
            }
        }
    }

    Ok(())
}
