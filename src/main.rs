//! # MediCoz CLI (`medicoz`)
//!
//! Database setup, document ingestion, token issuing, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! medicoz --config ./config/medicoz.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medicoz init` | Create the SQLite database and run schema migrations |
//! | `medicoz serve` | Start the HTTP server |
//! | `medicoz ingest <file.pdf>` | Chunk, embed and upsert a PDF into the vector index |
//! | `medicoz token --user <id>` | Print a signed bearer token |
//!
//! Secrets (`JWT_SECRET`, `PINECONE_API_KEY`, `HUGGINGFACE_API_KEY`,
//! `ADMIN_EMAIL`, `ADMIN_PASSWORD`) come from the environment. Log
//! verbosity follows `RUST_LOG` (default `medicoz=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medicoz::{auth, config, ingest, migrate, server};

/// MediCoz: retrieval-grounded medical chat service.
#[derive(Parser)]
#[command(name = "medicoz", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// See `config/medicoz.example.toml` for every setting.
    #[arg(long, global = true, default_value = "./config/medicoz.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and the chat session tables. Safe to run
    /// more than once.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a PDF into the vector index.
    Ingest {
        /// Path to the PDF file.
        path: PathBuf,
    },

    /// Issue a bearer token signed with `JWT_SECRET`.
    Token {
        /// User id carried in the token.
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Issue an admin token (for the upload endpoint).
        #[arg(long)]
        admin: bool,
    },
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("medicoz=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { path } => {
            ingest::run_ingest(&cfg, &path).await?;
        }
        Commands::Token { user, email, admin } => {
            if user.is_none() && !admin {
                anyhow::bail!("--user is required for non-admin tokens");
            }
            let ttl = if admin {
                cfg.auth.admin_token_ttl_secs
            } else {
                cfg.auth.user_token_ttl_secs
            };
            let token = auth::sign(
                cfg.secrets.jwt_secret()?,
                user.as_deref(),
                email.as_deref(),
                admin,
                ttl,
            )?;
            println!("{}", token);
        }
    }

    Ok(())
}
