//! taskboard - task tracking server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskboard::{api, config::Config, db};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Multi-user task tracking server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Log a user out of every session
    Revoke {
        /// Email of the user
        #[arg(short, long)]
        email: String,

        /// Config file path (locates the database)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taskboard=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, bind } => {
            let mut cfg = load_config(config)?;

            if let Some(p) = port {
                cfg.server.port = p;
            }
            if let Some(b) = bind {
                cfg.server.bind = b;
            }

            run_server(cfg).await
        }

        Commands::Revoke { email, config } => {
            let cfg = load_config(config)?;
            let db = db::Database::open(&cfg.database.path).context("Failed to open database")?;

            let revoked = db
                .revoke_sessions_for(&email.trim().to_lowercase())
                .context("Failed to revoke sessions")?;

            if revoked == 0 {
                println!("No active sessions for '{email}'.");
            } else {
                println!("Revoked {revoked} session(s) for '{email}'.");
            }
            Ok(())
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            if path.exists() {
                println!("Config file already exists: {}", path.display());
                return Ok(());
            }

            Config::default().save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Start the server with: taskboard serve --config {}", path.display());

            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

async fn run_server(config: Config) -> Result<()> {
    let db = db::Database::open(&config.database.path).context("Failed to open database")?;

    let purged = db
        .purge_expired_sessions()
        .context("Failed to purge expired sessions")?;
    tracing::info!(
        path = %config.database.path.display(),
        purged_sessions = purged,
        "Database ready"
    );

    if !config.auth.enforce_ownership {
        tracing::warn!("Ownership checks disabled: any logged-in user can act on any task");
    }

    let state = api::AppState::new(db, config.clone());
    let app = api::create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("🚀 taskboard server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
