use std::fs::OpenOptions;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;

use skynet::chat::ChatServer;
use skynet::config::Config;

#[derive(Parser)]
#[command(name = "skynet")]
#[command(about = "A multi-user chat server with offline memos and private chat negotiation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat server
    Start {
        /// TCP port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Seconds an account stays locked after repeated password failures
        #[arg(short, long)]
        lock_duration: Option<u64>,
        /// Seconds of inactivity before a session is logged out
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Write a default configuration file
    Init,
    /// Show server configuration and account statistics
    Status,
}

fn init_logging(verbose: u8, config: &Config) -> Result<()> {
    let log_level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    if let Some(path) = &config.logging.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow!("Failed to open log file {}: {}", path, e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.command {
        Commands::Init => Config::default(),
        _ => Config::load_or_default(&cli.config).await?,
    };
    init_logging(cli.verbose, &config)?;

    info!("Starting Skynet v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Start { port, lock_duration, timeout } => {
            if let Some(port) = port { config.server.port = port; }
            if let Some(secs) = lock_duration { config.server.lock_duration = secs; }
            if let Some(secs) = timeout { config.server.inactivity_timeout = secs; }
            config.validate()?;

            let mut server = ChatServer::new(config).await?;
            let addr = server.bind().await?;
            info!("Chat server starting on {}...", addr);
            server.run().await?;
        }
        Commands::Init => {
            info!("Initializing new configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let server = ChatServer::new(config).await?;
            server.show_status().await?;
        }
    }

    Ok(())
}
