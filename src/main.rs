use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use feedbell::commands::{added_message, CommandKind, SubscriptionService};
use feedbell::config::{Config, DEFAULT_CONFIG_PATH, TOKEN_ENV_VAR};
use feedbell::feed::build_client;
use feedbell::notify::{DiscordSink, LogSink, NotificationSink};
use feedbell::storage::{Database, DatabaseError};
use feedbell::sync::{Orchestrator, Scheduler, SyncError};

#[derive(Parser, Debug)]
#[command(
    name = "feedbell",
    version,
    about = "Announce new RSS/Atom feed entries in Discord channels"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run synchronization cycles on the configured interval until interrupted
    Run {
        /// Log announcements instead of posting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a single synchronization cycle and print the report
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
    /// Subscribe a channel to a feed
    Add {
        url: String,
        #[arg(long)]
        channel: u64,
        #[arg(long)]
        guild: u64,
    },
    /// Unsubscribe a channel from a feed
    Remove {
        url: String,
        #[arg(long)]
        channel: u64,
    },
    /// List a channel's subscriptions
    List {
        #[arg(long)]
        channel: u64,
        /// Page number, starting at 0
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
    /// Remove every subscription of a guild
    PurgeGuild { guild: u64 },
    /// Remove every subscription posting into a channel
    PurgeChannel { channel: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    feedbell::logging::init(&config.log_level);
    tracing::debug!(?config, "Configuration");

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The subscription database is locked. Is another feedbell instance running?"
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };
    let client = build_client().context("Failed to build HTTP client")?;

    match args.command {
        Command::Run { dry_run } => {
            let orchestrator = orchestrator(&config, db, client, dry_run)?;
            let scheduler = Scheduler::new(orchestrator, config.sync_interval());
            if let Err(e) = scheduler.run(shutdown_signal()).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Command::Sync { dry_run } => {
            let orchestrator = orchestrator(&config, db, client, dry_run)?;
            match orchestrator.run_cycle().await {
                Ok(report) => println!(
                    "{}/{} feeds synchronized, {} failed, {} messages sent, {} checkpoints advanced",
                    report.succeeded, report.total, report.failed, report.notified, report.advanced
                ),
                Err(e @ SyncError::Multiplexer(_)) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Add {
            url,
            channel,
            guild,
        } => {
            let service = SubscriptionService::new(db, client, &config);
            match service.add(&url, channel, guild).await {
                Ok(sub) => println!("{}", added_message(&sub.url)),
                Err(e) => {
                    eprintln!("{}", e.user_message(CommandKind::Add));
                    std::process::exit(1);
                }
            }
        }
        Command::Remove { url, channel } => {
            let service = SubscriptionService::new(db, client, &config);
            if let Err(e) = service.remove(&url, channel).await {
                eprintln!("{}", e.user_message(CommandKind::Remove));
                std::process::exit(1);
            }
            println!("Removed {}", url.trim());
        }
        Command::List {
            channel,
            page,
            per_page,
        } => {
            let service = SubscriptionService::new(db, client, &config);
            match service.list(channel, page, per_page).await {
                Ok(listing) => {
                    println!("{} feed(s) in channel {}", listing.total, channel);
                    for sub in listing.items {
                        println!("  {}  <{}>", sub.title, sub.url);
                    }
                }
                Err(e) => {
                    eprintln!("{}", e.user_message(CommandKind::List));
                    std::process::exit(1);
                }
            }
        }
        Command::PurgeGuild { guild } => {
            let service = SubscriptionService::new(db, client, &config);
            println!("Removed {} subscription(s)", service.purge_group(guild).await);
        }
        Command::PurgeChannel { channel } => {
            let service = SubscriptionService::new(db, client, &config);
            println!(
                "Removed {} subscription(s)",
                service.purge_channel(channel).await
            );
        }
    }

    Ok(())
}

fn orchestrator(
    config: &Config,
    db: Database,
    client: reqwest::Client,
    dry_run: bool,
) -> Result<Orchestrator> {
    let sink: Arc<dyn NotificationSink> = if dry_run {
        Arc::new(LogSink)
    } else {
        let token = config.discord_token().with_context(|| {
            format!(
                "No Discord token configured: set {} or discord_token, or pass --dry-run",
                TOKEN_ENV_VAR
            )
        })?;
        Arc::new(DiscordSink::new(
            client.clone(),
            token,
            config.discord_api_base.clone(),
        ))
    };
    tracing::info!(sink = sink.name(), "Notification sink ready");

    Ok(Orchestrator::new(db, client, sink, config.sync_settings()))
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received SIGINT, shutting down gracefully");
                    }
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, shutting down gracefully");
                    }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received SIGINT, shutting down gracefully");
}
