mod channels;
mod config;
mod digest;
mod llm;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;

use channels::{ParseMode, TelegramChannel};
use config::{Config, Credentials};
use digest::DigestPublisher;
use llm::ChatCompletionClient;
use scheduler::Scheduler;

#[derive(Parser)]
#[command(
    name = "daily-digest",
    version,
    about = "Posts a daily news digest to a Telegram channel"
)]
struct Cli {
    /// Optional TOML file with schedule, LLM and Telegram settings
    #[arg(short, long, env = "DIGEST_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily schedule until interrupted (default)
    Run,
    /// Publish one digest now and exit
    Once,
    /// Print upcoming firing times
    Next {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cfg).await?,
        Commands::Once => {
            let creds = credentials(env_var)?;
            build_publisher(&cfg, &creds).publish().await;
        }
        Commands::Next { count } => {
            let sched = Scheduler::new(cfg.schedule.to_job_config()?)?;
            for t in sched.upcoming(count) {
                println!("{}  ({})", t, t.with_timezone(&Utc));
            }
        }
    }
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    let (sched, publisher) = assemble(cfg, env_var)?;
    let publisher = Arc::new(publisher);

    if let Some(next) = sched.next_fire(Utc::now()) {
        tracing::info!(
            "Posts go out daily at {:02}:{:02} {}; first at {}",
            sched.job().hour,
            sched.job().minute,
            sched.job().timezone,
            next.with_timezone(&sched.job().timezone)
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(sched.run(publisher, shutdown_rx));

    shutdown_signal().await;
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Validate everything and build the scheduler and publisher. Missing
/// secrets fail here, before any scheduler exists.
fn assemble(
    cfg: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Scheduler, DigestPublisher)> {
    let creds = credentials(lookup)?;
    let job = cfg.schedule.to_job_config()?;
    let sched = Scheduler::new(job)?;
    Ok((sched, build_publisher(cfg, &creds)))
}

fn credentials(lookup: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
    Credentials::from_lookup(lookup).map_err(|e| {
        tracing::error!("{e}");
        tracing::error!(
            "Set: {}, {}, {}",
            config::BOT_TOKEN_VAR,
            config::CHANNEL_ID_VAR,
            config::API_KEY_VAR
        );
        anyhow::Error::new(e)
    })
}

fn build_publisher(cfg: &Config, creds: &Credentials) -> DigestPublisher {
    let completion = ChatCompletionClient::new(&cfg.llm, &creds.api_key);
    let channel = TelegramChannel::new(&cfg.telegram, &creds.bot_token);
    DigestPublisher::new(
        Arc::new(completion),
        Arc::new(channel),
        creds.channel_id.clone(),
        ParseMode::from_name(&cfg.telegram.parse_mode),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
