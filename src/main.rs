use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use substack_backup::archive::{ArchiveSink, ArchiveWriter, FsSink, NotificationGate};
use substack_backup::commands::{self, Request};
use substack_backup::config::{self, Config};
use substack_backup::merge::index_stats;
use substack_backup::model::{ContentType, LastResult};
use substack_backup::orchestrator::BackupOrchestrator;
use substack_backup::scheduler::spawn_schedule;
use substack_backup::status::ResultStore;
use substack_backup::store::{Settings, SettingsStore};
use substack_backup::substack::SubstackClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run scheduled backups and read commands (`backup drafts`, `force published`, `status`) from stdin
    Run,
    /// Run a single backup cycle and exit
    Backup {
        /// drafts or published
        #[arg(long = "type")]
        content_type: ContentType,
        /// Re-fetch every listed item regardless of the cache
        #[arg(long)]
        force: bool,
    },
    /// Show or change the stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Summarize the cached indices
    Stats,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    Set {
        /// Publication host name, e.g. example.substack.com
        #[arg(long)]
        substack_url: Option<String>,
        /// Directory for draft backups
        #[arg(long)]
        download_dir: Option<String>,
        /// Directory for published post backups
        #[arg(long)]
        published_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let store = SettingsStore::connect(&cfg.database_url())
        .await
        .context("failed to open settings database")?;

    match args.command {
        Cmd::Run => run_daemon(&cfg, store).await,
        Cmd::Backup {
            content_type,
            force,
        } => run_once(&cfg, store, content_type, force).await,
        Cmd::Settings { action } => settings(&store, action).await,
        Cmd::Stats => stats(&store).await,
    }
}

fn build_orchestrator(cfg: &Config, store: SettingsStore) -> Result<Arc<BackupOrchestrator>> {
    let client = SubstackClient::new(&cfg.http.user_agent)?;
    let sink: Arc<dyn ArchiveSink> = Arc::new(FsSink::new(cfg.app.archive_root()));
    let gate = Arc::new(NotificationGate::new(sink.clone()));
    let writer = ArchiveWriter::new(
        sink,
        gate,
        cfg.writer.settle_before(),
        cfg.writer.settle_after(),
    );
    Ok(Arc::new(BackupOrchestrator::new(
        Arc::new(client),
        store,
        writer,
        Arc::new(ResultStore::new()),
        cfg.backup.page_size,
    )))
}

async fn run_daemon(cfg: &Config, store: SettingsStore) -> Result<()> {
    let missing = store.load_settings().await?.missing_fields();
    if !missing.is_empty() {
        warn!(?missing, "settings incomplete; affected backups will fail until set");
    }

    let orchestrator = build_orchestrator(cfg, store)?;
    for content_type in ContentType::ALL {
        spawn_schedule(
            orchestrator.clone(),
            content_type,
            cfg.schedule.period(content_type),
        );
    }

    let (tx, rx) = mpsc::channel::<Request>(16);
    tokio::spawn(commands::serve(orchestrator.clone(), rx));

    info!("backup daemon started");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => {
                        if let Err(err) = dispatch_line(&tx, &line).await {
                            error!(?err, "command failed");
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed; running on schedule only");
                        stdin_open = false;
                    }
                    Err(err) => {
                        warn!(?err, "failed to read stdin; running on schedule only");
                        stdin_open = false;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn dispatch_line(tx: &mpsc::Sender<Request>, line: &str) -> Result<()> {
    let command = match commands::parse_line(line) {
        Ok(command) => command,
        Err(msg) => {
            println!("error: {}", msg);
            return Ok(());
        }
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send((command, reply_tx))
        .await
        .map_err(|_| anyhow!("command loop stopped"))?;
    let response = reply_rx.await.context("command loop dropped the reply")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_once(
    cfg: &Config,
    store: SettingsStore,
    content_type: ContentType,
    force: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(cfg, store)?;
    let result = orchestrator
        .run_now(content_type, force)
        .await
        .ok_or_else(|| anyhow!("a {} backup is already running", content_type))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    match result.last_result {
        Some(LastResult::Success) => Ok(()),
        _ => Err(anyhow!(
            "backup failed: {}",
            result.error.unwrap_or_else(|| "unknown error".into())
        )),
    }
}

async fn settings(store: &SettingsStore, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {}
        SettingsAction::Set {
            substack_url,
            download_dir,
            published_dir,
        } => {
            store
                .update_settings(&Settings {
                    substack_url,
                    download_dir,
                    published_dir,
                })
                .await?;
            info!("settings saved");
        }
    }
    let current = store.load_settings().await?;
    println!("{}", serde_json::to_string_pretty(&current)?);
    let missing = current.missing_fields();
    if !missing.is_empty() {
        println!("not fully configured, missing: {}", missing.join(", "));
    }
    Ok(())
}

async fn stats(store: &SettingsStore) -> Result<()> {
    for content_type in ContentType::ALL {
        let stats = index_stats(&store.load_index(content_type).await?);
        match stats.most_recent {
            _ if stats.count == 0 => println!("No {} cached yet", content_type.noun()),
            Some(latest) => println!(
                "{} {} cached (last updated: {})",
                stats.count,
                content_type.noun(),
                latest.to_rfc3339()
            ),
            None => println!("{} {} cached", stats.count, content_type.noun()),
        }
    }
    Ok(())
}
