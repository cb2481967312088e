use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use world_sync::config::{StoreBackend, SyncConfig};
use world_sync::error::{Result, SyncError};
use world_sync::protocol::{commands, RconSession};
use world_sync::service::scheduler::describe_backup;
use world_sync::service::watch::log_event;
use world_sync::service::{BackupScheduler, HostIdentity, HostLifecycle, PlayerWatcher};
use world_sync::store::{LocalStore, ObjectStore, S3Store};
use world_sync::sync::{ExclusiveLock, SnapshotManager, TarGzArchiver};
use world_sync::utils::tail::LogTail;
use world_sync::utils::{logging, Clock, SystemClock};

/// Share one game world between hosts through an S3-compatible bucket
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Acquire the lock and download the latest world
    Init,
    /// Upload the world and release the lock
    Shutdown,
    /// Download the latest world without touching the lock
    Download,
    /// Upload the world without touching the lock
    Upload,
    /// Acquire the lock
    Lock,
    /// Release the lock
    Unlock,
    /// Show who holds the lock; exits non-zero when held
    CheckLock,
    /// Timestamped backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Show the current host in a bossbar
    Bossbar {
        /// Name to display; defaults to HOST_DISPLAY_NAME
        #[arg(long)]
        name: Option<String>,
    },
    /// Log player joins and leaves from the server log
    Watch,
    /// Run one console command over RCON
    Exec {
        #[arg(required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    /// Back up every interval until stopped
    Run,
    /// Back up once, right now
    Now,
    /// List stored backups, newest first
    List,
}

impl Command {
    fn needs_store(&self) -> bool {
        !matches!(
            self,
            Command::Bossbar { .. } | Command::Watch | Command::Exec { .. }
        )
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::from_file(path),
        None => {
            // A missing .env is fine; real environment variables still apply
            let _ = dotenvy::dotenv();
            SyncConfig::from_env()
        }
    }
}

fn validate(config: &SyncConfig, command: &Command) -> Result<()> {
    if command.needs_store() {
        return config.validate_strict();
    }
    let errors = config.rcon.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SyncError::ConfigError(errors.join("; ")))
    }
}

/// Cancel `token` on ctrl-c or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    token.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C");
        }
        token.cancel();
    });
}

struct Components {
    lock: ExclusiveLock,
    snapshots: Arc<SnapshotManager>,
    clock: Arc<dyn Clock>,
}

fn components(config: &SyncConfig) -> Result<Components> {
    let store: Arc<dyn ObjectStore> = match config.store.backend {
        StoreBackend::S3 => Arc::new(S3Store::new(&config.store)?),
        StoreBackend::Local => Arc::new(LocalStore::new(&config.store.local_root)),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Ok(Components {
        lock: ExclusiveLock::new(store.clone(), config.store.conditional_lock),
        snapshots: Arc::new(SnapshotManager::new(
            store,
            Arc::new(TarGzArchiver),
            clock.clone(),
        )),
        clock,
    })
}

fn host_lifecycle(config: &SyncConfig) -> Result<HostLifecycle> {
    let parts = components(config)?;
    Ok(HostLifecycle::new(
        parts.lock,
        parts.snapshots,
        parts.clock,
        HostIdentity::current(),
        config.data.local_dir.clone(),
    ))
}

async fn run(cli: Cli, config: SyncConfig, cancel: CancellationToken) -> Result<ExitCode> {
    let local_dir = config.data.local_dir.clone();

    match cli.command {
        Command::Init => {
            let record = host_lifecycle(&config)?.init().await?;
            println!("Locked by {} at {}", record.hostname, record.timestamp);
        }
        Command::Shutdown => host_lifecycle(&config)?.shutdown().await?,
        Command::Download => components(&config)?.snapshots.download(&local_dir).await?,
        Command::Upload => components(&config)?.snapshots.upload(&local_dir).await?,
        Command::Lock => {
            let parts = components(&config)?;
            let me = HostIdentity::current();
            let record = parts
                .lock
                .acquire(&me.hostname, me.pid, parts.clock.as_ref())
                .await?;
            println!("Locked by {} at {}", record.hostname, record.timestamp);
        }
        Command::Unlock => components(&config)?.lock.release().await,
        Command::CheckLock => match components(&config)?.lock.check().await? {
            Some(record) => {
                println!(
                    "Locked by {} (pid {}) since {}",
                    record.hostname, record.pid, record.timestamp
                );
                return Ok(ExitCode::FAILURE);
            }
            None => println!("Not locked"),
        },
        Command::Backup { action } => {
            let parts = components(&config)?;
            let scheduler = BackupScheduler::new(
                parts.snapshots,
                parts.clock,
                config.backup.clone(),
                config.rcon.clone(),
                local_dir,
            );
            match action {
                BackupAction::Run => scheduler.run(&cancel).await?,
                BackupAction::Now => {
                    let key = scheduler.now().await?;
                    println!("{key}");
                }
                BackupAction::List => {
                    let backups = scheduler.list().await?;
                    if backups.is_empty() {
                        println!("No backups");
                    }
                    for (index, meta) in backups.iter().enumerate() {
                        println!("{}", describe_backup(index, meta));
                    }
                }
            }
        }
        Command::Bossbar { name } => {
            let mut session = world_sync::service::wait_for_server(&config.rcon, &cancel).await?;
            let name = name.unwrap_or_else(|| config.backup.host_display_name.clone());
            let outcome = commands::setup_bossbar(&mut session, &name).await;
            session.disconnect().await;
            outcome?;
        }
        Command::Watch => {
            let tail = LogTail::new(&config.watch.log_file, config.watch.poll_interval);
            let mut watcher = PlayerWatcher::new(tail, Some(config.rcon.clone()));
            watcher.run(&cancel, log_event).await?;
        }
        Command::Exec { command } => {
            let mut session = RconSession::open(&config.rcon).await?;
            let outcome = session.command(&command.join(" ")).await;
            session.disconnect().await;
            println!("{}", outcome?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("world-sync: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("world-sync: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = validate(&config, &cli.command) {
        eprintln!("world-sync: {e}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match run(cli, config, cancel).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("world-sync: {}", e.to_string().replace('\n', " "));
            ExitCode::FAILURE
        }
    }
}
