//! wardend - The warden background service
//!
//! This is the main entry point for the wardend service.
//! It wires together all the components:
//! - Configuration loading
//! - Store and audit log initialization
//! - Webhook dispatcher
//! - Schedule engine and policy coordinator
//! - Signal handling

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_config::{ServiceConfig, load_config};
use warden_core::{
    PolicyCoordinator, ProfileSet, ScheduleEngine, ScheduleStatus, SubjectRegistration,
    SubjectStatus, Subscription,
};
use warden_notify::NotificationDispatcher;
use warden_store::{AuditLog, KeyValueStore, SqliteStore};
use warden_util::{
    Clock, DATABASE_FILENAME, SystemClock, default_config_path, default_data_dir,
    is_mock_time_active,
};

/// How often expired audit entries are pruned while running
const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// wardend - Schedule- and profile-driven privacy policy for cameras and sensors
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(about = "Schedule- and profile-driven privacy policy service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/warden/config.toml)
    #[arg(short, long, env = "WARDEN_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set WARDEN_DATA_DIR env var)
    #[arg(short, long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run the service (default)
    Run,
    /// Print the audit log
    ExportAudit {
        /// JSON instead of one line per entry
        #[arg(long)]
        json: bool,
    },
    /// Send one test payload to the configured webhook
    TestWebhook,
    /// Validate the configuration and exit
    CheckConfig,
    /// Print the effective policy of every subject and why it is in force
    Status,
}

/// Main service state
struct Service {
    config: ServiceConfig,
    audit: Arc<AuditLog>,
    engine: Arc<ScheduleEngine>,
    dispatcher: Arc<NotificationDispatcher>,
    coordinator: Arc<PolicyCoordinator>,
    subscription: Subscription,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            subjects = config.subjects.len(),
            profiles = config.profiles.len(),
            webhook = config.webhook.is_some(),
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());
        let store = open_store(&data_dir)?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        if is_mock_time_active() {
            warn!(now = %clock.now(), "Mock time is active");
        }

        let audit = Arc::new(AuditLog::new(store.clone(), clock.clone()));

        let dispatcher = Arc::new(NotificationDispatcher::new(clock.clone()));
        dispatcher
            .set_config(config.webhook.clone())
            .context("Failed to configure webhook delivery")?;

        let engine = Arc::new(ScheduleEngine::new(clock, config.service.check_interval));
        let profiles =
            ProfileSet::new(config.profiles.clone()).context("Invalid profile configuration")?;

        let coordinator = Arc::new(PolicyCoordinator::new(
            profiles,
            engine.clone(),
            audit.clone(),
            store,
            dispatcher.clone(),
        ));

        for subject in &config.subjects {
            let settings = coordinator
                .register_subject(SubjectRegistration::from(subject), None)
                .with_context(|| format!("Failed to register subject {}", subject.id))?;
            info!(
                subject_id = %subject.id,
                blocked = ?settings.blocked_fields(),
                "Subject policy in force"
            );
        }

        let subscription = coordinator.subscribe_to_schedules();

        Ok(Self {
            config,
            audit,
            engine,
            dispatcher,
            coordinator,
            subscription,
        })
    }

    /// Bring the persisted audit log in line with the configured retention
    fn enforce_retention(&self) {
        let days = self.config.service.retention_days;
        if self.audit.retention_days() != days {
            self.audit.set_retention_days(days);
        } else {
            self.audit.apply_retention();
        }
    }

    async fn run(self) -> Result<()> {
        self.enforce_retention();
        self.engine.start();

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;
        let mut sigusr1 =
            signal(SignalKind::user_defined1()).context("Failed to create SIGUSR1 handler")?;

        let mut retention_timer = tokio::time::interval_at(
            tokio::time::Instant::now() + RETENTION_INTERVAL,
            RETENTION_INTERVAL,
        );

        info!(
            check_interval_secs = self.engine.interval().as_secs(),
            active_profile = self.coordinator.active_profile().map(|p| p.name),
            global_override = self.coordinator.global_override(),
            "Service running"
        );

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // SIGUSR1 - re-evaluate schedules now, e.g. after a clock change
                _ = sigusr1.recv() => {
                    let fired = self.engine.force_check();
                    info!(fired, "Forced schedule check");
                }

                _ = retention_timer.tick() => {
                    self.audit.apply_retention();
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        info!("Shutting down wardend");

        self.engine.stop();
        self.subscription.unsubscribe();
        self.dispatcher.flush().await;

        info!("Shutdown complete");
    }

    fn status(&self) -> ServiceStatus {
        let subjects = self
            .coordinator
            .subject_ids()
            .iter()
            .filter_map(|id| match self.coordinator.subject_status(id) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(subject_id = %id, error = %e, "Subject disappeared during status");
                    None
                }
            })
            .collect();

        ServiceStatus {
            global_override: self.coordinator.global_override(),
            active_profile: self.coordinator.active_profile().map(|p| p.name),
            webhook_url: self.config.webhook.as_ref().map(|w| w.url.clone()),
            schedules: self.engine.get_status(),
            subjects,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceStatus {
    global_override: bool,
    active_profile: Option<String>,
    webhook_url: Option<String>,
    schedules: ScheduleStatus,
    subjects: Vec<SubjectStatus>,
}

fn open_store(data_dir: &Path) -> Result<Arc<dyn KeyValueStore>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join(DATABASE_FILENAME);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;

    info!(db_path = %db_path.display(), "Store initialized");
    Ok(Arc::new(store))
}

/// Data directory for commands that can run without a valid config
fn resolve_data_dir(args: &Args) -> PathBuf {
    if let Some(dir) = &args.data_dir {
        return dir.clone();
    }
    match load_config(&args.config) {
        Ok(config) => config.service.data_dir,
        Err(e) => {
            warn!(error = %e, "Config unavailable; using default data directory");
            default_data_dir()
        }
    }
}

fn export_audit(args: &Args, json: bool) -> Result<()> {
    let store = open_store(&resolve_data_dir(args))?;
    let audit = AuditLog::new(store, Arc::new(SystemClock));

    if json {
        println!("{}", audit.export_logs_json().context("Failed to encode audit log")?);
    } else {
        print!("{}", audit.export_logs());
    }
    Ok(())
}

async fn test_webhook(args: &Args) -> Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    let Some(webhook) = config.webhook else {
        bail!("No [webhook] section in {:?}", args.config);
    };

    let dispatcher = NotificationDispatcher::new(Arc::new(SystemClock));
    dispatcher
        .set_config(Some(webhook))
        .context("Failed to configure webhook delivery")?;

    let result = dispatcher.test().await;
    if result.success {
        println!("{}", result.message);
        Ok(())
    } else {
        bail!("Webhook test failed: {}", result.message)
    }
}

fn check_config(args: &Args) -> Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    ProfileSet::new(config.profiles.clone()).context("Invalid profile configuration")?;

    println!(
        "Configuration OK: {} subjects, {} profiles, webhook {}",
        config.subjects.len(),
        config.profiles.len(),
        if config.webhook.is_some() { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");
            let service = Service::new(&args)?;
            service.run().await.inspect_err(|e| error!(error = %e, "Service failed"))
        }
        Commands::ExportAudit { json } => export_audit(&args, json),
        Commands::TestWebhook => test_webhook(&args).await,
        Commands::CheckConfig => check_config(&args),
        // Read-only: retention is only enforced by `run`
        Commands::Status => {
            let service = Service::new(&args)?;
            let status = service.status();
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("Failed to encode status")?
            );
            service.shutdown().await;
            Ok(())
        }
    }
}
