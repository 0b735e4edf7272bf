//! # Trainbell — training-slot lifecycle watcher
//!
//! Usage:
//!   trainbell run                          # Daily checks + change watcher until Ctrl-C
//!   trainbell lookahead [--now RFC3339]    # One reminder check
//!   trainbell adjust [--now RFC3339]       # One capacity check
//!   trainbell process-changes              # Drain the change outbox once
//!   trainbell import slots.json            # Seed / overwrite slots
//!   trainbell init-config                  # Write the default config

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use trainbell_core::{SlotId, SlotType, TrainbellConfig, TrainbellError, TrainingSlot};
use trainbell_scheduler::{
    Dispatcher, JobKind, JobReport, JobSettings, SchedulerEngine, SlotJobs, drain_changes,
    spawn_change_watcher, spawn_scheduler,
};
use trainbell_store::SqliteSlotStore;

#[derive(Parser)]
#[command(name = "trainbell", version, about = "🏸 Trainbell — training-slot lifecycle watcher")]
struct Cli {
    /// Config file (default: ~/.trainbell/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily scheduler and the change watcher
    Run,
    /// Remind about training slots coming up
    Lookahead {
        /// Pretend the current time is this RFC 3339 instant
        #[arg(long)]
        now: Option<String>,
    },
    /// Demote tomorrow's under-filled training slots
    Adjust {
        #[arg(long)]
        now: Option<String>,
    },
    /// Handle pending slot changes once
    ProcessChanges,
    /// Upsert slots from a JSON array
    Import { file: PathBuf },
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// One slot as accepted by `import`; the id is generated when absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedSlot {
    #[serde(default)]
    id: Option<String>,
    date: NaiveDate,
    #[serde(rename = "type")]
    slot_type: SlotType,
    #[serde(default)]
    participant_ids: Vec<String>,
    #[serde(default)]
    slot_key: Option<String>,
}

impl ImportedSlot {
    fn into_slot(self) -> TrainingSlot {
        let id = self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        TrainingSlot {
            id: SlotId::new(id),
            date: self.date,
            slot_type: self.slot_type,
            participant_ids: self.participant_ids,
            slot_key: self.slot_key,
        }
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
        None => TrainbellConfig::default_path(),
    }
}

/// An explicit `--config` must exist; the default path may be absent.
fn load_config(cli: &Cli, path: &Path) -> Result<TrainbellConfig> {
    Ok(match cli.config {
        Some(_) => TrainbellConfig::load_from(path)?,
        None => TrainbellConfig::load()?,
    })
}

/// Log a failed invocation with its error kind and hand it to anyhow.
fn failed(e: TrainbellError) -> anyhow::Error {
    tracing::error!("❌ Invocation failed ({}): {e}", e.kind());
    e.into()
}

fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>> {
    match now {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("--now '{s}' is not an RFC 3339 timestamp"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Store, notifier and checkers wired from config.
fn wire(config: &TrainbellConfig) -> Result<(Arc<SqliteSlotStore>, Arc<SlotJobs>)> {
    let db_path = config.store.resolved_path();
    let store = Arc::new(
        SqliteSlotStore::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );
    let dispatcher = Dispatcher::from_config(&config.notify)?;
    tracing::info!("📡 Notification target: {}", dispatcher.target().name());
    let jobs = SlotJobs::new(
        store.clone(),
        Arc::new(dispatcher),
        JobSettings::from_config(config)?,
        Duration::from_secs(config.schedule.job_timeout_secs),
    );
    Ok((store, Arc::new(jobs)))
}

fn print_report(report: &JobReport) {
    match report {
        JobReport::Lookahead(o) if o.notified => println!("📅 Training on {}: reminder sent", o.target),
        JobReport::Lookahead(o) => println!("No training on {}", o.target),
        JobReport::Capacity(o) => {
            println!("🔎 {} training slots on {}", o.scanned, o.target);
            for id in &o.demoted {
                println!("   ⬇️ {id} → selfTraining");
            }
            if o.notified {
                println!("📣 Shortfall notice sent");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "trainbell=debug,trainbell_core=debug,trainbell_store=debug,trainbell_scheduler=debug"
    } else {
        "trainbell=info,trainbell_core=info,trainbell_store=info,trainbell_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);

    if let Command::InitConfig { force } = &cli.command {
        if path.exists() && !force {
            println!("⚠️  {} already exists (use --force to overwrite)", path.display());
            return Ok(());
        }
        TrainbellConfig::default().save_to(&path)?;
        println!("✅ Config written to {}", path.display());
        return Ok(());
    }

    let config = load_config(&cli, &path)?;
    let (store, jobs) = wire(&config)?;

    match &cli.command {
        Command::Run => {
            let schedule = &config.schedule;
            let engine = SchedulerEngine::new(schedule, config.calendar()?, Utc::now())?;
            for job in engine.jobs() {
                if let Some(at) = job.next_run {
                    tracing::info!("📅 {} next at {at}", job.kind);
                }
            }
            tokio::spawn(spawn_scheduler(engine, jobs.clone(), schedule.tick_secs));
            tokio::spawn(spawn_change_watcher(
                store.clone(),
                jobs,
                schedule.watch_interval_secs,
                schedule.watch_batch,
                schedule.max_change_attempts,
            ));
            tokio::signal::ctrl_c().await?;
            tracing::info!("👋 Shutting down");
        }
        Command::Lookahead { now } => {
            let report = jobs.run(JobKind::Lookahead, parse_now(now.as_deref())?).await.map_err(failed)?;
            print_report(&report);
        }
        Command::Adjust { now } => {
            let report = jobs.run(JobKind::Capacity, parse_now(now.as_deref())?).await.map_err(failed)?;
            print_report(&report);
        }
        Command::ProcessChanges => {
            let schedule = &config.schedule;
            let report = drain_changes(
                store.as_ref(),
                &jobs,
                schedule.watch_batch,
                schedule.max_change_attempts,
            )
            .await
            .map_err(failed)?;
            println!(
                "✅ {} handled, {} promoted, {} dropped{}",
                report.handled,
                report.promoted,
                report.dropped,
                if report.stalled { " (stalled, will retry)" } else { "" }
            );
        }
        Command::Import { file } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let slots: Vec<ImportedSlot> = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", file.display()))?;
            let count = slots.len();
            for slot in slots {
                store.upsert_slot(&slot.into_slot())?;
            }
            println!("✅ Imported {count} slots into {}", config.store.resolved_path().display());
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
