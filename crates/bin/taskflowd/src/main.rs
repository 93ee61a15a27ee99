//! # taskflowd — taskflow daemon
//!
//! Composition root that wires storage, configuration, and the engine.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Load and validate the rule/link/registry definitions
//! - Construct repository implementations (adapters)
//! - Construct the event pipeline, injecting adapters via port traits
//! - Consume newline-delimited JSON mutation events on stdin
//! - Log the audit-event stream
//! - Handle graceful shutdown (SIGINT / stdin EOF)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;
mod definitions;
mod ingest;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use taskflow_adapter_storage_sqlite_sqlx::{SqliteEntityGateway, SqliteTaskRepository};
use taskflow_app::event_bus::InProcessEventBus;
use taskflow_app::pipeline::EventPipeline;
use taskflow_app::services::config_service::StaticConfig;

use crate::definitions::Definitions;
use crate::ingest::WireEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Database
    let db = taskflow_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let pool = db.pool().clone();

    // Repositories
    let tasks = SqliteTaskRepository::new(pool.clone());
    let entities = SqliteEntityGateway::new(pool);

    // Definitions (registry + rules + links), validated at load
    let content = std::fs::read_to_string(&config.definitions.path)
        .with_context(|| format!("reading definitions from {}", config.definitions.path))?;
    let engine_config = Definitions::from_toml(&content)?
        .into_config()
        .context("definitions rejected")?;

    // Audit bus
    let bus = Arc::new(InProcessEventBus::new(256));
    let mut audit_rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = audit_rx.recv().await {
            tracing::info!(kind = %event.event_type, data = %event.data, "audit");
        }
    });

    // Engine
    let pipeline = EventPipeline::new(engine_config, tasks, entities.clone(), Arc::clone(&bus));

    tracing::info!("taskflowd reading mutation events from stdin (one JSON object per line)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    None => break,
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => handle_line(&pipeline, &entities, &line).await,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

type Pipeline =
    EventPipeline<StaticConfig, SqliteTaskRepository, SqliteEntityGateway, Arc<InProcessEventBus>>;

async fn handle_line(pipeline: &Pipeline, entities: &SqliteEntityGateway, line: &str) {
    let wire: WireEvent = match serde_json::from_str(line) {
        Ok(wire) => wire,
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed event line");
            return;
        }
    };
    let event = wire.into_event();

    // Keep the local entity store in step with the incoming snapshot so
    // later write-backs start from current values.
    if let Err(err) = entities.put_snapshot(event.tenant_id, &event.snapshot).await {
        tracing::error!(error = %err, "failed to store entity snapshot");
        return;
    }

    match pipeline.process(event).await {
        Ok(report) => {
            println!(
                "{}",
                serde_json::json!({
                    "events_processed": report.events_processed,
                    "rules_fired": report.rules_fired,
                    "tasks_created": report.tasks_created,
                    "tasks_rescheduled": report.tasks_rescheduled,
                    "tasks_completed": report.tasks_completed,
                    "fields_written": report.fields_written,
                    "cascade_aborted": report.cascade_aborted,
                })
            );
        }
        Err(err) => tracing::error!(error = %err, "event processing failed"),
    }
}
