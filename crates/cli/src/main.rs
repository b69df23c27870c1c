mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use events::{Event, EventEnvelope};
use orchestrator::EngineContext;
use server::{create_router, state::AppState};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Settings;

#[derive(Parser)]
#[command(name = "hyperflow")]
#[command(about = "Multi-agent workflow orchestration engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML settings file (defaults to ./hyperflow.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the worker pool
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the worker pool only
    Worker,
    /// Reset stuck workflows to queued and enqueue a fresh job for each
    Requeue {
        #[arg(long)]
        include_failed: bool,
    },
    /// Create the databases and run migrations
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    init_tracing(&settings.log_level);

    match cli.command {
        Some(Commands::Serve { port }) => serve(settings.with_port(port.or(cli.port))).await,
        Some(Commands::Worker) => worker(settings).await,
        Some(Commands::Requeue { include_failed }) => requeue(settings, include_failed).await,
        Some(Commands::Init) => init(settings).await,
        None => serve(settings.with_port(cli.port)).await,
    }
}

async fn connect(settings: &Settings) -> Result<EngineContext> {
    let ctx = EngineContext::connect(&settings.engine_config())
        .await
        .context("Failed to initialize engine")?;

    tracing::info!(
        database = %settings.database.url,
        generator = ctx.generator_name(),
        "Engine ready"
    );
    Ok(ctx)
}

async fn serve(settings: Settings) -> Result<()> {
    let ctx = connect(&settings).await?;
    tokio::spawn(log_events(ctx.events().subscribe()));

    let workers = ctx.worker_pool(settings.worker_config()).start();

    let app = create_router(AppState::new(&ctx));
    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tracing::info!(address = %address, "API listening");
    tracing::info!("Swagger UI at http://{}/swagger-ui", address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    workers.shutdown().await;
    ctx.shutdown().await;

    served.context("HTTP server error")
}

async fn worker(settings: Settings) -> Result<()> {
    let ctx = connect(&settings).await?;
    tokio::spawn(log_events(ctx.events().subscribe()));

    let workers = ctx.worker_pool(settings.worker_config()).start();
    tracing::info!(concurrency = settings.worker.concurrency, "Worker running");

    shutdown_signal().await;

    workers.shutdown().await;
    ctx.shutdown().await;
    Ok(())
}

async fn requeue(settings: Settings, include_failed: bool) -> Result<()> {
    let ctx = connect(&settings).await?;

    let requeued = ctx
        .service()
        .requeue_stuck(include_failed)
        .await
        .context("Failed to requeue workflows")?;

    if requeued.is_empty() {
        println!("No stuck workflows.");
    } else {
        println!("Requeued {} workflow(s):", requeued.len());
        for workflow in &requeued {
            println!(
                "  #{} (was {}) -> job {}",
                workflow.workflow_id, workflow.previous_status, workflow.job_id
            );
        }
    }

    ctx.shutdown().await;
    Ok(())
}

async fn init(settings: Settings) -> Result<()> {
    let ctx = connect(&settings).await?;
    ctx.shutdown().await;

    println!("Initialized database {}", settings.database.url);
    if let Some(queue_url) = &settings.database.queue_url {
        println!("Initialized queue database {}", queue_url);
    }
    Ok(())
}

async fn log_events(mut receiver: broadcast::Receiver<EventEnvelope>) {
    loop {
        match receiver.recv().await {
            Ok(envelope) => log_event(&envelope.event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::JobCompleted {
            job_id,
            attempts_made,
        } => tracing::info!(job_id = %job_id, attempts = attempts_made, "Job completed"),
        Event::JobFailed {
            job_id,
            attempts_made,
            error,
            will_retry,
        } => tracing::warn!(
            job_id = %job_id,
            attempts = attempts_made,
            will_retry,
            error = %error,
            "Job failed"
        ),
        Event::JobStalled { job_id } => tracing::warn!(job_id = %job_id, "Job stalled"),
        Event::WorkflowStatusChanged {
            workflow_id,
            from_status,
            to_status,
        } => tracing::info!(
            workflow_id = %workflow_id,
            from = %from_status,
            to = %to_status,
            "Workflow status changed"
        ),
        other => tracing::debug!(event = other.name(), "Event"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining workers");
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .init();
}
