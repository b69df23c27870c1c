use std::sync::Arc;

use db::{TaskRepository, WorkflowRepository};
use events::EventBus;
use hyperflow_core::JobOptions;
use llm::{ChatClient, ChatClientConfig, Generator, OfflineGenerator};
use queue::{JobQueue, WorkerConfig, WorkerPool};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::dispatcher::SpecialistDispatcher;
use crate::error::Result;
use crate::integration::IntegrationStage;
use crate::pipeline::{WorkflowJobHandler, WorkflowPipeline};
use crate::planner::PlanGenerator;
use crate::safety::SafetyGate;
use crate::service::WorkflowService;
use crate::specialists::Specialists;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    /// Defaults to `database_url`.
    pub queue_database_url: Option<String>,
    pub job_options: JobOptions,
    /// `None` runs with the offline generator.
    pub llm: Option<ChatClientConfig>,
}

/// Everything the engine needs, built once at startup and passed explicitly.
#[derive(Clone)]
pub struct EngineContext {
    db: SqlitePool,
    queue_db: SqlitePool,
    generator: Arc<dyn Generator>,
    events: EventBus,
    queue: JobQueue,
}

impl EngineContext {
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let db = open(&config.database_url).await?;

        let queue_db = match config.queue_database_url.as_deref() {
            Some(url) if url != config.database_url => open(url).await?,
            _ => db.clone(),
        };

        let generator: Arc<dyn Generator> = match &config.llm {
            Some(llm) => {
                info!(model = %llm.model, base_url = %llm.base_url, "Using chat completion backend");
                Arc::new(ChatClient::new(llm.clone())?)
            }
            None => {
                warn!("No OPENAI_API_KEY configured, running with offline generator");
                Arc::new(OfflineGenerator)
            }
        };

        Ok(Self::from_parts(
            db,
            queue_db,
            generator,
            EventBus::new(),
            config.job_options,
        ))
    }

    pub fn from_parts(
        db: SqlitePool,
        queue_db: SqlitePool,
        generator: Arc<dyn Generator>,
        events: EventBus,
        job_options: JobOptions,
    ) -> Self {
        let queue = JobQueue::new(queue_db.clone(), job_options, events.clone());
        Self {
            db,
            queue_db,
            generator,
            events,
            queue,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub fn workflows(&self) -> WorkflowRepository {
        WorkflowRepository::new(self.db.clone())
    }

    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.db.clone())
    }

    pub fn service(&self) -> WorkflowService {
        WorkflowService::new(self.workflows(), self.queue.clone(), self.events.clone())
    }

    pub fn pipeline(&self) -> WorkflowPipeline {
        WorkflowPipeline::new(
            self.workflows(),
            PlanGenerator::new(self.generator.clone()),
            SpecialistDispatcher::new(self.tasks(), Specialists::new(self.generator.clone())),
            IntegrationStage::new(self.generator.clone()),
            SafetyGate::new(self.generator.clone()),
            self.events.clone(),
        )
    }

    pub fn worker_pool(&self, config: WorkerConfig) -> WorkerPool {
        WorkerPool::new(
            self.queue.clone(),
            Arc::new(WorkflowJobHandler::new(self.pipeline())),
            config,
        )
    }

    /// Closes both pools. Stop worker pools first.
    pub async fn shutdown(&self) {
        self.db.close().await;
        self.queue_db.close().await;
        info!("Engine context shut down");
    }
}

async fn open(url: &str) -> Result<SqlitePool> {
    let pool = db::create_pool(url).await.map_err(db::DbError::from)?;
    db::run_migrations(&pool).await.map_err(db::DbError::from)?;
    Ok(pool)
}
