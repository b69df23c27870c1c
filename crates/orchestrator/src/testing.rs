use std::sync::Mutex;

use async_trait::async_trait;
use hyperflow_core::TaskPlan;
use llm::{Generator, LlmError, LlmResult, OutputSchema};
use serde_json::Value;

/// Deterministic generator for pipeline tests.
///
/// Structured calls return the configured plan (or `Unavailable`). Text calls
/// return the first reply whose marker occurs in the system prompt.
pub struct ScriptedGenerator {
    plan: Option<Value>,
    replies: Vec<(&'static str, String)>,
    fail_text_on: Option<&'static str>,
    system_prompts: Mutex<Vec<String>>,
}

pub const SAFETY_MARKER: &str = "Safety reviewer";
pub const INTEGRATOR_MARKER: &str = "the Integrator";
pub const CODER_MARKER: &str = "the Coder";
pub const DESIGNER_MARKER: &str = "the Designer";
pub const RESEARCHER_MARKER: &str = "the Researcher";

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            plan: None,
            replies: Vec::new(),
            fail_text_on: None,
            system_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_plan(self, plan: TaskPlan) -> Self {
        let value = serde_json::to_value(plan).unwrap();
        self.with_plan_json(value)
    }

    pub fn with_plan_json(mut self, plan: Value) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_reply(mut self, marker: &'static str, reply: impl Into<String>) -> Self {
        self.replies.push((marker, reply.into()));
        self
    }

    pub fn failing_on(mut self, marker: &'static str) -> Self {
        self.fail_text_on = Some(marker);
        self
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }

    pub fn prompts_containing(&self, marker: &str) -> Vec<String> {
        self.system_prompts()
            .into_iter()
            .filter(|p| p.contains(marker))
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, system: &str, _user: &str) -> LlmResult<String> {
        self.system_prompts.lock().unwrap().push(system.to_string());

        if let Some(marker) = self.fail_text_on {
            if system.contains(marker) {
                return Err(LlmError::Api {
                    message: "scripted failure".to_string(),
                    status_code: Some(500),
                });
            }
        }

        Ok(self
            .replies
            .iter()
            .find(|(marker, _)| system.contains(marker))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| "generated output".to_string()))
    }

    async fn generate_json(
        &self,
        system: &str,
        _user: &str,
        _schema: &OutputSchema,
    ) -> LlmResult<Value> {
        self.system_prompts.lock().unwrap().push(system.to_string());
        self.plan
            .clone()
            .ok_or_else(|| LlmError::Unavailable("no scripted plan".to_string()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A migrated engine on a temporary database with default job options.
pub async fn test_engine(
    generator: std::sync::Arc<dyn Generator>,
) -> (crate::EngineContext, tempfile::TempDir) {
    test_engine_with_options(generator, hyperflow_core::JobOptions::default()).await
}

pub async fn test_engine_with_options(
    generator: std::sync::Arc<dyn Generator>,
    job_options: hyperflow_core::JobOptions,
) -> (crate::EngineContext, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("engine.db").display());
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let ctx = crate::EngineContext::from_parts(
        pool.clone(),
        pool,
        generator,
        events::EventBus::new(),
        job_options,
    );
    (ctx, dir)
}
