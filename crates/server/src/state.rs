use orchestrator::{EngineContext, WorkflowService};
use queue::JobQueue;

#[derive(Clone)]
pub struct AppState {
    pub service: WorkflowService,
    pub queue: JobQueue,
}

impl AppState {
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            service: ctx.service(),
            queue: ctx.queue().clone(),
        }
    }
}
