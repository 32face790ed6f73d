//! Pipeline orchestration.
//!
//! A small sequential-stage/parallel-step scheduler, not a workflow engine.
//! A pipeline is an ordered list of stages; a stage is one or more steps
//! that all complete before the next stage starts. Stage boundaries give
//! happens-before visibility: stage N's writes are fully visible to stage
//! N+1. Steps in one stage share the context behind a lock and must write
//! disjoint fields; that is caller discipline, not engine-enforced.
//!
//! Partial failure is fail-fast: the first step error fails its stage and
//! aborts the run, and sibling steps still in flight are dropped at the
//! join. A failed run yields an error, never a partially-settled verdict.

mod context;
pub mod flow;

pub use context::RequestContext;

use std::sync::Arc;
use std::time::Instant;

use futures::future::{try_join_all, BoxFuture};
use tokio::sync::RwLock;

use crate::error::Result;

/// Context handle shared by the steps of one run.
pub type SharedContext = Arc<RwLock<RequestContext>>;

type StepFn = Arc<dyn Fn(SharedContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One named unit of work inside a stage.
pub struct Step {
    name: &'static str,
    run: StepFn,
}

impl Step {
    pub fn new<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(SharedContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name,
            run: Arc::new(move |ctx| Box::pin(f(ctx))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Ordered stages of concurrent steps. Built once; its shape is static and
/// one instance serves every request.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Vec<Step>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; returns the pipeline for chaining.
    pub fn stage(mut self, steps: Vec<Step>) -> Self {
        debug_assert!(!steps.is_empty(), "empty stage");
        self.stages.push(steps);
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run all stages in order against `ctx`, fanning steps out within each
    /// stage and joining before the next. Returns the mutated context.
    pub async fn run(&self, ctx: SharedContext) -> Result<SharedContext> {
        for (index, stage) in self.stages.iter().enumerate() {
            let started = Instant::now();
            if let [step] = stage.as_slice() {
                (step.run)(ctx.clone()).await?;
            } else {
                try_join_all(stage.iter().map(|step| (step.run)(ctx.clone()))).await?;
            }
            tracing::debug!(
                stage = index,
                steps = ?stage.iter().map(Step::name).collect::<Vec<_>>(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "stage complete"
            );
        }
        Ok(ctx)
    }
}
