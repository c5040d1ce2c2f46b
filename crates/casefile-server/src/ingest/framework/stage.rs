//! Stage contract implemented by extract, load and the post-processing stages

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult, StageError};
use super::types::{OutcomeKind, SourceRef, StageExecution, StageName, StageOutcome, StagePlan};

/// Everything a stage may know about the attempt it is running
#[derive(Debug, Clone, PartialEq)]
pub struct StageContext {
    pub job_id: Uuid,
    pub source_ref: SourceRef,
    pub stage_name: StageName,
    pub attempt_no: u32,
    /// Output ref of the latest successful execution of each earlier stage
    pub prior_outputs: BTreeMap<StageName, String>,
}

impl StageContext {
    pub fn new(
        job_id: Uuid,
        source_ref: SourceRef,
        stage_name: StageName,
        attempt_no: u32,
        history: &[StageExecution],
    ) -> Self {
        let mut prior_outputs = BTreeMap::new();
        for execution in history {
            if execution.outcome != OutcomeKind::Success || execution.stage_name >= stage_name {
                continue;
            }
            if let Some(output_ref) = &execution.output_ref {
                // history is in append order, later successes win
                prior_outputs.insert(execution.stage_name, output_ref.clone());
            }
        }

        Self {
            job_id,
            source_ref,
            stage_name,
            attempt_no,
            prior_outputs,
        }
    }

    pub fn output_of(&self, stage: StageName) -> Result<&str, StageError> {
        self.prior_outputs
            .get(&stage)
            .map(String::as_str)
            .ok_or_else(|| {
                StageError::Structural(format!(
                    "no successful {} output recorded for job {}",
                    stage, self.job_id
                ))
            })
    }
}

/// One named unit of the fixed processing sequence.
///
/// Implementations read their inputs, write durable output idempotently and
/// report what happened. They never touch job state and never retry.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Run the stage, returning the output reference on success
    async fn run(&self, ctx: &StageContext) -> Result<String, StageError>;

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        match self.run(ctx).await {
            Ok(output_ref) => StageOutcome::Success { output_ref },
            Err(err) => err.into_outcome(),
        }
    }
}

/// Stage implementations keyed by name
#[derive(Clone, Default)]
pub struct StageSet {
    stages: HashMap<StageName, Arc<dyn Stage>>,
}

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage.name(), stage);
        self
    }

    pub fn get(&self, name: StageName) -> PipelineResult<Arc<dyn Stage>> {
        self.stages
            .get(&name)
            .cloned()
            .ok_or_else(|| PipelineError::StageNotRegistered(name.to_string()))
    }

    /// Fails if any stage of `plan` lacks an implementation
    pub fn check_covers(&self, plan: &StagePlan) -> PipelineResult<()> {
        for stage in plan.stages() {
            self.get(*stage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Fixed(StageName, Result<String, StageError>);

    #[async_trait]
    impl Stage for Fixed {
        fn name(&self) -> StageName {
            self.0
        }

        async fn run(&self, _ctx: &StageContext) -> Result<String, StageError> {
            self.1.clone()
        }
    }

    fn execution(stage: StageName, outcome: OutcomeKind, output: &str) -> StageExecution {
        StageExecution {
            job_id: Uuid::nil(),
            stage_name: stage,
            attempt_no: 1,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            outcome,
            output_ref: Some(output.to_string()),
            error_detail: None,
        }
    }

    #[test]
    fn test_context_collects_latest_prior_success() {
        let history = vec![
            execution(StageName::Extract, OutcomeKind::Success, "extract/a1"),
            execution(StageName::Load, OutcomeKind::RetryableFailure, "ignored"),
            execution(StageName::Extract, OutcomeKind::Success, "extract/a2"),
            execution(StageName::Load, OutcomeKind::Success, "load/1"),
        ];
        let ctx = StageContext::new(
            Uuid::nil(),
            SourceRef::new("s3://x", "0".repeat(64)),
            StageName::Load,
            2,
            &history,
        );
        assert_eq!(ctx.output_of(StageName::Extract).ok(), Some("extract/a2"));
        // own and later stages are not prior outputs
        assert!(ctx.output_of(StageName::Load).is_err());
    }

    #[tokio::test]
    async fn test_execute_maps_errors_to_outcomes() {
        let ctx = StageContext::new(
            Uuid::nil(),
            SourceRef::new("s3://x", "0".repeat(64)),
            StageName::Thread,
            1,
            &[],
        );
        let ok = Fixed(StageName::Thread, Ok("thread/ok".into()));
        assert_eq!(
            ok.execute(&ctx).await,
            StageOutcome::Success {
                output_ref: "thread/ok".into()
            }
        );
        let fatal = Fixed(StageName::Thread, Err(StageError::Structural("bad".into())));
        assert_eq!(fatal.execute(&ctx).await.kind(), OutcomeKind::FatalFailure);
    }

    #[test]
    fn test_stage_set_coverage() {
        let set = StageSet::new().with(Arc::new(Fixed(StageName::Extract, Ok(String::new()))));
        assert!(set.get(StageName::Extract).is_ok());
        assert!(matches!(
            set.check_covers(&StagePlan::standard()),
            Err(PipelineError::StageNotRegistered(_))
        ));
    }
}
