//! Stage graph and driver. The graph is a fixed chain with a conditional
//! edge after every node: once a stage records an error the run routes
//! straight to termination, regardless of the declared successor. No retries
//! at this level; retry behavior, where it exists, lives inside a stage.

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::Result;
use crate::gateway::ToolGateway;
use crate::llm::LlmClient;
use crate::stages;
use crate::state::{PipelineState, ReviewRequestInfo, StageName};
use crate::tracker::Finding;

/// Shared collaborators handed to every stage. Stages own no I/O clients of
/// their own.
pub struct StageContext {
    pub config: AppConfig,
    pub gateway: ToolGateway,
    pub llm: LlmClient,
}

impl StageContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let gateway = ToolGateway::new(config.enabled_servers())?;
        let llm = LlmClient::new(&config.llm);
        Ok(Self {
            config,
            gateway,
            llm,
        })
    }
}

/// One unit of the pipeline: reads required fields from the state, performs
/// one category of external effect, and either returns its successor or an
/// error that the driver latches into the state.
pub trait Stage {
    fn name(&self) -> StageName;
    fn run(&self, ctx: &StageContext, state: &mut PipelineState) -> Result<StageName>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// The standard seven-stage remediation chain.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(stages::finder::Finder),
                Box::new(stages::brancher::Brancher),
                Box::new(stages::drafter::Drafter),
                Box::new(stages::applier::Applier),
                Box::new(stages::publisher::Publisher),
                Box::new(stages::recorder::Recorder),
                Box::new(stages::opener::Opener),
            ],
        }
    }

    #[cfg(test)]
    fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Drive the stages in sequence and aggregate the terminal state.
    pub fn run(&self, ctx: &StageContext) -> RunSummary {
        let mut state = PipelineState::new();

        for stage in &self.stages {
            if state.has_error() {
                break;
            }

            state.current_stage = stage.name();
            tracing::info!(stage = %stage.name(), "Executing stage");

            match stage.run(ctx, &mut state) {
                Ok(next) => {
                    tracing::info!(stage = %stage.name(), next = %next, "Stage completed");
                    state.complete(stage.name(), next);
                }
                Err(e) => {
                    tracing::error!(stage = %stage.name(), error = %e, "Stage ended the run");
                    state.fail(e.to_string());
                }
            }
        }

        RunSummary::from_state(state)
    }
}

/// Terminal view of a run, sufficient to resume manually by re-running.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub success: bool,
    pub error: Option<String>,
    pub completed_stages: Vec<StageName>,
    pub finding: Option<Finding>,
    pub review_request: Option<ReviewRequestInfo>,
}

impl RunSummary {
    fn from_state(state: PipelineState) -> Self {
        Self {
            success: state.error_info.is_none(),
            error: state.error_info,
            completed_stages: state.completed_stages,
            finding: state.finding,
            review_request: state.review_request,
        }
    }
}
