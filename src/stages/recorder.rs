//! Record keeping: append the finished finding to the processed ledger so
//! later runs never pick it again.

use chrono::Local;

use crate::error::{AppError, Result};
use crate::ledger::processed::{ProcessedLedger, ProcessedRecord};
use crate::pipeline::{Stage, StageContext};
use crate::state::{PipelineState, StageName};

pub struct Recorder;

impl Stage for Recorder {
    fn name(&self) -> StageName {
        StageName::RecordKeeping
    }

    fn run(&self, ctx: &StageContext, state: &mut PipelineState) -> Result<StageName> {
        let finding = state
            .finding
            .as_ref()
            .ok_or(AppError::MissingState("finding"))?;
        let review = state
            .review_request
            .as_ref()
            .ok_or(AppError::MissingState("review_request"))?;

        let record = ProcessedRecord {
            key: finding.key.clone(),
            processed_date: Local::now().to_rfc3339(),
            assignee: state
                .fix_solution
                .as_ref()
                .map(|s| s.assignee.clone())
                .unwrap_or_default(),
            review_url: review.url.clone(),
            status: "completed".to_string(),
            component: finding.component.clone(),
        };

        ProcessedLedger::new(&ctx.config.paths.processed_ledger).append(record)?;
        tracing::info!(key = %finding.key, "Finding recorded as processed");

        state.push_assistant(format!("recorded finding {} as processed", finding.key));
        Ok(StageName::BrowserLaunch)
    }
}
