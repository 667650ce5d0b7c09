//! Finding discovery: scan the tracker page by page, newest first, and pick
//! the first open, owned finding that has no entry in the processed ledger.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::ledger::processed::ProcessedLedger;
use crate::pipeline::{Stage, StageContext};
use crate::state::{PipelineState, StageName};
use crate::tracker;

const TRACKER_SERVER: &str = "tracker";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Exact tool names tried in order before falling back to keyword matching.
const PREFERRED_TOOLS: &[&str] = &["issues", "issues/search", "issues.search", "issues_search"];
const TOOL_KEYWORDS: &[&str] = &["issues"];

pub struct Finder;

impl Stage for Finder {
    fn name(&self) -> StageName {
        StageName::FindingDiscovery
    }

    fn run(&self, ctx: &StageContext, state: &mut PipelineState) -> Result<StageName> {
        let ledger = ProcessedLedger::new(&ctx.config.paths.processed_ledger);
        let processed = ledger.processed_keys();
        tracing::info!(processed = processed.len(), "Scanning tracker for a new finding");

        let tool = ctx
            .gateway
            .resolve_tool_name(TRACKER_SERVER, PREFERRED_TOOLS, TOOL_KEYWORDS)?;

        let mut page: u64 = 1;
        loop {
            let params = tracker::query_params(&ctx.config.tracker, page);
            let response = ctx
                .gateway
                .call_tool(TRACKER_SERVER, &tool, params, SEARCH_TIMEOUT)
                .map_err(|e| match e {
                    AppError::GatewayClosed => e,
                    other => AppError::Tracker(other.to_string()),
                })?;

            let findings = tracker::parse_findings(&response);
            let paging = tracker::parse_paging(&response);
            tracing::debug!(page, fetched = findings.len(), "Fetched tracker page");

            if let Some(candidate) = tracker::select_candidate(&findings, &processed) {
                tracing::info!(
                    key = %candidate.key,
                    rule = %candidate.rule,
                    component = %candidate.component,
                    "Selected finding"
                );
                state.push_assistant(format!(
                    "selected finding {}: {}",
                    candidate.key, candidate.message
                ));
                state.finding = Some(candidate.clone());
                return Ok(StageName::WorkspaceSetup);
            }

            if tracker::is_last_page(&paging, page, findings.len(), ctx.config.tracker.page_size) {
                return Err(AppError::NoFinding);
            }
            page += 1;
        }
    }
}
