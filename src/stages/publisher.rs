//! Review publication: create the review request through the review tool
//! server, then notify stakeholders. The review request is required for the
//! run to succeed; every notification is best-effort.

use std::time::Duration;

use chrono::Local;
use serde_json::{json, Value};

use crate::config::ReviewConfig;
use crate::error::{AppError, Result};
use crate::identity::IdentityResolver;
use crate::ledger::effort::{apply_effort_floor, parse_minutes, EffortLedger};
use crate::notify::{direct_message_text, BroadcastPayload, Notifier};
use crate::pipeline::{Stage, StageContext};
use crate::state::{FixSolution, PipelineState, ReviewRequestInfo, StageName};

const REVIEW_SERVER: &str = "review";
const CREATE_TIMEOUT: Duration = Duration::from_secs(180);

const PREFERRED_TOOLS: &[&str] = &[
    "pullRequests/create",
    "pullrequests/create",
    "createPullRequest",
    "pull_request_create",
    "create_pull_request",
];
const TOOL_KEYWORDS: &[&str] = &["pull", "create"];

fn review_title(finding_key: &str) -> String {
    format!("fix: resolve finding {finding_key}")
}

fn review_description(config: &ReviewConfig, solution: &FixSolution) -> String {
    let mut parts = vec![
        format!("Automated fix for finding {}.", solution.finding_key),
        format!("File: {}", solution.file_path),
        format!("Change: {}", solution.description),
    ];
    if let Some(summary) = &solution.execution_summary {
        parts.push(format!("Execution: {summary}"));
    }
    if !config.work_item_id.is_empty() {
        parts.push(format!("Work item: {}", config.work_item_id));
    }
    parts.push("Please review before merging.".to_string());
    parts.join("\n")
}

/// Creation payload for the review service. Empty optional fields are
/// omitted entirely rather than sent blank.
fn build_payload(
    config: &ReviewConfig,
    branch: &str,
    title: &str,
    description: &str,
    reviewer: &str,
) -> Value {
    let mut payload = json!({
        "projectId": config.project,
        "repositoryId": config.repository,
        "sourceRefName": format!("refs/heads/{branch}"),
        "targetRefName": config.target_branch,
        "title": title,
        "description": description,
    });

    if !reviewer.is_empty() {
        payload["reviewers"] = json!([{ "id": reviewer }]);
    }
    // Non-numeric work item ids are tolerated by omitting the link.
    if config.work_item_id.parse::<u64>().is_ok() {
        payload["workItemRefs"] = json!([{ "id": config.work_item_id }]);
    }
    payload
}

/// Reference id of the created review request: the trailing segment of its
/// reported URL when numeric, otherwise a `pullRequestId` field.
fn derive_id(result: &Value) -> Option<u64> {
    let from_url = result
        .get("url")
        .and_then(Value::as_str)
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .and_then(|segment| segment.parse().ok());
    from_url.or_else(|| match result.get("pullRequestId") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// An empty or non-object creation result means no review request exists.
fn usable_result(result: &Value) -> bool {
    result.as_object().map(|o| !o.is_empty()).unwrap_or(false)
}

/// Reference id and user-facing URL for the created review request. The
/// configured template is authoritative whenever an id can be derived; the
/// service's own URL is only a last resort.
fn derive_reference(config: &ReviewConfig, result: &Value) -> Result<(Option<u64>, String)> {
    let id = derive_id(result);
    let url = match id {
        Some(id) => config.url_template.replace("{id}", &id.to_string()),
        None => result
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::ReviewRequest(
                    "review service reported neither an id nor a URL".to_string(),
                )
            })?,
    };
    Ok((id, url))
}

pub struct Publisher;

impl Publisher {
    fn notify_stakeholders(
        &self,
        ctx: &StageContext,
        solution: &FixSolution,
        review_url: &str,
    ) {
        let identities = IdentityResolver::load(&ctx.config.paths);
        let notifier = Notifier::new(ctx.config.notify.clone());

        let owner = identities
            .email_for_guid(&solution.assignee)
            .unwrap_or(&ctx.config.notify.fallback_owner)
            .to_string();

        let effort = apply_effort_floor(solution.effort.as_deref().unwrap_or("5min"));
        let minutes = parse_minutes(&effort).unwrap_or(5);
        let ledger = EffortLedger::new(&ctx.config.paths.effort_ledger);
        let total = match ledger.record(minutes) {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to update the effort ledger");
                ledger.load()
            }
        };

        let payload = BroadcastPayload {
            user: owner,
            review_link: review_url.to_string(),
            timestamp: Local::now().to_rfc3339(),
            effort,
            total_effort_minutes: total,
        };
        if let Err(e) = notifier.broadcast(&payload) {
            tracing::warn!(error = %e, "Broadcast notification failed");
        }

        match identities.platform_id_for_guid(&solution.assignee) {
            Some(recipient) => {
                let text = direct_message_text(
                    review_url,
                    &solution.finding_key,
                    &solution.description,
                );
                if let Err(e) = notifier.direct_message(recipient, &text) {
                    tracing::warn!(recipient, error = %e, "Direct message failed");
                }
            }
            None => tracing::debug!(
                assignee = %solution.assignee,
                "No messaging recipient for assignee, skipping direct message"
            ),
        }
    }
}

impl Stage for Publisher {
    fn name(&self) -> StageName {
        StageName::ReviewPublication
    }

    fn run(&self, ctx: &StageContext, state: &mut PipelineState) -> Result<StageName> {
        let solution = state
            .fix_solution
            .as_ref()
            .ok_or(AppError::MissingState("fix_solution"))?
            .clone();
        let branch = state
            .branch_name
            .as_ref()
            .ok_or(AppError::MissingState("branch_name"))?
            .clone();

        let reviewer = if solution.assignee.is_empty() {
            ctx.config.review.default_reviewer.clone()
        } else {
            solution.assignee.clone()
        };

        let title = review_title(&solution.finding_key);
        let description = review_description(&ctx.config.review, &solution);
        let payload = build_payload(&ctx.config.review, &branch, &title, &description, &reviewer);

        let tool = ctx
            .gateway
            .resolve_tool_name(REVIEW_SERVER, PREFERRED_TOOLS, TOOL_KEYWORDS)?;
        let result = ctx
            .gateway
            .call_tool(REVIEW_SERVER, &tool, payload, CREATE_TIMEOUT)
            .map_err(|e| match e {
                AppError::GatewayClosed => e,
                other => AppError::ReviewRequest(other.to_string()),
            })?;

        if !usable_result(&result) {
            return Err(AppError::ReviewRequest(
                "review service returned an empty result".to_string(),
            ));
        }

        let (id, url) = derive_reference(&ctx.config.review, &result)?;
        tracing::info!(id = ?id, url = %url, "Review request created");

        state.push_assistant(format!("published review request {url}"));
        state.review_request = Some(ReviewRequestInfo {
            id,
            url: url.clone(),
            title: Some(title),
            status: result
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
        });

        self.notify_stakeholders(ctx, &solution, &url);
        Ok(StageName::RecordKeeping)
    }
}
