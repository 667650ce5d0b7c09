//! Solution drafting: ask the model for a structured fix proposal and fall
//! back to a manual-attention placeholder when the reply is unusable. This
//! stage never fails on model output quality; a placeholder solution keeps
//! the run moving so the finding still reaches review.

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::identity::IdentityResolver;
use crate::llm;
use crate::pipeline::{Stage, StageContext};
use crate::state::{FixSolution, PipelineState, StageName};
use crate::tracker::Finding;

const SYSTEM_PROMPT: &str = "You are a senior engineer fixing static-analysis findings. \
Respond with a single JSON object and nothing else.";

/// Model reply shape. Strict on field names; anything else falls back.
#[derive(Debug, Deserialize)]
struct DraftReply {
    #[serde(rename = "filePath")]
    file_path: String,
    #[serde(rename = "codeDiff", default)]
    code_diff: String,
    #[serde(default)]
    description: String,
}

fn draft_prompt(finding: &Finding) -> String {
    format!(
        "Propose a fix for this static-analysis finding.\n\n\
         Key: {}\nRule: {}\nComponent: {}\nLine: {}\nType: {}\nMessage: {}\n\n\
         Reply with exactly this JSON shape:\n\
         {{\"filePath\": \"path relative to the repository root\", \
         \"codeDiff\": \"the corrected code\", \
         \"description\": \"one-sentence summary of the change\"}}",
        finding.key,
        finding.rule,
        finding.component,
        finding
            .line
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        finding.finding_type,
        finding.message,
    )
}

fn parse_draft(reply: &str) -> Option<DraftReply> {
    let value = llm::json::extract_object(reply)?;
    serde_json::from_value(value).ok()
}

/// Component keys look like `<project>:<path>`; the path part is the best
/// available guess at the file to touch.
fn component_path(component: &str, project_key: &str) -> String {
    let prefix = format!("{project_key}:");
    component
        .strip_prefix(&prefix)
        .unwrap_or(component)
        .to_string()
}

fn fallback_solution(finding: &Finding, project_key: &str) -> DraftReply {
    DraftReply {
        file_path: component_path(&finding.component, project_key),
        code_diff: String::new(),
        description: format!(
            "Manual attention needed for finding {}: {}",
            finding.key, finding.message
        ),
    }
}

pub struct Drafter;

impl Stage for Drafter {
    fn name(&self) -> StageName {
        StageName::SolutionDraft
    }

    fn run(&self, ctx: &StageContext, state: &mut PipelineState) -> Result<StageName> {
        let finding = state
            .finding
            .as_ref()
            .ok_or(AppError::MissingState("finding"))?
            .clone();

        let identities = IdentityResolver::load(&ctx.config.paths);
        let assignee = finding
            .author
            .as_deref()
            .and_then(|email| identities.guid_for_email(email))
            .unwrap_or_default()
            .to_string();

        // An unreachable model endpoint ends the run; the placeholder is
        // only for replies that arrive but do not parse.
        let prompt = draft_prompt(&finding);
        let reply = ctx.llm.complete(SYSTEM_PROMPT, &prompt)?;
        let draft = match parse_draft(&reply) {
            Some(draft) => draft,
            None => {
                tracing::warn!(key = %finding.key, "Model reply was not a usable draft, using placeholder");
                fallback_solution(&finding, &ctx.config.tracker.project_key)
            }
        };

        tracing::info!(key = %finding.key, file = %draft.file_path, "Fix solution drafted");
        state.push_assistant(format!(
            "drafted fix for {}: {}",
            finding.key, draft.description
        ));
        state.fix_solution = Some(FixSolution {
            file_path: draft.file_path,
            code_diff: draft.code_diff,
            description: draft.description,
            assignee,
            finding_key: finding.key,
            line: finding.line,
            effort: finding.effort,
            execution_summary: None,
        });
        Ok(StageName::FixExecution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::gateway::ToolGateway;
    use crate::llm::LlmClient;
    use std::collections::HashMap;

    // Model endpoint points at a closed local port so completion requests
    // fail immediately.
    fn test_context() -> StageContext {
        let toml = r#"
            [tracker]
            project_key = "proj"
            branch = "master"

            [gateway.servers]

            [llm]
            base_url = "http://127.0.0.1:1/v1"

            [git]
            repo_path = "/tmp/repo"

            [review]
            project = "proj"
            repository = "repo"
            default_reviewer = "guid-default"
            url_template = "https://review.example.com/pullrequest/{id}"

            [notify]
            webhook_url = "http://127.0.0.1:9/hook"
        "#;
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        StageContext {
            llm: LlmClient::new(&config.llm),
            gateway: ToolGateway::new(HashMap::new()).unwrap(),
            config,
        }
    }

    fn finding() -> Finding {
        Finding {
            key: "AB-1".to_string(),
            rule: "java:S1172".to_string(),
            component: "proj:src/Main.java".to_string(),
            line: Some(42),
            message: "Remove this unused parameter".to_string(),
            severity: "INFO".to_string(),
            finding_type: "CODE_SMELL".to_string(),
            status: "OPEN".to_string(),
            author: Some("dev@example.com".to_string()),
            effort: Some("5min".to_string()),
        }
    }

    #[test]
    fn test_parse_draft_accepts_fenced_json() {
        let reply = "Here you go:\n```json\n{\"filePath\": \"src/Main.java\", \
                     \"codeDiff\": \"int x = 0;\", \"description\": \"drop unused param\"}\n```";
        let draft = parse_draft(reply).unwrap();
        assert_eq!(draft.file_path, "src/Main.java");
        assert_eq!(draft.description, "drop unused param");
    }

    #[test]
    fn test_parse_draft_rejects_missing_file_path() {
        assert!(parse_draft("{\"description\": \"something\"}").is_none());
        assert!(parse_draft("not json at all").is_none());
    }

    #[test]
    fn test_fallback_strips_project_prefix() {
        let draft = fallback_solution(&finding(), "proj");
        assert_eq!(draft.file_path, "src/Main.java");
        assert!(draft.description.contains("AB-1"));
        assert!(draft.code_diff.is_empty());
    }

    #[test]
    fn test_fallback_keeps_unprefixed_component() {
        let mut f = finding();
        f.component = "src/Main.java".to_string();
        let draft = fallback_solution(&f, "proj");
        assert_eq!(draft.file_path, "src/Main.java");
    }

    #[test]
    fn test_model_transport_failure_is_a_stage_error() {
        let ctx = test_context();
        let mut state = PipelineState::new();
        state.finding = Some(finding());

        let err = Drafter.run(&ctx, &mut state).unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        // no placeholder solution is written on a transport failure
        assert!(state.fix_solution.is_none());
    }

    #[test]
    fn test_prompt_names_the_finding() {
        let prompt = draft_prompt(&finding());
        assert!(prompt.contains("AB-1"));
        assert!(prompt.contains("java:S1172"));
        assert!(prompt.contains("Remove this unused parameter"));
        assert!(prompt.contains("filePath"));
    }
}
