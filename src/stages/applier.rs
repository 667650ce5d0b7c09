//! Fix execution: rewrite the target file with the model's help and commit
//! the result onto the working branch.
//!
//! Everything here is best-effort. A finding whose fix cannot be applied
//! mechanically still proceeds to review with an execution summary saying
//! what happened; the reviewer finishes the job by hand.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::llm;
use crate::pipeline::{Stage, StageContext};
use crate::state::{FixSolution, PipelineState, StageName};
use crate::workspace::git;

/// Lines of context shown around the reported line.
const WINDOW_RADIUS: usize = 10;

const SYSTEM_PROMPT: &str = "You are a senior engineer applying a reviewed fix to a source file. \
Respond with a single JSON object and nothing else.";

/// How the model's reply replaces file content. A whole-file rewrite always
/// wins over a window update when both are present.
enum ContentUpdate {
    Full(String),
    Window(String),
}

/// A string field counts as content only when it is non-blank; a blank
/// reply means "nothing usable", never "truncate the file".
fn content_field(reply: &Value, key: &str) -> Option<String> {
    reply
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn choose_update(reply: &Value) -> Option<ContentUpdate> {
    if let Some(content) = content_field(reply, "newContent") {
        return Some(ContentUpdate::Full(content));
    }
    content_field(reply, "updatedSnippet").map(ContentUpdate::Window)
}

/// Zero-based half-open line range of the context window around a one-based
/// reported line.
fn window_for(total_lines: usize, line: u64) -> (usize, usize) {
    let line = (line as usize).max(1).min(total_lines.max(1));
    let start = line.saturating_sub(1).saturating_sub(WINDOW_RADIUS);
    let end = (line + WINDOW_RADIUS).min(total_lines);
    (start, end)
}

/// Replace lines `[start, end)` of `original` with `replacement`, keeping
/// the original file's trailing-newline state.
fn splice_window(original: &str, start: usize, end: usize, replacement: &str) -> String {
    let had_trailing_newline = original.ends_with('\n');
    let lines: Vec<&str> = original.lines().collect();

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend(&lines[..start.min(lines.len())]);
    out.extend(replacement.lines());
    if end < lines.len() {
        out.extend(&lines[end..]);
    }

    let mut result = out.join("\n");
    if had_trailing_newline {
        result.push('\n');
    }
    result
}

/// Code-fence language hint; the raw extension is enough for the model.
fn fence_hint(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

fn windowed_prompt(
    solution: &FixSolution,
    path: &Path,
    snippet: &str,
    first_line: usize,
    last_line: usize,
) -> String {
    format!(
        "Apply this fix to a source file.\n\n\
         Finding: {}\nFix description: {}\nProposed change:\n{}\n\n\
         Lines {first_line}-{last_line} of {}:\n```{}\n{}\n```\n\n\
         Reply with {{\"updatedSnippet\": \"those lines, corrected and complete\", \
         \"summary\": \"one-sentence change summary\"}}. \
         Use {{\"newContent\": \"the full corrected file\", \"summary\": \"...\"}} \
         instead only if the whole file must change.",
        solution.finding_key,
        solution.description,
        solution.code_diff,
        path.display(),
        fence_hint(path),
        snippet,
    )
}

fn full_file_prompt(solution: &FixSolution, path: &Path, content: &str) -> String {
    format!(
        "Apply this fix to a source file.\n\n\
         Finding: {}\nFix description: {}\nProposed change:\n{}\n\n\
         Full content of {}:\n```{}\n{}\n```\n\n\
         Reply with {{\"newContent\": \"the full corrected file\", \
         \"summary\": \"one-sentence change summary\"}}.",
        solution.finding_key,
        solution.description,
        solution.code_diff,
        path.display(),
        fence_hint(path),
        content,
    )
}

fn resolve_target(repo_path: &Path, file_path: &str) -> PathBuf {
    let rel = Path::new(file_path);
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        repo_path.join(rel)
    }
}

/// Whether the resolved target lies outside the repository root, via `..`
/// components or an absolute path elsewhere. Permitted, but flagged.
fn escapes_repo(repo_path: &Path, target: &Path) -> bool {
    target.components().any(|c| matches!(c, Component::ParentDir))
        || (target.is_absolute() && !target.starts_with(repo_path))
}

/// Existing content of the target. Missing or undecodable files are treated
/// as empty; the fix regenerates them rather than splicing mangled text.
fn existing_content(target: &Path) -> String {
    fs::read(target)
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .unwrap_or_default()
}

fn commit_message(solution: &FixSolution, change_summary: Option<&str>) -> String {
    format!(
        "fix: resolve finding {} - {}",
        solution.finding_key,
        change_summary.unwrap_or(&solution.description)
    )
}

/// Produce the updated file content, or `None` when the model's reply has
/// nothing usable in it.
fn apply_update(content: &str, line: Option<u64>, update: ContentUpdate) -> Option<String> {
    match (update, line) {
        (ContentUpdate::Full(new_content), _) => Some(new_content),
        (ContentUpdate::Window(snippet), Some(line)) => {
            let total = content.lines().count();
            let (start, end) = window_for(total, line);
            Some(splice_window(content, start, end, &snippet))
        }
        // A window update without a reported line cannot be placed.
        (ContentUpdate::Window(_), None) => None,
    }
}

pub struct Applier;

/// Outcome of the mechanical edit, short of version control.
struct EditOutcome {
    summary: String,
    change_summary: Option<String>,
    file_updated: bool,
}

impl EditOutcome {
    fn unchanged(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            change_summary: None,
            file_updated: false,
        }
    }
}

impl Applier {
    /// Run the model over the target file and write the result. A model
    /// transport failure is a stage error; an unusable reply is the
    /// non-fatal no-change outcome.
    fn execute(&self, ctx: &StageContext, solution: &FixSolution) -> Result<EditOutcome> {
        let repo_path = &ctx.config.git.repo_path;
        let target = resolve_target(repo_path, &solution.file_path);

        if escapes_repo(repo_path, &target) {
            tracing::warn!(path = %target.display(), "Target path escapes the repository root");
        }

        let content = existing_content(&target);

        let prompt = match solution.line {
            Some(line) if content.lines().count() > 0 => {
                let total = content.lines().count();
                let (start, end) = window_for(total, line);
                let snippet = content
                    .lines()
                    .skip(start)
                    .take(end - start)
                    .collect::<Vec<_>>()
                    .join("\n");
                windowed_prompt(solution, &target, &snippet, start + 1, end)
            }
            _ => full_file_prompt(solution, &target, &content),
        };

        let reply = ctx.llm.complete(SYSTEM_PROMPT, &prompt)?;

        let parsed = llm::json::extract_object(&reply);
        let change_summary = parsed
            .as_ref()
            .and_then(|value| value.get("summary"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let updated = parsed
            .and_then(|value| choose_update(&value))
            .and_then(|update| apply_update(&content, solution.line, update));

        let Some(updated) = updated else {
            tracing::warn!(key = %solution.finding_key, "Model reply contained no usable update");
            return Ok(EditOutcome::unchanged(
                "model produced no usable update; file not modified",
            ));
        };

        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create parent directory");
            }
        }
        if let Err(e) = fs::write(&target, &updated) {
            tracing::warn!(path = %target.display(), error = %e, "Failed to write updated file");
            return Ok(EditOutcome::unchanged(
                "failed to write updated file; not modified",
            ));
        }

        tracing::info!(path = %target.display(), "File updated");
        Ok(EditOutcome {
            summary: format!("updated {}", solution.file_path),
            change_summary,
            file_updated: true,
        })
    }

    fn commit_and_push(
        &self,
        ctx: &StageContext,
        solution: &FixSolution,
        branch: &str,
        change_summary: Option<&str>,
    ) {
        let git_cfg = &ctx.config.git;
        let repo_path = &git_cfg.repo_path;
        let rel = Path::new(&solution.file_path);
        let rel = rel
            .strip_prefix(repo_path)
            .unwrap_or(rel)
            .to_path_buf();

        let message = commit_message(solution, change_summary);

        let result = git::add_path(repo_path, &rel)
            .and_then(|()| git::commit(repo_path, &message, &git_cfg.author_name, &git_cfg.author_email))
            .and_then(|()| git::push(repo_path, branch, &git_cfg.remote, git_cfg.token.as_deref()));

        match result {
            Ok(()) => tracing::info!(branch = %branch, "Fix committed and pushed"),
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "Failed to commit or push the fix")
            }
        }
    }
}

impl Stage for Applier {
    fn name(&self) -> StageName {
        StageName::FixExecution
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

        let outcome = self.execute(ctx, &solution)?;
        if outcome.file_updated {
            self.commit_and_push(ctx, &solution, &branch, outcome.change_summary.as_deref());
        }

        state.push_assistant(outcome.summary.clone());
        if let Some(sol) = state.fix_solution.as_mut() {
            sol.execution_summary = Some(outcome.summary);
        }
        Ok(StageName::ReviewPublication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::gateway::ToolGateway;
    use crate::llm::LlmClient;
    use serde_json::json;
    use std::collections::HashMap;

    fn solution() -> FixSolution {
        FixSolution {
            file_path: "src/Main.java".to_string(),
            code_diff: "int x;".to_string(),
            description: "drop unused param".to_string(),
            assignee: String::new(),
            finding_key: "AB-1".to_string(),
            line: Some(3),
            effort: None,
            execution_summary: None,
        }
    }

    // Model endpoint points at a closed local port so completion requests
    // fail immediately.
    fn test_context(repo_path: &Path) -> StageContext {
        let toml = format!(
            r#"
            [tracker]
            project_key = "proj"
            branch = "master"

            [gateway.servers]

            [llm]
            base_url = "http://127.0.0.1:1/v1"

            [git]
            repo_path = "{}"

            [review]
            project = "proj"
            repository = "repo"
            default_reviewer = "guid-default"
            url_template = "https://review.example.com/pullrequest/{{id}}"

            [notify]
            webhook_url = "http://127.0.0.1:9/hook"
            "#,
            repo_path.display()
        );
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(&toml, config::FileFormat::Toml))
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

    #[test]
    fn test_blank_reply_content_is_not_an_update() {
        let reply = json!({ "newContent": "", "updatedSnippet": "   " });
        assert!(choose_update(&reply).is_none());
        assert!(content_field(&json!({ "newContent": "\n\t" }), "newContent").is_none());
    }

    #[test]
    fn test_model_transport_failure_is_a_stage_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/Main.java"), "class Main {}\n").unwrap();

        let ctx = test_context(tmp.path());
        let mut state = PipelineState::new();
        state.fix_solution = Some(solution());
        state.branch_name = Some("fix-AB-1-20260828120000".to_string());

        let err = Applier.run(&ctx, &mut state).unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        // the file is untouched and no execution summary is recorded
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("src/Main.java")).unwrap(),
            "class Main {}\n"
        );
        assert!(state
            .fix_solution
            .as_ref()
            .unwrap()
            .execution_summary
            .is_none());
    }

    #[test]
    fn test_undecodable_file_is_treated_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bin.dat");
        std::fs::write(&path, [0xff, 0xfe, 0x61]).unwrap();
        assert_eq!(existing_content(&path), "");
        assert_eq!(existing_content(&tmp.path().join("missing.java")), "");
    }

    #[test]
    fn test_escape_detection() {
        let repo = Path::new("/work/repo");
        assert!(escapes_repo(repo, Path::new("/work/repo/../other/a.java")));
        assert!(escapes_repo(repo, Path::new("/elsewhere/a.java")));
        assert!(!escapes_repo(repo, Path::new("/work/repo/src/Main.java")));
    }

    #[test]
    fn test_commit_message_falls_back_to_description() {
        let s = solution();
        assert_eq!(
            commit_message(&s, Some("tightened the loop")),
            "fix: resolve finding AB-1 - tightened the loop"
        );
        assert_eq!(
            commit_message(&s, None),
            "fix: resolve finding AB-1 - drop unused param"
        );
    }

    #[test]
    fn test_window_clamps_at_file_edges() {
        assert_eq!(window_for(100, 1), (0, 11));
        assert_eq!(window_for(100, 50), (39, 60));
        assert_eq!(window_for(100, 100), (89, 100));
        assert_eq!(window_for(5, 3), (0, 5));
    }

    #[test]
    fn test_splice_preserves_trailing_newline() {
        let original = "a\nb\nc\n";
        let spliced = splice_window(original, 1, 2, "B");
        assert_eq!(spliced, "a\nB\nc\n");

        let no_newline = "a\nb\nc";
        let spliced = splice_window(no_newline, 1, 2, "B");
        assert_eq!(spliced, "a\nB\nc");
    }

    #[test]
    fn test_splice_handles_multiline_replacement() {
        let original = "a\nb\nc\n";
        let spliced = splice_window(original, 1, 2, "B1\nB2");
        assert_eq!(spliced, "a\nB1\nB2\nc\n");
    }

    #[test]
    fn test_full_rewrite_wins_over_window_update() {
        let reply = json!({
            "newContent": "whole file",
            "updatedSnippet": "just a part"
        });
        match choose_update(&reply) {
            Some(ContentUpdate::Full(content)) => assert_eq!(content, "whole file"),
            _ => panic!("expected full rewrite"),
        }
    }

    #[test]
    fn test_window_update_without_line_is_unusable() {
        let update = ContentUpdate::Window("snippet".to_string());
        assert!(apply_update("a\nb\n", None, update).is_none());
    }

    #[test]
    fn test_window_update_splices_around_line() {
        let content = "l1\nl2\nl3\nl4\nl5\n";
        let update = ContentUpdate::Window("L1\nL2\nL3\nL4\nL5".to_string());
        let updated = apply_update(content, Some(3), update).unwrap();
        assert_eq!(updated, "L1\nL2\nL3\nL4\nL5\n");
    }

    #[test]
    fn test_resolve_target_joins_relative_paths() {
        let repo = Path::new("/work/repo");
        assert_eq!(
            resolve_target(repo, "src/Main.java"),
            PathBuf::from("/work/repo/src/Main.java")
        );
        assert_eq!(
            resolve_target(repo, "/abs/Main.java"),
            PathBuf::from("/abs/Main.java")
        );
    }

    #[test]
    fn test_fence_hint_is_the_extension() {
        assert_eq!(fence_hint(Path::new("a.java")), "java");
        assert_eq!(fence_hint(Path::new("a.rs")), "rs");
        assert_eq!(fence_hint(Path::new("Makefile")), "");
    }
}
