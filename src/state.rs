use serde::{Deserialize, Serialize};

use crate::tracker::Finding;

/// The seven pipeline stages plus the terminal sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FindingDiscovery,
    WorkspaceSetup,
    SolutionDraft,
    FixExecution,
    ReviewPublication,
    RecordKeeping,
    BrowserLaunch,
    Done,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::FindingDiscovery => "finding_discovery",
            StageName::WorkspaceSetup => "workspace_setup",
            StageName::SolutionDraft => "solution_draft",
            StageName::FixExecution => "fix_execution",
            StageName::ReviewPublication => "review_publication",
            StageName::RecordKeeping => "record_keeping",
            StageName::BrowserLaunch => "browser_launch",
            StageName::Done => "done",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Assistant,
}

/// One entry in the run's audit trail. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub role: Role,
    pub content: String,
}

/// Proposed fix produced by the draft stage. The execution stage is the only
/// later writer, and only to `execution_summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixSolution {
    pub file_path: String,
    pub code_diff: String,
    pub description: String,
    pub assignee: String,
    pub finding_key: String,
    pub line: Option<u64>,
    pub effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequestInfo {
    pub id: Option<u64>,
    pub url: String,
    pub title: Option<String>,
    pub status: Option<String>,
}

/// Shared mutable record threaded through every stage of a single run.
#[derive(Debug)]
pub struct PipelineState {
    pub messages: Vec<LogMessage>,
    pub current_stage: StageName,
    pub finding: Option<Finding>,
    pub branch_name: Option<String>,
    pub fix_solution: Option<FixSolution>,
    pub review_request: Option<ReviewRequestInfo>,
    pub error_info: Option<String>,
    pub completed_stages: Vec<StageName>,
}

impl PipelineState {
    pub fn new() -> Self {
        let mut state = Self {
            messages: Vec::new(),
            current_stage: StageName::FindingDiscovery,
            finding: None,
            branch_name: None,
            fix_solution: None,
            review_request: None,
            error_info: None,
            completed_stages: Vec::new(),
        };
        state.push_human("start automated finding remediation run");
        state
    }

    pub fn push_human(&mut self, content: impl Into<String>) {
        self.messages.push(LogMessage {
            role: Role::Human,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(LogMessage {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    /// Latch the first error. Later failures never overwrite the first one,
    /// and an error is never cleared once set.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error_info.is_none() {
            self.error_info = Some(message.into());
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_info.is_some()
    }

    /// Record a stage as finished without error and advance to its successor.
    pub fn complete(&mut self, stage: StageName, next: StageName) {
        debug_assert!(!self.has_error());
        self.completed_stages.push(stage);
        self.current_stage = next;
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
