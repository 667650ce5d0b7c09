//! Workspace setup: bring the local mainline up to date and cut a uniquely
//! named working branch for the selected finding.

use chrono::Local;

use crate::error::{AppError, Result};
use crate::pipeline::{Stage, StageContext};
use crate::state::{PipelineState, StageName};
use crate::workspace::{self, git};

pub struct Brancher;

impl Stage for Brancher {
    fn name(&self) -> StageName {
        StageName::WorkspaceSetup
    }

    fn run(&self, ctx: &StageContext, state: &mut PipelineState) -> Result<StageName> {
        let finding = state
            .finding
            .as_ref()
            .ok_or(AppError::MissingState("finding"))?;

        let repo_path = &ctx.config.git.repo_path;
        if !workspace::has_vcs_root(repo_path) {
            return Err(AppError::Git(format!(
                "no repository at {}",
                repo_path.display()
            )));
        }

        let git_cfg = &ctx.config.git;
        git::sync_mainline(
            repo_path,
            &git_cfg.mainline,
            &git_cfg.remote,
            git_cfg.token.as_deref(),
        )?;
        tracing::info!(mainline = %git_cfg.mainline, "Mainline synchronized");

        let branch = workspace::branch_name_for(&finding.key, Local::now());
        git::create_branch(repo_path, &branch)?;
        tracing::info!(branch = %branch, "Working branch created");

        state.push_assistant(format!("created working branch {branch}"));
        state.branch_name = Some(branch);
        Ok(StageName::SolutionDraft)
    }
}
