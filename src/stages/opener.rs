//! Browser launch: open the new review request in the operator's browser.
//! A headless host is normal; launch failures are logged and ignored.

use std::process::Command;

use crate::error::{AppError, Result};
use crate::pipeline::{Stage, StageContext};
use crate::state::{PipelineState, StageName};

#[cfg(target_os = "linux")]
fn launch_command(url: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    cmd
}

#[cfg(target_os = "macos")]
fn launch_command(url: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(target_os = "windows")]
fn launch_command(url: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", "", url]);
    cmd
}

pub struct Opener;

impl Stage for Opener {
    fn name(&self) -> StageName {
        StageName::BrowserLaunch
    }

    fn run(&self, _ctx: &StageContext, state: &mut PipelineState) -> Result<StageName> {
        let review = state
            .review_request
            .as_ref()
            .ok_or(AppError::MissingState("review_request"))?;

        match launch_command(&review.url).spawn() {
            Ok(_) => tracing::info!(url = %review.url, "Opened review request in browser"),
            Err(e) => {
                tracing::warn!(url = %review.url, error = %e, "Could not launch a browser")
            }
        }

        state.push_assistant(format!("run finished; review at {}", review.url));
        Ok(StageName::Done)
    }
}
