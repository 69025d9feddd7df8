pub mod generate;
pub mod init;
pub mod resolve;
pub mod status;

use anyhow::Result;
use gk_migrate::ProjectContext;

use crate::output::OutputManager;

/// Find the project and make sure `gk init` has been run in it.
pub(crate) fn initialized_project(output: &OutputManager) -> Result<ProjectContext> {
    let ctx = ProjectContext::find()?;

    if !ctx.is_initialized() {
        output.error("gk is not initialized in this project.");
        output.info("Run 'gk init' first to initialize.");
        anyhow::bail!("Project not initialized");
    }

    Ok(ctx)
}
