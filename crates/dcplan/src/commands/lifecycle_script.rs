//! Lifecycle script command implementation
//!
//! Implements `dcplan lifecycle-script`: render the lifecycle hooks of the
//! resolved descriptor as a POSIX shell script.

use crate::cli::CliContext;
use crate::commands::shared::WorkspaceTarget;
use anyhow::Result;
use dcplan_core::lifecycle::LifecyclePhase;
use dcplan_core::pipeline::resolve_configuration;
use tracing::{debug, instrument};

/// Lifecycle script command arguments
#[derive(Debug, Clone)]
pub struct LifecycleScriptArgs {
    pub context: CliContext,
    /// `create`, `start`, `attach`, or all hooks when absent
    pub phase: Option<String>,
}

/// Execute the lifecycle-script command
#[instrument(skip_all, fields(phase = ?args.phase))]
pub fn execute_lifecycle_script(args: LifecycleScriptArgs) -> Result<()> {
    // Reject an unknown phase before touching the filesystem
    let phase = LifecyclePhase::parse(args.phase.as_deref())?;

    let target = WorkspaceTarget::locate(&args.context)?;
    let resolved = resolve_configuration(&target.config_path, &target.variable_context()?)?;
    debug!("Rendering lifecycle script for phase {}", phase.as_str());

    print!("{}", resolved.config.hooks.script(phase));
    Ok(())
}
