//! Read configuration command implementation
//!
//! Implements `dcplan read-configuration`: print the descriptor with its extends
//! chain merged and variables expanded.

use crate::cli::CliContext;
use crate::commands::shared::WorkspaceTarget;
use anyhow::Result;
use dcplan_core::pipeline::resolve_configuration;
use tracing::{debug, instrument};

/// Execute the read-configuration command
#[instrument(skip_all)]
pub fn execute_read_configuration(context: CliContext) -> Result<()> {
    let target = WorkspaceTarget::locate(&context)?;
    let resolved = resolve_configuration(&target.config_path, &target.variable_context()?)?;
    debug!(
        "Applied {} variable replacements",
        resolved.report.replacements.len()
    );

    println!("{}", serde_json::to_string_pretty(&resolved.config.to_value()?)?);
    Ok(())
}
