//! Workspace and descriptor location shared by the subcommands

use crate::cli::CliContext;
use anyhow::{Context, Result};
use dcplan_core::config::ConfigLoader;
use dcplan_core::variable::VariableContext;
use std::path::PathBuf;
use tracing::debug;

/// Where a command reads its descriptor from
#[derive(Debug, Clone)]
pub struct WorkspaceTarget {
    pub workspace_folder: PathBuf,
    pub config_path: PathBuf,
}

impl WorkspaceTarget {
    /// Use `--config` when given, otherwise discover below the workspace folder
    /// (or the current directory).
    pub fn locate(context: &CliContext) -> Result<Self> {
        let workspace_folder = match &context.workspace_folder {
            Some(folder) => folder.clone(),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };

        let config_path = match &context.config {
            Some(path) => path.clone(),
            None => ConfigLoader::discover_config(&workspace_folder)?,
        };
        debug!(
            "Using descriptor {} for workspace {}",
            config_path.display(),
            workspace_folder.display()
        );

        Ok(Self {
            workspace_folder,
            config_path,
        })
    }

    /// Variable context over the process environment
    pub fn variable_context(&self) -> Result<VariableContext> {
        Ok(VariableContext::new(&self.workspace_folder)?)
    }
}
