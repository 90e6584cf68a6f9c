//! End-to-end resolution
//!
//! raw document -> extends chain merged -> variables expanded -> ports and mounts
//! normalized -> plan synthesized -> plan validated.
//!
//! Every call is a single pass over immutable inputs; the only I/O is reading the
//! documents of the extends chain. Running it twice with the same inputs and the
//! same host environment yields identical plans.

use crate::config::{ConfigLoader, DevContainerConfig};
use crate::errors::Result;
use crate::plan::{InvocationPlan, PlanOptions};
use crate::variable::{SubstitutionReport, VariableContext, VariableSubstitution};
use std::path::Path;
use tracing::{debug, instrument};

/// A merged and variable-expanded descriptor
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    pub config: DevContainerConfig,
    pub report: SubstitutionReport,
}

/// Expand variables of an already merged descriptor
///
/// `workspaceFolder` is expanded first and the result becomes the
/// `containerWorkspaceFolder` seen by every other field.
pub fn expand_configuration(
    config: &DevContainerConfig,
    context: &VariableContext,
) -> Result<ResolvedConfiguration> {
    let mut folder_report = SubstitutionReport::new();
    let mut context = context.clone();
    let mut config = config.clone();

    if let Some(folder) = config.workspace_folder.as_deref().filter(|f| !f.is_empty()) {
        let expanded =
            VariableSubstitution::substitute_string(folder, &context, &mut folder_report);
        debug!("Container workspace folder: {}", expanded);
        context = context.with_container_workspace_folder(expanded.clone());
        config.workspace_folder = Some(expanded);
    }

    let (config, mut report) = config.apply_variable_substitution(&context)?;
    report.replacements.extend(folder_report.replacements);
    Ok(ResolvedConfiguration { config, report })
}

/// Load a descriptor with its extends chain and expand variables
#[instrument(skip_all, fields(path = %config_path.display()))]
pub fn resolve_configuration(
    config_path: &Path,
    context: &VariableContext,
) -> Result<ResolvedConfiguration> {
    let merged = ConfigLoader::load_with_extends(config_path)?;
    expand_configuration(&merged, context)
}

/// Build and validate a plan from an in-memory descriptor
pub fn plan_from_config(
    config: &DevContainerConfig,
    context: &VariableContext,
    options: &PlanOptions,
) -> Result<InvocationPlan> {
    let resolved = expand_configuration(config, context)?;
    if let Some(requirements) = &resolved.config.host_requirements {
        requirements.validate()?;
    }

    let plan = InvocationPlan::synthesize(&resolved.config, options)?;
    plan.validate()?;
    debug!("Plan validated for image {}", plan.image);
    Ok(plan)
}

/// Resolve a descriptor file all the way to a validated plan
#[instrument(skip_all, fields(path = %config_path.display()))]
pub fn resolve_plan(
    config_path: &Path,
    context: &VariableContext,
    options: &PlanOptions,
) -> Result<InvocationPlan> {
    let merged = ConfigLoader::load_with_extends(config_path)?;
    plan_from_config(&merged, context, options)
}
