//! Plan command implementation
//!
//! Implements `dcplan plan`: resolve the descriptor of a workspace into a validated
//! container run plan and print it as JSON or as an argument vector.

use crate::cli::{CliContext, PlanFormat};
use crate::commands::shared::WorkspaceTarget;
use anyhow::Result;
use dcplan_core::mount::Mount;
use dcplan_core::pipeline::resolve_plan;
use dcplan_core::plan::{InvocationPlan, PlanOptions};
use dcplan_core::ports::PortSpec;
use tracing::{debug, instrument};

/// Plan command arguments
#[derive(Debug, Clone)]
pub struct PlanArgs {
    pub context: CliContext,
    /// Raw `--mount` values
    pub mounts: Vec<String>,
    /// Raw `--app-port` values
    pub app_ports: Vec<String>,
    pub format: PlanFormat,
    pub command: Vec<String>,
}

/// Execute the plan command
#[instrument(skip_all)]
pub fn execute_plan(args: PlanArgs) -> Result<()> {
    let target = WorkspaceTarget::locate(&args.context)?;
    let options = build_options(&target, &args)?;

    let plan = resolve_plan(&target.config_path, &target.variable_context()?, &options)?;
    debug!(
        "Resolved plan for {} with {} mounts and {} ports",
        plan.image,
        plan.mounts.len(),
        plan.ports.len()
    );

    println!("{}", render(&plan, args.format)?);
    Ok(())
}

fn build_options(target: &WorkspaceTarget, args: &PlanArgs) -> Result<PlanOptions> {
    let injected = args
        .mounts
        .iter()
        .map(|spec| spec.parse::<Mount>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let app_ports = args
        .app_ports
        .iter()
        .map(|port| PortSpec::from(port.as_str()))
        .collect();

    Ok(PlanOptions::new(&target.workspace_folder)
        .with_injected_mounts(injected)
        .with_app_port_override(app_ports)
        .with_command(args.command.clone()))
}

fn render(plan: &InvocationPlan, format: PlanFormat) -> Result<String> {
    match format {
        PlanFormat::Json => Ok(serde_json::to_string_pretty(plan)?),
        PlanFormat::Args => Ok(plan.to_run_args().join("\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(mounts: &[&str], app_ports: &[&str]) -> PlanArgs {
        PlanArgs {
            context: CliContext {
                workspace_folder: None,
                config: None,
            },
            mounts: mounts.iter().map(|s| s.to_string()).collect(),
            app_ports: app_ports.iter().map(|s| s.to_string()).collect(),
            format: PlanFormat::Json,
            command: vec!["bash".to_string()],
        }
    }

    fn target() -> WorkspaceTarget {
        WorkspaceTarget {
            workspace_folder: PathBuf::from("/w/app"),
            config_path: PathBuf::from("/w/app/.devcontainer/devcontainer.json"),
        }
    }

    #[test]
    fn test_build_options_parses_mounts_and_ports() {
        let options = build_options(
            &target(),
            &args(&["type=bind,source=/host,target=/data,readonly"], &["3000", "8000:80"]),
        )
        .unwrap();

        assert_eq!(options.injected_mounts.len(), 1);
        assert_eq!(
            options.injected_mounts[0].canonical(),
            "type=bind,source=/host,target=/data,readonly"
        );
        assert_eq!(
            options.app_port_override,
            vec![PortSpec::Number(3000), PortSpec::String("8000:80".into())]
        );
        assert_eq!(options.command, vec!["bash"]);
    }

    #[test]
    fn test_build_options_rejects_mount_without_target() {
        assert!(build_options(&target(), &args(&["type=bind,source=/host"], &[])).is_err());
    }

    #[test]
    fn test_render_args_one_token_per_line() {
        let plan = InvocationPlan {
            image: "alpine".into(),
            ..Default::default()
        };
        let rendered = render(&plan, PlanFormat::Args).unwrap();
        assert!(rendered.starts_with("run\n--rm\n-it"));
        assert!(rendered.ends_with("\nalpine"));
    }
}
