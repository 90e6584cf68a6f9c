//! Invocation synthesis
//!
//! Turns a fully merged, variable-expanded descriptor into an [`InvocationPlan`]:
//! the image, workspace placement, environment, normalized ports and mounts and the
//! security settings needed to launch one container. The plan is immutable once
//! built. [`InvocationPlan::validate`] is a separate step; the argument vector is
//! produced only from a plan that passed it ([`InvocationPlan::validated_run_args`]).
//!
//! Argument order is fixed:
//!
//! ```text
//! run --rm -it [--name N] [--mount WORKSPACE] -w FOLDER [-e K=V]... [-p P]...
//!     [RUN_ARGS]... [--mount M]... [--cap-add C]... [--security-opt S]...
//!     [--init] [--privileged] [-u USER] IMAGE [COMMAND]...
//! ```
//!
//! Environment flags are emitted sorted by key.

use crate::config::{ContainerSelector, DevContainerConfig};
use crate::errors::{ConfigError, PlanError, Result};
use crate::mount::{inject_mounts, normalize_mounts, Mount};
use crate::ports::{collect_ports, validate_port, PortSpec};
use crate::variable::CONTAINER_WORKSPACES_ROOT;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Caller-supplied inputs to synthesis
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Host directory the descriptor is resolved against
    pub workspace_root: PathBuf,
    /// Mounts that replace declared mounts with the same target
    pub injected_mounts: Vec<Mount>,
    /// App ports supplied outside the descriptor; ignored for compose descriptors
    pub app_port_override: Vec<PortSpec>,
    /// Command tail appended after the image
    pub command: Vec<String>,
}

impl PlanOptions {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Default::default()
        }
    }

    pub fn with_injected_mounts(mut self, mounts: Vec<Mount>) -> Self {
        self.injected_mounts = mounts;
        self
    }

    pub fn with_app_port_override(mut self, ports: Vec<PortSpec>) -> Self {
        self.app_port_override = ports;
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }
}

/// A resolved container invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationPlan {
    pub image: String,
    pub workspace_folder: String,
    pub workspace_mount: String,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub mounts: Vec<String>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub init: bool,
    pub privileged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub run_args: Vec<String>,
    pub command: Vec<String>,
}

impl InvocationPlan {
    /// Build a plan from a resolved descriptor
    #[instrument(skip_all, fields(workspace = %options.workspace_root.display()))]
    pub fn synthesize(config: &DevContainerConfig, options: &PlanOptions) -> Result<Self> {
        let image = match &config.selector {
            Some(ContainerSelector::Image(image)) if !image.is_empty() => image.clone(),
            Some(ContainerSelector::Image(_)) | None => return Err(PlanError::NoImageSpecified.into()),
            Some(other) => {
                return Err(PlanError::UnsupportedSelector {
                    kind: other.kind().to_string(),
                }
                .into())
            }
        };

        let workspace_root = absolute_path(&options.workspace_root)?;
        let workspace_folder = match config.workspace_folder.as_deref() {
            Some(folder) if !folder.is_empty() => folder.to_string(),
            _ => default_workspace_folder(&workspace_root),
        };
        let workspace_mount = match config.workspace_mount.as_deref() {
            Some(mount) if !mount.is_empty() => mount.to_string(),
            _ => format!(
                "type=bind,source={},target={}",
                workspace_root.display(),
                workspace_folder
            ),
        };

        let app_port_override: &[PortSpec] = if config.uses_compose() {
            &[]
        } else {
            &options.app_port_override
        };
        let ports = collect_ports(&config.app_port, app_port_override, &config.forward_ports);

        let declared = normalize_mounts(&config.mounts)?;
        let mounts = inject_mounts(declared, &options.injected_mounts)
            .iter()
            .map(Mount::canonical)
            .collect();

        let plan = InvocationPlan {
            image,
            workspace_folder,
            workspace_mount,
            environment: config
                .container_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ports,
            mounts,
            cap_add: config.cap_add.clone(),
            security_opt: config.security_opt.clone(),
            init: config.init.unwrap_or(false),
            privileged: config.privileged.unwrap_or(false),
            user: config.container_user.clone().filter(|u| !u.is_empty()),
            name: config.name.clone().filter(|n| !n.is_empty()),
            run_args: config.run_args.clone().unwrap_or_default(),
            command: options.command.clone(),
        };

        debug!(
            "Synthesized plan for image {} with {} ports and {} mounts",
            plan.image,
            plan.ports.len(),
            plan.mounts.len()
        );
        Ok(plan)
    }

    /// Check the plan before it is turned into arguments
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(PlanError::NoImageSpecified.into());
        }

        for mount in &self.mounts {
            let tokens: Vec<&str> = mount.split(',').map(str::trim).collect();
            let reason = if !tokens.iter().any(|t| t.starts_with("type=")) {
                Some("missing type")
            } else if !tokens.iter().any(|t| t.starts_with("target=")) {
                Some("missing target")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(PlanError::InvalidMount {
                    mount: mount.clone(),
                    reason: reason.to_string(),
                }
                .into());
            }
        }

        for port in &self.ports {
            validate_port(port)?;
        }

        Ok(())
    }

    /// Serialize to a launch argument vector without validating
    pub fn to_run_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "-it".into()];

        if let Some(name) = &self.name {
            args.extend(["--name".to_string(), name.clone()]);
        }
        if !self.workspace_mount.is_empty() && self.workspace_mount != "none" {
            args.extend(["--mount".to_string(), self.workspace_mount.clone()]);
        }
        args.extend(["-w".to_string(), self.workspace_folder.clone()]);

        for (key, value) in &self.environment {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }
        for port in &self.ports {
            args.extend(["-p".to_string(), port.clone()]);
        }
        args.extend(self.run_args.iter().cloned());
        for mount in &self.mounts {
            args.extend(["--mount".to_string(), mount.clone()]);
        }
        for cap in &self.cap_add {
            args.extend(["--cap-add".to_string(), cap.clone()]);
        }
        for opt in &self.security_opt {
            args.extend(["--security-opt".to_string(), opt.clone()]);
        }
        if self.init {
            args.push("--init".to_string());
        }
        if self.privileged {
            args.push("--privileged".to_string());
        }
        if let Some(user) = &self.user {
            args.extend(["-u".to_string(), user.clone()]);
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }

    /// Validate, then serialize to a launch argument vector
    pub fn validated_run_args(&self) -> Result<Vec<String>> {
        self.validate()?;
        Ok(self.to_run_args())
    }
}

/// `/workspaces/<basename of the workspace root>`
pub fn default_workspace_folder(workspace_root: &Path) -> String {
    let basename = workspace_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", CONTAINER_WORKSPACES_ROOT, basename)
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cwd.join(path))
}
