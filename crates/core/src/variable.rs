//! Variable substitution engine
//!
//! Expands workspace placeholders and host-environment references in every
//! string-bearing field of a descriptor.
//!
//! ## Supported Variables
//!
//! - `${localWorkspaceFolder}` / `$localWorkspaceFolder` - absolute workspace root on the host
//! - `${localWorkspaceFolderBasename}` - its last path component
//! - `${containerWorkspaceFolder}` - workspace path inside the container
//! - `${containerWorkspaceFolderBasename}` - its last path component
//! - `${localEnv:NAME}` / `${localEnv:NAME:default}` - host environment variable
//!
//! Well-known names are replaced longest name first, so `$localWorkspaceFolderBasename`
//! is never clobbered by the shorter `$localWorkspaceFolder`.
//!
//! A `localEnv` reference resolves to the host value when it is set and non-empty,
//! otherwise to its default when one is written (an empty default counts). References
//! with neither are left in place and recorded as missing. Substitution always runs
//! over the whole descriptor first; only then does a non-empty missing list fail the
//! call, with every name listed once in first-seen order.

use crate::config::DevContainerConfig;
use crate::errors::{ConfigError, PlanError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// `${localEnv:NAME}` or `${localEnv:NAME:default}`
static LOCAL_ENV_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{localEnv:([^}:]+)(?::([^}]*))?\}").expect("Valid regex pattern")
});

/// Parent directory of the default container workspace folder
pub const CONTAINER_WORKSPACES_ROOT: &str = "/workspaces";

/// Host environment lookup
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Values available to substitution
#[derive(Clone)]
pub struct VariableContext {
    pub local_workspace_folder: String,
    pub local_workspace_folder_basename: String,
    pub container_workspace_folder: String,
    pub container_workspace_folder_basename: String,
    env_lookup: EnvLookup,
}

impl fmt::Debug for VariableContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableContext")
            .field("local_workspace_folder", &self.local_workspace_folder)
            .field("container_workspace_folder", &self.container_workspace_folder)
            .finish_non_exhaustive()
    }
}

impl VariableContext {
    /// Create a context for a workspace root, reading the process environment
    ///
    /// Relative roots are made absolute against the current directory. The path is
    /// not canonicalized, so symlinked workspaces keep the path the caller used.
    ///
    /// ```rust
    /// use dcplan_core::variable::VariableContext;
    /// use std::path::Path;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let context = VariableContext::new(Path::new("/home/u/app"))?;
    /// assert_eq!(context.container_workspace_folder, "/workspaces/app");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(workspace_root: &Path) -> Result<Self> {
        let absolute = if workspace_root.is_absolute() {
            workspace_root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| ConfigError::Io {
                    path: workspace_root.to_path_buf(),
                    source,
                })?
                .join(workspace_root)
        };
        Ok(Self::from_absolute(&absolute))
    }

    fn from_absolute(root: &Path) -> Self {
        let local_workspace_folder = root.display().to_string();
        let basename = basename(root);
        let container_workspace_folder = format!("{}/{}", CONTAINER_WORKSPACES_ROOT, basename);

        Self {
            local_workspace_folder,
            local_workspace_folder_basename: basename.clone(),
            container_workspace_folder,
            container_workspace_folder_basename: basename,
            env_lookup: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }

    /// Replace the host environment lookup
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Arc::new(lookup);
        self
    }

    /// Use a fixed map as the host environment
    pub fn with_env_map(self, env: HashMap<String, String>) -> Self {
        self.with_env_lookup(move |name| env.get(name).cloned())
    }

    /// Override the container workspace folder (and its basename)
    pub fn with_container_workspace_folder(mut self, folder: impl Into<String>) -> Self {
        let folder = folder.into();
        self.container_workspace_folder_basename = basename(Path::new(&folder));
        self.container_workspace_folder = folder;
        self
    }

    /// Look up a host environment variable
    pub fn local_env(&self, name: &str) -> Option<String> {
        (self.env_lookup)(name)
    }

    /// Well-known variables, longest name first
    fn well_known(&self) -> [(&'static str, &str); 4] {
        [
            (
                "containerWorkspaceFolderBasename",
                &self.container_workspace_folder_basename,
            ),
            (
                "localWorkspaceFolderBasename",
                &self.local_workspace_folder_basename,
            ),
            ("containerWorkspaceFolder", &self.container_workspace_folder),
            ("localWorkspaceFolder", &self.local_workspace_folder),
        ]
    }

    pub fn local_workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.local_workspace_folder)
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Report of variable substitutions performed
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubstitutionReport {
    /// Variable expression to resolved value
    pub replacements: BTreeMap<String, String>,
    /// `localEnv` names that could not be resolved, first-seen order, no duplicates
    pub missing_variables: Vec<String>,
}

impl SubstitutionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_replacement(&mut self, variable: String, value: String) {
        self.replacements.insert(variable, value);
    }

    pub fn add_missing_variable(&mut self, name: &str) {
        if !self.missing_variables.iter().any(|m| m == name) {
            self.missing_variables.push(name.to_string());
        }
    }

    pub fn has_substitutions(&self) -> bool {
        !self.replacements.is_empty()
    }

    pub fn has_missing(&self) -> bool {
        !self.missing_variables.is_empty()
    }
}

/// Variable substitution engine
pub struct VariableSubstitution;

impl VariableSubstitution {
    /// Expand one string
    ///
    /// Unresolvable `localEnv` references stay in the output and are recorded in
    /// `report`.
    pub fn substitute_string(
        input: &str,
        context: &VariableContext,
        report: &mut SubstitutionReport,
    ) -> String {
        if !input.contains('$') {
            return input.to_string();
        }

        let mut result = input.to_string();
        for (name, value) in context.well_known() {
            for token in [format!("${{{}}}", name), format!("${}", name)] {
                if result.contains(&token) {
                    result = result.replace(&token, value);
                    report.add_replacement(name.to_string(), value.to_string());
                }
            }
        }

        LOCAL_ENV_PATTERN
            .replace_all(&result, |caps: &Captures| {
                let name = &caps[1];
                if let Some(value) = context.local_env(name).filter(|v| !v.is_empty()) {
                    report.add_replacement(format!("localEnv:{}", name), value.clone());
                    return value;
                }
                // An empty default counts as no default
                if let Some(default) = caps.get(2).filter(|d| !d.as_str().is_empty()) {
                    report.add_replacement(format!("localEnv:{}", name), default.as_str().to_string());
                    return default.as_str().to_string();
                }
                debug!("Unresolved localEnv variable: {}", name);
                report.add_missing_variable(name);
                caps[0].to_string()
            })
            .into_owned()
    }
}

impl DevContainerConfig {
    /// Expand variables across the descriptor
    ///
    /// Covers the workspace folder and mount, environment values, mounts (string form
    /// or source and target), every lifecycle hook and the extra run arguments.
    /// Returns a new descriptor; fails with `UnresolvedVariable` when any `localEnv`
    /// reference could not be resolved anywhere.
    #[instrument(skip_all, fields(workspace = %context.local_workspace_folder))]
    pub fn apply_variable_substitution(
        &self,
        context: &VariableContext,
    ) -> Result<(DevContainerConfig, SubstitutionReport)> {
        let mut report = SubstitutionReport::new();
        let mut expand = |s: &str| VariableSubstitution::substitute_string(s, context, &mut report);

        let mut expanded = self.clone();
        expanded.workspace_folder = self.workspace_folder.as_deref().map(&mut expand);
        expanded.workspace_mount = self.workspace_mount.as_deref().map(&mut expand);
        expanded.container_env = self
            .container_env
            .iter()
            .map(|(k, v)| (k.clone(), expand(v)))
            .collect();
        expanded.remote_env = self
            .remote_env
            .iter()
            .map(|(k, v)| (k.clone(), v.as_deref().map(&mut expand)))
            .collect();
        expanded.mounts = self
            .mounts
            .iter()
            .map(|m| m.map_strings(&mut expand))
            .collect();
        expanded.hooks = self.hooks.map_strings(&mut expand);
        expanded.run_args = self
            .run_args
            .as_ref()
            .map(|args| args.iter().map(|a| expand(a)).collect());

        if report.has_missing() {
            return Err(PlanError::UnresolvedVariable {
                names: report.missing_variables,
            }
            .into());
        }

        debug!(
            "Variable substitution complete with {} replacements",
            report.replacements.len()
        );
        Ok((expanded, report))
    }
}
