//! Descriptor parsing, discovery and `extends` resolution
//!
//! Descriptors are JSON-with-comments documents (comments and trailing commas are
//! accepted, parsed with `json5`). Parsing happens in two steps:
//!
//! 1. The document is deserialized into a loose, camelCase mirror of the file where
//!    every field is optional and unknown keys are collected in document order.
//! 2. That mirror is converted into [`DevContainerConfig`]: the container selector is
//!    inferred, heterogeneous fields are turned into closed variants and structural
//!    rules (at most one selector) are enforced.
//!
//! Serialization goes the other way, so unknown keys, features and customizations
//! survive a load/merge/print cycle.
//!
//! ## Extends resolution
//!
//! [`ConfigLoader::load_with_extends`] follows the `extends` reference of a document,
//! recursively loads the referenced ancestor and merges it as the base with the
//! referencing document as the overlay. Chains may be arbitrarily deep; a reference
//! back to a document already on the chain fails with `ExtendsCycle`.

use crate::errors::{ConfigError, DcplanError, Result};
use crate::lifecycle::{LifecycleCommand, LifecycleHooks};
use crate::merge::ConfigMerger;
use crate::mount::MountSpec;
use crate::ports::PortSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Conventional location of a descriptor below a directory
pub const DEFAULT_CONFIG_SUBPATH: &str = ".devcontainer/devcontainer.json";

/// Descriptor locations probed by discovery, in priority order
const DISCOVERY_CANDIDATES: [&str; 3] = [
    ".devcontainer/devcontainer.json",
    ".devcontainer.json",
    ".devcontainer/.devcontainer.json",
];

/// A value written either as a single item or as a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item.clone()],
            OneOrMany::Many(items) => items.clone(),
        }
    }
}

/// Which kind of container the descriptor asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerSelector {
    /// Prebuilt image reference
    Image(String),
    /// Dockerfile path, from `dockerFile` or `build.dockerfile`
    Dockerfile(String),
    /// Compose files; parsed and carried, never executed
    Compose(Vec<String>),
}

impl ContainerSelector {
    pub fn kind(&self) -> &'static str {
        match self {
            ContainerSelector::Image(_) => "image",
            ContainerSelector::Dockerfile(_) => "dockerfile",
            ContainerSelector::Compose(_) => "compose",
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            ContainerSelector::Image(image) => Some(image),
            _ => None,
        }
    }

    /// True when the selector carries an empty reference
    pub fn is_empty(&self) -> bool {
        match self {
            ContainerSelector::Image(image) => image.is_empty(),
            ContainerSelector::Dockerfile(path) => path.is_empty(),
            ContainerSelector::Compose(files) => files.is_empty(),
        }
    }
}

/// `build` block of a Dockerfile-based descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    #[serde(default, alias = "dockerFile", skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_from: Option<OneOrMany<String>>,
    #[serde(flatten)]
    pub other: IndexMap<String, Value>,
}

/// Host resource amount, written as a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceSpec {
    Number(f64),
    String(String),
}

impl ResourceSpec {
    /// Interpret the value as a positive whole number
    pub fn as_positive_integer(&self) -> Option<u64> {
        match self {
            ResourceSpec::Number(n) if *n >= 1.0 && n.fract() == 0.0 => Some(*n as u64),
            ResourceSpec::Number(_) => None,
            ResourceSpec::String(s) => s.trim().parse::<u64>().ok().filter(|n| *n > 0),
        }
    }
}

/// Minimum host resources the environment expects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<ResourceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Value>,
    #[serde(flatten)]
    pub other: IndexMap<String, Value>,
}

impl HostRequirements {
    /// `cpus`, when given, must be a positive integer
    pub fn validate(&self) -> Result<()> {
        if let Some(cpus) = &self.cpus {
            if cpus.as_positive_integer().is_none() {
                return Err(ConfigError::Validation {
                    message: format!(
                        "hostRequirements.cpus must be a positive integer, got {}",
                        serde_json::to_string(cpus).unwrap_or_default()
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// A parsed devcontainer descriptor
///
/// Every stage of the pipeline takes a descriptor by reference and returns a new one;
/// nothing mutates a descriptor owned by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDevContainerConfig", into = "RawDevContainerConfig")]
pub struct DevContainerConfig {
    /// Reference to an ancestor descriptor; cleared once the chain is resolved
    pub extends: Option<String>,
    pub name: Option<String>,
    pub selector: Option<ContainerSelector>,
    pub build: Option<BuildOptions>,
    /// Compose service to attach to
    pub service: Option<String>,
    pub run_services: Vec<String>,
    pub workspace_folder: Option<String>,
    pub workspace_mount: Option<String>,
    pub container_env: IndexMap<String, String>,
    /// `null` values are kept; they unset a variable in the remote session
    pub remote_env: IndexMap<String, Option<String>>,
    pub container_user: Option<String>,
    pub remote_user: Option<String>,
    pub forward_ports: Vec<PortSpec>,
    pub app_port: Vec<PortSpec>,
    /// `Some(vec![])` is an explicit empty list, distinct from an absent key
    pub run_args: Option<Vec<String>>,
    pub hooks: LifecycleHooks,
    pub mounts: Vec<MountSpec>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub init: Option<bool>,
    pub privileged: Option<bool>,
    pub features: IndexMap<String, Value>,
    pub customizations: Option<Value>,
    pub host_requirements: Option<HostRequirements>,
    /// Top-level keys this model does not name, in document order
    pub other: IndexMap<String, Value>,
}

impl DevContainerConfig {
    /// Parse a JSONC text buffer
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = json5::from_str(text).map_err(|e| ConfigError::Parsing {
            message: format!("JSON parsing error: {}", e),
        })?;
        Self::from_value(value)
    }

    /// Build a descriptor from an already parsed JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ConfigError::Validation {
                message: "Dev container config must contain a JSON object literal.".to_string(),
            }
            .into());
        }

        let raw: RawDevContainerConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Parsing {
                message: e.to_string(),
            })?;
        Ok(Self::try_from(raw)?)
    }

    /// Serialize back to the document shape
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(RawDevContainerConfig::from(self.clone())).map_err(|e| {
            ConfigError::Serialization {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Image reference, when the selector is an image
    pub fn image(&self) -> Option<&str> {
        self.selector.as_ref().and_then(ContainerSelector::image)
    }

    pub fn uses_compose(&self) -> bool {
        matches!(self.selector, Some(ContainerSelector::Compose(_)))
    }
}

/// Loose mirror of the document as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevContainerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(rename = "dockerFile", default, skip_serializing_if = "Option::is_none")]
    docker_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    build: Option<BuildOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    docker_compose_file: Option<OneOrMany<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workspace_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workspace_mount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container_env: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_env: Option<IndexMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forward_ports: Option<Vec<PortSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_port: Option<OneOrMany<PortSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initialize_command: Option<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_create_command: Option<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    update_content_command: Option<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_create_command: Option<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_start_command: Option<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_attach_command: Option<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mounts: Option<Vec<MountSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cap_add: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    security_opt: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    init: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    privileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    customizations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host_requirements: Option<HostRequirements>,
    #[serde(flatten)]
    other: IndexMap<String, Value>,
}

impl TryFrom<RawDevContainerConfig> for DevContainerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawDevContainerConfig) -> std::result::Result<Self, Self::Error> {
        for key in raw.other.keys() {
            debug!("Unknown configuration key '{}' - preserved as-is", key);
        }

        let dockerfile = raw
            .docker_file
            .clone()
            .or_else(|| raw.build.as_ref().and_then(|b| b.dockerfile.clone()));

        let mut selectors = Vec::new();
        if let Some(image) = raw.image {
            selectors.push(ContainerSelector::Image(image));
        }
        if let Some(path) = dockerfile {
            selectors.push(ContainerSelector::Dockerfile(path));
        }
        if let Some(files) = raw.docker_compose_file {
            selectors.push(ContainerSelector::Compose(files.to_vec()));
        }
        if selectors.len() > 1 {
            let kinds: Vec<_> = selectors.iter().map(ContainerSelector::kind).collect();
            return Err(ConfigError::Validation {
                message: format!(
                    "only one container selector may be specified, found: {}",
                    kinds.join(", ")
                ),
            });
        }

        Ok(DevContainerConfig {
            extends: raw.extends,
            name: raw.name,
            selector: selectors.pop(),
            build: raw.build,
            service: raw.service,
            run_services: raw.run_services.unwrap_or_default(),
            workspace_folder: raw.workspace_folder,
            workspace_mount: raw.workspace_mount,
            container_env: raw.container_env.unwrap_or_default(),
            remote_env: raw.remote_env.unwrap_or_default(),
            container_user: raw.container_user,
            remote_user: raw.remote_user,
            forward_ports: raw.forward_ports.unwrap_or_default(),
            app_port: raw.app_port.map(|p| p.to_vec()).unwrap_or_default(),
            run_args: raw.run_args,
            hooks: LifecycleHooks {
                initialize: raw.initialize_command,
                on_create: raw.on_create_command,
                update_content: raw.update_content_command,
                post_create: raw.post_create_command,
                post_start: raw.post_start_command,
                post_attach: raw.post_attach_command,
            },
            mounts: raw.mounts.unwrap_or_default(),
            cap_add: raw.cap_add.unwrap_or_default(),
            security_opt: raw.security_opt.unwrap_or_default(),
            init: raw.init,
            privileged: raw.privileged,
            features: raw.features.unwrap_or_default(),
            customizations: raw.customizations,
            host_requirements: raw.host_requirements,
            other: raw.other,
        })
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn non_empty_map<K, V>(map: IndexMap<K, V>) -> Option<IndexMap<K, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

impl From<DevContainerConfig> for RawDevContainerConfig {
    fn from(config: DevContainerConfig) -> Self {
        let build_dockerfile = config.build.as_ref().and_then(|b| b.dockerfile.clone());
        let (image, docker_file, docker_compose_file) = match config.selector {
            Some(ContainerSelector::Image(image)) => (Some(image), None, None),
            Some(ContainerSelector::Dockerfile(path)) if build_dockerfile.as_ref() == Some(&path) => {
                (None, None, None)
            }
            Some(ContainerSelector::Dockerfile(path)) => (None, Some(path), None),
            Some(ContainerSelector::Compose(files)) => {
                (None, None, Some(OneOrMany::Many(files)))
            }
            None => (None, None, None),
        };
        let hooks = config.hooks;

        RawDevContainerConfig {
            extends: config.extends,
            name: config.name,
            image,
            docker_file,
            build: config.build,
            docker_compose_file,
            service: config.service,
            run_services: non_empty(config.run_services),
            workspace_folder: config.workspace_folder,
            workspace_mount: config.workspace_mount,
            container_env: non_empty_map(config.container_env),
            remote_env: non_empty_map(config.remote_env),
            container_user: config.container_user,
            remote_user: config.remote_user,
            forward_ports: non_empty(config.forward_ports),
            app_port: non_empty(config.app_port).map(OneOrMany::Many),
            run_args: config.run_args,
            initialize_command: hooks.initialize,
            on_create_command: hooks.on_create,
            update_content_command: hooks.update_content,
            post_create_command: hooks.post_create,
            post_start_command: hooks.post_start,
            post_attach_command: hooks.post_attach,
            mounts: non_empty(config.mounts),
            cap_add: non_empty(config.cap_add),
            security_opt: non_empty(config.security_opt),
            init: config.init,
            privileged: config.privileged,
            features: non_empty_map(config.features),
            customizations: config.customizations,
            host_requirements: config.host_requirements,
            other: config.other,
        }
    }
}

/// Configuration loader
///
/// ```rust,no_run
/// use dcplan_core::config::ConfigLoader;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let path = ConfigLoader::discover_config(Path::new("."))?;
/// let config = ConfigLoader::load_with_extends(&path)?;
/// println!("Loaded configuration: {}", config.name.unwrap_or_default());
/// # Ok(())
/// # }
/// ```
pub struct ConfigLoader;

impl ConfigLoader {
    /// Find the descriptor of a workspace
    ///
    /// Probes `.devcontainer/devcontainer.json`, `.devcontainer.json` and
    /// `.devcontainer/.devcontainer.json` in that order. When none exists the error
    /// names the first candidate.
    #[instrument(skip_all, fields(workspace = %workspace.display()))]
    pub fn discover_config(workspace: &Path) -> Result<PathBuf> {
        for candidate in DISCOVERY_CANDIDATES {
            let path = workspace.join(candidate);
            debug!("Checking {}", path.display());
            if path.is_file() {
                debug!("Found configuration at {}", path.display());
                return Ok(path);
            }
        }

        Err(ConfigError::NotFound {
            path: workspace.join(DISCOVERY_CANDIDATES[0]).display().to_string(),
        }
        .into())
    }

    /// Load a single descriptor without following `extends`
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> Result<DevContainerConfig> {
        debug!("Loading configuration from {}", path.display());

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = DevContainerConfig::parse(&content).map_err(|e| match e {
            DcplanError::Config(ConfigError::Parsing { message }) => ConfigError::Parsing {
                message: format!("{}: {}", path.display(), message),
            }
            .into(),
            other => other,
        })?;

        debug!("Loaded configuration with name: {:?}", config.name);
        Ok(config)
    }

    /// Load a descriptor and merge its whole `extends` chain into it
    ///
    /// The result has `extends` cleared.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_with_extends(path: &Path) -> Result<DevContainerConfig> {
        let mut chain = Vec::new();
        let mut config = Self::resolve_extends_chain(path, &mut chain)?;
        config.extends = None;
        Ok(config)
    }

    fn resolve_extends_chain(path: &Path, chain: &mut Vec<PathBuf>) -> Result<DevContainerConfig> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let canonical = path.canonicalize().map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if chain.contains(&canonical) {
            let mut visited: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
            visited.push(canonical.display().to_string());
            return Err(ConfigError::ExtendsCycle {
                chain: visited.join(" -> "),
            }
            .into());
        }

        let config = Self::load_from_path(&canonical)?;
        let reference = match config.extends.as_deref() {
            Some(reference) if !reference.is_empty() => reference.to_string(),
            _ => return Ok(config),
        };

        let document_dir = canonical.parent().unwrap_or_else(|| Path::new("/"));
        let parent_path = Self::resolve_extends_path(&reference, document_dir);
        debug!(
            "Resolving extends '{}' -> {}",
            reference,
            parent_path.display()
        );

        chain.push(canonical);
        let base = Self::resolve_extends_chain(&parent_path, chain)?;
        chain.pop();

        let mut merged = ConfigMerger::merge_two(&base, &config);
        merged.extends = None;
        Ok(merged)
    }

    /// Map an `extends` reference to a descriptor path
    ///
    /// - `file://<dir>` names a directory holding `.devcontainer/devcontainer.json`
    /// - a `.json`/`.jsonc` path names the file itself, relative to `document_dir`
    ///   unless absolute
    /// - anything else names a directory relative to `document_dir`, holding
    ///   `.devcontainer/devcontainer.json`
    pub fn resolve_extends_path(reference: &str, document_dir: &Path) -> PathBuf {
        if let Some(dir) = reference.strip_prefix("file://") {
            return document_dir.join(dir).join(DEFAULT_CONFIG_SUBPATH);
        }
        if reference.ends_with(".json") || reference.ends_with(".jsonc") {
            return document_dir.join(reference);
        }
        document_dir.join(reference).join(DEFAULT_CONFIG_SUBPATH)
    }
}
