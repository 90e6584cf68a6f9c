//! Descriptor merge engine
//!
//! Combines a base descriptor with an overlay, overlay winning. The rule depends on
//! the kind of field:
//!
//! - Scalars (strings, booleans, the container selector): the overlay replaces the
//!   base only when it carries a present, non-empty value.
//! - Maps (`containerEnv`, `remoteEnv`, `features`, unknown top-level keys): key-wise
//!   union, overlay value on conflict. `customizations` is merged recursively.
//! - Lists (`capAdd`, `securityOpt`, ports, mounts, `runServices`): a non-empty
//!   overlay list replaces the base list wholesale; lists are never concatenated.
//! - `runArgs`: an overlay that declares the key wins, even with an empty list.
//! - Lifecycle hooks: each hook independently, overlay wins when it defines it.

use crate::config::DevContainerConfig;
use crate::lifecycle::LifecycleHooks;
use indexmap::IndexMap;
use serde_json::Value;
use std::hash::Hash;
use tracing::{debug, instrument};

/// Merges descriptors
pub struct ConfigMerger;

impl ConfigMerger {
    /// Merge two optional descriptors
    ///
    /// A missing side is neutral: the present side is returned unchanged.
    pub fn merge(
        base: Option<&DevContainerConfig>,
        overlay: Option<&DevContainerConfig>,
    ) -> Option<DevContainerConfig> {
        match (base, overlay) {
            (None, None) => None,
            (Some(base), None) => Some(base.clone()),
            (None, Some(overlay)) => Some(overlay.clone()),
            (Some(base), Some(overlay)) => Some(Self::merge_two(base, overlay)),
        }
    }

    /// Merge a sequence of descriptors, first lowest precedence
    #[instrument(skip_all, fields(count = configs.len()))]
    pub fn merge_configs(configs: &[DevContainerConfig]) -> Option<DevContainerConfig> {
        configs
            .iter()
            .fold(None, |acc, config| Self::merge(acc.as_ref(), Some(config)))
    }

    /// Merge `overlay` onto `base` into a new descriptor
    pub fn merge_two(base: &DevContainerConfig, overlay: &DevContainerConfig) -> DevContainerConfig {
        debug!("Merging descriptor {:?} onto {:?}", overlay.name, base.name);

        // A selector of another kind takes the base's build and compose companions with it
        let (selector, companions) = match &overlay.selector {
            Some(selector) if !selector.is_empty() => {
                let switched = base
                    .selector
                    .as_ref()
                    .is_some_and(|b| b.kind() != selector.kind());
                if switched {
                    debug!(
                        "Selector switched to {}, dropping base build and compose settings",
                        selector.kind()
                    );
                }
                (Some(selector.clone()), if switched { overlay } else { base })
            }
            _ => (base.selector.clone(), base),
        };

        DevContainerConfig {
            extends: merge_string(&base.extends, &overlay.extends),
            name: merge_string(&base.name, &overlay.name),
            selector,
            build: overlay.build.clone().or_else(|| companions.build.clone()),
            service: merge_string(&companions.service, &overlay.service),
            run_services: merge_list(&companions.run_services, &overlay.run_services),
            workspace_folder: merge_string(&base.workspace_folder, &overlay.workspace_folder),
            workspace_mount: merge_string(&base.workspace_mount, &overlay.workspace_mount),
            container_env: merge_maps(&base.container_env, &overlay.container_env),
            remote_env: merge_maps(&base.remote_env, &overlay.remote_env),
            container_user: merge_string(&base.container_user, &overlay.container_user),
            remote_user: merge_string(&base.remote_user, &overlay.remote_user),
            forward_ports: merge_list(&base.forward_ports, &overlay.forward_ports),
            app_port: merge_list(&base.app_port, &overlay.app_port),
            run_args: overlay.run_args.clone().or_else(|| base.run_args.clone()),
            hooks: LifecycleHooks::merged(&base.hooks, &overlay.hooks),
            mounts: merge_list(&base.mounts, &overlay.mounts),
            cap_add: merge_list(&base.cap_add, &overlay.cap_add),
            security_opt: merge_list(&base.security_opt, &overlay.security_opt),
            init: overlay.init.or(base.init),
            privileged: overlay.privileged.or(base.privileged),
            features: merge_maps(&base.features, &overlay.features),
            customizations: match (&base.customizations, &overlay.customizations) {
                (Some(b), Some(o)) => Some(merge_json_objects(b, o)),
                (b, o) => o.clone().or_else(|| b.clone()),
            },
            host_requirements: overlay
                .host_requirements
                .clone()
                .or_else(|| base.host_requirements.clone()),
            other: merge_maps(&base.other, &overlay.other),
        }
    }
}

fn merge_string(base: &Option<String>, overlay: &Option<String>) -> Option<String> {
    match overlay {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => base.clone(),
    }
}

fn merge_list<T: Clone>(base: &[T], overlay: &[T]) -> Vec<T> {
    if overlay.is_empty() {
        base.to_vec()
    } else {
        overlay.to_vec()
    }
}

fn merge_maps<K, V>(base: &IndexMap<K, V>, overlay: &IndexMap<K, V>) -> IndexMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    let mut result = base.clone();
    for (key, value) in overlay {
        result.insert(key.clone(), value.clone());
    }
    result
}

/// Recursively merge two JSON values; objects merge key-wise, anything else is replaced
pub fn merge_json_objects(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            let mut result = base_obj.clone();
            for (key, value) in overlay_obj {
                let merged = match result.get(key) {
                    Some(existing) => merge_json_objects(existing, value),
                    None => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        (_, overlay) => overlay.clone(),
    }
}
