//! Mount parsing, canonicalization and injection
//!
//! Descriptors declare mounts in two surface encodings:
//!
//! 1. A comma-joined key=value string: `type=bind,source=/host,target=/work,readonly`
//! 2. A structured object: `{"type": "volume", "source": "cache", "target": "/cache"}`
//!
//! Both normalize to one canonical string, `type=<kind>[,source=<s>],target=<t>[,readonly]`.
//! Options the canonical form does not model (`consistency=cached`, `volume-opt=...`)
//! are carried over verbatim after the canonical part.
//!
//! ## Injection
//!
//! Callers may supply mounts that must exist regardless of what the descriptor says.
//! [`inject_mounts`] removes every declared mount whose target matches an injected
//! mount, keeps the remaining declared mounts in order, and appends the injected ones.
//!
//! ```rust
//! use dcplan_core::mount::{inject_mounts, Mount};
//!
//! # fn example() -> Result<(), dcplan_core::errors::PlanError> {
//! let declared = vec![
//!     "type=volume,source=old,target=/data".parse::<Mount>()?,
//!     "type=bind,source=/src,target=/src".parse::<Mount>()?,
//! ];
//! let injected = vec!["type=volume,source=new,target=/data".parse::<Mount>()?];
//!
//! let mounts = inject_mounts(declared, &injected);
//! assert_eq!(mounts[0].to_string(), "type=bind,source=/src,target=/src");
//! assert_eq!(mounts[1].to_string(), "type=volume,source=new,target=/data");
//! # Ok(())
//! # }
//! ```

use crate::errors::PlanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Kinds of mounts a descriptor may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host directory bound into the container
    Bind,
    /// Named engine volume
    Volume,
    /// In-memory filesystem
    Tmpfs,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Bind => "bind",
            MountKind::Volume => "volume",
            MountKind::Tmpfs => "tmpfs",
        }
    }
}

impl FromStr for MountKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bind" => Ok(MountKind::Bind),
            "volume" => Ok(MountKind::Volume),
            "tmpfs" => Ok(MountKind::Tmpfs),
            other => Err(format!(
                "unsupported mount type '{}', expected bind, volume or tmpfs",
                other
            )),
        }
    }
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub kind: MountKind,
    /// Host path or volume name; absent for anonymous volumes and tmpfs
    pub source: Option<String>,
    /// Path inside the container
    pub target: String,
    pub read_only: bool,
    /// Unmodelled `key=value` or bare options, in declaration order
    pub extra_options: Vec<String>,
}

impl Mount {
    pub fn new(kind: MountKind, source: Option<String>, target: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            target: target.into(),
            read_only: false,
            extra_options: Vec::new(),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Canonical textual form
    pub fn canonical(&self) -> String {
        let mut parts = vec![format!("type={}", self.kind)];
        if let Some(source) = self.source.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("source={}", source));
        }
        parts.push(format!("target={}", self.target));
        if self.read_only {
            parts.push("readonly".to_string());
        }
        parts.extend(self.extra_options.iter().cloned());
        parts.join(",")
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Mount {
    type Err = PlanError;

    /// Parse the comma-joined `key=value` mount syntax
    fn from_str(spec: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |reason: &str| PlanError::InvalidMount {
            mount: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut kind = None;
        let mut source = None;
        let mut target = None;
        let mut read_only = false;
        let mut extra_options = Vec::new();

        for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (token, None),
            };

            match (key, value) {
                ("type", Some(v)) => {
                    kind = Some(MountKind::from_str(v).map_err(|reason| invalid(&reason))?)
                }
                ("source" | "src", Some(v)) => source = Some(v.to_string()),
                ("target" | "dst" | "destination", Some(v)) => target = Some(v.to_string()),
                ("readonly" | "ro", None) => read_only = true,
                ("readonly" | "ro", Some(v)) => read_only = matches!(v, "true" | "1"),
                _ => extra_options.push(token.to_string()),
            }
        }

        let kind = kind.ok_or_else(|| invalid("missing type"))?;
        let target = target
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("missing target"))?;

        Ok(Mount {
            kind,
            source,
            target,
            read_only,
            extra_options,
        })
    }
}

/// Structured mount object as written in a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuredMount {
    /// Mount kind; `bind` when omitted
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(
        rename = "readOnly",
        alias = "readonly",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub read_only: Option<bool>,
}

/// A mount entry before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MountSpec {
    Text(String),
    Structured(StructuredMount),
}

impl MountSpec {
    /// Normalize into a [`Mount`]
    pub fn to_mount(&self) -> std::result::Result<Mount, PlanError> {
        match self {
            MountSpec::Text(spec) => spec.parse(),
            MountSpec::Structured(structured) => {
                let describe = || serde_json::to_string(structured).unwrap_or_default();
                let kind = match structured.kind.as_deref() {
                    None | Some("") => MountKind::Bind,
                    Some(k) => MountKind::from_str(k).map_err(|reason| PlanError::InvalidMount {
                        mount: describe(),
                        reason,
                    })?,
                };
                let target = structured
                    .target
                    .clone()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| PlanError::InvalidMount {
                        mount: describe(),
                        reason: "missing target".to_string(),
                    })?;

                Ok(Mount::new(kind, structured.source.clone(), target)
                    .read_only(structured.read_only.unwrap_or(false)))
            }
        }
    }

    /// Return a copy with `f` applied to the string form, or to source and target
    pub fn map_strings<F>(&self, f: &mut F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        match self {
            MountSpec::Text(spec) => MountSpec::Text(f(spec)),
            MountSpec::Structured(structured) => MountSpec::Structured(StructuredMount {
                kind: structured.kind.clone(),
                source: structured.source.as_deref().map(|s| f(s)),
                target: structured.target.as_deref().map(|t| f(t)),
                read_only: structured.read_only,
            }),
        }
    }
}

impl From<Mount> for MountSpec {
    fn from(mount: Mount) -> Self {
        MountSpec::Text(mount.canonical())
    }
}

/// Normalize declared mount entries in order
pub fn normalize_mounts(specs: &[MountSpec]) -> std::result::Result<Vec<Mount>, PlanError> {
    specs.iter().map(MountSpec::to_mount).collect()
}

/// Replace declared mounts by target with injected ones
///
/// Declared mounts whose target matches any injected target are dropped; the rest
/// keep their relative order and the injected mounts follow them.
pub fn inject_mounts(declared: Vec<Mount>, injected: &[Mount]) -> Vec<Mount> {
    let mut result: Vec<Mount> = declared
        .into_iter()
        .filter(|mount| {
            let replaced = injected.iter().any(|i| i.target == mount.target);
            if replaced {
                debug!("Replacing declared mount at {} with injected mount", mount.target);
            }
            !replaced
        })
        .collect();
    result.extend(injected.iter().cloned());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_mount() {
        let mount: Mount = "type=bind,source=/host/path,target=/container/path"
            .parse()
            .unwrap();
        assert_eq!(mount.kind, MountKind::Bind);
        assert_eq!(mount.source.as_deref(), Some("/host/path"));
        assert_eq!(mount.target, "/container/path");
        assert!(!mount.read_only);
    }

    #[test]
    fn test_parse_aliases_and_readonly() {
        let mount: Mount = "type=volume,src=data,dst=/data,ro".parse().unwrap();
        assert_eq!(mount.canonical(), "type=volume,source=data,target=/data,readonly");

        let mount: Mount = "type=bind,source=/a,destination=/b,readonly=false"
            .parse()
            .unwrap();
        assert_eq!(mount.canonical(), "type=bind,source=/a,target=/b");
    }

    #[test]
    fn test_canonical_reorders_and_keeps_extra_options() {
        let mount: Mount = "target=/work,consistency=cached,source=/src,type=bind"
            .parse()
            .unwrap();
        assert_eq!(
            mount.canonical(),
            "type=bind,source=/src,target=/work,consistency=cached"
        );
    }

    #[test]
    fn test_tmpfs_without_source() {
        let mount: Mount = "type=tmpfs,target=/tmp".parse().unwrap();
        assert_eq!(mount.canonical(), "type=tmpfs,target=/tmp");
    }

    #[test]
    fn test_invalid_string_mounts() {
        let err = "source=/a,target=/b".parse::<Mount>().unwrap_err();
        assert!(matches!(err, PlanError::InvalidMount { ref reason, .. } if reason == "missing type"));

        let err = "type=bind,source=/a".parse::<Mount>().unwrap_err();
        assert!(matches!(err, PlanError::InvalidMount { ref reason, .. } if reason == "missing target"));

        let err = "type=nfs,source=/a,target=/b".parse::<Mount>().unwrap_err();
        assert!(err.to_string().contains("unsupported mount type 'nfs'"));
    }

    #[test]
    fn test_structured_mount_normalization() {
        let spec: MountSpec =
            serde_json::from_value(json!({"type": "volume", "source": "cache", "target": "/cache"}))
                .unwrap();
        assert_eq!(
            spec.to_mount().unwrap().canonical(),
            "type=volume,source=cache,target=/cache"
        );

        let spec: MountSpec =
            serde_json::from_value(json!({"source": "/src", "target": "/src", "readonly": true}))
                .unwrap();
        assert_eq!(
            spec.to_mount().unwrap().canonical(),
            "type=bind,source=/src,target=/src,readonly"
        );
    }

    #[test]
    fn test_structured_and_string_agree() {
        let text = MountSpec::Text("type=volume,source=cache,target=/cache,readonly".to_string());
        let structured: MountSpec = serde_json::from_value(json!({
            "type": "volume", "source": "cache", "target": "/cache", "readOnly": true
        }))
        .unwrap();
        assert_eq!(text.to_mount().unwrap(), structured.to_mount().unwrap());
    }

    #[test]
    fn test_structured_mount_missing_target() {
        let spec: MountSpec = serde_json::from_value(json!({"type": "bind", "source": "/a"})).unwrap();
        assert!(matches!(
            spec.to_mount(),
            Err(PlanError::InvalidMount { .. })
        ));
    }

    #[test]
    fn test_map_strings_structured() {
        let spec: MountSpec =
            serde_json::from_value(json!({"type": "bind", "source": "$HOME", "target": "/h"})).unwrap();
        let mapped = spec.map_strings(&mut |s: &str| s.replace("$HOME", "/home/u"));
        assert_eq!(
            mapped.to_mount().unwrap().canonical(),
            "type=bind,source=/home/u,target=/h"
        );
    }

    #[test]
    fn test_inject_mounts_replaces_by_target() {
        let declared = normalize_mounts(&[
            MountSpec::Text("type=bind,source=/a,target=/a".to_string()),
            MountSpec::Text("type=volume,source=old,target=/data".to_string()),
            MountSpec::Text("type=bind,source=/b,target=/b".to_string()),
        ])
        .unwrap();
        let injected = vec![Mount::new(MountKind::Volume, Some("new".to_string()), "/data")];

        let result: Vec<String> = inject_mounts(declared, &injected)
            .iter()
            .map(Mount::canonical)
            .collect();
        assert_eq!(
            result,
            vec![
                "type=bind,source=/a,target=/a",
                "type=bind,source=/b,target=/b",
                "type=volume,source=new,target=/data",
            ]
        );
    }

    #[test]
    fn test_inject_nothing_is_identity() {
        let declared = vec![Mount::new(MountKind::Tmpfs, None, "/tmp")];
        assert_eq!(inject_mounts(declared.clone(), &[]), declared);
    }
}
