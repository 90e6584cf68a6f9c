//! Port specification parsing and normalization
//!
//! Descriptors list ports either as bare numbers (`3000`) or as explicit mapping
//! strings (`"8000:3000"`). Everything is normalized to `host:container` before it
//! reaches the invocation plan; a bare number maps onto itself.

use crate::errors::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Port specification that can be either a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Bare container port
    Number(u16),
    /// Mapping such as `"8000:3000"`, or a bare port written as a string
    String(String),
}

impl PortSpec {
    /// Normalized `host:container` form
    ///
    /// Numbers duplicate themselves as the host port. Strings pass through untouched;
    /// their shape is checked by [`validate_port`].
    pub fn normalized(&self) -> String {
        match self {
            PortSpec::Number(port) => format!("{}:{}", port, port),
            PortSpec::String(s) => s.clone(),
        }
    }

    /// Apply `f` to a string spec; numbers are returned as-is
    pub fn map_strings<F>(&self, f: &mut F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        match self {
            PortSpec::Number(port) => PortSpec::Number(*port),
            PortSpec::String(s) => PortSpec::String(f(s)),
        }
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        PortSpec::Number(port)
    }
}

impl From<&str> for PortSpec {
    fn from(spec: &str) -> Self {
        match spec.parse::<u16>() {
            Ok(port) => PortSpec::Number(port),
            Err(_) => PortSpec::String(spec.to_string()),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Number(port) => write!(f, "{}", port),
            PortSpec::String(s) => f.write_str(s),
        }
    }
}

/// Collect the ports of a plan in precedence order
///
/// Sources are consumed in order: declared app ports, then the caller-supplied
/// app port override, then forwarded ports. The first occurrence of a normalized
/// port wins and later duplicates are dropped.
pub fn collect_ports(
    app_ports: &[PortSpec],
    app_port_override: &[PortSpec],
    forward_ports: &[PortSpec],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ports = Vec::new();

    for spec in app_ports
        .iter()
        .chain(app_port_override)
        .chain(forward_ports)
    {
        let normalized = spec.normalized();
        if seen.insert(normalized.clone()) {
            ports.push(normalized);
        } else {
            debug!("Dropping duplicate port {}", normalized);
        }
    }

    ports
}

/// Check a normalized port string
///
/// A string without a colon must be an integer; a string with one colon is a
/// `host:container` pair. More than one colon is rejected.
pub fn validate_port(port: &str) -> std::result::Result<(), PlanError> {
    let invalid = || PlanError::InvalidPort {
        port: port.to_string(),
    };
    match port.matches(':').count() {
        0 => port.parse::<u32>().map(|_| ()).map_err(|_| invalid()),
        1 => Ok(()),
        _ => Err(invalid()),
    }
}
