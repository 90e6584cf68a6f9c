//! Lifecycle commands and lifecycle script rendering
//!
//! A devcontainer descriptor carries six lifecycle hooks. Each hook value is one of
//! three shapes: a single shell line, an argument list, or a named map of
//! sub-commands that may nest further. The shape is decided once, when the document
//! is parsed, and downstream code only ever matches on [`LifecycleCommand`].
//!
//! Hooks can be rendered into a POSIX shell script for a given phase:
//!
//! | phase    | hooks                                                            |
//! |----------|------------------------------------------------------------------|
//! | `create` | initialize, onCreate, updateContent, postCreate                  |
//! | `start`  | postStart                                                        |
//! | `attach` | postAttach                                                       |
//! | unset    | all six, in the order above                                      |

use crate::errors::{LifecycleError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Shell preamble written at the top of every lifecycle script
const SCRIPT_PREAMBLE: &str = "#!/bin/sh\nset -e\n\n";

/// A lifecycle command value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum LifecycleCommand {
    /// A single line executed by a shell
    Shell(String),
    /// An argument vector executed without a shell
    Args(Vec<String>),
    /// Named sub-commands, kept in document order
    Parallel(IndexMap<String, LifecycleCommand>),
}

impl LifecycleCommand {
    /// Convert a raw JSON value into a command
    ///
    /// Arrays must contain only strings; object values must themselves be valid
    /// commands. Any other JSON type is rejected.
    pub fn from_json_value(value: &Value) -> std::result::Result<Self, LifecycleError> {
        match value {
            Value::String(cmd) => Ok(LifecycleCommand::Shell(cmd.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(LifecycleError::InvalidCommand {
                        message: format!(
                            "array element must be a string, got {}",
                            json_type_name(other)
                        ),
                    }),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(LifecycleCommand::Args),
            Value::Object(map) => {
                let mut commands = IndexMap::with_capacity(map.len());
                for (name, nested) in map {
                    let command = Self::from_json_value(nested).map_err(|e| {
                        LifecycleError::InvalidCommand {
                            message: format!("in sub-command '{}': {}", name, e),
                        }
                    })?;
                    commands.insert(name.clone(), command);
                }
                Ok(LifecycleCommand::Parallel(commands))
            }
            other => Err(LifecycleError::InvalidCommand {
                message: format!(
                    "expected string, array of strings or object, got {}",
                    json_type_name(other)
                ),
            }),
        }
    }

    /// Return a copy with `f` applied to every string the command carries
    pub fn map_strings<F>(&self, f: &mut F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        match self {
            LifecycleCommand::Shell(cmd) => LifecycleCommand::Shell(f(cmd)),
            LifecycleCommand::Args(args) => {
                LifecycleCommand::Args(args.iter().map(|a| f(a)).collect())
            }
            LifecycleCommand::Parallel(commands) => LifecycleCommand::Parallel(
                commands
                    .iter()
                    .map(|(name, cmd)| (name.clone(), cmd.map_strings(f)))
                    .collect(),
            ),
        }
    }

    /// Render the command as shell lines
    ///
    /// Argument lists are joined with POSIX quoting. Named sub-commands are emitted
    /// one after another, each preceded by a `# <label>.<name>` comment.
    pub fn to_shell_lines(&self, label: &str) -> Vec<String> {
        match self {
            LifecycleCommand::Shell(cmd) if cmd.is_empty() => Vec::new(),
            LifecycleCommand::Shell(cmd) => vec![cmd.clone()],
            LifecycleCommand::Args(args) if args.is_empty() => Vec::new(),
            LifecycleCommand::Args(args) => vec![shell_words::join(args)],
            LifecycleCommand::Parallel(commands) => {
                let mut lines = Vec::new();
                for (name, cmd) in commands {
                    let nested_label = format!("{}.{}", label, name);
                    lines.push(format!("# {}", nested_label));
                    lines.extend(cmd.to_shell_lines(&nested_label));
                }
                lines
            }
        }
    }
}

impl TryFrom<Value> for LifecycleCommand {
    type Error = LifecycleError;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        Self::from_json_value(&value)
    }
}

impl From<LifecycleCommand> for Value {
    fn from(command: LifecycleCommand) -> Self {
        match command {
            LifecycleCommand::Shell(cmd) => Value::String(cmd),
            LifecycleCommand::Args(args) => {
                Value::Array(args.into_iter().map(Value::String).collect())
            }
            LifecycleCommand::Parallel(commands) => Value::Object(
                commands
                    .into_iter()
                    .map(|(name, cmd)| (name, Value::from(cmd)))
                    .collect(),
            ),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The six lifecycle hooks a descriptor may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    Initialize,
    OnCreate,
    UpdateContent,
    PostCreate,
    PostStart,
    PostAttach,
}

impl LifecycleHook {
    /// All hooks in execution order
    pub const ALL: [LifecycleHook; 6] = [
        LifecycleHook::Initialize,
        LifecycleHook::OnCreate,
        LifecycleHook::UpdateContent,
        LifecycleHook::PostCreate,
        LifecycleHook::PostStart,
        LifecycleHook::PostAttach,
    ];

    /// Descriptor key for this hook
    pub fn key(&self) -> &'static str {
        match self {
            LifecycleHook::Initialize => "initializeCommand",
            LifecycleHook::OnCreate => "onCreateCommand",
            LifecycleHook::UpdateContent => "updateContentCommand",
            LifecycleHook::PostCreate => "postCreateCommand",
            LifecycleHook::PostStart => "postStartCommand",
            LifecycleHook::PostAttach => "postAttachCommand",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Lifecycle hook values of a descriptor, one optional command per hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleHooks {
    pub initialize: Option<LifecycleCommand>,
    pub on_create: Option<LifecycleCommand>,
    pub update_content: Option<LifecycleCommand>,
    pub post_create: Option<LifecycleCommand>,
    pub post_start: Option<LifecycleCommand>,
    pub post_attach: Option<LifecycleCommand>,
}

impl LifecycleHooks {
    /// Get the command declared for a hook
    pub fn get(&self, hook: LifecycleHook) -> Option<&LifecycleCommand> {
        match hook {
            LifecycleHook::Initialize => self.initialize.as_ref(),
            LifecycleHook::OnCreate => self.on_create.as_ref(),
            LifecycleHook::UpdateContent => self.update_content.as_ref(),
            LifecycleHook::PostCreate => self.post_create.as_ref(),
            LifecycleHook::PostStart => self.post_start.as_ref(),
            LifecycleHook::PostAttach => self.post_attach.as_ref(),
        }
    }

    fn slot_mut(&mut self, hook: LifecycleHook) -> &mut Option<LifecycleCommand> {
        match hook {
            LifecycleHook::Initialize => &mut self.initialize,
            LifecycleHook::OnCreate => &mut self.on_create,
            LifecycleHook::UpdateContent => &mut self.update_content,
            LifecycleHook::PostCreate => &mut self.post_create,
            LifecycleHook::PostStart => &mut self.post_start,
            LifecycleHook::PostAttach => &mut self.post_attach,
        }
    }

    /// Set (or clear) the command for a hook
    pub fn set(&mut self, hook: LifecycleHook, command: Option<LifecycleCommand>) {
        *self.slot_mut(hook) = command;
    }

    /// Combine two hook sets; each hook is taken from `overlay` when it defines it
    pub fn merged(base: &Self, overlay: &Self) -> Self {
        let mut result = base.clone();
        for hook in LifecycleHook::ALL {
            if let Some(cmd) = overlay.get(hook) {
                result.set(hook, Some(cmd.clone()));
            }
        }
        result
    }

    /// Return a copy with `f` applied to every string of every hook
    pub fn map_strings<F>(&self, f: &mut F) -> Self
    where
        F: FnMut(&str) -> String,
    {
        let mut result = Self::default();
        for hook in LifecycleHook::ALL {
            result.set(hook, self.get(hook).map(|cmd| cmd.map_strings(f)));
        }
        result
    }

    /// Render the lifecycle script for a phase
    #[instrument(skip_all, fields(phase = %phase))]
    pub fn script(&self, phase: LifecyclePhase) -> String {
        let mut script = String::from(SCRIPT_PREAMBLE);
        for hook in phase.hooks() {
            let Some(cmd) = self.get(*hook) else {
                continue;
            };
            debug!("Rendering {}", hook);
            script.push_str(&format!("# {}\n", hook));
            for line in cmd.to_shell_lines(hook.key()) {
                script.push_str(&line);
                script.push('\n');
            }
            script.push('\n');
        }
        script
    }
}

/// Phase selector for lifecycle script rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Create,
    Start,
    Attach,
    /// No phase given: every hook
    All,
}

impl LifecyclePhase {
    /// Parse an optional phase name; `None` and the empty string select every hook
    pub fn parse(phase: Option<&str>) -> Result<Self> {
        match phase {
            None | Some("") => Ok(LifecyclePhase::All),
            Some(name) => Ok(name.parse()?),
        }
    }

    /// Hooks rendered for this phase, in order
    pub fn hooks(&self) -> &'static [LifecycleHook] {
        match self {
            LifecyclePhase::Create => &LifecycleHook::ALL[..4],
            LifecyclePhase::Start => &LifecycleHook::ALL[4..5],
            LifecyclePhase::Attach => &LifecycleHook::ALL[5..],
            LifecyclePhase::All => &LifecycleHook::ALL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Create => "create",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Attach => "attach",
            LifecyclePhase::All => "all",
        }
    }
}

impl FromStr for LifecyclePhase {
    type Err = LifecycleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create" => Ok(LifecyclePhase::Create),
            "start" => Ok(LifecyclePhase::Start),
            "attach" => Ok(LifecyclePhase::Attach),
            other => Err(LifecycleError::UnknownPhase {
                phase: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
