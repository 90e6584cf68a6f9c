//! CLI argument parsing and dispatch

use crate::commands;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use dcplan_core::logging::LOG_FILTER_ENV;
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// How `plan` prints its result
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PlanFormat {
    /// The plan as a JSON object
    Json,
    /// The container run argument vector, one token per line
    Args,
}

#[derive(Parser, Debug)]
#[command(
    name = "dcplan",
    version,
    about = "Devcontainer invocation planner",
    long_about = "Devcontainer invocation planner\n\nResolves a devcontainer.json descriptor (with extends inheritance and variable expansion) into a validated container run plan.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via DCPLAN_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level (ignored when DCPLAN_LOG or RUST_LOG is set)
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Workspace folder path (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub workspace_folder: Option<PathBuf>,

    /// Configuration file path (skips discovery)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the descriptor into a validated container run plan
    Plan {
        /// Mount to inject, replacing any declared mount with the same target
        /// (type=<kind>,source=<src>,target=<dst>[,readonly])
        #[arg(long = "mount", value_name = "SPEC")]
        mounts: Vec<String>,

        /// App port to publish in addition to the descriptor's appPort
        #[arg(long = "app-port", value_name = "PORT")]
        app_ports: Vec<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: PlanFormat,

        /// Command to run in the container
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Print the merged and variable-expanded descriptor as JSON
    ReadConfiguration,
    /// Print the lifecycle script of the descriptor
    LifecycleScript {
        /// Restrict the script to one phase (create, start, attach)
        #[arg(long)]
        phase: Option<String>,
    },
    /// Validate a container run argument vector and print its image
    CheckArgs {
        /// Arguments, e.g. `run --rm -it -e A=1 alpine sh`
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "ARGS"
        )]
        args: Vec<String>,
    },
}

/// Options shared by every subcommand
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Workspace folder path
    pub workspace_folder: Option<PathBuf>,
    /// Configuration file path
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Json) => Some("json"),
            Some(LogFormat::Text) => Some("text"),
            None => None,
        };

        let log_level = self.log_level.as_str();
        if std::env::var_os(LOG_FILTER_ENV).is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                LOG_FILTER_ENV,
                format!("dcplan={},dcplan_core={}", log_level, log_level),
            );
        }
        dcplan_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let context = CliContext {
            workspace_folder: self.workspace_folder,
            config: self.config,
        };

        match self.command {
            Commands::Plan {
                mounts,
                app_ports,
                format,
                command,
            } => commands::plan::execute_plan(commands::plan::PlanArgs {
                context,
                mounts,
                app_ports,
                format,
                command,
            }),
            Commands::ReadConfiguration => {
                commands::read_configuration::execute_read_configuration(context)
            }
            Commands::LifecycleScript { phase } => {
                commands::lifecycle_script::execute_lifecycle_script(
                    commands::lifecycle_script::LifecycleScriptArgs { context, phase },
                )
            }
            Commands::CheckArgs { args } => commands::check_args::execute_check_args(&args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_flags_parse() {
        let cli = Cli::try_parse_from([
            "dcplan",
            "--workspace-folder",
            "/w/app",
            "plan",
            "--mount",
            "type=bind,source=/a,target=/b",
            "--app-port",
            "3000",
            "--format",
            "args",
            "--",
            "sleep",
            "infinity",
        ])
        .unwrap();

        assert_eq!(cli.workspace_folder, Some(PathBuf::from("/w/app")));
        match cli.command {
            Commands::Plan {
                mounts,
                app_ports,
                format,
                command,
            } => {
                assert_eq!(mounts, vec!["type=bind,source=/a,target=/b"]);
                assert_eq!(app_ports, vec!["3000"]);
                assert_eq!(format, PlanFormat::Args);
                assert_eq!(command, vec!["sleep", "infinity"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_args_accepts_hyphen_values() {
        let cli = Cli::try_parse_from(["dcplan", "check-args", "run", "--rm", "-e", "A=1", "alpine"])
            .unwrap();
        match cli.command {
            Commands::CheckArgs { args } => {
                assert_eq!(args, vec!["run", "--rm", "-e", "A=1", "alpine"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dcplan",
            "read-configuration",
            "--config",
            "/tmp/dc.json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/dc.json")));
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
    }

    #[test]
    fn test_check_args_requires_arguments() {
        assert!(Cli::try_parse_from(["dcplan", "check-args"]).is_err());
    }
}
