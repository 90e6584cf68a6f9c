//! Command implementations
//!
//! One module per subcommand, plus the workspace and descriptor location rules
//! they share.

pub mod check_args;
pub mod lifecycle_script;
pub mod plan;
pub mod read_configuration;
pub mod shared;
