//! Check args command implementation
//!
//! Implements `dcplan check-args`: structural validation of a container run
//! argument vector. Prints the image on success.

use anyhow::Result;
use dcplan_core::argv::{extract_image, validate_run_command};
use dcplan_core::errors::PlanError;
use tracing::{debug, instrument};

/// Execute the check-args command
#[instrument(skip_all, fields(count = args.len()))]
pub fn execute_check_args(args: &[String]) -> Result<()> {
    let image = checked_image(args)?;
    debug!("Argument vector is well formed, image {}", image);

    println!("{}", image);
    Ok(())
}

/// Image of a well-formed `run` vector
fn checked_image(args: &[String]) -> Result<String> {
    if args.first().map(String::as_str) != Some("run") {
        return Err(PlanError::InvalidArguments {
            message: "expected a run command".to_string(),
        }
        .into());
    }
    validate_run_command(args)?;
    Ok(extract_image(args)?)
}
