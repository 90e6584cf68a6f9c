//! Launch argument vector inspection
//!
//! Helpers for callers that gate or dry-run an argument vector before handing it to
//! an engine: find the image token, and check that every flag known to take a value
//! is followed by one.

use crate::errors::{PlanError, Result};

/// Flags of `run` that consume the following token as their value
const FLAGS_WITH_VALUES: &[&str] = &[
    "-e",
    "--env",
    "-p",
    "--publish",
    "-v",
    "--volume",
    "-w",
    "--workdir",
    "-u",
    "--user",
    "--name",
    "--mount",
    "--cap-add",
    "--security-opt",
    "--entrypoint",
    "--network",
    "--hostname",
    "--domainname",
    "--mac-address",
    "--ip",
    "--ip6",
    "--link",
    "--label",
    "--log-driver",
    "--log-opt",
    "--memory",
    "--memory-swap",
    "--memory-reservation",
    "--cpus",
    "--cpuset-cpus",
    "--device",
    "--group-add",
    "--pid",
    "--ipc",
    "--restart",
    "--ulimit",
    "--storage-opt",
    "--tmpfs",
    "--health-cmd",
    "--health-interval",
    "--health-retries",
    "--health-timeout",
    "--health-start-period",
];

/// Whether `flag` consumes the next token
pub fn takes_value(flag: &str) -> bool {
    FLAGS_WITH_VALUES.contains(&flag)
}

fn invalid(message: String) -> PlanError {
    PlanError::InvalidArguments { message }
}

/// Walk flags, returning the index of the first positional token
fn first_positional<S: AsRef<str>>(args: &[S], start: usize) -> Result<Option<usize>> {
    let mut i = start;
    while i < args.len() {
        let arg = args[i].as_ref();
        if arg.is_empty() {
            return Err(invalid("empty flag".to_string()).into());
        }
        if !arg.starts_with('-') {
            return Ok(Some(i));
        }
        if takes_value(arg) {
            match args.get(i + 1).map(AsRef::as_ref) {
                Some(value) if !value.starts_with('-') => i += 1,
                _ => return Err(invalid(format!("flag {} requires an argument", arg)).into()),
            }
        }
        i += 1;
    }
    Ok(None)
}

fn skip_subcommand<S: AsRef<str>>(args: &[S]) -> usize {
    match args.first() {
        Some(first) if first.as_ref() == "run" => 1,
        _ => 0,
    }
}

/// Find the image token of a `run` argument vector
///
/// A leading `run` is skipped; flags and the values of value-taking flags are
/// skipped; the first remaining token is the image.
pub fn extract_image<S: AsRef<str>>(args: &[S]) -> Result<String> {
    let start = skip_subcommand(args);
    let mut i = start;
    while i < args.len() {
        let arg = args[i].as_ref();
        if arg.starts_with('-') {
            if takes_value(arg) {
                i += 1;
            }
        } else {
            return Ok(arg.to_string());
        }
        i += 1;
    }
    Err(invalid("image not found in run command".to_string()).into())
}

/// Structural check of an argument vector
///
/// Empty vectors and vectors that do not start with `run` are accepted as-is. A `run`
/// vector must pair every value-taking flag with a non-flag token and must name an
/// image.
pub fn validate_run_command<S: AsRef<str>>(args: &[S]) -> Result<()> {
    match args.first() {
        Some(first) if first.as_ref() == "run" => {}
        _ => return Ok(()),
    }
    match first_positional(args, 1)? {
        Some(_) => Ok(()),
        None => Err(invalid("run command has no image".to_string()).into()),
    }
}

/// Structural check of a bare flag list (no subcommand, no image)
pub fn validate_flags<S: AsRef<str>>(flags: &[S]) -> Result<()> {
    let mut i = 0;
    while i < flags.len() {
        let flag = flags[i].as_ref();
        if flag.is_empty() {
            return Err(invalid("empty flag".to_string()).into());
        }
        if takes_value(flag) {
            match flags.get(i + 1).map(AsRef::as_ref) {
                Some(value) if !value.starts_with('-') => i += 1,
                _ => return Err(invalid(format!("flag {} requires an argument", flag)).into()),
            }
        }
        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DcplanError;

    #[test]
    fn test_extract_image_skips_flag_values() {
        let args = [
            "run", "--rm", "-it", "--name", "dev", "-e", "A=1", "--hostname", "box", "alpine:3",
            "sh",
        ];
        assert_eq!(extract_image(&args).unwrap(), "alpine:3");
    }

    #[test]
    fn test_extract_image_without_run_prefix() {
        assert_eq!(extract_image(&["-p", "80:80", "nginx"]).unwrap(), "nginx");
    }

    #[test]
    fn test_extract_image_missing() {
        let err = extract_image(&["run", "--rm", "-e", "A=1"]).unwrap_err();
        assert!(matches!(err, DcplanError::Plan(PlanError::InvalidArguments { .. })));
    }

    #[test]
    fn test_validate_run_command() {
        assert!(validate_run_command::<&str>(&[]).is_ok());
        assert!(validate_run_command(&["ps", "-a"]).is_ok());
        assert!(validate_run_command(&["run", "-w", "/w", "alpine"]).is_ok());

        let err = validate_run_command(&["run", "--name", "--rm", "alpine"]).unwrap_err();
        assert!(err.to_string().contains("flag --name requires an argument"));

        let err = validate_run_command(&["run", "-e"]).unwrap_err();
        assert!(err.to_string().contains("flag -e requires an argument"));

        assert!(validate_run_command(&["run", "--rm"]).is_err());
    }

    #[test]
    fn test_validate_flags() {
        assert!(validate_flags(&["--init", "--network", "host"]).is_ok());
        assert!(validate_flags(&["--init", ""]).is_err());
        assert!(validate_flags(&["--label"]).is_err());
    }

    #[test]
    fn test_plan_output_passes_validation() {
        use crate::plan::InvocationPlan;

        let plan = InvocationPlan {
            image: "alpine".into(),
            workspace_folder: "/w".into(),
            workspace_mount: "type=bind,source=/h,target=/w".into(),
            user: Some("root".into()),
            ..Default::default()
        };
        let args = plan.to_run_args();
        assert!(validate_run_command(&args).is_ok());
        assert_eq!(extract_image(&args).unwrap(), "alpine");
    }
}
