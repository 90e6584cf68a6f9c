//! CLI integration tests for dcplan subcommands

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_descriptor(workspace: &Path, content: &str) -> Result<()> {
    let dir = workspace.join(".devcontainer");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("devcontainer.json"), content)?;
    Ok(())
}

fn dcplan(workspace: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("dcplan")?;
    cmd.arg("--workspace-folder").arg(workspace);
    Ok(cmd)
}

#[test]
fn test_help_output() -> Result<()> {
    Command::cargo_bin("dcplan")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Devcontainer invocation planner"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("read-configuration"))
        .stdout(predicate::str::contains("lifecycle-script"))
        .stdout(predicate::str::contains("check-args"));
    Ok(())
}

#[test]
fn test_version_output() -> Result<()> {
    Command::cargo_bin("dcplan")?
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "dcplan {}",
            env!("CARGO_PKG_VERSION")
        )));
    Ok(())
}

#[test]
fn test_plan_json_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(
        temp_dir.path(),
        r#"{
            // comments are accepted
            "image": "ubuntu:22.04",
            "forwardPorts": [8080],
            "containerEnv": {"WS": "${containerWorkspaceFolder}"},
        }"#,
    )?;

    let output = dcplan(temp_dir.path())?.arg("plan").output()?;
    assert!(output.status.success());
    let plan: Value = serde_json::from_slice(&output.stdout)?;

    let basename = temp_dir
        .path()
        .file_name()
        .expect("temp dir has a name")
        .to_string_lossy()
        .to_string();
    let expected_folder = format!("/workspaces/{}", basename);
    assert_eq!(plan["image"], "ubuntu:22.04");
    assert_eq!(plan["workspaceFolder"], expected_folder.as_str());
    assert_eq!(plan["environment"]["WS"], expected_folder.as_str());
    assert_eq!(plan["ports"], serde_json::json!(["8080:8080"]));
    Ok(())
}

#[test]
fn test_plan_args_output_with_injection_and_command() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(
        temp_dir.path(),
        r#"{
            "image": "alpine",
            "mounts": [{"type": "volume", "source": "declared", "target": "/data"}]
        }"#,
    )?;

    dcplan(temp_dir.path())?
        .args([
            "plan",
            "--format",
            "args",
            "--mount",
            "type=bind,source=/host/data,target=/data,readonly",
            "--app-port",
            "3000",
            "--",
            "sleep",
            "infinity",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("run\n--rm\n-it\n"))
        .stdout(predicate::str::contains(
            "--mount\ntype=bind,source=/host/data,target=/data,readonly\n",
        ))
        .stdout(predicate::str::contains("source=declared").not())
        .stdout(predicate::str::contains("-p\n3000:3000\n"))
        .stdout(predicate::str::ends_with("alpine\nsleep\ninfinity\n"));
    Ok(())
}

#[test]
fn test_plan_with_explicit_config_path() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("custom.json");
    fs::write(&config, r#"{"image": "debian:12"}"#)?;

    dcplan(temp_dir.path())?
        .arg("--config")
        .arg(&config)
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"image\": \"debian:12\""));
    Ok(())
}

#[test]
fn test_plan_without_image_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(temp_dir.path(), r#"{"name": "no image"}"#)?;

    dcplan(temp_dir.path())?
        .arg("plan")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No image specified"));
    Ok(())
}

#[test]
fn test_plan_unresolved_local_env_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(
        temp_dir.path(),
        r#"{"image": "alpine", "containerEnv": {"TOKEN": "${localEnv:DCPLAN_TEST_UNSET_TOKEN}"}}"#,
    )?;

    dcplan(temp_dir.path())?
        .env_remove("DCPLAN_TEST_UNSET_TOKEN")
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DCPLAN_TEST_UNSET_TOKEN"));
    Ok(())
}

#[test]
fn test_plan_reads_host_environment() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(
        temp_dir.path(),
        r#"{"image": "alpine", "containerEnv": {"TOKEN": "${localEnv:DCPLAN_TEST_SET_TOKEN}"}}"#,
    )?;

    dcplan(temp_dir.path())?
        .env("DCPLAN_TEST_SET_TOKEN", "s3cret")
        .args(["plan", "--format", "args"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-e\nTOKEN=s3cret\n"));
    Ok(())
}

#[test]
fn test_missing_descriptor_names_first_candidate() -> Result<()> {
    let temp_dir = TempDir::new()?;

    dcplan(temp_dir.path())?
        .arg("read-configuration")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"))
        .stderr(predicate::str::contains(".devcontainer/devcontainer.json"));
    Ok(())
}

#[test]
fn test_read_configuration_merges_extends() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("base.json"),
        r#"{"image": "node:20", "containerEnv": {"BASE": "1", "LEVEL": "base"}}"#,
    )?;
    write_descriptor(
        temp_dir.path(),
        r#"{"extends": "../base.json", "containerEnv": {"LEVEL": "leaf"}, "shutdownAction": "none"}"#,
    )?;

    let output = dcplan(temp_dir.path())?
        .arg("read-configuration")
        .output()?;
    assert!(output.status.success());
    let config: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(config["image"], "node:20");
    assert_eq!(config["containerEnv"]["BASE"], "1");
    assert_eq!(config["containerEnv"]["LEVEL"], "leaf");
    assert_eq!(config["shutdownAction"], "none");
    assert!(config.get("extends").is_none());
    Ok(())
}

#[test]
fn test_lifecycle_script_phase() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(
        temp_dir.path(),
        r#"{
            "image": "alpine",
            "onCreateCommand": ["npm", "ci"],
            "postStartCommand": "echo started in ${containerWorkspaceFolder}"
        }"#,
    )?;

    dcplan(temp_dir.path())?
        .args(["lifecycle-script", "--phase", "create"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#!/bin/sh\nset -e\n\n"))
        .stdout(predicate::str::contains("# onCreateCommand\nnpm ci\n"))
        .stdout(predicate::str::contains("postStartCommand").not());

    dcplan(temp_dir.path())?
        .arg("lifecycle-script")
        .assert()
        .success()
        .stdout(predicate::str::contains("echo started in /workspaces/"));
    Ok(())
}

#[test]
fn test_lifecycle_script_unknown_phase() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(temp_dir.path(), r#"{"image": "alpine"}"#)?;

    dcplan(temp_dir.path())?
        .args(["lifecycle-script", "--phase", "teardown"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unknown phase: teardown"));
    Ok(())
}

#[test]
fn test_check_args_prints_image() -> Result<()> {
    Command::cargo_bin("dcplan")?
        .args([
            "check-args", "run", "--rm", "-it", "-e", "A=1", "--name", "dev", "alpine:3", "sh",
        ])
        .assert()
        .success()
        .stdout("alpine:3\n");
    Ok(())
}

#[test]
fn test_check_args_rejects_missing_image() -> Result<()> {
    Command::cargo_bin("dcplan")?
        .args(["check-args", "run", "--rm", "-e", "A=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid arguments"));
    Ok(())
}

#[test]
fn test_json_log_format_keeps_stdout_clean() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(temp_dir.path(), r#"{"image": "alpine"}"#)?;

    let output = dcplan(temp_dir.path())?
        .env_remove("DCPLAN_LOG")
        .env_remove("RUST_LOG")
        .args(["--log-format", "json", "--log-level", "debug", "plan"])
        .output()?;
    assert!(output.status.success());
    let plan: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(plan["image"], "alpine");

    let stderr = String::from_utf8(output.stderr)?;
    let first_line = stderr.lines().next().unwrap_or_default();
    assert!(first_line.starts_with('{'), "expected JSON logs, got: {}", first_line);
    Ok(())
}

#[test]
fn test_dcplan_log_environment_variable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_descriptor(temp_dir.path(), r#"{"image": "alpine", "waitFor": "postCreateCommand"}"#)?;

    dcplan(temp_dir.path())?
        .env("DCPLAN_LOG", "dcplan_core=debug")
        .arg("read-configuration")
        .assert()
        .success()
        .stderr(predicate::str::contains("Found configuration at"))
        .stderr(predicate::str::contains(
            "Unknown configuration key 'waitFor' - preserved as-is",
        ));
    Ok(())
}

#[test]
fn test_check_args_rejects_non_run_command() -> Result<()> {
    Command::cargo_bin("dcplan")?
        .args(["check-args", "ps", "-a"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("expected a run command"));
    Ok(())
}
