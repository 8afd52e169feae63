use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn run(args: &[&str]) -> Output {
    run_with_env(args, &[])
}

fn run_with_env(args: &[&str], env: &[(&str, &str)]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xml-report-watcher"))
        .args(args)
        .env_remove("RUST_LOG")
        .envs(env.iter().copied())
        .output()
        .expect("Failed to run xml-report-watcher")
}

#[test]
fn test_cli_help() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--dialect"));
    assert!(stdout.contains("--retry-budget"));
}

#[test]
fn test_cli_lists_dialects() {
    let output = run(&["--list-dialects"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let keys: Vec<&str> = stdout.lines().collect();
    for key in ["junit", "nunit", "testng", "mstest", "ctest", "findBugs", "pmdCpd", "jslint"] {
        assert!(keys.contains(&key), "missing dialect {key}");
    }
}

#[test]
fn test_cli_once_processes_existing_reports() {
    let dir = fixtures_dir().join("junit");
    let output = run(&["--once", "--dialect", "junit", "--format", "json", dir.to_str().unwrap()]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "run failed: {stderr}");

    let summary: serde_json::Value = serde_json::from_str(stdout.lines().last().unwrap())
        .expect("Last line should be the JSON summary");
    assert_eq!(summary["summary"]["files_done"], 1);
    assert_eq!(summary["summary"]["tests"], 3);
    assert_eq!(summary["success"], true);

    let started = stdout
        .lines()
        .filter(|line| line.contains(r#""event":"testStarted""#))
        .count();
    assert_eq!(started, 3);
}

#[test]
fn test_cli_limit_violation_exits_with_failure() {
    let dir = fixtures_dir().join("checkstyle");
    let output = run(&[
        "--once",
        "--dialect",
        "checkstyle",
        "--max-errors",
        "0",
        dir.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Errors limit 0 reached: found 1 error"));
}

#[test]
fn test_cli_rejects_unknown_dialect() {
    let temp_dir = TempDir::new().unwrap();
    let output = run(&["--once", "--dialect", "xunit", temp_dir.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("xunit"));
}

#[test]
fn test_cli_reads_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let reports = temp_dir.path().join("reports");
    fs::create_dir(&reports).unwrap();
    fs::copy(
        fixtures_dir().join("nunit").join("TestResult.xml"),
        reports.join("TestResult.xml"),
    )
    .unwrap();

    let config_path = temp_dir.path().join("watcher.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[watch]
roots = ["{}"]
dialect = "nunit"

[output]
format = "json"
"#,
            reports.display().to_string().replace('\\', "\\\\")
        ),
    )
    .unwrap();

    let output = run(&["--once", "--config", config_path.to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "run failed: {stderr}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let summary: serde_json::Value = serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    assert_eq!(summary["summary"]["tests"], 2);
}

#[test]
fn test_cli_log_level_follows_configured_verbosity() {
    let dir = fixtures_dir().join("junit");
    let args = ["--once", "--dialect", "junit", dir.to_str().unwrap()];

    let verbose = run_with_env(&args, &[("XML_REPORT_VERBOSE", "true")]);
    assert!(verbose.status.success());
    let stderr = String::from_utf8_lossy(&verbose.stderr);
    assert!(stderr.contains("DEBUG"), "no debug logs in: {stderr}");

    let quiet = run_with_env(&args, &[("XML_REPORT_QUIET", "true")]);
    assert!(quiet.status.success());
    let stderr = String::from_utf8_lossy(&quiet.stderr);
    assert!(!stderr.contains("INFO"), "info logs in quiet mode: {stderr}");
}
