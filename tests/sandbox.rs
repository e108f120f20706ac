//! Integration tests for argv assembly and process execution.
//!
//! Argv tests use an always-available validator so they run without
//! bubblewrap installed. Execution tests swap the helper for `/usr/bin/env`
//! with no base arguments or binds, which makes the assembled argv a plain
//! command line that runs on any Linux host.

use std::time::{Duration, Instant};

use serde_json::json;

use bwrap_sandbox::error::{Error, ExecutionError, InvalidArgumentError};
use bwrap_sandbox::process::{ProcessControl, ProcessStatus};
use bwrap_sandbox::sandbox::{RawBind, default_base_args, default_read_only_binds};
use bwrap_sandbox::{BubblewrapSandbox, RunOptions, RunRequest, SandboxConfig};

fn argv_sandbox(config: SandboxConfig) -> BubblewrapSandbox {
    BubblewrapSandbox::new(config.with_binary_validator(|_: &str| true))
}

fn exec_sandbox() -> BubblewrapSandbox {
    BubblewrapSandbox::new(
        SandboxConfig::new()
            .with_binary("/usr/bin/env")
            .with_base_args(Vec::<String>::new())
            .with_read_only_binds(Vec::<String>::new())
            .with_write_binds(Vec::<String>::new()),
    )
}

fn sh(script: &str) -> RunRequest {
    RunRequest::new(["/bin/sh", "-c", script])
}

// =============================================================================
// Argv Layout
// =============================================================================

#[test]
fn test_default_config_layout() {
    let sandbox = argv_sandbox(SandboxConfig::default());
    let argv = sandbox.build(&["/bin/echo", "hi"], &[]).unwrap();

    assert_eq!(argv[0], "/usr/bin/bwrap");
    assert!(argv.iter().any(|a| a == "--unshare-all"));
    assert!(argv.iter().any(|a| a == "--die-with-parent"));
    assert!(!argv.iter().any(|a| a == "--bind"));
    assert_eq!(&argv[argv.len() - 2..], ["/bin/echo", "hi"]);
}

#[test]
fn test_argv_length_formula() {
    let config = SandboxConfig::new()
        .with_read_only_binds(["/usr", "/etc"])
        .with_write_binds(["/srv/out"]);
    let sandbox = argv_sandbox(config);

    let extra = [RawBind::from("/data"), RawBind::spec("/a", "/b", false)];
    let command = ["/bin/ls", "-la", "/data"];
    let argv = sandbox.build(&command, &extra).unwrap();

    let expected = 1 + default_base_args().len() + 3 * 2 + 3 + 3 * 2 + command.len();
    assert_eq!(argv.len(), expected);
}

#[test]
fn test_bind_sections_in_order() {
    let config = SandboxConfig::new()
        .with_base_args(["--unshare-all"])
        .with_read_only_binds(["/usr"])
        .with_write_binds(["/srv/out"]);
    let sandbox = argv_sandbox(config);

    let argv = sandbox
        .build(&["/bin/true"], &[RawBind::from("/data")])
        .unwrap();

    assert_eq!(
        argv,
        [
            "/usr/bin/bwrap",
            "--unshare-all",
            "--ro-bind",
            "/usr",
            "/usr",
            "--bind",
            "/srv/out",
            "/srv/out",
            "--ro-bind",
            "/data",
            "/data",
            "/bin/true",
        ]
    );
}

#[test]
fn test_extra_writable_bind_precedes_command() {
    let sandbox = argv_sandbox(SandboxConfig::default());
    let argv = sandbox
        .build(&["/bin/echo", "hi"], &[RawBind::spec("/tmp/x", "/tmp/x", false)])
        .unwrap();

    let n = argv.len();
    assert_eq!(&argv[n - 5..], ["--bind", "/tmp/x", "/tmp/x", "/bin/echo", "hi"]);
}

#[test]
fn test_build_is_deterministic() {
    let sandbox = argv_sandbox(SandboxConfig::default());
    let binds = [RawBind::from("/data")];
    let first = sandbox.build(&["/bin/true"], &binds).unwrap();
    let second = sandbox.build(&["/bin/true"], &binds).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_default_read_only_binds_emitted() {
    let sandbox = argv_sandbox(SandboxConfig::default());
    let argv = sandbox.build(&["/bin/true"], &[]).unwrap();

    for path in default_read_only_binds() {
        let found = argv
            .windows(3)
            .any(|w| w[0] == "--ro-bind" && w[1] == path && w[2] == path);
        assert!(found, "missing read-only bind for {path}");
    }
}

// =============================================================================
// Build Failures
// =============================================================================

#[test]
fn test_missing_binary_is_unavailable() {
    let sandbox = BubblewrapSandbox::new(
        SandboxConfig::new().with_binary("/nonexistent/path/to/bwrap-sandbox-test"),
    );
    let result = sandbox.build(&["/bin/true"], &[]);
    assert!(matches!(result, Err(Error::SandboxUnavailable(_))), "{result:?}");
}

#[test]
fn test_missing_binary_checked_before_command() {
    let sandbox = BubblewrapSandbox::new(SandboxConfig::new().with_binary("/nonexistent/bwrap"));

    let empty = sandbox.build::<&str>(&[], &[]);
    assert!(matches!(empty, Err(Error::SandboxUnavailable(_))), "{empty:?}");

    let nul = sandbox.build(&["/bin/echo", "a\0b"], &[RawBind::from("relative")]);
    assert!(matches!(nul, Err(Error::SandboxUnavailable(_))), "{nul:?}");
}

#[test]
fn test_validator_veto_is_unavailable() {
    let sandbox =
        BubblewrapSandbox::new(SandboxConfig::new().with_binary_validator(|_: &str| false));
    let result = sandbox.build(&["/bin/true"], &[]);
    assert!(matches!(result, Err(Error::SandboxUnavailable(_))));
}

#[test]
fn test_empty_command_rejected() {
    let sandbox = argv_sandbox(SandboxConfig::default());
    let result = sandbox.build::<&str>(&[], &[]);
    assert!(matches!(
        result,
        Err(Error::InvalidArgument(InvalidArgumentError::InvalidCommand(_)))
    ));
}

#[test]
fn test_relative_extra_bind_rejected() {
    let sandbox = argv_sandbox(SandboxConfig::default());
    let result = sandbox.build(&["/bin/true"], &[RawBind::from("relative/path")]);
    assert!(matches!(
        result,
        Err(Error::InvalidArgument(InvalidArgumentError::InvalidPath { .. }))
    ));
}

#[test]
fn test_malformed_bind_value_rejected() {
    for value in [json!({"from": "/a"}), json!(42), json!({"from": "/a", "to": "/b", "read_only": "yes"})] {
        let result = RawBind::from_value(&value);
        assert!(
            matches!(
                result,
                Err(Error::InvalidArgument(InvalidArgumentError::InvalidBindFormat(_)))
            ),
            "{value} should be rejected"
        );
    }
}

#[test]
fn test_config_from_value_applies_to_build() {
    let config = SandboxConfig::from_value(&json!({
        "binary": "/opt/bwrap",
        "base_args": ["--unshare-net"],
        "read_only_binds": [],
        "write_binds": ["/srv/out"],
    }))
    .unwrap();
    let sandbox = argv_sandbox(config);

    let argv = sandbox.build(&["/bin/true"], &[]).unwrap();
    assert_eq!(
        argv,
        ["/opt/bwrap", "--unshare-net", "--bind", "/srv/out", "/srv/out", "/bin/true"]
    );
}

#[test]
fn test_config_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandbox.json");
    std::fs::write(&path, r#"{"binary": "/opt/bwrap", "base_args": []}"#).unwrap();

    let config = SandboxConfig::from_json_file(&path).unwrap();
    assert_eq!(config.binary, "/opt/bwrap");
    assert!(config.base_args.is_empty());
    assert_eq!(config.read_only_binds, default_read_only_binds());
}

// =============================================================================
// Execution
// =============================================================================

#[test]
fn test_run_captures_stdout() {
    let process = exec_sandbox().run(&RunRequest::new(["/bin/echo", "hello"])).unwrap();

    assert_eq!(process.status(), ProcessStatus::Exited(0));
    assert!(process.is_successful());
    assert_eq!(process.stdout().trim(), "hello");
    assert!(process.stderr().is_empty());
}

#[test]
fn test_run_passes_environment() {
    let request = sh("printf %s \"$GREETING\"").with_env("GREETING", "hello");
    let process = exec_sandbox().run(&request).unwrap();
    assert_eq!(process.stdout(), "hello");
}

#[test]
fn test_run_in_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let canonical = dir.path().canonicalize().unwrap();

    let request = sh("pwd -P").with_working_dir(canonical.to_string_lossy());
    let process = exec_sandbox().run(&request).unwrap();
    assert_eq!(process.stdout().trim(), canonical.to_string_lossy());
}

#[test]
fn test_nonzero_exit_is_process_failed() {
    let result = exec_sandbox().run(&sh("echo boom >&2; exit 3"));

    match result {
        Err(Error::Execution(ExecutionError::ProcessFailed { exit_code, stderr })) => {
            assert_eq!(exit_code, Some(3));
            assert_eq!(stderr.trim(), "boom");
        }
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
}

#[test]
fn test_timeout_kills_process() {
    let request = sh("exec sleep 10").with_timeout(Some(Duration::from_millis(200)));

    let started = Instant::now();
    let result = exec_sandbox().run(&request);

    assert!(
        matches!(result, Err(Error::Execution(ExecutionError::Timeout { .. }))),
        "{result:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_timeout_bounds_run_with_background_job() {
    let request = sh("sleep 4 & exec sleep 10").with_timeout(Some(Duration::from_millis(200)));

    let started = Instant::now();
    let result = exec_sandbox().run(&request);

    assert!(
        matches!(result, Err(Error::Execution(ExecutionError::Timeout { .. }))),
        "{result:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
}

#[test]
fn test_successful_run_with_background_job_returns_promptly() {
    let started = Instant::now();
    let process = exec_sandbox().run(&sh("sleep 4 & echo done")).unwrap();

    assert_eq!(process.stdout().trim(), "done");
    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
}

#[test]
fn test_zero_timeout_disables_deadline() {
    let request = sh("exit 0").with_timeout(None);
    let process = exec_sandbox().run(&request).unwrap();
    assert_eq!(process.timeout(), None);
}

#[test]
fn test_prepare_then_start_manually() {
    let mut process = exec_sandbox()
        .prepare(&RunRequest::new(["/bin/echo", "manual"]))
        .unwrap();

    assert_eq!(process.status(), ProcessStatus::Ready);
    process.start().unwrap();
    assert_eq!(process.wait().unwrap(), ProcessStatus::Exited(0));
    assert_eq!(process.stdout().trim(), "manual");
}

#[test]
fn test_run_with_option_map() {
    let options = json!({"expose_environment": true});
    let request = RunRequest::new(["/bin/true"]).with_env("TOKEN", "abc");

    let process = exec_sandbox()
        .run_with_option_map(&request, options.as_object().unwrap())
        .unwrap();
    assert_eq!(process.env().unwrap().get("TOKEN").map(String::as_str), Some("abc"));
}

#[test]
fn test_invalid_options_fail_before_spawn() {
    // The binary does not exist, so reaching the build step would fail differently.
    let sandbox =
        BubblewrapSandbox::new(SandboxConfig::new().with_binary("/nonexistent/bwrap"));
    let options = json!({"bogus": true});

    let result = sandbox.run_with_option_map(&RunRequest::new(["/bin/true"]), options.as_object().unwrap());
    assert!(matches!(result, Err(Error::Options(_))), "{result:?}");
}

#[test]
fn test_run_options_struct() {
    let request = RunRequest::new(["/bin/true"]).with_env("A", "1");
    let process = exec_sandbox()
        .run_with_options(&request, RunOptions::exposing_environment())
        .unwrap();
    assert!(process.is_env_exposed());
}
