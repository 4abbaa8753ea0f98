//! End-to-end tests for the expose binary
//!
//! Every test runs the binary with its own XDG directories so nothing from
//! the developer's machine is read or written. None of them needs
//! cloudflared to be installed.

use std::path::Path;
use std::process::{Command, Output};

use serial_test::serial;
use tempfile::TempDir;

fn expose(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_expose"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("EXPOSE_PROJECT_CONFIG_DIR", home.join("project"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run expose")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_verbs() {
    let home = TempDir::new().unwrap();
    let output = expose(home.path(), &["--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    for verb in ["start", "stop", "restart", "delete", "list", "urls", "stop-all", "config"] {
        assert!(out.contains(verb), "help is missing {verb}");
    }
}

#[test]
#[serial]
fn list_without_records_prints_hint() {
    let home = TempDir::new().unwrap();
    let output = expose(home.path(), &["list"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("No port exposed"));
}

#[test]
#[serial]
fn stop_of_unknown_port_succeeds_without_creating_a_record() {
    let home = TempDir::new().unwrap();
    let output = expose(home.path(), &["stop", "48213"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains('✓'));
    assert!(!home.path().join("data/expose/status.json").exists());
}

#[test]
#[serial]
fn list_renders_records_from_the_store() {
    let home = TempDir::new().unwrap();
    let store = home.path().join("data/expose/status.json");
    std::fs::create_dir_all(store.parent().unwrap()).unwrap();
    std::fs::write(
        &store,
        r#"{
  "8080": {
    "port": 8080,
    "status": "started",
    "identity": {
      "name": "devbox-8080",
      "id": "6ff42ae2-765d-4adf-8112-31c55c1551ef",
      "credentials_path": "/tmp/6ff42ae2-765d-4adf-8112-31c55c1551ef.json"
    },
    "public_hostname": "devbox-8080-k3j9x2.example.com",
    "runner_config": "/tmp/devbox-8080-k3j9x2.yml",
    "protocol": "http",
    "service_name": "http-alt",
    "created_at": "2026-01-05T10:00:00Z",
    "updated_at": "2026-01-05T10:00:00Z"
  }
}"#,
    )
    .unwrap();

    let output = expose(home.path(), &["list"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("8080"));
    assert!(out.contains("https://devbox-8080-k3j9x2.example.com"));
    assert!(out.contains("Started"));

    let output = expose(home.path(), &["urls"]);
    assert!(stdout(&output).contains("https://devbox-8080-k3j9x2.example.com"));
}

#[test]
#[serial]
fn start_without_cloudflared_fails_with_exit_code_1() {
    let home = TempDir::new().unwrap();
    let project = home.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(
        project.join("config.toml"),
        "[cloudflared]\nbinary = \"/nonexistent/expose-test-cloudflared\"\n",
    )
    .unwrap();

    let output = expose(home.path(), &["start", "8080"]);
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains('✗'));
    assert!(err.contains("cloudflared is not installed"));
    assert!(!home.path().join("data/expose/status.json").exists());
}

#[test]
fn delete_without_terminal_requires_yes() {
    let home = TempDir::new().unwrap();
    let output = expose(home.path(), &["delete", "8080"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--yes"));
}

#[test]
#[serial]
fn config_show_prints_merged_configuration() {
    let home = TempDir::new().unwrap();
    let project = home.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join("config.toml"), "domain = \"skead.fr\"\n").unwrap();

    let output = expose(home.path(), &["config", "show"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("domain = \"skead.fr\""));
    assert!(out.contains("[cloudflared]"));
    assert!(out.contains("command_timeout = \"1m\""));
}

#[test]
fn config_path_shows_paths() {
    let home = TempDir::new().unwrap();
    let output = expose(home.path(), &["config", "path"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("User config:"));
    assert!(out.contains("Project config:"));
    assert!(out.contains("status.json"));
}
