//! Integration tests for configuration handling through the binary.
//!
//! These tests verify `--check-config` and `--show-config` behavior.

use std::io::Write;
use tempfile::Builder;

/// Helper to get the binary path
fn binary_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_taptap-exporter"))
}

fn config_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

#[test]
fn test_default_config_is_valid() {
    let output = std::process::Command::new(binary_path())
        .args(["--no-config", "--check-config"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Configuration is valid"));
}

#[test]
fn test_zero_restart_delay_is_rejected() {
    let output = std::process::Command::new(binary_path())
        .args(["--no-config", "--restart-delay-secs", "0", "--check-config"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(
        stderr.contains("restart_delay_secs must be greater than 0"),
        "Expected restart delay error, got stderr: '{}'",
        stderr
    );
}

#[test]
fn test_duplicate_node_ids_are_rejected() {
    let file = config_file(
        ".yaml",
        "nodes:\n  - id: 2\n    name: A1\n  - id: 2\n    name: B1\n",
    );

    let output = std::process::Command::new(binary_path())
        .arg("--config")
        .arg(file.path())
        .arg("--check-config")
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(
        stderr.contains("Duplicate node id 2"),
        "Expected duplicate id error, got stderr: '{}'",
        stderr
    );
}

#[test]
fn test_unparseable_config_is_rejected() {
    let file = config_file(".json", "{ \"port\": ");

    let output = std::process::Command::new(binary_path())
        .arg("--config")
        .arg(file.path())
        .arg("--check-config")
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("invalid JSON"), "got stderr: '{}'", stderr);
}

#[test]
fn test_show_config_merges_cli_overrides() {
    let file = config_file(".yaml", "port: 9100\nserial_device: /dev/ttyUSB1\n");

    let output = std::process::Command::new(binary_path())
        .arg("--config")
        .arg(file.path())
        .args(["--serial", "/dev/ttyACM0", "--show-config", "--config-format", "json"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(value["port"], 9100);
    assert_eq!(value["serial_device"], "/dev/ttyACM0");
}

#[test]
fn test_ipv6_bind_address_is_accepted_at_startup() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("Failed to pick a port")
        .port();

    let mut child = std::process::Command::new(binary_path())
        .args(["--no-config", "--bind", "::", "--port"])
        .arg(port.to_string())
        .args(["--taptap-binary", "/nonexistent/taptap", "--log-level", "off"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .expect("Failed to execute command");

    std::thread::sleep(std::time::Duration::from_secs(1));
    let _ = child.kill();
    let output = child.wait_with_output().expect("Failed to wait for child");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        !stderr.contains("Invalid listen address"),
        "IPv6 bind was rejected, got stderr: '{}'",
        stderr
    );
}
