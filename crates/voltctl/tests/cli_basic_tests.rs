use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a test command isolated from the caller's environment
fn voltctl(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("voltctl").unwrap();
    cmd.arg("--config-file")
        .arg(config)
        .env_remove("VOLTCTL_PROFILE")
        .env_remove("VOLTCTL_CONFIG_FILE")
        .env_remove("VOLTCTL_HOST")
        .env_remove("VOLTCTL_USER")
        .env_remove("VOLTCTL_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn temp_config() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    (dir, path)
}

fn bare() -> Command {
    Command::cargo_bin("voltctl").unwrap()
}

#[test]
fn test_help_flag() {
    bare()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("VoltDB cluster administration CLI"))
        .stdout(predicate::str::contains("EXAMPLES:"));
}

#[test]
fn test_version_flag() {
    bare()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("voltctl"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_args_shows_help() {
    bare()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    bare()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_subcommand_help_has_examples() {
    for sub in ["stop", "pause", "shutdown"] {
        bare()
            .args([sub, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("EXAMPLES:"))
            .stdout(predicate::str::contains("--timeout"));
    }
}

#[test]
fn test_stop_requires_target() {
    bare()
        .arg("stop")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("<TARGET_HOST>"));
}

#[test]
fn test_version_command_json() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["version", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\""));
}

#[test]
fn test_completions_bash() {
    bare()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("voltctl"));
}

#[test]
fn test_shutdown_conflicting_modes_is_usage_error() {
    let (_dir, config) = temp_config();
    // Port 1 is never listened on; a usage error must come before any connect
    voltctl(&config)
        .args(["shutdown", "--force", "--save", "--host", "127.0.0.1:1"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot be used together"));
}

#[test]
fn test_zero_timeouts_are_usage_errors() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["pause", "--wait", "--timeout", "0", "--host", "127.0.0.1:1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timeout must be greater than zero"));

    voltctl(&config)
        .args(["stop", "db2", "-t", "0", "--host", "127.0.0.1:1"])
        .assert()
        .code(2);
}

#[test]
fn test_stop_rejects_multiple_targets() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["stop", "db1,db2", "--host", "127.0.0.1:1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at most 1"));
}

#[test]
fn test_bad_host_list_is_usage_error() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["resume", "--host", "fe80::1:8080"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid address"));
}

#[test]
fn test_missing_hosts() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .arg("resume")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No cluster hosts given"))
        .stderr(predicate::str::contains("tip"));
}

#[test]
fn test_unreachable_cluster() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["resume", "--host", "127.0.0.1:1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Connection error"));
}

#[test]
fn test_profile_list_empty() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profiles configured"));
}

#[test]
fn test_profile_path_uses_config_file() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["profile", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_profile_lifecycle() {
    let (_dir, config) = temp_config();

    voltctl(&config)
        .args([
            "profile", "set", "prod", "--hosts", "db1,db2:8081", "--username", "admin",
            "--password", "secret",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile 'prod' created"));
    voltctl(&config)
        .args(["profile", "set", "local", "--hosts", "localhost"])
        .assert()
        .success();

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("db2:8081"));

    voltctl(&config)
        .args(["profile", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"local\""))
        .stdout(predicate::str::contains("\"name\": \"prod\""))
        .stdout(predicate::str::contains("secret").not());

    voltctl(&config)
        .args(["profile", "default", "prod"])
        .assert()
        .success();
    voltctl(&config)
        .args(["profile", "show", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(default)"))
        .stdout(predicate::str::contains("Password: stored"));

    voltctl(&config)
        .args(["profile", "remove", "prod", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Default profile cleared"));
    voltctl(&config)
        .args(["profile", "show", "prod"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Profile 'prod' not found"));
}

#[test]
fn test_profile_set_rejects_bad_hosts() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["profile", "set", "bad", "--hosts", "db1:99999"])
        .assert()
        .code(2);
    assert!(!config.exists());
}

#[test]
fn test_unknown_profile_for_operation() {
    let (_dir, config) = temp_config();
    voltctl(&config)
        .args(["--profile", "nope", "resume"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

fn body(status: i64, columns: &[&str], rows: serde_json::Value) -> serde_json::Value {
    let schema: Vec<_> = columns.iter().map(|c| json!({"name": c, "type": 9})).collect();
    json!({
        "status": status,
        "statusstring": null,
        "results": [{"schema": schema, "data": rows}]
    })
}

async fn mount(server: &MockServer, procedure: &str, response: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/1.0/"))
        .and(query_param("Procedure", procedure))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resume_against_json_api() {
    let server = MockServer::start().await;
    mount(&server, "@Ping", body(1, &["STATUS"], json!([[0]]))).await;
    mount(&server, "@Resume", body(1, &["STATUS"], json!([[0]]))).await;
    let host = format!("127.0.0.1:{}", server.address().port());

    tokio::task::spawn_blocking(move || {
        let (_dir, config) = temp_config();
        voltctl(&config)
            .args(["resume", "--host", &host])
            .assert()
            .success()
            .stdout(predicate::str::contains("cluster resumed"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_status_becomes_exit_code() {
    let server = MockServer::start().await;
    mount(&server, "@Ping", body(1, &["STATUS"], json!([[0]]))).await;
    mount(&server, "@Resume", body(1, &["STATUS"], json!([[5]]))).await;
    let host = format!("127.0.0.1:{}", server.address().port());

    tokio::task::spawn_blocking(move || {
        let (_dir, config) = temp_config();
        voltctl(&config)
            .args(["resume", "--host", &host, "-o", "json"])
            .assert()
            .code(5)
            .stdout(predicate::str::contains("\"state\": \"failed\""));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pause_wait_requiesces_when_statistics_stall() {
    let server = MockServer::start().await;
    mount(&server, "@Ping", body(1, &["STATUS"], json!([[0]]))).await;
    mount(&server, "@Pause", body(1, &["STATUS"], json!([[0]]))).await;
    Mock::given(method("GET"))
        .and(path("/api/1.0/"))
        .and(query_param("Procedure", "@Quiesce"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(1, &["STATUS"], json!([[0]]))))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/1.0/"))
        .and(query_param("Procedure", "@Statistics"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(body(1, &["TUPLE_PENDING"], json!([])))
                .set_delay(std::time::Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let host = format!("127.0.0.1:{}", server.address().port());

    tokio::task::spawn_blocking(move || {
        let (_dir, config) = temp_config();
        voltctl(&config)
            .args(["pause", "--wait", "-t", "2", "--host", &host])
            .timeout(std::time::Duration::from_secs(20))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("remains paused"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_goes_through_another_member() {
    let server = MockServer::start().await;
    let http_port = server.address().port().to_string();
    let mut rows = Vec::new();
    for (id, name) in [(0, "db1"), (1, "db2")] {
        rows.push(json!([id, "HOSTNAME", name]));
        rows.push(json!([id, "IPADDRESS", "127.0.0.1"]));
        rows.push(json!([id, "INTERNALPORT", "3021"]));
        rows.push(json!([id, "HTTPPORT", http_port]));
    }

    mount(&server, "@Ping", body(1, &["STATUS"], json!([[0]]))).await;
    mount(
        &server,
        "@SystemInformation",
        body(1, &["HOST_ID", "KEY", "VALUE"], json!(rows)),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/1.0/"))
        .and(query_param("Procedure", "@PrepareStopNode"))
        .and(query_param("Parameters", "[1,120,60]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body(1, &["STATUS"], json!([[0]]))))
        .expect(1)
        .mount(&server)
        .await;
    let host = format!("127.0.0.1:{}", server.address().port());

    tokio::task::spawn_blocking(move || {
        let (_dir, config) = temp_config();
        voltctl(&config)
            .args(["stop", "db2", "--host", &host, "-o", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"state\": \"success\""))
            .stdout(predicate::str::contains("\"operation\": \"stop-node\""));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_unknown_member_sends_nothing() {
    let server = MockServer::start().await;
    mount(&server, "@Ping", body(1, &["STATUS"], json!([[0]]))).await;
    mount(
        &server,
        "@SystemInformation",
        body(
            1,
            &["HOST_ID", "KEY", "VALUE"],
            json!([[0, "HOSTNAME", "db1"], [0, "INTERNALPORT", "3021"]]),
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(query_param("Procedure", "@PrepareStopNode"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let host = format!("127.0.0.1:{}", server.address().port());

    tokio::task::spawn_blocking(move || {
        let (_dir, config) = temp_config();
        voltctl(&config)
            .args(["stop", "db9", "--host", &host])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("host db9:3021 not found in cluster"));
    })
    .await
    .unwrap();
}
