//! End-to-end CLI integration tests for the `calcsync` binary.
//!
//! Offline commands run as plain subprocesses. Workflows that talk to REDCap
//! run against a small HTTP responder on localhost that answers the three
//! API calls with canned JSON and records every request body.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a `Command` targeting the cargo-built `calcsync` binary, isolated
/// from the caller's environment and working directory.
fn calcsync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("calcsync").unwrap();
    for var in [
        "REDCAP_API_URL",
        "REDCAP_API_TOKEN",
        "REDCAP_RECORD_ID_FIELD",
        "REDCAP_COMPARISON",
        "REDCAP_BLANK_VALUES",
        "REDCAP_TIMEOUT_SECS",
        "CLICOLOR_FORCE",
        "HTTP_PROXY",
        "HTTPS_PROXY",
        "ALL_PROXY",
        "http_proxy",
        "https_proxy",
        "all_proxy",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1")
        .env("CALCSYNC_NO_EMOJI", "1")
        .current_dir(dir.path());
    cmd
}

type RequestLog = Arc<Mutex<Vec<String>>>;

/// Serve HTTP on an ephemeral port. `respond` maps a form body to
/// `(status, json body)`. Returns the API URL and the request log.
fn serve<F>(respond: F) -> (String, RequestLog)
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/api/", listener.local_addr().unwrap());
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let thread_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let log = Arc::clone(&thread_log);
            let respond = Arc::clone(&respond);
            thread::spawn(move || {
                let mut writer = stream.try_clone().unwrap();
                let mut reader = BufReader::new(stream);
                // Keep-alive: answer requests until the client hangs up.
                loop {
                    let mut content_length = 0usize;
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 {
                        return;
                    }
                    loop {
                        line.clear();
                        if reader.read_line(&mut line).unwrap_or(0) == 0 {
                            return;
                        }
                        let header = line.trim_end();
                        if header.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = header.split_once(':') {
                            if name.eq_ignore_ascii_case("content-length") {
                                content_length = value.trim().parse().unwrap_or(0);
                            }
                        }
                    }
                    let mut body = vec![0u8; content_length];
                    if reader.read_exact(&mut body).is_err() {
                        return;
                    }
                    let body = String::from_utf8_lossy(&body).into_owned();
                    let (status, payload) = respond(&body);
                    log.lock().unwrap().push(body);

                    let reason = if status == 200 { "OK" } else { "Error" };
                    let response = format!(
                        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{payload}",
                        payload.len()
                    );
                    if writer.write_all(response.as_bytes()).is_err() {
                        return;
                    }
                    let _ = writer.flush();
                }
            });
        }
    });

    (url, log)
}

const METADATA: &str = r#"[
    {"field_name": "record_id", "form_name": "scores", "field_type": "text",
     "field_label": "ID", "select_choices_or_calculations": "", "field_annotation": ""},
    {"field_name": "a", "form_name": "scores", "field_type": "text",
     "field_label": "A", "select_choices_or_calculations": "", "field_annotation": ""},
    {"field_name": "b", "form_name": "scores", "field_type": "text",
     "field_label": "B", "select_choices_or_calculations": "", "field_annotation": ""},
    {"field_name": "total", "form_name": "scores", "field_type": "calc",
     "field_label": "Total", "select_choices_or_calculations": "[a] + [b]", "field_annotation": ""}
]"#;

const RECORDS: &str = r#"[
    {"record_id": "1", "a": "2", "b": "3", "total": "5"},
    {"record_id": "2", "a": "1", "b": "1", "total": "3"}
]"#;

/// A project with one out-of-date record (`2`).
fn project() -> (String, RequestLog) {
    serve(|body| {
        if body.contains("content=metadata") {
            (200, METADATA.to_string())
        } else if body.contains("data=") {
            (200, r#"{"count": 1}"#.to_string())
        } else {
            (200, RECORDS.to_string())
        }
    })
}

fn imports(log: &RequestLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|body| body.contains("data="))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Flow 1: Local translate and eval
// ---------------------------------------------------------------------------

#[test]
fn flow1_eval_sum() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["eval", "--formula", "[a] + [b]", "--var", "a=2", "--var", "b=3"])
        .assert()
        .success()
        .stdout("5.0\n");
}

#[test]
fn flow1_eval_conditional() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["eval", "--formula", "if([a]>0,[a],0)", "--var", "a=-5"])
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
fn flow1_eval_missing_variable_counts_as_zero() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["eval", "--formula", "[a] * 2 + 1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"result\": \"1.0\""));
}

#[test]
fn flow1_eval_non_numeric_fails() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["eval", "--formula", "[weight] + 1", "--var", "weight=heavy"])
        .assert()
        .failure()
        .code(1)
        .stderr("Error: Non-numeric value in [weight]\n");
}

#[test]
fn flow1_eval_failure_as_json() {
    let tmp = TempDir::new().unwrap();
    let output = calcsync(&tmp)
        .args(["eval", "--formula", "[a] / [b]", "--var", "a=1", "--var", "b=0", "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(json["error"], "Error: Division by zero");
}

#[test]
fn flow1_eval_rejects_malformed_var() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["eval", "--formula", "[a]", "--var", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn flow1_translate_formula_json() {
    let tmp = TempDir::new().unwrap();
    let output = calcsync(&tmp)
        .args(["translate", "--formula", "if([a] > 0, [a], [b])", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["expression"], "([a] > 0 ?  [a] :  [b])");
    assert_eq!(json["calctext"], false);
    assert_eq!(json["variables"], serde_json::json!(["a", "b"]));
}

#[test]
fn flow1_translate_needs_field_or_formula() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .arg("translate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("either a FIELD or --formula is required"));
}

// ---------------------------------------------------------------------------
// Flow 2: Configuration
// ---------------------------------------------------------------------------

#[test]
fn flow2_sync_without_credentials() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["sync", "total"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing API URL"));
}

#[test]
fn flow2_error_as_json() {
    let tmp = TempDir::new().unwrap();
    let output = calcsync(&tmp)
        .args(["check", "total", "--json", "--url", "https://redcap.example.org/api/"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert!(json["error"].as_str().unwrap().contains("missing API token"));
}

#[test]
fn flow2_config_masks_token() {
    let tmp = TempDir::new().unwrap();
    let output = calcsync(&tmp)
        .args(["config", "--json", "--token", "ABCDEF0123456789"])
        .env("REDCAP_API_URL", "https://redcap.example.org/api/")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("ABCDEF"));
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["api_token"], "************6789");
    assert_eq!(json["api_url"], "https://redcap.example.org/api/");
    assert_eq!(json["record_id_field"], "record_id");
}

#[test]
fn flow2_config_file_and_flag_precedence() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("calcsync.yaml"),
        "record_id_field: study_id\ncomparison: strict\n",
    )
    .unwrap();

    calcsync(&tmp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("record_id_field = study_id"))
        .stdout(predicate::str::contains("comparison = strict"));

    calcsync(&tmp)
        .args(["config", "--comparison", "numeric"])
        .assert()
        .success()
        .stdout(predicate::str::contains("comparison = numeric"));
}

#[test]
fn flow2_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["config", "--config", "elsewhere.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn flow2_completion() {
    let tmp = TempDir::new().unwrap();
    calcsync(&tmp)
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calcsync"));
}

// ---------------------------------------------------------------------------
// Flow 3: Sync against a project
// ---------------------------------------------------------------------------

#[test]
fn flow3_sync_confirmed() {
    let tmp = TempDir::new().unwrap();
    let (url, log) = project();

    calcsync(&tmp)
        .args(["sync", "total", "--url", &url, "--token", "TESTTOKEN"])
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("2: 3 \u{2192} 2.0"))
        .stdout(predicate::str::contains("(y/n)"))
        .stdout(predicate::str::contains("Updated 1 record(s)"));

    let imports = imports(&log);
    assert_eq!(imports.len(), 1);
    assert!(imports[0].contains("overwriteBehavior=normal"));
    assert!(imports[0].contains("token=TESTTOKEN"));
}

#[test]
fn flow3_sync_declined() {
    let tmp = TempDir::new().unwrap();
    let (url, log) = project();

    calcsync(&tmp)
        .args(["sync", "total", "--url", &url, "--token", "TESTTOKEN"])
        .write_stdin("no\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes made."));
    assert!(imports(&log).is_empty());
}

#[test]
fn flow3_sync_prompts_for_field() {
    let tmp = TempDir::new().unwrap();
    let (url, log) = project();

    calcsync(&tmp)
        .args(["sync", "--yes", "--url", &url, "--token", "TESTTOKEN"])
        .write_stdin("total\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Enter the field name: "))
        .stdout(predicate::str::contains("Updated 1 record(s)"));
    assert_eq!(imports(&log).len(), 1);
}

#[test]
fn flow3_check_json() {
    let tmp = TempDir::new().unwrap();
    let (url, log) = project();

    let output = calcsync(&tmp)
        .args(["check", "total", "--json", "--url", &url, "--token", "TESTTOKEN"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["outcome"], "dry_run");
    assert_eq!(json["checked"], 2);
    assert_eq!(json["updates"][0]["record_id"], "2");
    assert_eq!(json["updates"][0]["previous_value"], "3");
    assert_eq!(json["updates"][0]["computed_value"], "2.0");
    assert!(imports(&log).is_empty());
}

#[test]
fn flow3_unknown_field() {
    let tmp = TempDir::new().unwrap();
    let (url, _log) = project();

    calcsync(&tmp)
        .args(["check", "zzz", "--url", &url, "--token", "TESTTOKEN"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no metadata found for 'zzz'"));
}

#[test]
fn flow3_translate_remote_field() {
    let tmp = TempDir::new().unwrap();
    let (url, _log) = project();

    calcsync(&tmp)
        .args(["translate", "total", "--url", &url, "--token", "TESTTOKEN"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[a] + [b]"))
        .stdout(predicate::str::contains("Variables: a, b"));
}

#[test]
fn flow3_http_error_is_reported() {
    let tmp = TempDir::new().unwrap();
    let (url, _log) = serve(|_| {
        (
            403,
            r#"{"error":"You do not have permissions to use the API"}"#.to_string(),
        )
    });

    calcsync(&tmp)
        .args(["sync", "total", "--yes", "--url", &url, "--token", "BAD"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("HTTP 403"))
        .stderr(predicate::str::contains("permissions"));
}
