//! Integration tests for the replay binary.

use serde_json::Value;
use std::fs;
use std::process::Command;

const TRANSCRIPT: &str = r#"Checking.
<function_calls>
<invoke name="web_search">
<parameter name="query">cats</parameter>
</invoke>
</function_calls>"#;

#[test]
fn replays_transcript_and_results() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("turn.txt");
    let results = dir.path().join("results.jsonl");
    fs::write(&transcript, TRANSCRIPT).unwrap();
    fs::write(
        &results,
        "{\"id\": \"r_0\", \"function_name\": \"web_search\", \"payload\": {\"tool_execution\": {\"result\": {\"success\": true, \"output\": \"{\\\"total_results\\\":3}\"}}}}\n\n{\"id\": \"r_7\", \"payload\": \"oops\"}\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_toolcall-rs"))
        .arg("--transcript")
        .arg(&transcript)
        .arg("--results")
        .arg(&results)
        .args(["--chunk-size", "5", "--id-prefix", "r"])
        .output()
        .expect("failed to run toolcall-rs");

    assert!(output.status.success());
    let records: Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], "r_0");
    assert_eq!(records[0]["function_name"], "web-search");
    assert_eq!(records[0]["status"], "complete");
    assert_eq!(records[0]["result"]["output"]["total_results"], 3);
}

#[test]
fn missing_transcript_fails_with_context() {
    let output = Command::new(env!("CARGO_BIN_EXE_toolcall-rs"))
        .args(["--transcript", "/nonexistent/turn.txt"])
        .output()
        .expect("failed to run toolcall-rs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reading transcript"));
}
