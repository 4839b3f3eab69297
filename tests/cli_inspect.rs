use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use flowtap_flow_store::{
    write_flow_file, BodyEncoding, FlowRecord, InitialScreenRecord, NetworkRecord, RequestMeta,
    ResponseMeta,
};
use serde_json::Value;

fn network(step: u64, method: &str, url: &str, status: i64, duration_ms: u64) -> FlowRecord {
    FlowRecord::Network(NetworkRecord {
        step,
        request: RequestMeta {
            url: url.into(),
            method: method.into(),
            post_data: None,
            headers: None,
        },
        page_url: None,
        response: Some(ResponseMeta {
            status,
            headers: None,
            mime_type: None,
        }),
        body: Some("{}".into()),
        body_encoding: BodyEncoding::Text,
        error_text: None,
        duration_ms,
        timestamp: Utc::now(),
        screenshot: None,
    })
}

fn write_fixture(path: &Path) {
    let records = vec![
        FlowRecord::InitialScreen(InitialScreenRecord {
            step: 1,
            route: "https://shop.test/".into(),
            timestamp: Utc::now(),
            screenshot: None,
        }),
        network(1, "GET", "https://shop.test/api/cart", 200, 40),
        network(2, "POST", "https://shop.test/api/order", 502, 60),
    ];
    write_flow_file(path, records).unwrap();
}

fn flowtap(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_flowtap"));
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.join("absent.yaml"));
    cmd
}

#[test]
fn inspect_reports_summary_and_filtered_entries() {
    let dir = tempfile::tempdir().unwrap();
    let flow = dir.path().join("flow.json");
    write_fixture(&flow);

    let assert = flowtap(dir.path())
        .args(["--output", "json", "inspect"])
        .arg(&flow)
        .args(["--method", "POST"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["summary"]["total"], 3);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["summary"]["avgDurationMs"], 50);
    assert_eq!(report["matched"], 1);
    assert_eq!(report["entries"][0]["type"], "API");
    assert_eq!(report["entries"][0]["response"]["status"], 502);
}

#[test]
fn inspect_rejects_malformed_flow() {
    let dir = tempfile::tempdir().unwrap();
    let flow = dir.path().join("broken.json");
    std::fs::write(&flow, r#"{"entries": []}"#).unwrap();

    flowtap(dir.path())
        .arg("inspect")
        .arg(&flow)
        .assert()
        .failure();
}

#[test]
fn info_prints_build_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let assert = flowtap(dir.path())
        .args(["--output", "json", "info"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let info: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert!(info["capture"]["capture_ui_screenshots"].as_bool().unwrap());
}
