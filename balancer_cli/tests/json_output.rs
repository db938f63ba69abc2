use assert_cmd::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn run_json(args: &[&str], cfg_text: &str) -> std::process::Output {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, cfg_text).unwrap();
    Command::cargo_bin("balancer_cli")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("--json")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn run_emits_machine_readable_completion() {
    let out = run_json(&["run", "--ticks", "50"], "");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["status"], "complete");
    assert_eq!(v["ticks"], 50);
    assert!(v["overruns"].is_u64());
}

#[test]
fn self_check_reports_ok() {
    let out = run_json(&["self-check"], "");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["status"], "ok");
}

#[test]
fn validation_errors_are_structured() {
    let out = run_json(
        &["run", "--ticks", "1"],
        "[actuator]\nsqrt_scale = -1.0\n",
    );
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    let line = stderr.lines().find(|l| l.starts_with('{')).unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert!(v["reason"].is_string());
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}
