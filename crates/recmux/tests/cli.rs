#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn recmux() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_recmux"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn encode(args: &[&str]) -> Vec<u8> {
    let output = recmux()
        .arg("encode")
        .args(args)
        .output()
        .expect("encode should run");
    assert!(output.status.success());
    output.stdout
}

fn run_with_stdin(cmd: &mut Command, input: &[u8]) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("command should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input)
        .expect("stdin should accept input");
    child.wait_with_output().expect("command should finish")
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

#[test]
fn encode_writes_wire_form() {
    let wire = encode(&["--type", "decoder-setting", "--urgent", "--data", "beam 15"]);
    assert_eq!(wire.len(), 6 + 7);
    assert_eq!(&wire[..4], &13u32.to_le_bytes());
    assert_eq!(wire[4], 8);
    assert_eq!(wire[5], 1);
    assert_eq!(&wire[6..], b"beam 15");
}

#[test]
fn encode_then_decode_round_trips() {
    let mut input = encode(&["--type", "recog", "--data", "hello"]);
    input.extend(encode(&["--type", "recog-end", "--urgent"]));

    let output = run_with_stdin(recmux().args(["--format", "json", "decode"]), &input);
    assert!(output.status.success());

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type_name"], "recog");
    assert_eq!(lines[0]["data"], "hello");
    assert_eq!(lines[0]["urgent"], false);
    assert_eq!(lines[1]["type_name"], "recog-end");
    assert_eq!(lines[1]["urgent"], true);
    assert_eq!(lines[1]["data_length"], 0);
}

#[test]
fn decode_respects_count() {
    let mut input = Vec::new();
    for text in ["a", "b", "c"] {
        input.extend(encode(&["--type", "user-message", "--data", text]));
    }

    let output = run_with_stdin(
        recmux().args(["--format", "json", "decode", "--count", "2"]),
        &input,
    );
    assert!(output.status.success());
    assert_eq!(json_lines(&output).len(), 2);
}

#[test]
fn decode_truncated_input_is_data_invalid() {
    let wire = encode(&["--type", "recog", "--data", "cut short"]);
    let output = run_with_stdin(recmux().arg("decode"), &wire[..wire.len() - 3]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn decode_bad_length_is_data_invalid() {
    let output = run_with_stdin(recmux().arg("decode"), &[2, 0, 0, 0, 5, 0]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn run_prints_echoed_handshake() {
    let output = recmux()
        .args([
            "--format", "json", "run", "--script", "cat", "--beam", "15", "--lm-scale", "30",
            "--count", "2",
        ])
        .stdin(Stdio::null())
        .output()
        .expect("run should finish");
    assert!(output.status.success());

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type_name"], "decoder-setting");
    assert_eq!(lines[0]["data"], "beam 15");
    assert_eq!(lines[0]["source"], "recognizer-in");
    assert_eq!(lines[1]["data"], "lm_scale 30");
}

#[test]
fn run_forwards_stdin_until_recognizer_exits() {
    let input = encode(&["--type", "audio", "--data", "pcm"]);
    let output = run_with_stdin(
        recmux().args(["--format", "json", "run", "--script", "cat", "--forward-stdin"]),
        &input,
    );
    assert!(output.status.success());

    let lines = json_lines(&output);
    let data: Vec<_> = lines.iter().map(|line| line["data"].clone()).collect();
    assert_eq!(data, vec!["beam 100", "lm_scale 30", "pcm"]);
}

#[test]
fn run_stops_forwarding_when_recognizer_input_closes() {
    let mut input = Vec::new();
    for _ in 0..64 {
        input.extend(encode(&["--type", "audio", "--data", "pcm"]));
    }
    let output = run_with_stdin(
        recmux().args(["--format", "json", "run", "--script", "true", "--forward-stdin"]),
        &input,
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn run_rejects_out_of_range_beam() {
    let output = recmux()
        .args(["run", "--script", "cat", "--beam", "301"])
        .output()
        .expect("run should finish");
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("beam value 301"));
}

#[test]
fn run_reports_missing_recognizer() {
    let output = recmux()
        .args(["run", "--script", "/nonexistent/recognizer"])
        .stdin(Stdio::null())
        .output()
        .expect("run should finish");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn version_prints_name() {
    let output = recmux().arg("version").output().expect("version should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("recmux "));
}
