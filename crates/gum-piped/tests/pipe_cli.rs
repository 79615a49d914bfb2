//! Integration tests for the `gum-piped` binary.
//!
//! Drives the binary over real stdio pipes and checks framing, ordering,
//! exit status and that logs stay off standard output.

use assert_cmd::cargo::cargo_bin_cmd;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use predicates::str::contains;
use serde_json::Value;

const RECT: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50"><rect width="100" height="50" fill="navy"/></svg>"#;

fn request(task: &str, extra: &[(&str, Value)]) -> String {
    let mut object = serde_json::json!({"task": task, "code": RECT});
    for (key, value) in extra {
        object[*key] = value.clone();
    }
    object.to_string()
}

fn serve(input: &str) -> Vec<Value> {
    let mut command = cargo_bin_cmd!("gum-piped");
    command.args(["--workers", "3", "--log-filter", "info"]);
    let output = command.write_stdin(input).assert().success().get_output().clone();
    String::from_utf8(output.stdout)
        .expect("utf8 stdout")
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stdout line is a response"))
        .collect()
}

#[test]
fn evaluate_returns_svg_markup() {
    let responses = serve(&format!("{}\n", request("evaluate", &[])));
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["ok"], true);
    assert!(
        responses[0]["result"]
            .as_str()
            .is_some_and(|markup| markup.contains("<svg"))
    );
}

#[test]
fn render_returns_base64_png_at_requested_size() {
    let line = request("render", &[("size", Value::from(400)), ("background", Value::from("black"))]);
    let responses = serve(&format!("{line}\n"));

    let encoded = responses[0]["result"].as_str().expect("base64 result");
    let bytes = STANDARD.decode(encoded).expect("valid base64");
    assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    let width = u32::from_be_bytes(bytes[16..20].try_into().expect("width"));
    let height = u32::from_be_bytes(bytes[20..24].try_into().expect("height"));
    assert_eq!((width, height), (400, 200));
}

#[test]
fn classifies_failures_and_keeps_order() {
    let input = [
        r#"{"task":"evaluate"}"#.to_owned(),
        request("rotate", &[]),
        request("render", &[("size", Value::from(64))]),
        "garbage".to_owned(),
        r#"{"task":"evaluate","code":"<svg"}"#.to_owned(),
    ]
    .join("\n");
    let responses = serve(&input);

    let kinds: Vec<Option<&str>> = responses
        .iter()
        .map(|response| response["result"]["error"].as_str())
        .collect();
    assert_eq!(
        kinds,
        [
            Some("NOCODE"),
            Some("UNKNOWN"),
            None,
            Some("UNKNOWN"),
            Some("PARSE")
        ]
    );
    assert_eq!(responses[2]["ok"], true);
}

#[test]
fn empty_input_exits_cleanly_without_output() {
    let mut command = cargo_bin_cmd!("gum-piped");
    command
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicates::str::is_empty());
}

#[test]
fn logs_go_to_stderr() {
    let mut command = cargo_bin_cmd!("gum-piped");
    command.args(["--log-filter", "info", "--log-format", "compact"]);
    command
        .write_stdin(format!("{}\n", request("evaluate", &[])))
        .assert()
        .success()
        .stderr(contains("serving requests"))
        .stdout(contains(r#""ok":true"#));
}

#[test]
fn invalid_configuration_fails_before_serving() {
    let mut command = cargo_bin_cmd!("gum-piped");
    command.args(["--workers", "0"]);
    command
        .write_stdin("")
        .assert()
        .failure()
        .stderr(contains("workers"));
}
