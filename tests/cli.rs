//! CLI test cases.
//!
//! Everything here runs offline: image-bearing fixtures use the `echo`
//! engine, which decodes the "image" bytes as UTF-8 text. Tests that need
//! a live Tesseract binary or a vision endpoint are `#[ignore]`d.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("textfuse").unwrap()
}

/// Run `extract` over a fixture and parse the resulting JSON document.
fn extract(args: &[&str]) -> serde_json::Value {
    let output = cmd().arg("extract").args(args).output().unwrap();
    assert!(
        output.status.success(),
        "extract failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"));
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_schema_output() {
    cmd()
        .arg("schema")
        .arg("DocumentResult")
        .assert()
        .success()
        .stdout(predicate::str::contains("full_text"));
}

#[test]
fn test_extract_native_text_units() {
    let document = extract(&["tests/fixtures/units.jsonl"]);

    // Units come back in input order.
    let units = document["units"].as_array().unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0]["unit_id"], "page-1");
    assert_eq!(units[1]["unit_id"], "page-2");
    assert_eq!(units[2]["unit_id"], "page-3");

    // Native text passes through verbatim.
    assert_eq!(units[0]["content_type"], "NATIVE_TEXT_ONLY");
    assert_eq!(units[0]["method"], "NATIVE_TEXT");
    assert_eq!(units[0]["text"], "Invoice #4521, Total: $230.00");
    assert_eq!(units[0]["geometry"]["width"], 612.0);

    // A textless unit with no images is empty, not an error.
    assert_eq!(units[2]["content_type"], "EMPTY");
    assert_eq!(units[2]["text"], "");

    assert_eq!(document["is_scanned"], false);
    assert_eq!(document["stats"]["native_text_units"], 2);
    assert_eq!(document["stats"]["empty_units"], 1);

    // The full text is the unit texts joined with blank lines.
    let full_text = document["full_text"].as_str().unwrap();
    assert_eq!(
        full_text,
        "Invoice #4521, Total: $230.00\n\nPayment is due within thirty days of receipt.\n\n"
    );
}

#[test]
fn test_extract_image_units_with_echo_engine() {
    let document = extract(&[
        "tests/fixtures/scan.jsonl",
        "--ocr",
        "--ocr-engine",
        "echo",
    ]);

    let units = document["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);

    // The readable "image" comes through the OCR channel.
    assert_eq!(units[0]["content_type"], "IMAGE_ONLY");
    assert_eq!(units[0]["method"], "RECOGNITION");
    assert_eq!(units[0]["images"][0]["method"], "OCR_ONLY");
    assert_eq!(
        units[0]["text"],
        "Total Due: 230.00\nThank you for your business"
    );

    // The degenerate one-token "image" is discarded by sanitization.
    assert_eq!(units[1]["content_type"], "IMAGE_ONLY");
    assert_eq!(units[1]["text"], "");

    // No unit had native text, so the document counts as scanned.
    assert_eq!(document["is_scanned"], true);
    assert_eq!(document["stats"]["total_images"], 2);
    assert_eq!(document["stats"]["ocr_only_images"], 2);
}

#[test]
fn test_extract_image_units_without_engines_yields_empty_text() {
    let document = extract(&["tests/fixtures/scan.jsonl"]);

    let units = document["units"].as_array().unwrap();
    assert_eq!(units[0]["text"], "");
    assert_eq!(units[0]["images"][0]["method"], "BOTH_FAILED");
    assert_eq!(document["stats"]["failed_images"], 2);
}

#[test]
fn test_extract_rejects_unknown_ocr_engine() {
    cmd()
        .arg("extract")
        .arg("tests/fixtures/scan.jsonl")
        .args(["--ocr", "--ocr-engine", "daydream"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown OCR engine"));
}

#[test]
#[ignore = "Needs the tesseract binary installed"]
fn test_extract_with_tesseract() {
    cmd()
        .arg("extract")
        .arg("tests/fixtures/scan.jsonl")
        .args(["--ocr", "--ocr-lang", "eng"])
        .assert()
        .success();
}

#[test]
#[ignore = "Needs a vision endpoint and OPENAI_API_KEY"]
fn test_extract_with_vision_model() {
    cmd()
        .arg("extract")
        .arg("tests/fixtures/scan.jsonl")
        .arg("--vision")
        .assert()
        .success();
}
