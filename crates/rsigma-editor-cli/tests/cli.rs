//! Integration tests for the `rsigma-editor` binary.
//!
//! Each test launches the binary via `assert_cmd`, writes any required
//! fixture files to a temp directory, and asserts on exit code + output.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[allow(deprecated)]
fn rsigma_editor() -> Command {
    Command::cargo_bin("rsigma-editor").expect("binary not found")
}

/// Write `contents` to a temporary file with the given suffix and return it.
fn temp_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const DETECTION: &str = r#"
condition: selection and filter
selection:
    Image|endswith: '\cmd.exe'
    CommandLine|contains:
        - whoami
        - ipconfig
filter:
    User: SYSTEM
"#;

const UNORDERED: &str = r#"
selection:
    Image: cmd.exe
condition: selection
"#;

const BROKEN: &str = r#"
condition: selection and missing
selection:
    1field: x
"#;

// ---------------------------------------------------------------------------
// parse subcommand
// ---------------------------------------------------------------------------

#[test]
fn parse_valid_block() {
    let block = temp_file(".yml", DETECTION);
    rsigma_editor()
        .args(["parse", block.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"condition\": \"selection and filter\""))
        .stdout(predicate::str::contains("\"modifier\": \"endswith\""))
        .stdout(predicate::str::contains("ipconfig"));
}

#[test]
fn parse_nonexistent_file() {
    rsigma_editor()
        .args(["parse", "/tmp/nonexistent_rsigma_editor_test.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error reading"));
}

#[test]
fn parse_non_mapping() {
    let bad = temp_file(".yml", "42");
    rsigma_editor()
        .args(["parse", bad.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error parsing"));
}

#[test]
fn parse_from_stdin() {
    rsigma_editor()
        .args(["parse", "-"])
        .write_stdin(DETECTION)
        .assert()
        .success()
        .stdout(predicate::str::contains("SYSTEM"));
}

#[test]
fn parse_empty_input_uses_prefix() {
    rsigma_editor()
        .args(["parse", "-", "--prefix", "Sel_"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"condition\": \"Sel_1\""))
        .stdout(predicate::str::contains("\"name\": \"Sel_1\""));
}

// ---------------------------------------------------------------------------
// fmt subcommand
// ---------------------------------------------------------------------------

#[test]
fn fmt_puts_condition_first() {
    let block = temp_file(".yml", UNORDERED);
    rsigma_editor()
        .args(["fmt", block.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("condition: selection\n"))
        .stdout(predicate::str::contains("Image: cmd.exe"));
}

// ---------------------------------------------------------------------------
// validate subcommand
// ---------------------------------------------------------------------------

#[test]
fn validate_clean_block() {
    let block = temp_file(".yml", DETECTION);
    rsigma_editor()
        .args(["validate", block.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn validate_reports_every_error() {
    let block = temp_file(".yml", BROKEN);
    rsigma_editor()
        .args(["validate", block.path().to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"/condition\""))
        .stdout(predicate::str::contains("unknown-selection"))
        .stdout(predicate::str::contains("\"/selections/0/data/0/field\""))
        .stdout(predicate::str::contains("invalid-identifier"))
        .stderr(predicate::str::contains("2 error(s)"));
}

// ---------------------------------------------------------------------------
// condition subcommand
// ---------------------------------------------------------------------------

#[test]
fn condition_valid() {
    rsigma_editor()
        .args(["condition", "selection and not filter", "-s", "selection,filter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"operator\": \"none\""))
        .stdout(predicate::str::contains("\"operator\": \"not\""))
        .stdout(predicate::str::contains("\"selection_name\": \"filter\""))
        .stdout(predicate::str::contains("error").not());
}

#[test]
fn condition_unknown_selection() {
    rsigma_editor()
        .args(["condition", "a or c", "-s", "a,b"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown selection 'c'; allowed: a, b"));
}

#[test]
fn condition_syntax_error() {
    rsigma_editor()
        .args(["condition", "a and", "-s", "a"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid-condition"));
}

// ---------------------------------------------------------------------------
// import subcommand
// ---------------------------------------------------------------------------

#[test]
fn import_csv_first_column() {
    let csv = temp_file(".csv", "alpha,1\nbeta,2\n");
    rsigma_editor()
        .args(["import", csv.path().to_str().unwrap(), "--mime", "text/csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"alpha\""))
        .stdout(predicate::str::contains("\"beta\""))
        .stdout(predicate::str::contains("1").not());
}

#[test]
fn import_custom_delimiter() {
    let csv = temp_file(".csv", "a,x;1\n");
    rsigma_editor()
        .args([
            "import",
            csv.path().to_str().unwrap(),
            "--mime",
            "text/csv",
            "--delimiter",
            ";",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"a,x\""));
}

#[test]
fn import_plain_text_keeps_lines() {
    let txt = temp_file(".txt", "a,b\nc\n");
    rsigma_editor()
        .args(["import", txt.path().to_str().unwrap(), "-m", "text/plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"a,b\""));
}

#[test]
fn import_rejects_wrong_type() {
    let file = temp_file(".json", "[]");
    rsigma_editor()
        .args(["import", file.path().to_str().unwrap(), "--mime", "application/json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid-file"));
}

// ---------------------------------------------------------------------------
// edit subcommand
// ---------------------------------------------------------------------------

#[test]
fn edit_rename_cascades_into_condition() {
    let block = temp_file(".yml", DETECTION);
    let edits = temp_file(
        ".json",
        r#"[{"op": "rename_selection", "selection": 1, "name": "not_system"}]"#,
    );
    rsigma_editor()
        .args([
            "edit",
            block.path().to_str().unwrap(),
            "--edits",
            edits.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("condition: selection and not_system"))
        .stdout(predicate::str::contains("not_system:"));
}

#[test]
fn edit_reports_touched_errors() {
    let block = temp_file(".yml", DETECTION);
    let edits = temp_file(
        ".json",
        r#"[{"op": "set_condition", "condition": "selection or nope"}]"#,
    );
    rsigma_editor()
        .args([
            "edit",
            block.path().to_str().unwrap(),
            "--edits",
            edits.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("condition: selection or nope"))
        .stderr(predicate::str::contains("unknown-selection"));
}

#[test]
fn edit_out_of_range() {
    let block = temp_file(".yml", DETECTION);
    let edits = temp_file(".json", r#"[{"op": "delete_selection", "selection": 9}]"#);
    rsigma_editor()
        .args([
            "edit",
            block.path().to_str().unwrap(),
            "--edits",
            edits.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Edit failed"));
}

#[test]
fn edit_invalid_json() {
    let block = temp_file(".yml", DETECTION);
    let edits = temp_file(".json", "not json");
    rsigma_editor()
        .args([
            "edit",
            block.path().to_str().unwrap(),
            "--edits",
            edits.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error loading edits"));
}

// ---------------------------------------------------------------------------
// configuration
// ---------------------------------------------------------------------------

#[test]
fn config_discovered_next_to_input() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".rsigma-editor.yml"),
        "selection_prefix: Block_\n",
    )
    .unwrap();
    let block = dir.path().join("empty.yml");
    std::fs::write(&block, "").unwrap();

    rsigma_editor()
        .args(["parse", block.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"condition\": \"Block_1\""));
}

#[test]
fn config_invalid_file() {
    let config = temp_file(".yml", "default_operator: xor\n");
    let block = temp_file(".yml", DETECTION);
    rsigma_editor()
        .args([
            "validate",
            block.path().to_str().unwrap(),
            "--config",
            config.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error loading config"));
}
