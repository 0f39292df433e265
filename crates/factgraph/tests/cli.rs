use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn fgraph(dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("fgraph").into();
    cmd.current_dir(dir);
    for var in [
        "FACTGRAPH_VALIDATOR_URL",
        "FACTGRAPH_VALIDATOR_TOKEN",
        "FACTGRAPH_VALIDATOR_CONCURRENCY",
        "FACTGRAPH_LANGUAGE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Writes a single-segment document and returns its path.
fn write_document(dir: &Path, id: &str, text: &str) -> PathBuf {
    let path = dir.join(format!("{id}.json"));
    let document = serde_json::json!({
        "metadata": { "id": id, "title": format!("Episode {id}") },
        "segments": [{ "start_seconds": 0.0, "end_seconds": 30.0, "text": text }],
    });
    fs::write(&path, document.to_string()).unwrap();
    path
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn entity_names(graph: &Value) -> Vec<String> {
    graph["entities"]
        .as_object()
        .unwrap()
        .values()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect()
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    let mut cmd: Command = cargo_bin_cmd!("fgraph").into();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("fgraph"));
}

// --- Config ---

#[test]
fn config_prints_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = stdout_json(fgraph(tmp.path()).arg("config"));
    assert_eq!(config["run"]["document_concurrency"], 4);
    assert!(config["validator"]["endpoint"].is_null());
}

#[test]
fn config_applies_flags_and_env() {
    let tmp = TempDir::new().unwrap();
    let config = stdout_json(
        fgraph(tmp.path())
            .env("FACTGRAPH_LANGUAGE", "de")
            .env("FACTGRAPH_VALIDATOR_TOKEN", "secret")
            .args(["config", "--labels", "SPYWARE=Pegasus"])
            .args(["--validator-url", "http://127.0.0.1:9/validate"]),
    );
    assert_eq!(config["filter"]["expected_language"], "de");
    assert_eq!(config["extraction"]["custom_labels"]["SPYWARE"][0], "Pegasus");
    assert_eq!(config["validator"]["endpoint"], "http://127.0.0.1:9/validate");
    assert!(config["validator"].get("api_token").is_none());
}

#[test]
fn config_file_is_read() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("factgraph.json");
    fs::write(&path, r#"{"dedup": {"similarity_threshold": 0.9}}"#).unwrap();
    let config = stdout_json(
        fgraph(tmp.path())
            .arg("--config")
            .arg(&path)
            .arg("config"),
    );
    assert_eq!(config["dedup"]["similarity_threshold"], 0.9);
}

#[test]
fn config_out_of_range_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("factgraph.json");
    fs::write(&path, r#"{"dedup": {"similarity_threshold": 1.5}}"#).unwrap();
    fgraph(tmp.path())
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("similarity_threshold"));
}

#[test]
fn malformed_labels_fail() {
    let tmp = TempDir::new().unwrap();
    fgraph(tmp.path())
        .args(["config", "--labels", "SPYWARE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("LABEL=term1,term2"));
}

// --- Extract ---

#[test]
fn extract_builds_one_graph_per_document() {
    let tmp = TempDir::new().unwrap();
    let doc = write_document(
        tmp.path(),
        "ep1",
        "Elon Musk founded SpaceX. Everyone knows Musk. People say Musk works hard.",
    );
    let graphs = stdout_json(fgraph(tmp.path()).arg("extract").arg(&doc));
    let graphs = graphs.as_array().unwrap();
    assert_eq!(graphs.len(), 1);
    assert_eq!(graphs[0]["document_id"], "ep1");

    let names = entity_names(&graphs[0]);
    assert!(names.contains(&"Elon Musk".to_string()));
    assert!(!names.contains(&"Musk".to_string()));
}

#[test]
fn extract_uses_custom_labels() {
    let tmp = TempDir::new().unwrap();
    let doc = write_document(
        tmp.path(),
        "ep1",
        "Researchers found Pegasus on the phone of a journalist.",
    );
    let graphs = stdout_json(
        fgraph(tmp.path())
            .args(["extract", "--labels", "SPYWARE=Pegasus"])
            .arg(&doc),
    );
    let spyware: Vec<&Value> = graphs[0]["entities"]
        .as_object()
        .unwrap()
        .values()
        .filter(|e| e["type"] == "SPYWARE")
        .collect();
    assert_eq!(spyware.len(), 1);
    assert_eq!(spyware[0]["name"], "Pegasus");
}

#[test]
fn extract_empty_document_gives_empty_graph() {
    let tmp = TempDir::new().unwrap();
    let doc = write_document(tmp.path(), "silent", "   ");
    let graphs = stdout_json(fgraph(tmp.path()).arg("extract").arg(&doc));
    assert_eq!(graphs[0]["document_id"], "silent");
    assert!(graphs[0]["entities"].as_object().unwrap().is_empty());
}

#[test]
fn extract_missing_file_fails() {
    let tmp = TempDir::new().unwrap();
    fgraph(tmp.path())
        .args(["extract", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}

#[test]
fn extract_invalid_document_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.json");
    fs::write(&path, r#"{"segments": []}"#).unwrap();
    fgraph(tmp.path())
        .arg("extract")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid document"));
}

#[test]
fn extract_requires_files() {
    let tmp = TempDir::new().unwrap();
    fgraph(tmp.path()).arg("extract").assert().failure();
}

// --- Collection ---

#[test]
fn collection_without_resolve_has_no_unified_graph() {
    let tmp = TempDir::new().unwrap();
    let a = write_document(tmp.path(), "a", "Elon Musk founded SpaceX.");
    let b = write_document(tmp.path(), "b", "Elon Musk runs Tesla.");
    let output = stdout_json(fgraph(tmp.path()).arg("collection").arg(&a).arg(&b));
    assert_eq!(output["documents"].as_array().unwrap().len(), 2);
    assert!(output.get("unified").is_none());
}

#[test]
fn collection_resolve_unifies_across_documents() {
    let tmp = TempDir::new().unwrap();
    let a = write_document(tmp.path(), "a", "Elon Musk founded SpaceX.");
    let b = write_document(tmp.path(), "b", "Elon Musk runs Tesla.");
    let output = stdout_json(
        fgraph(tmp.path())
            .args(["collection", "--resolve"])
            .arg(&a)
            .arg(&b),
    );

    let unified = &output["unified"];
    assert_eq!(unified["document_ids"].as_array().unwrap().len(), 2);
    let musk: Vec<&Value> = unified["entities"]
        .as_object()
        .unwrap()
        .values()
        .filter(|e| e["name"] == "Elon Musk")
        .collect();
    assert_eq!(musk.len(), 1);
    assert_eq!(musk[0]["member_ids"].as_array().unwrap().len(), 2);
    assert_eq!(musk[0]["temporal_context"]["document_count"], 2);
}
