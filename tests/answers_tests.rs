//! Answers file persistence tests

use std::fs;

use modstack::{Answers, ModuleName};
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn test_answers_survive_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("answers.json");

    let mut answers = Answers::new("dev", "us-west-2")
        .with("s3", "bucket", "artifacts")
        .with("vpc", "id", "vpc-1")
        .with("deploymentHelper", "deploy", false);
    answers.modules = vec![ModuleName::from("vpc"), ModuleName::from("deploymentHelper")];

    answers.save_to_file(&path).unwrap();
    let loaded = Answers::load_from_file(&path).unwrap();

    assert_eq!(loaded, answers);
    assert_eq!(loaded.get("deploymentHelper", "deploy"), Some(&json!(false)));
}

#[test]
fn test_saved_file_uses_flat_namespace_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("answers.json");

    Answers::new("prod", "eu-west-1")
        .with("kms", "id", "key-1")
        .save_to_file(&path)
        .unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["environment"], json!("prod"));
    assert_eq!(raw["kms"]["id"], json!("key-1"));
    assert_eq!(raw["modules"], json!([]));
}

#[test]
fn test_hand_written_file_loads_unknown_namespaces() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("answers.json");
    fs::write(
        &path,
        r#"{
            "environment": "dev",
            "region": "us-east-1",
            "s3": { "bucket": "artifacts" },
            "custom": { "nested": { "depth": 2 } }
        }"#,
    )
    .unwrap();

    let answers = Answers::load_from_file(&path).unwrap();

    assert!(answers.modules.is_empty());
    assert_eq!(answers.get_str("s3", "bucket"), Some("artifacts"));
    assert_eq!(answers.get("custom", "nested"), Some(&json!({ "depth": 2 })));
    assert!(answers.validate().is_ok());
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("answers.json");
    fs::write(&path, "{ not json").unwrap();

    let err = Answers::load_from_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse answers JSON"));
}
