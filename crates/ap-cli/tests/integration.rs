#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn catalog_ap(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-ap").unwrap();
    cmd.current_dir(dir.path()).env_remove("CATALOG_AP_CONFIG");
    cmd
}

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

const PROJECT_SCHEMA: &str = r#"{
  "resources": [
    {
      "name": "project",
      "schema": {
        "fields": [
          { "name": "id", "type": "string", "constraints": { "required": true } },
          { "name": "name", "type": "string" },
          { "name": "started", "type": "datetime" }
        ],
        "primaryKey": ["id"]
      }
    },
    {
      "name": "subject",
      "fields": [
        { "name": "id", "type": "integer", "constraints": { "required": true, "unique": true } },
        { "name": "project", "type": "string" }
      ],
      "foreignKeys": [
        { "fields": "project", "reference": { "resource": "project", "fields": "id" } }
      ]
    }
  ]
}"#;

// ---------------------------------------------------------------------------
// catalog-ap compile
// ---------------------------------------------------------------------------

#[test]
fn compile_prints_ermrest_document() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "schema.json", PROJECT_SCHEMA);

    let output = catalog_ap(&dir)
        .arg("compile")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: serde_json::Value = serde_json::from_slice(&output).unwrap();

    let tables = &doc["schemas"]["CFDE"]["tables"];
    assert_eq!(tables["project"]["keys"][0]["unique_columns"], serde_json::json!(["id"]));
    assert_eq!(
        tables["project"]["column_definitions"][2]["type"]["typename"],
        "timestamptz"
    );
    assert_eq!(
        tables["subject"]["foreign_keys"][0]["names"],
        serde_json::json!([["CFDE", "subject_project_fkey"]])
    );
}

#[test]
fn compile_honours_schema_name_flag() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "schema.json", PROJECT_SCHEMA);

    catalog_ap(&dir)
        .args(["compile", "--schema-name", "demo"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"demo\""))
        .stdout(predicate::str::contains("CFDE").not());
}

#[test]
fn compile_takes_schema_name_from_config() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "schema.json", PROJECT_SCHEMA);
    let config = write(&dir, "ap.yaml", "schema_name: lab\n");

    catalog_ap(&dir)
        .arg("--config")
        .arg(&config)
        .arg("compile")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"lab\""));
}

#[test]
fn compile_rejects_unsupported_type() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "schema.json",
        r#"{ "resources": [{ "name": "t", "fields": [{ "name": "loc", "type": "geopoint" }] }] }"#,
    );

    catalog_ap(&dir)
        .arg("compile")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("mapping undefined for type 'geopoint'"));
}

#[test]
fn compile_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    catalog_ap(&dir)
        .args(["compile", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

// ---------------------------------------------------------------------------
// catalog-ap config
// ---------------------------------------------------------------------------

#[test]
fn config_prints_defaults_and_masks_tokens() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "ap.yaml",
        "max_workers: 2\nauth:\n  tokens:\n    s3cret-value: [\"urn:id:alice\"]\n",
    );

    catalog_ap(&dir)
        .arg("config")
        .env("CATALOG_AP_CONFIG", &config)
        .assert()
        .success()
        .stdout(predicate::str::contains("max_workers: 2"))
        .stdout(predicate::str::contains("default_server: demo.derivacloud.org"))
        .stdout(predicate::str::contains("urn:id:alice"))
        .stdout(predicate::str::contains("s3cret-value").not());
}

#[test]
fn config_rejects_zero_workers() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "ap.yaml", "max_workers: 0\n");

    catalog_ap(&dir)
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_workers"));
}
