//! CLI integration tests for the swagger-validate binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("swagger-validate"))
}

// Helper to create a temp spec or payload file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const PETSTORE: &str = r##"{
    "swagger": "2.0",
    "paths": {
        "/pets/{petId}": {
            "put": {
                "operationId": "Pets_Update",
                "parameters": [
                    {"name": "petId", "in": "path", "required": true, "type": "string"},
                    {"name": "pet", "in": "body", "required": true, "schema": {"$ref": "#/definitions/Pet"}}
                ],
                "responses": {
                    "200": {"description": "ok", "schema": {"$ref": "#/definitions/Pet"}}
                }
            }
        }
    },
    "definitions": {
        "Pet": {
            "type": "object",
            "discriminator": "petType",
            "required": ["name"],
            "properties": {
                "petType": {"type": "string"},
                "name": {"type": "string"},
                "id": {"type": "string", "readOnly": true}
            }
        },
        "Dog": {
            "allOf": [{"$ref": "#/definitions/Pet"}],
            "properties": {"barks": {"type": "boolean"}}
        }
    }
}"##;

fn petstore(dir: &TempDir) -> String {
    write_temp_file(dir, "pets.json", PETSTORE)
        .to_str()
        .unwrap()
        .to_string()
}

mod check_command {
    use super::*;

    #[test]
    fn compiles_every_validator() {
        let dir = TempDir::new().unwrap();
        cmd()
            .args(["check", &petstore(&dir)])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 operations, 2 validators compiled, 0 failed"));
    }

    #[test]
    fn json_output() {
        let dir = TempDir::new().unwrap();
        cmd()
            .args(["check", &petstore(&dir), "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""valid":true"#))
            .stdout(predicate::str::contains(r#""compiled":2"#));
    }

    #[test]
    fn compile_error_fails_with_exit_2() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(
            &dir,
            "bad.json",
            r##"{
                "swagger": "2.0",
                "paths": {
                    "/things": {
                        "post": {
                            "parameters": [{"name": "t", "in": "body", "schema": {"$ref": "#/definitions/Thing"}}],
                            "responses": {"204": {"description": "none"}}
                        }
                    }
                },
                "definitions": {
                    "Thing": {
                        "type": "object",
                        "properties": {"id": {"type": "string", "x-ms-mutability": ["never"]}}
                    }
                }
            }"##,
        );
        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("1 operations, 1 validators compiled, 1 failed"));
    }

    #[test]
    fn yaml_spec() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(
            &dir,
            "spec.yaml",
            r#"
swagger: "2.0"
paths:
  /health:
    get:
      operationId: Health_Get
      responses:
        "200":
          description: ok
"#,
        );
        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 operations, 2 validators compiled"));
    }
}

mod resolve_command {
    use super::*;

    #[test]
    fn prints_transformed_definition() {
        let dir = TempDir::new().unwrap();
        cmd()
            .args(["resolve", &petstore(&dir), "--definition", "Dog"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""additionalProperties":false"#))
            .stdout(predicate::str::contains(r#""barks""#))
            .stdout(predicate::str::contains(r#""name""#));
    }

    #[test]
    fn resolve_with_pretty() {
        let dir = TempDir::new().unwrap();
        cmd()
            .args(["resolve", &petstore(&dir), "--definition", "Pet", "--pretty"])
            .assert()
            .success()
            // Pretty output has newlines and indentation
            .stdout(predicate::str::contains("{\n"));
    }

    #[test]
    fn resolve_with_output_file() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("pet.json");
        cmd()
            .args(["resolve", &petstore(&dir), "-d", "Pet", "--output", output.to_str().unwrap()])
            .assert()
            .success();
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["discriminator"], "petType");
    }

    #[test]
    fn unknown_definition() {
        let dir = TempDir::new().unwrap();
        cmd()
            .args(["resolve", &petstore(&dir), "--definition", "Fish"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("definition not found: Fish"));
    }
}

mod request_command {
    use super::*;

    #[test]
    fn valid_payload() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(
            &dir,
            "req.json",
            r#"{"path": {"petId": "1"}, "body": {"petType": "Dog", "name": "Rex", "barks": true}}"#,
        );
        cmd()
            .args(["request", &petstore(&dir), "--operation-id", "Pets_Update"])
            .args(["--payload", payload.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn read_only_property_rejected() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(&dir, "req.json", r#"{"body": {"name": "Rex", "id": "7"}}"#);
        cmd()
            .args(["request", &petstore(&dir), "--operation-id", "Pets_Update"])
            .args(["--payload", payload.to_str().unwrap()])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("READONLY_PROPERTY_NOT_ALLOWED_IN_REQUEST"));
    }

    #[test]
    fn json_output_invalid() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(
            &dir,
            "req.json",
            r#"{"body": {"petType": "Dog", "name": "Rex", "extra": 1}}"#,
        );
        cmd()
            .args(["request", &petstore(&dir), "--operation-id", "Pets_Update", "--json"])
            .args(["--payload", payload.to_str().unwrap()])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(r#""valid":false"#))
            .stdout(predicate::str::contains("OBJECT_ADDITIONAL_PROPERTIES"))
            .stdout(predicate::str::contains(r#""pathsInPayload":["/extra"]"#));
    }

    #[test]
    fn config_suppresses_issue() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(
            &dir,
            "req.json",
            r#"{"body": {"petType": "Dog", "name": "Rex", "extra": 1}}"#,
        );
        let config = write_temp_file(
            &dir,
            "config.yaml",
            r##"
suppressions:
  - code: OBJECT_ADDITIONAL_PROPERTIES
    location: "#/definitions/Dog"
    text-matches: extra
"##,
        );
        cmd()
            .args(["request", &petstore(&dir), "--operation-id", "Pets_Update"])
            .args(["--payload", payload.to_str().unwrap()])
            .args(["--config", config.to_str().unwrap()])
            .assert()
            .success();
    }

    #[test]
    fn unknown_operation() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(&dir, "req.json", "{}");
        cmd()
            .args(["request", &petstore(&dir), "--operation-id", "Pets_Delete"])
            .args(["--payload", payload.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Pets_Delete"));
    }
}

mod response_command {
    use super::*;

    #[test]
    fn valid_response() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(
            &dir,
            "resp.json",
            r#"{"headers": {"Content-Type": "application/json"}, "body": {"name": "Rex", "id": "7"}}"#,
        );
        cmd()
            .args(["response", &petstore(&dir), "--operation-id", "Pets_Update", "--status", "200"])
            .args(["--payload", payload.to_str().unwrap()])
            .assert()
            .success();
    }

    #[test]
    fn undefined_status_code() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(&dir, "resp.json", "{}");
        cmd()
            .args(["response", &petstore(&dir), "--operation-id", "Pets_Update", "--status", "201"])
            .args(["--payload", payload.to_str().unwrap(), "--json"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("INVALID_RESPONSE_CODE"));
    }

    #[test]
    fn missing_body() {
        let dir = TempDir::new().unwrap();
        let payload = write_temp_file(&dir, "resp.json", r#"{"headers": {"Content-Type": "application/json"}}"#);
        cmd()
            .args(["response", &petstore(&dir), "--operation-id", "Pets_Update", "--status", "200"])
            .args(["--payload", payload.to_str().unwrap()])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("INVALID_RESPONSE_BODY"));
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn file_not_found() {
        cmd()
            .args(["check", "/nonexistent/pets.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn invalid_json_spec() {
        let dir = TempDir::new().unwrap();
        let spec = write_temp_file(&dir, "bad.json", "{ not valid json");
        cmd()
            .args(["check", spec.to_str().unwrap()])
            .assert()
            .code(2);
    }

    #[test]
    fn invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = write_temp_file(&dir, "config.json", r#"{"includeErrors": ["NOT_A_CODE"]}"#);
        cmd()
            .args(["check", &petstore(&dir), "--config", config.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Error loading config"));
    }

    #[test]
    fn missing_status_for_response() {
        let dir = TempDir::new().unwrap();
        cmd()
            .args(["response", &petstore(&dir), "--operation-id", "Pets_Update", "--payload", "x.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--status"));
    }
}

mod help_and_version {
    use super::*;

    #[test]
    fn help_flag() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("check"))
            .stdout(predicate::str::contains("resolve"));
    }

    #[test]
    fn version_flag() {
        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("swagger-validate"));
    }
}
