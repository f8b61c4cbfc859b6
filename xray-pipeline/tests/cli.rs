use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

/// Points the broker at a closed port so an accidental connection attempt fails fast.
fn command() -> Command {
    let mut cmd = Command::cargo_bin("xray-pipeline").expect("Binary exists");
    cmd.env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .env("BROKER_URI", "nats://127.0.0.1:1")
        .env("BROKER_TIMEOUT_SECS", "1")
        .env("STORAGE_URI", "memory://")
        .env_remove("PORT")
        .env_remove("BATCH_SOURCE_PATH");
    cmd
}

#[test]
fn produce_with_missing_source_fails() {
    command()
        .arg("produce")
        .arg("--source")
        .arg("does/not/exist.json")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failed to load batch"));
}

#[test]
fn produce_with_invalid_json_fails() {
    let source = NamedTempFile::new().expect("temp source");
    write(source.path(), r#"{ "deviceId": "123", }"#).expect("write source");

    command()
        .arg("produce")
        .arg("--source")
        .arg(source.path())
        .assert()
        .failure();
}

#[test]
fn produce_with_empty_batch_succeeds_without_broker() {
    let source = NamedTempFile::new().expect("temp source");
    write(source.path(), "{}").expect("write source");

    command()
        .arg("produce")
        .arg("--source")
        .arg(source.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to publish"));
}

#[test]
fn produce_with_unreachable_broker_fails() {
    let source = NamedTempFile::new().expect("temp source");
    write(source.path(), r#"{"dev-1":{"data":[[1]],"time":1}}"#).expect("write source");

    command()
        .arg("produce")
        .arg("--source")
        .arg(source.path())
        .assert()
        .failure();
}

#[test]
fn invalid_config_value_fails_before_any_work() {
    command()
        .env("CONSUMER_CONCURRENCY", "many")
        .arg("consume")
        .assert()
        .failure()
        .stdout(predicate::str::contains("CONSUMER_CONCURRENCY"));
}

#[test]
fn help_lists_subcommands() {
    command()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("produce")
                .and(predicate::str::contains("consume"))
                .and(predicate::str::contains("serve")),
        );
}
