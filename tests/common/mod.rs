#![allow(dead_code)]

use assert_fs::TempDir;
use bit_engine::{InitOptions, ObjectId, Repository, Signature};
use chrono::{DateTime, FixedOffset, TimeZone};
use rstest::fixture;
use std::path::Path;

pub const AUTHOR_NAME: &str = "Ada Lovelace";
pub const AUTHOR_EMAIL: &str = "ada@example.com";

/// Route engine logs to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn repository_dir() -> TempDir {
    init_tracing();
    TempDir::new().expect("Failed to create temp dir")
}

/// A fresh non-bare repository with `user.name` and `user.email` configured
pub fn init_repository(path: &Path) -> Repository {
    init_repository_with(path, InitOptions::default())
}

pub fn init_repository_with(path: &Path, options: InitOptions) -> Repository {
    let repository = Repository::init(path, options).expect("Failed to init repository");

    let mut config = repository.config().expect("Failed to load config");
    config.set_str("user.name", AUTHOR_NAME).expect("Failed to set user.name");
    config.set_str("user.email", AUTHOR_EMAIL).expect("Failed to set user.email");

    repository
}

/// A signature `seconds` after a fixed epoch, so commit ids are reproducible
pub fn signature_at(seconds: i64) -> Signature {
    Signature::new_with_timestamp(AUTHOR_NAME, AUTHOR_EMAIL, timestamp(seconds))
}

pub fn timestamp(seconds: i64) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(2 * 3600)
        .and_then(|offset| offset.timestamp_opt(1_700_000_000 + seconds, 0).single())
        .expect("Failed to build timestamp")
}

pub fn write_file(repository: &Repository, path: &str, content: &str) {
    let full_path = repository.workdir().expect("bare repository").join(path);
    if let Some(parent) = full_path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(full_path, content).expect("Failed to write file");
}

pub fn read_file(repository: &Repository, path: &str) -> String {
    std::fs::read_to_string(repository.workdir().expect("bare repository").join(path))
        .expect("Failed to read file")
}

/// Stage the whole working tree and commit it on `HEAD`
pub async fn commit_all(repository: &Repository, message: &str, seconds: i64) -> ObjectId {
    repository.add_path(".").await.expect("Failed to stage files");
    let tree = repository.write_tree().await.expect("Failed to write tree");
    let parents = repository
        .refs()
        .read_head()
        .expect("Failed to read HEAD")
        .into_iter()
        .collect::<Vec<_>>();

    let signature = signature_at(seconds);
    repository
        .create_commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .expect("Failed to create commit")
}

/// Write one file and commit it
pub async fn commit_file(repository: &Repository, path: &str, content: &str, seconds: i64) -> ObjectId {
    write_file(repository, path, content);
    commit_all(repository, &format!("Update {path}"), seconds).await
}
