use assert_fs::TempDir;
use bit_engine::artifacts::objects::object::ObjectBox;
use bit_engine::artifacts::objects::tree::Tree;
use bit_engine::{BitError, HashAlgorithm, InitOptions, Signature};
use common::{commit_all, commit_file, init_repository, init_repository_with, repository_dir, write_file};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::PathBuf;

mod common;

#[rstest]
fn blobs_are_content_addressed(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());

    let oid = repository.write_blob(b"hello world\n").unwrap();

    // same digest git computes for this content
    assert_eq!(oid.to_string(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
    assert_eq!(repository.write_blob(b"hello world\n").unwrap(), oid);
    assert!(repository.object_exists(&oid));
    assert!(matches!(repository.find_object(&oid).unwrap(), ObjectBox::Blob(_)));
}

#[rstest]
fn sha256_repositories_use_wide_digests(repository_dir: TempDir) {
    let repository = init_repository_with(
        repository_dir.path(),
        InitOptions {
            object_format: HashAlgorithm::Sha256,
            ..InitOptions::default()
        },
    );

    let oid = repository.write_blob(b"hello world\n").unwrap();

    assert_eq!(repository.algorithm(), HashAlgorithm::Sha256);
    assert_eq!(oid.algorithm(), HashAlgorithm::Sha256);
    assert_eq!(oid.to_string().len(), 64);
}

#[rstest]
fn corrupted_loose_objects_are_reported(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());
    let oid = repository.write_blob(b"original\n").unwrap();
    let other = repository.write_blob(b"tampered\n").unwrap();

    let objects = repository.path().join("objects");
    let target = objects.join(oid.to_path());
    std::fs::remove_file(&target).unwrap();
    std::fs::copy(objects.join(other.to_path()), &target).unwrap();

    assert!(matches!(repository.find_blob(&oid), Err(BitError::Corrupt { .. })));
}

#[rstest]
fn missing_objects_are_not_found(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());
    let absent = HashAlgorithm::Sha1.digest(b"never stored");

    assert!(!repository.object_exists(&absent));
    assert!(repository.find_commit(&absent).unwrap_err().is_not_found());
}

#[rstest]
#[tokio::test]
async fn list_tree_flattens_nested_directories(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());
    write_file(&repository, "README.md", "Example\n");
    write_file(&repository, "src/main.rs", "fn main() {}\n");
    write_file(&repository, "src/bin/tool.rs", "fn main() {}\n");
    let commit = commit_all(&repository, "Layout", 0).await;

    let paths = repository
        .list_tree(&commit)
        .unwrap()
        .into_keys()
        .collect::<Vec<_>>();

    assert_eq!(
        paths,
        vec![
            PathBuf::from("README.md"),
            PathBuf::from("src/bin/tool.rs"),
            PathBuf::from("src/main.rs"),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn nested_entries_are_found_by_path(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());
    write_file(&repository, "README.md", "Example\n");
    write_file(&repository, "src/bin/tool.rs", "fn main() {}\n");
    let commit = commit_all(&repository, "Layout", 0).await;

    let tool = repository.find_entry_by_path(&commit, "src/bin/tool.rs").unwrap();
    assert_eq!(&repository.find_blob(&tool.oid).unwrap().content()[..], b"fn main() {}\n");
    assert!(repository.find_entry_by_path(&commit, "src/bin").unwrap().is_tree());

    for missing in ["src/lib.rs", "README.md/inner", "", "../README.md"] {
        assert!(
            repository.find_entry_by_path(&commit, missing).unwrap_err().is_not_found(),
            "{missing}"
        );
    }
}

#[rstest]
#[tokio::test]
async fn removed_paths_leave_the_next_tree(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());
    commit_file(&repository, "keep.txt", "keep\n", 0).await;
    write_file(&repository, "drop.txt", "drop\n");
    repository.add_path("drop.txt").await.unwrap();

    repository.remove_path("drop.txt").await.unwrap();
    let tree = repository.write_tree().await.unwrap();

    let entries = repository.find_tree(&tree).unwrap();
    assert!(entries.get("keep.txt").is_some());
    assert!(entries.get("drop.txt").is_none());
    assert!(repository.workdir().unwrap().join("drop.txt").exists());
    assert!(repository.remove_path("never-tracked.txt").await.unwrap_err().is_not_found());
}

#[rstest]
#[tokio::test]
async fn paths_outside_the_working_tree_are_not_staged(repository_dir: TempDir) {
    let repository = init_repository(&repository_dir.path().join("inner"));
    std::fs::write(repository_dir.path().join("outside.txt"), "outside\n").unwrap();
    write_file(&repository, "inside.txt", "inside\n");

    for path in ["../outside.txt", "sub/../../outside.txt"] {
        assert!(matches!(
            repository.add_path(path).await,
            Err(BitError::InvalidName(_))
        ));
    }

    let absolute = repository.workdir().unwrap().join("inside.txt");
    assert_eq!(
        repository.add_path(&absolute).await.unwrap(),
        vec![PathBuf::from("inside.txt")]
    );

    let tree = repository.write_tree().await.unwrap();
    let entries = repository.find_tree(&tree).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries.get("inside.txt").is_some());
}

#[rstest]
fn negative_utc_signatures_keep_their_digest(repository_dir: TempDir) {
    let repository = init_repository(repository_dir.path());
    let tree = repository.database().store(&Tree::default()).unwrap();
    let signature = Signature::try_from("Ada Lovelace <ada@example.com> 1700000000 -0000").unwrap();

    let commit_id = repository
        .create_commit(None, &signature, &signature, "imported", &tree, &[])
        .unwrap();
    let commit = repository.find_commit(&commit_id).unwrap();

    assert_eq!(
        commit.author().display(),
        "Ada Lovelace <ada@example.com> 1700000000 -0000"
    );
    assert_eq!(repository.database().store(&commit).unwrap(), commit_id);
}
