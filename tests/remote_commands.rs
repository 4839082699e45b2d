use assert_fs::TempDir;
use async_trait::async_trait;
use bit_engine::artifacts::objects::object_type::ObjectType;
use bit_engine::artifacts::transport::local::LocalTransport;
use bit_engine::artifacts::transport::{FetchedObject, ObjectStream, RefUpdate, RemoteRef};
use bit_engine::{BitError, CloneOptions, Credentials, FetchOptions, ObjectId, RefName, Repository, Transport};
use bytes::Bytes;
use common::{commit_file, init_repository, read_file, repository_dir};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;
use std::sync::Arc;

mod common;

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Serves a local repository but flips the first byte of every blob
struct TamperingTransport;

#[async_trait]
impl Transport for TamperingTransport {
    async fn list_refs(&self, url: &str, options: &FetchOptions) -> bit_engine::Result<Vec<RemoteRef>> {
        LocalTransport.list_refs(url, options).await
    }

    async fn fetch_objects(
        &self,
        url: &str,
        wants: &[ObjectId],
        haves: &[ObjectId],
        options: &FetchOptions,
    ) -> bit_engine::Result<ObjectStream> {
        let objects = LocalTransport.fetch_objects(url, wants, haves, options).await?;

        Ok(objects
            .map(|object| {
                object.map(|mut object| {
                    if object.kind == ObjectType::Blob && !object.data.is_empty() {
                        let mut data = object.data.to_vec();
                        data[0] ^= 0xff;
                        object.data = Bytes::from(data);
                    }
                    object
                })
            })
            .boxed())
    }

    async fn push_objects(
        &self,
        url: &str,
        objects: Vec<FetchedObject>,
        updates: &[RefUpdate],
        options: &FetchOptions,
    ) -> bit_engine::Result<()> {
        LocalTransport.push_objects(url, objects, updates, options).await
    }
}

/// An upstream repository with two commits on `master`
async fn upstream(dir: &TempDir) -> (Repository, ObjectId) {
    let repository = init_repository(&dir.path().join("upstream"));
    commit_file(&repository, "README.md", "Example\n", 0).await;
    let tip = commit_file(&repository, "src/lib.rs", "pub fn answer() -> u32 { 42 }\n", 10).await;

    (repository, tip)
}

#[rstest]
#[tokio::test]
async fn local_transport_streams_only_missing_objects(repository_dir: TempDir) {
    let (upstream, tip) = upstream(&repository_dir).await;
    let first = upstream.rev_parse("HEAD~1").unwrap();

    let objects = LocalTransport
        .fetch_objects(
            &file_url(upstream.workdir().unwrap()),
            std::slice::from_ref(&tip),
            &[first],
            &FetchOptions::default(),
        )
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<bit_engine::Result<Vec<_>>>()
        .unwrap();

    // the tip commit, its root tree, src/ and src/lib.rs
    assert_eq!(objects.len(), 4);
    assert!(objects.iter().any(|object| object.oid == tip));
    for object in &objects {
        object.verify(upstream.algorithm()).unwrap();
    }
}

#[rstest]
#[tokio::test]
async fn clone_checks_out_the_remote_default_branch(repository_dir: TempDir) {
    let (upstream, tip) = upstream(&repository_dir).await;
    let destination = repository_dir.path().join("clone");

    let clone = Repository::clone(
        &file_url(upstream.workdir().unwrap()),
        &destination,
        CloneOptions::default(),
    )
    .await
    .unwrap();

    assert!(!clone.is_bare());
    assert_eq!(clone.current_branch().unwrap().unwrap().as_ref() as &str, "master");
    assert_eq!(clone.refs().read_head().unwrap(), Some(tip.clone()));
    assert_eq!(clone.rev_parse("refs/remotes/origin/master").unwrap(), tip);
    assert_eq!(clone.rev_parse("origin/HEAD").unwrap(), tip);
    assert_eq!(read_file(&clone, "README.md"), "Example\n");
    assert_eq!(read_file(&clone, "src/lib.rs"), "pub fn answer() -> u32 { 42 }\n");

    let config = clone.config().unwrap();
    assert_eq!(
        config.get_str("branch.master.remote").unwrap().as_deref(),
        Some("origin")
    );
    assert_eq!(
        config.get_str("branch.master.merge").unwrap().as_deref(),
        Some("refs/heads/master")
    );
}

#[rstest]
#[tokio::test]
async fn clone_of_a_named_branch_into_a_bare_repository(repository_dir: TempDir) {
    let (upstream, tip) = upstream(&repository_dir).await;
    let first = upstream.rev_parse("HEAD~1").unwrap();
    upstream.create_branch("stable", &first, false).unwrap();
    let destination = repository_dir.path().join("mirror.git");

    let clone = Repository::clone(
        upstream.workdir().unwrap().to_str().unwrap(),
        &destination,
        CloneOptions {
            bare: true,
            branch: Some("stable".into()),
            ..CloneOptions::default()
        },
    )
    .await
    .unwrap();

    assert!(clone.is_bare());
    assert_eq!(clone.current_branch().unwrap().unwrap().as_ref() as &str, "stable");
    assert_eq!(clone.refs().read_head().unwrap(), Some(first));
    assert_eq!(clone.rev_parse("origin/master").unwrap(), tip);
}

#[rstest]
#[tokio::test]
async fn clone_rejects_tampered_objects_and_cleans_up(repository_dir: TempDir) {
    let (upstream, _) = upstream(&repository_dir).await;
    let destination = repository_dir.path().join("clone");

    let err = Repository::clone_with(
        &TamperingTransport,
        &file_url(upstream.workdir().unwrap()),
        &destination,
        CloneOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BitError::ObjectIntegrity { .. }), "{err:?}");
    assert!(!destination.exists());
}

#[rstest]
#[tokio::test]
async fn clone_of_a_missing_repository_is_a_transport_error(repository_dir: TempDir) {
    let destination = repository_dir.path().join("clone");

    let err = Repository::clone(
        &file_url(&repository_dir.path().join("nowhere")),
        &destination,
        CloneOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BitError::Transport(_)), "{err:?}");
    assert!(!destination.exists());
}

#[rstest]
#[tokio::test]
async fn clone_into_a_non_empty_directory_is_refused(repository_dir: TempDir) {
    let (upstream, _) = upstream(&repository_dir).await;
    let destination = repository_dir.path().join("occupied");
    std::fs::create_dir_all(&destination).unwrap();
    std::fs::write(destination.join("keep.txt"), "mine\n").unwrap();

    let err = Repository::clone(
        &file_url(upstream.workdir().unwrap()),
        &destination,
        CloneOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BitError::AlreadyExists(_)));
    assert!(destination.join("keep.txt").is_file());
}

#[rstest]
#[tokio::test]
async fn ls_remote_advertises_head_and_branches(repository_dir: TempDir) {
    let (upstream, tip) = upstream(&repository_dir).await;
    let local = init_repository(&repository_dir.path().join("local"));

    let options = FetchOptions::default().with_credentials(Arc::new(Credentials::UsernamePassword {
        username: "ada".into(),
        password: "secret".into(),
    }));

    let advertised = local
        .ls_remote(&file_url(upstream.workdir().unwrap()), &options)
        .await
        .unwrap();

    let head = advertised.iter().find(|remote_ref| remote_ref.name.is_head()).unwrap();
    assert_eq!(head.oid, tip);
    assert_eq!(
        head.symref_target,
        Some(RefName::try_parse("refs/heads/master").unwrap())
    );
    assert!(
        advertised
            .iter()
            .any(|remote_ref| remote_ref.name.as_str() == "refs/heads/master" && remote_ref.oid == tip)
    );
}

#[rstest]
#[tokio::test]
async fn push_then_fetch_through_a_bare_remote(repository_dir: TempDir) {
    let (upstream, _) = upstream(&repository_dir).await;
    let bare = repository_dir.path().join("shared.git");
    Repository::clone(
        &file_url(upstream.workdir().unwrap()),
        &bare,
        CloneOptions {
            bare: true,
            ..CloneOptions::default()
        },
    )
    .await
    .unwrap();

    let alice = Repository::clone(&file_url(&bare), repository_dir.path().join("alice"), CloneOptions::default())
        .await
        .unwrap();
    let bob = Repository::clone(&file_url(&bare), repository_dir.path().join("bob"), CloneOptions::default())
        .await
        .unwrap();
    let pushed = commit_file(&alice, "NOTES.md", "from alice\n", 100).await;
    alice.create_branch("feature", &pushed, false).unwrap();
    let updates = alice
        .push("origin", &["master", "feature"], &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].new, Some(pushed.clone()));
    assert_eq!(alice.rev_parse("origin/master").unwrap(), pushed);

    let remote = Repository::open(&bare).unwrap();
    assert_eq!(remote.rev_parse("refs/heads/master").unwrap(), pushed);
    assert_eq!(remote.rev_parse("refs/heads/feature").unwrap(), pushed);

    let summary = bob.fetch("origin", &FetchOptions::default()).await.unwrap();
    assert!(summary.objects > 0);
    assert_eq!(
        summary.updated,
        vec![
            (RefName::try_parse("refs/remotes/origin/feature").unwrap(), pushed.clone()),
            (RefName::try_parse("refs/remotes/origin/master").unwrap(), pushed.clone()),
        ]
    );
    assert!(summary.pruned.is_empty());

    alice
        .push("origin", &[":feature"], &FetchOptions::default())
        .await
        .unwrap();
    assert!(remote.rev_parse("refs/heads/feature").is_err());

    let summary = bob
        .fetch(
            "origin",
            &FetchOptions {
                prune: true,
                ..FetchOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(summary.updated.is_empty());
    assert_eq!(
        summary.pruned,
        vec![RefName::try_parse("refs/remotes/origin/feature").unwrap()]
    );
}

#[rstest]
#[tokio::test]
async fn non_fast_forward_push_needs_force(repository_dir: TempDir) {
    let (upstream, _) = upstream(&repository_dir).await;
    let bare = repository_dir.path().join("shared.git");
    Repository::clone(
        &file_url(upstream.workdir().unwrap()),
        &bare,
        CloneOptions {
            bare: true,
            ..CloneOptions::default()
        },
    )
    .await
    .unwrap();
    let alice = Repository::clone(&file_url(&bare), repository_dir.path().join("alice"), CloneOptions::default())
        .await
        .unwrap();

    let rewound = alice.rev_parse("HEAD~1").unwrap();
    let err = alice
        .push("origin", &[&format!("{rewound}:master")], &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    alice
        .push("origin", &[&format!("+{rewound}:master")], &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(Repository::open(&bare).unwrap().rev_parse("master").unwrap(), rewound);
}

#[rstest]
#[tokio::test]
async fn push_to_a_checked_out_branch_is_refused(repository_dir: TempDir) {
    let (upstream, _) = upstream(&repository_dir).await;
    let alice = Repository::clone(
        &file_url(upstream.workdir().unwrap()),
        repository_dir.path().join("alice"),
        CloneOptions::default(),
    )
    .await
    .unwrap();
    let pushed = commit_file(&alice, "NOTES.md", "from alice\n", 100).await;

    let err = alice
        .push("origin", &["master"], &FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BitError::Transport(_)), "{err:?}");
    assert_ne!(upstream.refs().read_head().unwrap(), Some(pushed));
}
