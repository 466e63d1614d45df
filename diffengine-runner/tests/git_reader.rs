//! End-to-end test of [`Git2RepositoryReader`] against a real temporary git
//! repository, in the style of `diffengine-core/tests/db_lifecycle.rs`.

use std::fs;

use diffengine_core::ports::RepositoryReader;
use diffengine_runner::git::Git2RepositoryReader;

fn commit_file(repo: &git2::Repository, path: &str, contents: &str) -> git2::Oid {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(path), contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(std::path::Path::new(path)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = git2::Signature::now("test", "test@example.com").unwrap();
    let parents: Vec<git2::Commit> = match repo.head().ok().and_then(|h| h.peel_to_commit().ok()) {
        Some(c) => vec![c],
        None => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, "test commit", &tree, &parent_refs).unwrap()
}

#[tokio::test]
async fn tree_diff_and_read_blob_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    let first = commit_file(&repo, "a.txt", "hello\n");
    let second = commit_file(&repo, "a.txt", "hello\nworld\n");

    let reader = Git2RepositoryReader::open(dir.path().to_path_buf()).unwrap();

    let entries = reader.tree_diff(Some(&first.to_string()), &second.to_string()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "a.txt");
    let new_blob = entries[0].new_blob.clone().unwrap();

    let contents = reader.read_blob(&new_blob).await.unwrap();
    assert_eq!(String::from_utf8(contents).unwrap(), "hello\nworld\n");
}

#[tokio::test]
async fn tree_diff_from_empty_tree_reports_additions() {
    let dir = tempfile::TempDir::new().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();
    let commit = commit_file(&repo, "new.txt", "content\n");

    let reader = Git2RepositoryReader::open(dir.path().to_path_buf()).unwrap();
    let entries = reader.tree_diff(None, &commit.to_string()).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert!(entries[0].old_blob.is_none());
    assert!(entries[0].new_blob.is_some());
}
