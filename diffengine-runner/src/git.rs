//! [`Git2RepositoryReader`]: the concrete [`RepositoryReader`] adapter.
//!
//! `git2::Repository` is `!Send` — it must be opened inside the thread that
//! uses it, not passed across threads. A dedicated background thread owns
//! the `Repository` for the runner's whole lifetime; requests arrive over a
//! `crossbeam_channel` and each carries a `tokio::sync::oneshot` sender for
//! its reply, turning the worker's fire-and-forget event loop into a proper
//! request/response boundary for the async trait methods below.

use std::path::PathBuf;

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Sender};
use diffengine_core::error::JobError;
use diffengine_core::ports::{RepositoryReader, TreeDiffEntry};
use git2::{Delta, Repository};
use tokio::sync::oneshot;

enum GitRequest {
    TreeDiff {
        from_sha1: Option<String>,
        to_sha1: String,
        reply: oneshot::Sender<Result<Vec<TreeDiffEntry>, String>>,
    },
    ReadBlob {
        sha1: String,
        reply: oneshot::Sender<Result<Vec<u8>, String>>,
    },
}

pub struct Git2RepositoryReader {
    request_tx: Sender<GitRequest>,
}

impl Git2RepositoryReader {
    /// Spawns the background thread that opens `repo_path` and services
    /// requests until this handle (and every clone of its sender) is
    /// dropped, at which point the channel closes and the thread exits.
    pub fn open(repo_path: impl Into<PathBuf>) -> Result<Self, git2::Error> {
        let repo_path = repo_path.into();
        // Fail fast if the path isn't a repository before committing to the thread.
        Repository::open(&repo_path)?;

        let (request_tx, request_rx) = unbounded::<GitRequest>();
        std::thread::spawn(move || {
            let repo = match Repository::open(&repo_path) {
                Ok(r) => r,
                Err(_) => return,
            };
            for request in request_rx {
                handle_request(&repo, request);
            }
        });

        Ok(Self { request_tx })
    }

    async fn roundtrip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, String>>) -> GitRequest,
    ) -> Result<T, JobError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(build(reply_tx))
            .map_err(|_| JobError::Repository("git worker thread has exited".into()))?;
        reply_rx
            .await
            .map_err(|_| JobError::Repository("git worker dropped the reply channel".into()))?
            .map_err(JobError::Repository)
    }
}

fn handle_request(repo: &Repository, request: GitRequest) {
    match request {
        GitRequest::TreeDiff { from_sha1, to_sha1, reply } => {
            let _ = reply.send(tree_diff(repo, from_sha1.as_deref(), &to_sha1));
        }
        GitRequest::ReadBlob { sha1, reply } => {
            let _ = reply.send(read_blob(repo, &sha1));
        }
    }
}

fn tree_diff(repo: &Repository, from_sha1: Option<&str>, to_sha1: &str) -> Result<Vec<TreeDiffEntry>, String> {
    let to_tree = commit_tree(repo, to_sha1).map_err(|e| e.to_string())?;
    let from_tree = match from_sha1 {
        Some(sha1) => Some(commit_tree(repo, sha1).map_err(|e| e.to_string())?),
        None => None,
    };

    let mut opts = git2::DiffOptions::new();
    opts.include_typechange(true);
    let diff = repo
        .diff_tree_to_tree(from_tree.as_ref(), Some(&to_tree), Some(&mut opts))
        .map_err(|e| e.to_string())?;

    // RefCell shares mutable access between the delta closure and the single
    // callback git2 invokes per file; both run sequentially on this thread.
    use std::cell::RefCell;
    let entries: RefCell<Vec<TreeDiffEntry>> = RefCell::new(Vec::new());

    diff.foreach(
        &mut |delta, _progress| {
            entries.borrow_mut().push(delta_to_entry(&delta));
            true
        },
        None,
        None,
        None,
    )
    .map_err(|e| e.to_string())?;

    Ok(entries.into_inner())
}

fn delta_to_entry(delta: &git2::DiffDelta) -> TreeDiffEntry {
    let path = delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (old_blob, old_mode) = match delta.status() {
        Delta::Added => (None, None),
        _ if delta.old_file().id().is_zero() => (None, None),
        _ => (Some(delta.old_file().id().to_string()), Some(delta.old_file().mode() as i64)),
    };
    let (new_blob, new_mode) = match delta.status() {
        Delta::Deleted => (None, None),
        _ if delta.new_file().id().is_zero() => (None, None),
        _ => (Some(delta.new_file().id().to_string()), Some(delta.new_file().mode() as i64)),
    };

    TreeDiffEntry { path, old_blob, old_mode, new_blob, new_mode }
}

fn commit_tree<'a>(repo: &'a Repository, sha1: &str) -> Result<git2::Tree<'a>, git2::Error> {
    let oid = git2::Oid::from_str(sha1)?;
    repo.find_commit(oid)?.tree()
}

fn read_blob(repo: &Repository, sha1: &str) -> Result<Vec<u8>, String> {
    let oid = git2::Oid::from_str(sha1).map_err(|e| e.to_string())?;
    let blob = repo.find_blob(oid).map_err(|e| e.to_string())?;
    Ok(blob.content().to_vec())
}

#[async_trait]
impl RepositoryReader for Git2RepositoryReader {
    async fn tree_diff(&self, from_sha1: Option<&str>, to_sha1: &str) -> Result<Vec<TreeDiffEntry>, JobError> {
        let from_sha1 = from_sha1.map(str::to_string);
        let to_sha1 = to_sha1.to_string();
        self.roundtrip(|reply| GitRequest::TreeDiff { from_sha1, to_sha1, reply }).await
    }

    async fn read_blob(&self, sha1: &str) -> Result<Vec<u8>, JobError> {
        let sha1 = sha1.to_string();
        self.roundtrip(|reply| GitRequest::ReadBlob { sha1, reply }).await
    }

    async fn decode(&self, path: &str) -> Result<Vec<String>, JobError> {
        // Matches the original's preference order: a path-specific encoding
        // override is a repository-configuration concern outside this
        // crate's scope, so every path falls back to the universal default.
        let _ = path;
        Ok(vec!["utf-8".to_string()])
    }
}
