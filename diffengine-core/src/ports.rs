//! Trait boundaries ("ports") to the external collaborators this crate
//! treats as opaque: the git object store, the syntax highlighter, and the
//! pub/sub notification channel. Concrete adapters live in the runner
//! binary crate; this crate only depends on the trait objects.
//!
//! Explicit-context replacement: rather than reach for module-level
//! singletons, every call that needs one of these collaborators takes a
//! `&Context` bundling them together with the persistence handle.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::Persistence;
use crate::error::JobError;

/// One changed path between two tree-ish objects, as returned by
/// [`RepositoryReader::tree_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDiffEntry {
    pub path: String,
    pub old_blob: Option<String>,
    pub old_mode: Option<i64>,
    pub new_blob: Option<String>,
    pub new_mode: Option<i64>,
}

/// Read-only access to a git object store: tree diffs, blob contents, and
/// the encodings a path's decoder prefers.
#[async_trait]
pub trait RepositoryReader: Send + Sync {
    async fn tree_diff(&self, from_sha1: Option<&str>, to_sha1: &str) -> Result<Vec<TreeDiffEntry>, JobError>;

    async fn read_blob(&self, sha1: &str) -> Result<Vec<u8>, JobError>;

    /// Preferred text encodings for `path`, tried in order when decoding
    /// its blob to text (e.g. for whitespace/line-ending aware diffing).
    async fn decode(&self, path: &str) -> Result<Vec<String>, JobError>;
}

/// One highlighted token: a byte range within the source tagged with a
/// scope name (e.g. `"keyword.control"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightToken {
    pub start: usize,
    pub end: usize,
    pub scope: String,
}

/// Maps a blob, given a language guess and conflict-marker awareness, to a
/// token stream.
#[async_trait]
pub trait Highlighter: Send + Sync {
    async fn highlight(
        &self,
        blob: &[u8],
        language: Option<&str>,
        conflicts: bool,
        encodings: &[String],
    ) -> Result<Vec<HighlightToken>, JobError>;

    /// Best-guess language label for `path`, or `None` if unrecognized.
    fn detect_language(&self, path: &str) -> Option<String>;
}

/// Outbound pub/sub notifications, one named channel per changeset.
pub trait Publisher: Send + Sync {
    fn monitor_changeset(&self, changeset: i64);
    fn update_changeset(&self, changeset: i64);
    fn forget_changeset(&self, changeset: i64);
}

/// Bundles the persistence handle with the external collaborators, passed
/// by reference through the scheduler instead of relying on globals.
pub struct Context {
    pub db: Persistence,
    pub git: Arc<dyn RepositoryReader>,
    pub highlighter: Arc<dyn Highlighter>,
    pub publisher: Arc<dyn Publisher>,
}

impl Context {
    pub fn new(
        db: Persistence,
        git: Arc<dyn RepositoryReader>,
        highlighter: Arc<dyn Highlighter>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self { db, git, highlighter, publisher }
    }
}
