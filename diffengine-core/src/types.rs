//! Row types for the difference-engine schema (see [`crate::schema`]).
//!
//! These mirror the tables exactly; `Persistence` (see [`crate::db`]) is the
//! only module allowed to construct or mutate them from SQL rows.

/// A changeset: the diff between `from_commit` (or the empty tree, if
/// `None`) and `to_commit` within one repository.
///
/// `for_merge == Some(to_commit)` identifies the *primary* merge changeset;
/// any other non-`None` `for_merge` value identifies a *reference*
/// changeset used only to filter the primary's file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changeset {
    pub id: i64,
    pub repository: i64,
    pub from_commit: Option<String>,
    pub to_commit: String,
    pub for_merge: Option<String>,
    pub is_replay: bool,
    pub processed: bool,
    pub complete: bool,
}

impl Changeset {
    /// True iff this changeset is the user-visible diff of a merge commit
    /// (as opposed to the auxiliary reference changeset used to filter it).
    pub fn is_primary_merge(&self) -> bool {
        self.for_merge.as_deref() == Some(self.to_commit.as_str())
    }
}

/// Content-diff completion tracker, one row per changeset that has
/// requested content diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDifferenceState {
    pub changeset: i64,
    pub complete: bool,
}

/// Highlight-evaluation completion tracker, one row per changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightRequestState {
    pub changeset: i64,
    pub requested: bool,
    pub evaluated: bool,
}

/// A file known to a repository, deduplicated by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub id: i64,
    pub path: String,
}

/// One changed file within a changeset's structural diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetFile {
    pub changeset: i64,
    pub file: i64,
    pub path: String,
    pub old_sha1: Option<String>,
    pub old_mode: Option<i64>,
    pub new_sha1: Option<String>,
    pub new_mode: Option<i64>,
}

/// Per-file content-diff bookkeeping row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetFileDifference {
    pub changeset: i64,
    pub file: i64,
    pub old_highlightfile: Option<i64>,
    pub new_highlightfile: Option<i64>,
    pub comparison_pending: bool,
}

/// One contiguous edit block within a file's line-level diff.
///
/// `offset` is relative to the previous block (or the start of file for the
/// first block); absolute offsets are reconstructed by accumulating
/// `offset + delete_length` / `offset + insert_length` across the ordered
/// block sequence for one file (see [`crate::changeset_group`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedLinesBlock {
    pub changeset: i64,
    pub file: i64,
    pub block_index: i64,
    pub offset: i64,
    pub delete_count: i64,
    pub delete_length: i64,
    pub insert_count: i64,
    pub insert_length: i64,
    pub analysis: Option<String>,
}

/// A content-addressed highlighted-blob cache entry, shared across
/// changesets that reference the same `(sha1, language, conflicts)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightFile {
    pub id: i64,
    pub sha1: String,
    pub language: Option<String>,
    pub conflicts: bool,
    pub highlighted: bool,
}

/// A memoized job failure. Once recorded, the job's key must never be
/// re-emitted for this changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesetError {
    pub changeset: i64,
    pub job_key: String,
    pub fatal: bool,
    pub traceback: Option<String>,
}

/// An absolute-offset changed-lines block, reconstructed from the ordered
/// per-file block sequence. Used as input to `AnalyzeChangedLines` jobs and
/// the [`crate::chunk_analyzer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteBlock {
    pub block_index: i64,
    pub delete_offset: i64,
    pub delete_length: i64,
    pub insert_offset: i64,
    pub insert_length: i64,
}
