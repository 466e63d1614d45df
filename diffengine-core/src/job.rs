//! The six job kinds a [`crate::changeset_group::ChangesetGroup`] schedules,
//! and the stable keys used to dedup and memoize them.
//!
//! Each kind names its inputs, the table(s) it populates, and the
//! follow-up jobs it may enqueue — see the doc comment on each variant.

use crate::types::AbsoluteBlock;

/// Identifies one job instance for dedup (`not_started`/`in_flight`/`done`
/// set membership) and for `changeseterrors` memoization. Two jobs with
/// equal keys are the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKey {
    CalculateStructureDifference { changeset: i64 },
    ExamineFiles { changeset: i64, file: i64 },
    CalculateFileDifference { changeset: i64, file: i64 },
    AnalyzeChangedLines { changeset: i64, file: i64, block_index: i64 },
    DetectFileLanguages { changeset: i64, file: i64 },
    SyntaxHighlightFile { sha1: String, language: String, conflicts: bool },
}

impl JobKey {
    /// Stable string form, as stored in `changeseterrors.job_key`.
    pub fn serialize(&self) -> String {
        match self {
            JobKey::CalculateStructureDifference { changeset } => {
                format!("structure:{changeset}")
            }
            JobKey::ExamineFiles { changeset, file } => format!("examine:{changeset}:{file}"),
            JobKey::CalculateFileDifference { changeset, file } => {
                format!("filediff:{changeset}:{file}")
            }
            JobKey::AnalyzeChangedLines { changeset, file, block_index } => {
                format!("analyze:{changeset}:{file}:{block_index}")
            }
            JobKey::DetectFileLanguages { changeset, file } => {
                format!("detectlang:{changeset}:{file}")
            }
            JobKey::SyntaxHighlightFile { sha1, language, conflicts } => {
                format!("highlight:{sha1}:{language}:{conflicts}")
            }
        }
    }
}

/// One unit of scheduled work. `fatal_on_error` follows the spec's error
/// classification: some job kinds treat any failure as data-fatal (memoize
/// and move on), others allow transient retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Populates `changesetfiles` and initial `changesetchangedlines`, and
    /// sets `changesets.processed = true`. If `queue_content`, follow-up is
    /// one `ExamineFiles` per file.
    CalculateStructureDifference {
        changeset: i64,
        from_sha1: Option<String>,
        to_sha1: String,
        queue_content: bool,
        is_for_merge: bool,
    },
    /// Classifies one file's blob pair (binary? oversized? identical after
    /// filters?) and creates its `changesetfiledifference` row. Follow-up:
    /// `CalculateFileDifference` if a content diff is warranted.
    ExamineFiles {
        changeset: i64,
        file: i64,
        path: String,
        old_sha1: Option<String>,
        new_sha1: Option<String>,
    },
    /// Runs the line-level diff for one file, replacing its
    /// `changesetchangedlines` rows, and clears `comparison_pending`.
    /// Follow-up: `AnalyzeChangedLines` per unanalyzed block.
    CalculateFileDifference {
        changeset: i64,
        file: i64,
        old_sha1: Option<String>,
        new_sha1: Option<String>,
    },
    /// Runs `ChunkAnalyzer` over one file's changed-lines blocks and writes
    /// `analysis`.
    AnalyzeChangedLines { changeset: i64, file: i64, old_sha1: String, new_sha1: String, blocks: Vec<AbsoluteBlock> },
    /// Associates a file-version with a language (or `None`) and
    /// creates/reuses the `highlightfile` row.
    DetectFileLanguages { changeset: i64, file: i64, sha1: String },
    /// Produces and stores the highlighted rendering of one blob, setting
    /// `highlightfile.highlighted = true`.
    SyntaxHighlightFile { highlightfile: i64, sha1: String, language: String, conflicts: bool },
}

impl Job {
    pub fn key(&self) -> JobKey {
        match self {
            Job::CalculateStructureDifference { changeset, .. } => {
                JobKey::CalculateStructureDifference { changeset: *changeset }
            }
            Job::ExamineFiles { changeset, file, .. } => JobKey::ExamineFiles { changeset: *changeset, file: *file },
            Job::CalculateFileDifference { changeset, file, .. } => {
                JobKey::CalculateFileDifference { changeset: *changeset, file: *file }
            }
            Job::AnalyzeChangedLines { changeset, file, blocks, .. } => JobKey::AnalyzeChangedLines {
                changeset: *changeset,
                file: *file,
                block_index: blocks.first().map(|b| b.block_index).unwrap_or_default(),
            },
            Job::DetectFileLanguages { changeset, file, .. } => {
                JobKey::DetectFileLanguages { changeset: *changeset, file: *file }
            }
            Job::SyntaxHighlightFile { sha1, language, conflicts, .. } => {
                JobKey::SyntaxHighlightFile { sha1: sha1.clone(), language: language.clone(), conflicts: *conflicts }
            }
        }
    }

    /// Whether any failure of this job should be treated as permanent
    /// (memoized in `changeseterrors`, never retried) rather than
    /// transient.
    pub fn fatal_on_error(&self) -> bool {
        matches!(
            self,
            Job::CalculateStructureDifference { .. }
                | Job::ExamineFiles { .. }
                | Job::CalculateFileDifference { .. }
        )
    }
}
