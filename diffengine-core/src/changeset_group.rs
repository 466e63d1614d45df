//! [`ChangesetGroup`]: the domain-specific [`JobGroup`], implementing the
//! four-phase state machine (Structure, Complete/merge-filter, Content,
//! Syntax highlight) described by `calculate_remaining`.
//!
//! Coroutine-control-flow replacement: the original state machine awaited
//! DB queries inline between phases. Here each `calculate_remaining` pass
//! batches all of its `Persistence` scans up front into local snapshot
//! variables, then makes synchronous decisions over them — the async
//! suspension points are confined to the handful of `db.*` calls at the
//! top of the function, not threaded through the phase logic itself.

use std::collections::HashMap;

use crate::db::Side;
use crate::error::JobResult;
use crate::job::Job;
use crate::ports::Context;
use crate::scheduler::{JobGroup, SchedulerEvent};
use crate::types::AbsoluteBlock;

/// The per-changeset job group. `reference_id` is set by the runner at
/// construction time for a primary merge changeset, resolved via
/// `Persistence::find_merge_reference`.
pub struct ChangesetGroup {
    pub changeset_id: i64,
    pub jobs: JobGroup,
    reference_id: Option<i64>,
    structure_complete: bool,
    content_complete: bool,
    highlight_complete: bool,
}

impl ChangesetGroup {
    pub fn new(changeset_id: i64, repository_id: i64, reference_id: Option<i64>) -> Self {
        Self {
            changeset_id,
            jobs: JobGroup::new(repository_id),
            reference_id,
            structure_complete: false,
            content_complete: false,
            highlight_complete: false,
        }
    }

    /// Returns true as soon as a phase's subset of `not_started` is empty
    /// while its `*_complete` flag is still false — triggering an in-place
    /// phase transition without waiting for the whole group to drain.
    pub fn should_calculate_remaining(&self) -> bool {
        if self.jobs.is_drained() {
            return true;
        }
        (!self.structure_complete || !self.content_complete) && self.jobs.is_drained()
    }

    /// Re-inventories persisted state and emits whatever jobs are still
    /// needed, advancing through phases A → D as far as the current
    /// snapshot allows. Mirrors the four-phase breakdown one-to-one.
    pub async fn calculate_remaining(&mut self, ctx: &Context) -> JobResult<Vec<SchedulerEvent>> {
        let mut events = Vec::new();
        let db = &ctx.db;

        // Phase A — structure.
        let changeset = db.get_changeset(self.changeset_id).await?;

        if let Some(reference_id) = self.reference_id {
            let reference = db.get_changeset(reference_id).await?;
            if !reference.processed && !db.has_failed(reference_id, "structure").await? {
                self.jobs.add_job(Job::CalculateStructureDifference {
                    changeset: reference_id,
                    from_sha1: reference.from_commit.clone(),
                    to_sha1: reference.to_commit.clone(),
                    queue_content: false,
                    is_for_merge: true,
                });
            }
            if !changeset.processed {
                self.jobs.add_job(Job::CalculateStructureDifference {
                    changeset: self.changeset_id,
                    from_sha1: changeset.from_commit.clone(),
                    to_sha1: changeset.to_commit.clone(),
                    queue_content: false,
                    is_for_merge: true,
                });
            }
            if !reference.processed || !changeset.processed {
                if !self.jobs.is_drained() {
                    events.push(SchedulerEvent::JobsAdded);
                }
                return Ok(events);
            }
        } else if !changeset.processed {
            self.jobs.add_job(Job::CalculateStructureDifference {
                changeset: self.changeset_id,
                from_sha1: changeset.from_commit.clone(),
                to_sha1: changeset.to_commit.clone(),
                queue_content: true,
                is_for_merge: false,
            });
            events.push(SchedulerEvent::JobsAdded);
            return Ok(events);
        }

        self.structure_complete = true;
        tracing::debug!(changeset = self.changeset_id, "structure phase complete");

        // Phase B — complete / merge-filter.
        if !changeset.complete {
            if let Some(reference_id) = self.reference_id {
                let primary_files = db.list_file_ids(self.changeset_id).await?;
                let reference_files = db.list_file_ids(reference_id).await?;
                let reference_set: std::collections::HashSet<i64> = reference_files.into_iter().collect();
                let keep: Vec<i64> = primary_files.into_iter().filter(|f| reference_set.contains(f)).collect();
                tracing::debug!(changeset = self.changeset_id, reference_id, kept = keep.len(), "applying merge file-set filter");
                db.apply_merge_filter(self.changeset_id, reference_id, keep).await?;
                events.push(SchedulerEvent::NotifyUpdate { changeset: reference_id });
            } else {
                db.mark_complete(self.changeset_id).await?;
            }
            events.push(SchedulerEvent::NotifyUpdate { changeset: self.changeset_id });
        }

        // Phase C — content.
        let files_needing_examine = db.scan_files_needing_examine(self.changeset_id).await?;
        let all_files_examined = files_needing_examine.is_empty();

        let mut content_jobs_added = 0usize;
        for f in files_needing_examine {
            if self.jobs.add_job(Job::ExamineFiles {
                changeset: self.changeset_id,
                file: f.file,
                path: f.path,
                old_sha1: f.old_sha1,
                new_sha1: f.new_sha1,
            }) {
                content_jobs_added += 1;
            }
        }

        let pending_diffs = db.scan_pending_diffs(self.changeset_id).await?;
        for diff in pending_diffs {
            let changeset_file = db.get_changeset_file(self.changeset_id, diff.file).await?;
            if self.jobs.add_job(Job::CalculateFileDifference {
                changeset: self.changeset_id,
                file: diff.file,
                old_sha1: changeset_file.old_sha1,
                new_sha1: changeset_file.new_sha1,
            }) {
                content_jobs_added += 1;
            }
        }

        let content_state_before = db.content_difference_state(self.changeset_id).await?;
        let content_complete_before = content_state_before.map(|s| s.complete).unwrap_or(false);

        if content_jobs_added > 0 {
            events.push(SchedulerEvent::JobsAdded);
        } else if !content_complete_before {
            db.mark_content_complete(self.changeset_id).await?;
            self.content_complete = true;
            tracing::debug!(changeset = self.changeset_id, "content phase complete");
            events.push(SchedulerEvent::NotifyUpdate { changeset: self.changeset_id });
        } else {
            self.content_complete = true;
        }

        // Unanalyzed changed-lines blocks, grouped by file, each becoming
        // one AnalyzeChangedLines job carrying that file's full block list.
        let unanalyzed = db.scan_unanalyzed_blocks(self.changeset_id).await?;
        let mut per_file: HashMap<i64, Vec<AbsoluteBlock>> = HashMap::new();
        for (file, block) in unanalyzed {
            per_file.entry(file).or_default().push(block);
        }
        for (file, blocks) in per_file {
            let changeset_file = db.get_changeset_file(self.changeset_id, file).await?;
            self.jobs.add_job(Job::AnalyzeChangedLines {
                changeset: self.changeset_id,
                file,
                old_sha1: changeset_file.old_sha1.unwrap_or_default(),
                new_sha1: changeset_file.new_sha1.unwrap_or_default(),
                blocks,
            });
        }

        // Phase D — syntax highlight.
        let highlight_state = db.highlight_request_state(self.changeset_id).await?;
        let requested = highlight_state.as_ref().map(|s| s.requested).unwrap_or(false);
        let evaluated_before = highlight_state.as_ref().map(|s| s.evaluated).unwrap_or(false);

        if all_files_examined && requested && !evaluated_before {
            let pending_old = db.scan_highlight_files(self.changeset_id, Side::Old).await?;
            let pending_new = db.scan_highlight_files(self.changeset_id, Side::New).await?;
            let mut highlight_jobs_added = 0usize;
            for p in pending_old.into_iter().chain(pending_new) {
                if self.jobs.add_job(Job::SyntaxHighlightFile {
                    highlightfile: p.highlightfile,
                    sha1: p.sha1,
                    language: p.language,
                    conflicts: p.conflicts,
                }) {
                    highlight_jobs_added += 1;
                }
            }

            let files_needing_language = db.scan_files_needing_language(self.changeset_id).await?;
            let mut language_jobs_added = 0usize;
            for f in files_needing_language {
                if let Some(sha1) = f.new_sha1.or(f.old_sha1) {
                    if self.jobs.add_job(Job::DetectFileLanguages {
                        changeset: self.changeset_id,
                        file: f.file,
                        sha1,
                    }) {
                        language_jobs_added += 1;
                    }
                }
            }

            if language_jobs_added == 0 {
                db.set_highlight_evaluated(self.changeset_id).await?;
            }
            if highlight_jobs_added == 0 {
                self.highlight_complete = true;
            }
            if highlight_jobs_added > 0 || language_jobs_added > 0 {
                events.push(SchedulerEvent::JobsAdded);
            }
        } else if !requested {
            self.highlight_complete = true;
        }

        if self.jobs.is_drained() && self.structure_complete && self.content_complete && self.highlight_complete {
            events.push(SchedulerEvent::NotifyForget { changeset: self.changeset_id });
        }

        Ok(events)
    }
}
