//! [`Runner`]: the long-running service. Polls for incomplete changesets,
//! drives each one's [`ChangesetGroup`] through its phases, and executes
//! the jobs those phases emit on a bounded pool.
//!
//! The supervisor/worker split mirrors the teacher's `event.rs` heartbeat
//! loop: a `tokio::time::interval` heartbeat re-polls `scan_incomplete` on a
//! fixed cadence, the same way the teacher re-checks its SIGTERM flag every
//! 50ms regardless of what else is happening on the channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use diffengine_core::changeset_group::ChangesetGroup;
use diffengine_core::db::Persistence;
use diffengine_core::error::JobError;
use diffengine_core::job::Job;
use diffengine_core::linediff::diff_lines;
use diffengine_core::ports::{Context, Highlighter, Publisher, RepositoryReader};
use diffengine_core::scheduler::{JobOutcome, SchedulerEvent};
use diffengine_core::types::{ChangedLinesBlock, ChangesetFile, ChangesetFileDifference};
use tokio::sync::Semaphore;
use tokio::time::{interval, Duration};

pub struct Runner {
    ctx: Arc<Context>,
    repository_id: i64,
    poll_interval: Duration,
    capacity: usize,
    groups: HashMap<i64, ChangesetGroup>,
    /// Changesets that hit a logic error: per §7, skipped for the rest of
    /// this process's lifetime rather than retried.
    skipped: HashSet<i64>,
}

impl Runner {
    pub fn new(
        db: Persistence,
        git: Arc<dyn RepositoryReader>,
        highlighter: Arc<dyn Highlighter>,
        publisher: Arc<dyn Publisher>,
        repository_id: i64,
        poll_interval: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(Context::new(db, git, highlighter, publisher)),
            repository_id,
            poll_interval,
            capacity,
            groups: HashMap::new(),
            skipped: HashSet::new(),
        }
    }

    /// Runs until `shutdown` resolves, draining in-flight jobs before
    /// returning rather than aborting them.
    pub async fn run(&mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        let semaphore = Arc::new(Semaphore::new(self.capacity.max(1)));
        let (result_tx, mut result_rx) = tokio::sync::mpsc::unbounded_channel::<JobResultMsg>();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.discover_incomplete().await {
                        tracing::error!(error = %e, "scan_incomplete failed");
                    }
                    self.dispatch_ready(&semaphore, result_tx.clone());
                }
                Some(msg) = result_rx.recv() => {
                    self.handle_job_result(msg).await;
                    self.dispatch_ready(&semaphore, result_tx.clone());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Let whatever's already in flight finish; every permit returning to
        // the semaphore means every spawned task has completed.
        let _ = semaphore.acquire_many(self.capacity.max(1) as u32).await;
    }

    async fn discover_incomplete(&mut self) -> Result<(), JobError> {
        let incomplete = self.ctx.db.scan_incomplete().await?;
        for row in incomplete {
            if self.skipped.contains(&row.changeset) || self.groups.contains_key(&row.changeset) {
                continue;
            }
            let changeset = self.ctx.db.get_changeset(row.changeset).await?;
            let reference_id = self.ctx.db.find_merge_reference(&changeset).await?;
            let mut group = ChangesetGroup::new(changeset.id, self.repository_id, reference_id);
            self.ctx.publisher.monitor_changeset(changeset.id);
            match group.calculate_remaining(&self.ctx).await {
                Ok(events) => self.apply_events(events),
                Err(JobError::Logic(msg)) => {
                    tracing::error!(changeset = changeset.id, error = %msg, "logic error, skipping changeset");
                    self.skipped.insert(changeset.id);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(changeset = changeset.id, error = %e, "calculate_remaining failed, will retry");
                    continue;
                }
            }
            self.groups.insert(changeset.id, group);
        }
        Ok(())
    }

    fn apply_events(&self, events: Vec<SchedulerEvent>) {
        for event in events {
            match event {
                SchedulerEvent::JobsAdded => {}
                SchedulerEvent::NotifyUpdate { changeset } => self.ctx.publisher.update_changeset(changeset),
                SchedulerEvent::NotifyForget { changeset } => self.ctx.publisher.forget_changeset(changeset),
            }
        }
    }

    fn dispatch_ready(&mut self, semaphore: &Arc<Semaphore>, result_tx: tokio::sync::mpsc::UnboundedSender<JobResultMsg>) {
        for (&changeset_id, group) in self.groups.iter_mut() {
            let available = semaphore.available_permits();
            if available == 0 {
                break;
            }
            for job in group.jobs.start_next(available) {
                let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else { break };
                let ctx = Arc::clone(&self.ctx);
                let result_tx = result_tx.clone();
                let key = job.key();
                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = run_job(&ctx, job).await;
                    let _ = result_tx.send(JobResultMsg { changeset: changeset_id, key, outcome });
                });
            }
        }
    }

    async fn handle_job_result(&mut self, msg: JobResultMsg) {
        if let Err(ref e) = msg.outcome {
            if e.is_permanent() {
                let _ = self
                    .ctx
                    .db
                    .record_error(msg.changeset, msg.key.serialize(), true, Some(e.to_string()))
                    .await;
            } else {
                tracing::warn!(changeset = msg.changeset, job = ?msg.key, error = %e, "job failed transiently");
            }
        }

        let outcome = match &msg.outcome {
            Ok(()) => JobOutcome::Done,
            Err(e) if e.is_permanent() => JobOutcome::Failed { traceback: Some(e.to_string()) },
            Err(_) => JobOutcome::Transient,
        };

        let Some(group) = self.groups.get_mut(&msg.changeset) else { return };
        let drained = group.jobs.on_job_completed(&msg.key, outcome);

        if matches!(msg.outcome, Err(JobError::Logic(_))) {
            tracing::error!(changeset = msg.changeset, "logic error executing job, skipping changeset");
            self.skipped.insert(msg.changeset);
            self.groups.remove(&msg.changeset);
            return;
        }

        if drained || group.should_calculate_remaining() {
            match group.calculate_remaining(&self.ctx).await {
                Ok(events) => {
                    let forgotten = events.iter().any(|e| matches!(e, SchedulerEvent::NotifyForget { .. }));
                    self.apply_events(events);
                    if forgotten {
                        self.groups.remove(&msg.changeset);
                    }
                }
                Err(e) => tracing::warn!(changeset = msg.changeset, error = %e, "calculate_remaining failed"),
            }
        }
    }
}

struct JobResultMsg {
    changeset: i64,
    key: diffengine_core::job::JobKey,
    outcome: Result<(), JobError>,
}

async fn run_job(ctx: &Context, job: Job) -> Result<(), JobError> {
    match job {
        Job::CalculateStructureDifference { changeset, from_sha1, to_sha1, .. } => {
            let entries = ctx.git.tree_diff(from_sha1.as_deref(), &to_sha1).await?;
            let mut files = Vec::with_capacity(entries.len());
            for entry in entries {
                let file = ctx.db.ensure_file(entry.path.clone()).await?;
                files.push(ChangesetFile {
                    changeset,
                    file,
                    path: entry.path,
                    old_sha1: entry.old_blob,
                    old_mode: entry.old_mode,
                    new_sha1: entry.new_blob,
                    new_mode: entry.new_mode,
                });
            }
            ctx.db.set_changeset_files(changeset, files).await?;
            ctx.db.mark_processed(changeset).await?;
            Ok(())
        }

        Job::ExamineFiles { changeset, file, old_sha1, new_sha1, .. } => {
            let old_blob = match &old_sha1 {
                Some(sha1) => Some(ctx.git.read_blob(sha1).await?),
                None => None,
            };
            let new_blob = match &new_sha1 {
                Some(sha1) => Some(ctx.git.read_blob(sha1).await?),
                None => None,
            };
            let both_present = old_blob.is_some() && new_blob.is_some();
            let either_binary = [&old_blob, &new_blob].iter().any(|b| b.as_ref().is_some_and(|b| b.contains(&0)));
            let unchanged = old_sha1.is_some() && old_sha1 == new_sha1;
            let comparison_pending = both_present && !either_binary && !unchanged;

            ctx.db
                .insert_file_difference(ChangesetFileDifference {
                    changeset,
                    file,
                    old_highlightfile: None,
                    new_highlightfile: None,
                    comparison_pending,
                })
                .await?;
            Ok(())
        }

        Job::CalculateFileDifference { changeset, file, old_sha1, new_sha1 } => {
            let old_lines = match &old_sha1 {
                Some(sha1) => decode_lines(ctx, sha1).await?,
                None => Vec::new(),
            };
            let new_lines = match &new_sha1 {
                Some(sha1) => decode_lines(ctx, sha1).await?,
                None => Vec::new(),
            };
            let blocks = diff_lines(changeset, file, &old_lines, &new_lines);
            ctx.db.set_changed_lines(changeset, file, blocks).await?;
            ctx.db.mark_diff_computed(changeset, file).await?;
            Ok(())
        }

        Job::AnalyzeChangedLines { changeset, file, old_sha1, new_sha1, blocks } => {
            let old_lines = if old_sha1.is_empty() { Vec::new() } else { decode_lines(ctx, &old_sha1).await? };
            let new_lines = if new_sha1.is_empty() { Vec::new() } else { decode_lines(ctx, &new_sha1).await? };

            let mut analyzed = Vec::with_capacity(blocks.len());
            for block in &blocks {
                let deleted = slice_block(&old_lines, block.delete_offset, block.delete_length);
                let inserted = slice_block(&new_lines, block.insert_offset, block.insert_length);
                let analysis = diffengine_core::chunk_analyzer::analyze_chunk(&deleted, &inserted, false);
                analyzed.push(ChangedLinesBlock {
                    changeset,
                    file,
                    block_index: block.block_index,
                    offset: 0,
                    delete_count: block.delete_length,
                    delete_length: block.delete_length,
                    insert_count: block.insert_length,
                    insert_length: block.insert_length,
                    analysis: Some(analysis.unwrap_or_default()),
                });
            }
            for block in &analyzed {
                ctx.db
                    .set_block_analysis(changeset, file, block.block_index, block.analysis.clone().unwrap_or_default())
                    .await?;
            }
            Ok(())
        }

        Job::DetectFileLanguages { changeset, file, sha1 } => {
            let changeset_file = ctx.db.get_changeset_file(changeset, file).await?;
            let language = ctx.highlighter.detect_language(&changeset_file.path);
            let highlightfile = ctx.db.ensure_highlight_file(sha1, language, false).await?;

            let mut diff = ctx.db.scan_pending_diffs(changeset).await?.into_iter().find(|d| d.file == file);
            if diff.is_none() {
                diff = Some(ChangesetFileDifference {
                    changeset,
                    file,
                    old_highlightfile: None,
                    new_highlightfile: None,
                    comparison_pending: false,
                });
            }
            let mut diff = diff.expect("populated above");
            if changeset_file.old_sha1.as_deref() == changeset_file.new_sha1.as_deref() {
                diff.old_highlightfile = Some(highlightfile);
                diff.new_highlightfile = Some(highlightfile);
            } else if changeset_file.new_sha1.is_some() {
                diff.new_highlightfile = Some(highlightfile);
            } else {
                diff.old_highlightfile = Some(highlightfile);
            }
            ctx.db.insert_file_difference(diff).await?;
            Ok(())
        }

        Job::SyntaxHighlightFile { highlightfile, sha1, language, conflicts } => {
            let blob = ctx.git.read_blob(&sha1).await?;
            let language = if language.is_empty() { None } else { Some(language) };
            let _tokens = ctx.highlighter.highlight(&blob, language.as_deref(), conflicts, &["utf-8".to_string()]).await?;
            ctx.db.mark_highlighted(highlightfile).await?;
            Ok(())
        }
    }
}

async fn decode_lines(ctx: &Context, sha1: &str) -> Result<Vec<String>, JobError> {
    let blob = ctx.git.read_blob(sha1).await?;
    let text = String::from_utf8_lossy(&blob).into_owned();
    Ok(text.split_inclusive('\n').map(str::to_string).collect())
}

fn slice_block(lines: &[String], offset: i64, length: i64) -> Vec<String> {
    let start = offset.max(0) as usize;
    let end = (start + length.max(0) as usize).min(lines.len());
    if start >= lines.len() {
        return Vec::new();
    }
    lines[start..end].to_vec()
}
