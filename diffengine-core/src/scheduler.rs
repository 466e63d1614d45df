//! Generic job-group scheduling primitives.
//!
//! A [`JobGroup`] owns four disjoint sets of work — `not_started`,
//! `in_flight`, `done`, and a permanent `failed_keys` memo — and dispatches
//! jobs up to a caller-supplied concurrency `capacity`. It knows nothing
//! about changesets; [`crate::changeset_group::ChangesetGroup`] is the
//! concrete instantiation that inventories SQL state into [`Job`]s.
//!
//! Dynamic-typing replacement: the original scheduler used `isinstance`
//! checks against job classes to decide when a phase had drained. Here
//! [`Job::key`] carries a discriminated [`JobKey`] tag instead, and
//! `should_calculate_remaining` inspects tags rather than types.

use std::collections::HashSet;

use crate::job::{Job, JobKey};

/// Outcome of one job's execution, reported to [`JobGroup::on_job_completed`].
pub enum JobOutcome {
    Done,
    /// Transient failure: not memoized, eligible for retry on the next
    /// `calculate_remaining` pass.
    Transient,
    /// Permanent failure: memoized into `failed_keys` (and, by the caller,
    /// into `changeseterrors`). Never retried for this group.
    Failed { traceback: Option<String> },
}

/// Events a [`JobGroup`] emits as its internal sets change, for the runner
/// to act on (publish a notification, re-poll the DB, drop the group from
/// memory).
pub enum SchedulerEvent {
    /// New jobs were added to `not_started`; a worker pool should wake up
    /// and start dispatching.
    JobsAdded,
    /// Interested parties should be told the changeset's completion state
    /// changed (structure/content/highlight flag flipped).
    NotifyUpdate { changeset: i64 },
    /// The group has fully drained (no `not_started`, no `in_flight`, and
    /// re-inventory produced nothing new) and can be dropped from the
    /// runner's live-group table.
    NotifyForget { changeset: i64 },
}

/// A homogeneous pool of [`Job`]s belonging to one changeset, tracked
/// through the not_started → in_flight → done lifecycle.
pub struct JobGroup {
    pub repository_id: i64,
    not_started: Vec<Job>,
    in_flight: HashSet<JobKey>,
    done: HashSet<JobKey>,
    failed_keys: HashSet<JobKey>,
}

impl JobGroup {
    pub fn new(repository_id: i64) -> Self {
        Self {
            repository_id,
            not_started: Vec::new(),
            in_flight: HashSet::new(),
            done: HashSet::new(),
            failed_keys: HashSet::new(),
        }
    }

    pub fn failed_keys(&self) -> &HashSet<JobKey> {
        &self.failed_keys
    }

    pub fn is_drained(&self) -> bool {
        self.not_started.is_empty() && self.in_flight.is_empty()
    }

    /// Rejects a job whose key is already known (not_started, in_flight,
    /// done, or permanently failed).
    pub fn add_job(&mut self, job: Job) -> bool {
        let key = job.key();
        if self.in_flight.contains(&key)
            || self.done.contains(&key)
            || self.failed_keys.contains(&key)
            || self.not_started.iter().any(|j| j.key() == key)
        {
            return false;
        }
        self.not_started.push(job);
        true
    }

    /// Adds every job in `jobs` not already known, returning how many were
    /// actually added.
    pub fn add_jobs(&mut self, jobs: impl IntoIterator<Item = Job>) -> usize {
        jobs.into_iter().filter(|j| self.add_job(j.clone())).count()
    }

    /// Moves up to `capacity` jobs from `not_started` to `in_flight`.
    pub fn start_next(&mut self, capacity: usize) -> Vec<Job> {
        let take = capacity.min(self.not_started.len());
        let started: Vec<Job> = self.not_started.drain(..take).collect();
        for job in &started {
            self.in_flight.insert(job.key());
        }
        started
    }

    /// Records the outcome of one in-flight job. Returns `true` if this
    /// drained the group (both `not_started` and `in_flight` are now
    /// empty), signaling the caller should run `calculate_remaining`.
    pub fn on_job_completed(&mut self, key: &JobKey, outcome: JobOutcome) -> bool {
        self.in_flight.remove(key);
        match outcome {
            JobOutcome::Done => {
                self.done.insert(key.clone());
            }
            JobOutcome::Transient => {
                // Dropped from in_flight without joining done or
                // failed_keys: a future calculate_remaining pass will
                // re-inventory and re-emit it.
            }
            JobOutcome::Failed { .. } => {
                self.failed_keys.insert(key.clone());
            }
        }
        self.is_drained()
    }

    #[cfg(test)]
    pub(crate) fn not_started_keys(&self) -> Vec<JobKey> {
        self.not_started.iter().map(Job::key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure_job(changeset: i64) -> Job {
        Job::CalculateStructureDifference {
            changeset,
            from_sha1: None,
            to_sha1: "deadbeef".into(),
            queue_content: true,
            is_for_merge: false,
        }
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut group = JobGroup::new(1);
        assert!(group.add_job(structure_job(1)));
        assert!(!group.add_job(structure_job(1)));
        assert_eq!(group.not_started_keys().len(), 1);
    }

    #[test]
    fn failed_keys_are_never_re_added() {
        let mut group = JobGroup::new(1);
        group.add_job(structure_job(1));
        let started = group.start_next(10);
        let key = started[0].key();
        group.on_job_completed(&key, JobOutcome::Failed { traceback: Some("boom".into()) });
        assert!(!group.add_job(structure_job(1)));
        assert!(group.failed_keys().contains(&key));
    }

    #[test]
    fn transient_failure_allows_retry() {
        let mut group = JobGroup::new(1);
        group.add_job(structure_job(1));
        let started = group.start_next(10);
        let key = started[0].key();
        group.on_job_completed(&key, JobOutcome::Transient);
        assert!(group.add_job(structure_job(1)));
    }

    #[test]
    fn start_next_respects_capacity() {
        let mut group = JobGroup::new(1);
        for i in 0..5 {
            group.add_job(structure_job(i));
        }
        let started = group.start_next(3);
        assert_eq!(started.len(), 3);
        assert_eq!(group.not_started_keys().len(), 2);
    }

    #[test]
    fn drains_when_both_sets_empty() {
        let mut group = JobGroup::new(1);
        group.add_job(structure_job(1));
        let started = group.start_next(10);
        let key = started[0].key();
        assert!(group.on_job_completed(&key, JobOutcome::Done));
    }
}
