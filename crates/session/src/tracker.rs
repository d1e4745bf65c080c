//! In-memory table of tracked jobs and the update merge rules.
//!
//! The tracker is plain data with no I/O. The session feeds it pushed and
//! polled [`Job`] snapshots; the tracker decides what each one changes.

use std::collections::HashMap;

use remix_core::job::{Job, JobSnapshot, JobStatus};
use remix_core::steps::push_step;
use remix_core::types::{JobId, Timestamp};

/// Result URLs attached to a job once it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLinks {
    pub download_url: String,
    pub stream_url: Option<String>,
}

/// Jobs submitted in this session, in submission order.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: HashMap<JobId, JobSnapshot>,
    order: Vec<JobId>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job. Re-tracking an id replaces its snapshot.
    pub fn track(&mut self, snapshot: JobSnapshot) {
        let job_id = snapshot.job_id.clone();
        if self.jobs.insert(job_id.clone(), snapshot).is_none() {
            self.order.push(job_id);
        }
    }

    pub fn get(&self, job_id: &str) -> Option<&JobSnapshot> {
        self.jobs.get(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// All tracked jobs, oldest submission first.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .cloned()
            .collect()
    }

    /// Ids of every job that has not reached a terminal status.
    pub fn in_progress_ids(&self) -> Vec<JobId> {
        self.order
            .iter()
            .filter(|id| self.jobs.get(*id).is_some_and(|job| job.in_progress))
            .cloned()
            .collect()
    }

    pub fn remove(&mut self, job_id: &str) -> Option<JobSnapshot> {
        let removed = self.jobs.remove(job_id)?;
        self.order.retain(|id| id != job_id);
        Some(removed)
    }

    /// Merge an update into the matching tracked job.
    ///
    /// Returns the new snapshot, or `None` when `update.job_id` is not
    /// tracked. `links` is only consulted when the update completes the job.
    pub fn apply(
        &mut self,
        update: &Job,
        received_at: Timestamp,
        links: impl FnOnce(&Job) -> ResultLinks,
    ) -> Option<JobSnapshot> {
        let snapshot = self.jobs.get_mut(&update.job_id)?;
        merge(snapshot, update, received_at, links);
        Some(snapshot.clone())
    }
}

fn merge(
    snapshot: &mut JobSnapshot,
    update: &Job,
    received_at: Timestamp,
    links: impl FnOnce(&Job) -> ResultLinks,
) {
    snapshot.updated_at = received_at;
    if !update.message.is_empty() {
        snapshot.message = update.message.clone();
    }
    push_step(&mut snapshot.steps, &update.message);
    fill_if_empty(&mut snapshot.file_id, &update.file_id);
    fill_if_empty(&mut snapshot.prompt, &update.prompt);
    if update.created_at.is_some() {
        snapshot.created_at = update.created_at;
    }
    if update.elapsed_time.is_some() {
        snapshot.elapsed_time = update.elapsed_time;
    }

    // Terminal jobs keep their outcome.
    if snapshot.is_terminal() {
        if update.status != snapshot.status {
            tracing::debug!(
                job_id = %snapshot.job_id,
                status = %snapshot.status,
                ignored = %update.status,
                "Ignoring status change after terminal state",
            );
        }
        return;
    }

    snapshot.progress = update.progress;
    match update.status {
        JobStatus::Unknown => {
            tracing::warn!(job_id = %snapshot.job_id, "Unrecognised job status, keeping previous");
        }
        JobStatus::Completed => {
            let ResultLinks {
                download_url,
                stream_url,
            } = links(update);
            snapshot.status = JobStatus::Completed;
            snapshot.result_file = update.result_file.clone();
            snapshot.download_url = Some(download_url);
            snapshot.stream_url = stream_url;
            snapshot.in_progress = false;
        }
        JobStatus::Error => {
            let message = update
                .error
                .clone()
                .filter(|e| !e.trim().is_empty())
                .or_else(|| Some(update.message.clone()).filter(|m| !m.trim().is_empty()))
                .unwrap_or_else(|| "Processing failed".to_string());
            snapshot.status = JobStatus::Error;
            snapshot.error = Some(message);
            snapshot.in_progress = false;
        }
        status => snapshot.status = status,
    }
}

fn fill_if_empty(field: &mut String, value: &str) {
    if field.is_empty() && !value.is_empty() {
        *field = value.to_string();
    }
}
