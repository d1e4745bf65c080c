//! The job session: upload -> process-start -> realtime subscription ->
//! terminal state.
//!
//! [`JobSession`] is created once per application with the shared transport,
//! realtime channel and event bus. It registers its channel listeners on
//! construction and removes them in [`JobSession::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use remix_client::{
    AudioApi, AudioFile, ChannelEvent, EventKind, Listener, ListenerId, ProgressCallback,
    RealtimeChannel,
};
use remix_core::error::CoreError;
use remix_core::job::{Job, JobSnapshot, JobStatus, UploadProgress, UploadResponse};
use remix_core::types::{FileId, JobId};
use remix_events::{EventBus, SessionEvent};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use crate::error::SessionError;
use crate::tracker::{JobTracker, ResultLinks};

/// The file most recently accepted by the service, pending submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub file_id: FileId,
    pub name: String,
    pub size: u64,
}

impl From<&UploadResponse> for UploadedFile {
    fn from(response: &UploadResponse) -> Self {
        Self {
            file_id: response.file_id.clone(),
            name: response.original_filename.clone(),
            size: response.file_size,
        }
    }
}

/// How often [`JobSession::wait_for_terminal`] polls the job's status while
/// the realtime channel is down.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Orchestrates uploads and job tracking on top of the transport and the
/// realtime channel.
pub struct JobSession {
    inner: Arc<SessionInner>,
    listeners: Mutex<Vec<(EventKind, ListenerId)>>,
    poll_interval: Duration,
}

struct SessionInner {
    api: Arc<dyn AudioApi>,
    channel: Arc<dyn RealtimeChannel>,
    bus: Arc<EventBus>,
    tracker: Mutex<JobTracker>,
    uploaded: Mutex<Option<UploadedFile>>,
    /// `None` until the first health check.
    service_available: Mutex<Option<bool>>,
    /// Set while the channel is known to be down (dropped or given up).
    channel_lost: AtomicBool,
}

impl JobSession {
    pub fn new(
        api: Arc<dyn AudioApi>,
        channel: Arc<dyn RealtimeChannel>,
        bus: Arc<EventBus>,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            api,
            channel,
            bus,
            tracker: Mutex::new(JobTracker::new()),
            uploaded: Mutex::new(None),
            service_available: Mutex::new(None),
            channel_lost: AtomicBool::new(false),
        });

        let listeners = [
            EventKind::JobUpdate,
            EventKind::Error,
            EventKind::Disconnected,
            EventKind::Reconnected,
            EventKind::Closed,
        ]
        .into_iter()
        .map(|kind| {
            let id = inner.channel.on(kind, session_listener(Arc::downgrade(&inner)));
            (kind, id)
        })
        .collect();

        Self {
            inner,
            listeners: Mutex::new(listeners),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the status poll interval used while the channel is down.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    // ---- service ----

    /// Probe the service and remember the outcome. While the last probe
    /// failed, uploads and submissions are refused locally.
    pub async fn check_health(&self) -> bool {
        let available = self.inner.api.health_check().await;
        *lock(&self.inner.service_available) = Some(available);
        if !available {
            tracing::warn!("Remix service unavailable");
        }
        self.inner
            .bus
            .publish(SessionEvent::ServiceStatus { available });
        available
    }

    /// Last health check result, `None` if none has run.
    pub fn service_available(&self) -> Option<bool> {
        *lock(&self.inner.service_available)
    }

    /// Connect the realtime channel. Idempotent.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.inner.channel.connect().await?;
        self.inner.channel_lost.store(false, Ordering::SeqCst);
        self.inner
            .bus
            .publish(SessionEvent::ChannelStatus { connected: true });
        Ok(())
    }

    // ---- upload ----

    /// Upload `file`, publishing progress on the bus. On success the file
    /// becomes the input of the next [`submit_job`](Self::submit_job).
    pub async fn upload(&self, file: &AudioFile) -> Result<UploadResponse, SessionError> {
        self.ensure_available()?;

        let bus = Arc::clone(&self.inner.bus);
        let on_progress: ProgressCallback = Arc::new(move |progress: UploadProgress| {
            bus.publish(SessionEvent::UploadProgress(progress));
        });

        tracing::info!(file = file.name(), size = file.size(), "Uploading audio");
        match self.inner.api.upload_with_progress(file, on_progress).await {
            Ok(uploaded) => {
                *lock(&self.inner.uploaded) = Some(UploadedFile::from(&uploaded));
                self.inner
                    .bus
                    .publish(SessionEvent::UploadCompleted(uploaded.clone()));
                Ok(uploaded)
            }
            Err(e) => {
                tracing::error!(file = file.name(), error = %e, "Upload failed");
                self.inner.bus.publish(SessionEvent::UploadFailed {
                    message: e.user_message(),
                });
                Err(SessionError::Upload(e))
            }
        }
    }

    pub fn uploaded_file(&self) -> Option<UploadedFile> {
        lock(&self.inner.uploaded).clone()
    }

    // ---- jobs ----

    /// Start processing the uploaded file with `prompt` and subscribe to the
    /// new job's updates.
    ///
    /// Fails without a request when no file has been uploaded, the prompt
    /// is blank, or the last health check failed.
    pub async fn submit_job(&self, prompt: &str) -> Result<JobSnapshot, SessionError> {
        let file_id = lock(&self.inner.uploaded)
            .as_ref()
            .map(|f| f.file_id.clone())
            .ok_or_else(|| CoreError::Prerequisite("no file uploaded".into()))?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::Validation("prompt must not be empty".into()).into());
        }
        self.ensure_available()?;

        let started = match self.inner.api.process_audio(&file_id, prompt).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(file_id = %file_id, error = %e, "Job submission failed");
                self.inner.bus.publish(SessionEvent::SubmissionFailed {
                    message: e.user_message(),
                });
                return Err(SessionError::Submission(e));
            }
        };

        let snapshot = JobSnapshot::seeded(&started.job_id, &file_id, prompt, &started.message);
        lock(&self.inner.tracker).track(snapshot.clone());
        {
            let mut uploaded = lock(&self.inner.uploaded);
            if uploaded.as_ref().is_some_and(|f| f.file_id == file_id) {
                *uploaded = None;
            }
        }
        self.inner
            .bus
            .publish(SessionEvent::JobUpdated(snapshot.clone()));

        tracing::info!(job_id = %started.job_id, file_id = %file_id, "Job submitted");
        self.inner.channel.join_job(&started.job_id);
        Ok(snapshot)
    }

    pub fn job(&self, job_id: &str) -> Option<JobSnapshot> {
        lock(&self.inner.tracker).get(job_id).cloned()
    }

    /// Every tracked job, oldest first.
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        lock(&self.inner.tracker).snapshots()
    }

    /// `false` for unknown jobs and forever once a job is terminal.
    pub fn is_in_progress(&self, job_id: &str) -> bool {
        lock(&self.inner.tracker)
            .get(job_id)
            .is_some_and(|job| job.in_progress)
    }

    /// Poll the job's status and merge it like a pushed update.
    pub async fn refresh_job(&self, job_id: &str) -> Result<JobSnapshot, SessionError> {
        self.inner.refresh_job(job_id).await
    }

    /// Resolve once the job reaches a terminal status.
    ///
    /// Returns the completed snapshot, or [`SessionError::Processing`] when
    /// the service reported a failure. While the realtime channel is down
    /// the job's status is polled every poll interval instead.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Result<JobSnapshot, SessionError> {
        // Subscribe before reading the table so no transition is missed.
        let mut rx = self.inner.bus.subscribe();

        let current = self
            .job(job_id)
            .ok_or_else(|| SessionError::UnknownJob(job_id.to_string()))?;
        if current.is_terminal() {
            return terminal_outcome(current);
        }

        let mut poll = tokio::time::interval_at(
            tokio::time::Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(SessionEvent::JobUpdated(snapshot))
                        if snapshot.job_id == job_id && snapshot.is_terminal() =>
                    {
                        return terminal_outcome(snapshot);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(job_id, skipped, "Session events lagged, rechecking job");
                        let current = self
                            .job(job_id)
                            .ok_or_else(|| SessionError::UnknownJob(job_id.to_string()))?;
                        if current.is_terminal() {
                            return terminal_outcome(current);
                        }
                    }
                    Err(RecvError::Closed) => {
                        return Err(SessionError::UnknownJob(job_id.to_string()));
                    }
                },
                _ = poll.tick() => {
                    if !self.inner.channel_down() {
                        continue;
                    }
                    match self.inner.refresh_job(job_id).await {
                        Ok(snapshot) if snapshot.is_terminal() => return terminal_outcome(snapshot),
                        Ok(_) => {}
                        Err(e @ SessionError::UnknownJob(_)) => return Err(e),
                        Err(e) => {
                            tracing::warn!(job_id, error = %e, "Status poll failed, will retry");
                        }
                    }
                }
            }
        }
    }

    /// Fetch the finished result of a completed job.
    pub async fn download_result(&self, job_id: &str) -> Result<Bytes, SessionError> {
        let job = self
            .job(job_id)
            .ok_or_else(|| SessionError::UnknownJob(job_id.to_string()))?;
        if job.status != JobStatus::Completed {
            return Err(CoreError::Prerequisite(format!("job {job_id} has not completed")).into());
        }
        self.inner
            .api
            .download_result(job_id)
            .await
            .map_err(SessionError::Download)
    }

    /// Stop tracking a job. Later updates for it are ignored.
    pub fn dismiss_job(&self, job_id: &str) -> bool {
        lock(&self.inner.tracker).remove(job_id).is_some()
    }

    /// Remove the session's channel listeners. Tracked jobs stay readable.
    pub fn shutdown(&self) {
        let listeners = std::mem::take(&mut *lock(&self.listeners));
        for (kind, id) in listeners {
            self.inner.channel.off(kind, id);
        }
        tracing::info!("Job session shut down");
    }

    fn ensure_available(&self) -> Result<(), CoreError> {
        match *lock(&self.inner.service_available) {
            Some(false) => Err(CoreError::Prerequisite("service unavailable".into())),
            _ => Ok(()),
        }
    }
}

impl Drop for JobSession {
    fn drop(&mut self) {
        for (kind, id) in lock(&self.listeners).drain(..) {
            self.inner.channel.off(kind, id);
        }
    }
}

impl SessionInner {
    /// Merge an update for a tracked job and publish the result.
    fn apply_update(&self, update: &Job) -> Option<JobSnapshot> {
        let snapshot = lock(&self.tracker).apply(update, chrono::Utc::now(), |job| ResultLinks {
            download_url: self.api.download_url(&job.job_id),
            stream_url: job.result_file.as_deref().map(|f| self.api.audio_url(f)),
        });

        let Some(snapshot) = snapshot else {
            tracing::debug!(job_id = %update.job_id, "Ignoring update for untracked job");
            return None;
        };

        match snapshot.status {
            JobStatus::Completed => {
                tracing::info!(job_id = %snapshot.job_id, "Job completed");
            }
            JobStatus::Error => {
                tracing::error!(job_id = %snapshot.job_id, error = ?snapshot.error, "Job failed");
            }
            _ => {}
        }

        self.bus.publish(SessionEvent::JobUpdated(snapshot.clone()));
        Some(snapshot)
    }

    async fn refresh_job(&self, job_id: &str) -> Result<JobSnapshot, SessionError> {
        if !lock(&self.tracker).contains(job_id) {
            return Err(SessionError::UnknownJob(job_id.to_string()));
        }
        let job = self
            .api
            .get_job_status(job_id)
            .await
            .map_err(SessionError::Status)?;
        self.apply_update(&job)
            .ok_or_else(|| SessionError::UnknownJob(job_id.to_string()))
    }

    /// `true` while pushed updates cannot be relied on.
    fn channel_down(&self) -> bool {
        self.channel_lost.load(Ordering::SeqCst) || !self.channel.is_connected()
    }

    /// Poll every running job in the background.
    fn refresh_running(self: &Arc<Self>, running: Vec<JobId>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available to refresh jobs");
            return;
        };
        for job_id in running {
            let inner = Arc::clone(self);
            handle.spawn(async move {
                if let Err(e) = inner.refresh_job(&job_id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Job refresh failed");
                }
            });
        }
    }

    /// The channel will not come back on its own. Poll once so jobs that
    /// finished meanwhile are not left waiting on pushes.
    fn on_closed(self: Arc<Self>, attempts: u32) {
        self.channel_lost.store(true, Ordering::SeqCst);
        self.bus
            .publish(SessionEvent::ChannelStatus { connected: false });

        let running = lock(&self.tracker).in_progress_ids();
        tracing::error!(attempts, jobs = running.len(), "Realtime channel closed, falling back to polling");
        self.refresh_running(running);
    }

    /// Subscriptions die with the old connection. Re-join every running job
    /// and poll it to cover updates missed while disconnected.
    fn on_reconnected(self: Arc<Self>) {
        self.channel_lost.store(false, Ordering::SeqCst);
        self.bus
            .publish(SessionEvent::ChannelStatus { connected: true });

        let running = lock(&self.tracker).in_progress_ids();
        if running.is_empty() {
            return;
        }
        tracing::info!(jobs = running.len(), "Realtime channel back, resyncing jobs");

        for job_id in &running {
            self.channel.join_job(job_id);
        }
        self.refresh_running(running);
    }

    fn on_event(self: Arc<Self>, event: &ChannelEvent) {
        match event {
            ChannelEvent::JobUpdate(job) => {
                self.apply_update(job);
            }
            ChannelEvent::Error { message, job_id } => {
                self.bus.publish(SessionEvent::ServerError {
                    message: message.clone(),
                    job_id: job_id.clone(),
                });
            }
            ChannelEvent::Disconnected { .. } => {
                self.channel_lost.store(true, Ordering::SeqCst);
                self.bus
                    .publish(SessionEvent::ChannelStatus { connected: false });
            }
            ChannelEvent::Reconnected => self.on_reconnected(),
            ChannelEvent::Closed { attempts } => self.on_closed(*attempts),
            ChannelEvent::Connected { .. } | ChannelEvent::JoinedJob { .. } => {}
        }
    }
}

/// Listener bound to the session without keeping it alive.
fn session_listener(inner: Weak<SessionInner>) -> Listener {
    Arc::new(move |event: &ChannelEvent| {
        if let Some(inner) = inner.upgrade() {
            inner.on_event(event);
        }
    })
}

fn terminal_outcome(snapshot: JobSnapshot) -> Result<JobSnapshot, SessionError> {
    match snapshot.status {
        JobStatus::Error => Err(SessionError::Processing {
            message: snapshot
                .error
                .clone()
                .unwrap_or_else(|| "Processing failed".to_string()),
            job_id: snapshot.job_id,
        }),
        _ => Ok(snapshot),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
