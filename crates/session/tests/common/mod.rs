//! In-memory fakes of the transport and the realtime channel.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use remix_client::{
    ApiError, ApiOperation, AudioApi, AudioFile, ChannelError, ChannelEvent, EventKind, Listener,
    ListenerId, ListenerRegistry, ProgressCallback, RealtimeChannel,
};
use remix_core::job::{Job, JobStatus, ProcessResponse, UploadProgress, UploadResponse};
use remix_events::{EventBus, SessionEvent};
use remix_session::JobSession;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// FakeApi
// ---------------------------------------------------------------------------

/// A scripted failure: HTTP status and the service's error text.
pub type Failure = (u16, String);

#[derive(Default)]
pub struct Calls {
    pub health: AtomicUsize,
    pub upload: AtomicUsize,
    pub process: AtomicUsize,
    pub status: AtomicUsize,
    pub download: AtomicUsize,
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub struct FakeApi {
    pub calls: Calls,
    healthy: AtomicBool,
    upload_failure: Mutex<Option<Failure>>,
    process_failure: Mutex<Option<Failure>>,
    next_job_id: Mutex<String>,
    statuses: Mutex<HashMap<String, Job>>,
    result: Mutex<Bytes>,
    /// `(file_id, prompt)` of every process request.
    pub processed: Mutex<Vec<(String, String)>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Calls::default(),
            healthy: AtomicBool::new(true),
            upload_failure: Mutex::new(None),
            process_failure: Mutex::new(None),
            next_job_id: Mutex::new("job_1".into()),
            statuses: Mutex::new(HashMap::new()),
            result: Mutex::new(Bytes::from_static(b"RIFF-remix")),
            processed: Mutex::new(Vec::new()),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_upload(&self, status: u16, message: &str) {
        *self.upload_failure.lock().unwrap() = Some((status, message.into()));
    }

    pub fn fail_process(&self, status: u16, message: &str) {
        *self.process_failure.lock().unwrap() = Some((status, message.into()));
    }

    pub fn set_next_job_id(&self, job_id: &str) {
        *self.next_job_id.lock().unwrap() = job_id.into();
    }

    /// What `get_job_status` returns for `job.job_id`.
    pub fn set_status(&self, job: Job) {
        self.statuses.lock().unwrap().insert(job.job_id.clone(), job);
    }

    fn failure(operation: ApiOperation, (status, message): Failure) -> ApiError {
        ApiError::Server {
            operation,
            status,
            message,
        }
    }
}

#[async_trait]
impl AudioApi for FakeApi {
    async fn health_check(&self) -> bool {
        self.calls.health.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn upload_audio(&self, file: &AudioFile) -> Result<UploadResponse, ApiError> {
        self.calls.upload.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.upload_failure.lock().unwrap().clone() {
            return Err(Self::failure(ApiOperation::Upload, failure));
        }
        Ok(UploadResponse {
            file_id: "abc123".into(),
            original_filename: file.name().to_string(),
            file_size: file.size(),
            message: "File uploaded successfully".into(),
        })
    }

    /// Reports 30%, 70% and 100% of the file before answering.
    async fn upload_with_progress(
        &self,
        file: &AudioFile,
        on_progress: ProgressCallback,
    ) -> Result<UploadResponse, ApiError> {
        let total = file.size();
        for loaded in [total * 3 / 10, total * 7 / 10, total] {
            if let Some(progress) = UploadProgress::new(loaded, total) {
                on_progress(progress);
            }
        }
        self.upload_audio(file).await
    }

    async fn process_audio(
        &self,
        file_id: &str,
        prompt: &str,
    ) -> Result<ProcessResponse, ApiError> {
        self.calls.process.fetch_add(1, Ordering::SeqCst);
        self.processed
            .lock()
            .unwrap()
            .push((file_id.to_string(), prompt.to_string()));
        if let Some(failure) = self.process_failure.lock().unwrap().clone() {
            return Err(Self::failure(ApiOperation::Process, failure));
        }
        Ok(ProcessResponse {
            job_id: self.next_job_id.lock().unwrap().clone(),
            status: JobStatus::Starting,
            message: "Queued".into(),
        })
    }

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| Self::failure(ApiOperation::Status, (404, "Job not found".into())))
    }

    async fn download_result(&self, _job_id: &str) -> Result<Bytes, ApiError> {
        self.calls.download.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.lock().unwrap().clone())
    }

    fn download_url(&self, job_id: &str) -> String {
        format!("http://remix.test/api/result/{job_id}")
    }

    fn audio_url(&self, filename: &str) -> String {
        format!("http://remix.test/api/audio/{filename}")
    }
}

// ---------------------------------------------------------------------------
// FakeChannel
// ---------------------------------------------------------------------------

/// Channel double backed by a real [`ListenerRegistry`]; tests push events
/// with [`FakeChannel::emit`].
#[derive(Default)]
pub struct FakeChannel {
    registry: ListenerRegistry,
    connected: AtomicBool,
    pub connects: AtomicUsize,
    joined: Mutex<Vec<String>>,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `event` to listeners, as the connection task would.
    pub fn emit(&self, event: ChannelEvent) -> usize {
        self.registry.dispatch(&event)
    }

    pub fn emit_update(&self, job: serde_json::Value) -> usize {
        self.emit(ChannelEvent::JobUpdate(job_from(job)))
    }

    /// Job ids passed to `join_job` while connected.
    pub fn joined(&self) -> Vec<String> {
        self.joined.lock().unwrap().clone()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.listener_count(kind)
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.registry.clear();
    }

    fn join_job(&self, job_id: &str) {
        if self.is_connected() {
            self.joined.lock().unwrap().push(job_id.to_string());
        }
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.registry.on(kind, listener)
    }

    fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.registry.off(kind, id)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub channel: Arc<FakeChannel>,
    pub session: Arc<JobSession>,
    pub events: broadcast::Receiver<SessionEvent>,
}

/// A session over fresh fakes with the channel already connected.
pub async fn harness() -> Harness {
    let api = FakeApi::new();
    let channel = FakeChannel::new();
    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();
    let session = Arc::new(
        JobSession::new(
            Arc::clone(&api) as Arc<dyn AudioApi>,
            Arc::clone(&channel) as Arc<dyn RealtimeChannel>,
            bus,
        )
        .with_poll_interval(Duration::from_millis(50)),
    );
    session.connect().await.unwrap();

    Harness {
        api,
        channel,
        session,
        events,
    }
}

impl Harness {
    /// Upload a small file and submit `prompt`, returning the job id.
    pub async fn submit(&self, prompt: &str) -> String {
        self.session
            .upload(&AudioFile::new("loop.wav", vec![0u8; 10]))
            .await
            .unwrap();
        self.session.submit_job(prompt).await.unwrap().job_id
    }

    /// Every event published so far and not yet read.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn job_from(value: serde_json::Value) -> Job {
    serde_json::from_value(value).unwrap()
}

pub fn job_updates(events: &[SessionEvent]) -> Vec<&remix_core::job::JobSnapshot> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::JobUpdated(snapshot) => Some(snapshot),
            _ => None,
        })
        .collect()
}

/// Poll `condition` until it holds or a few seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
