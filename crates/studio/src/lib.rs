//! One-shot remix flow: health check, connect, upload, submit, wait,
//! download.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use remix_client::{AudioApi, AudioFile, ClientConfig, RealtimeChannel, RemixApi, WsChannel};
use remix_core::job::JobSnapshot;
use remix_events::{EventBus, SessionEvent};
use remix_session::JobSession;
use tokio::sync::broadcast::error::RecvError;

/// What to remix and where to put the result.
#[derive(Debug, Clone)]
pub struct StudioOptions {
    pub input: PathBuf,
    pub prompt: String,
    pub output_dir: PathBuf,
}

impl StudioOptions {
    /// Read `REMIX_INPUT`, `REMIX_PROMPT` and `REMIX_OUTPUT_DIR`.
    pub fn from_env() -> anyhow::Result<Self> {
        let input = std::env::var("REMIX_INPUT").context("REMIX_INPUT environment variable is required")?;
        let prompt = std::env::var("REMIX_PROMPT").context("REMIX_PROMPT environment variable is required")?;
        let output_dir = std::env::var("REMIX_OUTPUT_DIR").unwrap_or_else(|_| ".".into());
        Ok(Self {
            input: PathBuf::from(input),
            prompt,
            output_dir: PathBuf::from(output_dir),
        })
    }
}

/// Run the whole flow against the service in `config` and return the path
/// of the saved result.
pub async fn run(config: &ClientConfig, options: &StudioOptions) -> anyhow::Result<PathBuf> {
    let api: Arc<dyn AudioApi> =
        Arc::new(RemixApi::new(config).context("Failed to build HTTP client")?);
    let channel: Arc<dyn RealtimeChannel> = Arc::new(WsChannel::new(config));
    let bus = Arc::new(EventBus::default());
    let session = JobSession::new(api, Arc::clone(&channel), Arc::clone(&bus));

    let reporter = tokio::spawn(report_events(bus.subscribe()));
    let outcome = remix(&session, options).await;

    session.shutdown();
    channel.disconnect().await;
    reporter.abort();
    outcome
}

async fn remix(session: &JobSession, options: &StudioOptions) -> anyhow::Result<PathBuf> {
    if !session.check_health().await {
        bail!("Remix service is unavailable");
    }
    session
        .connect()
        .await
        .context("Failed to open realtime channel")?;

    let file = AudioFile::from_path(&options.input)
        .await
        .with_context(|| format!("Failed to read {}", options.input.display()))?;
    session.upload(&file).await?;

    let job = session.submit_job(&options.prompt).await?;
    let done = session.wait_for_terminal(&job.job_id).await?;

    let bytes = session.download_result(&done.job_id).await?;
    tokio::fs::create_dir_all(&options.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", options.output_dir.display()))?;
    let path = options.output_dir.join(output_file_name(&done));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Name of the saved result: the service's file name without any directory
/// part, or `<job_id>.wav`.
pub fn output_file_name(snapshot: &JobSnapshot) -> String {
    snapshot
        .result_file
        .as_deref()
        .and_then(|f| Path::new(f).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.wav", snapshot.job_id))
}

/// Log session events until the bus closes.
async fn report_events(mut rx: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::UploadProgress(p)) => {
                tracing::info!(percentage = p.percentage, loaded = p.loaded, total = p.total, "Uploading");
            }
            Ok(SessionEvent::JobUpdated(job)) => {
                tracing::info!(
                    job_id = %job.job_id,
                    status = %job.status,
                    progress = job.progress,
                    message = %job.message,
                    "Job update",
                );
            }
            Ok(SessionEvent::ChannelStatus { connected: false }) => {
                tracing::warn!("Realtime channel down");
            }
            Ok(SessionEvent::ServerError { message, job_id }) => {
                tracing::warn!(message = %message, job_id = ?job_id, "Service reported an error");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event reporter lagged");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
