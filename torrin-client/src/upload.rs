use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use torrin_core::{
    layout, ChunkLayout, CompleteResult, UploadError, UploadId, UploadInit, UploadStatus,
};

use crate::client::TorrinClient;
use crate::error::Error;
use crate::events::{ClientStatus, EventBus, HandlerId, ProgressEvent};
use crate::gate::ControlGate;
use crate::resume::{ClientUploadState, ResumeStore};
use crate::retry::RetryPolicy;
use crate::source::{SourceInfo, UploadSource};

/// Save client state after this many chunk successes (and after the last).
const SAVE_EVERY: u32 = 10;

/// Hard cap on concurrent chunk uploads.
const MAX_CONCURRENCY_CAP: usize = 10;

/// Tunables for one upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Requested chunk size; the server normalizes it.
    pub desired_chunk_size: Option<u64>,
    /// Concurrent chunk uploads, capped at 10.
    pub max_concurrency: usize,
    /// Per-chunk retry policy.
    pub retry: RetryPolicy,
    /// MIME type forwarded to the session.
    pub mime_type: Option<String>,
    /// Metadata carried end-to-end unchanged.
    pub metadata: Option<serde_json::Value>,
    /// Send a SHA-256 hash header with every chunk.
    pub chunk_hashes: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            desired_chunk_size: None,
            max_concurrency: 3,
            retry: RetryPolicy::default(),
            mime_type: None,
            metadata: None,
            chunk_hashes: false,
        }
    }
}

/// Builder for an [`Upload`].
pub struct UploadBuilder {
    client: TorrinClient,
    source: UploadSource,
    options: UploadOptions,
    resume: Option<Arc<dyn ResumeStore>>,
}

impl UploadBuilder {
    /// Start building an upload of `source` through `client`.
    pub fn new(client: TorrinClient, source: UploadSource) -> Self {
        Self {
            client,
            source,
            options: UploadOptions::default(),
            resume: None,
        }
    }

    /// Request a chunk size (the server clamps it to its bounds).
    #[must_use]
    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.options.desired_chunk_size = Some(bytes);
        self
    }

    /// Concurrent chunk uploads; values above 10 are capped.
    #[must_use]
    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.options.max_concurrency = concurrency;
        self
    }

    /// Per-chunk retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options.retry = retry;
        self
    }

    /// MIME type recorded on the session.
    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.options.mime_type = Some(mime_type.into());
        self
    }

    /// Metadata recorded on the session.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.options.metadata = Some(metadata);
        self
    }

    /// Send a SHA-256 hash header with every chunk.
    #[must_use]
    pub fn chunk_hashes(mut self, enabled: bool) -> Self {
        self.options.chunk_hashes = enabled;
        self
    }

    /// Persist state to `store` so interrupted uploads can resume.
    #[must_use]
    pub fn resume_store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.resume = Some(store);
        self
    }

    /// Build the upload.
    #[must_use]
    pub fn build(self) -> Upload {
        let mut options = self.options;
        options.max_concurrency = options.max_concurrency.clamp(1, MAX_CONCURRENCY_CAP);
        Upload {
            client: self.client,
            source: Arc::new(self.source),
            options,
            resume: self.resume,
            gate: Arc::new(ControlGate::new()),
            events: Arc::new(EventBus::new()),
            status: Mutex::new(ClientStatus::Idle),
            current: Mutex::new(None),
        }
    }
}

/// What the pump is working against after init or resume discovery.
struct Plan {
    upload_id: UploadId,
    chunk_layout: ChunkLayout,
    received: BTreeSet<u32>,
}

/// One resumable upload.
///
/// The state machine runs in [`start`](Upload::start); [`pause`](Upload::pause),
/// [`resume`](Upload::resume), and
/// [`cancel`](Upload::cancel) signal it from other tasks.
pub struct Upload {
    client: TorrinClient,
    source: Arc<UploadSource>,
    options: UploadOptions,
    resume: Option<Arc<dyn ResumeStore>>,
    gate: Arc<ControlGate>,
    events: Arc<EventBus>,
    status: Mutex<ClientStatus>,
    /// Session identity once known, plus the file key it was indexed under.
    current: Mutex<Option<(UploadId, Option<String>)>>,
}

impl Upload {
    /// Current client-side status.
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        *self.status.lock()
    }

    /// Register a progress handler.
    pub fn on_progress(
        &self,
        handler: impl Fn(&ProgressEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.events.on_progress(handler)
    }

    /// Register a status handler.
    pub fn on_status(&self, handler: impl Fn(&ClientStatus) + Send + Sync + 'static) -> HandlerId {
        self.events.on_status(handler)
    }

    /// Register an error handler, fired on terminal failure.
    pub fn on_error(&self, handler: impl Fn(&Error) + Send + Sync + 'static) -> HandlerId {
        self.events.on_error(handler)
    }

    /// Remove a handler by identity.
    pub fn unsubscribe(&self, handler_id: HandlerId) {
        self.events.unsubscribe(handler_id);
    }

    /// Park in-flight chunk tasks at their next checkpoint.
    ///
    /// Chunks already streaming finish their request; the pause takes
    /// effect before the next body slice or retry sleep.
    pub fn pause(&self) {
        self.gate.pause();
        self.set_status(ClientStatus::Paused);
    }

    /// Release the pause latch.
    pub fn resume(&self) {
        self.gate.resume();
        if self.status() == ClientStatus::Paused {
            self.set_status(ClientStatus::Uploading);
        }
    }

    /// Cancel the upload.
    ///
    /// Releases any pause latch so parked tasks observe the cancel, tells
    /// the server to discard the session (a 404 is tolerated), and removes
    /// the saved resume state. In-flight requests run to completion but
    /// their results are discarded.
    pub async fn cancel(&self) -> Result<(), Error> {
        self.gate.cancel();

        let current = self.current.lock().clone();
        if let Some((upload_id, file_key)) = current {
            self.client.abort(&upload_id).await?;
            if let Some(store) = &self.resume {
                if let Err(e) = store.delete_state(&upload_id).await {
                    warn!(error = %e, "failed to delete resume state");
                }
                if let Some(key) = file_key {
                    if let Err(e) = store.remove_file_key(&key).await {
                        warn!(error = %e, "failed to drop file key");
                    }
                }
            }
        }

        self.set_status(ClientStatus::Canceled);
        Ok(())
    }

    /// Run the upload to completion.
    ///
    /// Discovers a resumable session when a resume store is configured,
    /// otherwise initializes a fresh one; then pumps all missing chunks
    /// with bounded concurrency and finalizes.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<CompleteResult, Error> {
        if self.gate.is_canceled() {
            return Err(self.fail(self.canceled_error()));
        }
        self.set_status(ClientStatus::Initializing);

        let info = match self.source.describe().await {
            Ok(info) => info,
            Err(e) => return Err(self.fail(e)),
        };

        let plan = match self.discover_or_init(&info).await {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(e)),
        };

        *self.current.lock() = Some((plan.upload_id.clone(), info.file_key.clone()));

        self.set_status(ClientStatus::Uploading);
        let received = match self.pump(&plan, &info).await {
            Ok(received) => received,
            Err(e) => return Err(self.fail(e)),
        };

        // Persist once more before finalizing.
        self.save_state(&plan.upload_id, &info, plan.chunk_layout, &received)
            .await;

        if self.gate.is_canceled() {
            return Err(self.fail(self.canceled_error()));
        }
        self.set_status(ClientStatus::Completing);

        let result = match self.client.complete(&plan.upload_id, None).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e)),
        };
        debug_assert_eq!(result.status, UploadStatus::Completed);

        if let Some(store) = &self.resume {
            if let Err(e) = store.delete_state(&plan.upload_id).await {
                warn!(error = %e, "failed to delete resume state");
            }
            if let Some(key) = &info.file_key {
                if let Err(e) = store.remove_file_key(key).await {
                    warn!(error = %e, "failed to drop file key");
                }
            }
        }

        self.set_status(ClientStatus::Completed);
        Ok(result)
    }

    // -- Discovery ---------------------------------------------------------

    /// Find a resumable session via the file key, or init a fresh one.
    async fn discover_or_init(&self, info: &SourceInfo) -> Result<Plan, Error> {
        if let (Some(store), Some(file_key)) = (&self.resume, &info.file_key) {
            let saved = store.find_by_file(file_key).await.unwrap_or_else(|e| {
                warn!(error = %e, "resume lookup failed, starting fresh");
                None
            });
            if let Some(saved) = saved {
                match self.client.status(&saved.upload_id).await {
                    Ok(report)
                        if matches!(
                            report.status,
                            UploadStatus::Completed | UploadStatus::Canceled
                        ) =>
                    {
                        self.evict_saved(store.as_ref(), &saved.upload_id, file_key).await;
                    }
                    Ok(report) => {
                        debug!(
                            upload_id = %report.upload_id,
                            received = report.received_chunks.len(),
                            "resuming previous session"
                        );
                        return Ok(Plan {
                            upload_id: report.upload_id,
                            chunk_layout: ChunkLayout {
                                file_size: report.file_size,
                                chunk_size: report.chunk_size,
                                total_chunks: report.total_chunks,
                            },
                            received: report.received_chunks.into_iter().collect(),
                        });
                    }
                    Err(Error::Upload(UploadError::NotFound(_))) => {
                        self.evict_saved(store.as_ref(), &saved.upload_id, file_key).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let session = self
            .client
            .init_upload(&UploadInit {
                file_name: info.file_name.clone(),
                file_size: info.file_size,
                mime_type: self.options.mime_type.clone(),
                metadata: self.options.metadata.clone(),
                desired_chunk_size: self.options.desired_chunk_size,
            })
            .await?;

        let plan = Plan {
            upload_id: session.upload_id.clone(),
            chunk_layout: session.layout(),
            received: BTreeSet::new(),
        };

        // Persist the fresh state under both the id and the file key.
        self.save_state(&plan.upload_id, info, plan.chunk_layout, &plan.received)
            .await;
        if let (Some(store), Some(file_key)) = (&self.resume, &info.file_key) {
            if let Err(e) = store.set_file_key(file_key, &plan.upload_id).await {
                warn!(error = %e, "failed to index file key");
            }
        }

        Ok(plan)
    }

    async fn evict_saved(&self, store: &dyn ResumeStore, upload_id: &UploadId, file_key: &str) {
        debug!(upload_id = %upload_id, "saved session is finished, evicting");
        if let Err(e) = store.delete_state(upload_id).await {
            warn!(error = %e, "failed to delete stale resume state");
        }
        if let Err(e) = store.remove_file_key(file_key).await {
            warn!(error = %e, "failed to drop stale file key");
        }
    }

    // -- Chunk pump --------------------------------------------------------

    /// Upload every missing chunk with bounded concurrency.
    ///
    /// On any terminal chunk error the pump stops starting new work, waits
    /// for all in-flight chunks to settle, then surfaces the first error.
    async fn pump(&self, plan: &Plan, info: &SourceInfo) -> Result<BTreeSet<u32>, Error> {
        let chunk_layout = plan.chunk_layout;
        let mut received = plan.received.clone();
        let sorted: Vec<u32> = received.iter().copied().collect();
        let mut pending: VecDeque<u32> = chunk_layout.missing_chunks(&sorted).into();

        let mut bytes_uploaded: u64 = received
            .iter()
            .map(|&i| chunk_layout.expected_size(i))
            .sum();
        let mut chunks_completed = received.len() as u32;
        let mut since_save = 0u32;
        let mut first_error: Option<Error> = None;
        let mut in_flight: JoinSet<(u32, Result<(), Error>)> = JoinSet::new();

        loop {
            while first_error.is_none() && in_flight.len() < self.options.max_concurrency {
                let Some(index) = pending.pop_front() else { break };
                let client = self.client.clone();
                let source = Arc::clone(&self.source);
                let gate = Arc::clone(&self.gate);
                let retry = self.options.retry.clone();
                let upload_id = plan.upload_id.clone();
                let with_hash = self.options.chunk_hashes;
                in_flight.spawn(async move {
                    let result = upload_one_chunk(
                        &client,
                        &source,
                        &gate,
                        &retry,
                        &upload_id,
                        chunk_layout,
                        index,
                        with_hash,
                    )
                    .await;
                    (index, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (index, result) = joined
                .map_err(|e| Error::Upload(UploadError::Internal(format!("chunk task: {e}"))))?;

            match result {
                Ok(()) => {
                    received.insert(index);
                    chunks_completed += 1;
                    since_save += 1;
                    bytes_uploaded += chunk_layout.expected_size(index);
                    self.events.emit_progress(&ProgressEvent {
                        bytes_uploaded,
                        total_bytes: chunk_layout.file_size,
                        percentage: layout::percentage(bytes_uploaded, chunk_layout.file_size),
                        chunk_index: index,
                        chunks_completed,
                        total_chunks: chunk_layout.total_chunks,
                    });

                    let done = received.len() as u32 == chunk_layout.total_chunks;
                    if since_save >= SAVE_EVERY || done {
                        self.save_state(&plan.upload_id, info, chunk_layout, &received)
                            .await;
                        since_save = 0;
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        warn!(index, error = %e, "chunk failed, draining in-flight work");
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(received),
        }
    }

    // -- Helpers -----------------------------------------------------------

    async fn save_state(
        &self,
        upload_id: &UploadId,
        info: &SourceInfo,
        chunk_layout: ChunkLayout,
        received: &BTreeSet<u32>,
    ) {
        let Some(store) = &self.resume else { return };
        let state = ClientUploadState {
            upload_id: upload_id.clone(),
            file_name: info.file_name.clone(),
            file_size: chunk_layout.file_size,
            chunk_size: chunk_layout.chunk_size,
            total_chunks: chunk_layout.total_chunks,
            received_chunks: received.iter().copied().collect(),
            metadata: self.options.metadata.clone(),
        };
        if let Err(e) = store.save_state(&state).await {
            warn!(error = %e, "failed to save resume state");
        }
    }

    fn canceled_error(&self) -> Error {
        let upload_id = self
            .current
            .lock()
            .as_ref()
            .map_or_else(|| UploadId::from("u_unknown"), |(id, _)| id.clone());
        Error::Upload(UploadError::Canceled(upload_id))
    }

    /// Record a terminal failure: set the status, emit the error event,
    /// and hand the error back for returning.
    fn fail(&self, error: Error) -> Error {
        if error.is_canceled() {
            self.set_status(ClientStatus::Canceled);
        } else {
            self.set_status(ClientStatus::Failed);
        }
        self.events.emit_error(&error);
        error
    }

    fn set_status(&self, status: ClientStatus) {
        let mut current = self.status.lock();
        if *current != status {
            *current = status;
            drop(current);
            self.events.emit_status(status);
        }
    }
}

/// Upload one chunk with retry.
///
/// Checkpoints on the control gate before slicing the body and before every
/// retry sleep, so pause parks the task and cancel aborts it.
#[allow(clippy::too_many_arguments)]
async fn upload_one_chunk(
    client: &TorrinClient,
    source: &UploadSource,
    gate: &ControlGate,
    retry: &RetryPolicy,
    upload_id: &UploadId,
    chunk_layout: ChunkLayout,
    index: u32,
    with_hash: bool,
) -> Result<(), Error> {
    let expected = chunk_layout.expected_size(index);
    let offset = u64::from(index) * chunk_layout.chunk_size;
    let attempts = retry.attempts.max(1);
    let canceled = || Error::Upload(UploadError::Canceled(upload_id.clone()));

    let mut attempt = 1u32;
    loop {
        if gate.checkpoint().await.is_err() {
            return Err(canceled());
        }

        let result: Result<(), Error> = async {
            let body: Bytes = source.read_chunk(offset, expected).await?;
            let hash = with_hash.then(|| hex::encode(Sha256::digest(&body)));
            client
                .upload_chunk(upload_id, index, body, hash.as_deref())
                .await
        }
        .await;

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_canceled() => return Err(e),
            Err(e) => {
                if attempt >= attempts {
                    return Err(e);
                }
                let delay = retry.delay_for(attempt);
                debug!(
                    index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "chunk attempt failed, backing off"
                );
                if gate.checkpoint().await.is_err() {
                    return Err(canceled());
                }
                if gate.sleep(delay).await.is_err() {
                    return Err(canceled());
                }
                attempt += 1;
            }
        }
    }
}
