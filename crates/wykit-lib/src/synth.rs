//! Synthesis collaborator interface and the serialized access point to it.
//!
//! ```text
//! session ──► SynthService::synthesize ──► [semaphore, N permits] ──► Synthesizer
//! ```
//!
//! A backend is loaded once and shared by every session. Most models are
//! not safe to drive concurrently, so calls go through a semaphore whose
//! permit count is `synth_concurrency` (default 1, i.e. a mutex). Sessions
//! queue here; this is the server's one real contention point, and the
//! wait is logged per request.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use wykit_core::types::{PcmAudio, SynthesisJob};
use wykit_core::SynthError;

/// A synthesis engine.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Voice ids this backend can speak, in a stable order. Queried once
    /// at startup to build the voice registry; a job's voice handle
    /// indexes into this list.
    fn voices(&self) -> Vec<String>;

    /// Render `job.text` to mono 16-bit PCM.
    ///
    /// The returned audio may be at a rate other than `job.sample_rate`;
    /// the session converts it.
    async fn synthesize(&self, job: &SynthesisJob) -> Result<PcmAudio, SynthError>;
}

/// Cloneable, permit-gated handle to the shared backend.
#[derive(Clone)]
pub struct SynthService {
    backend: Arc<dyn Synthesizer>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl SynthService {
    /// Wrap `backend`, allowing at most `concurrency` calls in flight.
    /// Zero is treated as one.
    pub fn new(backend: Arc<dyn Synthesizer>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            backend,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Serialized access: one call at a time.
    pub fn serialized(backend: Arc<dyn Synthesizer>) -> Self {
        Self::new(backend, 1)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The backend's voice list.
    pub fn capabilities(&self) -> Vec<String> {
        self.backend.voices()
    }

    /// Run one job once a permit is free.
    pub async fn synthesize(&self, job: &SynthesisJob) -> Result<PcmAudio, SynthError> {
        let queued = Instant::now();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SynthError::internal("synthesis service is shut down"))?;
        let waited = queued.elapsed();

        let started = Instant::now();
        let result = self.backend.synthesize(job).await;
        debug!(
            backend = self.backend.name(),
            waited_ms = waited.as_millis() as u64,
            synth_ms = started.elapsed().as_millis() as u64,
            chars = job.text.chars().count(),
            ok = result.is_ok(),
            "synthesis finished"
        );
        result
    }
}
