//! Connection supervisor - the retry loop around stream sessions
//!
//! ```text
//! Disconnected ──► Connecting ──► Streaming ──► Faulted ──► (sleep) ──► Disconnected
//!                       │                          ▲
//!                       └──────── connect error ───┘
//! ```
//!
//! The loop never ends on its own: every fault is classified, logged together
//! with the delay it produced, and followed by a reconnect.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::backoff::{BackoffConfig, BackoffState};
use crate::batch::RecordBatch;
use crate::dispatch::Dispatcher;
use crate::error::{FaultClass, FaultKind, StreamError};
use crate::ports::{ChunkSource, StreamConnector};
use crate::stream::{DecompressingReader, RecordReassembler};
use crate::window::{RollOverPolicy, WindowConfig};

/// Configuration for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Stream name reported with every batch
    pub stream_name: String,
    /// Destination path reported with every batch
    pub destination_path: PathBuf,
    /// Whether the body is gzip-framed (default: true)
    pub compressed: bool,
    /// Largest chunk handed to the reassembler (default: 128KiB)
    pub chunk_size: usize,
    pub window: WindowConfig,
    pub backoff: BackoffConfig,
}

impl SupervisorConfig {
    /// Configuration with default tuning
    pub fn new(stream_name: impl Into<String>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            stream_name: stream_name.into(),
            destination_path: destination_path.into(),
            compressed: true,
            chunk_size: 128 * 1024,
            window: WindowConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Lifecycle state of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Streaming,
    Faulted,
}

/// What one connect/stream/fault cycle ended with
#[derive(Debug)]
pub struct SessionOutcome {
    pub fault: FaultClass,
    /// The error behind the fault, `None` for a clean remote close
    pub error: Option<StreamError>,
    /// Delay to sleep before the next connection attempt
    pub delay: Duration,
    /// Batches dispatched during the session
    pub batches: u64,
}

/// Drives stream sessions forever, reconnecting with backoff
///
/// The supervisor is generic over its [`StreamConnector`], so tests run it
/// against in-memory sources and production against the HTTP adapter.
pub struct StreamSupervisor<C> {
    connector: C,
    dispatcher: Dispatcher,
    config: SupervisorConfig,
    policy: RollOverPolicy,
    backoff: BackoffState,
    state: SessionState,
    session_batches: u64,
}

impl<C> StreamSupervisor<C>
where
    C: StreamConnector,
{
    pub fn new(connector: C, dispatcher: Dispatcher, config: SupervisorConfig) -> Self {
        let policy = RollOverPolicy::new(config.window.clone(), Utc::now());
        let backoff = BackoffState::new(config.backoff.clone(), Instant::now());
        Self {
            connector,
            dispatcher,
            config,
            policy,
            backoff,
            state: SessionState::Disconnected,
            session_batches: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Delay that the last fault produced
    pub fn current_delay(&self) -> Duration {
        self.backoff.delay()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop supervising and hand the dispatcher back for a graceful shutdown
    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }

    /// Run sessions forever
    pub async fn run(&mut self) {
        info!(
            endpoint = self.connector.endpoint(),
            stream = %self.config.stream_name,
            compressed = self.config.compressed,
            "Collection starting"
        );
        loop {
            let outcome = self.run_once().await;
            tokio::time::sleep(outcome.delay).await;
        }
    }

    /// One connect/stream/fault cycle, returning the delay to sleep
    pub async fn run_once(&mut self) -> SessionOutcome {
        self.session_batches = 0;
        let result = self.stream_session().await;
        self.state = SessionState::Faulted;

        let fault = match &result {
            Ok(()) => FaultClass::ForcedDisconnect,
            Err(e) => e.fault_class(),
        };
        let delay = self.backoff.on_fault(fault, Instant::now());
        let delay_secs = delay.as_secs_f64();

        match (&result, fault.kind()) {
            (Ok(()), _) => error!(delay_secs, "Forced disconnect"),
            (Err(e), FaultKind::Protocol) => error!(
                fault = %fault,
                error = %e,
                delay_secs,
                "Protocol error, reconnecting without backoff"
            ),
            (Err(e), _) => error!(
                fault = %fault,
                error = %e,
                delay_secs,
                "Connection failed"
            ),
        }
        info!(delay_secs, batches = self.session_batches, "Reconnecting");

        self.state = SessionState::Disconnected;
        SessionOutcome {
            fault,
            error: result.err(),
            delay,
            batches: self.session_batches,
        }
    }

    async fn stream_session(&mut self) -> Result<(), StreamError> {
        self.state = SessionState::Connecting;
        info!(endpoint = self.connector.endpoint(), "Connecting");
        let source = self.connector.connect().await?;

        let mut reader =
            DecompressingReader::new(source, self.config.compressed, self.config.chunk_size);
        self.state = SessionState::Streaming;
        self.policy.begin_session();

        let result = self.pump(&mut reader).await;
        if let Err(e) = &result {
            if e.fault_class() == FaultClass::StreamProcessing {
                warn!(error = %e, "Buffer processing error, restarting connection");
            }
        }
        reader.close();
        result
    }

    async fn pump<S: ChunkSource>(
        &mut self,
        reader: &mut DecompressingReader<S>,
    ) -> Result<(), StreamError> {
        // Pending bytes die with the session.
        let mut reassembler = RecordReassembler::new();

        loop {
            let chunk = reader.next_chunk().await?;
            if chunk.is_empty() {
                debug!(pending_bytes = reassembler.len(), "Remote end closed the stream");
                return Ok(());
            }
            reassembler.append(&chunk);

            let Some(flush) = self.policy.poll(&mut reassembler, Utc::now()) else {
                continue;
            };
            let batch = RecordBatch::new(
                flush.records,
                self.config.stream_name.as_str(),
                self.config.destination_path.as_path(),
                flush.window_start,
                flush.window_duration,
            );
            if batch.is_empty() {
                info!(window_start = %flush.window_start, "No data collected this period");
            }
            debug!(
                batch_id = %batch.id(),
                size = batch.size(),
                stream = %self.config.stream_name,
                path = %self.config.destination_path.display(),
                window_start = %flush.window_start,
                window_secs = flush.window_duration.as_secs(),
                rolled = flush.rolled,
                "Flushing batch"
            );
            self.dispatcher.dispatch(batch)?;
            self.session_batches += 1;
        }
    }
}
