//! Ports (trait definitions) for external dependencies
//!
//! This module defines the contracts (ports) that adapters must implement.
//! Following hexagonal architecture, the domain defines what it needs, and the
//! infrastructure provides implementations.
//!
//! ## Static Dispatch
//!
//! The connection ports use native Rust async traits with `impl Future` return
//! types so the supervisor is monomorphized over its connector. Consumers are
//! stored side by side in one list, so [`BatchConsumer`] is object safe through
//! `async_trait` instead.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::batch::RecordBatch;
use crate::error::{ConsumerError, StreamError};

/// Port for the raw body of one open stream session
///
/// Implementations must:
/// - Return chunks in the order they arrive
/// - Return an empty chunk once the remote end closed the stream cleanly
/// - Convert transport errors to the matching `StreamError` variant
pub trait ChunkSource: Send {
    /// Read the next chunk of the body
    ///
    /// # Returns
    ///
    /// The next bytes of the body, or an empty `Bytes` on a clean close
    ///
    /// # Errors
    ///
    /// Returns a `StreamError` whose fault class reflects what went wrong
    /// (`IncompleteRead` for a broken chunked body, `Connection` for a reset
    /// socket or a read timeout, ...)
    fn next_chunk(&mut self) -> impl Future<Output = Result<Bytes, StreamError>> + Send;

    /// Force-close the underlying connection
    ///
    /// Must be safe to call more than once and after a clean close.
    fn close(&mut self);
}

/// Port for opening stream sessions
///
/// The connector owns the connection parameters (URL, credentials, timeouts)
/// and hands out one [`ChunkSource`] per successful connection attempt.
pub trait StreamConnector: Send + Sync {
    /// Chunk source produced by a successful connection
    type Source: ChunkSource;

    /// Open a new session
    ///
    /// # Errors
    ///
    /// - `StreamError::Http` if the upstream answers with a non-success status
    /// - `StreamError::Tls` if the TLS handshake fails
    /// - `StreamError::Connection` for DNS, socket, URL and timeout failures
    fn connect(&self) -> impl Future<Output = Result<Self::Source, StreamError>> + Send;

    /// Human readable endpoint, for logging
    fn endpoint(&self) -> &str;
}

/// Port for downstream consumers of flushed batches
///
/// Consumers are responsible for their own durability. The engine calls
/// [`BatchConsumer::consume`] from a dedicated worker per consumer and only
/// logs the outcome.
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    /// Short name used in logs (e.g. "files", "latency")
    fn name(&self) -> &str;

    /// Handle one batch
    ///
    /// Batches reach a given consumer in extraction order, one at a time.
    async fn consume(&self, batch: Arc<RecordBatch>) -> Result<(), ConsumerError>;
}
