//! # Firehose Domain Layer
//!
//! This crate contains the stream ingestion and windowing engine of the Firehose
//! collector. It follows hexagonal architecture principles:
//!
//! - **Entities**: Core domain models (RecordBatch)
//! - **Ports**: Trait definitions for external dependencies (StreamConnector, ChunkSource, BatchConsumer)
//! - **Services**: The connection supervisor and the dispatch fan-out
//!
//! ## Architecture
//!
//! This layer has NO dependency on a concrete transport. The HTTP connection is
//! expressed as a port and implemented by the `firehose-http` adapter, while
//! downstream consumers are plugged in by the application.
//!
//! ```text
//! StreamConnector ──► DecompressingReader ──► RecordReassembler
//!                                                   │
//!                                          RollOverPolicy::poll
//!                                                   │
//!                                   Dispatcher ──► BatchConsumer (one queue each)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use firehose_domain::dispatch::Dispatcher;
//! use firehose_domain::ports::StreamConnector;
//! use firehose_domain::supervisor::{StreamSupervisor, SupervisorConfig};
//!
//! async fn example<C: StreamConnector>(connector: C, dispatcher: Dispatcher) {
//!     let config = SupervisorConfig::new("decahose", "/var/data/decahose");
//!     let mut supervisor = StreamSupervisor::new(connector, dispatcher, config);
//!     supervisor.run().await;
//! }
//! ```

pub mod backoff;
pub mod batch;
pub mod dispatch;
pub mod error;
pub mod ports;
pub mod stream;
pub mod supervisor;
pub mod window;

// Re-export commonly used types
pub use batch::{BatchId, RecordBatch};
pub use error::{ConsumerError, FaultClass, FaultKind, StreamError};
pub use ports::{BatchConsumer, ChunkSource, StreamConnector};
