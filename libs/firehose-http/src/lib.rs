//! # Firehose HTTP adapter
//!
//! Implements the `StreamConnector` and `ChunkSource` ports of
//! `firehose-domain` on top of `reqwest`. The adapter only moves bytes: the
//! body is handed over exactly as received (still gzip-framed when the feed is
//! compressed) and inflation happens in the domain layer.

pub mod infrastructure;

pub use infrastructure::{HttpChunkSource, HttpStreamConfig, HttpStreamConnector};
