//! Incremental gzip inflation of a chunk source

use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::write::MultiGzDecoder;
use tracing::trace;

use crate::error::{Result, StreamError};
use crate::ports::ChunkSource;

/// Chunk source that inflates a gzip-framed body on the fly
///
/// The inflater state lives as long as the reader, i.e. one session, and
/// accepts several concatenated gzip members. When the stream is not
/// compressed the reader only re-slices chunks to `chunk_size`.
///
/// An empty chunk still means the remote end closed: raw chunks that inflate to
/// nothing (a lone gzip header, say) are absorbed and the next raw chunk is read.
pub struct DecompressingReader<S> {
    source: S,
    inflater: Option<MultiGzDecoder<Vec<u8>>>,
    chunk_size: usize,
    ready: BytesMut,
}

impl<S: ChunkSource> DecompressingReader<S> {
    pub fn new(source: S, compressed: bool, chunk_size: usize) -> Self {
        Self {
            source,
            inflater: compressed.then(|| MultiGzDecoder::new(Vec::new())),
            chunk_size: chunk_size.max(1),
            ready: BytesMut::new(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.inflater.is_some()
    }

    /// Give the wrapped source back
    pub fn into_inner(self) -> S {
        self.source
    }

    fn inflate(&mut self, raw: &[u8]) -> Result<()> {
        let Some(inflater) = self.inflater.as_mut() else {
            self.ready.extend_from_slice(raw);
            return Ok(());
        };
        inflater
            .write_all(raw)
            .and_then(|_| inflater.flush())
            .map_err(|e| StreamError::decompression(e.to_string()))?;

        let out = inflater.get_mut();
        trace!(raw = raw.len(), inflated = out.len(), "Inflated chunk");
        self.ready.extend_from_slice(out);
        out.clear();
        Ok(())
    }
}

impl<S: ChunkSource> ChunkSource for DecompressingReader<S> {
    async fn next_chunk(&mut self) -> Result<Bytes> {
        loop {
            if !self.ready.is_empty() {
                let n = self.ready.len().min(self.chunk_size);
                return Ok(self.ready.split_to(n).freeze());
            }

            let raw = self.source.next_chunk().await?;
            if raw.is_empty() {
                return Ok(Bytes::new());
            }
            self.inflate(&raw)?;
        }
    }

    fn close(&mut self) {
        self.ready.clear();
        self.source.close();
    }
}
