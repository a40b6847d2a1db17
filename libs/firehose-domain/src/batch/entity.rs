//! Record batch entity
//!
//! A RecordBatch is what a flush produces: the complete records extracted in one
//! reassembly pass together with the window they belong to.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::batch::ids::BatchId;
use crate::stream::{find_delimiter, DELIMITER};

/// Complete records handed to every consumer after a flush
///
/// The raw payload is the delimiter-joined record bytes exactly as they came
/// off the wire: every record, including the last one, ends with CR-LF. Blank
/// records (keep-alive heartbeats) are kept in the raw payload but skipped by
/// [`RecordBatch::records`].
///
/// Batches are shared read-only between consumers and are dropped once every
/// consumer is done with them.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use chrono::Utc;
/// use firehose_domain::RecordBatch;
/// use std::time::Duration;
///
/// let batch = RecordBatch::new(
///     Bytes::from_static(b"{\"id\":1}\r\n\r\n{\"id\":2}\r\n"),
///     "decahose",
///     "/var/data",
///     Utc::now(),
///     Duration::from_secs(30),
/// );
/// assert_eq!(batch.record_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Unique identifier for this batch
    id: BatchId,

    /// Delimiter-terminated raw records
    records: Bytes,

    /// Name of the stream the records came from
    stream_name: String,

    /// Where consumers persist their output
    destination_path: PathBuf,

    /// Start of the batch window the records belong to
    window_start: DateTime<Utc>,

    /// Time elapsed between the window start and the flush
    window_duration: Duration,
}

impl RecordBatch {
    /// Create a new batch from extracted records and window metadata
    pub fn new(
        records: Bytes,
        stream_name: impl Into<String>,
        destination_path: impl Into<PathBuf>,
        window_start: DateTime<Utc>,
        window_duration: Duration,
    ) -> Self {
        Self {
            id: BatchId::new(),
            records,
            stream_name: stream_name.into(),
            destination_path: destination_path.into(),
            window_start,
            window_duration,
        }
    }

    /// Get the batch's unique identifier
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// Raw delimiter-joined record bytes
    pub fn raw(&self) -> &Bytes {
        &self.records
    }

    /// Size of the raw payload in bytes
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Iterate over the non-blank records, without their delimiters
    pub fn records(&self) -> Records<'_> {
        Records {
            rest: &self.records,
        }
    }

    /// Number of non-blank records
    pub fn record_count(&self) -> usize {
        self.records().count()
    }

    /// True when the batch only holds heartbeats or nothing at all
    pub fn is_empty(&self) -> bool {
        self.records().next().is_none()
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    pub fn window_start(&self) -> &DateTime<Utc> {
        &self.window_start
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }
}

/// Iterator over the records of a batch
#[derive(Debug, Clone)]
pub struct Records<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let rest = self.rest;
            let (record, tail) = match find_delimiter(rest) {
                Some(pos) => (&rest[..pos], &rest[pos + DELIMITER.len()..]),
                None => (rest, &rest[rest.len()..]),
            };
            self.rest = tail;
            if !record.is_empty() {
                return Some(record);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(raw: &'static [u8]) -> RecordBatch {
        RecordBatch::new(
            Bytes::from_static(raw),
            "decahose",
            "/tmp/firehose",
            Utc::now(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_batch_id_generation() {
        let id1 = BatchId::new();
        let id2 = BatchId::new();

        assert_ne!(id1, id2, "Each BatchId should be unique");
        assert_eq!(id1.to_string().len(), 36);
    }

    #[test]
    fn test_records_split_on_delimiter() {
        let b = batch(b"{\"id\":1}\r\n{\"id\":2}\r\n");
        let records: Vec<&[u8]> = b.records().collect();

        assert_eq!(records, vec![&b"{\"id\":1}"[..], &b"{\"id\":2}"[..]]);
        assert_eq!(b.size(), 20);
    }

    #[test]
    fn test_records_skip_heartbeats() {
        let b = batch(b"\r\n{\"id\":1}\r\n\r\n\r\n{\"id\":2}\r\n");

        assert_eq!(b.record_count(), 2);
        assert!(!b.is_empty());
    }

    #[test]
    fn test_heartbeat_only_batch_is_empty() {
        let b = batch(b"\r\n\r\n");

        assert!(b.is_empty());
        assert_eq!(b.record_count(), 0);
        assert_eq!(b.size(), 4);
    }

    #[test]
    fn test_metadata_accessors() {
        let b = batch(b"x\r\n");

        assert_eq!(b.stream_name(), "decahose");
        assert_eq!(b.destination_path(), Path::new("/tmp/firehose"));
        assert_eq!(b.window_duration(), Duration::from_secs(5));
    }
}
