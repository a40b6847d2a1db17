//! Append batches to dated files on disk

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firehose_domain::{BatchConsumer, ConsumerError, RecordBatch};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Writes every record of a batch to `<dest>/<YYYY>/<MM>/<DD>/<stream>_<YYYYmmddHHMMSS>.json`
///
/// The file name is derived from the window start, so all flushes of one
/// window append to the same file. Heartbeat lines are not written.
#[derive(Debug, Default)]
pub struct FileConsumer;

impl FileConsumer {
    pub fn new() -> Self {
        Self
    }
}

/// Target file of a window
pub fn window_file(dest: &Path, stream: &str, window_start: &DateTime<Utc>) -> PathBuf {
    dest.join(window_start.format("%Y/%m/%d").to_string())
        .join(format!("{}_{}.json", stream, window_start.format("%Y%m%d%H%M%S")))
}

#[async_trait]
impl BatchConsumer for FileConsumer {
    fn name(&self) -> &str {
        "files"
    }

    async fn consume(&self, batch: Arc<RecordBatch>) -> Result<(), ConsumerError> {
        if batch.is_empty() {
            debug!(batch_id = %batch.id(), "Nothing to write");
            return Ok(());
        }

        let path = window_file(
            batch.destination_path(),
            batch.stream_name(),
            batch.window_start(),
        );
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut payload = Vec::with_capacity(batch.size());
        for record in batch.records() {
            payload.extend_from_slice(record);
            payload.extend_from_slice(b"\r\n");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&payload).await?;
        file.flush().await?;

        info!(
            path = %path.display(),
            records = batch.record_count(),
            bytes = payload.len(),
            "Batch written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;
    use std::time::Duration;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("firehose-files-{}", uuid::Uuid::now_v7()))
    }

    fn batch(dest: &Path, records: &'static [u8]) -> Arc<RecordBatch> {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        Arc::new(RecordBatch::new(
            Bytes::from_static(records),
            "decahose",
            dest,
            start,
            Duration::from_secs(12),
        ))
    }

    #[test]
    fn test_window_file_layout() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = window_file(Path::new("/var/data"), "decahose", &start);
        assert_eq!(
            path,
            PathBuf::from("/var/data/2024/03/09/decahose_20240309140507.json")
        );
    }

    #[tokio::test]
    async fn test_flushes_of_one_window_share_a_file() {
        let dest = temp_dir();
        let consumer = FileConsumer::new();

        consumer
            .consume(batch(&dest, b"{\"id\":1}\r\n\r\n"))
            .await
            .unwrap();
        consumer.consume(batch(&dest, b"{\"id\":2}\r\n")).await.unwrap();

        let path = dest.join("2024/03/09/decahose_20240309140507.json");
        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"{\"id\":1}\r\n{\"id\":2}\r\n");

        tokio::fs::remove_dir_all(&dest).await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_batch_creates_nothing() {
        let dest = temp_dir();

        FileConsumer::new()
            .consume(batch(&dest, b"\r\n\r\n"))
            .await
            .unwrap();

        assert!(!dest.exists());
    }
}
