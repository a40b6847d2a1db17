//! Delivery latency of the records in a batch

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firehose_domain::{BatchConsumer, ConsumerError, RecordBatch};
use serde::Deserialize;
use tracing::{info, warn};

// Twitter-style `created_at`, e.g. "Wed Oct 10 20:19:24 +0000 2018"
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Deserialize)]
struct Stamped {
    #[serde(rename = "postedTime")]
    posted_time: Option<String>,
    created_at: Option<String>,
}

impl Stamped {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        if let Some(posted) = &self.posted_time {
            return DateTime::parse_from_rfc3339(posted)
                .ok()
                .map(|t| t.with_timezone(&Utc));
        }
        self.created_at.as_ref().and_then(|created| {
            DateTime::parse_from_str(created, CREATED_AT_FORMAT)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        })
    }
}

/// Latency figures of one batch, in milliseconds
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub measured: u64,
    pub skipped: u64,
    pub mean_ms: f64,
    pub max_ms: i64,
}

/// Measure how far behind wall-clock time the records of a batch are
pub fn measure(batch: &RecordBatch, now: DateTime<Utc>) -> LatencyStats {
    let mut stats = LatencyStats::default();
    let mut total_ms: i64 = 0;

    for record in batch.records() {
        let stamp = serde_json::from_slice::<Stamped>(record)
            .ok()
            .and_then(|s| s.timestamp());
        match stamp {
            Some(t) => {
                let latency = (now - t).num_milliseconds();
                total_ms += latency;
                stats.max_ms = if stats.measured == 0 {
                    latency
                } else {
                    stats.max_ms.max(latency)
                };
                stats.measured += 1;
            }
            None => stats.skipped += 1,
        }
    }

    if stats.measured > 0 {
        stats.mean_ms = total_ms as f64 / stats.measured as f64;
    }
    stats
}

/// Logs per-batch latency against the local clock
#[derive(Debug, Default)]
pub struct LatencyConsumer;

impl LatencyConsumer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BatchConsumer for LatencyConsumer {
    fn name(&self) -> &str {
        "latency"
    }

    async fn consume(&self, batch: Arc<RecordBatch>) -> Result<(), ConsumerError> {
        let stats = measure(&batch, Utc::now());
        if stats.measured == 0 {
            if stats.skipped > 0 {
                warn!(skipped = stats.skipped, "No timestamped records in batch");
            }
            return Ok(());
        }

        info!(
            stream = batch.stream_name(),
            records = stats.measured,
            skipped = stats.skipped,
            mean_ms = stats.mean_ms,
            max_ms = stats.max_ms,
            "Batch latency"
        );
        Ok(())
    }
}
