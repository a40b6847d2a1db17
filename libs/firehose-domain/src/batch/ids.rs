use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a flushed batch
///
/// Backed by a UUID v7: ids of successive flushes sort in extraction order and
/// carry the millisecond at which the batch was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wall-clock time embedded in the id
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_sort_in_creation_order() {
        let first = BatchId::new();
        let second = BatchId::new();
        assert!(first < second);
    }

    #[test]
    fn test_created_at_is_recent() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let created = BatchId::new().created_at().unwrap();
        assert!(created >= before);
        assert!(created <= Utc::now() + chrono::Duration::seconds(1));
    }
}
