//! Per-rule match counts

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use firehose_domain::{BatchConsumer, ConsumerError, RecordBatch};
use serde::Deserialize;
use tracing::info;

const DEFAULT_TOP: usize = 10;

#[derive(Deserialize)]
struct Envelope {
    gnip: Option<Gnip>,
}

#[derive(Deserialize)]
struct Gnip {
    #[serde(default)]
    matching_rules: Vec<MatchingRule>,
}

#[derive(Deserialize)]
struct MatchingRule {
    value: Option<String>,
    tag: Option<String>,
}

/// Count how often each rule matched in a batch
///
/// A rule is identified by its value, or by its tag when the value is absent.
pub fn count_rules(batch: &RecordBatch) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for record in batch.records() {
        let Ok(envelope) = serde_json::from_slice::<Envelope>(record) else {
            continue;
        };
        for rule in envelope.gnip.into_iter().flat_map(|g| g.matching_rules) {
            if let Some(key) = rule.value.or(rule.tag) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// The `n` most frequent rules, ties broken by name
pub fn top_rules(counts: HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Logs the most frequently matched rules of each batch
#[derive(Debug)]
pub struct RulesConsumer {
    top: usize,
}

impl RulesConsumer {
    pub fn new(top: usize) -> Self {
        Self { top }
    }

    /// Build from extra options; reads `rules_top`
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, ConsumerError> {
        let top = match options.get("rules_top") {
            None => DEFAULT_TOP,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    ConsumerError::config(format!(
                        "rules_top must be a positive integer, got {raw:?}"
                    ))
                })?,
        };
        Ok(Self::new(top))
    }
}

#[async_trait]
impl BatchConsumer for RulesConsumer {
    fn name(&self) -> &str {
        "rules"
    }

    async fn consume(&self, batch: Arc<RecordBatch>) -> Result<(), ConsumerError> {
        let counts = count_rules(&batch);
        if counts.is_empty() {
            return Ok(());
        }

        let distinct = counts.len();
        let summary = top_rules(counts, self.top)
            .into_iter()
            .map(|(rule, n)| format!("{rule}={n}"))
            .collect::<Vec<_>>()
            .join(", ");

        info!(
            stream = batch.stream_name(),
            distinct_rules = distinct,
            top = %summary,
            "Rule matches"
        );
        Ok(())
    }
}
