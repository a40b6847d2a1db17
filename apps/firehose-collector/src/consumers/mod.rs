//! Consumer registry
//!
//! Maps the configured process-type names onto concrete [`BatchConsumer`]
//! implementations. Names are resolved once at startup and an unknown name
//! aborts the collector before any connection is made.

mod files;
mod latency;
mod rules;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use firehose_domain::{BatchConsumer, ConsumerError};
use thiserror::Error;
use tracing::warn;

pub use files::FileConsumer;
pub use latency::LatencyConsumer;
pub use rules::RulesConsumer;

/// Registry failures, all fatal at startup
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown consumer {0:?} (expected one of: files, latency, rules)")]
    Unknown(String),

    #[error("No valid processing strategy selected")]
    Empty,

    #[error("Failed to build consumer {name}: {source}")]
    Build {
        name: &'static str,
        #[source]
        source: ConsumerError,
    },
}

/// Consumers the collector knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerKind {
    Files,
    Latency,
    Rules,
}

impl ConsumerKind {
    pub fn name(self) -> &'static str {
        match self {
            ConsumerKind::Files => "files",
            ConsumerKind::Latency => "latency",
            ConsumerKind::Rules => "rules",
        }
    }

    fn build(self, ctx: &ConsumerContext) -> Result<Arc<dyn BatchConsumer>, ConsumerError> {
        Ok(match self {
            ConsumerKind::Files => Arc::new(FileConsumer::new()),
            ConsumerKind::Latency => Arc::new(LatencyConsumer::new()),
            ConsumerKind::Rules => Arc::new(RulesConsumer::from_options(&ctx.options)?),
        })
    }
}

impl FromStr for ConsumerKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "files" => Ok(ConsumerKind::Files),
            "latency" => Ok(ConsumerKind::Latency),
            "rules" => Ok(ConsumerKind::Rules),
            _ => Err(RegistryError::Unknown(s.to_string())),
        }
    }
}

/// Settings handed to consumers at construction
///
/// Batches already carry the stream name and destination path.
#[derive(Debug, Clone, Default)]
pub struct ConsumerContext {
    /// Extra consumer options, lower-cased keys
    pub options: HashMap<String, String>,
}

/// Parse configured names into consumer kinds
///
/// Duplicates are dropped with a warning; the first occurrence keeps its
/// position.
pub fn resolve(names: &[String]) -> Result<Vec<ConsumerKind>, RegistryError> {
    let mut kinds: Vec<ConsumerKind> = Vec::with_capacity(names.len());
    for name in names {
        let kind: ConsumerKind = name.parse()?;
        if kinds.contains(&kind) {
            warn!(consumer = kind.name(), "Consumer listed twice, ignoring duplicate");
            continue;
        }
        kinds.push(kind);
    }
    if kinds.is_empty() {
        return Err(RegistryError::Empty);
    }
    Ok(kinds)
}

/// Build one consumer per kind
pub fn build_consumers(
    kinds: &[ConsumerKind],
    ctx: &ConsumerContext,
) -> Result<Vec<Arc<dyn BatchConsumer>>, RegistryError> {
    kinds
        .iter()
        .map(|kind| {
            kind.build(ctx).map_err(|source| RegistryError::Build {
                name: kind.name(),
                source,
            })
        })
        .collect()
}
