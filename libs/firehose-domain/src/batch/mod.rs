//! Batch domain module
//!
//! Defines what a flushed batch of records is and how consumers read it.

mod entity;
mod ids;

pub use entity::{RecordBatch, Records};
pub use ids::BatchId;
