mod classify;
mod http_connector;

pub use http_connector::{HttpChunkSource, HttpStreamConfig, HttpStreamConnector};
