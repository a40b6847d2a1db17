//! Firehose Collector - long-running streaming feed client
//!
//! Connects to the upstream feed, batches records on a time/size schedule and
//! hands every batch to the configured consumers. Runs until interrupted.

mod config;
mod consumers;

use anyhow::Result;
use firehose_domain::dispatch::Dispatcher;
use firehose_domain::supervisor::StreamSupervisor;
use firehose_http::HttpStreamConnector;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{CollectorConfig, LogFormat};
use consumers::ConsumerContext;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Log a fatal startup error and hand it back for a non-zero exit
fn fatal<E>(err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    error!(error = %err, "Fatal configuration error");
    err.into()
}

#[tokio::main]
async fn main() -> Result<()> {
    // The file may set RUST_LOG, so it is loaded before the subscriber exists.
    let config_file = config::config_path(
        std::env::args().nth(1),
        std::env::var("FIREHOSE_CONFIG_FILE").ok(),
    );
    if let Some(path) = &config_file {
        config::load_env_file(path)?;
    }

    init_tracing(LogFormat::from_env());

    info!("Starting Firehose collector");
    if let Some(path) = &config_file {
        info!(path = %path.display(), "Loaded configuration file");
    }

    let config = CollectorConfig::from_env().map_err(fatal)?;
    let kinds = consumers::resolve(&config.process_types).map_err(fatal)?;

    info!(
        url = %config.stream.url,
        stream = %config.supervisor.stream_name,
        path = %config.supervisor.destination_path.display(),
        compressed = config.supervisor.compressed,
        roll_secs = config.supervisor.window.roll_duration.as_secs(),
        consumers = ?kinds.iter().map(|k| k.name()).collect::<Vec<_>>(),
        "Configuration loaded"
    );

    let ctx = ConsumerContext {
        options: config.options.clone(),
    };
    let consumers = consumers::build_consumers(&kinds, &ctx).map_err(fatal)?;
    let dispatcher = Dispatcher::with_backlog_threshold(consumers, config.backlog_warn_threshold);

    let connector = HttpStreamConnector::new(config.stream.clone()).map_err(fatal)?;
    let mut supervisor = StreamSupervisor::new(connector, dispatcher, config.supervisor);

    tokio::select! {
        _ = supervisor.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, draining consumers");
        }
    }

    supervisor.into_dispatcher().shutdown().await;
    info!("Firehose collector stopped");
    Ok(())
}
