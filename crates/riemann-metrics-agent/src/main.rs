// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use riemann_metrics::{aggregator::Aggregator, config::PipelineConfig, pipeline::Pipeline};

/// Splits a `<kind> <key> <value>` line.
fn parse_line(line: &str) -> Option<(&str, &str, f64)> {
    let mut fields = line.split_whitespace();
    let kind = fields.next()?;
    let key = fields.next()?;
    let value = fields.next()?.parse::<f64>().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((kind, key, value))
}

async fn record_stdin(aggregator: &Aggregator) {
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Some((kind, key, value)) => aggregator.record_tagged(kind, key, value),
                None if line.trim().is_empty() => {}
                None => debug!("Ignoring malformed line: {line}"),
            },
            Ok(None) => {
                info!("End of input");
                return;
            }
            Err(e) => {
                error!("Failed to read input: {e}");
                return;
            }
        }
    }
}

/// Filter for both crates at the configured level.
fn log_filter(config: &PipelineConfig) -> EnvFilter {
    let log_level = &config.log_level;
    EnvFilter::try_new(format!(
        "riemann_metrics={log_level},riemann_metrics_agent={log_level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("riemann_metrics=info,riemann_metrics_agent=info"))
}

fn init_logging(config: &PipelineConfig) {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(log_filter(config))
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
}

#[tokio::main]
pub async fn main() {
    // The level comes from the validated config; a config error is still
    // reported at the default level.
    let config = match PipelineConfig::from_env() {
        Ok(config) => {
            init_logging(&config);
            config
        }
        Err(e) => {
            init_logging(&PipelineConfig::default());
            error!("{e}. Shutting down.");
            return;
        }
    };

    let pipeline = Pipeline::start(&config);

    tokio::select! {
        _ = record_stdin(pipeline.aggregator()) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Received shutdown signal");
        }
    }

    pipeline.shutdown().await;
    info!("Shut down");
}
