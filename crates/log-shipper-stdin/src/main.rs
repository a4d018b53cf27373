// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use log_shipper::{
    client::{HttpLogsClient, UnsignedRequests},
    config::ShipperConfig,
    logger::Formatter,
    record::{LogRecord, Message},
    shipper::LogShipper,
};

const DEFAULT_STREAM: &str = "stdin";

#[tokio::main]
pub async fn main() {
    let config = match ShipperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("LOG_SHIPPER | ERROR | Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let client = match HttpLogsClient::new(&config, Arc::new(UnsignedRequests)) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create log service client: {e}");
            std::process::exit(2);
        }
    };
    let stream = config
        .stream_name
        .clone()
        .unwrap_or_else(|| DEFAULT_STREAM.to_string());
    let shipper = match LogShipper::start(config, Arc::new(client)).await {
        Ok(shipper) => shipper,
        Err(e) => {
            error!("Failed to start log shipper: {e}");
            std::process::exit(2);
        }
    };
    info!("Shipping stdin to stream {stream}");

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Received interrupt, flushing");
            signal_token.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record = LogRecord::new(stream.as_str(), parse_line(line));
                    if let Err(e) = shipper.emit(&record) {
                        warn!("Dropped line: {e}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            },
        }
    }

    let failures = shipper.flush().await;
    if !failures.is_empty() {
        for failure in &failures {
            error!("Stream {} stopped: {}", failure.stream, failure.error);
        }
        std::process::exit(1);
    }
}

/// JSON objects are shipped as structured messages, anything else as text.
fn parse_line(line: String) -> Message {
    match serde_json::from_str::<Value>(&line) {
        Ok(Value::Object(fields)) => Message::Fields(fields),
        _ => Message::Text(line),
    }
}
