// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use depgraph_extractor::{
    config::Config,
    dependency_store::EsDependencyStore,
    es_client::EsClient,
    extractor::{DependencyExtractor, RunOutcome},
    partition::Partition,
    span_store::EsSpanStore,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,reqwest=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
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

    debug!("Starting dependency graph extraction job");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on extraction job startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match EsClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating span store client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let partition = Partition::today(&config.index_prefix);
    info!(
        "Extracting dependencies from {} into {}",
        partition.span_index(),
        partition.dependency_index()
    );

    let extractor = DependencyExtractor {
        span_store: Arc::new(EsSpanStore::new(client.clone(), &config)),
        dependency_store: Arc::new(EsDependencyStore::new(client, &config.index_prefix)),
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, abandoning the scan");
            signal_token.cancel();
        }
    });

    match extractor.run(&partition, &cancel).await {
        Ok(RunOutcome::Exported { links }) => {
            info!(
                "Dependency graph for {} written with {links} links",
                partition.dependency_index()
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Cancelled) => {
            error!("Run cancelled before export, no dependency graph written");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Dependency extraction failed: {e}");
            ExitCode::FAILURE
        }
    }
}
