// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

/// Spans requested per scroll page.
const DEFAULT_PAGE_SIZE: usize = 500;
/// Server-side cursor keep-alive between page requests. The next page must be
/// requested before this window elapses or the cursor is gone.
const DEFAULT_SCROLL_KEEP_ALIVE: &str = "2m";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the span store, e.g. `http://localhost:9200`.
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Optional namespace prepended to both index names.
    pub index_prefix: String,
    pub page_size: usize,
    pub scroll_keep_alive: String,
    /// Timeout for each individual store request, in seconds.
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Config, Box<dyn std::error::Error>> {
        let endpoint = env::var("ES_HOST")
            .map_err(|_| anyhow::anyhow!("ES_HOST environment variable is not set"))?;
        if endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("ES_HOST must not be empty").into());
        }

        let username = env::var("ES_USERNAME").ok().filter(|u| !u.is_empty());
        let password = env::var("ES_PASSWORD").ok().filter(|p| !p.is_empty());
        let index_prefix = env::var("ES_INDEX_PREFIX").unwrap_or_default();

        Ok(Config {
            endpoint,
            username,
            password,
            index_prefix,
            page_size: DEFAULT_PAGE_SIZE,
            scroll_keep_alive: DEFAULT_SCROLL_KEEP_ALIVE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        })
    }
}
