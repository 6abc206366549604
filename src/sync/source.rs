//! Snapshot source
//!
//! Fetches a full depth snapshot for one symbol from the REST API.

use futures_util::future::{BoxFuture, FutureExt};
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::parser::OrderBookSnapshot;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can produce a depth snapshot for a symbol
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self, symbol: &str) -> BoxFuture<'static, Result<OrderBookSnapshot>>;
}

/// Binance REST depth endpoint
pub struct RestSnapshotClient {
    client: reqwest::Client,
    endpoint: String,
    limit: usize,
}

impl RestSnapshotClient {
    pub fn new(endpoint: &str, limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            limit,
        })
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/depth?symbol={}&limit={}",
            self.endpoint,
            symbol.to_uppercase(),
            self.limit
        )
    }
}

impl SnapshotSource for RestSnapshotClient {
    fn fetch(&self, symbol: &str) -> BoxFuture<'static, Result<OrderBookSnapshot>> {
        let client = self.client.clone();
        let url = self.url(symbol);
        let symbol = symbol.to_string();

        async move {
            info!(symbol = %symbol, url = %url, "Fetching order book snapshot");

            let snapshot = client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<OrderBookSnapshot>()
                .await?;

            Ok(snapshot)
        }
        .boxed()
    }
}
