use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::market_data::types::{
    BuySignal, BuySignalsResponse, CashFlowResponse, Envelope, Snapshot, SummaryResponse,
};

pub const SUMMARY_PATH: &str = "/api/summary";
pub const CASH_FLOW_PATH: &str = "/api/cash-flow";
pub const BUY_SIGNALS_PATH: &str = "/api/buy-signals";

/// Where poll cycles get their data from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_summary(&self) -> Result<SummaryResponse, FetchError>;

    async fn fetch_cash_flow(&self) -> Result<CashFlowResponse, FetchError>;

    async fn fetch_buy_signals(&self) -> Result<Vec<BuySignal>, FetchError>;
}

/// [`SnapshotSource`] backed by the dashboard's JSON API.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tickboard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T>(&self, path: &str) -> Result<T, FetchError>
    where
        T: DeserializeOwned + Envelope,
    {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: T = serde_json::from_str(&body)?;
        if !payload.is_ok() {
            let reason = payload.error().unwrap_or("unspecified error").to_string();
            return Err(FetchError::Api(reason));
        }
        debug!(%url, bytes = body.len(), "fetched");
        Ok(payload)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_summary(&self) -> Result<SummaryResponse, FetchError> {
        self.get(SUMMARY_PATH).await
    }

    async fn fetch_cash_flow(&self) -> Result<CashFlowResponse, FetchError> {
        self.get(CASH_FLOW_PATH).await
    }

    async fn fetch_buy_signals(&self) -> Result<Vec<BuySignal>, FetchError> {
        self.get::<BuySignalsResponse>(BUY_SIGNALS_PATH)
            .await
            .map(|resp| resp.signals)
    }
}

/// Fetches every endpoint of one poll cycle concurrently.
///
/// The summary is mandatory. A failing auxiliary endpoint only blanks its own
/// part of the snapshot so the panels it feeds stay as they are.
pub async fn fetch_snapshot<S>(source: &S, seq: u64) -> Result<Snapshot, FetchError>
where
    S: SnapshotSource + ?Sized,
{
    let (summary, cash_flow, buy_signals) = futures::join!(
        source.fetch_summary(),
        source.fetch_cash_flow(),
        source.fetch_buy_signals(),
    );

    let cash_flow = cash_flow
        .inspect_err(|err| warn!(seq, kind = err.kind(), error = %err, "cash-flow fetch failed"))
        .ok();
    let buy_signals = buy_signals
        .inspect_err(|err| warn!(seq, kind = err.kind(), error = %err, "buy-signals fetch failed"))
        .ok();

    Ok(Snapshot {
        seq,
        summary: summary?,
        cash_flow,
        buy_signals,
    })
}
