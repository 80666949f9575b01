//! CLOB-backed venue implementation.
//!
//! Read side hits the public `/book` endpoint; the write side posts to
//! `/order` and `/orders` with L2 auth headers signed over the exact body
//! string that goes on the wire. A fill is only believed when the venue
//! reports `status == "matched"` or a settlement transaction hash.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::config::Config;
use crate::error::VenueError;
use crate::quotes::{RestBook, TopOfBook};

use super::auth::L2Credentials;
use super::{MarketDataSource, OrderIntent, OrderResult, OrderVenue};

const HTTP_TIMEOUT_MS: u64 = 2_000;
const CONNECT_TIMEOUT_MS: u64 = 500;
const POOL_IDLE_SECS: u64 = 90;

/// Venue client for the Polymarket CLOB.
#[derive(Debug, Clone)]
pub struct PolymarketVenue {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL for the CLOB API.
    clob_url: String,
    /// L2 credentials; absent in read-only operation.
    creds: Option<L2Credentials>,
}

/// Order payload as posted to `/order` and `/orders`.
#[derive(Debug, Clone, Serialize)]
struct OrderPayload {
    #[serde(rename = "tokenID")]
    token_id: String,
    price: String,
    size: String,
    side: String,
    #[serde(rename = "orderType")]
    order_type: String,
}

impl OrderPayload {
    fn from_intent(intent: &OrderIntent) -> Self {
        Self {
            token_id: intent.token_id.clone(),
            price: intent.price.to_string(),
            size: intent.size.to_string(),
            side: intent.side.to_string(),
            order_type: intent.tif.to_string(),
        }
    }
}

/// One order's outcome as the venue reports it.
#[derive(Debug, Clone, Deserialize)]
struct SubmitResult {
    #[serde(rename = "orderID", alias = "orderId")]
    order_id: Option<String>,
    status: Option<String>,
    #[serde(rename = "transactionHash", alias = "transactionsHashes")]
    transaction_hash: Option<serde_json::Value>,
    #[serde(rename = "makingAmount")]
    making_amount: Option<String>,
    #[serde(rename = "takingAmount")]
    taking_amount: Option<String>,
    #[serde(rename = "errorMsg")]
    error_msg: Option<String>,
}

impl SubmitResult {
    /// Matched status or an on-chain hash both count as filled; anything
    /// weaker is treated as a miss.
    ///
    /// For a buy the venue reports makingAmount in dollars given and
    /// takingAmount in shares received, so their ratio is the average price
    /// actually paid.
    fn into_order_result(self, requested_size: Decimal) -> OrderResult {
        let has_hash = self
            .transaction_hash
            .as_ref()
            .map(|v| !v.is_null() && v.as_str() != Some(""))
            .unwrap_or(false);
        let filled = self.status.as_deref() == Some("matched") || has_hash;

        let taking = self
            .taking_amount
            .as_deref()
            .and_then(|s| s.parse::<Decimal>().ok());
        let making = self
            .making_amount
            .as_deref()
            .and_then(|s| s.parse::<Decimal>().ok());

        let fill_size = if filled {
            taking.unwrap_or(requested_size)
        } else {
            Decimal::ZERO
        };
        let fill_price = match (filled, making, taking) {
            (true, Some(m), Some(t)) if t > Decimal::ZERO => Some(m / t),
            _ => None,
        };

        OrderResult {
            filled,
            fill_price,
            fill_size,
            order_id: self.order_id,
            reason: self.error_msg,
        }
    }
}

impl PolymarketVenue {
    /// Create a venue client tuned for low-latency polling.
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(HTTP_TIMEOUT_MS))
            .connect_timeout(std::time::Duration::from_millis(CONNECT_TIMEOUT_MS))
            .tcp_nodelay(true)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(POOL_IDLE_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http,
            clob_url: config.clob_url.clone(),
            creds: L2Credentials::from_config(config),
        }
    }

    /// Whether order submission is possible.
    pub fn can_trade(&self) -> bool {
        self.creds.is_some()
    }

    /// POST a pre-serialized body with auth headers and decode the response.
    async fn post_signed(&self, path: &str, body: String) -> Result<reqwest::Response, VenueError> {
        let creds = self
            .creds
            .as_ref()
            .ok_or_else(|| VenueError::Auth("no API credentials configured".to_string()))?;

        let mut request = self
            .http
            .post(format!("{}{}", self.clob_url, path))
            .header("Content-Type", "application/json");
        for (key, value) in creds.headers("POST", path, &body) {
            request = request.header(&key, &value);
        }

        let response = request.body(body).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_seconds = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            warn!(path, retry_after_seconds, "venue rate limited order submission");
            return Err(VenueError::RateLimited {
                retry_after_seconds,
            });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            error!(path, %status, body, "venue rejected credentials");
            return Err(VenueError::Auth(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::BadResponse(format!("HTTP {status}: {body}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl MarketDataSource for PolymarketVenue {
    #[instrument(skip(self), fields(token_id = %token_id))]
    async fn top_of_book(&self, token_id: &str) -> Result<TopOfBook, VenueError> {
        let url = format!("{}/book", self.clob_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(VenueError::RateLimited {
                retry_after_seconds: 1,
            });
        }
        if !response.status().is_success() {
            return Err(VenueError::BadResponse(format!(
                "book fetch failed: HTTP {}",
                response.status()
            )));
        }

        let book: RestBook = response
            .json()
            .await
            .map_err(|e| VenueError::BadResponse(format!("book parse failed: {e}")))?;
        Ok(book.to_top_of_book())
    }
}

#[async_trait]
impl OrderVenue for PolymarketVenue {
    fn supports_batch(&self) -> bool {
        true
    }

    #[instrument(skip(self, intent), fields(token_id = %intent.token_id, side = %intent.side))]
    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult, VenueError> {
        let payload = OrderPayload::from_intent(intent);
        let body = serde_json::to_string(&payload)
            .map_err(|e| VenueError::BadResponse(format!("order encode failed: {e}")))?;

        let response = self.post_signed("/order", body).await?;
        let result: SubmitResult = response
            .json()
            .await
            .map_err(|e| VenueError::BadResponse(format!("order response parse failed: {e}")))?;

        debug!(
            status = result.status.as_deref().unwrap_or("none"),
            "order response received"
        );
        Ok(result.into_order_result(intent.size))
    }

    #[instrument(skip(self, intents), fields(count = intents.len()))]
    async fn submit_batch(&self, intents: &[OrderIntent]) -> Result<Vec<OrderResult>, VenueError> {
        let payloads: Vec<OrderPayload> = intents.iter().map(OrderPayload::from_intent).collect();
        let body = serde_json::to_string(&payloads)
            .map_err(|e| VenueError::BadResponse(format!("batch encode failed: {e}")))?;

        let response = self.post_signed("/orders", body).await?;
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VenueError::BadResponse(format!("batch response parse failed: {e}")))?;

        // The endpoint answers with a positional array, but collapses to a
        // single object on some failure paths.
        let results: Vec<SubmitResult> = match raw {
            serde_json::Value::Array(_) => serde_json::from_value(raw)
                .map_err(|e| VenueError::BadResponse(format!("batch decode failed: {e}")))?,
            other => vec![serde_json::from_value(other)
                .map_err(|e| VenueError::BadResponse(format!("batch decode failed: {e}")))?],
        };

        if results.len() != intents.len() {
            return Err(VenueError::BadResponse(format!(
                "batch returned {} results for {} orders",
                results.len(),
                intents.len()
            )));
        }

        Ok(results
            .into_iter()
            .zip(intents)
            .map(|(result, intent)| result.into_order_result(intent.size))
            .collect())
    }
}
