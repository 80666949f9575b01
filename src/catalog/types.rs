//! Catalog types for binary YES/NO prediction markets.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Side of a binary market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// YES (or "Up") token.
    #[strum(serialize = "yes", serialize = "up", serialize = "YES", serialize = "UP")]
    #[default]
    Yes,
    /// NO (or "Down") token.
    #[strum(serialize = "no", serialize = "down", serialize = "NO", serialize = "DOWN")]
    No,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

/// Market resolution cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Timeframe {
    /// 15-minute markets.
    #[strum(serialize = "15m")]
    M15,
    /// Hourly markets.
    #[strum(serialize = "1h")]
    H1,
    /// 4-hour markets.
    #[strum(serialize = "4h")]
    H4,
    /// Daily markets.
    #[strum(serialize = "daily")]
    Daily,
    /// All-binary scans are not bucketed by cadence.
    #[strum(serialize = "all")]
    All,
}

/// Which universe of markets a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ScanMode {
    /// Crypto up/down markets only, one per (coin, timeframe).
    #[strum(serialize = "crypto")]
    CryptoOnly,
    /// Every active binary market, volume-ordered.
    #[strum(serialize = "all")]
    AllBinary,
}

/// Crypto asset referenced by an up/down market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Coin {
    Btc,
    Eth,
    Sol,
    Xrp,
    /// Non-crypto or unrecognized underlying.
    Other,
}

/// Detect the coin an up/down market refers to from its question and slug.
pub fn detect_coin(text: &str) -> Coin {
    let text = text.to_lowercase();
    if text.contains("bitcoin") || text.contains("btc") {
        Coin::Btc
    } else if text.contains("ethereum") || text.contains("eth ") || text.starts_with("eth") {
        Coin::Eth
    } else if text.contains("solana") || text.contains("sol ") || text.starts_with("sol") {
        Coin::Sol
    } else if text.contains("xrp") {
        Coin::Xrp
    } else {
        Coin::Other
    }
}

/// Immutable snapshot of a tradeable binary market.
#[derive(Debug, Clone)]
pub struct Market {
    /// Condition id uniquely identifying the market.
    pub id: String,
    /// Market slug.
    pub slug: String,
    /// Market question text.
    pub question: String,
    /// Cadence bucket this market was discovered under.
    pub timeframe: Timeframe,
    /// Underlying coin, [`Coin::Other`] for non-crypto markets.
    pub coin: Coin,
    /// YES token id for the CLOB.
    pub yes_token_id: String,
    /// NO token id for the CLOB.
    pub no_token_id: String,
    /// Resolution deadline.
    pub deadline: OffsetDateTime,
}

impl Market {
    /// Get the token ID for a given side.
    pub fn token_id(&self, side: Side) -> &str {
        match side {
            Side::Yes => &self.yes_token_id,
            Side::No => &self.no_token_id,
        }
    }

    /// Check whether the deadline has passed.
    pub fn is_closed(&self) -> bool {
        OffsetDateTime::now_utc() >= self.deadline
    }

    /// Seconds until resolution, negative if already past.
    pub fn seconds_to_resolution(&self) -> i64 {
        (self.deadline - OffsetDateTime::now_utc()).whole_seconds()
    }
}

/// Market row as returned by the Gamma API.
///
/// `outcomes` and `clobTokenIds` arrive as JSON-encoded strings.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarketRow {
    /// Condition id.
    #[serde(rename = "conditionId", alias = "id")]
    pub condition_id: Option<String>,
    /// Market slug.
    pub slug: Option<String>,
    /// Market question.
    pub question: Option<String>,
    /// Whether the market is closed.
    pub closed: Option<bool>,
    /// JSON-encoded outcome labels, e.g. `"[\"Yes\", \"No\"]"`.
    pub outcomes: Option<serde_json::Value>,
    /// JSON-encoded CLOB token ids.
    #[serde(rename = "clobTokenIds")]
    pub clob_token_ids: Option<serde_json::Value>,
    /// Resolution deadline (ISO-8601).
    #[serde(rename = "endDate", alias = "end_date_iso")]
    pub end_date: Option<String>,
}

impl GammaMarketRow {
    /// Decode a field that may be a JSON array or a JSON-encoded string of one.
    pub fn decode_list(value: &Option<serde_json::Value>) -> Vec<String> {
        match value {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => {
                serde_json::from_str::<Vec<String>>(s).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

/// Event row from the Gamma events endpoints, wrapping its markets.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
    /// Event title.
    pub title: Option<String>,
    /// Event slug.
    pub slug: Option<String>,
    /// Markets under this event.
    #[serde(default)]
    pub markets: Vec<GammaMarketRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn side_opposite_works() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn side_from_string_accepts_updown_aliases() {
        use std::str::FromStr;
        assert_eq!(Side::from_str("yes").unwrap(), Side::Yes);
        assert_eq!(Side::from_str("up").unwrap(), Side::Yes);
        assert_eq!(Side::from_str("no").unwrap(), Side::No);
        assert_eq!(Side::from_str("down").unwrap(), Side::No);
    }

    #[test]
    fn detect_coin_matches_names_and_tickers() {
        assert_eq!(detect_coin("Bitcoin Up or Down - June 5, 3AM ET"), Coin::Btc);
        assert_eq!(detect_coin("ethereum-up-or-down-15m"), Coin::Eth);
        assert_eq!(detect_coin("Solana price today"), Coin::Sol);
        assert_eq!(detect_coin("Will XRP close above $2?"), Coin::Xrp);
        assert_eq!(detect_coin("Will it rain in NYC tomorrow?"), Coin::Other);
    }

    #[test]
    fn market_token_id_works() {
        let market = Market {
            id: "cond-1".to_string(),
            slug: "btc-up-or-down-15m".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            timeframe: Timeframe::M15,
            coin: Coin::Btc,
            yes_token_id: "yes-token".to_string(),
            no_token_id: "no-token".to_string(),
            deadline: datetime!(2030-01-01 00:00 UTC),
        };

        assert_eq!(market.token_id(Side::Yes), "yes-token");
        assert_eq!(market.token_id(Side::No), "no-token");
        assert!(!market.is_closed());
    }

    #[test]
    fn decode_list_handles_string_encoded_arrays() {
        let encoded = Some(serde_json::Value::String("[\"Yes\", \"No\"]".to_string()));
        assert_eq!(GammaMarketRow::decode_list(&encoded), vec!["Yes", "No"]);

        let plain = Some(serde_json::json!(["tok-a", "tok-b"]));
        assert_eq!(GammaMarketRow::decode_list(&plain), vec!["tok-a", "tok-b"]);

        assert!(GammaMarketRow::decode_list(&None).is_empty());
    }
}
