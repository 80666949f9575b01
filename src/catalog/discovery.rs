//! Market discovery against the Gamma API.
//!
//! Crypto mode walks the per-timeframe event listings and keeps the
//! earliest-expiring up/down market per (coin, timeframe). All-binary mode
//! takes the volume-ordered market listing and keeps every two-outcome market.

use std::collections::HashMap;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::types::{detect_coin, Coin, GammaEvent, GammaMarketRow, Market, Timeframe};
use crate::error::CatalogError;

/// Market cap for an all-binary listing request.
const ALL_BINARY_MARKET_LIMIT: usize = 300;

/// Gamma endpoint and query for one timeframe's event listing.
fn timeframe_query(timeframe: Timeframe) -> (&'static str, Vec<(&'static str, String)>) {
    match timeframe {
        Timeframe::M15 => ("events/pagination", paginated_query("15M")),
        Timeframe::H1 => ("events/pagination", paginated_query("1H")),
        Timeframe::H4 => (
            "events",
            vec![
                ("tag_id", "102531".to_string()),
                ("closed", "false".to_string()),
                ("limit", "100".to_string()),
            ],
        ),
        Timeframe::Daily => ("events/pagination", paginated_query("daily")),
        Timeframe::All => ("markets", Vec::new()),
    }
}

fn paginated_query(tag_slug: &str) -> Vec<(&'static str, String)> {
    vec![
        ("limit", "100".to_string()),
        ("active", "true".to_string()),
        ("archived", "false".to_string()),
        ("tag_slug", tag_slug.to_string()),
        ("closed", "false".to_string()),
        ("order", "volume24hr".to_string()),
        ("ascending", "false".to_string()),
        ("offset", "0".to_string()),
    ]
}

/// Map outcome labels to (yes_index, no_index).
///
/// Labels are tokenized and matched against yes/up and no/down word sets;
/// unrecognized labels fall back to positional order.
fn resolve_outcome_indices(outcomes: &[String]) -> (usize, usize) {
    let mut yes_idx = 0;
    let mut no_idx = 1;

    for (i, outcome) in outcomes.iter().enumerate() {
        let lower = outcome.to_lowercase().replace(['(', ')'], " ");
        let words: Vec<&str> = lower.split_whitespace().collect();
        if words.contains(&"yes") || words.contains(&"up") {
            yes_idx = i;
        } else if words.contains(&"no") || words.contains(&"down") {
            no_idx = i;
        }
    }

    if yes_idx == no_idx {
        (0, 1)
    } else {
        (yes_idx, no_idx)
    }
}

/// Build a [`Market`] from a Gamma row, or explain why it is untradeable.
fn market_from_row(
    row: &GammaMarketRow,
    timeframe: Timeframe,
    coin: Coin,
    event_slug: &str,
) -> Result<Market, CatalogError> {
    if row.closed == Some(true) {
        return Err(CatalogError::ParseError("market is closed".to_string()));
    }

    let outcomes = GammaMarketRow::decode_list(&row.outcomes);
    if outcomes.len() != 2 {
        return Err(CatalogError::ParseError(format!(
            "expected 2 outcomes, got {}",
            outcomes.len()
        )));
    }

    let tokens = GammaMarketRow::decode_list(&row.clob_token_ids);
    let id = row.condition_id.clone().unwrap_or_default();
    if tokens.len() < 2 {
        return Err(CatalogError::TokenPairMissing { id });
    }

    let (yes_idx, no_idx) = resolve_outcome_indices(&outcomes);

    let end_date = row
        .end_date
        .as_deref()
        .ok_or_else(|| CatalogError::ParseError(format!("market {} has no end date", id)))?;
    let deadline = OffsetDateTime::parse(end_date, &Rfc3339)
        .map_err(|e| CatalogError::ParseError(format!("bad end date {}: {}", end_date, e)))?;

    Ok(Market {
        id,
        slug: row.slug.clone().unwrap_or_else(|| event_slug.to_string()),
        question: row.question.clone().unwrap_or_default(),
        timeframe,
        coin,
        yes_token_id: tokens[yes_idx].clone(),
        no_token_id: tokens[no_idx].clone(),
        deadline,
    })
}

/// Fetch crypto up/down markets across the enabled timeframes.
///
/// Per timeframe, only the earliest-expiring live market per coin is kept.
#[instrument(skip(client, gamma_url))]
pub async fn fetch_crypto_markets(
    client: &reqwest::Client,
    gamma_url: &str,
    enabled: &[Timeframe],
) -> Result<Vec<Market>, CatalogError> {
    let mut found = Vec::new();

    for &timeframe in enabled {
        let (endpoint, params) = timeframe_query(timeframe);
        let url = format!("{}/{}", gamma_url, endpoint);

        let response = match client.get(&url).query(&params).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(%timeframe, status = %r.status(), "timeframe listing request failed");
                continue;
            }
            Err(e) => {
                warn!(%timeframe, error = %e, "timeframe listing request failed");
                continue;
            }
        };

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(format!("event listing: {}", e)))?;

        // Pagination endpoints wrap the list in a data field.
        let events_value = body
            .get("data")
            .or_else(|| body.get("events"))
            .unwrap_or(&body)
            .clone();
        let events: Vec<GammaEvent> = serde_json::from_value(events_value)
            .map_err(|e| CatalogError::ParseError(format!("event listing: {}", e)))?;

        let mut per_coin: HashMap<Coin, Vec<Market>> = HashMap::new();

        for event in &events {
            let title = event.title.as_deref().unwrap_or_default();
            let event_slug = event.slug.as_deref().unwrap_or_default();

            if !title.to_lowercase().contains("up or down")
                && !event_slug.to_lowercase().contains("updown")
            {
                continue;
            }

            let coin = detect_coin(&format!("{} {}", title, event_slug));
            if coin == Coin::Other {
                continue;
            }

            for row in &event.markets {
                match market_from_row(row, timeframe, coin, event_slug) {
                    Ok(market) => per_coin.entry(coin).or_default().push(market),
                    Err(e) => debug!(%timeframe, error = %e, "skipping market row"),
                }
            }
        }

        let mut live_count = 0;
        for (_, mut markets) in per_coin {
            markets.sort_by_key(|m| m.deadline);
            if let Some(earliest) = markets.into_iter().next() {
                found.push(earliest);
                live_count += 1;
            }
        }
        debug!(%timeframe, live_count, "timeframe scan complete");

        // Brief gap between timeframe queries.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    Ok(found)
}

/// Fetch every active two-outcome market, volume-ordered.
#[instrument(skip(client, gamma_url))]
pub async fn fetch_all_binary_markets(
    client: &reqwest::Client,
    gamma_url: &str,
) -> Result<Vec<Market>, CatalogError> {
    let url = format!("{}/markets", gamma_url);
    let params = [
        ("active", "true".to_string()),
        ("closed", "false".to_string()),
        ("limit", ALL_BINARY_MARKET_LIMIT.to_string()),
        ("order", "volume".to_string()),
        ("ascending", "false".to_string()),
    ];

    let response = client.get(&url).query(&params).send().await?;
    if !response.status().is_success() {
        return Err(CatalogError::FetchFailed {
            timeframe: Timeframe::All.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let rows: Vec<GammaMarketRow> = response
        .json()
        .await
        .map_err(|e| CatalogError::ParseError(format!("market listing: {}", e)))?;

    let mut found = Vec::new();
    for row in &rows {
        let text = format!(
            "{} {}",
            row.question.as_deref().unwrap_or_default(),
            row.slug.as_deref().unwrap_or_default()
        );
        let coin = detect_coin(&text);
        match market_from_row(row, Timeframe::All, coin, "") {
            Ok(market) => found.push(market),
            Err(e) => debug!(error = %e, "skipping market row"),
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_indices_follow_labels() {
        let outcomes = vec!["No".to_string(), "Yes".to_string()];
        assert_eq!(resolve_outcome_indices(&outcomes), (1, 0));

        let updown = vec!["Up".to_string(), "Down".to_string()];
        assert_eq!(resolve_outcome_indices(&updown), (0, 1));
    }

    #[test]
    fn outcome_indices_fall_back_to_positional() {
        let outcomes = vec!["Alice".to_string(), "Bob".to_string()];
        assert_eq!(resolve_outcome_indices(&outcomes), (0, 1));
    }

    #[test]
    fn market_from_row_resolves_swapped_tokens() {
        let row = GammaMarketRow {
            condition_id: Some("cond-9".to_string()),
            slug: Some("eth-updown-1h".to_string()),
            question: Some("Ethereum Up or Down?".to_string()),
            closed: Some(false),
            outcomes: Some(serde_json::Value::String("[\"Down\", \"Up\"]".to_string())),
            clob_token_ids: Some(serde_json::Value::String(
                "[\"tok-down\", \"tok-up\"]".to_string(),
            )),
            end_date: Some("2030-06-05T15:00:00Z".to_string()),
        };

        let market = market_from_row(&row, Timeframe::H1, Coin::Eth, "eth-updown").unwrap();
        assert_eq!(market.yes_token_id, "tok-up");
        assert_eq!(market.no_token_id, "tok-down");
        assert_eq!(market.timeframe, Timeframe::H1);
    }

    #[test]
    fn market_from_row_rejects_closed_and_non_binary() {
        let mut row = GammaMarketRow {
            condition_id: Some("cond-1".to_string()),
            slug: None,
            question: None,
            closed: Some(true),
            outcomes: Some(serde_json::json!(["Yes", "No"])),
            clob_token_ids: Some(serde_json::json!(["a", "b"])),
            end_date: Some("2030-01-01T00:00:00Z".to_string()),
        };
        assert!(market_from_row(&row, Timeframe::All, Coin::Other, "").is_err());

        row.closed = Some(false);
        row.outcomes = Some(serde_json::json!(["A", "B", "C"]));
        assert!(market_from_row(&row, Timeframe::All, Coin::Other, "").is_err());
    }
}
