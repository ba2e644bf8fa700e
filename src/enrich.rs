//! Bounded-concurrency record enrichment.
//!
//! Each extracted record links to its own track page, and the track
//! description lives only there. Fetches run through a fixed-size
//! semaphore pool; one record's failure never aborts the batch, its
//! description is simply left absent.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::engine::Record;

/// Field written by enrichment.
pub const DESCRIPTION_FIELD: &str = "description";
/// Field the track-page URL is read from.
pub const LINK_FIELD: &str = "link";

const DESCRIPTION_SELECTOR: &str = "div.item-message";

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("invalid base URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fetch each record's track page and fill in its description field.
///
/// At most `concurrency` fetches are in flight at once; completion order
/// is unconstrained since every result lands in its own record slot.
/// Returns the number of records enriched.
pub async fn enrich_records(
    records: &mut [Record],
    base_url: &str,
    concurrency: usize,
    timeout: Duration,
) -> Result<usize, EnrichError> {
    let base = Url::parse(base_url)?;
    let client = reqwest::Client::builder()
        .user_agent(crate::fetch::USER_AGENT)
        .timeout(timeout)
        .build()?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut tasks = JoinSet::new();
    for (index, record) in records.iter().enumerate() {
        let Some(link) = record.str_field(LINK_FIELD) else {
            debug!(id = %record.id, "record has no track page link");
            continue;
        };
        let url = match base.join(link) {
            Ok(url) => url,
            Err(err) => {
                warn!(id = %record.id, link, %err, "unusable track page link");
                continue;
            }
        };
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, None),
            };
            (index, fetch_description(&client, url).await)
        });
    }

    let mut enriched = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Some(description))) => {
                records[index]
                    .fields
                    .insert(DESCRIPTION_FIELD.to_string(), Value::String(description));
                enriched += 1;
            }
            Ok((index, None)) => debug!(id = %records[index].id, "no description extracted"),
            Err(err) => warn!(%err, "enrichment task failed to run"),
        }
    }
    Ok(enriched)
}

async fn fetch_description(client: &reqwest::Client, url: Url) -> Option<String> {
    let response = match client
        .get(url.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
    {
        Ok(response) => response,
        Err(err) => {
            warn!(%url, %err, "track page fetch failed");
            return None;
        }
    };
    match response.text().await {
        Ok(html) => extract_description(&html),
        Err(err) => {
            warn!(%url, %err, "track page body unreadable");
            None
        }
    }
}

/// First message block on the track page, whitespace-normalized. One field
/// off a page fetched once, so a tree parse is the simplest fit.
pub fn extract_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(DESCRIPTION_SELECTOR).ok()?;
    let element = document.select(&selector).next()?;
    let text = element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
