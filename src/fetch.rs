//! Sequential retrieval of paginated listing pages.
//!
//! One blocking request per page, a fresh extraction pass per page, and a
//! natural stop condition: a page that contributes no new records ends the
//! run. Timeouts and status handling live here; the engine never sees the
//! network.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::engine::{ExtractError, Extractor, Record};

pub const USER_AGENT: &str = concat!("trackwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid listing URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("listing request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Blocking client for the listing site.
pub struct ListingClient {
    agent: ureq::Agent,
    base: Url,
}

impl ListingClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FetchError> {
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(timeout_secs)))
                .user_agent(USER_AGENT)
                .build(),
        );
        Ok(Self {
            agent,
            base: Url::parse(base_url)?,
        })
    }

    /// Listing page URL for a user; page 1 is the bare profile page.
    fn page_url(&self, user: &str, page: u32) -> Result<Url, url::ParseError> {
        let mut url = self.base.join(user)?;
        if page > 1 {
            url.query_pairs_mut().append_pair("page", &page.to_string());
        }
        Ok(url)
    }

    pub fn fetch_page(&self, user: &str, page: u32) -> Result<String, FetchError> {
        let url = self.page_url(user, page)?;
        debug!(%url, "fetching listing page");
        let response = self.agent.get(url.as_str()).call()?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.into_body().read_to_string()?)
    }
}

/// Fetch listing pages in sequence until one contributes no new records
/// (or `max_pages` is hit), in document order across pages.
pub fn collect_tracks(
    client: &ListingClient,
    extractor: &Extractor,
    user: &str,
    max_pages: u32,
) -> Result<Vec<Record>, FetchError> {
    let mut collected = Vec::new();
    let mut seen = HashSet::new();
    for page in 1..=max_pages.max(1) {
        let html = client.fetch_page(user, page)?;
        let records = extractor.extract(&html)?;
        let mut new = 0usize;
        for record in records {
            if seen.insert(record.id.clone()) {
                collected.push(record);
                new += 1;
            }
        }
        if new == 0 {
            debug!(page, "no new records, stopping pagination");
            break;
        }
        info!(page, new, total = collected.len(), "collected listing page");
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_shape() {
        let client = ListingClient::new("https://weeklybeats.com", 5).unwrap();
        assert_eq!(
            client.page_url("wangus", 1).unwrap().as_str(),
            "https://weeklybeats.com/wangus"
        );
        assert_eq!(
            client.page_url("wangus", 3).unwrap().as_str(),
            "https://weeklybeats.com/wangus?page=3"
        );
    }
}
