pub mod cleaner;
pub mod http_client;
pub mod parsers;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::config::ScraperConfig;

use self::http_client::HttpClient;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable acquisition boundary: anything that can produce the quote-table
/// document. The pipeline is agnostic to whether it came from a live fetch
/// or a cached file.
#[async_trait]
pub trait QuoteTableSource: Send + Sync {
    async fn fetch_table_html(&self) -> Result<String>;
}

// ── ninwin scraper ────────────────────────────────────────────────────────────

pub struct NinwinScraper {
    client: HttpClient,
    page_url: Url,
}

impl NinwinScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let page_url = Url::parse(&config.page_url)
            .with_context(|| format!("Invalid page url `{}`", config.page_url))?;
        Ok(Self {
            client: HttpClient::new(config)?,
            page_url,
        })
    }
}

#[async_trait]
impl QuoteTableSource for NinwinScraper {
    async fn fetch_table_html(&self) -> Result<String> {
        info!("Fetching quote page {}", self.page_url);
        self.client
            .get_text(self.page_url.as_str())
            .await
            .context("Failed to fetch quote page")
    }
}
