//! SpyFu ranking-data client.
//!
//! Two endpoints are used: "newly ranked keywords" for a domain and "top
//! competitors" of a domain. Responses are projected down to the fields the
//! pipeline consumes before they leave this crate.

mod payload;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use seoforge_shared::{RankingSet, Result, SeoforgeError, SpyfuConfig, read_secret};
use tracing::{debug, info, instrument};

pub use payload::{CompetitorList, clean_domain};

/// User-Agent string for ranking API requests.
const USER_AGENT: &str = concat!("SeoForge/", env!("CARGO_PKG_VERSION"));

const NEWLY_RANKED_PATH: &str = "/apis/serp_api/v2/seo/getNewlyRankedKeywords";
const TOP_COMPETITORS_PATH: &str = "/apis/competitors_api/v2/seo/getTopCompetitors";

// ---------------------------------------------------------------------------
// RankingSource
// ---------------------------------------------------------------------------

/// Anything that can supply ranking data for a domain.
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Newly ranked keywords for `domain`, projected to [`seoforge_shared::RankingRecord`].
    async fn newly_ranked_keywords(&self, domain: &str) -> Result<RankingSet>;

    /// Top organic competitors of `domain`, in the order the API returns them.
    async fn top_competitors(&self, domain: &str) -> Result<CompetitorList>;
}

// ---------------------------------------------------------------------------
// SpyfuClient
// ---------------------------------------------------------------------------

/// Connection settings for [`SpyfuClient`].
#[derive(Debug, Clone)]
pub struct SpyfuOptions {
    pub base_url: String,
    pub api_id: String,
    pub secret_key: String,
    pub country_code: String,
    pub ranking_page_size: u32,
    pub competitor_page_size: u32,
    pub timeout_secs: u64,
}

impl SpyfuOptions {
    /// Build options from the `[spyfu]` config section, reading credentials
    /// from the environment variables it names.
    pub fn from_config(config: &SpyfuConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            api_id: read_secret(&config.api_id_env)?,
            secret_key: read_secret(&config.secret_key_env)?,
            country_code: config.country_code.clone(),
            ranking_page_size: config.ranking_page_size,
            competitor_page_size: config.competitor_page_size,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// HTTP client for the SpyFu API (basic auth).
pub struct SpyfuClient {
    client: Client,
    opts: SpyfuOptions,
}

impl SpyfuClient {
    pub fn new(opts: SpyfuOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| {
                SeoforgeError::UpstreamFetch(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, opts })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.opts.base_url.trim_end_matches('/'))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.opts.api_id, Some(&self.opts.secret_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| SeoforgeError::UpstreamFetch(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SeoforgeError::UpstreamFetch(format!(
                "{path}: HTTP {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SeoforgeError::UpstreamFetch(format!("{path}: invalid JSON: {e}")))
    }
}

#[async_trait]
impl RankingSource for SpyfuClient {
    #[instrument(skip(self))]
    async fn newly_ranked_keywords(&self, domain: &str) -> Result<RankingSet> {
        let domain = clean_domain(domain);
        let query = [
            ("query", domain.clone()),
            ("sortBy", "RankChange".to_string()),
            ("sortOrder", "Descending".to_string()),
            ("startingRow", "1".to_string()),
            ("pageSize", self.opts.ranking_page_size.to_string()),
            ("countryCode", self.opts.country_code.clone()),
        ];

        let raw = self.get_json(NEWLY_RANKED_PATH, &query).await?;
        let set = payload::project_rankings(&domain, raw)?;
        debug!(results = set.results.len(), "newly ranked keywords fetched");
        Ok(set)
    }

    #[instrument(skip(self))]
    async fn top_competitors(&self, domain: &str) -> Result<CompetitorList> {
        let domain = clean_domain(domain);
        let query = [
            ("domain", domain),
            ("startingRow", "2".to_string()),
            ("pageSize", self.opts.competitor_page_size.to_string()),
            ("countryCode", self.opts.country_code.clone()),
        ];

        let raw = self.get_json(TOP_COMPETITORS_PATH, &query).await?;
        let list = payload::project_competitors(raw)?;
        info!(competitors = list.domains.len(), "top competitors fetched");
        Ok(list)
    }
}
