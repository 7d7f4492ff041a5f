//! Raw SpyFu response shapes and their projection into domain types.

use serde::Deserialize;
use serde_json::Value;
use seoforge_shared::{RankingRecord, RankingSet, Result, SeoforgeError};
use tracing::warn;

/// The top-competitors response: the raw payload (persisted verbatim) plus
/// the competitor domains extracted from it, in response order.
#[derive(Debug, Clone)]
pub struct CompetitorList {
    pub raw: Value,
    pub domains: Vec<String>,
}

/// Strip the scheme and surrounding slashes/whitespace from a domain URL and
/// lowercase it. Own and competitor domains compare equal only after this.
pub fn clean_domain(input: &str) -> String {
    let mut s = input.trim();
    for scheme in ["https://", "http://"] {
        if s
            .get(..scheme.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(scheme))
        {
            s = &s[scheme.len()..];
            break;
        }
    }
    s.trim_matches(|c: char| c == '/' || c.is_whitespace())
        .to_lowercase()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRankings {
    #[serde(default)]
    result_count: Option<u64>,
    #[serde(default)]
    results: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    top_ranked_url: Option<String>,
    #[serde(default)]
    rank: Option<Value>,
    #[serde(default)]
    search_volume: Option<Value>,
    #[serde(default)]
    keyword_difficulty: Option<Value>,
    #[serde(default)]
    seo_clicks: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawCompetitors {
    #[serde(default)]
    results: Vec<RawCompetitor>,
}

#[derive(Debug, Deserialize)]
struct RawCompetitor {
    #[serde(default)]
    domain: Option<String>,
}

fn as_int(v: Option<Value>) -> Option<i64> {
    let v = v?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
}

fn as_float(v: Option<Value>) -> Option<f64> {
    v?.as_f64()
}

impl RawRecord {
    fn project(self) -> Option<RankingRecord> {
        let keyword = self.keyword.filter(|k| !k.trim().is_empty())?;
        Some(RankingRecord {
            keyword,
            top_ranked_url: self.top_ranked_url,
            rank: as_int(self.rank),
            search_volume: as_int(self.search_volume),
            keyword_difficulty: as_float(self.keyword_difficulty),
            seo_clicks: as_float(self.seo_clicks),
        })
    }
}

/// Project a newly-ranked-keywords payload to the six-field record subset.
/// Records without a keyword are dropped.
pub(crate) fn project_rankings(domain: &str, raw: Value) -> Result<RankingSet> {
    if !raw.is_object() {
        return Err(SeoforgeError::UpstreamFetch(format!(
            "rankings for {domain}: expected a JSON object"
        )));
    }
    let parsed: RawRankings = serde_json::from_value(raw).map_err(|e| {
        SeoforgeError::UpstreamFetch(format!("rankings for {domain}: malformed payload: {e}"))
    })?;

    let total = parsed.results.len();
    let results: Vec<RankingRecord> = parsed
        .results
        .into_iter()
        .filter_map(RawRecord::project)
        .collect();
    if results.len() < total {
        warn!(
            domain,
            dropped = total - results.len(),
            "dropped ranking records without a keyword"
        );
    }

    Ok(RankingSet {
        domain: domain.to_string(),
        result_count: parsed.result_count,
        results,
    })
}

/// Extract competitor domains, keeping the raw payload for persistence.
pub(crate) fn project_competitors(raw: Value) -> Result<CompetitorList> {
    if !raw.is_object() {
        return Err(SeoforgeError::UpstreamFetch(
            "competitors: expected a JSON object".into(),
        ));
    }
    let parsed: RawCompetitors = serde_json::from_value(raw.clone()).map_err(|e| {
        SeoforgeError::UpstreamFetch(format!("competitors: malformed payload: {e}"))
    })?;

    let domains = parsed
        .results
        .into_iter()
        .filter_map(|c| c.domain)
        .map(|d| clean_domain(&d))
        .filter(|d| !d.is_empty())
        .collect();

    Ok(CompetitorList { raw, domains })
}
