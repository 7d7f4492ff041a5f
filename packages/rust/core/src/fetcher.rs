//! Ranking data fetch for the analysis pipeline.
//!
//! Calls the ranking source for the subject domain, its top competitors, and
//! each competitor in turn. Nothing is persisted until every call succeeded,
//! so a failed fetch never leaves a file set that looks complete.

use tracing::{info, instrument, warn};

use seoforge_shared::{CompetitorRankings, RankingSet, Result, SeoforgeError};
use seoforge_spyfu::{RankingSource, clean_domain};

use crate::catalog::SELECTED_KEYWORDS_FILE;
use crate::workspace::{Area, UserWorkspace};

pub const USER_RANKINGS_FILE: &str = "user_rankings.json";
pub const COMPETITORS_FILE: &str = "competitors.json";
pub const COMPETITOR_RANKINGS_FILE: &str = "competitor_rankings.json";

/// Everything one fetch produced.
#[derive(Debug, Clone)]
pub struct FetchedRankings {
    pub own: RankingSet,
    pub competitors: Vec<String>,
    pub per_competitor: CompetitorRankings,
}

/// Fetch and persist ranking data for `domain` into the user's `data/` area.
///
/// Stale ranking files (and any keyword selection derived from them) are
/// removed first. `competitor_rankings.json` is written last.
#[instrument(skip_all, fields(user_id = %ws.user_id(), domain = %domain))]
pub async fn fetch_rankings(
    source: &dyn RankingSource,
    ws: &UserWorkspace,
    domain: &str,
) -> Result<FetchedRankings> {
    let domain = clean_domain(domain);
    if domain.is_empty() {
        return Err(SeoforgeError::validation("domain URL is required"));
    }

    for file in [
        COMPETITOR_RANKINGS_FILE,
        USER_RANKINGS_FILE,
        COMPETITORS_FILE,
        SELECTED_KEYWORDS_FILE,
    ] {
        ws.remove(Area::Data, file)?;
    }

    info!("fetching own rankings");
    let own = source.newly_ranked_keywords(&domain).await?;

    let competitors = source.top_competitors(&domain).await?;
    info!(count = competitors.domains.len(), "fetching competitor rankings");

    let mut per_competitor = CompetitorRankings::new();
    for competitor in competitors.domains.iter().map(|d| clean_domain(d)) {
        if competitor.is_empty() || per_competitor.contains_key(&competitor) {
            warn!(%competitor, "duplicate competitor in response, skipping");
            continue;
        }
        let set = source.newly_ranked_keywords(&competitor).await?;
        per_competitor.insert(competitor, set);
    }

    ws.write_json(Area::Data, USER_RANKINGS_FILE, &own)?;
    ws.write_json(Area::Data, COMPETITORS_FILE, &competitors.raw)?;
    ws.write_json(Area::Data, COMPETITOR_RANKINGS_FILE, &per_competitor)?;

    info!(
        own_keywords = own.results.len(),
        competitors = per_competitor.len(),
        "ranking data persisted"
    );

    Ok(FetchedRankings {
        own,
        competitors: per_competitor.keys().map(str::to_string).collect(),
        per_competitor,
    })
}
