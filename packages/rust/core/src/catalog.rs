//! Keyword catalog over fetched ranking data.
//!
//! Domains are always scanned in the same order: the subject domain first,
//! then competitors in the order the ranking API returned them.

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use seoforge_shared::{
    CompetitorRankings, KeywordSelection, OrderedMap, RankingSet, Result, SeoforgeError,
};

use crate::fetcher::{COMPETITOR_RANKINGS_FILE, USER_RANKINGS_FILE};
use crate::workspace::{Area, UserWorkspace};

pub const SELECTED_KEYWORDS_FILE: &str = "selected_keywords_details.json";

const NO_RANKING_DATA: &str = "no ranking data available for this user";

/// Ranking sets in scan order. A competitor equal to the subject domain is
/// skipped.
fn load_sources(ws: &UserWorkspace) -> Result<Vec<RankingSet>> {
    // The per-competitor file is written last, so it marks a complete fetch.
    let competitors: CompetitorRankings = ws
        .read_json(Area::Data, COMPETITOR_RANKINGS_FILE)?
        .ok_or_else(|| SeoforgeError::unmet(COMPETITOR_RANKINGS_FILE, NO_RANKING_DATA))?;
    let own: RankingSet = ws
        .read_json(Area::Data, USER_RANKINGS_FILE)?
        .ok_or_else(|| SeoforgeError::unmet(USER_RANKINGS_FILE, NO_RANKING_DATA))?;

    let mut sources = Vec::with_capacity(competitors.len() + 1);
    let own_domain = own.domain.clone();
    sources.push(own);

    for (domain, mut set) in competitors {
        if !own_domain.is_empty() && domain.eq_ignore_ascii_case(&own_domain) {
            continue;
        }
        set.domain = domain;
        sources.push(set);
    }
    Ok(sources)
}

/// Distinct keywords per domain, in first-seen order.
#[instrument(skip_all, fields(user_id = %ws.user_id()))]
pub fn list_keywords(ws: &UserWorkspace) -> Result<OrderedMap<Vec<String>>> {
    let mut listing = OrderedMap::new();

    for set in load_sources(ws)? {
        let mut seen = HashSet::new();
        let keywords: Vec<String> = set
            .results
            .iter()
            .filter(|r| seen.insert(r.keyword.as_str()))
            .map(|r| r.keyword.clone())
            .collect();
        listing.insert_if_absent(set.domain, keywords);
    }

    Ok(listing)
}

/// Persist full ranking detail for the selected keywords.
///
/// The first record found for a keyword wins. Keywords not present in the
/// ranking data are ignored.
#[instrument(skip_all, fields(user_id = %ws.user_id(), requested = keywords.len()))]
pub fn select_keywords(ws: &UserWorkspace, keywords: &[String]) -> Result<KeywordSelection> {
    let wanted: HashSet<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if wanted.is_empty() {
        return Err(SeoforgeError::validation("at least one keyword must be selected"));
    }

    let mut selection = KeywordSelection::new();
    for set in load_sources(ws)? {
        for record in set.results {
            if wanted.contains(record.keyword.as_str()) {
                selection.insert_if_absent(record.keyword.clone(), record);
            }
        }
    }

    let missing: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|k| !selection.contains_key(k))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "selected keywords not found in ranking data");
    }

    ws.write_json(Area::Data, SELECTED_KEYWORDS_FILE, &selection)?;
    info!(selected = selection.len(), "keyword selection saved");

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seoforge_shared::RankingRecord;
    use crate::fetcher::fetch_rankings;
    use crate::fetcher::tests::{mba_source, record};
    use crate::stage::tests::temp_workspace;

    #[tokio::test]
    async fn end_to_end_listing_and_selection() {
        let (root, ws) = temp_workspace();
        fetch_rankings(&mba_source(), &ws, "own.edu").await.unwrap();

        let listing = list_keywords(&ws).unwrap();
        assert_eq!(listing.keys().collect::<Vec<_>>(), ["own.edu", "rival.edu"]);
        assert_eq!(
            listing.get("own.edu").unwrap(),
            &["mba admissions".to_string(), "executive mba".to_string()]
        );
        assert_eq!(
            listing.get("rival.edu").unwrap(),
            &["mba admissions".to_string()]
        );

        let selection = select_keywords(&ws, &["mba admissions".into()]).unwrap();
        assert_eq!(selection.len(), 1);
        // Own domain ranks 3, rival ranks 1: the own-domain record wins.
        assert_eq!(selection.get("mba admissions").unwrap().rank, Some(3));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn selection_is_deterministic() {
        let (root, ws) = temp_workspace();
        fetch_rankings(&mba_source(), &ws, "own.edu").await.unwrap();

        let keywords = vec![
            "executive mba".to_string(),
            "mba admissions".to_string(),
            "not ranked".to_string(),
        ];
        select_keywords(&ws, &keywords).unwrap();
        let first = ws.read_to_string(Area::Data, SELECTED_KEYWORDS_FILE).unwrap();

        let reversed: Vec<String> = keywords.iter().rev().cloned().collect();
        select_keywords(&ws, &reversed).unwrap();
        let second = ws.read_to_string(Area::Data, SELECTED_KEYWORDS_FILE).unwrap();

        assert_eq!(first, second);
        let parsed: KeywordSelection = serde_json::from_str(first.as_deref().unwrap()).unwrap();
        assert_eq!(
            parsed.keys().collect::<Vec<_>>(),
            ["mba admissions", "executive mba"]
        );

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn duplicate_keywords_listed_once_per_domain() {
        let (root, ws) = temp_workspace();
        let own = RankingSet {
            domain: "own.edu".into(),
            result_count: Some(3),
            results: vec![record("a", 1), record("b", 2), record("a", 5)],
        };
        let mut competitors = CompetitorRankings::new();
        // The subject domain showing up as its own competitor is not listed twice.
        competitors.insert("own.edu", own.clone());
        competitors.insert(
            "zeta.edu",
            RankingSet {
                domain: String::new(),
                result_count: None,
                results: vec![record("c", 4)],
            },
        );
        ws.write_json(Area::Data, USER_RANKINGS_FILE, &own).unwrap();
        ws.write_json(Area::Data, COMPETITOR_RANKINGS_FILE, &competitors)
            .unwrap();

        let listing = list_keywords(&ws).unwrap();
        assert_eq!(listing.keys().collect::<Vec<_>>(), ["own.edu", "zeta.edu"]);
        assert_eq!(listing.get("own.edu").unwrap(), &["a".to_string(), "b".to_string()]);

        let selection = select_keywords(&ws, &["a".into()]).unwrap();
        assert_eq!(selection.get("a").unwrap().rank, Some(1));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn earlier_competitor_wins_shared_keyword() {
        let (root, ws) = temp_workspace();
        let own = RankingSet {
            domain: "own.edu".into(),
            result_count: Some(1),
            results: vec![record("mba admissions", 3)],
        };
        let set = |domain: &str, rank| RankingSet {
            domain: domain.into(),
            result_count: Some(1),
            results: vec![RankingRecord {
                top_ranked_url: Some(format!("https://{domain}/mba-fees")),
                ..record("mba fees", rank)
            }],
        };
        let mut competitors = CompetitorRankings::new();
        competitors.insert("c1.edu", set("c1.edu", 7));
        competitors.insert("c2.edu", set("c2.edu", 2));
        ws.write_json(Area::Data, USER_RANKINGS_FILE, &own).unwrap();
        ws.write_json(Area::Data, COMPETITOR_RANKINGS_FILE, &competitors)
            .unwrap();

        let selection = select_keywords(&ws, &["mba fees".into()]).unwrap();
        let chosen = selection.get("mba fees").unwrap();
        assert_eq!(chosen.rank, Some(7));
        assert_eq!(chosen.top_ranked_url.as_deref(), Some("https://c1.edu/mba-fees"));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn missing_data_is_unmet_dependency() {
        let (root, ws) = temp_workspace();

        let err = list_keywords(&ws).unwrap_err();
        assert!(matches!(err, SeoforgeError::UnmetDependency { .. }));
        assert!(err.to_string().contains("no ranking data available"));

        let err = select_keywords(&ws, &["x".into()]).unwrap_err();
        assert!(matches!(err, SeoforgeError::UnmetDependency { .. }));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn empty_selection_is_rejected() {
        let (root, ws) = temp_workspace();
        let err = select_keywords(&ws, &["  ".into()]).unwrap_err();
        assert!(matches!(err, SeoforgeError::Validation { .. }));
        let _ = std::fs::remove_dir_all(root.path());
    }
}
