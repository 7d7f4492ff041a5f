//! Core domain types for SeoForge.

use std::fmt;
use std::marker::PhantomData;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Result, SeoforgeError};

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Opaque per-request user identifier; also the name of the user's workspace
/// directory, so only a filesystem-safe alphabet is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Allocate a fresh identifier (UUID v7, time-sortable).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Validate a caller-supplied identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        static USER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").expect("valid regex")
        });

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SeoforgeError::validation("user ID is required"));
        }
        if !USER_ID_RE.is_match(trimmed) {
            return Err(SeoforgeError::validation(format!(
                "invalid user ID `{trimmed}`"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = SeoforgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = SeoforgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Brief
// ---------------------------------------------------------------------------

/// What the content is about: the institution and its web domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub institution_name: String,
    pub domain: String,
}

// ---------------------------------------------------------------------------
// Ranking data
// ---------------------------------------------------------------------------

/// One keyword's SEO metrics for a domain.
///
/// Deserializing an upstream record keeps only these six fields; everything
/// else in the payload is dropped. All six keys are always serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRecord {
    pub keyword: String,
    #[serde(default)]
    pub top_ranked_url: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub search_volume: Option<i64>,
    #[serde(default)]
    pub keyword_difficulty: Option<f64>,
    #[serde(default)]
    pub seo_clicks: Option<f64>,
}

/// The persisted rankings envelope for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSet {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub result_count: Option<u64>,
    #[serde(default)]
    pub results: Vec<RankingRecord>,
}

/// Per-competitor rankings keyed by domain, in the order competitors were returned.
pub type CompetitorRankings = OrderedMap<RankingSet>;

/// Selected keywords with the first-seen record for each.
pub type KeywordSelection = OrderedMap<RankingRecord>;

// ---------------------------------------------------------------------------
// OrderedMap
// ---------------------------------------------------------------------------

/// A string-keyed map that keeps insertion order and serializes as a JSON
/// object with keys in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert only if the key is not present. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with string keys")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

// ---------------------------------------------------------------------------
// Pipeline runs
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The three fixed pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    Analysis,
    SeoContent,
    Blog,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::SeoContent => "seo-content",
            Self::Blog => "blog",
        }
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = SeoforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "analysis" => Ok(Self::Analysis),
            "seo-content" => Ok(Self::SeoContent),
            "blog" => Ok(Self::Blog),
            other => Err(SeoforgeError::validation(format!(
                "unknown pipeline `{other}`"
            ))),
        }
    }
}

/// Lifecycle of one pipeline run. There is no retry or paused state: a failed
/// run is restarted from the beginning by a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { stage: String },
    Completed,
    Failed { stage: String, error: String },
}

impl RunState {
    /// Short label stored in the ledger's `state` column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Running { stage } | Self::Failed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Rebuild a state from its stored columns.
    pub fn from_parts(label: &str, stage: Option<String>, error: Option<String>) -> Result<Self> {
        match label {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running {
                stage: stage.unwrap_or_default(),
            }),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed {
                stage: stage.unwrap_or_default(),
                error: error.unwrap_or_default(),
            }),
            other => Err(SeoforgeError::validation(format!(
                "unknown run state `{other}`"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// One pipeline run for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RunId,
    pub user_id: UserId,
    pub pipeline: PipelineKind,
    #[serde(flatten)]
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A new run in the `Pending` state.
    pub fn new(user_id: UserId, pipeline: PipelineKind) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            user_id,
            pipeline,
            state: RunState::Pending,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move to `state`, bumping `updated_at`.
    pub fn transition(&mut self, state: RunState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
