//! The content-generation capability.
//!
//! Stages never talk to a model directly: they hand a [`GenerationRequest`]
//! to a [`Generator`]. Production uses [`crate::anthropic::AnthropicGenerator`];
//! tests plug in scripted generators.

use async_trait::async_trait;

use seoforge_shared::{Brief, Result};

use crate::stage::{ResolvedInput, Stage};

/// The persona and instructions a stage generates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationProfile {
    /// Compares own and competitor keyword rankings.
    RankingAnalyst,
    /// Writes search ad copy for selected keywords.
    AdCopywriter,
    /// Turns ad angles and keywords into blog outlines.
    OutlineStrategist,
    /// Gathers current facts for a blog outline using web search.
    Researcher,
    /// Writes the full blog post.
    BlogWriter,
}

impl GenerationProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RankingAnalyst => "ranking_analyst",
            Self::AdCopywriter => "ad_copywriter",
            Self::OutlineStrategist => "outline_strategist",
            Self::Researcher => "researcher",
            Self::BlogWriter => "blog_writer",
        }
    }

    /// Whether calls with this profile may use server-side web search.
    pub fn uses_web_search(&self) -> bool {
        matches!(self, Self::Researcher)
    }
}

/// Everything a generator needs for one stage call.
#[derive(Debug)]
pub struct GenerationRequest<'a> {
    pub stage: Stage,
    pub profile: GenerationProfile,
    pub brief: Option<&'a Brief>,
    pub inputs: &'a [ResolvedInput],
}

/// Generates Markdown content for a stage.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the stage's Markdown. Called exactly once per stage run.
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}
