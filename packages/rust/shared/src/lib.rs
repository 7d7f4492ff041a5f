//! Shared types, error model, and configuration for SeoForge.
//!
//! This crate is the foundation depended on by all other SeoForge crates.
//! It provides:
//! - [`SeoforgeError`], the unified error type
//! - Domain types ([`UserId`], [`RankingRecord`], [`RankingSet`], [`OrderedMap`], [`RunRecord`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnthropicConfig, AppConfig, BlogConfig, ConverterConfig, ServerConfig, SpyfuConfig,
    WorkspaceConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    read_secret,
};
pub use error::{Result, SeoforgeError};
pub use types::{
    Brief, CompetitorRankings, KeywordSelection, OrderedMap, PipelineKind, RankingRecord,
    RankingSet, RunId, RunRecord, RunState, UserId,
};
