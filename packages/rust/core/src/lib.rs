//! Core pipeline orchestration and domain logic for SEO Forge.
//!
//! This crate ties ranking fetch, keyword selection, generation stages and
//! document conversion into the Analysis, SeoContent and Blog pipelines, all
//! scoped to a per-user workspace.

pub mod anthropic;
pub mod catalog;
pub mod fetcher;
pub mod generation;
pub mod observer;
pub mod pipeline;
pub mod prompts;
pub mod stage;
pub mod workspace;
