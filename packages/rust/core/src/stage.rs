//! Stage definitions and the stage runner.
//!
//! A stage is one generation call with declared inputs and a fixed output
//! file. The table in [`Stage::spec`] is the only place stage wiring lives.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use seoforge_shared::{Brief, Result, SeoforgeError};

use crate::catalog::SELECTED_KEYWORDS_FILE;
use crate::fetcher::{COMPETITOR_RANKINGS_FILE, USER_RANKINGS_FILE};
use crate::generation::{GenerationProfile, GenerationRequest, Generator};
use crate::workspace::{Area, UserWorkspace};

const NO_RANKING_DATA: &str = "no ranking data available for this user";

// ---------------------------------------------------------------------------
// Stage table
// ---------------------------------------------------------------------------

/// Every stage any pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    AnalyzeRankings,
    AdCopy,
    BlogOutline,
    ResearchBlog,
    /// Blog post straight from the outline.
    WriteBlog,
    /// Blog post from the outline plus research notes. Reports as `write-blog`.
    SynthesizeBlog,
}

/// What a stage reads before generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// `data/user_rankings.json`
    OwnRankings,
    /// `data/competitor_rankings.json`
    CompetitorRankings,
    /// `data/selected_keywords_details.json`
    KeywordSelection,
    /// The output file of an earlier stage.
    Artifact(Stage),
    /// Caller-supplied outline text.
    Outline,
}

impl StageInput {
    /// Heading used when the input is placed into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OwnRankings => "Own domain rankings (JSON)",
            Self::CompetitorRankings => "Competitor rankings (JSON)",
            Self::KeywordSelection => "Selected keywords (JSON)",
            Self::Artifact(stage) => stage.spec().input_label,
            Self::Outline => "Blog outline",
        }
    }
}

/// Static wiring of one stage.
#[derive(Debug)]
pub struct StageSpec {
    pub name: &'static str,
    pub inputs: &'static [StageInput],
    pub profile: GenerationProfile,
    pub output_area: Area,
    pub output_file: &'static str,
    /// Converted document file name in `doc/`, if the artifact is downloadable.
    pub document: Option<&'static str>,
    /// Key used for this artifact in API responses.
    pub response_key: &'static str,
    /// Heading when this artifact feeds a later stage.
    input_label: &'static str,
}

const ANALYZE_RANKINGS: StageSpec = StageSpec {
    name: "analyze-rankings",
    inputs: &[StageInput::OwnRankings, StageInput::CompetitorRankings],
    profile: GenerationProfile::RankingAnalyst,
    output_area: Area::Crew,
    output_file: "analysis.md",
    document: Some("analysis.docx"),
    response_key: "analysis",
    input_label: "Ranking analysis",
};

const AD_COPY: StageSpec = StageSpec {
    name: "ad-copy",
    inputs: &[StageInput::KeywordSelection],
    profile: GenerationProfile::AdCopywriter,
    output_area: Area::Crew,
    output_file: "ad_copies.md",
    document: Some("ad_copies.docx"),
    response_key: "ad",
    input_label: "Ad copies",
};

const BLOG_OUTLINE: StageSpec = StageSpec {
    name: "blog-outline",
    inputs: &[
        StageInput::KeywordSelection,
        StageInput::Artifact(Stage::AdCopy),
    ],
    profile: GenerationProfile::OutlineStrategist,
    output_area: Area::Crew,
    output_file: "blog_post_outlines.md",
    document: Some("blog_post_outlines.docx"),
    response_key: "outlines",
    input_label: "Blog post outlines",
};

const RESEARCH_BLOG: StageSpec = StageSpec {
    name: "research-blog",
    inputs: &[StageInput::Outline],
    profile: GenerationProfile::Researcher,
    output_area: Area::Blogs,
    output_file: "search_logs.md",
    document: None,
    response_key: "research",
    input_label: "Research notes",
};

const WRITE_BLOG: StageSpec = StageSpec {
    name: "write-blog",
    inputs: &[StageInput::Outline],
    profile: GenerationProfile::BlogWriter,
    output_area: Area::Blogs,
    output_file: "blog_post.md",
    document: Some("blog_post.docx"),
    response_key: "blog",
    input_label: "Blog post",
};

const SYNTHESIZE_BLOG: StageSpec = StageSpec {
    name: "write-blog",
    inputs: &[
        StageInput::Outline,
        StageInput::Artifact(Stage::ResearchBlog),
    ],
    profile: GenerationProfile::BlogWriter,
    output_area: Area::Blogs,
    output_file: "blog_post.md",
    document: Some("blog_post.docx"),
    response_key: "blog",
    input_label: "Blog post",
};

impl Stage {
    pub fn spec(&self) -> &'static StageSpec {
        match self {
            Self::AnalyzeRankings => &ANALYZE_RANKINGS,
            Self::AdCopy => &AD_COPY,
            Self::BlogOutline => &BLOG_OUTLINE,
            Self::ResearchBlog => &RESEARCH_BLOG,
            Self::WriteBlog => &WRITE_BLOG,
            Self::SynthesizeBlog => &SYNTHESIZE_BLOG,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// A stage input after it has been read.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub input: StageInput,
    pub content: String,
}

/// The persisted output of one stage run.
#[derive(Debug, Clone)]
pub struct StageArtifact {
    pub stage: Stage,
    pub path: PathBuf,
    pub markdown: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Per-run values a stage may need besides workspace files.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub workspace: &'a UserWorkspace,
    pub brief: Option<&'a Brief>,
    pub outline: Option<&'a str>,
}

/// Executes single stages against a generator.
pub struct StageRunner<'a> {
    generator: &'a dyn Generator,
}

impl<'a> StageRunner<'a> {
    pub fn new(generator: &'a dyn Generator) -> Self {
        Self { generator }
    }

    /// Resolve inputs, generate once, clean, and write the artifact.
    ///
    /// Missing inputs fail with `UnmetDependency` before the generator is
    /// called. The previous artifact, if any, is overwritten.
    #[instrument(skip_all, fields(stage = stage.name(), user_id = %ctx.workspace.user_id()))]
    pub async fn run(&self, stage: Stage, ctx: &StageContext<'_>) -> Result<StageArtifact> {
        let spec = stage.spec();

        let inputs = spec
            .inputs
            .iter()
            .map(|input| resolve_input(*input, ctx))
            .collect::<Result<Vec<_>>>()?;

        debug!(inputs = inputs.len(), "inputs resolved");

        let request = GenerationRequest {
            stage,
            profile: spec.profile,
            brief: ctx.brief,
            inputs: &inputs,
        };

        let raw = self.generator.generate(&request).await.map_err(|e| match e {
            SeoforgeError::Generation { .. } => e,
            other => SeoforgeError::generation(spec.name, other.to_string()),
        })?;

        let markdown = seoforge_markdown::clean(&raw);
        let path = ctx
            .workspace
            .write_atomic(spec.output_area, spec.output_file, markdown.as_bytes())?;

        let mut hasher = Sha256::new();
        hasher.update(markdown.as_bytes());
        let sha256 = format!("{:x}", hasher.finalize());

        info!(
            path = %ctx.workspace.relative(&path),
            size = markdown.len(),
            "stage artifact written"
        );

        Ok(StageArtifact {
            stage,
            size_bytes: markdown.len(),
            path,
            markdown,
            sha256,
        })
    }
}

fn resolve_input(input: StageInput, ctx: &StageContext<'_>) -> Result<ResolvedInput> {
    let ws = ctx.workspace;
    let content = match input {
        StageInput::OwnRankings => ws
            .read_to_string(Area::Data, USER_RANKINGS_FILE)?
            .ok_or_else(|| SeoforgeError::unmet(USER_RANKINGS_FILE, NO_RANKING_DATA))?,
        StageInput::CompetitorRankings => ws
            .read_to_string(Area::Data, COMPETITOR_RANKINGS_FILE)?
            .ok_or_else(|| SeoforgeError::unmet(COMPETITOR_RANKINGS_FILE, NO_RANKING_DATA))?,
        StageInput::KeywordSelection => ws
            .read_to_string(Area::Data, SELECTED_KEYWORDS_FILE)?
            .ok_or_else(|| {
                SeoforgeError::unmet(
                    SELECTED_KEYWORDS_FILE,
                    "no keyword selection has been saved for this user",
                )
            })?,
        StageInput::Artifact(prior) => {
            let spec = prior.spec();
            ws.read_to_string(spec.output_area, spec.output_file)?
                .ok_or_else(|| {
                    SeoforgeError::unmet(
                        spec.name,
                        format!(
                            "stage `{}` has not produced {}/{}",
                            spec.name,
                            spec.output_area.dir_name(),
                            spec.output_file
                        ),
                    )
                })?
        }
        StageInput::Outline => ctx
            .outline
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SeoforgeError::unmet("outline", "no blog outline was supplied"))?,
    };

    Ok(ResolvedInput { input, content })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::workspace::WorkspaceRoot;
    use seoforge_shared::UserId;

    /// Generator returning canned text and recording which stages it saw.
    pub(crate) struct ScriptedGenerator {
        pub calls: Mutex<Vec<Stage>>,
        pub fail_on: Option<Stage>,
        pub reply: String,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(reply: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                reply: reply.to_string(),
            }
        }

        pub(crate) fn failing_on(stage: Stage) -> Self {
            Self {
                fail_on: Some(stage),
                ..Self::new("```markdown\n# Output\n```\n")
            }
        }

        pub(crate) fn stages(&self) -> Vec<Stage> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
            self.calls.lock().unwrap().push(request.stage);
            if self.fail_on == Some(request.stage) {
                return Err(SeoforgeError::UpstreamFetch("model unavailable".into()));
            }
            Ok(format!("{}<!-- {} -->\n", self.reply, request.stage))
        }
    }

    pub(crate) fn temp_workspace() -> (WorkspaceRoot, UserWorkspace) {
        let root = WorkspaceRoot::new(
            std::env::temp_dir().join(format!("seoforge-stage-test-{}", Uuid::now_v7())),
        );
        let ws = root.ensure(&UserId::generate()).unwrap();
        (root, ws)
    }

    #[test]
    fn stage_table_is_consistent() {
        for stage in [
            Stage::AnalyzeRankings,
            Stage::AdCopy,
            Stage::BlogOutline,
            Stage::ResearchBlog,
            Stage::WriteBlog,
            Stage::SynthesizeBlog,
        ] {
            let spec = stage.spec();
            assert!(!spec.inputs.is_empty());
            assert!(spec.output_file.ends_with(".md"));
            if let Some(doc) = spec.document {
                assert!(doc.ends_with(".docx"));
            }
        }
        assert_eq!(Stage::SynthesizeBlog.name(), "write-blog");
        assert_eq!(Stage::BlogOutline.to_string(), "blog-outline");
    }

    #[tokio::test]
    async fn missing_dependency_never_calls_generator() {
        let (root, ws) = temp_workspace();
        let generator = ScriptedGenerator::new("x");
        let runner = StageRunner::new(&generator);
        let ctx = StageContext {
            workspace: &ws,
            brief: None,
            outline: None,
        };

        let err = runner.run(Stage::AdCopy, &ctx).await.unwrap_err();
        assert!(matches!(err, SeoforgeError::UnmetDependency { .. }));

        ws.write_atomic(Area::Data, SELECTED_KEYWORDS_FILE, b"{}").unwrap();
        let err = runner.run(Stage::BlogOutline, &ctx).await.unwrap_err();
        match err {
            SeoforgeError::UnmetDependency { dependency, .. } => assert_eq!(dependency, "ad-copy"),
            other => panic!("unexpected error: {other}"),
        }

        let err = runner.run(Stage::AnalyzeRankings, &ctx).await.unwrap_err();
        assert!(err.to_string().contains("no ranking data available"));

        let err = runner.run(Stage::WriteBlog, &ctx).await.unwrap_err();
        assert!(matches!(err, SeoforgeError::UnmetDependency { .. }));

        assert!(generator.stages().is_empty());
        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn writes_cleaned_artifact_and_overwrites() {
        let (root, ws) = temp_workspace();
        ws.write_atomic(Area::Data, SELECTED_KEYWORDS_FILE, b"{\"mba\":{}}")
            .unwrap();

        let generator = ScriptedGenerator::new("```markdown\n## Ad 1\n```\n");
        let runner = StageRunner::new(&generator);
        let ctx = StageContext {
            workspace: &ws,
            brief: None,
            outline: None,
        };

        ws.write_atomic(Area::Crew, "ad_copies.md", b"stale").unwrap();
        let artifact = runner.run(Stage::AdCopy, &ctx).await.unwrap();

        assert_eq!(artifact.markdown, "## Ad 1\n<!-- ad-copy -->\n");
        assert_eq!(artifact.size_bytes, artifact.markdown.len());
        assert_eq!(artifact.sha256.len(), 64);
        let on_disk = ws.read_to_string(Area::Crew, "ad_copies.md").unwrap();
        assert_eq!(on_disk.as_deref(), Some(artifact.markdown.as_str()));
        assert_eq!(generator.stages(), [Stage::AdCopy]);

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn generator_failure_is_attributed_to_stage() {
        let (root, ws) = temp_workspace();
        let generator = ScriptedGenerator::failing_on(Stage::WriteBlog);
        let runner = StageRunner::new(&generator);
        let ctx = StageContext {
            workspace: &ws,
            brief: None,
            outline: Some("  # Outline\n- intro  "),
        };

        let err = runner.run(Stage::WriteBlog, &ctx).await.unwrap_err();
        match err {
            SeoforgeError::Generation { stage, message } => {
                assert_eq!(stage, "write-blog");
                assert!(message.contains("model unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ws.read_to_string(Area::Blogs, "blog_post.md").unwrap().is_none());

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn outline_is_trimmed_into_inputs() {
        struct Capture(AtomicUsize, Mutex<String>);

        #[async_trait]
        impl Generator for Capture {
            async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                *self.1.lock().unwrap() = request.inputs[0].content.clone();
                Ok("# Post\n".into())
            }
        }

        let (root, ws) = temp_workspace();
        let generator = Capture(AtomicUsize::new(0), Mutex::new(String::new()));
        let runner = StageRunner::new(&generator);
        let ctx = StageContext {
            workspace: &ws,
            brief: None,
            outline: Some("\n  Title: MBA guide \n"),
        };

        runner.run(Stage::WriteBlog, &ctx).await.unwrap();
        assert_eq!(generator.0.load(Ordering::SeqCst), 1);
        assert_eq!(*generator.1.lock().unwrap(), "Title: MBA guide");

        let _ = std::fs::remove_dir_all(root.path());
    }
}
