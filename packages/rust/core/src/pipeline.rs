//! Pipeline orchestrators: Analysis, SeoContent and Blog.
//!
//! Each pipeline runs a fixed, ordered list of stages for one user and stops
//! at the first failure. Run state transitions go to the [`RunObserver`];
//! successful artifacts are converted to documents afterwards.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use seoforge_markdown::{DocumentConverter, count_words};
use seoforge_shared::{
    Brief, OrderedMap, PipelineKind, Result, RunRecord, RunState, SeoforgeError,
};
use seoforge_spyfu::RankingSource;

use crate::fetcher::fetch_rankings;
use crate::generation::Generator;
use crate::observer::RunObserver;
use crate::stage::{Stage, StageArtifact, StageContext, StageRunner};
use crate::workspace::{Area, UserWorkspace};

pub const BLOG_LOG_FILE: &str = "blog_logs.md";

/// Name of the non-generation step that opens the analysis pipeline.
const FETCH_STEP: &str = "fetch-rankings";

/// External capabilities shared by every pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub generator: Arc<dyn Generator>,
    pub rankings: Arc<dyn RankingSource>,
    pub converter: Arc<dyn DocumentConverter>,
    pub observer: Arc<dyn RunObserver>,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run: RunRecord,
    pub artifacts: Vec<StageArtifact>,
    /// Response key → cleaned markdown.
    pub markdown: OrderedMap<String>,
    /// Response key → document file name in `doc/`. Failed conversions are absent.
    pub documents: OrderedMap<String>,
}

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

struct RunTracker<'a> {
    run: RunRecord,
    observer: &'a dyn RunObserver,
    workspace: &'a UserWorkspace,
}

impl<'a> RunTracker<'a> {
    async fn start(
        observer: &'a dyn RunObserver,
        workspace: &'a UserWorkspace,
        pipeline: PipelineKind,
    ) -> RunTracker<'a> {
        let run = RunRecord::new(workspace.user_id().clone(), pipeline);
        info!(run_id = %run.id, pipeline = pipeline.as_str(), "run started");
        observer.run_updated(&run).await;
        Self {
            run,
            observer,
            workspace,
        }
    }

    async fn transition(&mut self, state: RunState) {
        self.run.transition(state);
        self.observer.run_updated(&self.run).await;
    }

    /// Enter `step`, await it, and mark the run failed if it errors.
    async fn settle<T>(
        &mut self,
        step: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.transition(RunState::Running {
            stage: step.to_string(),
        })
        .await;

        match work.await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(run_id = %self.run.id, step, error = %e, "run failed");
                self.transition(RunState::Failed {
                    stage: step.to_string(),
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn stage(
        &mut self,
        runner: &StageRunner<'_>,
        stage: Stage,
        ctx: &StageContext<'_>,
    ) -> Result<StageArtifact> {
        let artifact = self.settle(stage.name(), runner.run(stage, ctx)).await?;
        let relative = self.workspace.relative(&artifact.path);
        self.observer
            .artifact_written(&self.run, &relative, &artifact)
            .await;
        Ok(artifact)
    }

    async fn complete(mut self) -> RunRecord {
        self.transition(RunState::Completed).await;
        info!(run_id = %self.run.id, "run completed");
        self.run
    }
}

/// Convert every artifact that has a document mapping. A failed conversion
/// drops only that entry.
async fn convert_documents(
    converter: &dyn DocumentConverter,
    ws: &UserWorkspace,
    artifacts: &[StageArtifact],
) -> OrderedMap<String> {
    let mut documents = OrderedMap::new();
    for artifact in artifacts {
        let spec = artifact.stage.spec();
        let Some(document) = spec.document else {
            continue;
        };
        let output = ws.path(Area::Doc, document);
        match converter.convert(&artifact.path, &output).await {
            Ok(()) => {
                documents.insert(spec.response_key, document.to_string());
            }
            Err(e) => {
                warn!(stage = spec.name, document, error = %e, "document conversion failed");
            }
        }
    }
    documents
}

async fn finish(
    tracker: RunTracker<'_>,
    converter: &dyn DocumentConverter,
    ws: &UserWorkspace,
    artifacts: Vec<StageArtifact>,
) -> PipelineOutput {
    let run = tracker.complete().await;
    let documents = convert_documents(converter, ws, &artifacts).await;
    let markdown = artifacts
        .iter()
        .map(|a| (a.stage.spec().response_key.to_string(), a.markdown.clone()))
        .collect();
    PipelineOutput {
        run,
        artifacts,
        markdown,
        documents,
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Fetch rankings for the brief's domain, then analyze them.
pub struct AnalysisPipeline {
    deps: PipelineDeps,
}

impl AnalysisPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip_all, fields(user_id = %ws.user_id(), domain = %brief.domain))]
    pub async fn run(&self, ws: &UserWorkspace, brief: &Brief) -> Result<PipelineOutput> {
        let mut tracker =
            RunTracker::start(self.deps.observer.as_ref(), ws, PipelineKind::Analysis).await;
        let runner = StageRunner::new(self.deps.generator.as_ref());

        tracker
            .settle(
                FETCH_STEP,
                fetch_rankings(self.deps.rankings.as_ref(), ws, &brief.domain),
            )
            .await?;

        let ctx = StageContext {
            workspace: ws,
            brief: Some(brief),
            outline: None,
        };
        let analysis = tracker.stage(&runner, Stage::AnalyzeRankings, &ctx).await?;

        Ok(finish(tracker, self.deps.converter.as_ref(), ws, vec![analysis]).await)
    }
}

// ---------------------------------------------------------------------------
// SEO content
// ---------------------------------------------------------------------------

/// Ad copy, then blog outlines built on the ad copy.
pub struct SeoContentPipeline {
    deps: PipelineDeps,
}

impl SeoContentPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip_all, fields(user_id = %ws.user_id()))]
    pub async fn run(&self, ws: &UserWorkspace, brief: Option<&Brief>) -> Result<PipelineOutput> {
        let mut tracker =
            RunTracker::start(self.deps.observer.as_ref(), ws, PipelineKind::SeoContent).await;
        let runner = StageRunner::new(self.deps.generator.as_ref());
        let ctx = StageContext {
            workspace: ws,
            brief,
            outline: None,
        };

        let mut artifacts = Vec::with_capacity(2);
        for stage in [Stage::AdCopy, Stage::BlogOutline] {
            artifacts.push(tracker.stage(&runner, stage, &ctx).await?);
        }

        Ok(finish(tracker, self.deps.converter.as_ref(), ws, artifacts).await)
    }
}

// ---------------------------------------------------------------------------
// Blog
// ---------------------------------------------------------------------------

/// Blog post from a caller-supplied outline, optionally research-backed.
pub struct BlogPipeline {
    deps: PipelineDeps,
    search_augmented: bool,
}

struct StageTiming {
    stage: Stage,
    relative_path: String,
    millis: u128,
    sha256: String,
    words: usize,
}

impl BlogPipeline {
    pub fn new(deps: PipelineDeps, search_augmented: bool) -> Self {
        Self {
            deps,
            search_augmented,
        }
    }

    fn stages(&self) -> &'static [Stage] {
        if self.search_augmented {
            &[Stage::ResearchBlog, Stage::SynthesizeBlog]
        } else {
            &[Stage::WriteBlog]
        }
    }

    fn mode(&self) -> &'static str {
        if self.search_augmented {
            "search-augmented"
        } else {
            "direct"
        }
    }

    #[instrument(skip_all, fields(user_id = %ws.user_id(), mode = self.mode()))]
    pub async fn run(
        &self,
        ws: &UserWorkspace,
        outline: &str,
        institution: Option<&str>,
    ) -> Result<PipelineOutput> {
        let brief = institution
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Brief {
                institution_name: name.to_string(),
                domain: String::new(),
            });

        let mut tracker =
            RunTracker::start(self.deps.observer.as_ref(), ws, PipelineKind::Blog).await;
        let runner = StageRunner::new(self.deps.generator.as_ref());
        let ctx = StageContext {
            workspace: ws,
            brief: brief.as_ref(),
            outline: Some(outline),
        };

        let mut artifacts = Vec::with_capacity(2);
        let mut timings = Vec::with_capacity(2);
        let mut failure = None;

        for &stage in self.stages() {
            let started = Instant::now();
            match tracker.stage(&runner, stage, &ctx).await {
                Ok(artifact) => {
                    timings.push(StageTiming {
                        stage,
                        relative_path: ws.relative(&artifact.path),
                        millis: started.elapsed().as_millis(),
                        sha256: artifact.sha256.clone(),
                        words: count_words(&artifact.markdown),
                    });
                    artifacts.push(artifact);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let log = self.run_log(&tracker.run, &timings, failure.as_ref());
        if let Err(e) = ws.write_atomic(Area::Blogs, BLOG_LOG_FILE, log.as_bytes()) {
            warn!(error = %e, "failed to write blog run log");
        }

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(finish(tracker, self.deps.converter.as_ref(), ws, artifacts).await)
    }

    fn run_log(
        &self,
        run: &RunRecord,
        timings: &[StageTiming],
        failure: Option<&SeoforgeError>,
    ) -> String {
        let mut log = String::from("# Blog run log\n\n");
        let _ = writeln!(log, "- Run: {}", run.id);
        let _ = writeln!(log, "- Mode: {}", self.mode());
        let _ = writeln!(
            log,
            "- Started: {}",
            run.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(
            log,
            "- Finished: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        match failure {
            None => log.push_str("- Status: completed\n"),
            Some(e) => {
                let _ = writeln!(log, "- Status: failed ({e})");
            }
        }

        log.push_str("\n| Stage | Output | Duration (ms) | Words | SHA-256 |\n");
        log.push_str("|---|---|---|---|---|\n");
        for t in timings {
            let _ = writeln!(
                log,
                "| {} | {} | {} | {} | `{}` |",
                t.stage, t.relative_path, t.millis, t.words, t.sha256
            );
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::{SELECTED_KEYWORDS_FILE, select_keywords};
    use crate::fetcher::tests::{FakeSource, mba_source};
    use crate::fetcher::USER_RANKINGS_FILE;
    use crate::stage::tests::{ScriptedGenerator, temp_workspace};

    /// Writes a placeholder document unless the output name is `fail_for`.
    #[derive(Default)]
    struct FakeConverter {
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl DocumentConverter for FakeConverter {
        async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
            assert!(input.exists());
            let name = output.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if self.fail_for == Some(name) {
                return Err(SeoforgeError::Conversion(format!("{name}: pandoc exited with 1")));
            }
            std::fs::write(output, b"docx").map_err(|e| SeoforgeError::io(output, e))
        }
    }

    /// Records every state label the run passes through.
    #[derive(Default)]
    struct RecordingObserver {
        states: Mutex<Vec<String>>,
        artifacts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RunObserver for RecordingObserver {
        async fn run_updated(&self, run: &RunRecord) {
            let label = match run.state.stage() {
                Some(stage) => format!("{}:{stage}", run.state.label()),
                None => run.state.label().to_string(),
            };
            self.states.lock().unwrap().push(label);
        }

        async fn artifact_written(&self, _run: &RunRecord, relative_path: &str, _a: &StageArtifact) {
            self.artifacts.lock().unwrap().push(relative_path.to_string());
        }
    }

    fn deps(
        generator: Arc<ScriptedGenerator>,
        source: FakeSource,
        converter: FakeConverter,
        observer: Arc<RecordingObserver>,
    ) -> PipelineDeps {
        PipelineDeps {
            generator,
            rankings: Arc::new(source),
            converter: Arc::new(converter),
            observer,
        }
    }

    fn brief() -> Brief {
        Brief {
            institution_name: "Own College".into(),
            domain: "https://own.edu".into(),
        }
    }

    #[tokio::test]
    async fn analysis_fetches_then_analyzes() {
        let (root, ws) = temp_workspace();
        let generator = Arc::new(ScriptedGenerator::new("```markdown\n# Analysis\n```\n"));
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = AnalysisPipeline::new(deps(
            generator.clone(),
            mba_source(),
            FakeConverter::default(),
            observer.clone(),
        ));

        let output = pipeline.run(&ws, &brief()).await.unwrap();

        assert_eq!(generator.stages(), [Stage::AnalyzeRankings]);
        assert_eq!(output.run.state, RunState::Completed);
        assert!(output.markdown.get("analysis").unwrap().starts_with("# Analysis\n"));
        assert_eq!(output.documents.get("analysis").unwrap(), "analysis.docx");
        assert!(ws.path(Area::Doc, "analysis.docx").exists());
        assert!(ws.read_to_string(Area::Data, USER_RANKINGS_FILE).unwrap().is_some());

        assert_eq!(
            *observer.states.lock().unwrap(),
            [
                "pending",
                "running:fetch-rankings",
                "running:analyze-rankings",
                "completed"
            ]
        );
        assert_eq!(*observer.artifacts.lock().unwrap(), ["crew/analysis.md"]);

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn analysis_fetch_failure_skips_generation() {
        let (root, ws) = temp_workspace();
        let generator = Arc::new(ScriptedGenerator::new("# x\n"));
        let observer = Arc::new(RecordingObserver::default());
        let source = FakeSource {
            fail_for: Some("own.edu".into()),
            ..mba_source()
        };
        let pipeline = AnalysisPipeline::new(deps(
            generator.clone(),
            source,
            FakeConverter::default(),
            observer.clone(),
        ));

        let err = pipeline.run(&ws, &brief()).await.unwrap_err();
        assert!(matches!(err, SeoforgeError::UpstreamFetch(_)));
        assert!(generator.stages().is_empty());
        assert_eq!(
            observer.states.lock().unwrap().last().unwrap(),
            "failed:fetch-rankings"
        );

        let _ = std::fs::remove_dir_all(root.path());
    }

    async fn with_selection(ws: &UserWorkspace) {
        fetch_rankings(&mba_source(), ws, "own.edu").await.unwrap();
        select_keywords(ws, &["mba admissions".into()]).unwrap();
    }

    #[tokio::test]
    async fn seo_content_runs_ad_copy_then_outlines() {
        let (root, ws) = temp_workspace();
        with_selection(&ws).await;

        let generator = Arc::new(ScriptedGenerator::new("## Content\n"));
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = SeoContentPipeline::new(deps(
            generator.clone(),
            FakeSource::default(),
            FakeConverter::default(),
            observer.clone(),
        ));

        let output = pipeline.run(&ws, None).await.unwrap();

        assert_eq!(generator.stages(), [Stage::AdCopy, Stage::BlogOutline]);
        assert_eq!(output.markdown.keys().collect::<Vec<_>>(), ["ad", "outlines"]);
        assert_eq!(output.documents.keys().collect::<Vec<_>>(), ["ad", "outlines"]);
        assert_eq!(
            *observer.artifacts.lock().unwrap(),
            ["crew/ad_copies.md", "crew/blog_post_outlines.md"]
        );

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn failed_ad_copy_never_starts_outline() {
        let (root, ws) = temp_workspace();
        with_selection(&ws).await;

        let generator = Arc::new(ScriptedGenerator::failing_on(Stage::AdCopy));
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = SeoContentPipeline::new(deps(
            generator.clone(),
            FakeSource::default(),
            FakeConverter::default(),
            observer.clone(),
        ));

        let err = pipeline.run(&ws, None).await.unwrap_err();
        match err {
            SeoforgeError::Generation { stage, .. } => assert_eq!(stage, "ad-copy"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(generator.stages(), [Stage::AdCopy]);
        assert!(
            ws.read_to_string(Area::Crew, "blog_post_outlines.md")
                .unwrap()
                .is_none()
        );
        assert_eq!(
            observer.states.lock().unwrap().last().unwrap(),
            "failed:ad-copy"
        );

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn seo_content_without_selection_is_unmet() {
        let (root, ws) = temp_workspace();
        let generator = Arc::new(ScriptedGenerator::new("x"));
        let pipeline = SeoContentPipeline::new(deps(
            generator.clone(),
            FakeSource::default(),
            FakeConverter::default(),
            Arc::new(RecordingObserver::default()),
        ));

        let err = pipeline.run(&ws, None).await.unwrap_err();
        assert!(matches!(err, SeoforgeError::UnmetDependency { .. }));
        assert!(ws.read_to_string(Area::Data, SELECTED_KEYWORDS_FILE).unwrap().is_none());
        assert!(generator.stages().is_empty());

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn search_augmented_blog_researches_first() {
        let (root, ws) = temp_workspace();
        let generator = Arc::new(ScriptedGenerator::new("# Post\n\nSome words here.\n"));
        let pipeline = BlogPipeline::new(
            deps(
                generator.clone(),
                FakeSource::default(),
                FakeConverter::default(),
                Arc::new(RecordingObserver::default()),
            ),
            true,
        );

        let output = pipeline
            .run(&ws, "# MBA guide\n- intro", Some("Own College"))
            .await
            .unwrap();

        assert_eq!(
            generator.stages(),
            [Stage::ResearchBlog, Stage::SynthesizeBlog]
        );
        assert!(ws.read_to_string(Area::Blogs, "search_logs.md").unwrap().is_some());
        assert!(output.markdown.get("blog").is_some());
        assert_eq!(output.documents.get("blog").unwrap(), "blog_post.docx");
        assert!(output.documents.get("research").is_none());

        let log = ws.read_to_string(Area::Blogs, BLOG_LOG_FILE).unwrap().unwrap();
        assert!(log.contains("- Mode: search-augmented"));
        assert!(log.contains("- Status: completed"));
        assert!(log.contains("| research-blog | blogs/search_logs.md |"));
        assert!(log.contains("| write-blog | blogs/blog_post.md |"));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn direct_blog_is_single_call() {
        let (root, ws) = temp_workspace();
        let generator = Arc::new(ScriptedGenerator::new("# Post\n"));
        let pipeline = BlogPipeline::new(
            deps(
                generator.clone(),
                FakeSource::default(),
                FakeConverter::default(),
                Arc::new(RecordingObserver::default()),
            ),
            false,
        );

        pipeline.run(&ws, "outline", None).await.unwrap();
        assert_eq!(generator.stages(), [Stage::WriteBlog]);
        assert!(ws.read_to_string(Area::Blogs, "search_logs.md").unwrap().is_none());

        let log = ws.read_to_string(Area::Blogs, BLOG_LOG_FILE).unwrap().unwrap();
        assert!(log.contains("- Mode: direct"));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn blog_failure_is_logged() {
        let (root, ws) = temp_workspace();
        let generator = Arc::new(ScriptedGenerator::failing_on(Stage::SynthesizeBlog));
        let pipeline = BlogPipeline::new(
            deps(
                generator.clone(),
                FakeSource::default(),
                FakeConverter::default(),
                Arc::new(RecordingObserver::default()),
            ),
            true,
        );

        let err = pipeline.run(&ws, "outline", None).await.unwrap_err();
        assert!(matches!(err, SeoforgeError::Generation { .. }));

        let log = ws.read_to_string(Area::Blogs, BLOG_LOG_FILE).unwrap().unwrap();
        assert!(log.contains("- Status: failed"));
        assert!(log.contains("| research-blog |"));
        assert!(!log.contains("| write-blog |"));

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[tokio::test]
    async fn conversion_failure_drops_only_that_document() {
        let (root, ws) = temp_workspace();
        with_selection(&ws).await;

        let generator = Arc::new(ScriptedGenerator::new("## Content\n"));
        let pipeline = SeoContentPipeline::new(deps(
            generator,
            FakeSource::default(),
            FakeConverter {
                fail_for: Some("ad_copies.docx"),
            },
            Arc::new(RecordingObserver::default()),
        ));

        let output = pipeline.run(&ws, None).await.unwrap();
        assert_eq!(output.run.state, RunState::Completed);
        assert_eq!(output.markdown.len(), 2);
        assert_eq!(output.documents.keys().collect::<Vec<_>>(), ["outlines"]);
        assert!(!ws.path(Area::Doc, "ad_copies.docx").exists());

        let _ = std::fs::remove_dir_all(root.path());
    }
}
