//! Run lifecycle notifications.

use async_trait::async_trait;
use tracing::warn;

use seoforge_ledger::Ledger;
use seoforge_shared::RunRecord;

use crate::stage::StageArtifact;

/// Receives run transitions and written artifacts.
///
/// Observers cannot fail a run: implementations log their own errors.
#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn run_updated(&self, run: &RunRecord);

    /// `relative_path` is the artifact path relative to the user workspace.
    async fn artifact_written(&self, run: &RunRecord, relative_path: &str, artifact: &StageArtifact);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {
    async fn run_updated(&self, _run: &RunRecord) {}

    async fn artifact_written(&self, _run: &RunRecord, _relative_path: &str, _artifact: &StageArtifact) {}
}

#[async_trait]
impl RunObserver for Ledger {
    async fn run_updated(&self, run: &RunRecord) {
        if let Err(e) = self.record_run(run).await {
            warn!(run_id = %run.id, error = %e, "failed to record run state");
        }
    }

    async fn artifact_written(&self, run: &RunRecord, relative_path: &str, artifact: &StageArtifact) {
        if let Err(e) = self
            .record_artifact(
                &run.id,
                artifact.stage.name(),
                relative_path,
                &artifact.sha256,
                artifact.size_bytes as u64,
            )
            .await
        {
            warn!(run_id = %run.id, stage = artifact.stage.name(), error = %e, "failed to record artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use seoforge_shared::{PipelineKind, RunState, UserId};
    use uuid::Uuid;

    #[tokio::test]
    async fn ledger_observer_records_runs_and_artifacts() {
        let dir = std::env::temp_dir().join(format!("seoforge-observer-test-{}", Uuid::now_v7()));
        let ledger = Ledger::open(&dir.join("ledger.db")).await.unwrap();

        let user = UserId::generate();
        let mut run = RunRecord::new(user.clone(), PipelineKind::SeoContent);
        ledger.run_updated(&run).await;

        let artifact = StageArtifact {
            stage: Stage::AdCopy,
            path: dir.join("crew/ad_copies.md"),
            markdown: "# Ads\n".into(),
            sha256: "ab".repeat(32),
            size_bytes: 6,
        };
        ledger
            .artifact_written(&run, "crew/ad_copies.md", &artifact)
            .await;

        run.transition(RunState::Completed);
        ledger.run_updated(&run).await;

        let runs = ledger.runs_for_user(&user).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, RunState::Completed);

        let artifacts = ledger.artifacts_for_run(&run.id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].stage, "ad-copy");
        assert_eq!(artifacts[0].path, "crew/ad_copies.md");
        assert_eq!(artifacts[0].size_bytes, 6);

        drop(ledger);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
