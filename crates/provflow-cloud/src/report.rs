//! Run report
//!
//! The report is the only durable output of a run. It is written as JSON under
//! `.provflow/runs/` for logging and audit; it is never read back to resume a run.

use crate::error::Result;
use crate::rollback::CompensationOutcome;
use crate::state::{ExecutionState, ExecutionStatus, Run, RunOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const REPORT_VERSION: u32 = 1;
const LAST_RUN_FILE: &str = "last-run.json";

/// Reference to a resource in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    pub kind: String,
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ExecutionState> for ResourceRef {
    fn from(state: &ExecutionState) -> Self {
        Self {
            id: state.id.clone(),
            kind: state.kind.to_string(),
            external_id: state.external_id.as_ref().map(|id| id.to_string()),
            error: state.error.clone(),
        }
    }
}

/// User-visible summary of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub version: u32,
    pub run_id: String,
    pub plan: String,
    pub outcome: Option<RunOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub halt_reason: Option<String>,
    /// Exists and is usable
    pub ready: Vec<ResourceRef>,
    /// Created (or adopted) and removed again by rollback
    pub rolled_back: Vec<ResourceRef>,
    /// Still exists but could not be removed: manual cleanup required
    pub leaked: Vec<ResourceRef>,
    /// Deliberately left in place by rollback (pre-existing or `retain`)
    pub retained: Vec<ResourceRef>,
    pub failed: Vec<ResourceRef>,
    /// Never started
    pub pending: Vec<ResourceRef>,
    pub resources: Vec<ExecutionState>,
}

impl RunReport {
    pub fn from_run(run: &Run) -> Self {
        let collect = |status: ExecutionStatus| -> Vec<ResourceRef> {
            run.states
                .iter()
                .filter(|s| s.status == status)
                .map(ResourceRef::from)
                .collect()
        };

        let retained = run
            .rollback
            .iter()
            .flat_map(|report| report.entries.iter())
            .filter(|entry| matches!(entry.outcome, CompensationOutcome::Retained))
            .filter_map(|entry| run.state(&entry.id))
            .map(ResourceRef::from)
            .collect();

        Self {
            version: REPORT_VERSION,
            run_id: run.run_id.clone(),
            plan: run.plan.clone(),
            outcome: run.outcome,
            started_at: run.started_at,
            finished_at: run.finished_at,
            halt_reason: run.halt_reason.clone(),
            ready: collect(ExecutionStatus::Ready),
            rolled_back: collect(ExecutionStatus::RolledBack),
            leaked: collect(ExecutionStatus::Leaked),
            retained,
            failed: collect(ExecutionStatus::Failed),
            pending: collect(ExecutionStatus::Pending),
            resources: run.states.clone(),
        }
    }

    /// Resources that still exist in the cloud account after the run
    pub fn still_existing(&self) -> Vec<&ResourceRef> {
        let mut existing: Vec<&ResourceRef> = self.ready.iter().chain(self.leaked.iter()).collect();
        for retained in &self.retained {
            if !existing.iter().any(|r| r.id == retained.id) {
                existing.push(retained);
            }
        }
        existing
    }
}

/// Writes run reports to disk
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created report directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Write `<run-id>.json` and refresh `last-run.json`
    pub async fn write(&self, report: &RunReport) -> Result<PathBuf> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(report)?;
        let path = self.dir.join(format!("{}.json", report.run_id));
        fs::write(&path, &content).await?;
        fs::write(self.dir.join(LAST_RUN_FILE), &content).await?;

        tracing::debug!(path = %path.display(), "Wrote run report");
        Ok(path)
    }

    /// Load the most recent report, if any
    pub async fn load_last(&self) -> Result<Option<RunReport>> {
        let path = self.dir.join(LAST_RUN_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
