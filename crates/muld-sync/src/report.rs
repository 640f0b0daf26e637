//! Per-repository results and the run-level report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::plan::{Stage, SyncPlan};

/// Lifecycle of one repository within a run.
///
/// `Pending → Planning → PlanFailed | Planned → Executing → Success |
/// PartialFailure | Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoPhase {
    Pending,
    Planning,
    PlanFailed,
    Planned,
    Executing,
    Success,
    PartialFailure,
    Failed,
}

impl RepoPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::PlanFailed | Self::Success | Self::PartialFailure | Self::Failed
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A reported error, scoped to a stage and, where known, a single ref.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefError {
    pub stage: Stage,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl RefError {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            name: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_ref(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.stage)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Outcome of one repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub repository: String,
    pub phase: RepoPhase,
    pub status: RunStatus,
    pub errors: Vec<RefError>,
    /// Ref updates confirmed per stage (`local`, `downstream:<name>`).
    pub applied: BTreeMap<String, usize>,
}

impl RunResult {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            phase: RepoPhase::Pending,
            status: RunStatus::Success,
            errors: Vec::new(),
            applied: BTreeMap::new(),
        }
    }

    /// A repository that never got past planning.
    pub fn plan_failed(repository: impl Into<String>, error: RefError) -> Self {
        Self {
            phase: RepoPhase::PlanFailed,
            status: RunStatus::Failed,
            errors: vec![error],
            ..Self::new(repository)
        }
    }

    /// The repository's task died before it produced a result.
    pub fn aborted(repository: impl Into<String>, error: RefError) -> Self {
        Self {
            phase: RepoPhase::Failed,
            status: RunStatus::Failed,
            errors: vec![error],
            ..Self::new(repository)
        }
    }

    pub fn record_applied(&mut self, stage: &Stage, count: usize) {
        if count > 0 {
            *self.applied.entry(stage.to_string()).or_default() += count;
        }
    }

    /// Settle status and phase once execution is over.
    ///
    /// `intact` is false when the local stage failed or the record could
    /// not be saved.
    pub(crate) fn finish(&mut self, intact: bool) {
        let (status, phase) = if !intact {
            (RunStatus::Failed, RepoPhase::Failed)
        } else if self.errors.is_empty() {
            (RunStatus::Success, RepoPhase::Success)
        } else {
            (RunStatus::Partial, RepoPhase::PartialFailure)
        };
        self.status = status;
        self.phase = phase;
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn total_applied(&self) -> usize {
        self.applied.values().sum()
    }
}

/// Aggregate of one run over a manifest.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by repository name.
    pub results: Vec<RunResult>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, mut results: Vec<RunResult>) -> Self {
        results.sort_by(|a, b| a.repository.cmp(&b.repository));
        Self {
            run_id: Uuid::now_v7(),
            started_at,
            finished_at: Utc::now(),
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(RunResult::is_success)
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn result(&self, repository: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.repository == repository)
    }

    /// Process exit code: 0 when every repository fully succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Dry-run output for one repository.
#[derive(Clone, Debug, Serialize)]
pub struct PlanReport {
    pub repository: String,
    /// Local stage first, then downstreams in declaration order.
    pub plans: Vec<SyncPlan>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RefError>,
}

impl PlanReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
