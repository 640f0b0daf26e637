//! Runs every repository of a manifest through planning and execution.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use muld_manifest::{Manifest, RepositorySpec, RetryPolicy};
use muld_state::{StateStore, SyncRecord};
use muld_transport::TransportRegistry;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ErrorKind, SyncError};
use crate::executor::{blocking, plan_downstreams, Executor};
use crate::plan::{Stage, SyncPlan};
use crate::planner;
use crate::report::{PlanReport, RefError, RepoPhase, RunReport, RunResult, RunStatus};
use crate::retry::with_retry;

/// Owns the shared transport registry and state store for a run.
///
/// Each repository is handled by exactly one task, so no two tasks ever
/// write the same record.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<TransportRegistry>,
    store: Arc<dyn StateStore>,
    concurrency: Option<usize>,
}

fn error_at(stage: Stage, e: impl Into<SyncError>) -> RefError {
    let e = e.into();
    RefError::new(stage, e.kind(), e.to_string())
}

impl Orchestrator {
    pub fn new(registry: TransportRegistry, store: Arc<dyn StateStore>) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            concurrency: None,
        }
    }

    /// Override the manifest's concurrency setting.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit.max(1));
        self
    }

    pub fn concurrency_for(&self, manifest: &Manifest) -> usize {
        self.concurrency.unwrap_or(manifest.settings.concurrency).max(1)
    }

    /// Sync every repository in `manifest`.
    ///
    /// One repository's failure never stops the others. Cancelling `cancel`
    /// lets in-flight fetches and pushes finish and skips every later step.
    pub async fn run(&self, manifest: &Manifest, cancel: CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let mut results: Vec<RunResult> = manifest
            .invalid
            .iter()
            .map(|entry| {
                RunResult::plan_failed(
                    &entry.name,
                    RefError::new(Stage::Repository, ErrorKind::Config, entry.error.to_string()),
                )
            })
            .collect();

        let limit = self.concurrency_for(manifest);
        info!(
            repositories = manifest.repositories.len(),
            invalid = manifest.invalid.len(),
            concurrency = limit,
            "starting run"
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let mut outstanding = BTreeSet::new();
        for spec in &manifest.repositories {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let this = self.clone();
            let spec = spec.clone();
            let retry = manifest.settings.retry.clone();
            let cancel = cancel.clone();
            outstanding.insert(spec.name.clone());
            tasks.spawn(async move {
                let _permit = permit;
                this.sync_repository(&spec, &retry, &cancel).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    outstanding.remove(&result.repository);
                    results.push(result);
                }
                Err(e) => error!(error = %e, "repository task did not complete"),
            }
        }
        for name in outstanding {
            results.push(RunResult::aborted(
                name,
                RefError::new(
                    Stage::Repository,
                    ErrorKind::Aborted,
                    "repository task panicked or was aborted, its record may be stale",
                ),
            ));
        }

        let report = RunReport::new(started_at, results);
        info!(
            run_id = %report.run_id,
            failed = report.count(RunStatus::Failed),
            partial = report.count(RunStatus::Partial),
            "run finished"
        );
        report
    }

    /// Plan every repository without fetching, pushing or writing state.
    ///
    /// Downstream plans are computed from each downstream's live refs and
    /// the local state the local plan would produce.
    pub async fn plan_all(&self, manifest: &Manifest) -> Vec<PlanReport> {
        let cancel = CancellationToken::new();
        let mut reports: Vec<PlanReport> = manifest
            .invalid
            .iter()
            .map(|entry| PlanReport {
                repository: entry.name.clone(),
                plans: Vec::new(),
                errors: vec![RefError::new(
                    Stage::Repository,
                    ErrorKind::Config,
                    entry.error.to_string(),
                )],
            })
            .collect();

        for spec in &manifest.repositories {
            let mut report = PlanReport {
                repository: spec.name.clone(),
                plans: Vec::new(),
                errors: Vec::new(),
            };
            match self
                .observe_and_plan(spec, &manifest.settings.retry, &cancel)
                .await
            {
                Ok((local_plan, record)) => {
                    let projected = local_plan.apply_to(&record.local);
                    report.plans.push(local_plan);
                    let executor = self.executor(&manifest.settings.retry, &cancel);
                    let (observed, listing_errors) = executor.observe_downstreams(spec).await;
                    let (plans, plan_errors) = plan_downstreams(spec, &projected, &observed);
                    report.plans.extend(plans.into_iter().map(|(_, plan)| plan));
                    report.errors.extend(listing_errors);
                    report.errors.extend(plan_errors);
                }
                Err(e) => report.errors.push(e),
            }
            reports.push(report);
        }

        reports.sort_by(|a, b| a.repository.cmp(&b.repository));
        reports
    }

    #[instrument(skip_all, fields(repository = %spec.name))]
    async fn sync_repository(
        &self,
        spec: &RepositorySpec,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> RunResult {
        debug!(phase = ?RepoPhase::Planning);
        if cancel.is_cancelled() {
            return RunResult::plan_failed(
                &spec.name,
                RefError::new(Stage::Repository, ErrorKind::Cancelled, "run cancelled before planning"),
            );
        }

        let (plan, record) = match self.observe_and_plan(spec, retry, cancel).await {
            Ok(planned) => planned,
            Err(e) => {
                warn!(error = %e, "planning failed");
                return RunResult::plan_failed(&spec.name, e);
            }
        };
        debug!(
            phase = ?RepoPhase::Planned,
            changes = plan.changes().len(),
            "local plan ready"
        );

        self.executor(retry, cancel).execute(spec, &plan, record).await
    }

    fn executor(&self, retry: &RetryPolicy, cancel: &CancellationToken) -> Executor {
        Executor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            retry.clone(),
            cancel.clone(),
        )
    }

    /// Load the record, list the upstream and plan the local stage.
    async fn observe_and_plan(
        &self,
        spec: &RepositorySpec,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<(SyncPlan, SyncRecord), RefError> {
        let name = spec.name.clone();
        let record = blocking(&self.store, move |store| store.load(&name))
            .await
            .map_err(|e| error_at(Stage::Repository, e))?
            .unwrap_or_else(|| SyncRecord::new(&spec.name));

        let transport = self
            .registry
            .resolve(&spec.upstream)
            .map_err(|e| error_at(Stage::Local, e))?;
        let upstream = with_retry(retry, cancel, "list-refs", || {
            transport.list_refs(&spec.upstream)
        })
        .await
        .map_err(|e| error_at(Stage::Local, e))?;

        let plan = planner::plan(spec, &upstream, &record.local)
            .map_err(|e| error_at(Stage::Local, e))?;
        Ok((plan, record))
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use muld_manifest::{ConfigError, DownstreamSpec, InvalidEntry, Settings};
    use muld_refs::RefState;
    use muld_state::{FileStateStore, InMemoryStateStore};
    use muld_transport::{MemoryTransport, Scheme, TransportCall};

    use crate::plan::ActionKind;
    use crate::report::RunStatus;

    struct Harness {
        mem: MemoryTransport,
        store: Arc<InMemoryStateStore>,
        orchestrator: Orchestrator,
    }

    fn harness() -> Harness {
        let mem = MemoryTransport::new();
        let mut registry = TransportRegistry::new();
        registry.register(Scheme::Memory, Arc::new(mem.clone()));
        let store = Arc::new(InMemoryStateStore::new());
        let orchestrator = Orchestrator::new(registry, store.clone());
        Harness {
            mem,
            store,
            orchestrator,
        }
    }

    fn manifest(repositories: Vec<RepositorySpec>) -> Manifest {
        Manifest {
            settings: Settings {
                retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
                ..Settings::default()
            },
            repositories,
            invalid: Vec::new(),
            base_dir: PathBuf::from("/"),
        }
    }

    fn repo(name: &str, downstreams: &[&str]) -> RepositorySpec {
        downstreams.iter().fold(
            RepositorySpec::new(name, format!("mem://{name}"), format!("/mirrors/{name}.git")),
            |spec, ds| spec.with_downstream(DownstreamSpec::new(*ds, format!("mem://{ds}"))),
        )
    }

    fn transfers(calls: &[TransportCall]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Fetch { .. } | TransportCall::Push { .. }))
            .count()
    }

    async fn run(h: &Harness, m: &Manifest) -> RunReport {
        h.orchestrator.run(m, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn first_run_creates_then_second_run_is_quiet() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        let main = RefState::new().with("main", h1.clone());
        h.mem.set_refs("demo", main.clone()).unwrap();
        let m = manifest(vec![repo("demo", &["backup"])]);

        let plans = h.orchestrator.plan_all(&m).await;
        assert_eq!(plans[0].plans[0].actions[0].kind, ActionKind::Create);
        assert_eq!(plans[0].plans[0].actions[0].target, Some(h1.clone()));

        let report = run(&h, &m).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.phase, RepoPhase::Success);
        assert_eq!(result.applied.get("local"), Some(&1));
        assert_eq!(result.applied.get("downstream:backup"), Some(&1));
        assert_eq!(report.exit_code(), 0);

        let record = h.store.load("demo").unwrap().unwrap();
        assert_eq!(record.local, main);
        assert_eq!(record.downstream_state("backup"), main);
        assert_eq!(record.last_error, None);
        assert_eq!(h.mem.refs("backup").unwrap(), main);

        h.mem.clear_calls().unwrap();
        let plans = h.orchestrator.plan_all(&m).await;
        assert!(plans[0].plans.iter().all(|p| !p.has_changes()));
        assert_eq!(plans[0].plans[0].actions[0].kind, ActionKind::NoOp);

        h.mem.clear_calls().unwrap();
        let report = run(&h, &m).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert!(result.applied.is_empty());
        assert_eq!(
            h.mem.calls().unwrap(),
            vec![
                TransportCall::ListRefs("demo".into()),
                TransportCall::ListRefs("backup".into()),
            ]
        );
    }

    #[tokio::test]
    async fn downstream_changed_outside_muld_is_repaired() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        let main = RefState::new().with("main", h1);
        h.mem.set_refs("demo", main.clone()).unwrap();
        let m = manifest(vec![repo("demo", &["backup"])]);
        assert!(run(&h, &m).await.is_success());

        h.mem.set_refs("backup", RefState::new()).unwrap();
        let plans = h.orchestrator.plan_all(&m).await;
        assert_eq!(plans[0].plans[1].count(ActionKind::Create), 1);

        let report = run(&h, &m).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.applied.get("local"), None);
        assert_eq!(result.applied.get("downstream:backup"), Some(&1));
        assert_eq!(h.mem.refs("backup").unwrap(), main);
        assert_eq!(h.store.load("demo").unwrap().unwrap().downstream_state("backup"), main);
    }

    #[tokio::test]
    async fn upstream_update_keeps_orphaned_ref() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        let old = h.mem.commit(None, "legacy").unwrap();
        h.mem
            .set_refs("demo", RefState::new().with("main", h1.clone()).with("legacy", old.clone()))
            .unwrap();
        let m = manifest(vec![repo("demo", &["backup"])]);
        assert!(run(&h, &m).await.is_success());

        let h2 = h.mem.commit(Some(&h1), "h2").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", h2.clone())).unwrap();

        let plans = h.orchestrator.plan_all(&m).await;
        let local = &plans[0].plans[0];
        assert_eq!(local.actions.len(), 2);
        assert_eq!(local.actions[0].name, "legacy");
        assert_eq!(local.actions[0].kind, ActionKind::NoOp);
        assert!(local.actions[0].orphaned);
        assert_eq!(local.actions[1].name, "main");
        assert_eq!(local.actions[1].kind, ActionKind::Update);
        assert_eq!(local.actions[1].target, Some(h2.clone()));
        assert_eq!(plans[0].plans[1].count(ActionKind::Update), 1);

        let report = run(&h, &m).await;
        assert!(report.is_success());
        let record = h.store.load("demo").unwrap().unwrap();
        assert_eq!(record.local.get("main"), Some(&h2));
        assert_eq!(record.local.get("legacy"), Some(&old));
        assert_eq!(h.mem.refs("backup").unwrap().get("legacy"), Some(&old));
        assert_eq!(h.mem.refs("backup").unwrap().get("main"), Some(&h2));
    }

    #[tokio::test]
    async fn prune_propagates_deletions() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        let old = h.mem.commit(None, "legacy").unwrap();
        h.mem
            .set_refs("demo", RefState::new().with("main", h1.clone()).with("legacy", old))
            .unwrap();
        let m = manifest(vec![repo("demo", &["backup"]).with_prune(true)]);
        assert!(run(&h, &m).await.is_success());

        h.mem.set_refs("demo", RefState::new().with("main", h1.clone())).unwrap();
        let report = run(&h, &m).await;
        assert!(report.is_success());
        let expected = RefState::new().with("main", h1);
        assert_eq!(h.store.load("demo").unwrap().unwrap().local, expected);
        assert_eq!(h.mem.refs("backup").unwrap(), expected);
    }

    #[tokio::test]
    async fn non_fast_forward_without_force_is_partial() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", h1.clone())).unwrap();
        let m = manifest(vec![repo("demo", &["backup"])]);
        assert!(run(&h, &m).await.is_success());

        let rewritten = h.mem.commit(None, "rewritten").unwrap();
        h.mem.set_refs("backup", RefState::new().with("main", rewritten.clone())).unwrap();
        let h2 = h.mem.commit(Some(&h1), "h2").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", h2.clone())).unwrap();

        let report = run(&h, &m).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.phase, RepoPhase::PartialFailure);
        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.kind, ErrorKind::TransportRejected);
        assert_eq!(error.stage, Stage::Downstream("backup".into()));
        assert_eq!(error.name.as_deref(), Some("main"));
        assert_eq!(report.exit_code(), 1);

        let record = h.store.load("demo").unwrap().unwrap();
        assert_eq!(record.local.get("main"), Some(&h2));
        assert_eq!(record.downstream_state("backup").get("main"), Some(&h1));
        assert!(record.last_error.is_some());
        assert_eq!(h.mem.refs("backup").unwrap().get("main"), Some(&rewritten));
    }

    #[tokio::test]
    async fn forced_downstream_accepts_non_fast_forward() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", h1.clone())).unwrap();
        let spec = RepositorySpec::new("demo", "mem://demo", "/mirrors/demo.git")
            .with_downstream(DownstreamSpec::new("backup", "mem://backup").forced());
        let m = manifest(vec![spec]);
        assert!(run(&h, &m).await.is_success());

        let rewritten = h.mem.commit(None, "rewritten").unwrap();
        h.mem.set_refs("backup", RefState::new().with("main", rewritten)).unwrap();
        let h2 = h.mem.commit(Some(&h1), "h2").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", h2.clone())).unwrap();

        let report = run(&h, &m).await;
        assert!(report.is_success());
        assert_eq!(h.mem.refs("backup").unwrap().get("main"), Some(&h2));
        assert!(h.store.load("demo").unwrap().unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn auth_failure_on_one_downstream_does_not_block_the_other() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        let main = RefState::new().with("main", h1);
        h.mem.set_refs("demo", main.clone()).unwrap();
        h.mem.reject_auth("b").unwrap();
        let m = manifest(vec![repo("demo", &["a", "b"])]);

        let report = run(&h, &m).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, Stage::Downstream("b".into()));
        assert_eq!(result.errors[0].kind, ErrorKind::TransportRejected);

        assert_eq!(h.mem.refs("a").unwrap(), main);
        let record = h.store.load("demo").unwrap().unwrap();
        assert_eq!(record.local, main);
        assert_eq!(record.downstream_state("a"), main);
        assert!(!record.downstream.contains_key("b"));

        // once b accepts again only b is pushed
        h.mem.clear_faults("b").unwrap();
        h.mem.clear_calls().unwrap();
        assert!(run(&h, &m).await.is_success());
        let pushes: Vec<_> = h
            .mem
            .calls()
            .unwrap()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Push { endpoint, .. } => Some(endpoint),
                _ => None,
            })
            .collect();
        assert_eq!(pushes, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", h1)).unwrap();
        h.mem.fail_transient("demo", 2).unwrap();
        let m = manifest(vec![repo("demo", &[])]);
        assert!(run(&h, &m).await.is_success());
    }

    #[tokio::test]
    async fn exhausted_retries_fail_planning() {
        let h = harness();
        h.mem.fail_transient("demo", 10).unwrap();
        let m = manifest(vec![repo("demo", &["backup"])]);
        let report = run(&h, &m).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.phase, RepoPhase::PlanFailed);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.errors[0].kind, ErrorKind::TransportTransient);
        assert!(h.store.load("demo").unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_ref_name_is_a_plan_failure() {
        let h = harness();
        let id = h.mem.commit(None, "x").unwrap();
        h.mem
            .set_refs("demo", RefState::new().with("main", id.clone()).with("bad..ref", id))
            .unwrap();
        let report = run(&h, &manifest(vec![repo("demo", &[])])).await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.phase, RepoPhase::PlanFailed);
        assert_eq!(result.errors[0].kind, ErrorKind::Plan);
    }

    #[tokio::test]
    async fn invalid_entries_fail_alone() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        h.mem.set_refs("good", RefState::new().with("main", h1)).unwrap();
        let mut m = manifest(vec![repo("good", &[])]);
        m.invalid.push(InvalidEntry {
            name: "broken".into(),
            error: ConfigError::MissingField("upstream"),
        });

        let report = run(&h, &m).await;
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].repository, "broken");
        assert_eq!(report.results[0].errors[0].kind, ErrorKind::Config);
        assert_eq!(report.results[1].status, RunStatus::Success);
        assert_eq!(report.exit_code(), 1);

        let plans = h.orchestrator.plan_all(&m).await;
        assert!(!plans[0].is_ok());
        assert!(plans[1].is_ok());
    }

    #[tokio::test]
    async fn results_are_sorted_whatever_the_completion_order() {
        let h = harness();
        let id = h.mem.commit(None, "x").unwrap();
        let names = ["delta", "alpha", "charlie", "bravo", "echo"];
        for name in names {
            h.mem.set_refs(name, RefState::new().with("main", id.clone())).unwrap();
        }
        let m = manifest(names.iter().map(|n| repo(n, &[])).collect());
        let orchestrator = h.orchestrator.clone().with_concurrency(2);
        assert_eq!(orchestrator.concurrency_for(&m), 2);

        let report = orchestrator.run(&m, CancellationToken::new()).await;
        let order: Vec<&str> = report.results.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(order, vec!["alpha", "bravo", "charlie", "delta", "echo"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn cancelled_run_skips_every_repository() {
        let h = harness();
        let id = h.mem.commit(None, "x").unwrap();
        h.mem.set_refs("demo", RefState::new().with("main", id)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h
            .orchestrator
            .run(&manifest(vec![repo("demo", &["backup"])]), cancel)
            .await;
        let result = report.result("demo").unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.errors[0].kind, ErrorKind::Cancelled);
        assert!(h.mem.calls().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recreated_mirror_discards_recorded_local_state() {
        let h = harness();
        let h1 = h.mem.commit(None, "h1").unwrap();
        let old = h.mem.commit(None, "legacy").unwrap();
        let h2 = h.mem.commit(Some(&h1), "h2").unwrap();
        h.mem
            .set_refs("demo", RefState::new().with("main", h2.clone()).with("tag", old.clone()))
            .unwrap();
        let mut stale = SyncRecord::new("demo");
        stale.set_local(RefState::new().with("main", h1).with("tag", old.clone()));
        h.store.save(&stale).unwrap();

        let report = run(&h, &manifest(vec![repo("demo", &[])])).await;
        let result = report.result("demo").unwrap();
        assert!(result.is_success());
        assert_eq!(result.applied.get("local"), Some(&2));
        let expected = RefState::new().with("main", h2).with("tag", old);
        assert_eq!(
            h.mem
                .mirror_refs(&muld_transport::LocalMirror::new("/mirrors/demo.git"))
                .unwrap(),
            expected
        );
        assert_eq!(h.store.load("demo").unwrap().unwrap().local, expected);
    }

    struct PanickingTransport;

    #[async_trait::async_trait]
    impl muld_transport::Transport for PanickingTransport {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn list_refs(&self, _: &muld_transport::Endpoint) -> muld_transport::TransportResult<RefState> {
            panic!("backend bug")
        }
        async fn prepare_mirror(&self, _: &muld_transport::LocalMirror) -> muld_transport::TransportResult<bool> {
            Ok(false)
        }
        async fn fetch(
            &self,
            _: &muld_transport::LocalMirror,
            _: &muld_transport::Endpoint,
            _: &[muld_transport::RefUpdate],
        ) -> muld_transport::TransportResult<RefState> {
            Ok(RefState::new())
        }
        async fn push(
            &self,
            _: &muld_transport::LocalMirror,
            _: &muld_transport::Endpoint,
            _: &[muld_transport::RefUpdate],
            _: bool,
        ) -> muld_transport::TransportResult<muld_transport::PushReport> {
            Ok(muld_transport::PushReport::default())
        }
    }

    #[tokio::test]
    async fn panicked_repository_task_is_reported_as_aborted() {
        let h = harness();
        let id = h.mem.commit(None, "x").unwrap();
        h.mem.set_refs("good", RefState::new().with("main", id)).unwrap();
        let mut registry = TransportRegistry::new();
        registry.register(Scheme::Memory, Arc::new(h.mem.clone()));
        registry.register(Scheme::Other("boom".into()), Arc::new(PanickingTransport));
        let orchestrator = Orchestrator::new(registry, h.store.clone());

        let boom = RepositorySpec::new("boom", "boom://x", "/mirrors/boom.git");
        let m = manifest(vec![boom, repo("good", &[])]);
        let report = orchestrator.run(&m, CancellationToken::new()).await;

        let result = report.result("boom").unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.phase, RepoPhase::Failed);
        assert_eq!(result.errors[0].kind, ErrorKind::Aborted);
        assert!(report.result("good").unwrap().is_success());
    }

    #[tokio::test]
    async fn file_store_survives_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mem = MemoryTransport::new();
        let h1 = mem.commit(None, "h1").unwrap();
        mem.set_refs("demo", RefState::new().with("main", h1.clone())).unwrap();
        let m = manifest(vec![repo("demo", &["backup"])]);

        let orchestrator = || {
            let mut registry = TransportRegistry::new();
            registry.register(Scheme::Memory, Arc::new(mem.clone()));
            let store = FileStateStore::open(dir.path()).unwrap();
            Orchestrator::new(registry, Arc::new(store))
        };

        assert!(orchestrator().run(&m, CancellationToken::new()).await.is_success());
        mem.clear_calls().unwrap();
        assert!(orchestrator().run(&m, CancellationToken::new()).await.is_success());
        assert_eq!(transfers(&mem.calls().unwrap()), 0);

        let record = FileStateStore::open(dir.path()).unwrap().load("demo").unwrap().unwrap();
        assert_eq!(record.downstream_state("backup").get("main"), Some(&h1));
        assert_eq!(record.local.get("main"), Some(&h1));
    }
}
