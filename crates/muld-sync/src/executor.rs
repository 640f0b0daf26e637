//! The sync executor: applies a local plan, then fans out to downstreams.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use muld_manifest::{RepositorySpec, RetryPolicy};
use muld_refs::RefState;
use muld_state::{StateError, StateStore, SyncRecord};
use muld_transport::{PushReport, TransportRegistry};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::plan::{apply_updates, Stage, SyncPlan};
use crate::planner::{self, plan_downstream};
use crate::report::{RefError, RepoPhase, RunResult};
use crate::retry::with_retry;

type PushOutcome = (usize, String, SyncResult<PushReport>);

/// Run a state store call on the blocking pool.
pub(crate) async fn blocking<T, F>(store: &Arc<dyn StateStore>, op: F) -> muld_state::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn StateStore) -> muld_state::Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StateError::Interrupted(e.to_string()))?
}

/// Plan every listed downstream against `local`, keyed by downstream index.
pub(crate) fn plan_downstreams(
    spec: &RepositorySpec,
    local: &RefState,
    observed: &BTreeMap<usize, RefState>,
) -> (Vec<(usize, SyncPlan)>, Vec<RefError>) {
    let mut plans = Vec::with_capacity(observed.len());
    let mut errors = Vec::new();
    for (&index, live) in observed {
        let Some(downstream) = spec.downstreams.get(index) else {
            continue;
        };
        match plan_downstream(spec, downstream, local, live) {
            Ok(plan) => plans.push((index, plan)),
            Err(e) => errors.push(RefError::new(
                Stage::Downstream(downstream.name.clone()),
                ErrorKind::Plan,
                e.to_string(),
            )),
        }
    }
    (plans, errors)
}

/// Drives transports for one repository and is the only writer of its
/// [`SyncRecord`] during a run.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<TransportRegistry>,
    store: Arc<dyn StateStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        registry: Arc<TransportRegistry>,
        store: Arc<dyn StateStore>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            store,
            retry,
            cancel,
        }
    }

    /// Execute `local_plan`, then sync every downstream from the new local
    /// state.
    ///
    /// `record` is the repository's last persisted record (or a fresh one on
    /// first sync). Every confirmed step is saved before the next one starts.
    /// The local mirror is only touched when a fetch or a push needs it.
    #[instrument(skip_all, fields(repository = %spec.name))]
    pub async fn execute(
        &self,
        spec: &RepositorySpec,
        local_plan: &SyncPlan,
        mut record: SyncRecord,
    ) -> RunResult {
        let mut result = RunResult::new(&spec.name);
        result.phase = RepoPhase::Executing;

        let mirror_ready = local_plan.has_changes();
        let local = if mirror_ready {
            self.local_stage(spec, local_plan, &mut record, &mut result).await
        } else {
            debug!("local mirror up to date");
            Some(record.local.clone())
        };
        let Some(mut local) = local else {
            return self.fail(&mut record, result).await;
        };

        let (observed, listing_errors) = self.observe_downstreams(spec).await;
        result.errors.extend(listing_errors);
        let (mut plans, mut plan_errors) = plan_downstreams(spec, &local, &observed);

        if !mirror_ready && plans.iter().any(|(_, plan)| plan.has_changes()) {
            // pushes read from the mirror, so make sure it still exists
            let Some(state) = self.local_stage(spec, local_plan, &mut record, &mut result).await else {
                return self.fail(&mut record, result).await;
            };
            if state != local {
                local = state;
                (plans, plan_errors) = plan_downstreams(spec, &local, &observed);
            }
        }
        result.errors.extend(plan_errors);

        let recorded = self
            .push_downstreams(spec, plans, observed, &mut record, &mut result)
            .await;
        self.persist_last_error(&mut record, &result).await;
        result.finish(recorded);
        info!(status = %result.status, applied = result.total_applied(), errors = result.errors.len(), "repository done");
        result
    }

    async fn fail(&self, record: &mut SyncRecord, mut result: RunResult) -> RunResult {
        self.persist_last_error(record, &result).await;
        result.finish(false);
        result
    }

    /// Prepare the mirror and fetch the plan's changes into it.
    ///
    /// Returns the confirmed local state, or `None` when the stage failed.
    async fn local_stage(
        &self,
        spec: &RepositorySpec,
        plan: &SyncPlan,
        record: &mut SyncRecord,
        result: &mut RunResult,
    ) -> Option<RefState> {
        if self.cancel.is_cancelled() {
            result.errors.push(RefError::new(
                Stage::Local,
                ErrorKind::Cancelled,
                "run cancelled before fetch",
            ));
            return None;
        }
        match self.fetch_into_mirror(spec, plan, record, result).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "local stage failed");
                result.errors.push(RefError::new(Stage::Local, e.kind(), e.to_string()));
                None
            }
        }
    }

    async fn fetch_into_mirror(
        &self,
        spec: &RepositorySpec,
        plan: &SyncPlan,
        record: &mut SyncRecord,
        result: &mut RunResult,
    ) -> SyncResult<RefState> {
        let transport = self.registry.resolve(&spec.upstream)?;
        let created = with_retry(&self.retry, &self.cancel, "prepare-mirror", || {
            transport.prepare_mirror(&spec.local)
        })
        .await?;

        let rebuilt;
        let plan = if created && !record.local.is_empty() {
            warn!(mirror = %spec.local, "local mirror was recreated, refetching every ref");
            record.local = RefState::new();
            rebuilt = planner::plan(spec, &plan.source_state(), &record.local)?;
            &rebuilt
        } else {
            plan
        };
        if !plan.has_changes() {
            return Ok(record.local.clone());
        }

        let updates = plan.changes();
        info!(refs = updates.len(), upstream = %spec.upstream, "fetching into local mirror");
        let state = with_retry(&self.retry, &self.cancel, "fetch", || {
            transport.fetch(&spec.local, &spec.upstream, &updates)
        })
        .await?;

        record.set_local(state.clone());
        self.save(record).await?;
        result.record_applied(&Stage::Local, updates.len());
        Ok(state)
    }

    /// List the live refs of every downstream. One that cannot be listed is
    /// reported and left out of the run.
    pub(crate) async fn observe_downstreams(
        &self,
        spec: &RepositorySpec,
    ) -> (BTreeMap<usize, RefState>, Vec<RefError>) {
        let mut observed = BTreeMap::new();
        let mut errors = Vec::new();
        for (index, downstream) in spec.downstreams.iter().enumerate() {
            let stage = Stage::Downstream(downstream.name.clone());
            if self.cancel.is_cancelled() {
                errors.push(RefError::new(stage, ErrorKind::Cancelled, "run cancelled before push"));
                continue;
            }
            let listed: SyncResult<RefState> = match self.registry.resolve(&downstream.endpoint) {
                Ok(transport) => {
                    with_retry(&self.retry, &self.cancel, "list-refs", || {
                        transport.list_refs(&downstream.endpoint)
                    })
                    .await
                }
                Err(e) => Err(e.into()),
            };
            match listed {
                Ok(state) => {
                    observed.insert(index, state);
                }
                Err(e) => {
                    warn!(downstream = %downstream.name, error = %e, "cannot list downstream refs");
                    errors.push(RefError::new(stage, e.kind(), e.to_string()));
                }
            }
        }
        (observed, errors)
    }

    /// Push every plan with changes concurrently, then fold the outcomes in
    /// manifest order. Returns `false` when the record could not be saved.
    async fn push_downstreams(
        &self,
        spec: &RepositorySpec,
        plans: Vec<(usize, SyncPlan)>,
        mut observed: BTreeMap<usize, RefState>,
        record: &mut SyncRecord,
        result: &mut RunResult,
    ) -> bool {
        let mut pushes: JoinSet<PushOutcome> = JoinSet::new();
        let mut spawned = BTreeSet::new();

        for (index, plan) in plans {
            let Some(downstream) = spec.downstreams.get(index) else {
                continue;
            };
            if !plan.has_changes() {
                debug!(downstream = %downstream.name, "downstream up to date");
                continue;
            }
            let stage = Stage::Downstream(downstream.name.clone());
            if self.cancel.is_cancelled() {
                result.errors.push(RefError::new(
                    stage,
                    ErrorKind::Cancelled,
                    "run cancelled before push",
                ));
                continue;
            }
            let transport = match self.registry.resolve(&downstream.endpoint) {
                Ok(t) => t,
                Err(e) => {
                    let e = SyncError::from(e);
                    result.errors.push(RefError::new(stage, e.kind(), e.to_string()));
                    continue;
                }
            };

            let updates = plan.changes();
            let name = downstream.name.clone();
            let endpoint = downstream.endpoint.clone();
            let force = downstream.force;
            let mirror = spec.local.clone();
            let retry = self.retry.clone();
            let cancel = self.cancel.clone();
            info!(downstream = %name, refs = updates.len(), force, "pushing");
            pushes.spawn(async move {
                let outcome = with_retry(&retry, &cancel, "push", || {
                    transport.push(&mirror, &endpoint, &updates, force)
                })
                .await;
                (index, name, outcome)
            });
            spawned.insert(index);
        }

        let mut outcomes = Vec::with_capacity(spawned.len());
        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "push task did not complete"),
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        for (index, _, _) in &outcomes {
            spawned.remove(index);
        }
        for index in spawned {
            if let Some(downstream) = spec.downstreams.get(index) {
                result.errors.push(RefError::new(
                    Stage::Downstream(downstream.name.clone()),
                    ErrorKind::Aborted,
                    "push task aborted",
                ));
            }
        }

        let mut outcomes = outcomes.into_iter();
        while let Some((index, name, outcome)) = outcomes.next() {
            let live = observed.remove(&index).unwrap_or_default();
            if let Err(e) = self.fold_push(&name, &live, outcome, record, result).await {
                error!(downstream = %name, error = %e, "cannot save sync record");
                let e = SyncError::from(e);
                result.errors.push(RefError::new(Stage::Downstream(name), e.kind(), e.to_string()));
                for (_, rest, _) in outcomes.by_ref() {
                    result.errors.push(RefError::new(
                        Stage::Downstream(rest),
                        ErrorKind::StateStore,
                        "push outcome not recorded, the state store failed",
                    ));
                }
                return false;
            }
        }
        true
    }

    /// Apply one push outcome to the record and result, saving on success.
    /// Only a failed save is returned as an error.
    async fn fold_push(
        &self,
        name: &str,
        observed: &RefState,
        outcome: SyncResult<PushReport>,
        record: &mut SyncRecord,
        result: &mut RunResult,
    ) -> muld_state::Result<()> {
        let stage = Stage::Downstream(name.to_string());
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(downstream = %name, error = %e, "push failed");
                result.errors.push(RefError::new(stage, e.kind(), e.to_string()));
                return Ok(());
            }
        };

        for rejection in &report.rejected {
            warn!(downstream = %name, ref_name = %rejection.name, reason = %rejection.reason, "ref rejected");
            result.errors.push(
                RefError::new(
                    stage.clone(),
                    ErrorKind::TransportRejected,
                    format!("rejected: {}", rejection.reason),
                )
                .for_ref(&rejection.name),
            );
        }
        if report.accepted.is_empty() {
            return Ok(());
        }

        record.set_downstream(name, apply_updates(observed, &report.accepted));
        self.save(record).await?;
        result.record_applied(&stage, report.accepted.len());
        Ok(())
    }

    async fn save(&self, record: &SyncRecord) -> muld_state::Result<()> {
        let record = record.clone();
        blocking(&self.store, move |store| store.save(&record)).await
    }

    /// Keep `last_error` in step with the outcome. Failure here is logged
    /// only: the snapshots already saved stay valid.
    async fn persist_last_error(&self, record: &mut SyncRecord, result: &RunResult) {
        let last_error = result.errors.first().map(ToString::to_string);
        if record.last_error == last_error {
            return;
        }
        record.set_error(last_error);
        if let Err(e) = self.save(record).await {
            warn!(error = %e, "could not record last error");
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
