//! The sync planner: a pure diff of two ref snapshots.

use std::collections::BTreeSet;

use muld_manifest::{DownstreamSpec, RepositorySpec};
use muld_refs::{validate_ref_name, RefFilter, RefState};

use crate::error::PlanError;
use crate::plan::{ActionKind, RefAction, Stage, SyncPlan};

/// Plan the local stage: bring the mirror in line with the observed upstream.
pub fn plan(
    spec: &RepositorySpec,
    observed_upstream: &RefState,
    observed_local: &RefState,
) -> Result<SyncPlan, PlanError> {
    diff(
        &spec.name,
        Stage::Local,
        &spec.filter,
        spec.prune,
        observed_upstream,
        observed_local,
    )
}

/// Plan one downstream stage: bring `downstream` in line with the local
/// mirror.
pub fn plan_downstream(
    spec: &RepositorySpec,
    downstream: &DownstreamSpec,
    local: &RefState,
    observed_downstream: &RefState,
) -> Result<SyncPlan, PlanError> {
    diff(
        &spec.name,
        Stage::Downstream(downstream.name.clone()),
        &spec.filter,
        spec.prune,
        local,
        observed_downstream,
    )
}

fn diff(
    repository: &str,
    stage: Stage,
    filter: &RefFilter,
    prune: bool,
    source: &RefState,
    target: &RefState,
) -> Result<SyncPlan, PlanError> {
    let source = source.filtered(filter);
    let target = target.filtered(filter);

    let invalid: BTreeSet<String> = source
        .names()
        .chain(target.names())
        .filter(|name| validate_ref_name(name).is_err())
        .map(str::to_string)
        .collect();
    if !invalid.is_empty() {
        return Err(PlanError::InvalidRefNames {
            stage,
            names: invalid.into_iter().collect(),
        });
    }

    let names: BTreeSet<&str> = source.names().chain(target.names()).collect();
    let actions = names
        .into_iter()
        .filter_map(|name| {
            let current = target.get(name).cloned();
            let (kind, target_id, orphaned) = match (&current, source.get(name)) {
                (None, Some(id)) => (ActionKind::Create, Some(id.clone()), false),
                (Some(have), Some(id)) if have == id => (ActionKind::NoOp, Some(id.clone()), false),
                (Some(_), Some(id)) => (ActionKind::Update, Some(id.clone()), false),
                (Some(_), None) if prune => (ActionKind::Delete, None, false),
                (Some(have), None) => (ActionKind::NoOp, Some(have.clone()), true),
                (None, None) => return None,
            };
            Some(RefAction {
                name: name.to_string(),
                kind,
                current,
                target: target_id,
                orphaned,
            })
        })
        .collect();

    Ok(SyncPlan {
        repository: repository.to_string(),
        stage,
        actions,
    })
}
