//! The muld mirror synchronization engine.
//!
//! For every repository in a [`Manifest`](muld_manifest::Manifest) the engine
//! brings three places into agreement: the upstream it mirrors, a local bare
//! mirror, and any number of downstreams.
//!
//! # Flow
//!
//! 1. The [`Orchestrator`] lists the upstream refs and loads the repository's
//!    [`SyncRecord`](muld_state::SyncRecord).
//! 2. The [`planner`] diffs upstream against the recorded local state and
//!    produces a [`SyncPlan`]. Planning is pure and deterministic.
//! 3. The [`Executor`] fetches the planned refs into the local mirror, saves
//!    the confirmed local state, then lists every downstream's live refs,
//!    plans and pushes each one independently, and saves each confirmed
//!    downstream state as it arrives. A repository with nothing to change
//!    costs only ref listings.
//! 4. Results are gathered into a [`RunReport`] sorted by repository name.
//!
//! Deletions are only ever planned for repositories with `prune` enabled, and
//! non-fast-forward pushes only go through for downstreams marked `force`.
//!
//! # Modules
//!
//! - [`error`] — [`SyncError`], [`PlanError`] and the reported [`ErrorKind`]
//! - [`plan`] — [`SyncPlan`], [`RefAction`], [`Stage`]
//! - [`planner`] — [`plan()`] and [`plan_downstream`]
//! - [`retry`] — bounded exponential backoff
//! - [`executor`] — the [`Executor`]
//! - [`orchestrator`] — the [`Orchestrator`]
//! - [`report`] — [`RunResult`], [`RunReport`], [`PlanReport`]

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod report;
pub mod retry;

pub use error::{ErrorKind, PlanError, SyncError, SyncResult};
pub use executor::Executor;
pub use orchestrator::Orchestrator;
pub use plan::{apply_updates, ActionKind, RefAction, Stage, SyncPlan};
pub use planner::{plan, plan_downstream};
pub use report::{PlanReport, RefError, RepoPhase, RunReport, RunResult, RunStatus};
pub use retry::{backoff_delay, with_retry};
