//! Plan types: what one stage has to do to bring a target in line with its
//! source.

use std::fmt;

use muld_refs::{ContentId, RefState};
use muld_transport::RefUpdate;
use serde::{Serialize, Serializer};

/// Which hop of the pipeline a plan or error belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// The repository as a whole: its manifest entry or its sync record.
    Repository,
    /// Upstream into the local mirror.
    Local,
    /// Local mirror into the named downstream.
    Downstream(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => f.write_str("repository"),
            Self::Local => f.write_str("local"),
            Self::Downstream(name) => write!(f, "downstream:{name}"),
        }
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    NoOp,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        f.write_str(s)
    }
}

/// One ref's planned change.
///
/// `current` is what the target holds now, `target` what it should hold
/// afterwards. A delete has no `target`; a create has no `current`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefAction {
    pub name: String,
    pub kind: ActionKind,
    pub current: Option<ContentId>,
    pub target: Option<ContentId>,
    /// A no-op kept only because deletion propagation is off: the ref is gone
    /// from the source but retained at the target.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub orphaned: bool,
}

impl RefAction {
    pub fn is_change(&self) -> bool {
        self.kind != ActionKind::NoOp
    }

    fn to_update(&self) -> RefUpdate {
        RefUpdate {
            name: self.name.clone(),
            old: self.current.clone(),
            new: self.target.clone(),
        }
    }
}

impl fmt::Display for RefAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn short(id: &Option<ContentId>) -> &str {
            id.as_ref().map_or("-", ContentId::short)
        }
        write!(f, "{:<7} {}", self.kind.to_string(), self.name)?;
        match self.kind {
            ActionKind::Create => write!(f, " -> {}", short(&self.target)),
            ActionKind::Update => {
                write!(f, " {} -> {}", short(&self.current), short(&self.target))
            }
            ActionKind::Delete => write!(f, " (was {})", short(&self.current)),
            ActionKind::NoOp if self.orphaned => f.write_str(" (orphaned, retained)"),
            ActionKind::NoOp => Ok(()),
        }
    }
}

/// Ordered actions for one stage of one repository. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub repository: String,
    pub stage: Stage,
    /// Sorted by ref name.
    pub actions: Vec<RefAction>,
}

impl SyncPlan {
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(RefAction::is_change)
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// The create, update and delete actions as transport updates.
    pub fn changes(&self) -> Vec<RefUpdate> {
        self.actions
            .iter()
            .filter(|a| a.is_change())
            .map(RefAction::to_update)
            .collect()
    }

    /// The filtered source refs the plan was computed from. Orphaned refs
    /// are not part of the source and are left out.
    pub fn source_state(&self) -> RefState {
        self.actions
            .iter()
            .filter(|a| !a.orphaned)
            .filter_map(|a| a.target.clone().map(|id| (a.name.clone(), id)))
            .collect()
    }

    /// Project the plan onto `state` as if every change had been applied.
    pub fn apply_to(&self, state: &RefState) -> RefState {
        apply_updates(state, &self.changes())
    }
}

/// Apply confirmed updates to a snapshot, producing a new one.
pub fn apply_updates(state: &RefState, updates: &[RefUpdate]) -> RefState {
    let mut refs: std::collections::BTreeMap<String, ContentId> = state
        .iter()
        .map(|(name, id)| (name.to_string(), id.clone()))
        .collect();
    for update in updates {
        match &update.new {
            Some(id) => {
                refs.insert(update.name.clone(), id.clone());
            }
            None => {
                refs.remove(&update.name);
            }
        }
    }
    refs.into_iter().collect()
}
