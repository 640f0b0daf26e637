use std::fmt;

use muld_refs::ContentId;
use serde::{Deserialize, Serialize};

/// One ref change to apply at a target: the local mirror on fetch, a
/// downstream on push. `new = None` deletes the ref.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    pub name: String,
    pub old: Option<ContentId>,
    pub new: Option<ContentId>,
}

impl RefUpdate {
    pub fn set(name: impl Into<String>, old: Option<ContentId>, new: ContentId) -> Self {
        Self {
            name: name.into(),
            old,
            new: Some(new),
        }
    }

    pub fn delete(name: impl Into<String>, old: ContentId) -> Self {
        Self {
            name: name.into(),
            old: Some(old),
            new: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.new.is_none()
    }
}

/// Why a remote refused one ref.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The update would discard remote history and force was not allowed.
    NonFastForward,
    /// Any other refusal reported by the remote (hooks, protected refs, ...).
    Remote(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFastForward => f.write_str("non-fast-forward"),
            Self::Remote(reason) => f.write_str(reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRejection {
    pub name: String,
    pub reason: RejectReason,
}

/// Confirmed per-ref outcome of one push.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushReport {
    pub accepted: Vec<RefUpdate>,
    pub rejected: Vec<RefRejection>,
}

impl PushReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_update_constructors() {
        let id = ContentId::from_data(b"a");
        let set = RefUpdate::set("main", None, id.clone());
        assert!(!set.is_delete());
        let del = RefUpdate::delete("legacy", id);
        assert!(del.is_delete());
        assert!(del.old.is_some());
    }

    #[test]
    fn reject_reason_display() {
        assert_eq!(RejectReason::NonFastForward.to_string(), "non-fast-forward");
        assert_eq!(
            RejectReason::Remote("pre-receive hook declined".into()).to_string(),
            "pre-receive hook declined"
        );
    }

    #[test]
    fn push_report_defaults_clean() {
        assert!(PushReport::default().is_clean());
    }
}
