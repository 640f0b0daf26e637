//! Ref snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::ContentId;
use crate::filter::RefFilter;

/// Observed refs of one endpoint (upstream, local mirror or a downstream) at
/// one point in time.
///
/// Keys are unique ref names. The map is ordered so that everything derived
/// from a snapshot (plans, reports, persisted records) is reproducible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefState {
    refs: BTreeMap<String, ContentId>,
}

impl RefState {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used while assembling a snapshot from a listing.
    pub fn with(mut self, name: impl Into<String>, id: ContentId) -> Self {
        self.refs.insert(name.into(), id);
        self
    }

    /// The content id a ref resolves to, if present.
    pub fn get(&self, name: &str) -> Option<&ContentId> {
        self.refs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Iterate refs in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContentId)> {
        self.refs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Ref names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.refs.keys().map(String::as_str)
    }

    /// A new snapshot holding only the refs selected by `filter`.
    pub fn filtered(&self, filter: &RefFilter) -> RefState {
        self.iter()
            .filter(|(name, _)| filter.matches(name))
            .map(|(name, id)| (name.to_string(), id.clone()))
            .collect()
    }
}

impl FromIterator<(String, ContentId)> for RefState {
    fn from_iter<I: IntoIterator<Item = (String, ContentId)>>(iter: I) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RefState {
    type Item = (String, ContentId);
    type IntoIter = std::collections::btree_map::IntoIter<String, ContentId>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.into_iter()
    }
}
