//! Per-run change tracker
//!
//! Records which nodes were regenerated (or failed) earlier in the current run
//! so dependents in later levels and passes can see that their inputs moved.
//! Never persisted.

use crate::types::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMark {
    Changed,
    Failed,
}

#[derive(Debug, Default)]
pub struct RuntimeStatus {
    marks: RwLock<HashMap<NodeId, RuntimeMark>>,
}

impl RuntimeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.marks.write().clear();
    }

    pub fn set_changed(&self, id: &NodeId) {
        self.marks.write().insert(id.clone(), RuntimeMark::Changed);
    }

    pub fn set_failed(&self, id: &NodeId) {
        self.marks.write().insert(id.clone(), RuntimeMark::Failed);
    }

    pub fn mark(&self, id: &NodeId) -> Option<RuntimeMark> {
        self.marks.read().get(id).copied()
    }

    pub fn any_changed<'a>(&self, ids: impl IntoIterator<Item = &'a NodeId>) -> bool {
        self.any_marked(ids, RuntimeMark::Changed)
    }

    pub fn any_failed<'a>(&self, ids: impl IntoIterator<Item = &'a NodeId>) -> bool {
        self.any_marked(ids, RuntimeMark::Failed)
    }

    pub fn changed_count(&self) -> usize {
        self.marks
            .read()
            .values()
            .filter(|m| **m == RuntimeMark::Changed)
            .count()
    }

    fn any_marked<'a>(&self, ids: impl IntoIterator<Item = &'a NodeId>, wanted: RuntimeMark) -> bool {
        let marks = self.marks.read();
        ids.into_iter().any(|id| marks.get(id) == Some(&wanted))
    }
}
