//! Fold plan: the order in which dependency categories are folded, per kind.

use crate::types::{DependencyCategory, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoldPlan {
    orders: BTreeMap<NodeKind, Vec<DependencyCategory>>,
}

impl Default for FoldPlan {
    fn default() -> Self {
        use DependencyCategory::*;

        let mut orders = BTreeMap::new();
        orders.insert(NodeKind::LeafUnit, vec![Caller, Callee]);
        orders.insert(NodeKind::HierarchicalUnit, vec![Ancestor, Member]);
        orders.insert(NodeKind::Container, vec![Child, Member]);
        orders.insert(NodeKind::Root, vec![Child]);
        Self { orders }
    }
}

impl FoldPlan {
    pub fn with_order(mut self, kind: NodeKind, order: Vec<DependencyCategory>) -> Self {
        self.orders.insert(kind, order);
        self
    }

    /// Full category order for `kind`: the configured list first, then any
    /// category it leaves out in declaration order. Raw content always folds
    /// before every category.
    pub fn order_for(&self, kind: NodeKind) -> Vec<DependencyCategory> {
        let mut order: Vec<DependencyCategory> = Vec::with_capacity(DependencyCategory::ALL.len());
        for category in self.orders.get(&kind).into_iter().flatten() {
            if !order.contains(category) {
                order.push(*category);
            }
        }
        for category in DependencyCategory::ALL {
            if !order.contains(&category) {
                order.push(category);
            }
        }
        order
    }
}
