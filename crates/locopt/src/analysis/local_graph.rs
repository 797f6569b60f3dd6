//! The single-assignment oracle: reaching writes per read, the write →
//! reads inverse, and which locals are assigned at most once.
//!
//! Built on the CFG and set-reach graph under the explicit-initialization
//! scope, then translated back: the scaffolding write for each local is
//! reported as `None`, the implicit initial value. A read can therefore
//! observe a mix of an implicit value and explicit writes, which is what
//! disqualifies a conditionally-assigned local from being single-assigned.

use crate::analysis::set_reach::SetReach;
use crate::cfg::{liveness, Cfg};
use crate::ir::local_utils::ExplicitInits;
use crate::ir::types::{ExprId, Function, LocalId};
use std::collections::{BTreeMap, BTreeSet};

/// A reference to a write: `None` is the implicit initialization of the
/// read's own index (parameter value or zero).
pub type WriteRef = Option<ExprId>;

#[derive(Debug, Default)]
pub struct LocalGraph {
    /// read → writes that may flow to it, implicit initialization included.
    pub get_sets: BTreeMap<ExprId, BTreeSet<WriteRef>>,
    /// explicit write → reads it may flow to.
    influences: BTreeMap<ExprId, BTreeSet<ExprId>>,
    single_assigned: Vec<bool>,
}

impl LocalGraph {
    /// Computes the graph. Neutralizes unreachable code in `func` as a side
    /// effect of CFG construction, which preserves semantics.
    pub fn compute(func: &mut Function) -> Self {
        let inits = ExplicitInits::install(func);
        let scaffolding: BTreeSet<ExprId> = inits.init_writes.iter().copied().collect();

        let mut cfg = Cfg::build(func);
        liveness::compute(func, &mut cfg);
        let reach = SetReach::compute(func, &cfg);

        let mut get_sets: BTreeMap<ExprId, BTreeSet<WriteRef>> = BTreeMap::new();
        let mut influences: BTreeMap<ExprId, BTreeSet<ExprId>> = BTreeMap::new();
        for (&read, writes) in &reach.get_sets {
            let translated: BTreeSet<WriteRef> = writes
                .iter()
                .map(|&w| {
                    if scaffolding.contains(&w) {
                        None
                    } else {
                        Some(w)
                    }
                })
                .collect();
            for write in translated.iter().flatten() {
                influences.entry(*write).or_default().insert(read);
            }
            get_sets.insert(read, translated);
        }

        inits.uninstall(func);

        // A local is single-assigned when every one of its reads observes
        // exactly one write reference — the same one. A write no read
        // observes still disqualifies the index: it is a second assignment
        // site, even if a dead one.
        let mut refs_per_index: BTreeMap<LocalId, BTreeSet<WriteRef>> = BTreeMap::new();
        for (&read, writes) in &get_sets {
            let index = func.get_index(read);
            let entry = refs_per_index.entry(index).or_default();
            for &write in writes {
                entry.insert(write);
            }
        }
        func.visit_subtree(func.body, |id, expr| {
            if let crate::ir::types::ExprKind::LocalSet { index, .. } = &expr.kind {
                let refs = refs_per_index.entry(*index).or_default();
                if refs.len() == 1 && !refs.contains(&Some(id)) {
                    refs.insert(None);
                }
            }
        });
        let single_assigned = (0..func.num_locals())
            .map(|i| {
                refs_per_index
                    .get(&LocalId(i as u32))
                    .is_some_and(|refs| refs.len() == 1)
            })
            .collect();

        Self {
            get_sets,
            influences,
            single_assigned,
        }
    }

    /// True if `index` is written at most once along every execution path.
    pub fn is_single_assigned(&self, index: LocalId) -> bool {
        self.single_assigned[index.index()]
    }

    /// The writes that may reach `read`.
    pub fn reaching_writes(&self, read: ExprId) -> &BTreeSet<WriteRef> {
        static EMPTY: BTreeSet<WriteRef> = BTreeSet::new();
        self.get_sets.get(&read).unwrap_or(&EMPTY)
    }

    /// The reads an explicit write may flow to.
    pub fn influences(&self, write: ExprId) -> &BTreeSet<ExprId> {
        static EMPTY: BTreeSet<ExprId> = BTreeSet::new();
        self.influences.get(&write).unwrap_or(&EMPTY)
    }
}
