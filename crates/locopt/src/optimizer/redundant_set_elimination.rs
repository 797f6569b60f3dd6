//! Eliminate redundant writes: if a local already holds the value being
//! written, the write can go. The common case is loops over zero-started
//! counters, where the zero-init already provides the first value.
//!
//! To see "the value the local holds just before the write", every write's
//! value is instrumented from
//!
//! ```text
//! (local.set $x (value))
//! ```
//!
//! into
//!
//! ```text
//! (local.set $x (block (drop (value)) (local.get $x)))
//! ```
//!
//! and the set-reach analysis is re-run on the instrumented body: the inner
//! read's reaching writes are exactly the writes whose value the local
//! holds at that point. If they all sit in one equivalence class and the
//! write itself is in it too, the write changes nothing and is removed.
//! Instrumentation is reverted unconditionally afterwards.
//!
//! This can extend live ranges (a kept early value stays live longer), so
//! it is best run after coalescing, with a cleanup pass for the drops it
//! leaves behind.

use crate::analysis::equivalence::Equivalences;
use crate::analysis::set_reach::SetReach;
use crate::cfg::{liveness, Cfg};
use crate::ir::builder::Builder;
use crate::ir::local_utils::ExplicitInits;
use crate::ir::types::{Expr, ExprId, ExprKind, Function};
use crate::optimizer::Pass;
use anyhow::Result;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Default)]
pub struct RedundantSetElimination;

impl RedundantSetElimination {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for RedundantSetElimination {
    fn name(&self) -> &'static str {
        "redundant-set-elimination"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn run_on_function(&mut self, func: &mut Function) -> Result<()> {
        if func.num_locals() == 0 {
            return Ok(());
        }
        debug!("redundant-set-elimination: {}", func.name);

        // Everything runs under the explicit-init scope, so parameter
        // values are distinct opaque writes and zero-inits are explicit
        // zero writes.
        let inits = ExplicitInits::install(func);

        // Equivalence classes over the un-instrumented body.
        let mut cfg = Cfg::build(func);
        liveness::compute(func, &mut cfg);
        let reach = SetReach::compute(func, &cfg);
        let equivalences = Equivalences::compute(func, &cfg, &reach);

        // Instrument the real writes (not the init scaffolding), then
        // recompute reach over the instrumented body.
        let instrumented = instrument(func, inits.old_body());
        let mut cfg2 = Cfg::build(func);
        liveness::compute(func, &mut cfg2);
        let reach2 = SetReach::compute(func, &cfg2);

        let mut unneeded: BTreeSet<ExprId> = BTreeSet::new();
        for &(write, _) in &instrumented {
            let before = instrumented_get(func, write);
            let reaching = reach2.sets_for(before);
            let Some(&first) = reaching.iter().next() else {
                continue;
            };
            // The previous value must be a single known class — one
            // reaching write, or several that are mutually equivalent.
            let previous_class = equivalences.class_of_set(first);
            if previous_class == 0 {
                continue;
            }
            if !reaching
                .iter()
                .all(|&w| equivalences.class_of_set(w) == previous_class)
            {
                continue;
            }
            if equivalences.class_of_set(write) == previous_class {
                unneeded.insert(write);
            }
        }

        un_instrument(func, &instrumented, &unneeded);
        inits.uninstall(func);
        Ok(())
    }
}

/// Wraps every write's value in the probe block. Returns each write with
/// its original value, in tree order.
fn instrument(func: &mut Function, root: ExprId) -> Vec<(ExprId, ExprId)> {
    let mut writes = vec![];
    func.visit_subtree(root, |id, expr| {
        if let ExprKind::LocalSet { index, value, .. } = &expr.kind {
            writes.push((id, *index, *value));
        }
    });
    let mut out = Vec::with_capacity(writes.len());
    for (write, index, value) in writes {
        let ty = func.local_type(index);
        let mut b = Builder::new(&mut func.arena);
        let dropped = b.drop_(value);
        let before = b.local_get(index, ty);
        let probe = b.block(vec![dropped, before]);
        match &mut func.arena[write].kind {
            ExprKind::LocalSet { value, .. } => *value = probe,
            _ => unreachable!(),
        }
        out.push((write, value));
    }
    out
}

/// The probe read holding the local's prior value.
fn instrumented_get(func: &Function, write: ExprId) -> ExprId {
    let probe = func.set_value(write);
    match &func.arena[probe].kind {
        ExprKind::Block { children, .. } if children.len() == 2 => children[1],
        other => panic!("write {write} is not instrumented: {other:?}"),
    }
}

/// Restores every write's value; unneeded writes are removed — a tee is
/// replaced by its value, a plain set by a drop of it.
///
/// Runs innermost-first: a removed tee is replaced by a copy of its value
/// node, which must itself be restored before the copy is taken.
fn un_instrument(func: &mut Function, instrumented: &[(ExprId, ExprId)], unneeded: &BTreeSet<ExprId>) {
    for &(write, original_value) in instrumented.iter().rev() {
        if unneeded.contains(&write) {
            if func.set_is_tee(write) {
                func.arena[write] = func.arena[original_value].clone();
            } else {
                func.arena[write] = Expr {
                    kind: ExprKind::Drop {
                        value: original_value,
                    },
                    ty: None,
                };
            }
        } else {
            match &mut func.arena[write].kind {
                ExprKind::LocalSet { value, .. } => *value = original_value,
                other => panic!("instrumented write {write} became {other:?}"),
            }
        }
    }
}
