//! Local-variable utilities shared by passes.

use crate::ir::builder::Builder;
use crate::ir::effects::EffectAnalyzer;
use crate::ir::types::{Expr, ExprId, ExprKind, Function, LocalId};

/// Removes a write that is known to be unneeded, preserving semantics.
///
/// A tee is replaced by its value node, so the parent still sees the value.
/// A plain set keeps a `Drop` of its value when the value has side effects,
/// and becomes `Nop` otherwise. The replacement happens in place at the
/// write's own id; the caller demotes any liveness action that pointed at it.
pub fn remove_set(func: &mut Function, set_id: ExprId) {
    let (value, tee) = match &func.arena[set_id].kind {
        ExprKind::LocalSet { value, tee, .. } => (*value, *tee),
        other => panic!("remove_set on non-set node {set_id}: {other:?}"),
    };
    if tee {
        func.arena[set_id] = func.arena[value].clone();
    } else if EffectAnalyzer::has_side_effects(func, value) {
        func.arena[set_id] = Expr {
            kind: ExprKind::Drop { value },
            ty: None,
        };
    } else {
        func.arena[set_id] = Expr {
            kind: ExprKind::Nop,
            ty: None,
        };
    }
}

/// Per-index read counts over a function body.
pub struct LocalGetCounter {
    pub num: Vec<u32>,
}

impl LocalGetCounter {
    pub fn analyze(func: &Function) -> Self {
        let mut num = vec![0u32; func.num_locals()];
        func.visit_subtree(func.body, |_, expr| {
            if let ExprKind::LocalGet { index } = &expr.kind {
                num[index.index()] += 1;
            }
        });
        Self { num }
    }
}

/// Removes trivially unneeded writes: writes to an index with no possible
/// read, and writes that store the index's own current value (directly or
/// through a tee chain). Returns whether anything was removed; callers that
/// want a fixpoint run it again until it reports `false`.
pub struct UnneededSetRemover;

impl UnneededSetRemover {
    pub fn run(func: &mut Function) -> bool {
        let counter = LocalGetCounter::analyze(func);
        let mut sets = vec![];
        func.visit_subtree(func.body, |id, expr| {
            if matches!(expr.kind, ExprKind::LocalSet { .. }) {
                sets.push(id);
            }
        });

        let mut removed = false;
        for set_id in sets {
            let index = func.set_index(set_id);
            if counter.num[index.index()] == 0 {
                remove_set(func, set_id);
                removed = true;
                continue;
            }
            // Setting the value the local already holds: look through tee
            // chains to the operative copy source.
            let mut value = func.set_value(set_id);
            loop {
                match &func.arena[value].kind {
                    ExprKind::LocalSet {
                        index: inner,
                        value: inner_value,
                        ..
                    } => {
                        if *inner == index {
                            remove_set(func, set_id);
                            removed = true;
                        } else {
                            value = *inner_value;
                            continue;
                        }
                    }
                    ExprKind::LocalGet { index: inner } => {
                        if *inner == index {
                            remove_set(func, set_id);
                            removed = true;
                        }
                    }
                    _ => {}
                }
                break;
            }
        }
        removed
    }
}

/// Scoped transformation that makes every local explicitly initialized.
///
/// On install, the body becomes a block that first writes every parameter
/// (value: a call-like placeholder of the right type) and every declared
/// variable (value: the typed zero literal), then runs the original body.
/// Analyses running under the scope therefore see an explicit write for
/// every local. `uninstall` restores the original body; the scaffolding
/// nodes are orphaned in the arena and reclaimed with the function.
pub struct ExplicitInits {
    old_body: ExprId,
    /// The prepended writes, one per local, in index order.
    pub init_writes: Vec<ExprId>,
}

impl ExplicitInits {
    /// The body the scope wrapped; rewrites that must survive the scope
    /// stay within it.
    pub fn old_body(&self) -> ExprId {
        self.old_body
    }

    pub fn install(func: &mut Function) -> Self {
        let old_body = func.body;
        let num_params = func.num_params();
        let num_locals = func.num_locals();
        let mut init_writes = Vec::with_capacity(num_locals);
        let mut children = Vec::with_capacity(num_locals + 1);
        for i in 0..num_locals {
            let index = LocalId(i as u32);
            let ty = func.local_type(index);
            let mut b = Builder::new(&mut func.arena);
            let value = if i < num_params {
                b.placeholder_call(ty)
            } else {
                b.zero(ty)
            };
            let set = b.local_set(index, value);
            init_writes.push(set);
            children.push(set);
        }
        children.push(old_body);
        let ty = func.arena[old_body].ty;
        func.body = func.arena.alloc(Expr {
            kind: ExprKind::Block {
                label: None,
                children,
            },
            ty,
        });
        Self {
            old_body,
            init_writes,
        }
    }

    pub fn uninstall(self, func: &mut Function) {
        func.body = self.old_body;
    }
}
