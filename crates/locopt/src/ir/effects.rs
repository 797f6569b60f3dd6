//! Side-effect analysis.
//!
//! Opaque nodes store their effect profile when they are built; everything
//! the optimizer interprets (locals, control flow, constants) contributes
//! its effects structurally. The analyzer answers the two questions passes
//! ask: does a subtree have observable side effects, and do two subtrees
//! conflict if reordered.

use crate::ir::types::{ExprId, ExprKind, Function};
use bitflags::bitflags;

bitflags! {
    /// The side effects an expression may have.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Effect: u16 {
        /// Reads a local variable.
        const READS_LOCAL = 1 << 0;
        /// Writes a local variable.
        const WRITES_LOCAL = 1 << 1;
        /// Reads linear memory or other external state.
        const READS_STATE = 1 << 2;
        /// Writes linear memory or other external state.
        const WRITES_STATE = 1 << 3;
        /// May call out to another function.
        const CALLS = 1 << 4;
        /// May trap.
        const TRAPS = 1 << 5;
        /// Transfers control (branch, return, unreachable).
        const BRANCHES = 1 << 6;
    }
}

impl Effect {
    /// True if removing an expression with these effects could change
    /// observable behavior.
    pub fn has_side_effects(self) -> bool {
        self.intersects(
            Effect::WRITES_LOCAL
                | Effect::WRITES_STATE
                | Effect::CALLS
                | Effect::TRAPS
                | Effect::BRANCHES,
        )
    }

    /// True if an expression with these effects cannot be reordered across
    /// one with `other`: one writes what the other touches, or either
    /// transfers control while the other does anything observable.
    pub fn invalidates(self, other: Effect) -> bool {
        fn one_way(a: Effect, b: Effect) -> bool {
            (a.intersects(Effect::WRITES_LOCAL | Effect::CALLS)
                && b.intersects(Effect::READS_LOCAL | Effect::WRITES_LOCAL | Effect::CALLS))
                || (a.intersects(Effect::WRITES_STATE | Effect::CALLS)
                    && b.intersects(Effect::READS_STATE | Effect::WRITES_STATE | Effect::CALLS))
                || (a.intersects(Effect::BRANCHES | Effect::TRAPS) && !b.is_empty())
        }
        one_way(self, other) || one_way(other, self)
    }
}

/// Computes the combined effects of a subtree.
pub struct EffectAnalyzer;

impl EffectAnalyzer {
    pub fn analyze(func: &Function, root: ExprId) -> Effect {
        let mut out = Effect::empty();
        func.visit_subtree(root, |_, expr| {
            out |= match &expr.kind {
                ExprKind::Nop | ExprKind::Const(_) | ExprKind::Block { .. } => Effect::empty(),
                ExprKind::Unreachable => Effect::TRAPS,
                ExprKind::LocalGet { .. } => Effect::READS_LOCAL,
                ExprKind::LocalSet { .. } => Effect::WRITES_LOCAL,
                ExprKind::Loop { .. } | ExprKind::If { .. } | ExprKind::Drop { .. } => {
                    Effect::empty()
                }
                ExprKind::Br { .. } | ExprKind::Switch { .. } | ExprKind::Return { .. } => {
                    Effect::BRANCHES
                }
                ExprKind::Opaque { effects, .. } => *effects,
            };
        });
        out
    }

    /// True if the subtree at `root` has observable side effects.
    pub fn has_side_effects(func: &Function, root: ExprId) -> bool {
        Self::analyze(func, root).has_side_effects()
    }
}
