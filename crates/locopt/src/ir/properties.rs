//! Structural properties of expressions.

use crate::ir::types::{ExprId, ExprKind, Function};

/// Strips wrappers whose own value is irrelevant — label-free blocks fall
/// through to their last child, drops to their operand — and returns the
/// operative sub-expression. Labeled blocks are left alone: a branch could
/// exit them past the last child.
pub fn unused_fallthrough(func: &Function, mut id: ExprId) -> ExprId {
    loop {
        match &func.arena[id].kind {
            ExprKind::Block {
                label: None,
                children,
            } if !children.is_empty() => {
                id = *children.last().expect("nonempty");
            }
            ExprKind::Drop { value } => {
                id = *value;
            }
            _ => return id,
        }
    }
}
