//! Expression factory.
//!
//! Thin construction layer over an `ExprArena`. Passes and tests build IR
//! through this rather than allocating `Expr` records by hand, so node
//! types stay consistent with their kinds.

use crate::ir::effects::Effect;
use crate::ir::types::{Expr, ExprArena, ExprId, ExprKind, Label, Literal, LocalId, ValType};

pub struct Builder<'a> {
    arena: &'a mut ExprArena,
}

impl<'a> Builder<'a> {
    pub fn new(arena: &'a mut ExprArena) -> Self {
        Self { arena }
    }

    fn alloc(&mut self, kind: ExprKind, ty: Option<ValType>) -> ExprId {
        self.arena.alloc(Expr { kind, ty })
    }

    pub fn nop(&mut self) -> ExprId {
        self.alloc(ExprKind::Nop, None)
    }

    pub fn unreachable(&mut self) -> ExprId {
        self.alloc(ExprKind::Unreachable, None)
    }

    pub fn const_(&mut self, literal: Literal) -> ExprId {
        self.alloc(ExprKind::Const(literal), Some(literal.ty()))
    }

    pub fn i32_const(&mut self, value: i32) -> ExprId {
        self.const_(Literal::I32(value))
    }

    /// The zero literal for `ty` — the implicit initial value of a declared
    /// local made explicit.
    pub fn zero(&mut self, ty: ValType) -> ExprId {
        self.const_(ty.zero())
    }

    pub fn local_get(&mut self, index: LocalId, ty: ValType) -> ExprId {
        self.alloc(ExprKind::LocalGet { index }, Some(ty))
    }

    pub fn local_set(&mut self, index: LocalId, value: ExprId) -> ExprId {
        self.alloc(
            ExprKind::LocalSet {
                index,
                value,
                tee: false,
            },
            None,
        )
    }

    pub fn local_tee(&mut self, index: LocalId, value: ExprId, ty: ValType) -> ExprId {
        self.alloc(
            ExprKind::LocalSet {
                index,
                value,
                tee: true,
            },
            Some(ty),
        )
    }

    /// An unlabeled block. Its type is the type of its last child, matching
    /// fallthrough evaluation.
    pub fn block(&mut self, children: Vec<ExprId>) -> ExprId {
        let ty = children.last().and_then(|&last| self.arena[last].ty);
        self.alloc(
            ExprKind::Block {
                label: None,
                children,
            },
            ty,
        )
    }

    pub fn labeled_block(&mut self, label: Label, children: Vec<ExprId>) -> ExprId {
        let ty = children.last().and_then(|&last| self.arena[last].ty);
        self.alloc(
            ExprKind::Block {
                label: Some(label),
                children,
            },
            ty,
        )
    }

    pub fn loop_(&mut self, label: Label, body: ExprId) -> ExprId {
        let ty = self.arena[body].ty;
        self.alloc(ExprKind::Loop { label, body }, ty)
    }

    pub fn if_(&mut self, condition: ExprId, if_true: ExprId, if_false: Option<ExprId>) -> ExprId {
        self.alloc(
            ExprKind::If {
                condition,
                if_true,
                if_false,
            },
            None,
        )
    }

    pub fn br(&mut self, target: Label) -> ExprId {
        self.alloc(
            ExprKind::Br {
                target,
                condition: None,
            },
            None,
        )
    }

    pub fn br_if(&mut self, target: Label, condition: ExprId) -> ExprId {
        self.alloc(
            ExprKind::Br {
                target,
                condition: Some(condition),
            },
            None,
        )
    }

    pub fn switch(&mut self, condition: ExprId, targets: Vec<Label>, default: Label) -> ExprId {
        self.alloc(
            ExprKind::Switch {
                condition,
                targets,
                default,
            },
            None,
        )
    }

    pub fn return_(&mut self, value: Option<ExprId>) -> ExprId {
        self.alloc(ExprKind::Return { value }, None)
    }

    pub fn drop_(&mut self, value: ExprId) -> ExprId {
        self.alloc(ExprKind::Drop { value }, None)
    }

    pub fn opaque(
        &mut self,
        ty: Option<ValType>,
        operands: Vec<ExprId>,
        effects: Effect,
    ) -> ExprId {
        self.alloc(ExprKind::Opaque { operands, effects }, ty)
    }

    /// A call-like placeholder of the given type. Used to make parameter
    /// initialization explicit: the value "arrives from outside".
    pub fn placeholder_call(&mut self, ty: ValType) -> ExprId {
        self.opaque(Some(ty), vec![], Effect::CALLS)
    }
}
