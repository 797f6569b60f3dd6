//! Shared helpers for unit tests: function construction and CFG setup.

use crate::cfg::{liveness, Cfg};
use crate::ir::builder::Builder;
use crate::ir::types::{ExprArena, ExprId, Function, ValType};

/// Incrementally builds a `Function` for tests.
pub(crate) struct FuncBuilder {
    arena: ExprArena,
    params: Vec<ValType>,
    vars: Vec<ValType>,
}

impl FuncBuilder {
    pub(crate) fn new(params: Vec<ValType>, vars: Vec<ValType>) -> Self {
        Self {
            arena: ExprArena::new(),
            params,
            vars,
        }
    }

    pub(crate) fn builder(&mut self) -> Builder<'_> {
        Builder::new(&mut self.arena)
    }

    pub(crate) fn finish(self, body: ExprId) -> Function {
        Function {
            name: "test".into(),
            params: self.params,
            vars: self.vars,
            body,
            arena: self.arena,
        }
    }
}

/// Builds the CFG for `func` and runs both liveness flows.
pub(crate) fn build_cfg(mut func: Function) -> (Function, Cfg) {
    let mut cfg = Cfg::build(&mut func);
    liveness::compute(&func, &mut cfg);
    (func, cfg)
}
