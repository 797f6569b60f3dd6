//! Shared test harness: a reference interpreter for the locopt IR and
//! helpers for building test functions.
//!
//! The interpreter exists to check semantics preservation: run a function
//! before and after optimization on the same arguments and compare the
//! observable outcome. It evaluates exactly the node kinds the optimizer
//! interprets; opaque nodes evaluate their operands, count as an observable
//! event, and produce the zero of their type.

use locopt::ir::types::{ExprId, ExprKind, Function, Label, Literal, LocalId, ValType};
use locopt::ir::Builder;

/// What a run of a function observably did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub value: Option<Literal>,
    /// How many opaque nodes were evaluated, in place of a real
    /// side-effect trace.
    pub opaque_events: usize,
}

#[derive(Debug)]
enum Flow {
    Value(Option<Literal>),
    Branch(Label),
    Return(Option<Literal>),
}

pub struct Interpreter<'f> {
    func: &'f Function,
    locals: Vec<Literal>,
    opaque_events: usize,
    fuel: u64,
}

impl<'f> Interpreter<'f> {
    pub fn new(func: &'f Function, args: &[Literal]) -> Self {
        assert_eq!(args.len(), func.num_params(), "argument count mismatch");
        let mut locals: Vec<Literal> = args.to_vec();
        for &ty in &func.vars {
            locals.push(ty.zero());
        }
        Self {
            func,
            locals,
            opaque_events: 0,
            fuel: 1_000_000,
        }
    }

    pub fn run(mut self) -> Outcome {
        let value = match self.eval(self.func.body) {
            Flow::Value(v) | Flow::Return(v) => v,
            Flow::Branch(label) => panic!("branch to {label} escaped the function body"),
        };
        Outcome {
            value,
            opaque_events: self.opaque_events,
        }
    }

    fn eval(&mut self, id: ExprId) -> Flow {
        self.fuel = self
            .fuel
            .checked_sub(1)
            .expect("interpreter ran out of fuel");
        let func = self.func;
        match &func.arena[id].kind {
            ExprKind::Nop => Flow::Value(None),
            ExprKind::Unreachable => panic!("executed unreachable"),
            ExprKind::Const(literal) => Flow::Value(Some(*literal)),
            ExprKind::LocalGet { index } => Flow::Value(Some(self.locals[index.index()])),
            ExprKind::LocalSet { index, value, tee } => match self.eval(*value) {
                Flow::Value(Some(v)) => {
                    self.locals[index.index()] = v;
                    Flow::Value(if *tee { Some(v) } else { None })
                }
                Flow::Value(None) => panic!("write of a valueless expression"),
                other => other,
            },
            ExprKind::Block { label, children } => {
                let mut last = None;
                for &child in children {
                    match self.eval(child) {
                        Flow::Value(v) => last = v,
                        Flow::Branch(l) if Some(l) == *label => return Flow::Value(None),
                        other => return other,
                    }
                }
                Flow::Value(last)
            }
            ExprKind::Loop { label, body } => loop {
                match self.eval(*body) {
                    Flow::Branch(l) if l == *label => continue,
                    other => return other,
                }
            },
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => match self.eval(*condition) {
                Flow::Value(v) => {
                    if truthy(v) {
                        self.eval(*if_true)
                    } else if let Some(if_false) = if_false {
                        self.eval(*if_false)
                    } else {
                        Flow::Value(None)
                    }
                }
                other => other,
            },
            ExprKind::Br { target, condition } => match condition {
                None => Flow::Branch(*target),
                Some(condition) => match self.eval(*condition) {
                    Flow::Value(v) => {
                        if truthy(v) {
                            Flow::Branch(*target)
                        } else {
                            Flow::Value(None)
                        }
                    }
                    other => other,
                },
            },
            ExprKind::Switch {
                condition,
                targets,
                default,
            } => match self.eval(*condition) {
                Flow::Value(Some(Literal::I32(i))) => {
                    let target = usize::try_from(i)
                        .ok()
                        .and_then(|i| targets.get(i).copied())
                        .unwrap_or(*default);
                    Flow::Branch(target)
                }
                Flow::Value(other) => panic!("switch on {other:?}"),
                other => other,
            },
            ExprKind::Return { value } => match value {
                None => Flow::Return(None),
                Some(value) => match self.eval(*value) {
                    Flow::Value(v) => Flow::Return(v),
                    other => other,
                },
            },
            ExprKind::Drop { value } => match self.eval(*value) {
                Flow::Value(_) => Flow::Value(None),
                other => other,
            },
            ExprKind::Opaque { operands, .. } => {
                for &operand in operands {
                    match self.eval(operand) {
                        Flow::Value(_) => {}
                        other => return other,
                    }
                }
                self.opaque_events += 1;
                Flow::Value(func.arena[id].ty.map(ValType::zero))
            }
        }
    }
}

fn truthy(v: Option<Literal>) -> bool {
    match v {
        Some(Literal::I32(i)) => i != 0,
        other => panic!("condition evaluated to {other:?}"),
    }
}

/// Runs `func` on `args` and reports the outcome.
pub fn interpret(func: &Function, args: &[Literal]) -> Outcome {
    Interpreter::new(func, args).run()
}

/// Builds a function from parameter/variable types and a body-builder
/// closure.
pub fn make_func(
    params: Vec<ValType>,
    vars: Vec<ValType>,
    build: impl FnOnce(&mut Builder) -> ExprId,
) -> Function {
    let mut arena = locopt::ir::ExprArena::new();
    let mut b = Builder::new(&mut arena);
    let body = build(&mut b);
    Function {
        name: "test".into(),
        params,
        vars,
        body,
        arena,
    }
}

/// Asserts that optimizing with `optimize` preserves the outcome of `func`
/// on every argument list in `arg_sets`, and returns the optimized
/// function.
pub fn assert_outcome_preserved(
    mut func: Function,
    arg_sets: &[Vec<Literal>],
    optimize: impl FnOnce(&mut Function),
) -> Function {
    let before: Vec<Outcome> = arg_sets.iter().map(|args| interpret(&func, args)).collect();
    optimize(&mut func);
    for (args, expected) in arg_sets.iter().zip(&before) {
        let after = interpret(&func, args);
        assert_eq!(&after, expected, "outcome changed for arguments {args:?}");
    }
    func
}

/// Collects surviving write indexes, in tree order.
pub fn set_indexes(func: &Function) -> Vec<LocalId> {
    let mut out = vec![];
    func.visit_subtree(func.body, |_, expr| {
        if let ExprKind::LocalSet { index, .. } = &expr.kind {
            out.push(*index);
        }
    });
    out
}

/// Collects read indexes, in tree order.
pub fn get_indexes(func: &Function) -> Vec<LocalId> {
    let mut out = vec![];
    func.visit_subtree(func.body, |_, expr| {
        if let ExprKind::LocalGet { index } = &expr.kind {
            out.push(*index);
        }
    });
    out
}
