//! Control-flow graph construction over structured IR.
//!
//! The builder walks a function body in evaluation order and partitions it
//! into basic blocks linked by predecessor/successor edges. Reads and
//! writes of locals become `Action`s on the block containing them; the
//! mutable handle each action carries is how later passes rewrite the IR.
//!
//! While walking, `current` is `None` inside provably unreachable regions
//! (after an unconditional branch, return, switch, or trap). Reads found
//! there are replaced by identically-typed placeholders; writes become
//! their value (tee) or a drop of it, preserving side effects. After
//! construction, a forward reachability pass computes the live blocks and
//! unlinks edges touching dead ones so they cannot contaminate dataflow.

pub mod liveness;

use crate::cfg::liveness::Action;
use crate::ir::types::{Expr, ExprId, ExprKind, Function, Label, LocalId};
use std::collections::{BTreeMap, BTreeSet};

/// Index of a basic block within a `Cfg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BasicBlockId(u32);

impl BasicBlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A maximal straight-line run of actions, with edges and liveness state.
#[derive(Debug, Default)]
pub struct BasicBlock {
    pub preds: Vec<BasicBlockId>,
    pub succs: Vec<BasicBlockId>,
    pub actions: Vec<Action>,
    pub start_indexes: BTreeSet<LocalId>,
    pub end_indexes: BTreeSet<LocalId>,
    pub start_writes: BTreeSet<ExprId>,
    pub end_writes: BTreeSet<ExprId>,
}

#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BasicBlockId,
    /// Blocks that head a loop; the first in-edge is the loop entry, the
    /// rest are back edges.
    pub loop_tops: Vec<BasicBlockId>,
    /// Blocks reachable from the entry. Everything else is skipped by the
    /// dataflows.
    pub live_blocks: BTreeSet<BasicBlockId>,
}

impl Cfg {
    /// Builds the CFG for `func`, neutralizing unreachable code in place.
    pub fn build(func: &mut Function) -> Cfg {
        let mut builder = CfgBuilder {
            func,
            blocks: vec![],
            current: None,
            branches: BTreeMap::new(),
            loop_tops: vec![],
        };
        let entry = builder.start_block();
        builder.current = Some(entry);
        builder.walk(builder.func.body);
        debug_assert!(
            builder.branches.is_empty(),
            "branch target declared by no enclosing block or loop"
        );

        let mut cfg = Cfg {
            blocks: builder.blocks,
            entry,
            loop_tops: builder.loop_tops,
            live_blocks: BTreeSet::new(),
        };
        cfg.live_blocks = cfg.find_live_blocks();
        cfg.unlink_dead_blocks();
        cfg
    }

    /// Forward reachability from the entry block.
    fn find_live_blocks(&self) -> BTreeSet<BasicBlockId> {
        let mut live = BTreeSet::new();
        let mut worklist = vec![self.entry];
        while let Some(b) = worklist.pop() {
            if !live.insert(b) {
                continue;
            }
            worklist.extend(self.blocks[b.index()].succs.iter().copied());
        }
        live
    }

    /// Drops edges between live and dead blocks so dead stores and loads
    /// never flow into the analyses.
    fn unlink_dead_blocks(&mut self) {
        let live = self.live_blocks.clone();
        for &b in &live {
            self.blocks[b.index()].preds.retain(|p| live.contains(p));
            self.blocks[b.index()].succs.retain(|s| live.contains(s));
        }
    }
}

struct CfgBuilder<'f> {
    func: &'f mut Function,
    blocks: Vec<BasicBlock>,
    current: Option<BasicBlockId>,
    /// Blocks that branch to each label, collected until the label's join
    /// point (block end or loop top) links them.
    branches: BTreeMap<Label, Vec<BasicBlockId>>,
    loop_tops: Vec<BasicBlockId>,
}

impl CfgBuilder<'_> {
    fn start_block(&mut self) -> BasicBlockId {
        let id = BasicBlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::default());
        id
    }

    fn link(&mut self, from: BasicBlockId, to: BasicBlockId) {
        if !self.blocks[from.index()].succs.contains(&to) {
            self.blocks[from.index()].succs.push(to);
            self.blocks[to.index()].preds.push(from);
        }
    }

    /// Records that the current block branches to `label`.
    fn branch_to(&mut self, label: Label) {
        if let Some(current) = self.current {
            self.branches.entry(label).or_default().push(current);
        }
    }

    fn walk(&mut self, id: ExprId) {
        let kind = self.func.arena[id].kind.clone();
        match kind {
            ExprKind::Nop | ExprKind::Const(_) => {}
            ExprKind::Unreachable => {
                self.current = None;
            }
            ExprKind::LocalGet { index } => match self.current {
                Some(b) => {
                    self.blocks[b.index()].actions.push(Action::Get { index, expr: id });
                }
                None => {
                    // Unreachable read: replace with an identically-typed
                    // placeholder so no stale action can point at it.
                    let ty = self.func.arena[id].ty;
                    self.func.arena[id] = Expr {
                        kind: ExprKind::Opaque {
                            operands: vec![],
                            effects: crate::ir::effects::Effect::empty(),
                        },
                        ty,
                    };
                }
            },
            ExprKind::LocalSet { index, value, tee } => {
                self.walk(value);
                match self.current {
                    Some(b) => {
                        self.blocks[b.index()].actions.push(Action::Set { index, expr: id });
                    }
                    None => {
                        // Unreachable write: the tee still evaluates to its
                        // value; a plain set keeps the value's effects.
                        if tee {
                            self.func.arena[id] = self.func.arena[value].clone();
                        } else {
                            self.func.arena[id] = Expr {
                                kind: ExprKind::Drop { value },
                                ty: None,
                            };
                        }
                    }
                }
            }
            ExprKind::Drop { value } => self.walk(value),
            ExprKind::Opaque { operands, .. } => {
                for operand in operands {
                    self.walk(operand);
                }
            }
            ExprKind::Return { value } => {
                if let Some(value) = value {
                    self.walk(value);
                }
                self.current = None;
            }
            ExprKind::Br { target, condition } => match condition {
                None => {
                    self.branch_to(target);
                    self.current = None;
                }
                Some(condition) => {
                    self.walk(condition);
                    self.branch_to(target);
                    if let Some(current) = self.current {
                        let next = self.start_block();
                        self.link(current, next);
                        self.current = Some(next);
                    }
                }
            },
            ExprKind::Switch {
                condition,
                targets,
                default,
            } => {
                self.walk(condition);
                for target in targets {
                    self.branch_to(target);
                }
                self.branch_to(default);
                self.current = None;
            }
            ExprKind::Block { label, children } => {
                for child in children {
                    self.walk(child);
                }
                if let Some(label) = label {
                    let branchers = self.branches.remove(&label).unwrap_or_default();
                    if !branchers.is_empty() {
                        // The label was targeted: everything joins here.
                        let join = self.start_block();
                        if let Some(current) = self.current {
                            self.link(current, join);
                        }
                        for brancher in branchers {
                            self.link(brancher, join);
                        }
                        self.current = Some(join);
                    }
                }
            }
            ExprKind::Loop { label, body } => {
                let top = self.start_block();
                if let Some(current) = self.current {
                    self.link(current, top);
                }
                self.loop_tops.push(top);
                self.current = Some(top);
                self.walk(body);
                // Branches to the loop label are back edges.
                for brancher in self.branches.remove(&label).unwrap_or_default() {
                    self.link(brancher, top);
                }
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                self.walk(condition);
                let Some(pre) = self.current else {
                    // Whole conditional unreachable; neutralize the arms.
                    self.walk(if_true);
                    self.current = None;
                    if let Some(if_false) = if_false {
                        self.walk(if_false);
                    }
                    self.current = None;
                    return;
                };
                let true_block = self.start_block();
                self.link(pre, true_block);
                self.current = Some(true_block);
                self.walk(if_true);
                let after_true = self.current;

                let (after_false, has_else) = match if_false {
                    Some(if_false) => {
                        let false_block = self.start_block();
                        self.link(pre, false_block);
                        self.current = Some(false_block);
                        self.walk(if_false);
                        (self.current, true)
                    }
                    None => (None, false),
                };

                let join = self.start_block();
                if let Some(b) = after_true {
                    self.link(b, join);
                }
                if has_else {
                    if let Some(b) = after_false {
                        self.link(b, join);
                    }
                } else {
                    self.link(pre, join);
                }
                self.current = Some(join);
            }
        }
    }
}
