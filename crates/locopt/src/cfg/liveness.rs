//! Liveness dataflow over local reads and writes.
//!
//! Two flows run in sequence. Index liveness runs backward to a fixpoint:
//! a local index is live at a point if it may be read before being
//! overwritten along some forward path. Write liveness then runs forward,
//! tracking which concrete writes may still be observed: a write is live at
//! a block end if its index is live there and nothing later in the block
//! overwrote it, and it flows into successors until overwritten or until
//! its index dies.
//!
//! Both liveness sets only ever grow during iteration; that monotonicity is
//! asserted at every step.

use crate::cfg::{BasicBlockId, Cfg};
use crate::ir::types::{ExprId, Function, LocalId};
use crate::support::work_list::WorkList;
use std::collections::{BTreeMap, BTreeSet};

/// A liveness-relevant position in a basic block. `Other` marks a position
/// whose read or write was rewritten away; it is kept so the remaining
/// actions keep their offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get { index: LocalId, expr: ExprId },
    Set { index: LocalId, expr: ExprId },
    Other { expr: ExprId },
}

impl Action {
    pub fn as_get(&self) -> Option<(LocalId, ExprId)> {
        match self {
            Action::Get { index, expr } => Some((*index, *expr)),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<(LocalId, ExprId)> {
        match self {
            Action::Set { index, expr } => Some((*index, *expr)),
            _ => None,
        }
    }

    pub fn expr(&self) -> ExprId {
        match self {
            Action::Get { expr, .. } | Action::Set { expr, .. } | Action::Other { expr } => *expr,
        }
    }
}

/// Runs both liveness flows over the live blocks of `cfg`.
pub fn compute(func: &Function, cfg: &mut Cfg) {
    flow_index_liveness(cfg);
    let sets_in = indexes_set_in_blocks(cfg);
    flow_write_liveness(func, cfg, &sets_in);
}

/// For each live block, the set of indexes it writes. Lets the flows decide
/// quickly whether something passes through a block.
fn indexes_set_in_blocks(cfg: &Cfg) -> BTreeMap<BasicBlockId, BTreeSet<LocalId>> {
    let mut map = BTreeMap::new();
    for &b in &cfg.live_blocks {
        let mut set = BTreeSet::new();
        for action in &cfg.blocks[b.index()].actions {
            if let Some((index, _)) = action.as_set() {
                set.insert(index);
            }
        }
        map.insert(b, set);
    }
    map
}

fn flow_index_liveness(cfg: &mut Cfg) {
    let live_blocks: Vec<BasicBlockId> = cfg.live_blocks.iter().copied().collect();

    // Seed start_indexes per block by scanning actions in reverse from an
    // empty end.
    for &b in &live_blocks {
        let block = &mut cfg.blocks[b.index()];
        let mut live = BTreeSet::new();
        for action in block.actions.iter().rev() {
            match action {
                Action::Get { index, .. } => {
                    live.insert(*index);
                }
                Action::Set { index, .. } => {
                    live.remove(index);
                }
                Action::Other { .. } => {}
            }
        }
        block.start_indexes = live;
    }

    // Iterate to fixpoint. The sets only grow, so each step either makes
    // progress or retires a block.
    let mut work: WorkList<BasicBlockId> = WorkList::new();
    for &b in &live_blocks {
        work.push(b);
    }
    while let Some(b) = work.pop() {
        let succs = cfg.blocks[b.index()].succs.clone();
        let mut new_end = BTreeSet::new();
        for s in succs {
            new_end.extend(cfg.blocks[s.index()].start_indexes.iter().copied());
        }
        if new_end == cfg.blocks[b.index()].end_indexes {
            continue;
        }
        assert!(
            new_end.len() >= cfg.blocks[b.index()].end_indexes.len(),
            "end liveness shrank in block {b:?}"
        );
        let mut live = new_end.clone();
        cfg.blocks[b.index()].end_indexes = new_end;
        for action in cfg.blocks[b.index()].actions.iter().rev() {
            match action {
                Action::Get { index, .. } => {
                    live.insert(*index);
                }
                Action::Set { index, .. } => {
                    live.remove(index);
                }
                Action::Other { .. } => {}
            }
        }
        let block = &mut cfg.blocks[b.index()];
        assert!(
            live.len() >= block.start_indexes.len(),
            "start liveness shrank in block {b:?}"
        );
        if live != block.start_indexes {
            block.start_indexes = live;
            for p in block.preds.clone() {
                work.push(p);
            }
        }
    }
}

fn flow_write_liveness(
    func: &Function,
    cfg: &mut Cfg,
    sets_in: &BTreeMap<BasicBlockId, BTreeSet<LocalId>>,
) {
    let live_blocks: Vec<BasicBlockId> = cfg.live_blocks.iter().copied().collect();

    // Seed end_writes: the last write per index in a block is live at its
    // end iff the index is.
    for &b in &live_blocks {
        let block = &mut cfg.blocks[b.index()];
        let mut last: BTreeMap<LocalId, ExprId> = BTreeMap::new();
        for action in &block.actions {
            if let Some((index, expr)) = action.as_set() {
                last.insert(index, expr);
            }
        }
        for (index, write) in last {
            if block.end_indexes.contains(&index) {
                block.end_writes.insert(write);
            }
        }
    }

    // Flow each live end-write forward. A write always enters start_writes
    // of the block it arrives at; it flows through only if the block does
    // not overwrite its index and the index is still live at the block end.
    for &b in &live_blocks {
        for write in cfg.blocks[b.index()].end_writes.clone() {
            let index = func.set_index(write);
            let mut queue: WorkList<BasicBlockId> = WorkList::new();
            for &s in &cfg.blocks[b.index()].succs {
                queue.push(s);
            }
            while let Some(s) = queue.pop() {
                let block = &mut cfg.blocks[s.index()];
                if !block.start_writes.insert(write) {
                    continue;
                }
                if sets_in[&s].contains(&index) {
                    continue;
                }
                if !block.end_indexes.contains(&index) {
                    continue;
                }
                block.end_writes.insert(write);
                for &n in &cfg.blocks[s.index()].succs {
                    queue.push(n);
                }
            }
        }
    }
}
