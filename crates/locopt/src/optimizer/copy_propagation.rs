//! Propagate single-assignment local indexes through copies. That is,
//!
//! ```text
//! a := b
//! c := a
//! ```
//!
//! becomes
//!
//! ```text
//! a := b
//! c := b
//! ```
//!
//! Each read of a single-assignment local with exactly one reaching write
//! follows the chain of copies behind that write and collects every
//! single-assignment index holding the same value, then rewrites itself to
//! the smallest. Lower indices take fewer bytes under variable-length
//! integer encoding, and skipping intermediate copies lets coalescing and
//! dead-write removal finish the job.

use crate::analysis::local_graph::LocalGraph;
use crate::ir::properties::unused_fallthrough;
use crate::ir::types::{ExprId, ExprKind, Function, LocalId};
use crate::optimizer::Pass;
use crate::support::work_list::OneTimeWorkList;
use anyhow::Result;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Default)]
pub struct CopyPropagation;

impl CopyPropagation {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn run_on_function(&mut self, func: &mut Function) -> Result<()> {
        debug!("copy-propagation: {}", func.name);
        let graph = LocalGraph::compute(func);

        // Decisions are made against the reaching-writes snapshot taken
        // before any rewrite; every rewrite preserves value equivalence, so
        // the snapshot stays valid as reads change index.
        let reads: Vec<ExprId> = graph.get_sets.keys().copied().collect();
        for read in reads {
            let index = func.get_index(read);
            if !graph.is_single_assigned(index) {
                continue;
            }
            let Some(write) = relevant_write(&graph, read) else {
                continue;
            };
            let Some(value) = relevant_write_value(func, write) else {
                continue;
            };
            // Follow the chain and collect every equivalent index. The
            // one-time work list terminates cycles that can appear through
            // not-yet-removed dead code.
            let mut possible: BTreeSet<LocalId> = BTreeSet::new();
            let mut work: OneTimeWorkList<ExprId> = OneTimeWorkList::new();
            work.push(value);
            while let Some(curr) = work.pop() {
                match &func.arena[curr].kind {
                    ExprKind::LocalSet {
                        index: other_index, ..
                    } => {
                        if graph.is_single_assigned(*other_index) {
                            if *other_index != index {
                                possible.insert(*other_index);
                            }
                            if let Some(next) = relevant_write_value(func, curr) {
                                work.push(next);
                            }
                        }
                    }
                    ExprKind::LocalGet {
                        index: other_index, ..
                    } => {
                        // Only an index with an actual producing write is a
                        // rewrite candidate; a read of an untouched
                        // parameter or zero-init ends the chain.
                        if graph.is_single_assigned(*other_index) {
                            if let Some(next) = relevant_write(&graph, curr) {
                                if *other_index != index {
                                    possible.insert(*other_index);
                                }
                                work.push(next);
                            }
                        }
                    }
                    other => unreachable!("chain reached non-local expression {other:?}"),
                }
            }
            if let Some(&best) = possible.iter().next() {
                assert_ne!(best, index);
                match &mut func.arena[read].kind {
                    ExprKind::LocalGet { index } => *index = best,
                    _ => unreachable!(),
                }
            }
        }
        Ok(())
    }
}

/// The write behind `read`, when there is exactly one and it is explicit.
fn relevant_write(graph: &LocalGraph, read: ExprId) -> Option<ExprId> {
    let writes = graph.reaching_writes(read);
    if writes.len() == 1 {
        *writes.iter().next().expect("nonempty")
    } else {
        None
    }
}

/// The operative value of a write, when it is itself a read or a tee —
/// the shapes a copy chain is made of.
fn relevant_write_value(func: &Function, write: ExprId) -> Option<ExprId> {
    let value = unused_fallthrough(func, func.set_value(write));
    match &func.arena[value].kind {
        ExprKind::LocalGet { .. } | ExprKind::LocalSet { .. } => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::ValType;
    use crate::test_util::FuncBuilder;

    fn run(func: &mut Function) {
        CopyPropagation::new().run_on_function(func).unwrap();
    }

    fn read_indexes(func: &Function) -> Vec<LocalId> {
        let mut out = vec![];
        func.visit_subtree(func.body, |_, expr| {
            if let ExprKind::LocalGet { index } = &expr.kind {
                out.push(*index);
            }
        });
        out
    }

    /// a := get p; b := get a; c := get b; return get c — the final read
    /// follows the chain to the lowest equivalent index, a.
    fn chain_func() -> Function {
        let mut fb = FuncBuilder::new(
            vec![ValType::I32],
            vec![ValType::I32, ValType::I32, ValType::I32],
        );
        let body = {
            let mut b = fb.builder();
            let gp = b.local_get(LocalId(0), ValType::I32);
            let set_a = b.local_set(LocalId(1), gp);
            let ga = b.local_get(LocalId(1), ValType::I32);
            let set_b = b.local_set(LocalId(2), ga);
            let gb = b.local_get(LocalId(2), ValType::I32);
            let set_c = b.local_set(LocalId(3), gb);
            let gc = b.local_get(LocalId(3), ValType::I32);
            let ret = b.return_(Some(gc));
            b.block(vec![set_a, set_b, set_c, ret])
        };
        fb.finish(body)
    }

    #[test]
    fn chain_rewrites_to_lowest_index() {
        let mut func = chain_func();
        run(&mut func);
        // Reads: set_a's (param $0, multiply-assigned territory — the param
        // itself is the value source and stays), then the chain reads all
        // rewritten to $1, the lowest single-assigned equivalent.
        assert_eq!(
            read_indexes(&func),
            vec![LocalId(0), LocalId(1), LocalId(1), LocalId(1)]
        );
    }

    #[test]
    fn propagation_is_idempotent() {
        let mut func = chain_func();
        run(&mut func);
        let after_one = read_indexes(&func);
        run(&mut func);
        assert_eq!(read_indexes(&func), after_one);
    }

    #[test]
    fn multiply_assigned_source_blocks_propagation() {
        // a := get v where v is written twice: reads of a must not be
        // rewritten to v.
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let c1 = b.i32_const(1);
            let set_v1 = b.local_set(LocalId(0), c1);
            let gv = b.local_get(LocalId(0), ValType::I32);
            let set_a = b.local_set(LocalId(1), gv);
            let c2 = b.i32_const(2);
            let set_v2 = b.local_set(LocalId(0), c2);
            let ga = b.local_get(LocalId(1), ValType::I32);
            let ret = b.return_(Some(ga));
            b.block(vec![set_v1, set_a, set_v2, ret])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        // The read of a stays: its source chain dead-ends at the
        // multiply-assigned v.
        assert_eq!(*read_indexes(&func).last().unwrap(), LocalId(1));
    }

    #[test]
    fn merge_blocks_propagation() {
        // if (p) { a := 1 } else { a := 2 }; b := get a; return get b —
        // a is written twice, so reads of b must keep b.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let cond = b.local_get(LocalId(0), ValType::I32);
            let c1 = b.i32_const(1);
            let set1 = b.local_set(LocalId(1), c1);
            let c2 = b.i32_const(2);
            let set2 = b.local_set(LocalId(1), c2);
            let iff = b.if_(cond, set1, Some(set2));
            let ga = b.local_get(LocalId(1), ValType::I32);
            let set_b = b.local_set(LocalId(2), ga);
            let gb = b.local_get(LocalId(2), ValType::I32);
            let ret = b.return_(Some(gb));
            b.block(vec![iff, set_b, ret])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(*read_indexes(&func).last().unwrap(), LocalId(2));
    }

    #[test]
    fn tee_chains_propagate() {
        // a := tee b (get p); return get a — the read of a can use b.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let gp = b.local_get(LocalId(0), ValType::I32);
            let tee_b = b.local_tee(LocalId(2), gp, ValType::I32);
            let set_a = b.local_set(LocalId(1), tee_b);
            let ga = b.local_get(LocalId(1), ValType::I32);
            let ret = b.return_(Some(ga));
            b.block(vec![set_a, ret])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        // get a rewrites to the lower single-assigned equivalent: $1 and $2
        // hold the same value; $1 is a itself, so the only candidate is $2.
        assert_eq!(*read_indexes(&func).last().unwrap(), LocalId(2));
    }

    #[test]
    fn single_assignment_is_preserved() {
        // After propagation every rewritten read still points at a
        // single-assigned index.
        let mut func = chain_func();
        run(&mut func);
        let graph = LocalGraph::compute(&mut func);
        for index in read_indexes(&func) {
            if index != LocalId(0) {
                assert!(graph.is_single_assigned(index));
            }
        }
    }
}
