//! Interference: which pairs of writes (and, lifted, which pairs of local
//! indices) cannot share storage.
//!
//! Runs under the explicit-initialization scope, so every local has a
//! write in the entry block and parameters are seen as holding distinct
//! opaque values. Within each block the scan walks actions in reverse from
//! the writes live at the block end; a read brings its reaching writes to
//! life, a write retires. Two live writes interfere unless they are the
//! same write, share an index (writes of one index share storage by
//! definition), or are provably equivalent.

use crate::analysis::equivalence::Equivalences;
use crate::analysis::set_reach::SetReach;
use crate::cfg::Cfg;
use crate::ir::types::{ExprId, Function, LocalId};
use crate::support::symmetric::SymmetricRelation;
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct Interferences {
    /// Per-index interference sets, `index_interferences[i]` holding every
    /// index that cannot share a slot with `i`.
    index_interferences: Vec<BTreeSet<LocalId>>,
}

impl Interferences {
    pub fn compute(func: &Function, cfg: &Cfg, reach: &SetReach, equiv: &Equivalences) -> Self {
        let mut write_interferences: SymmetricRelation<ExprId> = SymmetricRelation::new();

        let mut maybe_interfere = |a: ExprId, b: ExprId| {
            if a != b && func.set_index(a) != func.set_index(b) && !equiv.are_equivalent(a, b) {
                write_interferences.insert(a, b);
            }
        };

        for &b in &cfg.live_blocks {
            let block = &cfg.blocks[b.index()];
            let mut live: BTreeSet<ExprId> = block.end_writes.clone();
            // Writes arriving from different blocks may meet here for the
            // first time.
            for &x in &live {
                for &y in &live {
                    maybe_interfere(x, y);
                }
            }
            for action in block.actions.iter().rev() {
                if let Some((_, read)) = action.as_get() {
                    for &write in reach.sets_for(read) {
                        if live.contains(&write) {
                            continue;
                        }
                        for &other in &live {
                            maybe_interfere(write, other);
                        }
                        live.insert(write);
                    }
                } else if let Some((index, write)) = action.as_set() {
                    live.remove(&write);
                    debug_assert!(
                        live.iter().all(|&other| func.set_index(other) != index),
                        "two writes of {index} live at once"
                    );
                }
            }
        }

        // Lift write-level interference to index level.
        let num_locals = func.num_locals();
        let mut index_interferences = vec![BTreeSet::new(); num_locals];
        for (a, b) in write_interferences.pairs() {
            let (ia, ib) = (func.set_index(a), func.set_index(b));
            index_interferences[ia.index()].insert(ib);
            index_interferences[ib.index()].insert(ia);
        }

        // A used zero-init must not be folded into a parameter slot: that
        // would require materializing the zero explicitly, defeating the
        // saving. The explicit-init scope put one write per local at the
        // start of the entry block, in index order.
        let num_params = func.num_params();
        let entry = &cfg.blocks[cfg.entry.index()];
        assert!(entry.actions.len() >= num_locals, "entry block must carry the explicit inits");
        for i in num_params..num_locals {
            let (index, write) = entry.actions[i]
                .as_set()
                .expect("explicit init write per local");
            assert_eq!(index, LocalId(i as u32));
            if !reach.gets_for(write).is_empty() {
                for j in 0..num_params {
                    index_interferences[i].insert(LocalId(j as u32));
                    index_interferences[j].insert(LocalId(i as u32));
                }
            }
        }

        Self {
            index_interferences,
        }
    }

    pub fn interferes(&self, a: LocalId, b: LocalId) -> bool {
        self.index_interferences[a.index()].contains(&b)
    }
}
