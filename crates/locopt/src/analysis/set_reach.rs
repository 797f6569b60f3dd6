//! The set-reaches-use graph: which writes may flow to each read.

use crate::cfg::Cfg;
use crate::ir::types::{ExprId, Function, LocalId};
use std::collections::{BTreeMap, BTreeSet};

/// For every read, the set of writes that may reach it, and the inverse.
/// An empty (or missing) entry means only the implicit initialization
/// reaches the read.
#[derive(Debug, Default)]
pub struct SetReach {
    /// read → writes that may flow to it.
    pub get_sets: BTreeMap<ExprId, BTreeSet<ExprId>>,
    /// write → reads it may flow to.
    pub set_gets: BTreeMap<ExprId, BTreeSet<ExprId>>,
}

impl SetReach {
    pub fn compute(func: &Function, cfg: &Cfg) -> Self {
        let mut get_sets: BTreeMap<ExprId, BTreeSet<ExprId>> = BTreeMap::new();

        for &b in &cfg.live_blocks {
            let block = &cfg.blocks[b.index()];
            // Running map from index to the writes currently reaching,
            // seeded with the writes live at block start.
            let mut reaching: BTreeMap<LocalId, BTreeSet<ExprId>> = BTreeMap::new();
            for &write in &block.start_writes {
                reaching
                    .entry(func.set_index(write))
                    .or_default()
                    .insert(write);
            }
            for action in &block.actions {
                if let Some((index, write)) = action.as_set() {
                    // A write kills everything reaching on its index.
                    let entry = reaching.entry(index).or_default();
                    entry.clear();
                    entry.insert(write);
                } else if let Some((index, read)) = action.as_get() {
                    get_sets.insert(read, reaching.get(&index).cloned().unwrap_or_default());
                }
            }
        }

        let mut set_gets: BTreeMap<ExprId, BTreeSet<ExprId>> = BTreeMap::new();
        for (&read, writes) in &get_sets {
            for &write in writes {
                set_gets.entry(write).or_default().insert(read);
            }
        }
        Self { get_sets, set_gets }
    }

    /// The writes reaching `read`. Missing reads have no reaching writes.
    pub fn sets_for(&self, read: ExprId) -> &BTreeSet<ExprId> {
        static EMPTY: BTreeSet<ExprId> = BTreeSet::new();
        self.get_sets.get(&read).unwrap_or(&EMPTY)
    }

    /// The reads `write` may flow to.
    pub fn gets_for(&self, write: ExprId) -> &BTreeSet<ExprId> {
        static EMPTY: BTreeSet<ExprId> = BTreeSet::new();
        self.set_gets.get(&write).unwrap_or(&EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{Label, ValType};
    use crate::test_util::{build_cfg, FuncBuilder};

    #[test]
    fn later_write_kills_earlier_one() {
        // $0 := 1; $0 := 2; drop(get $0)
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32]);
        let (body, set1, set2, get) = {
            let mut b = fb.builder();
            let c1 = b.i32_const(1);
            let set1 = b.local_set(LocalId(0), c1);
            let c2 = b.i32_const(2);
            let set2 = b.local_set(LocalId(0), c2);
            let get = b.local_get(LocalId(0), ValType::I32);
            let d = b.drop_(get);
            (b.block(vec![set1, set2, d]), set1, set2, get)
        };
        let (func, cfg) = build_cfg(fb.finish(body));
        let reach = SetReach::compute(&func, &cfg);
        assert_eq!(reach.sets_for(get), &BTreeSet::from([set2]));
        assert!(reach.gets_for(set1).is_empty());
        assert_eq!(reach.gets_for(set2), &BTreeSet::from([get]));
    }

    #[test]
    fn confluence_merges_reaching_writes() {
        // if (get $0) { $1 := 1 } else { $1 := 2 }; drop(get $1)
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32]);
        let (body, set1, set2, get) = {
            let mut b = fb.builder();
            let cond = b.local_get(LocalId(0), ValType::I32);
            let c1 = b.i32_const(1);
            let set1 = b.local_set(LocalId(1), c1);
            let c2 = b.i32_const(2);
            let set2 = b.local_set(LocalId(1), c2);
            let iff = b.if_(cond, set1, Some(set2));
            let get = b.local_get(LocalId(1), ValType::I32);
            let d = b.drop_(get);
            (b.block(vec![iff, d]), set1, set2, get)
        };
        let (func, cfg) = build_cfg(fb.finish(body));
        let reach = SetReach::compute(&func, &cfg);
        assert_eq!(reach.sets_for(get), &BTreeSet::from([set1, set2]));
    }

    #[test]
    fn unwritten_local_has_empty_reach() {
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32]);
        let (body, get) = {
            let mut b = fb.builder();
            let get = b.local_get(LocalId(0), ValType::I32);
            (b.drop_(get), get)
        };
        let (func, cfg) = build_cfg(fb.finish(body));
        let reach = SetReach::compute(&func, &cfg);
        assert!(reach.sets_for(get).is_empty());
        assert!(reach.get_sets.contains_key(&get), "read is recorded even with no writers");
    }

    #[test]
    fn write_reaches_read_around_a_back_edge() {
        // $1 := 1; loop L { drop(get $1); $1 := 2; br_if L (get $0) }
        // The read in the loop sees both the initial write and the
        // loop-carried one.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32]);
        let (body, set1, set2, get) = {
            let mut b = fb.builder();
            let c1 = b.i32_const(1);
            let set1 = b.local_set(LocalId(1), c1);
            let get = b.local_get(LocalId(1), ValType::I32);
            let d = b.drop_(get);
            let c2 = b.i32_const(2);
            let set2 = b.local_set(LocalId(1), c2);
            let cond = b.local_get(LocalId(0), ValType::I32);
            let br = b.br_if(Label(0), cond);
            let inner = b.block(vec![d, set2, br]);
            let lp = b.loop_(Label(0), inner);
            (b.block(vec![set1, lp]), set1, set2, get)
        };
        let (func, cfg) = build_cfg(fb.finish(body));
        let reach = SetReach::compute(&func, &cfg);
        assert_eq!(reach.sets_for(get), &BTreeSet::from([set1, set2]));
    }
}
