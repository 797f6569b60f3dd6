//! Coalesce locals, to reduce the total number of locals.
//!
//! This is register allocation without spilling and without a fixed
//! register count: the target has unbounded locals, so the objective is
//! code size. Copies matter more than the local count — a copy costs bytes
//! in the output, an extra local mostly does not — so the allocator picks
//! colors that resolve the most copy affinity first and breaks ties toward
//! fewer locals.
//!
//! The IR is not in SSA form, deliberately: operating on the original
//! locals guarantees the pass never increases their number, and copies are
//! directly visible. Writes sharing an index are assumed to share it for a
//! reason and are kept together.
//!
//! Two variants: the plain pass tries the natural order of locals and its
//! reverse; the learning variant searches orders with a small genetic
//! algorithm, seeded deterministically.

use crate::analysis::equivalence::Equivalences;
use crate::analysis::interference::Interferences;
use crate::analysis::set_reach::SetReach;
use crate::cfg::liveness::{self, Action};
use crate::cfg::Cfg;
use crate::ir::local_utils::{remove_set, ExplicitInits};
use crate::ir::types::{ExprId, ExprKind, Function, LocalId, ValType};
use crate::optimizer::Pass;
use crate::support::learning::{Generator, GeneticLearner, Noise};
use crate::support::permutations::{make_identity, make_inverse};
use crate::support::symmetric::SymmetricPairMap;
use anyhow::Result;
use tracing::{debug, trace};

pub struct CoalesceLocals {
    learning: bool,
}

impl CoalesceLocals {
    pub fn new() -> Self {
        Self { learning: false }
    }

    /// The variant that searches allocation orders with a genetic learner.
    pub fn with_learning() -> Self {
        Self { learning: true }
    }
}

impl Default for CoalesceLocals {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for CoalesceLocals {
    fn name(&self) -> &'static str {
        if self.learning {
            "coalesce-locals-learning"
        } else {
            "coalesce-locals"
        }
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn run_on_function(&mut self, func: &mut Function) -> Result<()> {
        if func.num_locals() == 0 {
            return Ok(());
        }
        debug!("coalesce-locals: {}", func.name);

        let inits = ExplicitInits::install(func);
        let mut cfg = Cfg::build(func);
        liveness::compute(func, &mut cfg);
        let copies = Copies::compute(func, &cfg);
        let reach = SetReach::compute(func, &cfg);
        let equiv = Equivalences::compute(func, &cfg, &reach);
        let interferences = Interferences::compute(func, &cfg, &reach, &equiv);

        let ctx = Coalescing {
            num_locals: func.num_locals(),
            num_params: func.num_params(),
            types: (0..func.num_locals())
                .map(|i| func.local_type(LocalId(i as u32)))
                .collect(),
            interferences: &interferences,
            copies: &copies,
        };
        let indices = if self.learning {
            ctx.pick_indices_learning(func.num_vars())
        } else {
            ctx.pick_indices()
        };
        apply_indices(func, &mut cfg, &indices, &reach);
        inits.uninstall(func);
        Ok(())
    }
}

// ── Copy affinity ────────────────────────────────────────────────────────────

/// Copies between locals, weighted: every copy counts 2, and a copy sitting
/// on an unconditional edge into a loop top counts 1 more — removing it can
/// save a branch-side shuffle at loop entry, so it wins ties.
pub(crate) struct Copies {
    copies: SymmetricPairMap<u32, u32>,
    total: Vec<u32>,
}

impl Copies {
    pub(crate) fn compute(func: &Function, cfg: &Cfg) -> Self {
        let mut out = Self {
            copies: SymmetricPairMap::new(),
            total: vec![0; func.num_locals()],
        };
        for &b in &cfg.live_blocks {
            for action in &cfg.blocks[b.index()].actions {
                if let Some((index, write)) = action.as_set() {
                    for copied in copied_indexes(func, func.set_value(write)) {
                        out.note(index, copied, 2);
                    }
                }
            }
        }
        for &top in &cfg.loop_tops {
            if !cfg.live_blocks.contains(&top) {
                continue;
            }
            // The first in-edge is the loop entry; the rest are back edges.
            // Only unconditional arrivals count, the true phi fragments.
            let preds = cfg.blocks[top.index()].preds.clone();
            for &arriving in preds.iter().skip(1) {
                if cfg.blocks[arriving.index()].succs.len() > 1 {
                    continue;
                }
                for action in &cfg.blocks[arriving.index()].actions {
                    if let Some((index, write)) = action.as_set() {
                        for copied in copied_indexes(func, func.set_value(write)) {
                            out.note(index, copied, 1);
                        }
                    }
                }
            }
        }
        out
    }

    fn note(&mut self, a: LocalId, b: LocalId, amount: u32) {
        *self.copies.get_mut(a.0, b.0) += amount;
        self.total[a.index()] += amount;
        self.total[b.index()] += amount;
    }

    pub(crate) fn get(&self, a: usize, b: usize) -> u32 {
        self.copies.get(a as u32, b as u32)
    }

    pub(crate) fn total(&self, index: usize) -> u32 {
        self.total[index]
    }
}

/// The local indices a write's value plausibly copies: a read, a tee, or
/// a conditional whose arms are such reads.
fn copied_indexes(func: &Function, value: ExprId) -> Vec<LocalId> {
    match &func.arena[value].kind {
        ExprKind::LocalGet { index } => vec![*index],
        ExprKind::LocalSet {
            index, tee: true, ..
        } => vec![*index],
        ExprKind::If {
            if_true, if_false, ..
        } => {
            let mut out = copied_indexes(func, *if_true);
            if let Some(if_false) = if_false {
                out.extend(copied_indexes(func, *if_false));
            }
            out
        }
        _ => vec![],
    }
}

// ── Index selection ──────────────────────────────────────────────────────────

struct Coalescing<'a> {
    num_locals: usize,
    num_params: usize,
    types: Vec<ValType>,
    interferences: &'a Interferences,
    copies: &'a Copies,
}

impl Coalescing<'_> {
    fn interferes(&self, a: usize, b: usize) -> bool {
        self.interferences
            .interferes(LocalId(a as u32), LocalId(b as u32))
    }

    /// Greedy coloring under `order`: parameters keep their slots, each
    /// following index takes the compatible color resolving the most copy
    /// weight (ties to the lowest color), or a fresh one. Returns the
    /// old-index → new-index map and the resolved copy weight.
    fn pick_indices_from_order(&self, order: &[usize]) -> (Vec<usize>, u32) {
        let n = self.num_locals;
        let mut indices = vec![0usize; n];
        let mut types: Vec<Option<ValType>> = vec![None; n];
        // Per new color, the interferences and copy weights of everything
        // merged into it so far, against each old index.
        let mut new_interferences = vec![false; n * n];
        let mut new_copies = vec![0u32; n * n];
        let mut next_free = 0usize;
        let mut removed_copies = 0u32;

        for i in 0..self.num_params {
            assert_eq!(order[i], i, "order must leave the parameters in place");
            indices[i] = i;
            types[i] = Some(self.types[i]);
            for j in self.num_params..n {
                new_interferences[n * i + j] = self.interferes(i, j);
                new_copies[n * i + j] = self.copies.get(i, j);
            }
            next_free += 1;
        }
        for pos in self.num_params..n {
            let actual = order[pos];
            let mut found: Option<usize> = None;
            let mut found_copies = 0u32;
            for j in 0..next_free {
                if !new_interferences[j * n + actual] && types[j] == Some(self.types[actual]) {
                    // Compatible; prefer whichever resolves the most copies.
                    let curr = new_copies[j * n + actual];
                    if found.is_none() || curr > found_copies {
                        found = Some(j);
                        found_copies = curr;
                    }
                }
            }
            let found = match found {
                Some(j) => {
                    removed_copies += found_copies;
                    j
                }
                None => {
                    let j = next_free;
                    types[j] = Some(self.types[actual]);
                    next_free += 1;
                    removed_copies += self.copies.get(j, actual);
                    j
                }
            };
            indices[actual] = found;
            trace!("map local {actual} to {found}");
            // Fold the merged local's edges into the color, but only
            // against indices the order will still visit.
            for &j in &order[pos + 1..] {
                new_interferences[found * n + j] |= self.interferes(actual, j);
                new_copies[found * n + j] += self.copies.get(actual, j);
            }
        }
        (indices, removed_copies)
    }

    /// Picks between the natural order and its reverse, both re-sorted by
    /// total copy weight. Fewer copies wins outright; the local count only
    /// breaks ties, since copies cost more encoded bytes.
    fn pick_indices(&self) -> Vec<usize> {
        let n = self.num_locals;
        if n == 0 {
            return vec![];
        }
        if n == 1 {
            return vec![0];
        }
        // Parameters cannot move: give them maximal priority.
        let mut priorities: Vec<u32> = (0..n).map(|i| self.copies.total(i)).collect();
        for p in priorities.iter_mut().take(self.num_params) {
            *p = u32::MAX;
        }

        // The natural order is less arbitrary than it seems: programs often
        // carry an inherent order of locals.
        let order = adjust_order_by_priorities(&make_identity(n), &priorities);
        let (indices, removed_copies) = self.pick_indices_from_order(&order);
        let max_index = *indices.iter().max().expect("nonempty");

        // The reverse gives a second chance at something good.
        let mut reversed = make_identity(n);
        for i in self.num_params..n {
            reversed[i] = self.num_params + n - 1 - i;
        }
        let reversed = adjust_order_by_priorities(&reversed, &priorities);
        let (reverse_indices, reverse_removed) = self.pick_indices_from_order(&reversed);
        let reverse_max = *reverse_indices.iter().max().expect("nonempty");

        if reverse_removed > removed_copies
            || (reverse_removed == removed_copies && reverse_max < max_index)
        {
            reverse_indices
        } else {
            indices
        }
    }

    /// Genetic search over orders. Fitness rewards fewer locals foremost,
    /// then resolved copies, with a small bonus per index left in place.
    fn pick_indices_learning(&self, num_vars: usize) -> Vec<usize> {
        if num_vars <= 1 {
            return self.pick_indices();
        }

        struct Order {
            order: Vec<usize>,
            fitness: f64,
        }

        struct OrderGenerator<'a, 'b> {
            parent: &'a Coalescing<'b>,
            noise: Noise,
            first: bool,
        }

        impl OrderGenerator<'_, '_> {
            fn finish(&self, order: Vec<usize>) -> Order {
                let (indices, removed_copies) = self.parent.pick_indices_from_order(&order);
                let max_index = *indices.iter().max().expect("nonempty");
                assert!(max_index <= self.parent.num_locals);
                let mut fitness = (self.parent.num_locals - max_index) as f64;
                // Not reordering locals unnecessarily is worth a little.
                let fragment = 1.0 / (2.0 * self.parent.num_locals as f64);
                for (i, &o) in order.iter().enumerate() {
                    if o == i {
                        fitness += fragment;
                    }
                }
                let fitness = 100.0 * fitness + removed_copies as f64;
                Order { order, fitness }
            }
        }

        impl Generator for OrderGenerator<'_, '_> {
            type Genome = Order;

            fn make_random(&mut self) -> Order {
                let mut order = make_identity(self.parent.num_locals);
                if self.first {
                    // Start from the natural order: there may be an inherent
                    // order in the input, and this puts the baseline result
                    // in the initial population.
                    self.first = false;
                } else {
                    self.noise.shuffle(&mut order[self.parent.num_params..]);
                }
                self.finish(order)
            }

            fn make_mixture(&mut self, left: &Order, right: &Order) -> Order {
                // Perturb left using right. Relative positions matter more
                // than absolute ones, so flip adjacent pairs that right
                // orders the other way, skipping past each swap so no
                // element is pushed far in one step.
                let size = left.order.len();
                let inverse_right = make_inverse(&right.order);
                let mut order = left.order.clone();
                let mut i = self.parent.num_params;
                while i + 1 < size {
                    if inverse_right[order[i]] > inverse_right[order[i + 1]] {
                        order.swap(i, i + 1);
                        i += 1;
                    }
                    i += 1;
                }
                self.finish(order)
            }

            fn fitness(&self, genome: &Order) -> f64 {
                genome.fitness
            }
        }

        let generation_size = std::cmp::min(num_vars * (num_vars - 1), 20);
        let generator = OrderGenerator {
            parent: self,
            noise: Noise::new(42),
            first: true,
        };
        let mut learner = GeneticLearner::new(generator, generation_size);
        // Keep working while generations improve.
        let mut old_best = learner.best_fitness();
        loop {
            learner.run_generation();
            let new_best = learner.best_fitness();
            if new_best == old_best {
                break;
            }
            old_best = new_best;
        }
        let (indices, _) = self.pick_indices_from_order(&learner.best().order);
        indices
    }
}

/// Re-sorts `baseline` so higher priorities come first; equal priorities
/// keep their baseline order.
fn adjust_order_by_priorities(baseline: &[usize], priorities: &[u32]) -> Vec<usize> {
    let inverse = make_inverse(baseline);
    let mut out = baseline.to_vec();
    out.sort_by(|&x, &y| priorities[y].cmp(&priorities[x]).then(inverse[x].cmp(&inverse[y])));
    out
}

// ── Rewrite ──────────────────────────────────────────────────────────────────

/// Maps every read and write through `indices`. In the same sweep, writes
/// that became self-copies and writes nothing reads are removed; their
/// actions demote to `Other`.
fn apply_indices(func: &mut Function, cfg: &mut Cfg, indices: &[usize], reach: &SetReach) {
    assert_eq!(indices.len(), func.num_locals());
    for block in &mut cfg.blocks {
        for action in &mut block.actions {
            match *action {
                Action::Get { index, expr } => {
                    let new_index = LocalId(indices[index.index()] as u32);
                    match &mut func.arena[expr].kind {
                        ExprKind::LocalGet { index } => *index = new_index,
                        other => panic!("get action points at {other:?}"),
                    }
                    *action = Action::Get {
                        index: new_index,
                        expr,
                    };
                }
                Action::Set { index, expr } => {
                    let new_index = LocalId(indices[index.index()] as u32);
                    match &mut func.arena[expr].kind {
                        ExprKind::LocalSet { index, .. } => *index = new_index,
                        other => panic!("set action points at {other:?}"),
                    }
                    *action = Action::Set {
                        index: new_index,
                        expr,
                    };
                    // A copy of a local onto itself does nothing. The value
                    // read was already remapped, so compare new indices.
                    let value = func.set_value(expr);
                    if let ExprKind::LocalGet { index: read_index } = func.arena[value].kind {
                        if read_index == new_index {
                            remove_set(func, expr);
                            *action = Action::Other { expr };
                            continue;
                        }
                    }
                    // A write nothing reads is dead.
                    if reach.gets_for(expr).is_empty() {
                        remove_set(func, expr);
                        *action = Action::Other { expr };
                    }
                }
                Action::Other { .. } => {}
            }
        }
    }

    // Rebuild the declared-variable types under the new numbering.
    let num_params = func.num_params();
    let old_num_locals = indices.len();
    let new_num_locals = indices
        .iter()
        .map(|&i| i + 1)
        .max()
        .unwrap_or(num_params)
        .max(num_params);
    let old_vars = func.vars.clone();
    let mut new_vars = vec![ValType::I32; new_num_locals - num_params];
    for index in num_params..old_num_locals {
        let new_index = indices[index];
        if new_index >= num_params {
            new_vars[new_index - num_params] = old_vars[index - num_params];
        }
    }
    func.vars = new_vars;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{Label, Literal};
    use crate::test_util::FuncBuilder;

    fn run(func: &mut Function) {
        CoalesceLocals::new().run_on_function(func).unwrap();
    }

    fn run_learning(func: &mut Function) {
        CoalesceLocals::with_learning()
            .run_on_function(func)
            .unwrap();
    }

    /// Collects the index of every surviving write, in tree order.
    fn surviving_sets(func: &Function) -> Vec<LocalId> {
        let mut out = vec![];
        func.visit_subtree(func.body, |_, expr| {
            if let ExprKind::LocalSet { index, .. } = &expr.kind {
                out.push(*index);
            }
        });
        out
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

    #[test]
    fn self_copy_through_param_slot_vanishes() {
        // $1 := get $0; return get $1 — $1 folds into $0, the copy goes
        // away, and the function needs no declared variables at all.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let g0 = b.local_get(LocalId(0), ValType::I32);
            let set = b.local_set(LocalId(1), g0);
            let g1 = b.local_get(LocalId(1), ValType::I32);
            let ret = b.return_(Some(g1));
            b.block(vec![set, ret])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 0, "the variable should fold into the param");
        assert!(surviving_sets(&func).is_empty(), "the copy should be removed");
        assert_eq!(read_indexes(&func), vec![LocalId(0)]);
    }

    #[test]
    fn interfering_locals_keep_two_slots() {
        // Both vars hold distinct opaque values with overlapping lifetimes.
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let v1 = b.placeholder_call(ValType::I32);
            let set1 = b.local_set(LocalId(0), v1);
            let v2 = b.placeholder_call(ValType::I32);
            let set2 = b.local_set(LocalId(1), v2);
            let g1 = b.local_get(LocalId(0), ValType::I32);
            let d1 = b.drop_(g1);
            let g2 = b.local_get(LocalId(1), ValType::I32);
            let d2 = b.drop_(g2);
            b.block(vec![set1, set2, d1, d2])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 2);
    }

    #[test]
    fn disjoint_locals_share_a_slot() {
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let v1 = b.placeholder_call(ValType::I32);
            let set1 = b.local_set(LocalId(0), v1);
            let g1 = b.local_get(LocalId(0), ValType::I32);
            let d1 = b.drop_(g1);
            let v2 = b.placeholder_call(ValType::I32);
            let set2 = b.local_set(LocalId(1), v2);
            let g2 = b.local_get(LocalId(1), ValType::I32);
            let d2 = b.drop_(g2);
            b.block(vec![set1, d1, set2, d2])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 1);
    }

    #[test]
    fn type_mismatch_prevents_sharing() {
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32, ValType::F64]);
        let body = {
            let mut b = fb.builder();
            let v1 = b.placeholder_call(ValType::I32);
            let set1 = b.local_set(LocalId(0), v1);
            let g1 = b.local_get(LocalId(0), ValType::I32);
            let d1 = b.drop_(g1);
            let v2 = b.placeholder_call(ValType::F64);
            let set2 = b.local_set(LocalId(1), v2);
            let g2 = b.local_get(LocalId(1), ValType::F64);
            let d2 = b.drop_(g2);
            b.block(vec![set1, d1, set2, d2])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 2);
        assert_eq!(func.vars, vec![ValType::I32, ValType::F64]);
    }

    #[test]
    fn used_zero_init_does_not_fold_into_param() {
        // $1 is read before any write; folding it into $0 would need an
        // explicit zero-init of the parameter slot.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let g1 = b.local_get(LocalId(1), ValType::I32);
            let d1 = b.drop_(g1);
            let g0 = b.local_get(LocalId(0), ValType::I32);
            let d0 = b.drop_(g0);
            b.block(vec![d1, d0])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 1, "zero-init var keeps its own slot");
        let reads = read_indexes(&func);
        assert_eq!(reads[0], LocalId(1));
        assert_eq!(reads[1], LocalId(0));
    }

    #[test]
    fn loop_back_edge_copy_is_removed() {
        // loop L { drop(get $0); $1 := get $0; $0 := get $1; br_if L (get $0) }
        // $1 only shuttles $0's value around the back edge; they coalesce
        // and both copies disappear.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let g0 = b.local_get(LocalId(0), ValType::I32);
            let d = b.drop_(g0);
            let g0b = b.local_get(LocalId(0), ValType::I32);
            let set_tmp = b.local_set(LocalId(1), g0b);
            let g1 = b.local_get(LocalId(1), ValType::I32);
            let set_back = b.local_set(LocalId(0), g1);
            let cond = b.local_get(LocalId(0), ValType::I32);
            let br = b.br_if(Label(0), cond);
            let inner = b.block(vec![d, set_tmp, set_back, br]);
            b.loop_(Label(0), inner)
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 0, "tmp coalesces into the param");
        assert!(surviving_sets(&func).is_empty(), "both copies become self-copies");
    }

    #[test]
    fn equivalent_constant_writes_may_merge() {
        // if (get $0) { $1 := 7 } else { $1 := 7 }; $2 := 7; use both.
        // The writes share an equivalence class, so $1 and $2 can share.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let cond = b.local_get(LocalId(0), ValType::I32);
            let c1 = b.i32_const(7);
            let set_a1 = b.local_set(LocalId(1), c1);
            let c2 = b.i32_const(7);
            let set_a2 = b.local_set(LocalId(1), c2);
            let iff = b.if_(cond, set_a1, Some(set_a2));
            let c3 = b.i32_const(7);
            let set_b = b.local_set(LocalId(2), c3);
            let g1 = b.local_get(LocalId(1), ValType::I32);
            let d1 = b.drop_(g1);
            let g2 = b.local_get(LocalId(2), ValType::I32);
            let d2 = b.drop_(g2);
            b.block(vec![iff, set_b, d1, d2])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert_eq!(func.vars.len(), 1);
    }

    #[test]
    fn dead_write_is_dropped_during_rewrite() {
        // $1 := call (side effect); nothing reads $1. The write goes, the
        // value stays as a drop.
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let v = b.opaque(
                Some(ValType::I32),
                vec![],
                crate::ir::effects::Effect::WRITES_STATE,
            );
            b.local_set(LocalId(0), v)
        };
        let mut func = fb.finish(body);
        run(&mut func);
        assert!(surviving_sets(&func).is_empty());
        assert!(matches!(func.arena[func.body].kind, ExprKind::Drop { .. }));
    }

    #[test]
    fn coalescing_is_idempotent() {
        let build = |fb: &mut FuncBuilder| {
            let mut b = fb.builder();
            let g0 = b.local_get(LocalId(0), ValType::I32);
            let set1 = b.local_set(LocalId(1), g0);
            let g1 = b.local_get(LocalId(1), ValType::I32);
            let set2 = b.local_set(LocalId(2), g1);
            let g2 = b.local_get(LocalId(2), ValType::I32);
            let ret = b.return_(Some(g2));
            b.block(vec![set1, set2, ret])
        };
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32, ValType::I32]);
        let body = build(&mut fb);
        let mut func = fb.finish(body);
        run(&mut func);
        let vars_after_one = func.vars.clone();
        let sets_after_one = surviving_sets(&func);
        let reads_after_one = read_indexes(&func);
        run(&mut func);
        assert_eq!(func.vars, vars_after_one);
        assert_eq!(surviving_sets(&func), sets_after_one);
        assert_eq!(read_indexes(&func), reads_after_one);
    }

    #[test]
    fn learning_variant_is_deterministic() {
        let build = || {
            let mut fb = FuncBuilder::new(
                vec![ValType::I32],
                vec![ValType::I32, ValType::I32, ValType::I32],
            );
            let body = {
                let mut b = fb.builder();
                let v1 = b.placeholder_call(ValType::I32);
                let set1 = b.local_set(LocalId(1), v1);
                let g1 = b.local_get(LocalId(1), ValType::I32);
                let set2 = b.local_set(LocalId(2), g1);
                let g2 = b.local_get(LocalId(2), ValType::I32);
                let set3 = b.local_set(LocalId(3), g2);
                let g3 = b.local_get(LocalId(3), ValType::I32);
                let ret = b.return_(Some(g3));
                b.block(vec![set1, set2, set3, ret])
            };
            fb.finish(body)
        };
        let mut a = build();
        let mut b = build();
        run_learning(&mut a);
        run_learning(&mut b);
        assert_eq!(a.vars, b.vars);
        assert_eq!(read_indexes(&a), read_indexes(&b));
        assert_eq!(surviving_sets(&a), surviving_sets(&b));
    }

    #[test]
    fn learning_matches_plain_on_chains() {
        // On a simple copy chain the learning variant should find at least
        // the plain result: everything folds into the parameter slot.
        let mut fb = FuncBuilder::new(vec![ValType::I32], vec![ValType::I32, ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let g0 = b.local_get(LocalId(0), ValType::I32);
            let set1 = b.local_set(LocalId(1), g0);
            let g1 = b.local_get(LocalId(1), ValType::I32);
            let set2 = b.local_set(LocalId(2), g1);
            let g2 = b.local_get(LocalId(2), ValType::I32);
            let ret = b.return_(Some(g2));
            b.block(vec![set1, set2, ret])
        };
        let mut func = fb.finish(body);
        run_learning(&mut func);
        assert_eq!(func.vars.len(), 0);
        assert!(surviving_sets(&func).is_empty());
        assert_eq!(read_indexes(&func), vec![LocalId(0)]);
    }

    #[test]
    fn constants_survive_remapping() {
        // Sanity: a constant-valued write that is read keeps its value.
        let mut fb = FuncBuilder::new(vec![], vec![ValType::I32]);
        let body = {
            let mut b = fb.builder();
            let c = b.i32_const(41);
            let set = b.local_set(LocalId(0), c);
            let g = b.local_get(LocalId(0), ValType::I32);
            let ret = b.return_(Some(g));
            b.block(vec![set, ret])
        };
        let mut func = fb.finish(body);
        run(&mut func);
        let mut constants = vec![];
        func.visit_subtree(func.body, |_, expr| {
            if let ExprKind::Const(lit) = &expr.kind {
                constants.push(*lit);
            }
        });
        assert_eq!(constants, vec![Literal::I32(41)]);
        assert_eq!(func.vars.len(), 1);
    }
}
