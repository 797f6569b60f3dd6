//! Optimization passes over function-local variables.
//!
//! Each pass is a self-contained sub-module implementing [`Pass`]. Passes
//! declare whether they are function-parallel; the runner executes a
//! function-parallel pass concurrently across a module's functions, one
//! pass instance per worker, since no pass reaches across functions.
//!
//! Valid IR in, valid IR out: there is no recoverable error inside a pass.
//! Invariant violations are compiler bugs and abort with a diagnostic
//! naming the function.

use crate::ir::types::{Function, Module};
use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::debug;

mod coalesce_locals;
mod copy_propagation;
mod redundant_set_elimination;
mod unneeded_sets;

pub use coalesce_locals::CoalesceLocals;
pub use copy_propagation::CopyPropagation;
pub use redundant_set_elimination::RedundantSetElimination;
pub use unneeded_sets::UnneededSetRemoval;

/// A function-level optimization pass.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Whether the runner may invoke this pass concurrently across the
    /// functions of a module.
    fn is_function_parallel(&self) -> bool;

    fn run_on_function(&mut self, func: &mut Function) -> Result<()>;
}

/// Runs the pass built by `factory` over every function of `module`.
///
/// Function-parallel passes run on the rayon pool, each worker
/// initializing its own pass instance. No pass reaches across functions,
/// so the rewritten IR is deterministic regardless of scheduling.
pub fn run_pass<P, F>(module: &mut Module, factory: F) -> Result<()>
where
    P: Pass,
    F: Fn() -> P + Sync,
{
    if !factory().is_function_parallel() || module.functions.len() <= 1 {
        let mut pass = factory();
        for func in &mut module.functions {
            run_one(&mut pass, func)?;
        }
        return Ok(());
    }
    module
        .functions
        .par_iter_mut()
        .try_for_each_init(|| factory(), |pass, func| run_one(pass, func))
}

fn run_one<P: Pass>(pass: &mut P, func: &mut Function) -> Result<()> {
    pass.run_on_function(func)
        .with_context(|| format!("pass {} failed on function {}", pass.name(), func.name))
}

/// Options for the standard local-optimization pipeline.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    /// Use the order-searching coalescer variant. Slower, sometimes finds
    /// tighter allocations.
    pub coalesce_learning: bool,
}

/// The standard pipeline: propagate copies, coalesce, drop writes the
/// coalesced form made redundant, then sweep the writes the earlier passes
/// stranded.
pub fn optimize_module(module: &mut Module, options: &OptimizeOptions) -> Result<()> {
    debug!(
        "optimizing module with {} function(s)",
        module.functions.len()
    );
    run_pass(module, CopyPropagation::new)?;
    if options.coalesce_learning {
        run_pass(module, CoalesceLocals::with_learning)?;
    } else {
        run_pass(module, CoalesceLocals::new)?;
    }
    run_pass(module, RedundantSetElimination::new)?;
    run_pass(module, UnneededSetRemoval::new)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{ExprKind, LocalId, ValType};
    use crate::test_util::FuncBuilder;

    fn copy_chain_func(name: &str) -> Function {
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
        func.name = name.into();
        func
    }

    fn summary(func: &Function) -> (usize, Vec<LocalId>, Vec<LocalId>) {
        let mut sets = vec![];
        let mut gets = vec![];
        func.visit_subtree(func.body, |_, expr| match &expr.kind {
            ExprKind::LocalSet { index, .. } => sets.push(*index),
            ExprKind::LocalGet { index } => gets.push(*index),
            _ => {}
        });
        (func.vars.len(), sets, gets)
    }

    #[test]
    fn pipeline_collapses_copy_chains() {
        let mut module = Module {
            functions: vec![copy_chain_func("f")],
        };
        optimize_module(&mut module, &OptimizeOptions::default()).unwrap();
        let (vars, sets, gets) = summary(&module.functions[0]);
        assert_eq!(vars, 0);
        assert!(sets.is_empty());
        assert_eq!(gets, vec![LocalId(0)]);
    }

    #[test]
    fn parallel_run_matches_sequential_per_function() {
        // Many copies of the same function: every one must come out
        // identical, however the chunks landed on workers.
        let functions: Vec<Function> = (0..16)
            .map(|i| copy_chain_func(&format!("f{i}")))
            .collect();
        let mut module = Module { functions };
        optimize_module(&mut module, &OptimizeOptions::default()).unwrap();
        let first = summary(&module.functions[0]);
        for func in &module.functions {
            assert_eq!(summary(func), first);
        }
    }

    #[test]
    fn pipeline_is_idempotent() {
        let mut module = Module {
            functions: vec![copy_chain_func("f")],
        };
        let options = OptimizeOptions::default();
        optimize_module(&mut module, &options).unwrap();
        let after_one = summary(&module.functions[0]);
        optimize_module(&mut module, &options).unwrap();
        assert_eq!(summary(&module.functions[0]), after_one);
    }
}
