//! locopt — local-variable optimizer for WebAssembly function bodies.
//!
//! Operates on an in-memory tree IR of a single function (structured
//! control flow, reads and writes of indexed locals) and rewrites it to
//! use fewer and better-placed locals:
//!
//! - **coalesce-locals** merges non-interfering locals, greedily or with a
//!   deterministic genetic search over allocation orders;
//! - **copy-propagation** rewrites reads of single-assignment locals to
//!   their earliest equivalent producer;
//! - **redundant-set-elimination** drops writes that store a value the
//!   local already holds.
//!
//! All passes are per-function and run function-parallel across a module.
//! Everything the passes share — control-flow graph with liveness, the
//! set-reaches-use graph, value-equivalence classes, interference — lives
//! in [`cfg`] and [`analysis`].

pub mod analysis;
pub mod cfg;
pub mod ir;
pub mod optimizer;
pub mod support;

#[cfg(test)]
mod test_util;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use ir::{Builder, Function, Module};
pub use optimizer::{optimize_module, run_pass, OptimizeOptions, Pass};
