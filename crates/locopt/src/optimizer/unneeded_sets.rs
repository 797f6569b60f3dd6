//! Final sweep over trivially unneeded writes: writes to an index nothing
//! reads, and writes that store the local's own current value.
//!
//! The other passes strand such writes rather than chase them — copy
//! propagation redirects reads and leaves the bypassed copies unread, and
//! redundant-set elimination is told to leave its debris to a later
//! vacuum. Removal runs to a fixpoint: dropping one write can erase the
//! last read of another index and strand its writes in turn.

use crate::ir::local_utils::UnneededSetRemover;
use crate::ir::types::Function;
use crate::optimizer::Pass;
use anyhow::Result;
use tracing::debug;

#[derive(Default)]
pub struct UnneededSetRemoval;

impl UnneededSetRemoval {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for UnneededSetRemoval {
    fn name(&self) -> &'static str {
        "unneeded-set-removal"
    }

    fn is_function_parallel(&self) -> bool {
        true
    }

    fn run_on_function(&mut self, func: &mut Function) -> Result<()> {
        debug!("unneeded-set-removal: {}", func.name);
        while UnneededSetRemover::run(func) {}
        Ok(())
    }
}
