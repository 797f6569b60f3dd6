//! Analyses shared by the optimization passes: the set-reaches-use graph,
//! value-equivalence classes, interference, and the single-assignment
//! oracle.

pub mod equivalence;
pub mod interference;
pub mod local_graph;
pub mod set_reach;

pub use equivalence::Equivalences;
pub use interference::Interferences;
pub use local_graph::LocalGraph;
pub use set_reach::SetReach;
