//! Equivalence classes over writes and literal constants.
//!
//! Two writes in the same class provably store the same value at the point
//! each completes. The engine builds a graph with one node per write plus
//! one node per observed literal (pre-seeded with the zero of every scalar
//! type), connects them, and flood-fills class colors:
//!
//! - a *direct* edge joins a write to the sole producer of its value — the
//!   single reaching write of a read, a tee, or the literal node for a
//!   constant — and propagates bidirectionally;
//! - *merge* edges record a read with several reaching writes; the merge
//!   node joins a class only once every merged-in node carries it.
//!
//! The flood is restartable: a merge node may be revisited when a later
//! discovery satisfies its inputs. Revisits that would re-assign the class
//! being flooded are no-ops, so each (node, class) pair is processed at
//! most once and the fill terminates.

use crate::analysis::set_reach::SetReach;
use crate::cfg::Cfg;
use crate::ir::properties::unused_fallthrough;
use crate::ir::types::{ExprId, ExprKind, Function, Literal, ValType};
use crate::support::work_list::WorkList;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Node {
    /// The write this node stands for; `None` for a pure literal node.
    set: Option<ExprId>,
    /// The literal this node also represents, if any.
    literal: Option<Literal>,
    directs: Vec<usize>,
    merges_in: Vec<usize>,
    merges_out: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct Equivalences {
    set_classes: BTreeMap<ExprId, u32>,
    literal_classes: HashMap<Literal, u32>,
}

impl Equivalences {
    pub fn compute(func: &Function, cfg: &Cfg, reach: &SetReach) -> Self {
        let mut nodes: Vec<Node> = vec![];
        let mut set_nodes: BTreeMap<ExprId, usize> = BTreeMap::new();
        let mut literal_nodes: HashMap<Literal, usize> = HashMap::new();

        // One node per write, in block/action order.
        for &b in &cfg.live_blocks {
            for action in &cfg.blocks[b.index()].actions {
                if let Some((_, write)) = action.as_set() {
                    let idx = nodes.len();
                    nodes.push(Node {
                        set: Some(write),
                        ..Node::default()
                    });
                    set_nodes.insert(write, idx);
                }
            }
        }
        // Zero literals of every scalar type: the implicit initial value of
        // declared variables, whether or not any constant mentions it.
        for ty in ValType::ALL {
            let idx = nodes.len();
            nodes.push(Node {
                literal: Some(ty.zero()),
                ..Node::default()
            });
            literal_nodes.insert(ty.zero(), idx);
        }

        fn add_direct(nodes: &mut [Node], a: usize, b: usize) {
            nodes[a].directs.push(b);
            nodes[b].directs.push(a);
        }
        fn add_merge_in(nodes: &mut [Node], node: usize, input: usize) {
            nodes[node].merges_in.push(input);
            nodes[input].merges_out.push(node);
        }

        // Connections, following each write's value through fallthrough.
        for i in 0..nodes.len() {
            let Some(write) = nodes[i].set else { continue };
            let value = unused_fallthrough(func, func.set_value(write));
            match &func.arena[value].kind {
                ExprKind::LocalSet { tee: true, .. } => {
                    if let Some(&tee_node) = set_nodes.get(&value) {
                        add_direct(&mut nodes, i, tee_node);
                    }
                }
                ExprKind::LocalGet { .. } => {
                    let sets = reach.sets_for(value);
                    if sets.len() == 1 {
                        let only = *sets.iter().next().expect("nonempty");
                        if let Some(&other) = set_nodes.get(&only) {
                            add_direct(&mut nodes, i, other);
                        }
                    } else if sets.len() > 1 {
                        for &other_set in sets {
                            if let Some(&other) = set_nodes.get(&other_set) {
                                add_merge_in(&mut nodes, i, other);
                            }
                        }
                    }
                }
                ExprKind::Const(literal) => {
                    if let Some(&lit_node) = literal_nodes.get(literal) {
                        add_direct(&mut nodes, i, lit_node);
                    } else {
                        // First sight of this literal: the write's node
                        // doubles as the literal node.
                        literal_nodes.insert(*literal, i);
                        nodes[i].literal = Some(*literal);
                    }
                }
                _ => {}
            }
        }

        // Colored flood fill.
        let mut classes = vec![0u32; nodes.len()];
        let mut curr_class = 0u32;
        for start in 0..nodes.len() {
            if classes[start] != 0 {
                continue;
            }
            curr_class += 1;
            let mut work: WorkList<usize> = WorkList::new();
            work.push(start);
            while let Some(n) = work.pop() {
                // A node may arrive here already holding an older class when
                // a merge became satisfied later; overwriting is correct.
                // Only re-processing the current class would loop.
                if classes[n] == curr_class {
                    continue;
                }
                classes[n] = curr_class;
                for &d in &nodes[n].directs {
                    work.push(d);
                }
                for &m in &nodes[n].merges_out {
                    if classes[m] == curr_class {
                        continue;
                    }
                    assert!(!nodes[m].merges_in.is_empty());
                    if nodes[m]
                        .merges_in
                        .iter()
                        .all(|&input| classes[input] == curr_class)
                    {
                        work.push(m);
                    }
                }
            }
        }

        let mut set_classes = BTreeMap::new();
        let mut literal_classes = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            assert_ne!(classes[i], 0, "node left unclassified by flood fill");
            if let Some(write) = node.set {
                set_classes.insert(write, classes[i]);
            }
            if let Some(literal) = node.literal {
                literal_classes.insert(literal, classes[i]);
            }
        }
        Self {
            set_classes,
            literal_classes,
        }
    }

    /// The class of a write; 0 means the write is unknown to the engine.
    pub fn class_of_set(&self, write: ExprId) -> u32 {
        self.set_classes.get(&write).copied().unwrap_or(0)
    }

    /// The class of a write that must be known.
    pub fn known_class(&self, write: ExprId) -> u32 {
        let class = self.class_of_set(write);
        assert_ne!(class, 0, "write {write} has no equivalence class");
        class
    }

    pub fn class_of_literal(&self, literal: Literal) -> u32 {
        self.literal_classes.get(&literal).copied().unwrap_or(0)
    }

    pub fn are_equivalent(&self, a: ExprId, b: ExprId) -> bool {
        self.known_class(a) == self.known_class(b)
    }
}
