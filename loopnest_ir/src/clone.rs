//! Deep cloning of loop-nest subtrees.
//!
//! Cloning a subtree copies every nested node, allocates fresh result values
//! and induction variables, and rewrites operands so that uses inside the
//! clone refer to the cloned definitions. Values defined outside the subtree
//! are shared with the original.
//!
//! # Algorithm
//!
//! 1. **Collect Phase**: gather the subtree in pre-order.
//! 2. **Allocation Phase**: allocate each node with an empty body and fresh
//!    values, recording old-to-new node and value maps.
//! 3. **Remap Phase**: rewrite operands, bound operands and child lists
//!    through the maps, then attach the new root at the insertion point.

use crate::function::Function;
use crate::node::{BlockId, Node, NodeId, NodeKind, ValueDef, ValueId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

// =============================================================================
// Clone Result
// =============================================================================

/// Old-to-new mappings produced by a clone.
#[derive(Debug)]
pub struct CloneResult {
    /// Root of the cloned subtree.
    pub root: NodeId,
    pub node_map: FxHashMap<NodeId, NodeId>,
    pub value_map: FxHashMap<ValueId, ValueId>,
}

impl CloneResult {
    /// The clone of `old`, if it was part of the subtree.
    pub fn map_node(&self, old: NodeId) -> Option<NodeId> {
        self.node_map.get(&old).copied()
    }

    /// The clone of `old`, or `old` itself if it was defined outside.
    pub fn map_value(&self, old: ValueId) -> ValueId {
        self.value_map.get(&old).copied().unwrap_or(old)
    }
}

// =============================================================================
// Subtree Cloner
// =============================================================================

/// Clones a subtree of a function into another block of the same function.
#[derive(Debug)]
pub struct SubtreeCloner {
    root: NodeId,
}

impl SubtreeCloner {
    pub fn new(root: NodeId) -> Self {
        SubtreeCloner { root }
    }

    /// Clone into `dest` at `index`.
    pub fn clone_into(self, func: &mut Function, dest: BlockId, index: usize) -> CloneResult {
        let mut value_map: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        let mut node_map: FxHashMap<NodeId, NodeId> = FxHashMap::default();

        // Phase 1: collect
        let originals = func.descendants(self.root);

        // Phase 2: allocate nodes with empty blocks and fresh values
        for &old in &originals {
            let old_node = func.node(old).clone();
            let (old_results, old_iv) = match &old_node.kind {
                NodeKind::Operation(op) => (op.results.clone(), None),
                NodeKind::For(f) => (SmallVec::new(), Some(f.iv)),
                NodeKind::If(_) => (SmallVec::new(), None),
            };
            let mut kind = old_node.kind;
            match &mut kind {
                NodeKind::Operation(op) => op.results.clear(),
                NodeKind::For(f) => f.body.clear(),
                NodeKind::If(i) => {
                    i.then_body.clear();
                    i.else_body.clear();
                }
            }
            let new = func.nodes.alloc(Node {
                kind,
                block: BlockId::Entry,
                loc: old_node.loc,
            });
            node_map.insert(old, new);

            let mut new_results = SmallVec::<[ValueId; 1]>::new();
            for (i, r) in old_results.into_iter().enumerate() {
                let ty = func.value_type(r).clone();
                let nr = func.alloc_value(ValueDef::Result { node: new, index: i }, ty);
                value_map.insert(r, nr);
                new_results.push(nr);
            }
            match &mut func.node_mut(new).kind {
                NodeKind::Operation(op) => op.results = new_results,
                NodeKind::For(_) | NodeKind::If(_) => {}
            }
            if let Some(old_iv) = old_iv {
                let ty = func.value_type(old_iv).clone();
                let iv = func.alloc_value(ValueDef::InductionVar(new), ty);
                value_map.insert(old_iv, iv);
                if let Some(f) = func.node_mut(new).as_for_mut() {
                    f.iv = iv;
                }
            }
        }

        // Phase 3: remap operands and children
        let remap = |v: &mut ValueId, map: &FxHashMap<ValueId, ValueId>| {
            if let Some(&n) = map.get(v) {
                *v = n;
            }
        };
        for &old in &originals {
            let new = node_map[&old];
            let (children, then_children, else_children) = match &func.node(old).kind {
                NodeKind::Operation(_) => (Vec::new(), Vec::new(), Vec::new()),
                NodeKind::For(f) => (f.body.clone(), Vec::new(), Vec::new()),
                NodeKind::If(i) => (Vec::new(), i.then_body.clone(), i.else_body.clone()),
            };
            let map_children = |list: Vec<NodeId>| -> Vec<NodeId> {
                list.into_iter().map(|c| node_map[&c]).collect()
            };
            let (children, then_children, else_children) = (
                map_children(children),
                map_children(then_children),
                map_children(else_children),
            );

            for &c in &children {
                func.node_mut(c).block = BlockId::Body(new);
            }
            for &c in &then_children {
                func.node_mut(c).block = BlockId::Then(new);
            }
            for &c in &else_children {
                func.node_mut(c).block = BlockId::Else(new);
            }

            match &mut func.node_mut(new).kind {
                NodeKind::Operation(op) => {
                    for v in op.operands.iter_mut() {
                        remap(v, &value_map);
                    }
                }
                NodeKind::For(f) => {
                    for v in f.lower.operands.iter_mut().chain(f.upper.operands.iter_mut()) {
                        remap(v, &value_map);
                    }
                    f.body = children;
                }
                NodeKind::If(i) => {
                    for v in i.operands.iter_mut() {
                        remap(v, &value_map);
                    }
                    i.then_body = then_children;
                    i.else_body = else_children;
                }
            }
        }

        let root = node_map[&self.root];
        func.attach(root, dest, index);

        CloneResult {
            root,
            node_map,
            value_map,
        }
    }
}
