//! Functions: node and value arenas plus the block tree.

use crate::affine_map::IntegerSet;
use crate::arena::Arena;
use crate::diagnostics::Location;
use crate::node::{
    AffineBound, AffineFor, AffineIf, BlockId, Node, NodeId, NodeKind, Operation, Operator,
    Value, ValueDef, ValueId,
};
use crate::types::{MemRefType, Type};
use smallvec::SmallVec;

/// A function body: the arenas owning every node and value, and the
/// top-level block.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    pub(crate) nodes: Arena<Node>,
    pub(crate) values: Arena<Value>,
    arguments: Vec<ValueId>,
    entry: Vec<NodeId>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            nodes: Arena::new(),
            values: Arena::new(),
            arguments: Vec::new(),
            entry: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_argument(&mut self, ty: Type) -> ValueId {
        let id = self.values.alloc(Value {
            def: ValueDef::Argument(self.arguments.len()),
            ty,
        });
        self.arguments.push(id);
        id
    }

    #[inline]
    pub fn arguments(&self) -> &[ValueId] {
        &self.arguments
    }

    // =========================================================================
    // Access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    #[inline]
    pub fn value_type(&self, id: ValueId) -> &Type {
        &self.values[id].ty
    }

    pub fn memref_type(&self, id: ValueId) -> Option<&MemRefType> {
        self.values[id].ty.as_memref()
    }

    pub fn operation(&self, id: NodeId) -> Option<&Operation> {
        self.nodes[id].as_operation()
    }

    pub fn affine_for(&self, id: NodeId) -> Option<&AffineFor> {
        self.nodes[id].as_for()
    }

    /// Total number of nodes ever created, including erased ones.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Loop that owns `value` as its induction variable.
    pub fn induction_var_owner(&self, value: ValueId) -> Option<NodeId> {
        match self.values[value].def {
            ValueDef::InductionVar(node) => Some(node),
            _ => None,
        }
    }

    /// Operation node defining `value`.
    pub fn defining_node(&self, value: ValueId) -> Option<NodeId> {
        match self.values[value].def {
            ValueDef::Result { node, .. } => Some(node),
            _ => None,
        }
    }

    /// The constant produced by `value`, if defined by a constant op.
    pub fn constant_value(&self, value: ValueId) -> Option<i64> {
        let node = self.defining_node(value)?;
        match self.nodes[node].as_operation()?.op {
            Operator::Constant(c) => Some(c),
            _ => None,
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn block(&self, block: BlockId) -> &[NodeId] {
        match block {
            BlockId::Entry => &self.entry,
            BlockId::Body(n) => match &self.nodes[n].kind {
                NodeKind::For(f) => &f.body,
                _ => panic!("{:?} does not own a loop body", n),
            },
            BlockId::Then(n) => match &self.nodes[n].kind {
                NodeKind::If(i) => &i.then_body,
                _ => panic!("{:?} does not own a then block", n),
            },
            BlockId::Else(n) => match &self.nodes[n].kind {
                NodeKind::If(i) => &i.else_body,
                _ => panic!("{:?} does not own an else block", n),
            },
        }
    }

    fn block_mut(&mut self, block: BlockId) -> &mut Vec<NodeId> {
        match block {
            BlockId::Entry => &mut self.entry,
            BlockId::Body(n) => match &mut self.nodes[n].kind {
                NodeKind::For(f) => &mut f.body,
                _ => panic!("{:?} does not own a loop body", n),
            },
            BlockId::Then(n) => match &mut self.nodes[n].kind {
                NodeKind::If(i) => &mut i.then_body,
                _ => panic!("{:?} does not own a then block", n),
            },
            BlockId::Else(n) => match &mut self.nodes[n].kind {
                NodeKind::If(i) => &mut i.else_body,
                _ => panic!("{:?} does not own an else block", n),
            },
        }
    }

    /// Index of `node` inside its block.
    pub fn position_in_block(&self, node: NodeId) -> Option<usize> {
        let block = self.nodes[node].block;
        self.block(block).iter().position(|&n| n == node)
    }

    /// Parent loop or conditional of `node`.
    #[inline]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent()
    }

    /// Enclosing loops and conditionals, innermost first.
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            func: self,
            next: self.parent(node),
        }
    }

    /// True if `ancestor` strictly encloses `node`.
    pub fn is_proper_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    /// Whether `node` is reachable from the entry block.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if self.position_in_block(current).is_none() {
                return false;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return true,
            }
        }
    }

    // =========================================================================
    // Walks
    // =========================================================================

    /// Pre-order walk of `root` and everything nested in it.
    pub fn walk(&self, root: NodeId, f: &mut impl FnMut(NodeId)) {
        f(root);
        match &self.nodes[root].kind {
            NodeKind::Operation(_) => {}
            NodeKind::For(l) => {
                for &child in &l.body {
                    self.walk(child, f);
                }
            }
            NodeKind::If(i) => {
                for &child in i.then_body.iter().chain(&i.else_body) {
                    self.walk(child, f);
                }
            }
        }
    }

    /// `root` and its nested nodes in pre-order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(root, &mut |n| out.push(n));
        out
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn alloc_node(&mut self, kind: NodeKind, block: BlockId, index: usize, loc: Location) -> NodeId {
        let id = self.nodes.alloc(Node { kind, block, loc });
        self.block_mut(block).insert(index, id);
        id
    }

    pub(crate) fn alloc_value(&mut self, def: ValueDef, ty: Type) -> ValueId {
        self.values.alloc(Value { def, ty })
    }

    /// Create an operation at `index` in `block`, allocating one result per
    /// entry of `result_types`.
    pub fn insert_operation(
        &mut self,
        block: BlockId,
        index: usize,
        op: Operator,
        operands: &[ValueId],
        result_types: &[Type],
        loc: Location,
    ) -> NodeId {
        let kind = NodeKind::Operation(Operation {
            op,
            operands: operands.iter().copied().collect(),
            results: SmallVec::new(),
        });
        let id = self.alloc_node(kind, block, index, loc);
        let results: SmallVec<[ValueId; 1]> = result_types
            .iter()
            .enumerate()
            .map(|(i, ty)| self.alloc_value(ValueDef::Result { node: id, index: i }, ty.clone()))
            .collect();
        if let NodeKind::Operation(op) = &mut self.nodes[id].kind {
            op.results = results;
        }
        id
    }

    /// Create an empty loop at `index` in `block`.
    pub fn insert_for(
        &mut self,
        block: BlockId,
        index: usize,
        lower: AffineBound,
        upper: AffineBound,
        step: i64,
        loc: Location,
    ) -> NodeId {
        assert!(step > 0, "loop step must be positive");
        let kind = NodeKind::For(AffineFor {
            iv: ValueId::INVALID,
            lower,
            upper,
            step,
            body: Vec::new(),
        });
        let id = self.alloc_node(kind, block, index, loc);
        let iv = self.alloc_value(ValueDef::InductionVar(id), Type::Index);
        if let NodeKind::For(f) = &mut self.nodes[id].kind {
            f.iv = iv;
        }
        id
    }

    /// Create an empty conditional at `index` in `block`.
    pub fn insert_if(
        &mut self,
        block: BlockId,
        index: usize,
        condition: IntegerSet,
        operands: &[ValueId],
        loc: Location,
    ) -> NodeId {
        debug_assert_eq!(condition.num_inputs(), operands.len());
        let kind = NodeKind::If(AffineIf {
            condition,
            operands: operands.iter().copied().collect(),
            then_body: Vec::new(),
            else_body: Vec::new(),
        });
        self.alloc_node(kind, block, index, loc)
    }

    /// Insert a detached node at `index` in `block`.
    pub(crate) fn attach(&mut self, node: NodeId, block: BlockId, index: usize) {
        self.nodes[node].block = block;
        self.block_mut(block).insert(index, node);
    }

    /// Detach `node` (and its nested nodes) from its block. Ids stay
    /// allocated but are no longer reachable from the entry block.
    pub fn erase(&mut self, node: NodeId) {
        let block = self.nodes[node].block;
        self.block_mut(block).retain(|&n| n != node);
    }

    /// Replace the bounds of a loop. `None` keeps the existing bound.
    pub fn set_loop_bounds(
        &mut self,
        loop_node: NodeId,
        lower: Option<AffineBound>,
        upper: Option<AffineBound>,
    ) {
        let f = self.nodes[loop_node]
            .as_for_mut()
            .unwrap_or_else(|| panic!("{:?} is not a loop", loop_node));
        if let Some(lower) = lower {
            f.lower = lower;
        }
        if let Some(upper) = upper {
            f.upper = upper;
        }
    }
}

/// Iterator over enclosing loops and conditionals, innermost first.
pub struct Ancestors<'f> {
    func: &'f Function,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.func.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementType;

    #[test]
    fn test_insert_and_ancestry() {
        let mut func = Function::new("f");
        let outer = func.insert_for(
            BlockId::Entry,
            0,
            AffineBound::constant(0),
            AffineBound::constant(4),
            1,
            Location::new(1, 1),
        );
        let inner = func.insert_for(
            BlockId::Body(outer),
            0,
            AffineBound::constant(0),
            AffineBound::constant(4),
            1,
            Location::new(2, 3),
        );
        let c = func.insert_operation(
            BlockId::Body(inner),
            0,
            Operator::Constant(1),
            &[],
            &[Type::Index],
            Location::new(3, 5),
        );

        assert_eq!(func.parent(c), Some(inner));
        assert_eq!(func.ancestors(c).collect::<Vec<_>>(), vec![inner, outer]);
        assert!(func.is_proper_ancestor(outer, c));
        assert!(!func.is_proper_ancestor(c, outer));
        assert_eq!(func.descendants(outer), vec![outer, inner, c]);

        let iv = func.affine_for(inner).unwrap().iv;
        assert_eq!(func.induction_var_owner(iv), Some(inner));
        let result = func.operation(c).unwrap().result().unwrap();
        assert_eq!(func.constant_value(result), Some(1));
    }

    #[test]
    fn test_erase_detaches_subtree() {
        let mut func = Function::new("f");
        let a = func.add_argument(Type::MemRef(MemRefType::new(&[4], ElementType::F32)));
        let first = func.insert_for(
            BlockId::Entry,
            0,
            AffineBound::constant(0),
            AffineBound::constant(4),
            1,
            Location::UNKNOWN,
        );
        let second = func.insert_for(
            BlockId::Entry,
            1,
            AffineBound::constant(0),
            AffineBound::constant(4),
            1,
            Location::UNKNOWN,
        );
        assert_eq!(func.position_in_block(second), Some(1));
        assert!(func.memref_type(a).is_some());

        func.erase(first);
        assert_eq!(func.block(BlockId::Entry), &[second]);
        assert!(!func.is_attached(first));
        assert!(func.is_attached(second));
        assert_eq!(func.position_in_block(second), Some(0));
    }

    #[test]
    fn test_set_loop_bounds_keeps_unspecified_side() {
        let mut func = Function::new("f");
        let l = func.insert_for(
            BlockId::Entry,
            0,
            AffineBound::constant(0),
            AffineBound::constant(8),
            1,
            Location::UNKNOWN,
        );
        func.set_loop_bounds(l, Some(AffineBound::constant(2)), None);
        let f = func.affine_for(l).unwrap();
        assert_eq!(f.lower.as_constant(), Some(2));
        assert_eq!(f.upper.as_constant(), Some(8));
    }
}
