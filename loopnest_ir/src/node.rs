//! IR node and value definitions.
//!
//! # Structure
//!
//! A function body is a tree of blocks. Every node sits in exactly one block
//! and is one of three kinds:
//!
//! - [`Operation`]: a leaf computation (`alloc`, constants, arithmetic,
//!   `affine.apply`, `affine.load`, `affine.store`);
//! - [`AffineFor`]: a loop owning a body block and defining an induction
//!   variable;
//! - [`AffineIf`]: a conditional owning a then block and an else block.
//!
//! Parents are reached through the node's [`BlockId`], a back-reference that
//! names the owning loop or conditional. Ownership of children lives in the
//! parent's block vectors.

use crate::affine_map::{AffineMap, IntegerSet};
use crate::arena::Id;
use crate::diagnostics::Location;
use crate::types::Type;
use smallvec::SmallVec;

/// ID for IR nodes.
pub type NodeId = Id<Node>;

/// ID for SSA values.
pub type ValueId = Id<Value>;

// =============================================================================
// Values
// =============================================================================

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Function argument at the given position.
    Argument(usize),
    /// Result `index` of an operation node.
    Result { node: NodeId, index: usize },
    /// Induction variable of a loop node.
    InductionVar(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub def: ValueDef,
    pub ty: Type,
}

// =============================================================================
// Blocks
// =============================================================================

/// Identifies an ordered list of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    /// Top-level body of the function.
    Entry,
    /// Body of a loop.
    Body(NodeId),
    /// Then branch of a conditional.
    Then(NodeId),
    /// Else branch of a conditional.
    Else(NodeId),
}

impl BlockId {
    /// The loop or conditional owning the block; `None` at top level.
    #[inline]
    pub fn owner(self) -> Option<NodeId> {
        match self {
            BlockId::Entry => None,
            BlockId::Body(n) | BlockId::Then(n) | BlockId::Else(n) => Some(n),
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl ArithOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            ArithOp::Add => lhs.wrapping_add(rhs),
            ArithOp::Sub => lhs.wrapping_sub(rhs),
            ArithOp::Mul => lhs.wrapping_mul(rhs),
        }
    }
}

/// What an operation computes. Operand layout per operator:
///
/// | Operator | Operands | Results |
/// |---|---|---|
/// | `Alloc` | - | memref |
/// | `Constant` | - | index |
/// | `Arith` | lhs, rhs | scalar |
/// | `Apply(map)` | map inputs | index |
/// | `Load(map)` | memref, map inputs | element |
/// | `Store(map)` | value, memref, map inputs | - |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Alloc,
    Constant(i64),
    Arith(ArithOp),
    Apply(AffineMap),
    Load(AffineMap),
    Store(AffineMap),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Alloc => "alloc",
            Operator::Constant(_) => "constant",
            Operator::Arith(ArithOp::Add) => "addi",
            Operator::Arith(ArithOp::Sub) => "subi",
            Operator::Arith(ArithOp::Mul) => "muli",
            Operator::Apply(_) => "affine.apply",
            Operator::Load(_) => "affine.load",
            Operator::Store(_) => "affine.store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub op: Operator,
    pub operands: SmallVec<[ValueId; 4]>,
    pub results: SmallVec<[ValueId; 1]>,
}

impl Operation {
    #[inline]
    pub fn is_load(&self) -> bool {
        matches!(self.op, Operator::Load(_))
    }

    #[inline]
    pub fn is_store(&self) -> bool {
        matches!(self.op, Operator::Store(_))
    }

    #[inline]
    pub fn is_access(&self) -> bool {
        self.is_load() || self.is_store()
    }

    /// Access map of a load or store.
    pub fn access_map(&self) -> Option<&AffineMap> {
        match &self.op {
            Operator::Load(map) | Operator::Store(map) => Some(map),
            _ => None,
        }
    }

    /// Memref operand of a load or store.
    pub fn memref(&self) -> Option<ValueId> {
        match self.op {
            Operator::Load(_) => self.operands.first().copied(),
            Operator::Store(_) => self.operands.get(1).copied(),
            _ => None,
        }
    }

    /// Index operands (map inputs) of a load or store.
    pub fn indices(&self) -> &[ValueId] {
        match self.op {
            Operator::Load(_) => &self.operands[1..],
            Operator::Store(_) => &self.operands[2..],
            _ => &[],
        }
    }

    /// The single result, if any.
    pub fn result(&self) -> Option<ValueId> {
        self.results.first().copied()
    }
}

// =============================================================================
// Loops and Conditionals
// =============================================================================

/// A loop bound: map plus operands. Lower bounds take the max of the
/// results, upper bounds (exclusive) the min.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineBound {
    pub map: AffineMap,
    pub operands: SmallVec<[ValueId; 4]>,
}

impl AffineBound {
    pub fn new(map: AffineMap, operands: &[ValueId]) -> Self {
        debug_assert_eq!(map.num_inputs(), operands.len());
        AffineBound {
            map,
            operands: operands.iter().copied().collect(),
        }
    }

    pub fn constant(value: i64) -> Self {
        AffineBound {
            map: AffineMap::constant(value),
            operands: SmallVec::new(),
        }
    }

    /// `value` itself as a bound, e.g. an outer induction variable.
    pub fn value(value: ValueId) -> Self {
        Self::new(AffineMap::identity(1), &[value])
    }

    #[inline]
    pub fn as_constant(&self) -> Option<i64> {
        self.map.single_constant_result()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineFor {
    pub iv: ValueId,
    pub lower: AffineBound,
    pub upper: AffineBound,
    pub step: i64,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineIf {
    pub condition: IntegerSet,
    pub operands: SmallVec<[ValueId; 4]>,
    pub then_body: Vec<NodeId>,
    pub else_body: Vec<NodeId>,
}

// =============================================================================
// Node
// =============================================================================

/// The closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Operation(Operation),
    For(AffineFor),
    If(AffineIf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// Block that currently holds the node.
    pub block: BlockId,
    pub loc: Location,
}

impl Node {
    /// The node's parent loop or conditional.
    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.block.owner()
    }

    #[inline]
    pub fn as_operation(&self) -> Option<&Operation> {
        match &self.kind {
            NodeKind::Operation(op) => Some(op),
            _ => None,
        }
    }

    #[inline]
    pub fn as_for(&self) -> Option<&AffineFor> {
        match &self.kind {
            NodeKind::For(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_for_mut(&mut self) -> Option<&mut AffineFor> {
        match &mut self.kind {
            NodeKind::For(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_if(&self) -> Option<&AffineIf> {
        match &self.kind {
            NodeKind::If(i) => Some(i),
            _ => None,
        }
    }

    #[inline]
    pub fn is_for(&self) -> bool {
        matches!(self.kind, NodeKind::For(_))
    }

    /// True for loads and stores.
    #[inline]
    pub fn is_access(&self) -> bool {
        self.as_operation().map_or(false, Operation::is_access)
    }
}
