//! Ergonomic construction of loop nests.
//!
//! The builder appends to a current block; `for_loop` and `if_then` run a
//! closure with the insertion point moved into the new block and restore it
//! afterwards. Every created node gets a synthetic location: one line per
//! node, column reflecting nesting.
//!
//! ```
//! use loopnest_ir::{AffineBound, AffineMap, ElementType, FunctionBuilder, MemRefType};
//!
//! let mut b = FunctionBuilder::new("copy");
//! let src = b.alloc(MemRefType::new(&[16], ElementType::F32));
//! let dst = b.alloc(MemRefType::new(&[16], ElementType::F32));
//! b.for_loop(AffineBound::constant(0), AffineBound::constant(16), |b, i| {
//!     let load = b.load(src, AffineMap::identity(1), &[i]);
//!     let v = b.result(load);
//!     b.store(v, dst, AffineMap::identity(1), &[i]);
//! });
//! let func = b.finish();
//! assert_eq!(func.block(loopnest_ir::BlockId::Entry).len(), 3);
//! ```

use crate::affine_map::{AffineMap, IntegerSet};
use crate::diagnostics::Location;
use crate::function::Function;
use crate::node::{AffineBound, ArithOp, BlockId, NodeId, Operator, ValueId};
use crate::types::{ElementType, MemRefType, Type};

#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    block: BlockId,
    depth: u32,
    next_line: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            func: Function::new(name),
            block: BlockId::Entry,
            depth: 0,
            next_line: 1,
        }
    }

    /// The function built so far.
    #[inline]
    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn next_loc(&mut self) -> Location {
        let loc = Location::new(self.next_line, 1 + 2 * self.depth);
        self.next_line += 1;
        loc
    }

    fn append(&mut self, op: Operator, operands: &[ValueId], result_types: &[Type]) -> NodeId {
        let loc = self.next_loc();
        let index = self.func.block(self.block).len();
        self.func
            .insert_operation(self.block, index, op, operands, result_types, loc)
    }

    /// The first result of `node`.
    pub fn result(&self, node: NodeId) -> ValueId {
        self.func
            .operation(node)
            .and_then(|op| op.result())
            .unwrap_or(ValueId::INVALID)
    }

    // =========================================================================
    // Values
    // =========================================================================

    pub fn argument(&mut self, ty: Type) -> ValueId {
        self.func.add_argument(ty)
    }

    /// An index-typed function argument, usable as a symbol.
    pub fn index_argument(&mut self) -> ValueId {
        self.func.add_argument(Type::Index)
    }

    pub fn memref_argument(&mut self, ty: MemRefType) -> ValueId {
        self.func.add_argument(Type::MemRef(ty))
    }

    pub fn alloc(&mut self, ty: MemRefType) -> ValueId {
        let node = self.append(Operator::Alloc, &[], &[Type::MemRef(ty)]);
        self.result(node)
    }

    pub fn constant(&mut self, value: i64) -> ValueId {
        let node = self.append(Operator::Constant(value), &[], &[Type::Index]);
        self.result(node)
    }

    pub fn arith(&mut self, op: ArithOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.func.value_type(lhs).clone();
        let node = self.append(Operator::Arith(op), &[lhs, rhs], &[ty]);
        self.result(node)
    }

    pub fn apply(&mut self, map: AffineMap, operands: &[ValueId]) -> ValueId {
        debug_assert_eq!(map.num_results(), 1);
        debug_assert_eq!(map.num_inputs(), operands.len());
        let node = self.append(Operator::Apply(map), operands, &[Type::Index]);
        self.result(node)
    }

    // =========================================================================
    // Memory Accesses
    // =========================================================================

    /// `affine.load memref[map(indices)]`; returns the load node.
    pub fn load(&mut self, memref: ValueId, map: AffineMap, indices: &[ValueId]) -> NodeId {
        debug_assert_eq!(map.num_inputs(), indices.len());
        let element = self
            .func
            .memref_type(memref)
            .map_or(ElementType::I64, MemRefType::element_type);
        let mut operands = Vec::with_capacity(indices.len() + 1);
        operands.push(memref);
        operands.extend_from_slice(indices);
        self.append(Operator::Load(map), &operands, &[Type::Scalar(element)])
    }

    /// `affine.store value, memref[map(indices)]`; returns the store node.
    pub fn store(
        &mut self,
        value: ValueId,
        memref: ValueId,
        map: AffineMap,
        indices: &[ValueId],
    ) -> NodeId {
        debug_assert_eq!(map.num_inputs(), indices.len());
        let mut operands = Vec::with_capacity(indices.len() + 2);
        operands.push(value);
        operands.push(memref);
        operands.extend_from_slice(indices);
        self.append(Operator::Store(map), &operands, &[])
    }

    // =========================================================================
    // Structured Nodes
    // =========================================================================

    /// Unit-step loop over `[lower, upper)`.
    pub fn for_loop<F>(&mut self, lower: AffineBound, upper: AffineBound, body: F) -> NodeId
    where
        F: FnOnce(&mut Self, ValueId),
    {
        self.for_loop_step(lower, upper, 1, body)
    }

    /// Loop over the constant range `[lower, upper)`.
    pub fn for_range<F>(&mut self, lower: i64, upper: i64, body: F) -> NodeId
    where
        F: FnOnce(&mut Self, ValueId),
    {
        self.for_loop(AffineBound::constant(lower), AffineBound::constant(upper), body)
    }

    pub fn for_loop_step<F>(
        &mut self,
        lower: AffineBound,
        upper: AffineBound,
        step: i64,
        body: F,
    ) -> NodeId
    where
        F: FnOnce(&mut Self, ValueId),
    {
        let loc = self.next_loc();
        let index = self.func.block(self.block).len();
        let node = self.func.insert_for(self.block, index, lower, upper, step, loc);
        let iv = self
            .func
            .affine_for(node)
            .map_or(ValueId::INVALID, |f| f.iv);

        let saved = self.block;
        self.block = BlockId::Body(node);
        self.depth += 1;
        body(self, iv);
        self.depth -= 1;
        self.block = saved;
        node
    }

    pub fn if_then<F>(&mut self, condition: IntegerSet, operands: &[ValueId], then: F) -> NodeId
    where
        F: FnOnce(&mut Self),
    {
        self.if_then_else(condition, operands, then, |_| {})
    }

    pub fn if_then_else<F, G>(
        &mut self,
        condition: IntegerSet,
        operands: &[ValueId],
        then: F,
        otherwise: G,
    ) -> NodeId
    where
        F: FnOnce(&mut Self),
        G: FnOnce(&mut Self),
    {
        let loc = self.next_loc();
        let index = self.func.block(self.block).len();
        let node = self.func.insert_if(self.block, index, condition, operands, loc);

        let saved = self.block;
        self.depth += 1;
        self.block = BlockId::Then(node);
        then(self);
        self.block = BlockId::Else(node);
        otherwise(self);
        self.depth -= 1;
        self.block = saved;
        node
    }
}
