//! A reference interpreter for loop-nest functions.
//!
//! Memrefs are flat row-major `i64` buffers; every scalar is an `i64`.
//! Only statically shaped memrefs are supported.

#![allow(dead_code)]

use loopnest_ir::{AffineBound, AffineMap, BlockId, Function, NodeKind, Operation, Operator, ValueId};
use rustc_hash::FxHashMap;

pub struct Interpreter<'f> {
    func: &'f Function,
    values: FxHashMap<ValueId, i64>,
    buffers: FxHashMap<ValueId, Vec<i64>>,
}

impl<'f> Interpreter<'f> {
    pub fn new(func: &'f Function) -> Self {
        Interpreter {
            func,
            values: FxHashMap::default(),
            buffers: FxHashMap::default(),
        }
    }

    /// Bind an index argument.
    pub fn with_argument(mut self, arg: ValueId, value: i64) -> Self {
        self.values.insert(arg, value);
        self
    }

    /// Run the entry block and return the contents of every allocated
    /// memref.
    pub fn run(mut self) -> FxHashMap<ValueId, Vec<i64>> {
        self.run_block(BlockId::Entry);
        self.buffers
    }

    fn run_block(&mut self, block: BlockId) {
        let func = self.func;
        for &node in func.block(block) {
            match &func.node(node).kind {
                NodeKind::Operation(op) => self.run_op(op),
                NodeKind::For(f) => {
                    let lb = self.eval_bound(&f.lower).into_iter().max().unwrap();
                    let ub = self.eval_bound(&f.upper).into_iter().min().unwrap();
                    let mut iv = lb;
                    while iv < ub {
                        self.values.insert(f.iv, iv);
                        self.run_block(BlockId::Body(node));
                        iv += f.step;
                    }
                }
                NodeKind::If(cond) => {
                    let set = &cond.condition;
                    let inputs: Vec<i64> = cond.operands.iter().map(|v| self.values[v]).collect();
                    let (dims, syms) = inputs.split_at(set.num_dims());
                    if set.contains(dims, syms).unwrap() {
                        self.run_block(BlockId::Then(node));
                    } else {
                        self.run_block(BlockId::Else(node));
                    }
                }
            }
        }
    }

    fn eval_bound(&self, bound: &AffineBound) -> Vec<i64> {
        self.eval_map(&bound.map, &bound.operands)
    }

    fn eval_map(&self, map: &AffineMap, operands: &[ValueId]) -> Vec<i64> {
        let inputs: Vec<i64> = operands.iter().map(|v| self.values[v]).collect();
        let (dims, syms) = inputs.split_at(map.num_dims());
        map.evaluate(dims, syms).unwrap()
    }

    fn offset(&self, memref: ValueId, subscripts: &[i64]) -> usize {
        let ty = self.func.memref_type(memref).unwrap();
        let mut offset = 0;
        for (d, &s) in subscripts.iter().enumerate() {
            let extent = ty.dim_size(d).unwrap();
            assert!((0..extent).contains(&s), "subscript {} out of [0, {})", s, extent);
            offset = offset * extent + s;
        }
        offset as usize
    }

    fn run_op(&mut self, op: &Operation) {
        let func = self.func;
        match &op.op {
            Operator::Alloc => {
                let memref = op.results[0];
                let ty = func.memref_type(memref).unwrap();
                let len: i64 = ty.shape().iter().map(|d| d.unwrap()).product();
                self.buffers.insert(memref, vec![0; len as usize]);
            }
            Operator::Constant(c) => {
                self.values.insert(op.results[0], *c);
            }
            Operator::Arith(kind) => {
                let lhs = self.values[&op.operands[0]];
                let rhs = self.values[&op.operands[1]];
                self.values.insert(op.results[0], kind.apply(lhs, rhs));
            }
            Operator::Apply(map) => {
                let r = self.eval_map(map, &op.operands)[0];
                self.values.insert(op.results[0], r);
            }
            Operator::Load(map) => {
                let memref = op.operands[0];
                let subscripts = self.eval_map(map, &op.operands[1..]);
                let at = self.offset(memref, &subscripts);
                let v = self.buffers[&memref][at];
                self.values.insert(op.results[0], v);
            }
            Operator::Store(map) => {
                let v = self.values[&op.operands[0]];
                let memref = op.operands[1];
                let subscripts = self.eval_map(map, &op.operands[2..]);
                let at = self.offset(memref, &subscripts);
                self.buffers.get_mut(&memref).unwrap()[at] = v;
            }
        }
    }
}
