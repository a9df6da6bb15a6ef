//! Memory accesses and affine value maps.
//!
//! Access subscripts and loop bounds are affine maps applied to IR values.
//! Before they can be lowered into a constraint system every operand has to
//! be classified: loop induction variables become dimensions, loop-invariant
//! values become symbols, constants are folded, and `affine.apply` results
//! are composed into the map that uses them.

use crate::error::{AnalysisError, AnalysisResult};
use loopnest_ir::{
    simplify_affine_expr, AffineExpr, AffineMap, Function, NodeId, Operator, ValueDef, ValueId,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

// =============================================================================
// Operand Classification
// =============================================================================

/// Whether `value` is loop-invariant everywhere it can be used: a function
/// argument, a constant, a value defined at the top level of the function,
/// or an `affine.apply` of valid symbols.
pub fn is_valid_symbol(func: &Function, value: ValueId) -> bool {
    match func.value(value).def {
        ValueDef::Argument(_) => true,
        ValueDef::InductionVar(_) => false,
        ValueDef::Result { node, .. } => {
            if func.parent(node).is_none() {
                return true;
            }
            match func.operation(node) {
                Some(op) => match &op.op {
                    Operator::Constant(_) => true,
                    Operator::Apply(_) => op.operands.iter().all(|&v| is_valid_symbol(func, v)),
                    _ => false,
                },
                None => false,
            }
        }
    }
}

/// Whether `value` may be used as an affine dimension: a loop induction
/// variable or a valid symbol.
pub fn is_valid_dim(func: &Function, value: ValueId) -> bool {
    func.induction_var_owner(value).is_some() || is_valid_symbol(func, value)
}

// =============================================================================
// Affine Value Map
// =============================================================================

/// An affine map together with the values bound to its inputs, dims first.
///
/// Dims are induction variables; symbols are valid symbols. No operand is a
/// constant or an `affine.apply` result: those are folded into the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffineValueMap {
    map: AffineMap,
    operands: Vec<ValueId>,
}

impl AffineValueMap {
    /// Compose `map(operands)` through constants and `affine.apply` chains.
    pub fn compose(func: &Function, map: &AffineMap, operands: &[ValueId]) -> AnalysisResult<Self> {
        debug_assert_eq!(map.num_inputs(), operands.len());
        let mut composer = Composer::new(func);
        let inputs = operands
            .iter()
            .map(|&v| composer.resolve(v))
            .collect::<AnalysisResult<Vec<_>>>()?;
        let (dim_inputs, sym_inputs) = inputs.split_at(map.num_dims());
        let num_dims = composer.dims.len();
        let num_symbols = composer.symbols.len();
        let results = map
            .results()
            .iter()
            .map(|e| {
                let e = e.replace_dims_and_symbols(dim_inputs, sym_inputs);
                simplify_affine_expr(&e, num_dims, num_symbols)
            })
            .collect();

        let mut values = composer.dims;
        values.extend(composer.symbols);
        Ok(AffineValueMap {
            map: AffineMap::new(num_dims, num_symbols, results),
            operands: values,
        })
    }

    #[inline]
    pub fn map(&self) -> &AffineMap {
        &self.map
    }

    #[inline]
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.map.num_dims()
    }

    #[inline]
    pub fn num_symbols(&self) -> usize {
        self.map.num_symbols()
    }

    #[inline]
    pub fn num_results(&self) -> usize {
        self.map.num_results()
    }
}

/// Resolves values to affine expressions over a growing list of dim and
/// symbol values.
struct Composer<'f> {
    func: &'f Function,
    dims: Vec<ValueId>,
    symbols: Vec<ValueId>,
    cache: FxHashMap<ValueId, AffineExpr>,
}

impl<'f> Composer<'f> {
    fn new(func: &'f Function) -> Self {
        Composer {
            func,
            dims: Vec::new(),
            symbols: Vec::new(),
            cache: FxHashMap::default(),
        }
    }

    fn resolve(&mut self, value: ValueId) -> AnalysisResult<AffineExpr> {
        if let Some(expr) = self.cache.get(&value) {
            return Ok(expr.clone());
        }
        let expr = self.resolve_uncached(value)?;
        self.cache.insert(value, expr.clone());
        Ok(expr)
    }

    fn resolve_uncached(&mut self, value: ValueId) -> AnalysisResult<AffineExpr> {
        if let Some(c) = self.func.constant_value(value) {
            return Ok(AffineExpr::constant(c));
        }
        if self.func.induction_var_owner(value).is_some() {
            return Ok(AffineExpr::dim(position_or_push(&mut self.dims, value)));
        }
        if let Some(apply) = self
            .func
            .defining_node(value)
            .and_then(|n| self.func.operation(n))
        {
            if let Operator::Apply(map) = &apply.op {
                let inputs = apply
                    .operands
                    .iter()
                    .map(|&v| self.resolve(v))
                    .collect::<AnalysisResult<Vec<_>>>()?;
                let (dims, syms) = inputs.split_at(map.num_dims());
                return Ok(map.result(0).replace_dims_and_symbols(dims, syms));
            }
        }
        if is_valid_symbol(self.func, value) {
            return Ok(AffineExpr::symbol(position_or_push(&mut self.symbols, value)));
        }
        Err(AnalysisError::NotAffine(value))
    }
}

fn position_or_push(list: &mut Vec<ValueId>, value: ValueId) -> usize {
    match list.iter().position(|&v| v == value) {
        Some(p) => p,
        None => {
            list.push(value);
            list.len() - 1
        }
    }
}

// =============================================================================
// Memory Access
// =============================================================================

/// A load or store: the buffer, the subscript map with its operands, and the
/// direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRefAccess {
    pub op: NodeId,
    pub memref: ValueId,
    pub is_store: bool,
    pub map: AffineMap,
    pub indices: SmallVec<[ValueId; 4]>,
}

impl MemRefAccess {
    pub fn new(func: &Function, op: NodeId) -> AnalysisResult<Self> {
        let operation = func
            .operation(op)
            .filter(|o| o.is_access())
            .ok_or(AnalysisError::NotAnAccess(op))?;
        let map = operation
            .access_map()
            .ok_or(AnalysisError::NotAnAccess(op))?
            .clone();
        let memref = operation.memref().ok_or(AnalysisError::NotAnAccess(op))?;
        Ok(MemRefAccess {
            op,
            memref,
            is_store: operation.is_store(),
            map,
            indices: operation.indices().iter().copied().collect(),
        })
    }

    /// Number of subscripts, i.e. the rank of the accessed memref.
    #[inline]
    pub fn rank(&self) -> usize {
        self.map.num_results()
    }

    /// The subscript map composed down to induction variables and symbols.
    pub fn access_map(&self, func: &Function) -> AnalysisResult<AffineValueMap> {
        AffineValueMap::compose(func, &self.map, &self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopnest_ir::{ArithOp, ElementType, FunctionBuilder, MemRefType};

    #[test]
    fn test_compose_through_apply_and_constant() {
        let mut b = FunctionBuilder::new("f");
        let n = b.index_argument();
        let a = b.alloc(MemRefType::new(&[64], ElementType::F32));
        let mut load = NodeId::INVALID;
        b.for_range(0, 8, |b, i| {
            let two = b.constant(2);
            // t = 2 * i + n
            let t = b.apply(
                AffineMap::new(2, 1, vec![AffineExpr::dim(0) * AffineExpr::dim(1) + AffineExpr::symbol(0)]),
                &[i, two, n],
            );
            load = b.load(a, AffineMap::single(1, 0, AffineExpr::dim(0) + 1), &[t]);
        });
        let func = b.finish();

        let access = MemRefAccess::new(&func, load).unwrap();
        let vmap = access.access_map(&func).unwrap();
        assert_eq!(vmap.num_dims(), 1);
        assert_eq!(vmap.num_symbols(), 1);
        assert_eq!(vmap.operands()[1], n);
        assert_eq!(vmap.map().result(0).evaluate(&[3], &[10]), Some(17));
    }

    #[test]
    fn test_non_affine_operand_is_rejected() {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[64], ElementType::F32));
        let mut load = NodeId::INVALID;
        let mut product = ValueId::INVALID;
        b.for_range(0, 8, |b, i| {
            product = b.arith(ArithOp::Mul, i, i);
            load = b.load(a, AffineMap::identity(1), &[product]);
        });
        let func = b.finish();

        let access = MemRefAccess::new(&func, load).unwrap();
        assert_eq!(
            access.access_map(&func),
            Err(AnalysisError::NotAffine(product))
        );
    }

    #[test]
    fn test_valid_symbols() {
        let mut b = FunctionBuilder::new("f");
        let n = b.index_argument();
        let top = b.apply(AffineMap::single(0, 1, AffineExpr::symbol(0) + 1), &[n]);
        let mut inner_const = ValueId::INVALID;
        let mut iv = ValueId::INVALID;
        b.for_range(0, 4, |b, i| {
            iv = i;
            inner_const = b.constant(3);
        });
        let func = b.finish();

        assert!(is_valid_symbol(&func, n));
        assert!(is_valid_symbol(&func, top));
        assert!(is_valid_symbol(&func, inner_const));
        assert!(!is_valid_symbol(&func, iv));
        assert!(is_valid_dim(&func, iv));
    }

    #[test]
    fn test_not_an_access() {
        let mut b = FunctionBuilder::new("f");
        let c = b.constant(1);
        let func = b.finish();
        let node = func.defining_node(c).unwrap();
        assert_eq!(
            MemRefAccess::new(&func, node),
            Err(AnalysisError::NotAnAccess(node))
        );
    }
}
