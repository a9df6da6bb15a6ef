//! Backward computation slices.
//!
//! A slice describes which iterations of a producer loop nest a consumer
//! needs: for every producer loop, a lower and an (exclusive) upper bound
//! map over the consumer's loop induction variables and outer symbols.
//!
//! # Derivation
//!
//! 1. Build the dependence system between the producer store and the
//!    consumer load, equating the shared loops.
//! 2. Project out the consumer loops deeper than the requested depth.
//! 3. Read off, for every producer induction variable, the tightest bounds
//!    expressible over what remains.

use crate::access::{is_valid_symbol, AffineValueMap, MemRefAccess};
use crate::constraints::FlatAffineConstraints;
use crate::dependence::build_dependence_system;
use crate::domain::{add_affine_for_domain, value_map_rows};
use crate::error::{AnalysisError, AnalysisResult};
use crate::nest::{get_loop_ivs, get_nesting_depth, get_num_common_surrounding_loops};
use log::debug;
use loopnest_ir::{simplify_affine_expr, AffineMap, Function, NodeId, ValueId};
use std::fmt;

// =============================================================================
// Slice State
// =============================================================================

/// Bounds on the loops of a producer nest, outermost first.
///
/// `lbs[i]`/`ubs[i]` bound `ivs[i]` and take `lb_operands[i]` /
/// `ub_operands[i]` as inputs, dims first. A missing entry leaves that loop
/// at its original bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputationSliceState {
    pub ivs: Vec<ValueId>,
    pub lbs: Vec<Option<AffineMap>>,
    pub ubs: Vec<Option<AffineMap>>,
    pub lb_operands: Vec<Vec<ValueId>>,
    pub ub_operands: Vec<Vec<ValueId>>,
}

impl ComputationSliceState {
    /// A slice over `ivs` with no bounds yet.
    pub fn new(ivs: Vec<ValueId>) -> Self {
        ComputationSliceState {
            ivs,
            ..Default::default()
        }
    }

    #[inline]
    pub fn num_ivs(&self) -> usize {
        self.ivs.len()
    }

    /// Lower bound of `ivs[i]` with its operands.
    pub fn lower_bound(&self, i: usize) -> Option<(&AffineMap, &[ValueId])> {
        let map = self.lbs.get(i)?.as_ref()?;
        let operands = self.lb_operands.get(i).map_or(&[][..], Vec::as_slice);
        Some((map, operands))
    }

    /// Upper bound (exclusive) of `ivs[i]` with its operands.
    pub fn upper_bound(&self, i: usize) -> Option<(&AffineMap, &[ValueId])> {
        let map = self.ubs.get(i)?.as_ref()?;
        let operands = self.ub_operands.get(i).map_or(&[][..], Vec::as_slice);
        Some((map, operands))
    }

    /// Every distinct bound operand, in first-use order.
    pub fn operands(&self) -> Vec<ValueId> {
        let mut out: Vec<ValueId> = Vec::new();
        for v in self.lb_operands.iter().chain(&self.ub_operands).flatten() {
            if !out.contains(v) {
                out.push(*v);
            }
        }
        out
    }

    /// Drop all bounds and operands; the induction variables stay.
    pub fn clear_bounds(&mut self) {
        self.lbs.clear();
        self.ubs.clear();
        self.lb_operands.clear();
        self.ub_operands.clear();
    }

    /// Reset `cst` to the iteration space of the slice: the sliced
    /// induction variables as dims and the bound operands as symbols.
    ///
    /// Constant operands are pinned, operands that are induction variables
    /// get their loop bounds, and each sliced loop gets its slice bounds or,
    /// where those are missing, its own loop bounds.
    pub fn get_as_constraints(
        &self,
        func: &Function,
        cst: &mut FlatAffineConstraints,
    ) -> AnalysisResult<()> {
        let operands = self.operands();
        let mut values = self.ivs.clone();
        values.extend_from_slice(&operands);
        *cst = FlatAffineConstraints::with_values(self.ivs.len(), operands.len(), &values);

        for (k, &v) in operands.iter().enumerate() {
            let col = self.ivs.len() + k;
            if let Some(c) = func.constant_value(v) {
                cst.set_id_to_constant(col, c);
            } else if let Some(loop_node) = func.induction_var_owner(v) {
                add_affine_for_domain(cst, func, loop_node)?;
            } else if !is_valid_symbol(func, v) {
                return Err(AnalysisError::NotAffine(v));
            }
        }

        for (i, &iv) in self.ivs.iter().enumerate() {
            let loop_node = func
                .induction_var_owner(iv)
                .ok_or(AnalysisError::SliceMismatch)?;
            let lower = self.lower_bound(i);
            let upper = self.upper_bound(i);
            if lower.is_none() || upper.is_none() {
                add_affine_for_domain(cst, func, loop_node)?;
            }
            add_slice_bounds(cst, func, iv, lower, upper)?;
        }
        Ok(())
    }
}

impl fmt::Display for ComputationSliceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "computation slice:")?;
        for (i, iv) in self.ivs.iter().enumerate() {
            write!(f, "  {}: ", iv)?;
            match self.lower_bound(i) {
                Some((map, ops)) => write!(f, "lb {} {:?}", map, ops)?,
                None => write!(f, "lb <none>")?,
            }
            match self.upper_bound(i) {
                Some((map, ops)) => writeln!(f, ", ub {} {:?}", map, ops)?,
                None => writeln!(f, ", ub <none>")?,
            }
        }
        Ok(())
    }
}

/// Add `lb <= iv < ub` for the given slice bounds. A single-result pair
/// with `ub == lb + 1` becomes the equality `iv == lb`. Bounds on ids that
/// `cst` does not have are ignored.
pub(crate) fn add_slice_bounds(
    cst: &mut FlatAffineConstraints,
    func: &Function,
    iv: ValueId,
    lower: Option<(&AffineMap, &[ValueId])>,
    upper: Option<(&AffineMap, &[ValueId])>,
) -> AnalysisResult<()> {
    if cst.find_id(iv).is_none() {
        return Ok(());
    }

    if let (Some((lb, lb_ops)), Some((ub, ub_ops))) = (lower, upper) {
        if lb.num_results() == 1 && ub.num_results() == 1 && lb_ops == ub_ops {
            let next = simplify_affine_expr(&(lb.result(0).clone() + 1), lb.num_dims(), lb.num_symbols());
            if ub.result(0) == &next {
                let vmap = AffineValueMap::compose(func, lb, lb_ops)?;
                for mut row in value_map_rows(cst, &vmap)? {
                    row.iter_mut().for_each(|c| *c = -*c);
                    row[slice_col(cst, iv)?] += 1;
                    cst.add_equality(&row);
                }
                return Ok(());
            }
        }
    }

    if let Some((lb, lb_ops)) = lower {
        let vmap = AffineValueMap::compose(func, lb, lb_ops)?;
        for mut row in value_map_rows(cst, &vmap)? {
            // iv - lb >= 0
            row.iter_mut().for_each(|c| *c = -*c);
            row[slice_col(cst, iv)?] += 1;
            cst.add_inequality(&row);
        }
    }
    if let Some((ub, ub_ops)) = upper {
        let vmap = AffineValueMap::compose(func, ub, ub_ops)?;
        for mut row in value_map_rows(cst, &vmap)? {
            // ub - 1 - iv >= 0
            row[slice_col(cst, iv)?] -= 1;
            let last = row.len() - 1;
            row[last] -= 1;
            cst.add_inequality(&row);
        }
    }
    Ok(())
}

fn slice_col(cst: &FlatAffineConstraints, iv: ValueId) -> AnalysisResult<usize> {
    cst.find_id(iv).ok_or(AnalysisError::SliceMismatch)
}

// =============================================================================
// Slice Engine
// =============================================================================

/// The slice of the nest around `src_op` needed by `dst_op` when the
/// producer is placed inside the outermost `dst_loop_depth` loops around
/// `dst_op`.
///
/// Fails if the accesses use different memrefs, are not affine, do not
/// depend on each other, or if some producer loop has no expressible bound.
pub fn get_backward_computation_slice_state(
    func: &Function,
    src_op: NodeId,
    dst_op: NodeId,
    dst_loop_depth: usize,
) -> AnalysisResult<ComputationSliceState> {
    let src = MemRefAccess::new(func, src_op)?;
    let dst = MemRefAccess::new(func, dst_op)?;
    if src.memref != dst.memref {
        return Err(AnalysisError::BufferMismatch);
    }
    let available = get_nesting_depth(func, dst_op);
    if dst_loop_depth > available {
        return Err(AnalysisError::InvalidLoopDepth {
            node: dst_op,
            depth: dst_loop_depth,
            available,
        });
    }

    let num_common = get_num_common_surrounding_loops(func, src_op, dst_op);
    let no_dependence = AnalysisError::NoDependence {
        src: src_op,
        dst: dst_op,
    };
    let system = build_dependence_system(func, &src, &dst, num_common + 1)?
        .ok_or_else(|| no_dependence.clone())?;
    if system.cst.is_empty() {
        return Err(no_dependence);
    }

    let mut cst = system.cst;
    let num_src = system.num_src_ivs;
    cst.project_out(num_src + dst_loop_depth, system.num_dst_ivs - dst_loop_depth);

    let dst_ivs = get_loop_ivs(func, dst_op);
    let mut operands: Vec<ValueId> = dst_ivs[..dst_loop_depth].to_vec();
    operands.extend(cst.id_values(cst.num_dims(), cst.num_dim_and_symbol_ids()));

    let mut slice = ComputationSliceState::new(get_loop_ivs(func, src_op));
    for (i, (lb, ub)) in cst.slice_bounds(num_src).into_iter().enumerate() {
        let lb = lb.ok_or(AnalysisError::UnboundedSlice(i))?;
        let ub = ub.ok_or(AnalysisError::UnboundedSlice(i))?;
        slice.lbs.push(Some(lb));
        slice.ubs.push(Some(ub));
        slice.lb_operands.push(operands.clone());
        slice.ub_operands.push(operands.clone());
    }
    debug!("{}", slice);
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopnest_ir::{AffineExpr, ElementType, FunctionBuilder, MemRefType};

    /// `for i in [0, 10): A[i] = 1; for i in [0, 10): load A[i + offset]`
    fn producer_consumer(offset: i64) -> (Function, NodeId, NodeId) {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[16], ElementType::F32));
        let (mut store, mut load) = (NodeId::INVALID, NodeId::INVALID);
        b.for_range(0, 10, |b, i| {
            let c = b.constant(1);
            store = b.store(c, a, AffineMap::identity(1), &[i]);
        });
        b.for_range(0, 10, |b, i| {
            load = b.load(a, AffineMap::single(1, 0, AffineExpr::dim(0) + offset), &[i]);
        });
        (b.finish(), store, load)
    }

    #[test]
    fn test_point_slice_at_depth_one() {
        let (func, store, load) = producer_consumer(0);
        let slice = get_backward_computation_slice_state(&func, store, load, 1).unwrap();
        assert_eq!(slice.num_ivs(), 1);
        let (lb, lb_ops) = slice.lower_bound(0).unwrap();
        let (ub, _) = slice.upper_bound(0).unwrap();
        assert_eq!(lb.to_string(), "(d0) -> (d0)");
        assert_eq!(ub.to_string(), "(d0) -> (d0 + 1)");
        assert_eq!(lb_ops, get_loop_ivs(&func, load).as_slice());
    }

    #[test]
    fn test_shifted_consumer() {
        let (func, store, load) = producer_consumer(2);
        let slice = get_backward_computation_slice_state(&func, store, load, 1).unwrap();
        let (lb, _) = slice.lower_bound(0).unwrap();
        assert_eq!(lb.to_string(), "(d0) -> (d0 + 2)");
    }

    #[test]
    fn test_depth_zero_slice_is_whole_range() {
        let (func, store, load) = producer_consumer(0);
        let slice = get_backward_computation_slice_state(&func, store, load, 0).unwrap();
        let (lb, ops) = slice.lower_bound(0).unwrap();
        let (ub, _) = slice.upper_bound(0).unwrap();
        assert!(ops.is_empty());
        assert_eq!(lb.single_constant_result(), Some(0));
        assert_eq!(ub.single_constant_result(), Some(10));
    }

    #[test]
    fn test_invalid_depth_and_no_dependence() {
        let (func, store, load) = producer_consumer(0);
        assert!(matches!(
            get_backward_computation_slice_state(&func, store, load, 2),
            Err(AnalysisError::InvalidLoopDepth { depth: 2, available: 1, .. })
        ));

        // the consumer reads past everything the producer writes
        let (func, store, load) = producer_consumer(10);
        assert!(matches!(
            get_backward_computation_slice_state(&func, store, load, 1),
            Err(AnalysisError::NoDependence { .. })
        ));
    }

    #[test]
    fn test_clear_bounds_keeps_ivs() {
        let (func, store, load) = producer_consumer(0);
        let mut slice = get_backward_computation_slice_state(&func, store, load, 1).unwrap();
        slice.clear_bounds();
        assert_eq!(slice.num_ivs(), 1);
        assert!(slice.lbs.is_empty());
        assert!(slice.ub_operands.is_empty());
        assert!(slice.lower_bound(0).is_none());
    }

    #[test]
    fn test_get_as_constraints() {
        let (func, store, load) = producer_consumer(0);
        let slice = get_backward_computation_slice_state(&func, store, load, 1).unwrap();
        let mut cst = FlatAffineConstraints::default();
        slice.get_as_constraints(&func, &mut cst).unwrap();

        // dims: src i; symbols: dst i
        assert_eq!(cst.num_dims(), 1);
        assert_eq!(cst.num_symbols(), 1);
        assert_eq!(cst.id_value(0), Some(slice.ivs[0]));
        // src i == dst i, and dst i is within its loop
        assert_eq!(cst.constant_lower_bound(0), Some(0));
        assert_eq!(cst.constant_upper_bound(0), Some(9));
        let mut pinned = cst.clone();
        pinned.set_id_to_constant(1, 4);
        pinned.add_constant_lower_bound(0, 5);
        assert!(pinned.is_empty());

        // without bounds the source loop's own range applies
        let mut cleared = slice.clone();
        cleared.clear_bounds();
        cleared.get_as_constraints(&func, &mut cst).unwrap();
        assert_eq!(cst.num_symbols(), 0);
        assert_eq!(cst.constant_upper_bound(0), Some(9));
    }
}
