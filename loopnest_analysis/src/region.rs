//! Memory regions touched by accesses.
//!
//! A [`MemRefRegion`] is a constraint system whose first `rank` dims are the
//! coordinates of the accessed elements. Every other id is a symbol: the
//! induction variables of the loops above the requested depth, the slice
//! operands, and outer values used by subscripts and bounds.

use crate::access::MemRefAccess;
use crate::constraints::{DimExtent, FlatAffineConstraints};
use crate::domain::{
    add_affine_for_domain, add_affine_if_domain, enclosing_then_conditions, value_map_rows,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::nest::{enclosing_loops, get_loop_ivs};
use crate::slice::{add_slice_bounds, ComputationSliceState};
use log::{debug, trace};
use loopnest_ir::{Function, Location, MemRefType, NodeId, ValueId};
use smallvec::SmallVec;

/// Size in bytes of a statically shaped memref.
pub fn get_memref_size_in_bytes(ty: &MemRefType) -> Option<u64> {
    let mut elements: u64 = 1;
    for &dim in ty.shape() {
        elements = elements.checked_mul(u64::try_from(dim?).ok()?)?;
    }
    elements.checked_mul(ty.element_type().byte_width())
}

/// Constant extents of a region's bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingShape {
    /// Extent of each dimension.
    pub shape: SmallVec<[i64; 4]>,
    /// Product of the extents.
    pub num_elements: u64,
    /// Per dimension, the lower bound over `[symbols, const]`, to be
    /// floor-divided by the matching entry of `lb_divisors`.
    pub lbs: Vec<Vec<i64>>,
    pub lb_divisors: Vec<i64>,
}

// =============================================================================
// Region
// =============================================================================

#[derive(Debug, Clone)]
pub struct MemRefRegion {
    memref: ValueId,
    write: bool,
    loc: Location,
    memref_type: MemRefType,
    cst: FlatAffineConstraints,
}

impl MemRefRegion {
    /// The region accessed by `op` over the iterations of its enclosing
    /// loops deeper than `loop_depth`; the outer `loop_depth` induction
    /// variables stay symbolic and unconstrained.
    ///
    /// With a `slice`, its loop-induction-variable operands get their loop
    /// bounds and the sliced loops are restricted to the slice bounds.
    pub fn compute(
        func: &Function,
        op: NodeId,
        loop_depth: usize,
        slice: Option<&ComputationSliceState>,
    ) -> AnalysisResult<Self> {
        let access = MemRefAccess::new(func, op)?;
        let memref_type = func
            .memref_type(access.memref)
            .cloned()
            .ok_or(AnalysisError::NotAnAccess(op))?;
        let rank = access.rank();
        if rank != memref_type.rank() {
            return Err(AnalysisError::NotAnAccess(op));
        }
        let loops = enclosing_loops(func, op);
        let ivs = get_loop_ivs(func, op);
        if loop_depth > ivs.len() {
            return Err(AnalysisError::InvalidLoopDepth {
                node: op,
                depth: loop_depth,
                available: ivs.len(),
            });
        }
        let vmap = access.access_map(func)?;

        let mut cst = FlatAffineConstraints::new(rank, 0, 0);
        for &iv in &ivs[loop_depth..] {
            cst.append_dim_id(Some(iv));
        }
        for &iv in &ivs[..loop_depth] {
            cst.append_symbol_id(Some(iv));
        }
        for &l in &loops[loop_depth..] {
            add_affine_for_domain(&mut cst, func, l)?;
        }
        for c in enclosing_then_conditions(func, op) {
            add_affine_if_domain(&mut cst, func, c)?;
        }

        if let Some(slice) = slice {
            for v in slice.operands() {
                if cst.contains_id(v) {
                    continue;
                }
                cst.append_symbol_id(Some(v));
                if let Some(loop_node) = func.induction_var_owner(v) {
                    add_affine_for_domain(&mut cst, func, loop_node)?;
                }
            }
            for (i, &iv) in slice.ivs.iter().enumerate() {
                add_slice_bounds(&mut cst, func, iv, slice.lower_bound(i), slice.upper_bound(i))?;
            }
        }

        // d_r == subscript_r
        for (r, mut row) in value_map_rows(&mut cst, &vmap)?.into_iter().enumerate() {
            row.iter_mut().for_each(|c| *c = -*c);
            row[r] += 1;
            cst.add_equality(&row);
        }

        for &iv in &ivs[loop_depth..] {
            cst.project_out_value(iv);
        }
        let num_locals = cst.num_locals();
        cst.project_out(cst.num_dim_and_symbol_ids(), num_locals);
        cst.remove_trivial_redundancy();
        let num_symbols = cst.num_dim_and_symbol_ids() - rank;
        cst.set_dim_symbol_separation(num_symbols);

        let region = MemRefRegion {
            memref: access.memref,
            write: access.is_store,
            loc: func.node(op).loc,
            memref_type,
            cst,
        };
        debug!(
            "region of {} on {} at depth {}: {} symbols",
            op,
            region.memref,
            loop_depth,
            region.cst.num_symbols()
        );
        trace!("{}", region.cst);
        Ok(region)
    }

    #[inline]
    pub fn memref(&self) -> ValueId {
        self.memref
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.write
    }

    #[inline]
    pub fn set_write(&mut self, write: bool) {
        self.write = write;
    }

    /// Location of the access the region was computed from.
    #[inline]
    pub fn loc(&self) -> Location {
        self.loc
    }

    #[inline]
    pub fn memref_type(&self) -> &MemRefType {
        &self.memref_type
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.memref_type.rank()
    }

    #[inline]
    pub fn constraints(&self) -> &FlatAffineConstraints {
        &self.cst
    }

    #[inline]
    pub fn constraints_mut(&mut self) -> &mut FlatAffineConstraints {
        &mut self.cst
    }

    pub fn constant_bound_on_dim_size(&self, pos: usize) -> Option<DimExtent> {
        self.cst.constant_bound_on_dim_size(pos)
    }

    /// Constant bounding box of the region. Dimensions without a constant
    /// extent fall back to the memref's static size, with a zero lower
    /// bound. `None` if that is dynamic too.
    pub fn constant_bounding_size_and_shape(&self) -> Option<BoundingShape> {
        let rank = self.rank();
        let num_symbols = self.cst.num_symbols();
        let mut shape = SmallVec::with_capacity(rank);
        let mut lbs = Vec::with_capacity(rank);
        let mut lb_divisors = Vec::with_capacity(rank);
        let mut num_elements: u64 = 1;

        for d in 0..rank {
            let (size, lb, div) = match self.cst.constant_bound_on_dim_size(d) {
                Some(ext) => (ext.size, ext.lb, ext.lb_divisor),
                None => {
                    let size = self.memref_type.dim_size(d)?;
                    (size, vec![0; num_symbols + 1], 1)
                }
            };
            num_elements = num_elements.checked_mul(u64::try_from(size).ok()?)?;
            shape.push(size);
            lbs.push(lb);
            lb_divisors.push(div);
        }

        Some(BoundingShape {
            shape,
            num_elements,
            lbs,
            lb_divisors,
        })
    }

    /// Bytes in the constant bounding box of the region.
    pub fn region_size(&self) -> Option<u64> {
        let shape = self.constant_bounding_size_and_shape()?;
        shape
            .num_elements
            .checked_mul(self.memref_type.element_type().byte_width())
    }

    /// Grow this region to the bounding box of its union with `other`.
    pub fn union_bounding_box(&mut self, other: &MemRefRegion) -> AnalysisResult<()> {
        if self.memref != other.memref {
            return Err(AnalysisError::BufferMismatch);
        }
        self.cst.union_bounding_box(&other.cst)?;
        self.write |= other.write;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::get_backward_computation_slice_state;
    use loopnest_ir::{AffineBound, AffineExpr, AffineMap, ElementType, FunctionBuilder};

    fn nest_2d() -> (Function, NodeId) {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[10, 10], ElementType::F32));
        let mut load = NodeId::INVALID;
        b.for_range(0, 10, |b, i| {
            b.for_range(0, 10, |b, j| {
                load = b.load(a, AffineMap::identity(2), &[i, j]);
            });
        });
        (b.finish(), load)
    }

    #[test]
    fn test_memref_size_in_bytes() {
        let ty = MemRefType::new(&[4, 8], ElementType::F32);
        assert_eq!(get_memref_size_in_bytes(&ty), Some(128));
        let ty = MemRefType::new(&[3], ElementType::I1);
        assert_eq!(get_memref_size_in_bytes(&ty), Some(3));
        let ty = MemRefType::with_dims(&[Some(4), None], ElementType::F32);
        assert_eq!(get_memref_size_in_bytes(&ty), None);
    }

    #[test]
    fn test_region_shape_by_depth() {
        let (func, load) = nest_2d();

        let inner = MemRefRegion::compute(&func, load, 1, None).unwrap();
        assert_eq!(inner.constraints().num_dims(), 2);
        assert_eq!(inner.constraints().num_symbols(), 1);
        let shape = inner.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[1, 10]);
        assert_eq!(inner.region_size(), Some(40));

        let whole = MemRefRegion::compute(&func, load, 0, None).unwrap();
        let shape = whole.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[10, 10]);
        assert_eq!(shape.num_elements, 100);
        assert_eq!(whole.region_size(), Some(400));
        assert!(!whole.is_write());
    }

    #[test]
    fn test_region_with_offset_window() {
        // for i in [0, 8): load A[i], A[i + 2]; union is [0, 10)
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[16], ElementType::I32));
        let (mut x, mut y) = (NodeId::INVALID, NodeId::INVALID);
        b.for_range(0, 8, |b, i| {
            x = b.load(a, AffineMap::identity(1), &[i]);
            y = b.load(a, AffineMap::single(1, 0, AffineExpr::dim(0) + 2), &[i]);
        });
        let func = b.finish();

        let mut rx = MemRefRegion::compute(&func, x, 0, None).unwrap();
        let ry = MemRefRegion::compute(&func, y, 0, None).unwrap();
        rx.union_bounding_box(&ry).unwrap();
        let ext = rx.constant_bound_on_dim_size(0).unwrap();
        assert_eq!(ext.size, 10);
        assert_eq!(rx.constraints().constant_lower_bound(0), Some(0));
        assert_eq!(rx.constraints().constant_upper_bound(0), Some(9));
    }

    #[test]
    fn test_symbolic_region_falls_back_to_static_shape() {
        // for i in [0, n): load A[i] with A: memref<64>
        let mut b = FunctionBuilder::new("f");
        let n = b.index_argument();
        let a = b.alloc(MemRefType::new(&[64], ElementType::F64));
        let mut load = NodeId::INVALID;
        b.for_loop(AffineBound::constant(0), AffineBound::value(n), |b, i| {
            load = b.load(a, AffineMap::identity(1), &[i]);
        });
        let func = b.finish();

        let region = MemRefRegion::compute(&func, load, 0, None).unwrap();
        assert_eq!(region.constraints().num_symbols(), 1);
        let shape = region.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[64]);
        assert_eq!(region.region_size(), Some(512));
    }

    #[test]
    fn test_region_restricted_to_point_slice() {
        // for i in [0, 10): A[i] = 0
        // for j in [0, 10): load A[j]
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[10], ElementType::F32));
        let (mut store, mut load) = (NodeId::INVALID, NodeId::INVALID);
        b.for_range(0, 10, |b, i| {
            let c = b.constant(0);
            store = b.store(c, a, AffineMap::identity(1), &[i]);
        });
        b.for_range(0, 10, |b, j| {
            load = b.load(a, AffineMap::identity(1), &[j]);
        });
        let func = b.finish();
        let dst_iv = get_loop_ivs(&func, load)[0];

        let mut slice = get_backward_computation_slice_state(&func, store, load, 1).unwrap();
        let sliced = MemRefRegion::compute(&func, store, 0, Some(&slice)).unwrap();
        assert_eq!(sliced.constraints().num_dims(), 1);
        assert_eq!(sliced.constraints().num_symbols(), 1);
        assert_eq!(sliced.constraints().id_value(1), Some(dst_iv));
        let shape = sliced.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[1]);
        assert_eq!(sliced.region_size(), Some(4));

        // without bounds the slice covers the whole producer
        slice.clear_bounds();
        let whole = MemRefRegion::compute(&func, store, 0, Some(&slice)).unwrap();
        assert_eq!(whole.constraints().num_symbols(), 0);
        let shape = whole.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[10]);
    }

    #[test]
    fn test_rank_zero_region() {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[], ElementType::F32));
        let mut store = NodeId::INVALID;
        b.for_range(0, 4, |b, _i| {
            let c = b.constant(0);
            store = b.store(c, a, AffineMap::new(0, 0, vec![]), &[]);
        });
        let func = b.finish();

        let region = MemRefRegion::compute(&func, store, 0, None).unwrap();
        assert!(region.is_write());
        assert_eq!(region.rank(), 0);
        assert_eq!(region.region_size(), Some(4));
    }

    #[test]
    fn test_invalid_depth() {
        let (func, load) = nest_2d();
        assert!(matches!(
            MemRefRegion::compute(&func, load, 3, None),
            Err(AnalysisError::InvalidLoopDepth { available: 2, .. })
        ));
    }

    #[test]
    fn test_union_requires_same_memref() {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[4], ElementType::F32));
        let c = b.alloc(MemRefType::new(&[4], ElementType::F32));
        let (mut x, mut y) = (NodeId::INVALID, NodeId::INVALID);
        b.for_range(0, 4, |b, i| {
            x = b.load(a, AffineMap::identity(1), &[i]);
            y = b.load(c, AffineMap::identity(1), &[i]);
        });
        let func = b.finish();

        let mut rx = MemRefRegion::compute(&func, x, 0, None).unwrap();
        let ry = MemRefRegion::compute(&func, y, 0, None).unwrap();
        assert_eq!(rx.union_bounding_box(&ry), Err(AnalysisError::BufferMismatch));
    }
}
