//! End-to-end properties of the analyses on small loop nests.
//!
//! Coverage:
//! - Nesting queries: depth, ivs, common loops
//! - Parallelism of carried and uncarried loops
//! - Region bounding boxes and sizes at each depth
//! - Union of regions: commutativity and superset (proptest)
//! - Static bound checks with diagnostics

use loopnest_analysis::{
    bound_check_load_or_store_op, enclosing_loops, get_loop_ivs, get_memory_footprint_bytes,
    get_nesting_depth, get_num_common_surrounding_loops, get_sequential_loops, is_loop_parallel,
    AnalysisConfig, AnalysisError, BoundSide, MemRefRegion,
};
use loopnest_ir::{
    AffineBound, AffineExpr, AffineMap, Diagnostics, ElementType, Function, FunctionBuilder,
    MemRefType, NodeId,
};
use proptest::prelude::*;

/// `for i in [0, 10): for j in [0, 10): load A[i][j]`
fn square_nest() -> (Function, NodeId) {
    let mut b = FunctionBuilder::new("square");
    let a = b.alloc(MemRefType::new(&[10, 10], ElementType::F32));
    let mut load = NodeId::INVALID;
    b.for_range(0, 10, |b, i| {
        b.for_range(0, 10, |b, j| {
            load = b.load(a, AffineMap::identity(2), &[i, j]);
        });
    });
    (b.finish(), load)
}

// =============================================================================
// Nesting
// =============================================================================

mod nesting {
    use super::*;

    #[test]
    fn test_depth_matches_ivs() {
        let (func, load) = square_nest();
        let ivs = get_loop_ivs(&func, load);
        assert_eq!(get_nesting_depth(&func, load), ivs.len());
        let loops = enclosing_loops(&func, load);
        for (l, iv) in loops.iter().zip(&ivs) {
            assert_eq!(func.affine_for(*l).unwrap().iv, *iv);
        }
        assert!(func.is_proper_ancestor(loops[0], loops[1]));
    }

    #[test]
    fn test_common_loops_with_self() {
        let (func, load) = square_nest();
        assert_eq!(get_num_common_surrounding_loops(&func, load, load), 2);
    }
}

// =============================================================================
// Parallelism
// =============================================================================

mod parallelism {
    use super::*;

    #[test]
    fn test_carried_and_uncarried() {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[10], ElementType::F32));
        let c = b.alloc(MemRefType::new(&[10], ElementType::F32));
        let carried = b.for_range(1, 10, |b, i| {
            let l = b.load(a, AffineMap::single(1, 0, AffineExpr::dim(0) - 1), &[i]);
            let v = b.result(l);
            b.store(v, a, AffineMap::identity(1), &[i]);
        });
        let write_only = b.for_range(0, 10, |b, i| {
            let k = b.constant(7);
            b.store(k, c, AffineMap::identity(1), &[i]);
        });
        let func = b.finish();

        assert!(!is_loop_parallel(&func, carried));
        assert!(is_loop_parallel(&func, write_only));
        let sequential = get_sequential_loops(&func, carried);
        assert_eq!(sequential.len(), 1);
    }

    #[test]
    fn test_symbolic_bounds_stay_analysable() {
        // for i in [0, n): A[i] = A[i + n]; i + n never falls inside [0, n)
        let mut b = FunctionBuilder::new("f");
        let n = b.index_argument();
        let a = b.alloc(MemRefType::with_dims(&[None], ElementType::F32));
        let l = b.for_loop(AffineBound::constant(0), AffineBound::value(n), |b, i| {
            let map = AffineMap::single(1, 1, AffineExpr::dim(0) + AffineExpr::symbol(0));
            let x = b.load(a, map, &[i, n]);
            let v = b.result(x);
            b.store(v, a, AffineMap::identity(1), &[i]);
        });
        let func = b.finish();
        assert!(is_loop_parallel(&func, l));
    }

    #[test]
    fn test_admission_limits() {
        let (func, load) = square_nest();
        let outer = enclosing_loops(&func, load)[0];
        let config = AnalysisConfig {
            max_nesting_depth: 1,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.admit(&func, outer),
            Err(AnalysisError::LimitExceeded { .. })
        ));
        assert!(AnalysisConfig::default().admit(&func, outer).is_ok());
    }
}

// =============================================================================
// Regions
// =============================================================================

mod regions {
    use super::*;

    #[test]
    fn test_bounding_shape_by_depth() {
        let (func, load) = square_nest();
        let inner = MemRefRegion::compute(&func, load, 1, None).unwrap();
        let shape = inner.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[1, 10]);
        assert_eq!(inner.region_size(), Some(shape.num_elements * 4));

        let outer = MemRefRegion::compute(&func, load, 0, None).unwrap();
        let shape = outer.constant_bounding_size_and_shape().unwrap();
        assert_eq!(shape.shape.as_slice(), &[10, 10]);
        assert_eq!(outer.region_size(), Some(400));
    }

    #[test]
    fn test_size_absent_without_shape() {
        let mut b = FunctionBuilder::new("f");
        let n = b.index_argument();
        let a = b.alloc(MemRefType::with_dims(&[None, Some(4)], ElementType::F32));
        let mut load = NodeId::INVALID;
        b.for_loop(AffineBound::constant(0), AffineBound::value(n), |b, i| {
            load = b.load(a, AffineMap::new(1, 0, vec![AffineExpr::dim(0), AffineExpr::constant(3)]), &[i]);
        });
        let func = b.finish();
        let region = MemRefRegion::compute(&func, load, 0, None).unwrap();
        assert_eq!(region.constant_bounding_size_and_shape(), None);
        assert_eq!(region.region_size(), None);
        let root = enclosing_loops(&func, load)[0];
        assert_eq!(get_memory_footprint_bytes(&func, root, None), None);
    }

    #[test]
    fn test_empty_region_is_not_an_error() {
        // the then block is never entered
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[10], ElementType::F32));
        let mut load = NodeId::INVALID;
        b.for_range(0, 10, |b, i| {
            let set = loopnest_ir::IntegerSet::new(1, 0, vec![AffineExpr::dim(0) - 20], vec![false]);
            b.if_then(set, &[i], |b| {
                load = b.load(a, AffineMap::identity(1), &[i]);
            });
        });
        let func = b.finish();
        let region = MemRefRegion::compute(&func, load, 0, None).unwrap();
        assert!(region.constraints().is_empty());
    }

    /// `for i in [lo, lo + len): load A[i]` twice, returning both loads.
    fn two_windows(a: (i64, i64), b_: (i64, i64)) -> (Function, NodeId, NodeId) {
        let mut b = FunctionBuilder::new("f");
        let buf = b.alloc(MemRefType::new(&[64], ElementType::F32));
        let (mut x, mut y) = (NodeId::INVALID, NodeId::INVALID);
        b.for_range(a.0, a.0 + a.1, |b, i| {
            x = b.load(buf, AffineMap::identity(1), &[i]);
        });
        b.for_range(b_.0, b_.0 + b_.1, |b, i| {
            y = b.load(buf, AffineMap::identity(1), &[i]);
        });
        (b.finish(), x, y)
    }

    proptest! {
        #[test]
        fn test_union_is_commutative(
            lo_a in 0i64..30, len_a in 1i64..20,
            lo_b in 0i64..30, len_b in 1i64..20,
        ) {
            let (func, x, y) = two_windows((lo_a, len_a), (lo_b, len_b));
            let rx = MemRefRegion::compute(&func, x, 0, None).unwrap();
            let ry = MemRefRegion::compute(&func, y, 0, None).unwrap();

            let mut xy = rx.clone();
            xy.union_bounding_box(&ry).unwrap();
            let mut yx = ry.clone();
            yx.union_bounding_box(&rx).unwrap();

            prop_assert_eq!(
                xy.constant_bounding_size_and_shape(),
                yx.constant_bounding_size_and_shape()
            );
            prop_assert_eq!(
                xy.constraints().constant_lower_bound(0),
                Some(lo_a.min(lo_b))
            );
            prop_assert_eq!(
                xy.constraints().constant_upper_bound(0),
                Some((lo_a + len_a).max(lo_b + len_b) - 1)
            );
        }

        #[test]
        fn test_union_contains_both_inputs(
            lo_a in 0i64..30, len_a in 1i64..20,
            lo_b in 0i64..30, len_b in 1i64..20,
        ) {
            let (func, x, y) = two_windows((lo_a, len_a), (lo_b, len_b));
            let mut union = MemRefRegion::compute(&func, x, 0, None).unwrap();
            let ry = MemRefRegion::compute(&func, y, 0, None).unwrap();
            union.union_bounding_box(&ry).unwrap();

            let points = (lo_a..lo_a + len_a).chain(lo_b..lo_b + len_b);
            for p in points {
                let mut at = union.constraints().clone();
                at.set_id_to_constant(0, p);
                prop_assert!(!at.is_empty(), "{} missing from the union", p);
            }
        }
    }
}

// =============================================================================
// Bound checks
// =============================================================================

mod bound_checks {
    use super::*;

    #[test]
    fn test_constant_out_of_bounds_index() {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[10], ElementType::F32));
        let bad = b.load(a, AffineMap::constant(10), &[]);
        let mut good = NodeId::INVALID;
        b.for_range(0, 10, |b, i| {
            good = b.load(a, AffineMap::identity(1), &[i]);
        });
        let func = b.finish();

        let mut diags = Diagnostics::new();
        assert_eq!(
            bound_check_load_or_store_op(&func, bad, Some(&mut diags)),
            Err(AnalysisError::OutOfBounds {
                dim: 0,
                side: BoundSide::Upper
            })
        );
        assert_eq!(diags.len(), 1);
        assert!(bound_check_load_or_store_op(&func, good, Some(&mut diags)).is_ok());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_second_dimension_reported() {
        let mut b = FunctionBuilder::new("f");
        let a = b.alloc(MemRefType::new(&[4, 4], ElementType::I8));
        let mut store = NodeId::INVALID;
        b.for_range(0, 4, |b, i| {
            let c = b.constant(0);
            let map = AffineMap::new(1, 0, vec![AffineExpr::dim(0), AffineExpr::dim(0) + 1]);
            store = b.store(c, a, map, &[i]);
        });
        let func = b.finish();

        let err = bound_check_load_or_store_op(&func, store, None).unwrap_err();
        assert_eq!(err.to_string(), "memref out of upper bound access along dimension #2");
    }
}
