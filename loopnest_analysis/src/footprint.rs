//! Memory footprints and static bound checks.

use crate::access::MemRefAccess;
use crate::error::{AnalysisError, AnalysisResult, BoundSide};
use crate::nest::{accesses_in, get_nesting_depth};
use crate::region::MemRefRegion;
use log::{debug, warn};
use loopnest_ir::{Diagnostics, Function, NodeId, ValueId};
use rustc_hash::FxHashMap;

/// Bytes touched by the accesses inside `for_op`, as the sum over memrefs of
/// the bounding box of all regions of that memref. With a `memory_space`,
/// only memrefs in that space count.
///
/// `None` if any counted region fails to compute or has no constant
/// bounding box. Accesses to memrefs outside `memory_space` are skipped
/// before their region is computed.
pub fn get_memory_footprint_bytes(
    func: &Function,
    for_op: NodeId,
    memory_space: Option<u32>,
) -> Option<u64> {
    if !func.node(for_op).is_for() {
        return None;
    }
    let depth = get_nesting_depth(func, for_op);

    let mut order: Vec<ValueId> = Vec::new();
    let mut regions: FxHashMap<ValueId, MemRefRegion> = FxHashMap::default();
    for op in accesses_in(func, for_op) {
        if let Some(space) = memory_space {
            let memref = MemRefAccess::new(func, op).ok()?.memref;
            if func.memref_type(memref).is_some_and(|ty| ty.memory_space() != space) {
                continue;
            }
        }
        let region = match MemRefRegion::compute(func, op, depth, None) {
            Ok(region) => region,
            Err(err) => {
                debug!("no footprint for {}: {}", for_op, err);
                return None;
            }
        };
        match regions.get_mut(&region.memref()) {
            Some(existing) => {
                if let Err(err) = existing.union_bounding_box(&region) {
                    warn!("failed to union regions of {}: {}", region.memref(), err);
                    return None;
                }
            }
            None => {
                order.push(region.memref());
                regions.insert(region.memref(), region);
            }
        }
    }

    let mut total: u64 = 0;
    for memref in order {
        let size = regions.get(&memref)?.region_size()?;
        total = total.checked_add(size)?;
    }
    debug!("footprint of {}: {} bytes", for_op, total);
    Some(total)
}

/// Check that every element `op` can access lies inside the static extent
/// of its memref. Dynamic dimensions are not checked.
///
/// On a violation an error is emitted to `diagnostics` at the location of
/// `op` and `OutOfBounds` is returned.
pub fn bound_check_load_or_store_op(
    func: &Function,
    op: NodeId,
    diagnostics: Option<&mut Diagnostics>,
) -> AnalysisResult<()> {
    let region = MemRefRegion::compute(func, op, 0, None)?;
    let cst = region.constraints();
    let num_cols = cst.num_cols();

    for (dim, extent) in region.memref_type().shape().iter().enumerate() {
        let Some(extent) = *extent else {
            continue;
        };
        // d < 0
        let mut below = cst.clone();
        let mut row = vec![0; num_cols];
        row[dim] = -1;
        row[num_cols - 1] = -1;
        below.add_inequality(&row);

        // d >= extent
        let mut above = cst.clone();
        let mut row = vec![0; num_cols];
        row[dim] = 1;
        row[num_cols - 1] = -extent;
        above.add_inequality(&row);

        let side = if !below.is_empty() {
            BoundSide::Lower
        } else if !above.is_empty() {
            BoundSide::Upper
        } else {
            continue;
        };
        let err = AnalysisError::OutOfBounds { dim, side };
        if let Some(diagnostics) = diagnostics {
            diagnostics.emit_error(region.loc(), err.to_string());
        }
        return Err(err);
    }
    Ok(())
}
