//! Slice materialization: cloning a producer nest into a consumer nest.

use crate::access::is_valid_symbol;
use crate::error::{AnalysisError, AnalysisResult};
use crate::nest::{enclosing_loops, get_loop_ivs, get_num_common_surrounding_loops};
use crate::slice::ComputationSliceState;
use log::debug;
use loopnest_ir::{AffineBound, AffineMap, BlockId, CloneResult, Function, NodeId, SubtreeCloner, ValueId};
use smallvec::SmallVec;

/// Clone the loop nest enclosing `src_op` into the nest enclosing `dst_op`
/// and restrict the cloned loops to the bounds in `slice`.
///
/// The clone becomes the first node of the body of the destination loop at
/// `dst_loop_depth` (1-based). At depth 0 it is placed right before the
/// outermost destination loop. Loops without a slice bound keep their
/// original bounds. The source nest itself is left untouched.
///
/// Nothing is modified when an error is returned.
pub fn insert_backward_computation_slice(
    func: &mut Function,
    src_op: NodeId,
    dst_op: NodeId,
    dst_loop_depth: usize,
    slice: &ComputationSliceState,
) -> AnalysisResult<NodeId> {
    let src_loops = enclosing_loops(func, src_op);
    let Some(&src_root) = src_loops.first() else {
        return Err(AnalysisError::EmptySourceNest(src_op));
    };
    let dst_loops = enclosing_loops(func, dst_op);
    if dst_loop_depth > dst_loops.len() {
        return Err(AnalysisError::InvalidLoopDepth {
            node: dst_op,
            depth: dst_loop_depth,
            available: dst_loops.len(),
        });
    }
    let common = get_num_common_surrounding_loops(func, src_op, dst_op);
    if common > 0 {
        return Err(AnalysisError::SharedSurroundingLoops(common));
    }
    if slice.ivs != get_loop_ivs(func, src_op) {
        return Err(AnalysisError::SliceMismatch);
    }

    let visible_ivs = get_loop_ivs(func, dst_op);
    let visible_ivs = &visible_ivs[..dst_loop_depth];
    for i in 0..slice.num_ivs() {
        for (map, operands) in slice.lower_bound(i).into_iter().chain(slice.upper_bound(i)) {
            if map.num_inputs() != operands.len() {
                return Err(AnalysisError::SliceMismatch);
            }
            if let Some(&v) = operands
                .iter()
                .find(|&&v| !visible_ivs.contains(&v) && !is_valid_symbol(func, v))
            {
                return Err(AnalysisError::OperandNotInScope(v));
            }
        }
    }

    let (dest, index) = match dst_loop_depth {
        0 => {
            let anchor = dst_loops.first().copied().unwrap_or(dst_op);
            let index = func
                .position_in_block(anchor)
                .ok_or(AnalysisError::SliceMismatch)?;
            (func.node(anchor).block, index)
        }
        depth => (BlockId::Body(dst_loops[depth - 1]), 0),
    };

    let cloned = SubtreeCloner::new(src_root).clone_into(func, dest, index);
    for (i, &src_loop) in src_loops.iter().enumerate() {
        let new_loop = cloned
            .map_node(src_loop)
            .ok_or(AnalysisError::SliceMismatch)?;
        let lower = slice.lower_bound(i).map(|(m, ops)| remapped_bound(&cloned, m, ops));
        let upper = slice.upper_bound(i).map(|(m, ops)| remapped_bound(&cloned, m, ops));
        func.set_loop_bounds(new_loop, lower, upper);
    }

    debug!(
        "inserted slice of {} into {:?} at {} for {}",
        src_root, dest, index, dst_op
    );
    Ok(cloned.root)
}

fn remapped_bound(cloned: &CloneResult, map: &AffineMap, operands: &[ValueId]) -> AffineBound {
    let operands: SmallVec<[ValueId; 4]> = operands.iter().map(|&v| cloned.map_value(v)).collect();
    AffineBound::new(map.clone(), &operands)
}
