//! Parallelism classification.

use crate::config::AnalysisConfig;
use crate::dependence::check_memref_access_dependence;
use crate::nest::{accesses_in, get_nesting_depth, loops_in};
use log::{debug, warn};
use loopnest_ir::{Function, NodeId};
use rustc_hash::FxHashSet;

/// Whether no two iterations of `loop_node` touch the same element with at
/// least one of them writing. Any failure to analyse an access makes the
/// loop sequential.
pub fn is_loop_parallel(func: &Function, loop_node: NodeId) -> bool {
    is_loop_parallel_with(func, loop_node, &AnalysisConfig::default())
}

/// [`is_loop_parallel`] under the limits of `config`.
pub fn is_loop_parallel_with(func: &Function, loop_node: NodeId, config: &AnalysisConfig) -> bool {
    if !func.node(loop_node).is_for() {
        return false;
    }
    if let Err(err) = config.admit(func, loop_node) {
        warn!("treating loop {} as sequential: {}", loop_node, err);
        return false;
    }

    let accesses = accesses_in(func, loop_node);
    let pairs = accesses.len() * accesses.len();
    if pairs > config.max_access_pairs {
        warn!(
            "treating loop {} as sequential: {} access pairs exceed the limit of {}",
            loop_node, pairs, config.max_access_pairs
        );
        return false;
    }

    let depth = get_nesting_depth(func, loop_node) + 1;
    for &src in &accesses {
        for &dst in &accesses {
            match check_memref_access_dependence(func, src, dst, depth, false) {
                Ok(None) => {}
                Ok(Some(kind)) => {
                    debug!("loop {} carries a {:?} dependence {} -> {}", loop_node, kind, src, dst);
                    return false;
                }
                Err(err) => {
                    debug!("loop {} is sequential: {}", loop_node, err);
                    return false;
                }
            }
        }
    }
    true
}

/// Loops at or below `root` that are not parallel.
pub fn get_sequential_loops(func: &Function, root: NodeId) -> FxHashSet<NodeId> {
    loops_in(func, root)
        .into_iter()
        .filter(|&l| !is_loop_parallel(func, l))
        .collect()
}
