//! Loop-nest navigation.

use loopnest_ir::{Function, NodeId, ValueId};
use smallvec::SmallVec;

/// Loops enclosing `node`, outermost first. Conditionals are skipped.
pub fn enclosing_loops(func: &Function, node: NodeId) -> SmallVec<[NodeId; 8]> {
    let mut loops: SmallVec<[NodeId; 8]> = func
        .ancestors(node)
        .filter(|&a| func.node(a).is_for())
        .collect();
    loops.reverse();
    loops
}

/// Induction variables of the loops enclosing `node`, outermost first.
pub fn get_loop_ivs(func: &Function, node: NodeId) -> Vec<ValueId> {
    enclosing_loops(func, node)
        .into_iter()
        .filter_map(|l| func.affine_for(l).map(|f| f.iv))
        .collect()
}

/// Number of loops enclosing `node`.
pub fn get_nesting_depth(func: &Function, node: NodeId) -> usize {
    func.ancestors(node).filter(|&a| func.node(a).is_for()).count()
}

/// Length of the common prefix of the loops enclosing `a` and `b`.
pub fn get_num_common_surrounding_loops(func: &Function, a: NodeId, b: NodeId) -> usize {
    let loops_a = enclosing_loops(func, a);
    let loops_b = enclosing_loops(func, b);
    loops_a
        .iter()
        .zip(loops_b.iter())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Loops nested in `root` (including `root` itself when it is a loop), in
/// pre-order.
pub(crate) fn loops_in(func: &Function, root: NodeId) -> Vec<NodeId> {
    let mut loops = Vec::new();
    func.walk(root, &mut |n| {
        if func.node(n).is_for() {
            loops.push(n);
        }
    });
    loops
}

/// Loads and stores nested in `root`, in program order.
pub(crate) fn accesses_in(func: &Function, root: NodeId) -> Vec<NodeId> {
    let mut accesses = Vec::new();
    func.walk(root, &mut |n| {
        if func.node(n).is_access() {
            accesses.push(n);
        }
    });
    accesses
}
