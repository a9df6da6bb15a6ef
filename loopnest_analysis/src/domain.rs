//! Iteration domains: loop bounds and conditions as constraints.

use crate::access::AffineValueMap;
use crate::constraints::FlatAffineConstraints;
use crate::error::{AnalysisError, AnalysisResult};
use crate::nest::{enclosing_loops, get_loop_ivs};
use log::warn;
use loopnest_ir::{flatten_map, AffineMap, BlockId, Function, NodeId, ValueId};

/// Column of each operand in `cst`; values not yet present are appended as
/// symbols.
pub(crate) fn operand_columns(cst: &mut FlatAffineConstraints, operands: &[ValueId]) -> Vec<usize> {
    operands
        .iter()
        .map(|&v| match cst.find_id(v) {
            Some(col) => col,
            None => cst.append_symbol_id(Some(v)),
        })
        .collect()
}

/// Lower the results of `vmap` into rows over `cst`, binding its operands
/// and adding any floordiv locals it needs. The rows must be added before
/// `cst` is reshaped again.
pub(crate) fn value_map_rows(
    cst: &mut FlatAffineConstraints,
    vmap: &AffineValueMap,
) -> AnalysisResult<Vec<Vec<i64>>> {
    let flat = flatten_map(vmap.map())?;
    let cols = operand_columns(cst, vmap.operands());
    Ok(cst.lower_flattened(&flat, &cols))
}

/// Add `lb <= iv < ub` for each result of the loop's lower (max) and upper
/// (min) bound maps. The loop's induction variable is appended as a dim if
/// `cst` does not have it yet.
pub fn add_affine_for_domain(
    cst: &mut FlatAffineConstraints,
    func: &Function,
    loop_node: NodeId,
) -> AnalysisResult<()> {
    let f = func
        .affine_for(loop_node)
        .ok_or(AnalysisError::NotALoop(loop_node))?;
    if cst.find_id(f.iv).is_none() {
        cst.append_dim_id(Some(f.iv));
    }

    let lower = AffineValueMap::compose(func, &f.lower.map, &f.lower.operands)?;
    for mut row in value_map_rows(cst, &lower)? {
        // iv - lb >= 0
        row.iter_mut().for_each(|c| *c = -*c);
        row[iv_col(cst, f.iv)?] += 1;
        cst.add_inequality(&row);
    }

    let upper = AffineValueMap::compose(func, &f.upper.map, &f.upper.operands)?;
    for mut row in value_map_rows(cst, &upper)? {
        // ub - 1 - iv >= 0
        row[iv_col(cst, f.iv)?] -= 1;
        let last = row.len() - 1;
        row[last] -= 1;
        cst.add_inequality(&row);
    }

    if f.step > 1 {
        match f.lower.as_constant() {
            Some(lb) => {
                // iv == lb + step * q
                let q = cst.append_local_id();
                let mut row = vec![0; cst.num_cols()];
                row[iv_col(cst, f.iv)?] = 1;
                row[q] = -f.step;
                row[cst.num_cols() - 1] = -lb;
                cst.add_equality(&row);
            }
            None => warn!(
                "ignoring step {} of loop {} with a non-constant lower bound",
                f.step, loop_node
            ),
        }
    }
    Ok(())
}

fn iv_col(cst: &FlatAffineConstraints, iv: ValueId) -> AnalysisResult<usize> {
    cst.find_id(iv).ok_or(AnalysisError::NotAffine(iv))
}

/// Conditionals enclosing `node` through their then block, outermost first.
pub(crate) fn enclosing_then_conditions(func: &Function, node: NodeId) -> Vec<NodeId> {
    let mut conds = Vec::new();
    let mut current = node;
    for ancestor in func.ancestors(node) {
        if func.node(current).block == BlockId::Then(ancestor) {
            conds.push(ancestor);
        }
        current = ancestor;
    }
    conds.reverse();
    conds
}

/// Add the condition of an `affine.if` as constraints.
pub fn add_affine_if_domain(
    cst: &mut FlatAffineConstraints,
    func: &Function,
    if_node: NodeId,
) -> AnalysisResult<()> {
    let Some(cond) = func.node(if_node).as_if() else {
        return Ok(());
    };
    let set = &cond.condition;
    let (exprs, flags): (Vec<_>, Vec<_>) = set.constraints().map(|(e, eq)| (e.clone(), eq)).unzip();
    let map = AffineMap::new(set.num_dims(), set.num_symbols(), exprs);
    let vmap = AffineValueMap::compose(func, &map, &cond.operands)?;
    for (row, is_eq) in value_map_rows(cst, &vmap)?.into_iter().zip(flags) {
        if is_eq {
            cst.add_equality(&row);
        } else {
            cst.add_inequality(&row);
        }
    }
    Ok(())
}

/// The iteration domain of `node`: one dim per enclosing loop induction
/// variable (outermost first) constrained by the loop bounds and by the
/// conditions of enclosing then blocks. Bound operands that are not
/// induction variables become symbols.
pub fn iteration_domain(func: &Function, node: NodeId) -> AnalysisResult<FlatAffineConstraints> {
    let ivs = get_loop_ivs(func, node);
    let mut cst = FlatAffineConstraints::with_values(ivs.len(), 0, &ivs);
    for l in enclosing_loops(func, node) {
        add_affine_for_domain(&mut cst, func, l)?;
    }
    for c in enclosing_then_conditions(func, node) {
        add_affine_if_domain(&mut cst, func, c)?;
    }
    Ok(cst)
}
