//! Memory dependence between affine accesses.
//!
//! Two accesses depend on each other if some iteration of the source and
//! some later iteration of the destination touch the same element. The
//! question is posed as a single constraint system:
//!
//! ```text
//! [ src ivs | dst ivs | symbols | locals | const ]
//! ```
//!
//! containing both iteration domains, one equality per subscript
//! (`src_r - dst_r == 0`) and ordering constraints on the loops the two
//! accesses share. The dependence exists unless that system is provably
//! empty.
//!
//! # Ordering
//!
//! For a query at `loop_depth` the shared loops above that depth run the
//! same iteration and the loop at `loop_depth - 1` carries the dependence:
//! the destination runs in a strictly later iteration. When `loop_depth`
//! exceeds the shared loops, the dependence is loop-independent and the
//! source must also precede the destination in program order.

use crate::access::{AffineValueMap, MemRefAccess};
use crate::constraints::FlatAffineConstraints;
use crate::domain::iteration_domain;
use crate::error::{AnalysisError, AnalysisResult};
use crate::nest::{get_loop_ivs, get_num_common_surrounding_loops};
use log::{debug, trace};
use loopnest_ir::{flatten_map, Function, NodeId, ValueId};

// =============================================================================
// Dependence Kind
// =============================================================================

/// Type of memory dependence between two operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependenceKind {
    /// Read-After-Write (true dependence / flow dependence)
    RAW,

    /// Write-After-Read (anti dependence)
    WAR,

    /// Write-After-Write (output dependence)
    WAW,

    /// Read-After-Read (input dependence); only reported on request.
    RAR,
}

impl DependenceKind {
    pub const fn classify(src_is_store: bool, dst_is_store: bool) -> Self {
        match (src_is_store, dst_is_store) {
            (true, false) => DependenceKind::RAW,
            (false, true) => DependenceKind::WAR,
            (true, true) => DependenceKind::WAW,
            (false, false) => DependenceKind::RAR,
        }
    }

    /// Check if source is a write operation.
    #[inline]
    pub const fn source_is_write(self) -> bool {
        matches!(self, DependenceKind::RAW | DependenceKind::WAW)
    }

    /// Check if destination is a write operation.
    #[inline]
    pub const fn dest_is_write(self) -> bool {
        matches!(self, DependenceKind::WAR | DependenceKind::WAW)
    }
}

// =============================================================================
// Dependence System
// =============================================================================

/// The constraint system of a dependence query.
#[derive(Debug, Clone)]
pub(crate) struct DependenceSystem {
    pub(crate) cst: FlatAffineConstraints,
    pub(crate) num_src_ivs: usize,
    pub(crate) num_dst_ivs: usize,
}

/// Whether `src` precedes `dst` in the innermost block holding ancestors of
/// both.
pub(crate) fn src_appears_before_dst(func: &Function, src: NodeId, dst: NodeId) -> bool {
    let src_chain: Vec<NodeId> = std::iter::once(src).chain(func.ancestors(src)).collect();
    let dst_chain: Vec<NodeId> = std::iter::once(dst).chain(func.ancestors(dst)).collect();
    for &a in &src_chain {
        let block = func.node(a).block;
        if let Some(&b) = dst_chain.iter().find(|&&b| func.node(b).block == block) {
            return match (func.position_in_block(a), func.position_in_block(b)) {
                (Some(pa), Some(pb)) => pa < pb,
                _ => false,
            };
        }
    }
    false
}

/// Column of each access-map operand: induction variables by their
/// position in `ivs`, symbols by value.
fn access_columns(
    cst: &mut FlatAffineConstraints,
    vmap: &AffineValueMap,
    ivs: &[ValueId],
    iv_offset: usize,
) -> AnalysisResult<Vec<usize>> {
    vmap.operands()
        .iter()
        .enumerate()
        .map(|(k, &v)| {
            if k < vmap.num_dims() {
                ivs.iter()
                    .position(|&iv| iv == v)
                    .map(|p| iv_offset + p)
                    .ok_or(AnalysisError::NotAffine(v))
            } else {
                Ok(match cst.find_symbol(v) {
                    Some(col) => col,
                    None => cst.append_symbol_id(Some(v)),
                })
            }
        })
        .collect()
}

/// Build the dependence system for `src -> dst` at `loop_depth`. Returns
/// `None` when program order alone rules the dependence out.
pub(crate) fn build_dependence_system(
    func: &Function,
    src: &MemRefAccess,
    dst: &MemRefAccess,
    loop_depth: usize,
) -> AnalysisResult<Option<DependenceSystem>> {
    if src.memref != dst.memref {
        return Err(AnalysisError::BufferMismatch);
    }
    let num_common = get_num_common_surrounding_loops(func, src.op, dst.op);
    if loop_depth > num_common && !src_appears_before_dst(func, src.op, dst.op) {
        return Ok(None);
    }

    let src_ivs = get_loop_ivs(func, src.op);
    let dst_ivs = get_loop_ivs(func, dst.op);
    let (ns, nd) = (src_ivs.len(), dst_ivs.len());
    let src_map = src.access_map(func)?;
    let dst_map = dst.access_map(func)?;
    let src_domain = iteration_domain(func, src.op)?;
    let dst_domain = iteration_domain(func, dst.op)?;

    let mut cst = FlatAffineConstraints::new(ns + nd, 0, 0);

    // Symbols first so that later local columns stay put.
    let src_cols = access_columns(&mut cst, &src_map, &src_ivs, 0)?;
    let dst_cols = access_columns(&mut cst, &dst_map, &dst_ivs, ns)?;
    let src_dims: Vec<usize> = (0..ns).collect();
    let dst_dims: Vec<usize> = (ns..ns + nd).collect();
    cst.append_constraints(&src_domain, &src_dims)?;
    cst.append_constraints(&dst_domain, &dst_dims)?;

    // Subscripts agree.
    let src_flat = flatten_map(src_map.map())?;
    let dst_flat = flatten_map(dst_map.map())?;
    let mut src_rows = cst.lower_flattened(&src_flat, &src_cols);
    let dst_rows = cst.lower_flattened(&dst_flat, &dst_cols);
    for (src_row, dst_row) in src_rows.iter_mut().zip(&dst_rows) {
        cst.pad_row(src_row);
        let eq: Vec<i64> = src_row.iter().zip(dst_row).map(|(s, d)| s - d).collect();
        cst.add_equality(&eq);
    }

    // Ordering on shared loops.
    let width = cst.num_cols();
    for level in 0..num_common.min(loop_depth) {
        let mut row = vec![0; width];
        row[ns + level] = 1;
        row[level] = -1;
        if level + 1 == loop_depth {
            // dst - src - 1 >= 0
            row[width - 1] = -1;
            cst.add_inequality(&row);
        } else {
            cst.add_equality(&row);
        }
    }

    trace!("dependence system {} -> {} at depth {}:\n{}", src.op, dst.op, loop_depth, cst);
    Ok(Some(DependenceSystem {
        cst,
        num_src_ivs: ns,
        num_dst_ivs: nd,
    }))
}

/// Whether the access `dst_op` depends on the access `src_op` at
/// `loop_depth` (1-based; `n` means carried by the `n`-th shared loop,
/// anything past the shared loops means loop-independent).
///
/// Accesses to different memrefs never depend on each other, and two loads
/// only when `allow_rar` is set. Returns the kind of the dependence, or
/// `None` if the dependence system is provably empty.
pub fn check_memref_access_dependence(
    func: &Function,
    src_op: NodeId,
    dst_op: NodeId,
    loop_depth: usize,
    allow_rar: bool,
) -> AnalysisResult<Option<DependenceKind>> {
    let src = MemRefAccess::new(func, src_op)?;
    let dst = MemRefAccess::new(func, dst_op)?;
    if src.memref != dst.memref {
        return Ok(None);
    }
    if !src.is_store && !dst.is_store && !allow_rar {
        return Ok(None);
    }

    let verdict = match build_dependence_system(func, &src, &dst, loop_depth)? {
        Some(system) if !system.cst.is_empty() => {
            Some(DependenceKind::classify(src.is_store, dst.is_store))
        }
        _ => None,
    };
    debug!(
        "dependence {} -> {} at depth {}: {:?}",
        src_op, dst_op, loop_depth, verdict
    );
    Ok(verdict)
}
