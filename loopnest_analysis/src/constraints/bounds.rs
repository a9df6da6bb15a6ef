//! Bound extraction: constant bounds, per-dimension extents, bounding-box
//! union and slice bounds expressed as affine maps.

use super::FlatAffineConstraints;
use crate::error::{AnalysisError, AnalysisResult};
use loopnest_ir::affine_expr::{ceil_div, floor_div};
use loopnest_ir::{expr_from_flat_form, simplify_affine_expr, AffineExpr, AffineMap};
use std::cmp::Ordering;

/// Constant extent of one dimension together with the symbolic lower and
/// upper bounds that realise it.
///
/// `lb` and `ub` have one entry per symbol followed by the constant. The
/// dimension satisfies
///
/// ```text
/// floor((lb . [syms, 1]) / lb_divisor) <= d  and  lb_divisor * d <= ub . [syms, 1]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimExtent {
    pub size: i64,
    pub lb: Vec<i64>,
    pub lb_divisor: i64,
    pub ub: Vec<i64>,
}

/// Result of comparing two symbolic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundComparison {
    Less,
    Equal,
    Greater,
    Unknown,
}

/// Compare `a` and `b`, both over `[syms, const]`. Comparable only when
/// the symbolic parts agree.
fn compare_bounds(a: &[i64], b: &[i64]) -> BoundComparison {
    let n = a.len() - 1;
    if a[..n] != b[..n] {
        return BoundComparison::Unknown;
    }
    match a[n].cmp(&b[n]) {
        Ordering::Less => BoundComparison::Less,
        Ordering::Equal => BoundComparison::Equal,
        Ordering::Greater => BoundComparison::Greater,
    }
}

/// Lower and upper (exclusive) bound maps for one sliced id. Maps with
/// several results denote a max (lower) or min (upper) over them.
pub type SliceBoundMaps = (Option<AffineMap>, Option<AffineMap>);

impl FlatAffineConstraints {
    // =========================================================================
    // Constant Bounds
    // =========================================================================

    fn constant_bound(&self, pos: usize, lower: bool) -> Option<i64> {
        let mut tmp = self.clone();
        let n = tmp.num_ids();
        tmp.project_out(pos + 1, n - pos - 1);
        tmp.project_out(0, pos);
        tmp.remove_trivial_redundancy();
        if tmp.has_invalid_constraint() {
            return None;
        }

        for eq in &tmp.equalities {
            let (c, k) = (eq[0], eq[1]);
            if c != 0 {
                return (k % c == 0).then(|| -k / c);
            }
        }

        let rows = tmp.inequalities.iter();
        if lower {
            rows.filter(|r| r[0] > 0).map(|r| ceil_div(-r[1], r[0])).max()
        } else {
            rows.filter(|r| r[0] < 0).map(|r| floor_div(r[1], -r[0])).min()
        }
    }

    /// Smallest value id `pos` can take, with every other id projected out.
    pub fn constant_lower_bound(&self, pos: usize) -> Option<i64> {
        self.constant_bound(pos, true)
    }

    /// Largest value id `pos` can take, with every other id projected out.
    pub fn constant_upper_bound(&self, pos: usize) -> Option<i64> {
        self.constant_bound(pos, false)
    }

    // =========================================================================
    // Dimension Extents
    // =========================================================================

    /// Constant bound on the number of values dim `pos` takes, for any value
    /// of the symbols.
    ///
    /// Only rows that mention `pos` and no other dim or local are considered:
    /// an equality fixing the dim gives extent 1; otherwise the tightest pair
    /// of a lower and an upper bound with opposite coefficients gives the
    /// extent. Returns `None` if no such pair exists.
    pub fn constant_bound_on_dim_size(&self, pos: usize) -> Option<DimExtent> {
        debug_assert!(pos < self.num_dims);
        let nd = self.num_dims;
        let ns = self.num_symbols;
        let last = self.num_cols() - 1;
        let only_pos = |row: &[i64]| {
            (0..nd).all(|c| c == pos || row[c] == 0) && row[nd + ns..last].iter().all(|&c| c == 0)
        };
        let sym_and_const = |row: &[i64], sign: i64| -> Vec<i64> {
            let mut out: Vec<i64> = row[nd..nd + ns].iter().map(|c| sign * c).collect();
            out.push(sign * row[last]);
            out
        };

        for eq in &self.equalities {
            let v = eq[pos];
            if v.abs() == 1 && only_pos(eq) {
                // d == -sign(v) * rest
                let lb = sym_and_const(eq, -v);
                return Some(DimExtent {
                    size: 1,
                    lb: lb.clone(),
                    lb_divisor: 1,
                    ub: lb,
                });
            }
        }

        let mut best: Option<(i64, usize, usize)> = None;
        for (li, lb) in self.inequalities.iter().enumerate() {
            if lb[pos] < 1 || !only_pos(lb) {
                continue;
            }
            for (ui, ub) in self.inequalities.iter().enumerate() {
                if ub[pos] > -1 || !only_pos(ub) {
                    continue;
                }
                if (0..last).any(|c| ub[c] != -lb[c]) {
                    continue;
                }
                let diff = ceil_div(ub[last] + lb[last] + 1, lb[pos]);
                if best.map_or(true, |(d, _, _)| diff < d) {
                    best = Some((diff, li, ui));
                }
            }
        }

        let (size, li, ui) = best?;
        let lb_row = &self.inequalities[li];
        let lb_divisor = lb_row[pos];
        let mut lb = sym_and_const(lb_row, -1);
        // floor((x + div - 1) / div) == ceil(x / div)
        let n = lb.len() - 1;
        lb[n] += lb_divisor - 1;
        Some(DimExtent {
            size: size.max(0),
            lb,
            lb_divisor,
            ub: sym_and_const(&self.inequalities[ui], 1),
        })
    }

    // =========================================================================
    // Bounding Box Union
    // =========================================================================

    /// Rewrite `other` onto this system's symbol list, appending any of
    /// `other`'s symbols this system does not have yet.
    fn align_symbols(&mut self, other: &Self) -> AnalysisResult<Self> {
        if self.num_locals() > 0 || other.num_locals() > 0 {
            return Err(AnalysisError::IncompatibleRegions("local identifiers"));
        }
        for s in other.num_dims..other.num_dim_and_symbol_ids() {
            let v = other.ids[s].ok_or(AnalysisError::IncompatibleRegions("unbound symbol"))?;
            if self.find_symbol(v).is_none() {
                self.append_symbol_id(Some(v));
            }
        }

        let nd = self.num_dims;
        let mut col_map = Vec::with_capacity(other.num_cols());
        col_map.extend(0..nd);
        for s in other.num_dims..other.num_dim_and_symbol_ids() {
            let v = other.ids[s].ok_or(AnalysisError::IncompatibleRegions("unbound symbol"))?;
            let col = self
                .find_symbol(v)
                .ok_or(AnalysisError::IncompatibleRegions("unbound symbol"))?;
            col_map.push(col);
        }
        col_map.push(self.num_cols() - 1);

        let mut aligned = self.clone();
        aligned.clear_constraints();
        let remap = |row: &Vec<i64>| {
            let mut out = vec![0; self.num_cols()];
            for (j, &c) in row.iter().enumerate() {
                out[col_map[j]] += c;
            }
            out
        };
        aligned.equalities = other.equalities.iter().map(remap).collect();
        aligned.inequalities = other.inequalities.iter().map(remap).collect();
        Ok(aligned)
    }

    /// Replace this system by the bounding box of its union with `other`.
    ///
    /// Both systems must have the same dims and no locals; symbols are
    /// matched by the value they are bound to. Per dimension the smaller
    /// lower bound and larger upper bound are kept when the symbolic parts
    /// agree; otherwise constant bounds are used.
    pub fn union_bounding_box(&mut self, other: &Self) -> AnalysisResult<()> {
        if self.num_dims != other.num_dims {
            return Err(AnalysisError::IncompatibleRegions("dimension count differs"));
        }
        let other = self.align_symbols(other)?;
        let nd = self.num_dims;
        let ns = self.num_symbols;

        let mut boxes = Vec::with_capacity(nd);
        for d in 0..nd {
            let ext = self
                .constant_bound_on_dim_size(d)
                .ok_or(AnalysisError::IncompatibleRegions("dimension without constant extent"))?;
            let other_ext = other
                .constant_bound_on_dim_size(d)
                .ok_or(AnalysisError::IncompatibleRegions("dimension without constant extent"))?;
            if ext.lb_divisor != other_ext.lb_divisor {
                return Err(AnalysisError::IncompatibleRegions("lower bound divisors differ"));
            }
            let div = ext.lb_divisor;

            // back to the ceil numerator
            let mut lb = ext.lb.clone();
            let mut other_lb = other_ext.lb.clone();
            lb[ns] -= div - 1;
            other_lb[ns] -= div - 1;

            let min_lb = match compare_bounds(&lb, &other_lb) {
                BoundComparison::Less | BoundComparison::Equal => lb,
                BoundComparison::Greater => other_lb,
                BoundComparison::Unknown => {
                    let a = self.constant_lower_bound(d);
                    let b = other.constant_lower_bound(d);
                    let c = a.zip(b).map(|(a, b)| a.min(b)).ok_or(
                        AnalysisError::IncompatibleRegions("lower bounds are not comparable"),
                    )?;
                    let mut row = vec![0; ns + 1];
                    row[ns] = c * div;
                    row
                }
            };
            let max_ub = match compare_bounds(&ext.ub, &other_ext.ub) {
                BoundComparison::Greater | BoundComparison::Equal => ext.ub.clone(),
                BoundComparison::Less => other_ext.ub.clone(),
                BoundComparison::Unknown => {
                    let a = self.constant_upper_bound(d);
                    let b = other.constant_upper_bound(d);
                    let c = a.zip(b).map(|(a, b)| a.max(b)).ok_or(
                        AnalysisError::IncompatibleRegions("upper bounds are not comparable"),
                    )?;
                    let mut row = vec![0; ns + 1];
                    row[ns] = c * div;
                    row
                }
            };
            boxes.push((div, min_lb, max_ub));
        }

        self.clear_constraints();
        let width = self.num_cols();
        for (d, (div, min_lb, max_ub)) in boxes.into_iter().enumerate() {
            // div * d - min_lb >= 0
            let mut lower = vec![0; width];
            lower[d] = div;
            for s in 0..=ns {
                lower[nd + s] = -min_lb[s];
            }
            // max_ub - div * d >= 0
            let mut upper = vec![0; width];
            upper[d] = -div;
            for s in 0..=ns {
                upper[nd + s] = max_ub[s];
            }
            self.inequalities.push(lower);
            self.inequalities.push(upper);
        }
        Ok(())
    }

    // =========================================================================
    // Slice Bounds
    // =========================================================================

    /// Lower and upper bound expressions for id 0, the only id left besides
    /// the `num_map_dims` map dims and the symbols.
    fn bound_exprs_of_first(&self, num_map_dims: usize) -> (Vec<AffineExpr>, Vec<AffineExpr>) {
        let ns = self.num_symbols;
        let simplify = |e: AffineExpr| simplify_affine_expr(&e, num_map_dims, ns);
        let rest = |row: &[i64], sign: i64| -> AffineExpr {
            let tail: Vec<i64> = row[1..].iter().map(|c| sign * c).collect();
            expr_from_flat_form(&tail, num_map_dims, ns, &[])
        };

        let mut lbs = Vec::new();
        let mut ubs = Vec::new();
        for row in &self.inequalities {
            let c = row[0];
            if c > 0 {
                // c * x + rest >= 0  ->  x >= ceil(-rest / c)
                lbs.push(simplify(rest(row, -1).ceil_div_by(c)));
            } else if c < 0 {
                // rest >= -c * x  ->  x < floor(rest / -c) + 1
                ubs.push(simplify(rest(row, 1).floor_div_by(-c) + 1));
            }
        }
        for row in &self.equalities {
            let c = row[0];
            if c == 0 {
                continue;
            }
            let sign = if c > 0 { -1 } else { 1 };
            let value = rest(row, sign);
            lbs.push(simplify(value.clone().ceil_div_by(c.abs())));
            ubs.push(simplify(value.floor_div_by(c.abs()) + 1));
        }
        (lbs, ubs)
    }

    /// Bounds on each of the first `num` dims in terms of the remaining dims
    /// and the symbols.
    ///
    /// Ids that are constant, or fixed by an equality over ids already
    /// known, get the point bounds `[e, e + 1)`. Other ids get the bounds
    /// that remain after projecting out the rest of the first `num` dims and
    /// the locals, falling back to constant bounds.
    pub fn slice_bounds(&self, num: usize) -> Vec<SliceBoundMaps> {
        let mut cst = self.clone();
        cst.normalize_constraints_by_gcd();
        let nd = cst.num_dims;
        let ns = cst.num_symbols;
        let num_map_dims = nd - num;
        let n = cst.num_ids();

        let mut memo: Vec<Option<AffineExpr>> = vec![None; n];
        for (i, slot) in memo.iter_mut().enumerate().take(nd).skip(num) {
            *slot = Some(AffineExpr::dim(i - num));
        }
        for (s, slot) in memo[nd..nd + ns].iter_mut().enumerate() {
            *slot = Some(AffineExpr::symbol(s));
        }

        loop {
            let mut changed = false;
            for pos in 0..n {
                if memo[pos].is_some() {
                    continue;
                }
                if let (Some(lb), Some(ub)) =
                    (cst.constant_lower_bound(pos), cst.constant_upper_bound(pos))
                {
                    if lb == ub {
                        memo[pos] = Some(AffineExpr::constant(lb));
                        changed = true;
                        continue;
                    }
                }
                for eq in &cst.equalities {
                    let v = eq[pos];
                    if v == 0 {
                        continue;
                    }
                    let known = (0..n).all(|j| j == pos || eq[j] == 0 || memo[j].is_some());
                    if !known {
                        continue;
                    }
                    // v * x + sum + c == 0
                    let mut sum = AffineExpr::constant(eq[n]);
                    for j in (0..n).filter(|&j| j != pos && eq[j] != 0) {
                        if let Some(e) = &memo[j] {
                            sum = sum + e.clone() * eq[j];
                        }
                    }
                    let expr = if v > 0 {
                        (-sum).floor_div_by(v)
                    } else {
                        sum.floor_div_by(-v)
                    };
                    memo[pos] = Some(simplify_affine_expr(&expr, num_map_dims, ns));
                    changed = true;
                    break;
                }
            }
            if !changed {
                break;
            }
        }

        (0..num)
            .map(|pos| {
                if let Some(expr) = &memo[pos] {
                    let lb = AffineMap::single(num_map_dims, ns, expr.clone());
                    let ub = AffineMap::single(
                        num_map_dims,
                        ns,
                        simplify_affine_expr(&(expr.clone() + 1), num_map_dims, ns),
                    );
                    return (Some(lb), Some(ub));
                }

                let mut tmp = cst.clone();
                tmp.project_out(nd + ns, tmp.num_locals());
                for p in (0..num).rev().filter(|&p| p != pos) {
                    tmp.eliminate_id(p);
                }
                tmp.remove_redundant_inequalities();
                let (lbs, ubs) = tmp.bound_exprs_of_first(num_map_dims);

                let lb = if lbs.is_empty() {
                    cst.constant_lower_bound(pos).map(AffineMap::constant)
                } else {
                    Some(AffineMap::new(num_map_dims, ns, lbs))
                };
                let ub = if ubs.is_empty() {
                    cst.constant_upper_bound(pos).map(|c| AffineMap::constant(c + 1))
                } else {
                    Some(AffineMap::new(num_map_dims, ns, ubs))
                };
                (lb, ub)
            })
            .collect()
    }
}
