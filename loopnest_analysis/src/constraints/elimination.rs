//! Variable elimination, normalisation and emptiness.

use super::FlatAffineConstraints;
use log::{trace, warn};
use loopnest_ir::affine_expr::{floor_div, gcd};
use loopnest_ir::ValueId;
use rustc_hash::{FxHashMap, FxHashSet};

// =============================================================================
// Row Arithmetic
// =============================================================================

fn gcd128(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// `a * ma + b * mb`, computed wide and divided by the gcd of all entries.
/// `None` if the result does not fit back into `i64`.
fn combine(a: &[i64], ma: i128, b: &[i64], mb: i128) -> Option<Vec<i64>> {
    let mut wide: Vec<i128> = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| x as i128 * ma + y as i128 * mb)
        .collect();
    let g = wide.iter().fold(0i128, |g, &v| gcd128(g, v));
    if g > 1 {
        for v in wide.iter_mut() {
            *v /= g;
        }
    }
    wide.into_iter().map(|v| i64::try_from(v).ok()).collect()
}

fn coeff_gcd(row: &[i64]) -> i64 {
    row[..row.len() - 1].iter().fold(0, |g, &c| gcd(g, c))
}

#[inline]
fn is_zero_coeffs(row: &[i64]) -> bool {
    row[..row.len() - 1].iter().all(|&c| c == 0)
}

/// Divide an inequality by the gcd of its coefficients, rounding the
/// constant down. This tightens the row to the integer hull along its normal.
fn normalize_inequality(row: &mut [i64]) {
    let g = coeff_gcd(row);
    if g > 1 {
        let last = row.len() - 1;
        for c in row[..last].iter_mut() {
            *c /= g;
        }
        row[last] = floor_div(row[last], g);
    }
}

/// Divide an equality by the gcd of its coefficients. Returns `false` when
/// the constant is not divisible, i.e. the row has no integer solution.
fn normalize_equality(row: &mut [i64]) -> bool {
    let g = coeff_gcd(row);
    if g == 0 {
        return true;
    }
    let last = row.len() - 1;
    if row[last] % g != 0 {
        return false;
    }
    if g > 1 {
        for c in row.iter_mut() {
            *c /= g;
        }
    }
    true
}

impl FlatAffineConstraints {
    // =========================================================================
    // Normalisation
    // =========================================================================

    /// GCD-normalise every row. An equality without integer solutions is
    /// replaced by the canonical invalid row `0 == 1`.
    pub fn normalize_constraints_by_gcd(&mut self) {
        let width = self.num_cols();
        for row in self.equalities.iter_mut() {
            if !normalize_equality(row) {
                row.iter_mut().for_each(|c| *c = 0);
                row[width - 1] = 1;
            }
        }
        for row in self.inequalities.iter_mut() {
            normalize_inequality(row);
        }
    }

    /// True if some row has no coefficients and an unsatisfiable constant.
    pub fn has_invalid_constraint(&self) -> bool {
        let last = self.num_cols() - 1;
        self.equalities
            .iter()
            .any(|r| is_zero_coeffs(r) && r[last] != 0)
            || self
                .inequalities
                .iter()
                .any(|r| is_zero_coeffs(r) && r[last] < 0)
    }

    /// Cheap syntactic cleanup: normalise rows, drop trivially true rows and
    /// duplicates, keep only the tightest of parallel inequalities, and turn
    /// opposing inequalities that pin an expression into an equality.
    pub fn remove_trivial_redundancy(&mut self) {
        self.normalize_constraints_by_gcd();
        if self.has_invalid_constraint() {
            return;
        }
        let last = self.num_cols() - 1;

        let mut seen_eqs: FxHashSet<Vec<i64>> = FxHashSet::default();
        let mut equalities = Vec::with_capacity(self.equalities.len());
        for mut row in std::mem::take(&mut self.equalities) {
            if is_zero_coeffs(&row) {
                continue;
            }
            // canonical sign: first nonzero coefficient positive
            if row.iter().find(|&&c| c != 0).is_some_and(|&c| c < 0) {
                row.iter_mut().for_each(|c| *c = -*c);
            }
            if seen_eqs.insert(row.clone()) {
                equalities.push(row);
            }
        }

        // tightest constant per coefficient vector
        let mut tightest: FxHashMap<Vec<i64>, i64> = FxHashMap::default();
        let mut order: Vec<Vec<i64>> = Vec::new();
        for row in std::mem::take(&mut self.inequalities) {
            if is_zero_coeffs(&row) {
                continue;
            }
            let key = row[..last].to_vec();
            match tightest.get_mut(&key) {
                Some(c) => *c = (*c).min(row[last]),
                None => {
                    tightest.insert(key.clone(), row[last]);
                    order.push(key);
                }
            }
        }

        let mut inequalities = Vec::with_capacity(order.len());
        let mut pinned: FxHashSet<Vec<i64>> = FxHashSet::default();
        for key in &order {
            if pinned.contains(key) {
                continue;
            }
            let c = tightest[key];
            let neg: Vec<i64> = key.iter().map(|x| -x).collect();
            if let Some(&nc) = tightest.get(&neg) {
                // e + c >= 0 and -e + nc >= 0 with c + nc == 0 pin e == -c
                if c + nc == 0 {
                    let mut eq = key.clone();
                    eq.push(c);
                    if seen_eqs.insert(eq.clone()) {
                        equalities.push(eq);
                    }
                    pinned.insert(key.clone());
                    pinned.insert(neg);
                    continue;
                }
            }
            let mut row = key.clone();
            row.push(c);
            inequalities.push(row);
        }

        self.equalities = equalities;
        self.inequalities = inequalities;
    }

    // =========================================================================
    // Elimination
    // =========================================================================

    /// Existentially quantify id `pos` away and remove its column.
    ///
    /// Uses an equality as pivot when one mentions the id (Gaussian
    /// elimination), otherwise pairs every lower bound with every upper bound
    /// (Fourier–Motzkin). If that would produce more rows than the row limit,
    /// the bounds on the id are dropped instead, which over-approximates.
    pub fn eliminate_id(&mut self, pos: usize) {
        let pivot = self
            .equalities
            .iter()
            .enumerate()
            .filter(|(_, r)| r[pos] != 0)
            .min_by_key(|(_, r)| r[pos].unsigned_abs())
            .map(|(i, _)| i);

        if let Some(pivot_idx) = pivot {
            let pivot = self.equalities.swap_remove(pivot_idx);
            let c = pivot[pos];
            let sign = c.signum() as i128;
            let abs_c = c.unsigned_abs() as i128;
            self.equalities = std::mem::take(&mut self.equalities)
                .into_iter()
                .filter_map(|row| {
                    if row[pos] == 0 {
                        return Some(row);
                    }
                    combine(&row, abs_c, &pivot, -(row[pos] as i128) * sign)
                })
                .collect();
            self.inequalities = std::mem::take(&mut self.inequalities)
                .into_iter()
                .filter_map(|row| {
                    if row[pos] == 0 {
                        return Some(row);
                    }
                    combine(&row, abs_c, &pivot, -(row[pos] as i128) * sign)
                })
                .collect();
        } else {
            self.fourier_motzkin(pos);
        }

        self.remove_id(pos);
        self.remove_trivial_redundancy();
    }

    fn fourier_motzkin(&mut self, pos: usize) {
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut rest = Vec::new();
        for row in std::mem::take(&mut self.inequalities) {
            match row[pos] {
                0 => rest.push(row),
                c if c > 0 => lower.push(row),
                _ => upper.push(row),
            }
        }

        let produced = lower.len() * upper.len();
        if produced + rest.len() > self.row_limit {
            warn!(
                "dropping {} bounds on id {} instead of combining them into {} rows",
                lower.len() + upper.len(),
                pos,
                produced
            );
            self.inequalities = rest;
            return;
        }

        for l in &lower {
            for u in &upper {
                // l[pos] > 0 > u[pos]
                if let Some(row) = combine(l, u[pos].unsigned_abs() as i128, u, l[pos] as i128) {
                    rest.push(row);
                }
            }
        }
        self.inequalities = rest;
    }

    /// Eliminate ids `pos..pos + num`.
    pub fn project_out(&mut self, pos: usize, num: usize) {
        debug_assert!(pos + num <= self.num_ids());
        for _ in 0..num {
            self.eliminate_id(pos);
        }
    }

    /// Eliminate the id bound to `value`. Returns false if there is none.
    pub fn project_out_value(&mut self, value: ValueId) -> bool {
        match self.find_id(value) {
            Some(pos) => {
                self.eliminate_id(pos);
                true
            }
            None => false,
        }
    }

    /// Next id to eliminate when all ids go: one pinned by an equality if
    /// any, otherwise the one whose Fourier–Motzkin step produces the fewest
    /// rows.
    fn best_elimination_candidate(&self) -> usize {
        let n = self.num_ids();
        if let Some(pos) = (0..n).find(|&p| self.equalities.iter().any(|r| r[p] != 0)) {
            return pos;
        }
        (0..n)
            .min_by_key(|&p| {
                let lbs = self.inequalities.iter().filter(|r| r[p] > 0).count();
                let ubs = self.inequalities.iter().filter(|r| r[p] < 0).count();
                lbs * ubs
            })
            .unwrap_or(0)
    }

    // =========================================================================
    // Emptiness
    // =========================================================================

    /// True only if the system provably has no integer solution.
    ///
    /// Eliminates ids one at a time and looks for a contradiction after each
    /// step. The integer shadow is not exact, so `false` means "possibly
    /// non-empty".
    pub fn is_empty(&self) -> bool {
        if self.has_invalid_constraint() {
            return true;
        }
        let mut tmp = self.clone();
        tmp.remove_trivial_redundancy();
        if tmp.has_invalid_constraint() {
            return true;
        }
        while tmp.num_ids() > 0 {
            let pos = tmp.best_elimination_candidate();
            tmp.eliminate_id(pos);
            if tmp.has_invalid_constraint() {
                trace!("system is empty after eliminating {} ids", self.num_ids() - tmp.num_ids());
                return true;
            }
        }
        false
    }

    /// Drop every inequality implied by the others.
    ///
    /// Row `r` is redundant when the remaining system together with its
    /// negation `-r - 1 >= 0` is empty.
    pub fn remove_redundant_inequalities(&mut self) {
        let last = self.num_cols() - 1;
        let mut idx = 0;
        while idx < self.inequalities.len() {
            let mut tmp = self.clone();
            let row = tmp.inequalities.remove(idx);
            let mut negated: Vec<i64> = row.iter().map(|c| -c).collect();
            negated[last] -= 1;
            tmp.inequalities.push(negated);
            if tmp.is_empty() {
                self.inequalities.remove(idx);
            } else {
                idx += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `lo <= x_pos <= hi`
    fn bounded(n: usize, ranges: &[(i64, i64)]) -> FlatAffineConstraints {
        let mut cst = FlatAffineConstraints::new(n, 0, 0);
        for (p, &(lo, hi)) in ranges.iter().enumerate() {
            cst.add_constant_lower_bound(p, lo);
            cst.add_constant_upper_bound(p, hi);
        }
        cst
    }

    #[test]
    fn test_gcd_normalization_tightens_inequality() {
        // 2x - 3 >= 0  ->  x - 2 >= 0
        let mut cst = FlatAffineConstraints::new(1, 0, 0);
        cst.add_inequality(&[2, -3]);
        cst.normalize_constraints_by_gcd();
        assert_eq!(cst.inequality(0), &[1, -2]);
    }

    #[test]
    fn test_equality_without_integer_solution_is_empty() {
        // 2x == 1
        let mut cst = FlatAffineConstraints::new(1, 0, 0);
        cst.add_equality(&[2, -1]);
        assert!(cst.is_empty());
    }

    #[test]
    fn test_box_is_not_empty() {
        let cst = bounded(2, &[(0, 9), (0, 9)]);
        assert!(!cst.is_empty());
    }

    #[test]
    fn test_contradictory_bounds_are_empty() {
        let mut cst = bounded(1, &[(0, 9)]);
        cst.add_constant_lower_bound(0, 10);
        assert!(cst.is_empty());
    }

    #[test]
    fn test_empty_through_equality_chain() {
        // x == y + 1, y >= 0, x <= 0
        let mut cst = FlatAffineConstraints::new(2, 0, 0);
        cst.add_equality(&[1, -1, -1]);
        cst.add_constant_lower_bound(1, 0);
        cst.add_constant_upper_bound(0, 0);
        assert!(cst.is_empty());
    }

    #[test]
    fn test_fourier_motzkin_projection() {
        // 0 <= x <= 9, x <= y <= x + 3  ->  0 <= y <= 12
        let mut cst = bounded(1, &[(0, 9)]);
        cst.append_dim_id(None);
        cst.add_inequality(&[-1, 1, 0]);
        cst.add_inequality(&[1, -1, 3]);
        cst.project_out(0, 1);
        assert_eq!(cst.num_ids(), 1);
        assert_eq!(cst.constant_lower_bound(0), Some(0));
        assert_eq!(cst.constant_upper_bound(0), Some(12));
    }

    #[test]
    fn test_row_limit_over_approximates() {
        let mut cst = bounded(1, &[(0, 9)]).with_row_limit(0);
        cst.append_dim_id(None);
        cst.add_inequality(&[-1, 1, 0]);
        cst.add_inequality(&[1, -1, 3]);
        cst.project_out(0, 1);
        // bounds on y are lost rather than wrong
        assert_eq!(cst.num_inequalities(), 0);
        assert!(!cst.is_empty());
    }

    #[test]
    fn test_remove_trivial_redundancy_keeps_tightest() {
        let mut cst = FlatAffineConstraints::new(1, 0, 0);
        cst.add_inequality(&[1, 0]);
        cst.add_inequality(&[1, 5]);
        cst.add_inequality(&[0, 3]);
        cst.remove_trivial_redundancy();
        assert_eq!(cst.num_inequalities(), 1);
        assert_eq!(cst.inequality(0), &[1, 0]);
    }

    #[test]
    fn test_opposing_inequalities_become_equality() {
        // x - 4 >= 0 and -x + 4 >= 0
        let mut cst = FlatAffineConstraints::new(1, 0, 0);
        cst.add_constant_lower_bound(0, 4);
        cst.add_constant_upper_bound(0, 4);
        cst.remove_trivial_redundancy();
        assert_eq!(cst.num_inequalities(), 0);
        assert_eq!(cst.num_equalities(), 1);
        assert_eq!(cst.equality(0), &[1, -4]);
    }

    #[test]
    fn test_remove_redundant_inequalities() {
        // x >= 0 makes x >= -5 redundant
        let mut cst = bounded(1, &[(0, 9)]);
        cst.add_constant_lower_bound(0, -5);
        cst.add_constant_upper_bound(0, 20);
        cst.inequalities.swap(0, 2);
        cst.remove_redundant_inequalities();
        assert_eq!(cst.num_inequalities(), 2);
        assert_eq!(cst.constant_lower_bound(0), Some(0));
        assert_eq!(cst.constant_upper_bound(0), Some(9));
    }

    #[test]
    fn test_project_out_value() {
        let mut cst = FlatAffineConstraints::with_values(1, 1, &[ValueId::new(0), ValueId::new(1)]);
        cst.add_inequality(&[1, -1, 0]);
        assert!(cst.project_out_value(ValueId::new(1)));
        assert!(!cst.project_out_value(ValueId::new(5)));
        assert_eq!(cst.num_symbols(), 0);
        assert_eq!(cst.num_inequalities(), 0);
    }
}
