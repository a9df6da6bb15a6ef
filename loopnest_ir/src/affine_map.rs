//! Affine maps and integer sets.

use crate::affine_expr::AffineExpr;
use std::fmt;

// =============================================================================
// AffineMap
// =============================================================================

/// `(d_0 .. d_{n-1})[s_0 .. s_{m-1}] -> (e_0, .., e_k)`.
///
/// Used for access functions (one result per memref dimension) and for loop
/// bounds (a lower bound is the max of its results, an upper bound the min).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffineMap {
    num_dims: usize,
    num_symbols: usize,
    results: Vec<AffineExpr>,
}

impl AffineMap {
    pub fn new(num_dims: usize, num_symbols: usize, results: Vec<AffineExpr>) -> Self {
        AffineMap {
            num_dims,
            num_symbols,
            results,
        }
    }

    /// Single-result map.
    pub fn single(num_dims: usize, num_symbols: usize, result: AffineExpr) -> Self {
        Self::new(num_dims, num_symbols, vec![result])
    }

    /// `() -> (value)`.
    pub fn constant(value: i64) -> Self {
        Self::single(0, 0, AffineExpr::constant(value))
    }

    /// `(d_0 .. d_{n-1}) -> (d_0 .. d_{n-1})`.
    pub fn identity(num_dims: usize) -> Self {
        Self::new(num_dims, 0, (0..num_dims).map(AffineExpr::dim).collect())
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    #[inline]
    pub fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    /// Operand count expected by the map.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_dims + self.num_symbols
    }

    #[inline]
    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn results(&self) -> &[AffineExpr] {
        &self.results
    }

    #[inline]
    pub fn result(&self, idx: usize) -> &AffineExpr {
        &self.results[idx]
    }

    /// The constant of a single-result constant map.
    pub fn single_constant_result(&self) -> Option<i64> {
        match self.results.as_slice() {
            [only] => only.as_constant(),
            _ => None,
        }
    }

    pub fn is_pure_affine(&self) -> bool {
        self.results.iter().all(AffineExpr::is_pure_affine)
    }

    /// Evaluate every result on concrete operands.
    pub fn evaluate(&self, dims: &[i64], symbols: &[i64]) -> Option<Vec<i64>> {
        self.results.iter().map(|e| e.evaluate(dims, symbols)).collect()
    }

    /// Substitute inputs by the given expressions, producing a map over
    /// `num_dims` dims and `num_symbols` symbols.
    pub fn replace_dims_and_symbols(
        &self,
        dims: &[AffineExpr],
        symbols: &[AffineExpr],
        num_dims: usize,
        num_symbols: usize,
    ) -> AffineMap {
        AffineMap {
            num_dims,
            num_symbols,
            results: self
                .results
                .iter()
                .map(|e| e.replace_dims_and_symbols(dims, symbols))
                .collect(),
        }
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for d in 0..self.num_dims {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "d{}", d)?;
        }
        write!(f, ")")?;
        if self.num_symbols > 0 {
            write!(f, "[")?;
            for s in 0..self.num_symbols {
                if s > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "s{}", s)?;
            }
            write!(f, "]")?;
        }
        write!(f, " -> (")?;
        for (i, e) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, ")")
    }
}

// =============================================================================
// IntegerSet
// =============================================================================

/// Conjunction of affine constraints `e == 0` or `e >= 0`, the condition of
/// an `affine.if`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntegerSet {
    num_dims: usize,
    num_symbols: usize,
    constraints: Vec<AffineExpr>,
    eq_flags: Vec<bool>,
}

impl IntegerSet {
    pub fn new(
        num_dims: usize,
        num_symbols: usize,
        constraints: Vec<AffineExpr>,
        eq_flags: Vec<bool>,
    ) -> Self {
        assert_eq!(constraints.len(), eq_flags.len(), "one flag per constraint");
        IntegerSet {
            num_dims,
            num_symbols,
            constraints,
            eq_flags,
        }
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    #[inline]
    pub fn num_symbols(&self) -> usize {
        self.num_symbols
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_dims + self.num_symbols
    }

    /// Constraints paired with their "is equality" flag.
    pub fn constraints(&self) -> impl Iterator<Item = (&AffineExpr, bool)> {
        self.constraints.iter().zip(self.eq_flags.iter().copied())
    }

    /// Whether the point satisfies every constraint.
    pub fn contains(&self, dims: &[i64], symbols: &[i64]) -> Option<bool> {
        for (expr, is_eq) in self.constraints() {
            let v = expr.evaluate(dims, symbols)?;
            let holds = if is_eq { v == 0 } else { v >= 0 };
            if !holds {
                return Some(false);
            }
        }
        Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_display() {
        let map = AffineMap::new(
            2,
            1,
            vec![AffineExpr::dim(0) + AffineExpr::symbol(0), AffineExpr::dim(1) * 2],
        );
        assert_eq!(map.to_string(), "(d0, d1)[s0] -> (d0 + s0, d1 * 2)");
        assert_eq!(AffineMap::constant(4).to_string(), "() -> (4)");
    }

    #[test]
    fn test_map_queries() {
        assert_eq!(AffineMap::constant(7).single_constant_result(), Some(7));
        assert_eq!(AffineMap::identity(2).single_constant_result(), None);
        assert_eq!(AffineMap::identity(3).num_inputs(), 3);
        assert_eq!(
            AffineMap::identity(2).evaluate(&[3, 4], &[]),
            Some(vec![3, 4])
        );
    }

    #[test]
    fn test_map_substitution() {
        let map = AffineMap::single(1, 0, AffineExpr::dim(0) + 8);
        let composed = map.replace_dims_and_symbols(&[AffineExpr::symbol(0) * 4], &[], 0, 1);
        assert_eq!(composed.num_symbols(), 1);
        assert_eq!(composed.result(0), &(AffineExpr::symbol(0) * 4 + 8));
    }

    #[test]
    fn test_integer_set_contains() {
        // d0 - s0 >= 0 and d0 - 9 == 0
        let set = IntegerSet::new(
            1,
            1,
            vec![AffineExpr::dim(0) - AffineExpr::symbol(0), AffineExpr::dim(0) - 9],
            vec![false, true],
        );
        assert_eq!(set.contains(&[9], &[3]), Some(true));
        assert_eq!(set.contains(&[8], &[3]), Some(false));
        assert_eq!(set.contains(&[9], &[10]), Some(false));
    }
}
