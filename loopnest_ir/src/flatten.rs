//! Lowering of affine expressions to linear rows.
//!
//! A flattened expression is a coefficient vector over
//! `[dims | symbols | locals | constant]`. Each `floordiv`, `ceildiv` or
//! `mod` whose dividend is not an exact multiple of the divisor introduces a
//! *local* identifier `q = floor(dividend / divisor)`, described by a
//! [`LocalDivision`]. Constraint systems turn each local into the pair
//! `dividend - divisor * q >= 0` and `divisor * q - dividend + divisor - 1 >= 0`.

use crate::affine_expr::{floor_div, AffineExpr};
use crate::affine_map::AffineMap;
use crate::error::{IrError, IrResult};

/// `q = floor(dividend / divisor)`; the dividend is a row of the same
/// layout as the flattened results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDivision {
    pub dividend: Vec<i64>,
    pub divisor: i64,
}

/// The flattened results of a map, all sharing one set of locals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedMap {
    pub num_dims: usize,
    pub num_symbols: usize,
    pub locals: Vec<LocalDivision>,
    pub results: Vec<Vec<i64>>,
}

impl FlattenedMap {
    #[inline]
    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    /// Row width: dims, symbols, locals and the constant.
    #[inline]
    pub fn num_cols(&self) -> usize {
        self.num_dims + self.num_symbols + self.locals.len() + 1
    }
}

/// Stateful flattener; locals are shared and deduplicated across every
/// expression it visits.
#[derive(Debug)]
pub struct AffineExprFlattener {
    num_dims: usize,
    num_symbols: usize,
    locals: Vec<LocalDivision>,
}

impl AffineExprFlattener {
    pub fn new(num_dims: usize, num_symbols: usize) -> Self {
        AffineExprFlattener {
            num_dims,
            num_symbols,
            locals: Vec::new(),
        }
    }

    #[inline]
    fn width(&self) -> usize {
        self.num_dims + self.num_symbols + self.locals.len() + 1
    }

    fn pad(&self, row: &mut Vec<i64>) {
        let width = self.width();
        if row.len() < width {
            let constant = row.pop().unwrap_or(0);
            row.resize(width - 1, 0);
            row.push(constant);
        }
    }

    fn is_constant(row: &[i64]) -> bool {
        row[..row.len() - 1].iter().all(|&c| c == 0)
    }

    /// Flatten one expression. The returned row may be narrower than the
    /// final width if later expressions add locals; [`Self::finish`] pads.
    pub fn flatten(&mut self, expr: &AffineExpr) -> IrResult<Vec<i64>> {
        let mut row = vec![0; self.width()];
        match expr {
            AffineExpr::Dim(d) => {
                debug_assert!(*d < self.num_dims, "dim position out of range");
                row[*d] = 1;
            }
            AffineExpr::Symbol(s) => {
                debug_assert!(*s < self.num_symbols, "symbol position out of range");
                row[self.num_dims + *s] = 1;
            }
            AffineExpr::Constant(c) => {
                let last = row.len() - 1;
                row[last] = *c;
            }
            AffineExpr::Add(l, r) => {
                let mut a = self.flatten(l)?;
                let mut b = self.flatten(r)?;
                self.pad(&mut a);
                self.pad(&mut b);
                return combine(expr, &a, &b, |x, y| x.checked_add(y));
            }
            AffineExpr::Mul(l, r) => {
                let a = self.flatten(l)?;
                let b = self.flatten(r)?;
                let (scaled, factor) = if Self::is_constant(&b) {
                    (a, b[b.len() - 1])
                } else if Self::is_constant(&a) {
                    (b, a[a.len() - 1])
                } else {
                    return Err(IrError::SemiAffine(expr.to_string()));
                };
                return scaled
                    .into_iter()
                    .map(|c| c.checked_mul(factor).ok_or_else(|| overflow(expr)))
                    .collect();
            }
            AffineExpr::FloorDiv(l, r) => {
                let divisor = self.constant_divisor(expr, r)?;
                let dividend = self.flatten(l)?;
                return Ok(self.floor_div(dividend, divisor));
            }
            AffineExpr::CeilDiv(l, r) => {
                let divisor = self.constant_divisor(expr, r)?;
                let mut dividend = self.flatten(l)?;
                let last = dividend.len() - 1;
                dividend[last] = dividend[last]
                    .checked_add(divisor - 1)
                    .ok_or_else(|| overflow(expr))?;
                return Ok(self.floor_div(dividend, divisor));
            }
            AffineExpr::Mod(l, r) => {
                let modulus = self.constant_divisor(expr, r)?;
                let mut dividend = self.flatten(l)?;
                let mut quotient = self.floor_div(dividend.clone(), modulus);
                self.pad(&mut dividend);
                self.pad(&mut quotient);
                return combine(expr, &dividend, &quotient, |x, q| {
                    modulus.checked_mul(q).and_then(|mq| x.checked_sub(mq))
                });
            }
        }
        Ok(row)
    }

    fn constant_divisor(&mut self, expr: &AffineExpr, rhs: &AffineExpr) -> IrResult<i64> {
        let row = self.flatten(rhs)?;
        if !Self::is_constant(&row) {
            return Err(IrError::SemiAffine(expr.to_string()));
        }
        let divisor = row[row.len() - 1];
        if divisor <= 0 {
            return Err(IrError::NonPositiveDivisor(divisor));
        }
        Ok(divisor)
    }

    fn floor_div(&mut self, mut dividend: Vec<i64>, divisor: i64) -> Vec<i64> {
        if divisor == 1 {
            return dividend;
        }
        let last = dividend.len() - 1;
        if dividend[..last].iter().all(|c| c % divisor == 0) {
            for c in &mut dividend[..last] {
                *c /= divisor;
            }
            dividend[last] = floor_div(dividend[last], divisor);
            return dividend;
        }

        self.pad(&mut dividend);
        let existing = self.locals.iter().position(|local| {
            let mut padded = local.dividend.clone();
            self.pad(&mut padded);
            local.divisor == divisor && padded == dividend
        });
        let local_pos = match existing {
            Some(pos) => pos,
            None => {
                self.locals.push(LocalDivision { dividend, divisor });
                self.locals.len() - 1
            }
        };
        let mut row = vec![0; self.width()];
        row[self.num_dims + self.num_symbols + local_pos] = 1;
        row
    }

    /// Pad every row and local to the final width.
    pub fn finish(self, results: Vec<Vec<i64>>) -> FlattenedMap {
        let mut locals = self.locals.clone();
        for local in &mut locals {
            self.pad(&mut local.dividend);
        }
        let results = results
            .into_iter()
            .map(|mut row| {
                self.pad(&mut row);
                row
            })
            .collect();
        FlattenedMap {
            num_dims: self.num_dims,
            num_symbols: self.num_symbols,
            locals,
            results,
        }
    }
}

fn overflow(expr: &AffineExpr) -> IrError {
    IrError::Overflow(expr.to_string())
}

/// Column-wise `op` over two rows of equal width.
fn combine(
    expr: &AffineExpr,
    a: &[i64],
    b: &[i64],
    op: impl Fn(i64, i64) -> Option<i64>,
) -> IrResult<Vec<i64>> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| op(x, y).ok_or_else(|| overflow(expr)))
        .collect()
}

/// Flatten every result of `exprs` over `num_dims` dims and `num_symbols`
/// symbols.
pub fn flatten_exprs(
    exprs: &[AffineExpr],
    num_dims: usize,
    num_symbols: usize,
) -> IrResult<FlattenedMap> {
    let mut flattener = AffineExprFlattener::new(num_dims, num_symbols);
    let mut results = Vec::with_capacity(exprs.len());
    for expr in exprs {
        results.push(flattener.flatten(expr)?);
    }
    Ok(flattener.finish(results))
}

pub fn flatten_map(map: &AffineMap) -> IrResult<FlattenedMap> {
    flatten_exprs(map.results(), map.num_dims(), map.num_symbols())
}

/// Rebuild an expression from a row over `[dims | symbols | locals | const]`.
pub fn expr_from_flat_form(
    row: &[i64],
    num_dims: usize,
    num_symbols: usize,
    local_exprs: &[AffineExpr],
) -> AffineExpr {
    debug_assert_eq!(row.len(), num_dims + num_symbols + local_exprs.len() + 1);
    let mut expr = AffineExpr::constant(0);
    for (pos, &coeff) in row[..row.len() - 1].iter().enumerate() {
        if coeff == 0 {
            continue;
        }
        let term = if pos < num_dims {
            AffineExpr::dim(pos)
        } else if pos < num_dims + num_symbols {
            AffineExpr::symbol(pos - num_dims)
        } else {
            local_exprs[pos - num_dims - num_symbols].clone()
        };
        expr = expr + term * coeff;
    }
    expr + row[row.len() - 1]
}

/// Canonicalise a pure affine expression by flattening and rebuilding it.
/// Semi-affine expressions are returned unchanged.
pub fn simplify_affine_expr(expr: &AffineExpr, num_dims: usize, num_symbols: usize) -> AffineExpr {
    let flat = match flatten_exprs(std::slice::from_ref(expr), num_dims, num_symbols) {
        Ok(flat) => flat,
        Err(_) => return expr.clone(),
    };
    let mut local_exprs: Vec<AffineExpr> = Vec::with_capacity(flat.num_locals());
    for (k, local) in flat.locals.iter().enumerate() {
        // A local's dividend only refers to locals created before it.
        let prefix_len = num_dims + num_symbols + k;
        let mut dividend: Vec<i64> = local.dividend[..prefix_len].to_vec();
        dividend.push(local.dividend[local.dividend.len() - 1]);
        let numerator = expr_from_flat_form(&dividend, num_dims, num_symbols, &local_exprs);
        local_exprs.push(numerator.floor_div_by(local.divisor));
    }
    expr_from_flat_form(&flat.results[0], num_dims, num_symbols, &local_exprs)
}

/// [`simplify_affine_expr`] applied to every result.
pub fn simplify_affine_map(map: &AffineMap) -> AffineMap {
    AffineMap::new(
        map.num_dims(),
        map.num_symbols(),
        map.results()
            .iter()
            .map(|e| simplify_affine_expr(e, map.num_dims(), map.num_symbols()))
            .collect(),
    )
}
