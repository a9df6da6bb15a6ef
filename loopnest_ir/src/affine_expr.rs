//! Affine expressions over dimension and symbol positions.
//!
//! An [`AffineExpr`] is a tree of `+`, `*`, `floordiv`, `ceildiv` and `mod`
//! over dimension identifiers `d_i`, symbol identifiers `s_j` and integer
//! constants. The constructors fold constants and strip identities, so
//! expressions built through them stay in a small canonical shape:
//!
//! - constants sit on the right of `+` and `*`;
//! - `e + 0`, `e * 1`, `e floordiv 1`, `e ceildiv 1` collapse to `e`;
//! - `e * 0` and `e mod 1` collapse to `0`.
//!
//! Pure affine expressions multiply only by constants and divide only by
//! positive constants. Anything else is semi-affine and is rejected by
//! flattening.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

// =============================================================================
// Integer Helpers
// =============================================================================

/// Floor of `a / b` for `b != 0`.
#[inline]
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Ceiling of `a / b` for `b != 0`.
#[inline]
pub fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}

/// Greatest common divisor of the absolute values; `gcd(0, 0) == 0`.
#[inline]
pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a as i64
}

// =============================================================================
// Expression Tree
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AffineExpr {
    Dim(usize),
    Symbol(usize),
    Constant(i64),
    Add(Box<AffineExpr>, Box<AffineExpr>),
    Mul(Box<AffineExpr>, Box<AffineExpr>),
    FloorDiv(Box<AffineExpr>, Box<AffineExpr>),
    CeilDiv(Box<AffineExpr>, Box<AffineExpr>),
    Mod(Box<AffineExpr>, Box<AffineExpr>),
}

impl AffineExpr {
    #[inline]
    pub fn dim(pos: usize) -> Self {
        AffineExpr::Dim(pos)
    }

    #[inline]
    pub fn symbol(pos: usize) -> Self {
        AffineExpr::Symbol(pos)
    }

    #[inline]
    pub fn constant(value: i64) -> Self {
        AffineExpr::Constant(value)
    }

    /// The value of a constant expression.
    #[inline]
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            AffineExpr::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Constants are folded unless the fold would overflow.
    pub fn add(lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        match (lhs, rhs) {
            (AffineExpr::Constant(a), AffineExpr::Constant(b)) => match a.checked_add(b) {
                Some(c) => AffineExpr::Constant(c),
                None => AffineExpr::Add(
                    Box::new(AffineExpr::Constant(a)),
                    Box::new(AffineExpr::Constant(b)),
                ),
            },
            (e, AffineExpr::Constant(0)) | (AffineExpr::Constant(0), e) => e,
            (c @ AffineExpr::Constant(_), e) => AffineExpr::add(e, c),
            (AffineExpr::Add(inner, c1), AffineExpr::Constant(c2)) => match *c1 {
                AffineExpr::Constant(c1) if c1.checked_add(c2).is_some() => {
                    AffineExpr::add(*inner, AffineExpr::Constant(c1 + c2))
                }
                other => AffineExpr::Add(
                    Box::new(AffineExpr::Add(inner, Box::new(other))),
                    Box::new(AffineExpr::Constant(c2)),
                ),
            },
            (l, r) => AffineExpr::Add(Box::new(l), Box::new(r)),
        }
    }

    pub fn mul(lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        match (lhs, rhs) {
            (AffineExpr::Constant(a), AffineExpr::Constant(b)) => match a.checked_mul(b) {
                Some(c) => AffineExpr::Constant(c),
                None => AffineExpr::Mul(
                    Box::new(AffineExpr::Constant(a)),
                    Box::new(AffineExpr::Constant(b)),
                ),
            },
            (_, AffineExpr::Constant(0)) | (AffineExpr::Constant(0), _) => AffineExpr::Constant(0),
            (e, AffineExpr::Constant(1)) | (AffineExpr::Constant(1), e) => e,
            (c @ AffineExpr::Constant(_), e) => AffineExpr::mul(e, c),
            (AffineExpr::Mul(inner, c1), AffineExpr::Constant(c2)) => match *c1 {
                AffineExpr::Constant(c1) if c1.checked_mul(c2).is_some() => {
                    AffineExpr::mul(*inner, AffineExpr::Constant(c1 * c2))
                }
                other => AffineExpr::Mul(
                    Box::new(AffineExpr::Mul(inner, Box::new(other))),
                    Box::new(AffineExpr::Constant(c2)),
                ),
            },
            (l, r) => AffineExpr::Mul(Box::new(l), Box::new(r)),
        }
    }

    pub fn floor_div(lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        match (lhs, rhs) {
            (AffineExpr::Constant(a), AffineExpr::Constant(b)) if b != 0 => {
                AffineExpr::Constant(floor_div(a, b))
            }
            (e, AffineExpr::Constant(1)) => e,
            (l, r) => AffineExpr::FloorDiv(Box::new(l), Box::new(r)),
        }
    }

    pub fn ceil_div(lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        match (lhs, rhs) {
            (AffineExpr::Constant(a), AffineExpr::Constant(b)) if b != 0 => {
                AffineExpr::Constant(ceil_div(a, b))
            }
            (e, AffineExpr::Constant(1)) => e,
            (l, r) => AffineExpr::CeilDiv(Box::new(l), Box::new(r)),
        }
    }

    pub fn modulo(lhs: AffineExpr, rhs: AffineExpr) -> AffineExpr {
        match (lhs, rhs) {
            (AffineExpr::Constant(a), AffineExpr::Constant(b)) if b > 0 => {
                AffineExpr::Constant(a.rem_euclid(b))
            }
            (_, AffineExpr::Constant(1)) => AffineExpr::Constant(0),
            (l, r) => AffineExpr::Mod(Box::new(l), Box::new(r)),
        }
    }

    /// `self floordiv divisor`.
    #[inline]
    pub fn floor_div_by(self, divisor: i64) -> AffineExpr {
        AffineExpr::floor_div(self, AffineExpr::Constant(divisor))
    }

    /// `self ceildiv divisor`.
    #[inline]
    pub fn ceil_div_by(self, divisor: i64) -> AffineExpr {
        AffineExpr::ceil_div(self, AffineExpr::Constant(divisor))
    }

    /// `self mod modulus`.
    #[inline]
    pub fn modulo_by(self, modulus: i64) -> AffineExpr {
        AffineExpr::modulo(self, AffineExpr::Constant(modulus))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True if the expression multiplies only by constants and divides only
    /// by constants.
    pub fn is_pure_affine(&self) -> bool {
        match self {
            AffineExpr::Dim(_) | AffineExpr::Symbol(_) | AffineExpr::Constant(_) => true,
            AffineExpr::Add(l, r) => l.is_pure_affine() && r.is_pure_affine(),
            AffineExpr::Mul(l, r) => {
                l.is_pure_affine()
                    && r.is_pure_affine()
                    && (l.is_constant_only() || r.is_constant_only())
            }
            AffineExpr::FloorDiv(l, r) | AffineExpr::CeilDiv(l, r) | AffineExpr::Mod(l, r) => {
                l.is_pure_affine() && r.as_constant().is_some()
            }
        }
    }

    /// True if no dimension or symbol appears, i.e. the expression folds to a
    /// constant.
    fn is_constant_only(&self) -> bool {
        match self {
            AffineExpr::Dim(_) | AffineExpr::Symbol(_) => false,
            AffineExpr::Constant(_) => true,
            AffineExpr::Add(l, r)
            | AffineExpr::Mul(l, r)
            | AffineExpr::FloorDiv(l, r)
            | AffineExpr::CeilDiv(l, r)
            | AffineExpr::Mod(l, r) => {
                l.is_constant_only() && r.is_constant_only()
            }
        }
    }

    /// True if dimension `pos` occurs anywhere in the expression.
    pub fn involves_dim(&self, pos: usize) -> bool {
        match self {
            AffineExpr::Dim(d) => *d == pos,
            AffineExpr::Symbol(_) | AffineExpr::Constant(_) => false,
            AffineExpr::Add(l, r)
            | AffineExpr::Mul(l, r)
            | AffineExpr::FloorDiv(l, r)
            | AffineExpr::CeilDiv(l, r)
            | AffineExpr::Mod(l, r) => l.involves_dim(pos) || r.involves_dim(pos),
        }
    }

    /// Evaluate with concrete dimension and symbol values.
    ///
    /// Returns `None` on division or modulo by a non-positive value, on
    /// overflow, or when a position is out of range.
    pub fn evaluate(&self, dims: &[i64], symbols: &[i64]) -> Option<i64> {
        Some(match self {
            AffineExpr::Dim(d) => *dims.get(*d)?,
            AffineExpr::Symbol(s) => *symbols.get(*s)?,
            AffineExpr::Constant(c) => *c,
            AffineExpr::Add(l, r) => {
                l.evaluate(dims, symbols)?
                    .checked_add(r.evaluate(dims, symbols)?)?
            }
            AffineExpr::Mul(l, r) => {
                l.evaluate(dims, symbols)?
                    .checked_mul(r.evaluate(dims, symbols)?)?
            }
            AffineExpr::FloorDiv(l, r) => {
                let rhs = r.evaluate(dims, symbols)?;
                if rhs <= 0 {
                    return None;
                }
                floor_div(l.evaluate(dims, symbols)?, rhs)
            }
            AffineExpr::CeilDiv(l, r) => {
                let rhs = r.evaluate(dims, symbols)?;
                if rhs <= 0 {
                    return None;
                }
                ceil_div(l.evaluate(dims, symbols)?, rhs)
            }
            AffineExpr::Mod(l, r) => {
                let rhs = r.evaluate(dims, symbols)?;
                if rhs <= 0 {
                    return None;
                }
                l.evaluate(dims, symbols)?.rem_euclid(rhs)
            }
        })
    }

    /// Substitute every `d_i` by `dims[i]` and every `s_j` by `symbols[j]`,
    /// re-simplifying on the way up.
    pub fn replace_dims_and_symbols(&self, dims: &[AffineExpr], symbols: &[AffineExpr]) -> AffineExpr {
        match self {
            AffineExpr::Dim(d) => dims[*d].clone(),
            AffineExpr::Symbol(s) => symbols[*s].clone(),
            AffineExpr::Constant(c) => AffineExpr::Constant(*c),
            AffineExpr::Add(l, r) => AffineExpr::add(
                l.replace_dims_and_symbols(dims, symbols),
                r.replace_dims_and_symbols(dims, symbols),
            ),
            AffineExpr::Mul(l, r) => AffineExpr::mul(
                l.replace_dims_and_symbols(dims, symbols),
                r.replace_dims_and_symbols(dims, symbols),
            ),
            AffineExpr::FloorDiv(l, r) => AffineExpr::floor_div(
                l.replace_dims_and_symbols(dims, symbols),
                r.replace_dims_and_symbols(dims, symbols),
            ),
            AffineExpr::CeilDiv(l, r) => AffineExpr::ceil_div(
                l.replace_dims_and_symbols(dims, symbols),
                r.replace_dims_and_symbols(dims, symbols),
            ),
            AffineExpr::Mod(l, r) => AffineExpr::modulo(
                l.replace_dims_and_symbols(dims, symbols),
                r.replace_dims_and_symbols(dims, symbols),
            ),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            AffineExpr::Add(..) => 1,
            AffineExpr::Mul(..)
            | AffineExpr::FloorDiv(..)
            | AffineExpr::CeilDiv(..)
            | AffineExpr::Mod(..) => 2,
            _ => 3,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

impl Add for AffineExpr {
    type Output = AffineExpr;

    fn add(self, rhs: AffineExpr) -> AffineExpr {
        AffineExpr::add(self, rhs)
    }
}

impl Add<i64> for AffineExpr {
    type Output = AffineExpr;

    fn add(self, rhs: i64) -> AffineExpr {
        AffineExpr::add(self, AffineExpr::Constant(rhs))
    }
}

impl Sub for AffineExpr {
    type Output = AffineExpr;

    fn sub(self, rhs: AffineExpr) -> AffineExpr {
        AffineExpr::add(self, AffineExpr::mul(rhs, AffineExpr::Constant(-1)))
    }
}

impl Sub<i64> for AffineExpr {
    type Output = AffineExpr;

    fn sub(self, rhs: i64) -> AffineExpr {
        AffineExpr::add(self, AffineExpr::Constant(-rhs))
    }
}

impl Mul for AffineExpr {
    type Output = AffineExpr;

    fn mul(self, rhs: AffineExpr) -> AffineExpr {
        AffineExpr::mul(self, rhs)
    }
}

impl Mul<i64> for AffineExpr {
    type Output = AffineExpr;

    fn mul(self, rhs: i64) -> AffineExpr {
        AffineExpr::mul(self, AffineExpr::Constant(rhs))
    }
}

impl Neg for AffineExpr {
    type Output = AffineExpr;

    fn neg(self) -> AffineExpr {
        AffineExpr::mul(self, AffineExpr::Constant(-1))
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffineExpr::Dim(d) => write!(f, "d{}", d),
            AffineExpr::Symbol(s) => write!(f, "s{}", s),
            AffineExpr::Constant(c) => write!(f, "{}", c),
            AffineExpr::Add(l, r) => {
                l.fmt_operand(f, 1)?;
                match r.as_ref() {
                    AffineExpr::Constant(c) if *c < 0 => write!(f, " - {}", -c),
                    AffineExpr::Mul(x, c) if c.as_constant() == Some(-1) => {
                        write!(f, " - ")?;
                        x.fmt_operand(f, 2)
                    }
                    other => {
                        write!(f, " + ")?;
                        other.fmt_operand(f, 2)
                    }
                }
            }
            AffineExpr::Mul(l, r) => {
                l.fmt_operand(f, 2)?;
                write!(f, " * ")?;
                r.fmt_operand(f, 3)
            }
            AffineExpr::FloorDiv(l, r) => {
                l.fmt_operand(f, 2)?;
                write!(f, " floordiv ")?;
                r.fmt_operand(f, 3)
            }
            AffineExpr::CeilDiv(l, r) => {
                l.fmt_operand(f, 2)?;
                write!(f, " ceildiv ")?;
                r.fmt_operand(f, 3)
            }
            AffineExpr::Mod(l, r) => {
                l.fmt_operand(f, 2)?;
                write!(f, " mod ")?;
                r.fmt_operand(f, 3)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(p: usize) -> AffineExpr {
        AffineExpr::dim(p)
    }

    fn s(p: usize) -> AffineExpr {
        AffineExpr::symbol(p)
    }

    #[test]
    fn test_integer_helpers() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(-8, 2), -4);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
        assert_eq!(gcd(12, -18), 6);
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(0, 0), 0);
    }

    #[test]
    fn test_overflowing_fold_is_kept_unfolded() {
        let e = AffineExpr::constant(i64::MAX) + 1;
        assert_eq!(e.as_constant(), None);
        assert_eq!(e.evaluate(&[], &[]), None);

        let e = d(0) * i64::MAX * 2;
        assert!(matches!(e, AffineExpr::Mul(_, _)));
        assert_eq!(e.evaluate(&[0], &[]), Some(0));
        assert_eq!(e.evaluate(&[1], &[]), None);
    }

    #[test]
    fn test_constructors_fold_constants() {
        assert_eq!(AffineExpr::constant(3) + 4, AffineExpr::constant(7));
        assert_eq!(d(0) + 0, d(0));
        assert_eq!(d(0) * 1, d(0));
        assert_eq!(d(0) * 0, AffineExpr::constant(0));
        assert_eq!(d(0).floor_div_by(1), d(0));
        assert_eq!(d(0).modulo_by(1), AffineExpr::constant(0));
        assert_eq!((d(0) + 1) + 2, d(0) + 3);
        assert_eq!((d(0) * 2) * 3, d(0) * 6);
        assert_eq!(AffineExpr::constant(2) + d(1), d(1) + 2);
    }

    #[test]
    fn test_pure_affine_detection() {
        assert!((d(0) * 4 + s(0)).is_pure_affine());
        assert!((d(0) + 3).floor_div_by(4).is_pure_affine());
        assert!(!(d(0) * d(1)).is_pure_affine());
        assert!(!AffineExpr::floor_div(d(0), s(0)).is_pure_affine());
    }

    #[test]
    fn test_evaluate() {
        let e = (d(0) * 2 + s(0)).floor_div_by(3);
        assert_eq!(e.evaluate(&[4], &[1]), Some(3));
        assert_eq!((d(0) - 7).modulo_by(4).evaluate(&[2], &[]), Some(3));
        assert_eq!(AffineExpr::floor_div(d(0), s(0)).evaluate(&[4], &[0]), None);
        assert_eq!(d(3).evaluate(&[1], &[]), None);
    }

    #[test]
    fn test_replace_dims_and_symbols() {
        let e = d(0) + s(0) * 2;
        let replaced = e.replace_dims_and_symbols(&[d(1) + 1], &[AffineExpr::constant(5)]);
        assert_eq!(replaced, d(1) + 11);
    }

    #[test]
    fn test_display() {
        assert_eq!((d(0) + 1).to_string(), "d0 + 1");
        assert_eq!((d(0) - 1).to_string(), "d0 - 1");
        assert_eq!((d(0) - d(1)).to_string(), "d0 - d1");
        assert_eq!((d(0) + s(0)).floor_div_by(4).to_string(), "(d0 + s0) floordiv 4");
        assert_eq!((d(1) * 3 + d(0)).to_string(), "d1 * 3 + d0");
    }
}
