//! Errors raised by the affine algebra.

use thiserror::Error;

/// Failure to treat an expression as (pure) affine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// Product of two non-constant terms, or division/modulo by a
    /// non-constant.
    #[error("semi-affine expression `{0}`")]
    SemiAffine(String),

    /// floordiv/ceildiv/mod by zero or a negative constant.
    #[error("division by non-positive constant {0}")]
    NonPositiveDivisor(i64),

    /// A flattened coefficient does not fit in an `i64`.
    #[error("coefficient overflow flattening `{0}`")]
    Overflow(String),
}

pub type IrResult<T> = Result<T, IrError>;
