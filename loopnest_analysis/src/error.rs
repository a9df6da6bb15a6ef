//! Analysis errors.

use loopnest_ir::{IrError, NodeId, ValueId};
use thiserror::Error;

/// Reasons an analysis or transformation could not produce an answer.
///
/// An empty (unsatisfiable) region or dependence set is never an error;
/// those are ordinary results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    // =========================================================================
    // Caller contract
    // =========================================================================
    #[error("{0} is not an affine.load or affine.store")]
    NotAnAccess(NodeId),

    #[error("{0} is not an affine.for loop")]
    NotALoop(NodeId),

    #[error("loop depth {depth} exceeds the {available} loops enclosing {node}")]
    InvalidLoopDepth {
        node: NodeId,
        depth: usize,
        available: usize,
    },

    #[error("accesses reference different memrefs")]
    BufferMismatch,

    #[error("no dependence from {src} to {dst}")]
    NoDependence { src: NodeId, dst: NodeId },

    // =========================================================================
    // Not affine
    // =========================================================================
    #[error("{0} is neither a loop induction variable nor a valid symbol")]
    NotAffine(ValueId),

    #[error(transparent)]
    SemiAffine(#[from] IrError),

    // =========================================================================
    // Unsupported configuration
    // =========================================================================
    #[error("source and destination share {0} enclosing loops")]
    SharedSurroundingLoops(usize),

    #[error("source operation {0} is not inside any loop")]
    EmptySourceNest(NodeId),

    #[error("slice operand {0} is not visible at the insertion point")]
    OperandNotInScope(ValueId),

    #[error("slice state does not describe the source loop nest")]
    SliceMismatch,

    #[error("slice bound for source loop #{0} cannot be expressed")]
    UnboundedSlice(usize),

    #[error("incompatible regions: {0}")]
    IncompatibleRegions(&'static str),

    #[error("{what} ({actual}) exceeds the configured limit of {limit}")]
    LimitExceeded {
        what: &'static str,
        actual: usize,
        limit: usize,
    },

    // =========================================================================
    // Out of bounds
    // =========================================================================
    #[error("memref out of {side} bound access along dimension #{}", .dim + 1)]
    OutOfBounds { dim: usize, side: BoundSide },
}

/// Which side of `[0, extent)` an access may leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    Lower,
    Upper,
}

impl std::fmt::Display for BoundSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundSide::Lower => f.write_str("lower"),
            BoundSide::Upper => f.write_str("upper"),
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
