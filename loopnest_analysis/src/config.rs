//! Analysis configuration parameters.
//!
//! The analyses themselves are exact up to the constraint engine's built-in
//! row ceiling; these limits let callers refuse oversized inputs up front.

use crate::error::{AnalysisError, AnalysisResult};
use loopnest_ir::{Function, NodeId};

/// Size caps applied before running the analyses.
///
/// # Example
///
/// ```
/// use loopnest_analysis::AnalysisConfig;
///
/// let config = AnalysisConfig {
///     max_nesting_depth: 4,
///     ..AnalysisConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    // =========================================================================
    // Nest Shape
    // =========================================================================
    /// Deepest loop nesting an analysed subtree may contain.
    ///
    /// Constraint systems grow with one column per enclosing loop.
    ///
    /// Default: 16
    pub max_nesting_depth: usize,

    /// Most loads and stores an analysed subtree may contain.
    ///
    /// Default: 512
    pub max_accesses: usize,

    // =========================================================================
    // Parallelism
    // =========================================================================
    /// Most ordered access pairs the parallelism check tests in one loop.
    ///
    /// Loops with more pairs are reported as sequential.
    ///
    /// Default: 16384
    pub max_access_pairs: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 16,
            max_accesses: 512,
            max_access_pairs: 16 * 1024,
        }
    }
}

impl AnalysisConfig {
    /// Generous limits for offline analysis of large kernels.
    pub fn precise() -> Self {
        Self {
            max_nesting_depth: 64,
            max_accesses: 8192,
            max_access_pairs: 1 << 22,
        }
    }

    /// Tight limits for use inside a fast compilation pipeline.
    pub fn fast() -> Self {
        Self {
            max_nesting_depth: 6,
            max_accesses: 64,
            max_access_pairs: 1024,
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::ZeroNestingDepth);
        }
        if self.max_accesses == 0 {
            return Err(ConfigError::ZeroAccesses);
        }
        if self.max_access_pairs == 0 {
            return Err(ConfigError::ZeroAccessPairs);
        }
        Ok(())
    }

    /// Check the subtree rooted at `root` against the nesting and access
    /// limits. Enclosing loops of `root` count towards the depth.
    pub fn admit(&self, func: &Function, root: NodeId) -> AnalysisResult<()> {
        let mut depth = 0;
        let mut accesses = 0;
        func.walk(root, &mut |node| {
            if func.node(node).is_access() {
                accesses += 1;
            }
            let loops = func
                .ancestors(node)
                .filter(|&a| func.node(a).is_for())
                .count()
                + usize::from(func.node(node).is_for());
            depth = depth.max(loops);
        });

        if depth > self.max_nesting_depth {
            return Err(AnalysisError::LimitExceeded {
                what: "loop nesting depth",
                actual: depth,
                limit: self.max_nesting_depth,
            });
        }
        if accesses > self.max_accesses {
            return Err(AnalysisError::LimitExceeded {
                what: "memory access count",
                actual: accesses,
                limit: self.max_accesses,
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_nesting_depth must be at least 1")]
    ZeroNestingDepth,
    #[error("max_accesses must be at least 1")]
    ZeroAccesses,
    #[error("max_access_pairs must be at least 1")]
    ZeroAccessPairs,
}
