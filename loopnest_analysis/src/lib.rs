//! Polyhedral analysis of affine loop nests.
//!
//! Everything here reads a [`loopnest_ir::Function`] and answers questions
//! about its loops and memory accesses through integer constraint systems:
//! which loops carry dependences, which memref elements an access touches,
//! which producer iterations a consumer needs, and how much memory a nest
//! uses. The one transformation, [`insert_backward_computation_slice`],
//! clones a producer nest into a consumer nest.
//!
//! # Modules
//!
//! - [`constraints`]: `FlatAffineConstraints`, projection and bounds
//! - [`access`]: access maps composed down to loop ivs and symbols
//! - [`nest`]: enclosing loops, nesting depth, common loops
//! - [`domain`]: loop bounds and conditions as constraints
//! - [`dependence`]: dependence systems between two accesses
//! - [`parallel`]: parallel / sequential classification
//! - [`region`]: `MemRefRegion` and its bounding box
//! - [`slice`]: backward computation slices
//! - [`materialize`]: inserting a slice into the consumer nest
//! - [`footprint`]: memory footprints and static bound checks
//! - [`config`]: analysis size limits
//!
//! # Usage
//!
//! ```ignore
//! let config = AnalysisConfig::default();
//! config.admit(&func, root)?;
//! let parallel = is_loop_parallel_with(&func, root, &config);
//! let bytes = get_memory_footprint_bytes(&func, root, None);
//! ```

pub mod access;
pub mod config;
pub mod constraints;
pub mod dependence;
pub mod domain;
pub mod error;
pub mod footprint;
pub mod materialize;
pub mod nest;
pub mod parallel;
pub mod region;
pub mod slice;

pub use access::{is_valid_dim, is_valid_symbol, AffineValueMap, MemRefAccess};
pub use config::{AnalysisConfig, ConfigError};
pub use constraints::{BoundComparison, DimExtent, FlatAffineConstraints, IdKind, SliceBoundMaps};
pub use dependence::{check_memref_access_dependence, DependenceKind};
pub use domain::{add_affine_for_domain, add_affine_if_domain, iteration_domain};
pub use error::{AnalysisError, AnalysisResult, BoundSide};
pub use footprint::{bound_check_load_or_store_op, get_memory_footprint_bytes};
pub use materialize::insert_backward_computation_slice;
pub use nest::{enclosing_loops, get_loop_ivs, get_nesting_depth, get_num_common_surrounding_loops};
pub use parallel::{get_sequential_loops, is_loop_parallel, is_loop_parallel_with};
pub use region::{get_memref_size_in_bytes, BoundingShape, MemRefRegion};
pub use slice::{get_backward_computation_slice_state, ComputationSliceState};
