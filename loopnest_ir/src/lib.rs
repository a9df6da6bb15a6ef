//! Loop-nest IR.
//!
//! A structured, arena-backed representation of affine loop nests: functions
//! made of blocks of operations, `affine.for` loops and `affine.if`
//! conditionals, plus the affine expression, map and integer-set algebra the
//! analyses are written against.
//!
//! # Modules
//!
//! - [`arena`]: typed ids and arena storage
//! - [`node`] / [`function`]: the node sum type, values, blocks
//! - [`builder`]: closure-based construction of nests
//! - [`clone`]: deep subtree cloning with value remapping
//! - [`affine_expr`] / [`affine_map`] / [`flatten`]: affine algebra
//! - [`types`]: memref and scalar types
//! - [`diagnostics`]: locations and a diagnostic sink

pub mod affine_expr;
pub mod affine_map;
pub mod arena;
pub mod builder;
pub mod clone;
pub mod diagnostics;
pub mod error;
pub mod flatten;
pub mod function;
pub mod node;
pub mod types;

pub use affine_expr::AffineExpr;
pub use affine_map::{AffineMap, IntegerSet};
pub use arena::{Arena, Id};
pub use builder::FunctionBuilder;
pub use clone::{CloneResult, SubtreeCloner};
pub use diagnostics::{Diagnostic, Diagnostics, Location, Severity};
pub use error::{IrError, IrResult};
pub use flatten::{
    expr_from_flat_form, flatten_exprs, flatten_map, simplify_affine_expr, simplify_affine_map,
    AffineExprFlattener, FlattenedMap, LocalDivision,
};
pub use function::Function;
pub use node::{
    AffineBound, AffineFor, AffineIf, ArithOp, BlockId, Node, NodeId, NodeKind, Operation,
    Operator, Value, ValueDef, ValueId,
};
pub use types::{ElementType, MemRefType, Type};
