//! Value types: index, scalars and memrefs.

use smallvec::SmallVec;
use std::fmt;

/// Scalar element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    I1,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
    Index,
}

impl ElementType {
    /// Width in bits.
    pub const fn bit_width(self) -> u32 {
        match self {
            ElementType::I1 => 1,
            ElementType::I8 => 8,
            ElementType::I16 | ElementType::F16 => 16,
            ElementType::I32 | ElementType::F32 => 32,
            ElementType::I64 | ElementType::F64 | ElementType::Index => 64,
        }
    }

    /// Storage size in bytes, rounding sub-byte widths up.
    pub const fn byte_width(self) -> u64 {
        (self.bit_width() as u64 + 7) / 8
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::I1 => "i1",
            ElementType::I8 => "i8",
            ElementType::I16 => "i16",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::Index => "index",
        };
        f.write_str(name)
    }
}

/// A multi-dimensional buffer type with identity layout.
///
/// Each dimension is either a static extent or dynamic (`None`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemRefType {
    shape: SmallVec<[Option<i64>; 4]>,
    element: ElementType,
    memory_space: u32,
}

impl MemRefType {
    /// A statically shaped memref in the default memory space.
    pub fn new(shape: &[i64], element: ElementType) -> Self {
        MemRefType {
            shape: shape.iter().map(|&d| Some(d)).collect(),
            element,
            memory_space: 0,
        }
    }

    /// A memref whose dimensions may be dynamic.
    pub fn with_dims(shape: &[Option<i64>], element: ElementType) -> Self {
        MemRefType {
            shape: shape.iter().copied().collect(),
            element,
            memory_space: 0,
        }
    }

    pub fn in_memory_space(mut self, memory_space: u32) -> Self {
        self.memory_space = memory_space;
        self
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn shape(&self) -> &[Option<i64>] {
        &self.shape
    }

    /// Static extent of dimension `dim`, or `None` when dynamic.
    #[inline]
    pub fn dim_size(&self, dim: usize) -> Option<i64> {
        self.shape[dim]
    }

    pub fn has_static_shape(&self) -> bool {
        self.shape.iter().all(Option::is_some)
    }

    #[inline]
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    #[inline]
    pub fn memory_space(&self) -> u32 {
        self.memory_space
    }
}

impl fmt::Display for MemRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memref<")?;
        for dim in &self.shape {
            match dim {
                Some(d) => write!(f, "{}x", d)?,
                None => write!(f, "?x")?,
            }
        }
        write!(f, "{}", self.element)?;
        if self.memory_space != 0 {
            write!(f, ", {}", self.memory_space)?;
        }
        write!(f, ">")
    }
}

/// Type of an SSA value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Index,
    Scalar(ElementType),
    MemRef(MemRefType),
}

impl Type {
    pub fn as_memref(&self) -> Option<&MemRefType> {
        match self {
            Type::MemRef(ty) => Some(ty),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Index => f.write_str("index"),
            Type::Scalar(e) => write!(f, "{}", e),
            Type::MemRef(m) => write!(f, "{}", m),
        }
    }
}
