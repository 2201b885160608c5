use std::sync::Arc;

use smallvec::SmallVec;
use tessera_dtype::DType;

use crate::expr::ExprRef;

pub type TypeRef = Arc<Type>;

/// On-chip / off-chip memory region a tile or buffer lives in.
///
/// The discriminants are part of the serialized IR format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::AsRefStr, strum::FromRepr)]
#[repr(u8)]
pub enum MemorySpace {
    /// Global/device memory.
    DDR = 0,
    /// Unified buffer, the default vector-compute memory.
    UB = 1,
    /// Level-1 staging buffer.
    L1 = 2,
    /// Matrix-unit left operand buffer.
    L0A = 3,
    /// Matrix-unit right operand buffer.
    L0B = 4,
}

/// Type of an IR value.
///
/// Shape dimensions are expressions so that symbolic sizes can be shared
/// between types; the same size node may be referenced from many shapes and
/// that sharing is observable (and preserved by the serializer).
#[derive(Debug)]
pub enum Type {
    Scalar(DType),
    Tensor { dtype: DType, shape: SmallVec<[ExprRef; 4]> },
    Tile { dtype: DType, shape: SmallVec<[ExprRef; 4]>, memory: MemorySpace },
    Tuple(SmallVec<[TypeRef; 4]>),
    /// Opaque handle to a memory descriptor.
    MemRefHandle,
}

impl Type {
    pub fn scalar(dtype: DType) -> TypeRef {
        Arc::new(Self::Scalar(dtype))
    }

    pub fn tensor(dtype: DType, shape: impl IntoIterator<Item = ExprRef>) -> TypeRef {
        Arc::new(Self::Tensor { dtype, shape: shape.into_iter().collect() })
    }

    pub fn tile(
        dtype: DType,
        shape: impl IntoIterator<Item = ExprRef>,
        memory: MemorySpace,
    ) -> TypeRef {
        Arc::new(Self::Tile { dtype, shape: shape.into_iter().collect(), memory })
    }

    pub fn tuple(elements: impl IntoIterator<Item = TypeRef>) -> TypeRef {
        Arc::new(Self::Tuple(elements.into_iter().collect()))
    }

    pub fn memref_handle() -> TypeRef {
        Arc::new(Self::MemRefHandle)
    }

    /// Element dtype for scalar/tensor/tile types.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Self::Scalar(dtype) => Some(*dtype),
            Self::Tensor { dtype, .. } | Self::Tile { dtype, .. } => Some(*dtype),
            Self::Tuple(_) | Self::MemRefHandle => None,
        }
    }

    pub fn shape(&self) -> Option<&[ExprRef]> {
        match self {
            Self::Tensor { shape, .. } | Self::Tile { shape, .. } => Some(shape),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<(DType, &[ExprRef])> {
        match self {
            Self::Tensor { dtype, shape } => Some((*dtype, shape)),
            _ => None,
        }
    }

    pub fn as_tile(&self) -> Option<(DType, &[ExprRef], MemorySpace)> {
        match self {
            Self::Tile { dtype, shape, memory } => Some((*dtype, shape, *memory)),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[TypeRef]> {
        match self {
            Self::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Self::Tensor { .. })
    }

    pub fn is_tile(&self) -> bool {
        matches!(self, Self::Tile { .. })
    }

    /// Kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "ScalarType",
            Self::Tensor { .. } => "TensorType",
            Self::Tile { .. } => "TileType",
            Self::Tuple(_) => "TupleType",
            Self::MemRefHandle => "MemRefHandle",
        }
    }
}
