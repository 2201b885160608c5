use crate::types::MemorySpace;

/// Memory descriptor attached to variables by the memory-planning passes.
///
/// Distinct variables may share one `MemRef` after memory reuse; sharing is
/// by `Arc` identity, so comparing ids is enough to group allocations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemRef {
    pub id: usize,
    pub space: MemorySpace,
    /// Allocation size; `None` when the shape is not fully constant.
    pub bytes: Option<u64>,
}

impl MemRef {
    pub fn new(id: usize, space: MemorySpace, bytes: Option<u64>) -> Self {
        Self { id, space, bytes }
    }
}
