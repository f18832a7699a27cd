//! Tunables for parsing and realization.

use crate::constants::{DEFAULT_OPCODE_CAPACITY, MAX_REALIZE_RECURSION};

/// Limits applied by an [`Ffi`](crate::ffi::Ffi) instance and by the
/// [`ContextBuilder`](crate::context::ContextBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfiConfig {
    /// Maximum number of opcode slots one parse may emit
    pub opcode_capacity: usize,
    /// Maximum nesting depth of the realization engine
    pub max_realize_depth: usize,
}

impl FfiConfig {
    pub fn with_opcode_capacity(mut self, capacity: usize) -> Self {
        self.opcode_capacity = capacity;
        self
    }

    pub fn with_max_realize_depth(mut self, depth: usize) -> Self {
        self.max_realize_depth = depth;
        self
    }
}

impl Default for FfiConfig {
    fn default() -> Self {
        FfiConfig {
            opcode_capacity: DEFAULT_OPCODE_CAPACITY,
            max_realize_depth: MAX_REALIZE_RECURSION,
        }
    }
}
