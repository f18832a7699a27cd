//! Type descriptors and the universe that owns them
//!
//! - [`primitives`]: the closed set of C primitive types
//! - [`descr`]: the [`TypeDescr`] model
//! - [`universe`]: the descriptor arena, interning tables and type
//!   constructors

pub mod descr;
pub mod primitives;
pub mod universe;

pub use descr::{
    Abi, BitField, EnumInfo, FieldInfo, FunctionSig, StructLayout, StructState, TypeDescr,
    TypeKind,
};
pub use primitives::{PrimitiveClass, PrimitiveType};
pub use universe::{LocalTypes, SharedUniverse, TypeUniverse};

/// Handle of a descriptor in a [`TypeUniverse`].
///
/// The generation is bumped whenever an arena slot is freed, so a handle kept
/// past the teardown of its context is detected instead of silently aliasing
/// a newer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl TypeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}
