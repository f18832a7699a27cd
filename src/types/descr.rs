//! Type descriptors
//!
//! A [`TypeDescr`] is the canonical runtime description of one C type.  It is
//! immutable once built, except for the layout state of a struct or union,
//! which moves forward exactly once from pending to complete.
//!
//! # Canonical names
//!
//! Every descriptor carries the C spelling of its type with the declarator
//! name elided, plus the byte offset (`name_position`) where a name or a
//! further declarator would go:
//!
//! ```text
//! int *         position 5  (after the '*')
//! int[3]        position 3  (before the '[')
//! int(*)(long)  position 5  (after the '*')
//! ```
//!
//! Two descriptors are the same type iff their names are byte-identical.

use rustc_hash::FxHashMap;

use crate::types::primitives::{PrimitiveClass, PrimitiveType};
use crate::types::TypeId;

/// Calling convention of a function type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Abi {
    #[default]
    Default,
    Stdcall,
}

/// Signature of a function-pointer type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub abi: Abi,
    pub result: TypeId,
    pub args: Vec<TypeId>,
    pub variadic: bool,
}

/// Position of a bit-field inside its storage unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub shift: u32,
    pub width: u32,
}

/// One field of a completed struct or union
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeId,
    /// Byte offset of the field (of its storage unit, for bit-fields)
    pub offset: usize,
    pub bitfield: Option<BitField>,
}

/// Computed layout of a struct or union
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub fields: Vec<FieldInfo>,
    /// Some field offset, the total size or the alignment was forced to a
    /// value other than the one computed from the C rules.  Call marshaling
    /// must not assume the platform ABI for such a struct.
    pub custom_field_pos: bool,
    pub packed: bool,
    /// Ends with an array of unknown length
    pub varsize: bool,
    index: FxHashMap<String, usize>,
}

impl StructLayout {
    pub(crate) fn new(fields: Vec<FieldInfo>, custom_field_pos: bool, packed: bool, varsize: bool) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.name.is_empty())
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        StructLayout {
            fields,
            custom_field_pos,
            packed,
            varsize,
            index,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.index.get(name).map(|&i| &self.fields[i])
    }
}

/// Layout state of a struct or union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructState {
    /// Declared without a body; never gets a layout from its context
    Opaque,
    /// Body known (entry `index` of the context's struct table), layout not
    /// computed yet
    Pending { index: usize },
    /// Layout computation in progress; reaching it again by value is an
    /// incomplete-type error, by pointer is fine
    Completing { index: usize },
    Complete(StructLayout),
}

/// Payload of an enum type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    pub underlying: PrimitiveType,
    pub enumerators: Vec<(String, i64)>,
    by_name: FxHashMap<String, i64>,
    by_value: FxHashMap<i64, String>,
}

impl EnumInfo {
    pub fn new(underlying: PrimitiveType, enumerators: Vec<(String, i64)>) -> Self {
        let mut by_name = FxHashMap::default();
        let mut by_value = FxHashMap::default();
        for (name, value) in &enumerators {
            by_name.insert(name.clone(), *value);
            // first spelling of a value wins
            by_value.entry(*value).or_insert_with(|| name.clone());
        }
        EnumInfo {
            underlying,
            enumerators,
            by_name,
            by_value,
        }
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.by_value.get(&value).map(String::as_str)
    }
}

/// What kind of type a descriptor describes, with its kind-specific payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Primitive(PrimitiveType),
    Pointer,
    Array {
        /// Pointer-to-element type the array decays to
        decayed: TypeId,
    },
    Struct(StructState),
    Union(StructState),
    Enum(EnumInfo),
    FunctionPtr(FunctionSig),
}

/// Canonical description of one C type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescr {
    pub kind: TypeKind,
    /// Byte size; `None` while unknown (void, functions, opaque or pending
    /// aggregates, open arrays)
    pub size: Option<usize>,
    /// One field, two meanings: the alignment for primitives, pointers,
    /// enums, structs and unions, but the element count for arrays (`None`
    /// for `[]`).  Use [`TypeDescr::array_length`] or the universe's
    /// `alignment_of` rather than reading it directly.
    pub align_or_length: Option<usize>,
    /// Pointee or element type
    pub item: Option<TypeId>,
    pub name: String,
    pub name_position: usize,
    /// Refers (possibly indirectly) to a struct, union or enum of one
    /// particular context
    pub local: bool,
}

impl TypeDescr {
    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    pub fn is_function_ptr(&self) -> bool {
        matches!(self.kind, TypeKind::FunctionPtr(_))
    }

    pub fn is_struct_or_union(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_) | TypeKind::Union(_))
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(_))
    }

    /// Integer-like: may be a bit-field or an enum's base
    pub fn is_integer(&self) -> bool {
        match &self.kind {
            TypeKind::Primitive(p) => p.is_integer(),
            TypeKind::Enum(_) => true,
            _ => false,
        }
    }

    pub fn primitive_class(&self) -> Option<PrimitiveClass> {
        match &self.kind {
            TypeKind::Primitive(p) => Some(p.class()),
            TypeKind::Void => Some(PrimitiveClass::Void),
            _ => None,
        }
    }

    /// Element count of an array type; `None` for open arrays and non-arrays
    pub fn array_length(&self) -> Option<usize> {
        if self.is_array() {
            self.align_or_length
        } else {
            None
        }
    }

    pub fn struct_state(&self) -> Option<&StructState> {
        match &self.kind {
            TypeKind::Struct(state) | TypeKind::Union(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn struct_state_mut(&mut self) -> Option<&mut StructState> {
        match &mut self.kind {
            TypeKind::Struct(state) | TypeKind::Union(state) => Some(state),
            _ => None,
        }
    }

    pub fn layout(&self) -> Option<&StructLayout> {
        match self.struct_state() {
            Some(StructState::Complete(layout)) => Some(layout),
            _ => None,
        }
    }

    pub fn enum_info(&self) -> Option<&EnumInfo> {
        match &self.kind {
            TypeKind::Enum(info) => Some(info),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&FunctionSig> {
        match &self.kind {
            TypeKind::FunctionPtr(sig) => Some(sig),
            _ => None,
        }
    }

    /// Splice `insert` at the insertion point: `"(*p)"` with `int[3]` gives
    /// `int(*p)[3]`.
    pub fn display_with(&self, insert: &str) -> String {
        let mut out = String::with_capacity(self.name.len() + insert.len());
        out.push_str(&self.name[..self.name_position]);
        out.push_str(insert);
        out.push_str(&self.name[self.name_position..]);
        out
    }

    /// Head and tail of the name around the insertion point
    pub fn name_parts(&self) -> (&str, &str) {
        self.name.split_at(self.name_position)
    }
}
