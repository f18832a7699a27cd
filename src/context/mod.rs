//! Type context: the declared names a parse or realization resolves against
//!
//! A [`TypeContext`] is a set of name-sorted tables (globals, structs and
//! unions, enums, typenames) plus the field table and the persistent opcode
//! array all of them point into.  Lookups are binary searches; the sort
//! order and the absence of duplicates are checked once, when the context is
//! built, and assumed afterwards.
//!
//! The persistent array doubles as the realization cache: once a slot is
//! realized it holds the resulting type instead of its opcode.
//!
//! Contexts are normally produced by a [`ContextBuilder`]; tables generated
//! elsewhere can be loaded with [`TypeContext::new`].

mod builder;

pub use builder::{ContextBuilder, FieldDecl, StructDecl};

use std::cmp::Ordering;

use crate::errors::{ContextError, Table};
use crate::parser::opcodes::{Op, Opcode, OpcodeBuffer, Slot};
use crate::types::primitives::PrimitiveType;

/// What a global name stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalKind {
    Function,
    Variable,
    IntConstant(i64),
    EnumConstant(i64),
}

/// A function, variable or constant.  Addresses are resolved by whoever
/// loads the library; the context only knows the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEntry {
    pub name: String,
    pub type_index: usize,
    pub kind: GlobalKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructFlags {
    /// Declared without a body
    pub opaque: bool,
    /// Fields are not aligned
    pub packed: bool,
    /// Explicit offsets, size and alignment must agree with the computed
    /// layout instead of overriding it
    pub check_fields: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructUnionEntry {
    pub name: String,
    /// Primary slot of the type in the persistent array
    pub type_index: usize,
    pub is_union: bool,
    pub flags: StructFlags,
    /// Explicit total size; `None` lets the layout compute it
    pub size: Option<usize>,
    pub alignment: Option<usize>,
    pub first_field: usize,
    pub num_fields: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    /// Empty for unnamed fields (padding bit-fields)
    pub name: String,
    /// `NOOP(type slot)`, or `BITFIELD(type slot)` for bit-fields
    pub type_op: Opcode,
    /// Explicit byte offset
    pub offset: Option<usize>,
    pub bit_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    pub name: String,
    pub type_index: usize,
    pub underlying: PrimitiveType,
    /// Enumerator names joined with `,`; values are the matching
    /// [`GlobalKind::EnumConstant`] globals
    pub enumerators: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypenameEntry {
    pub name: String,
    pub type_index: usize,
}

/// Entries that can be looked up by name
pub trait Named {
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($entry:ty),*) => {
        $(impl Named for $entry {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_named!(GlobalEntry, StructUnionEntry, EnumEntry, TypenameEntry);

/// Binary search of a name-sorted table.
///
/// # Panics
///
/// Panics if the match has a duplicate neighbour, which a validated table
/// never has.
pub fn search<T: Named>(table: &[T], name: &str) -> Option<usize> {
    let key = name.as_bytes();
    let (mut low, mut high) = (0, table.len());

    while low < high {
        let mid = low + (high - low) / 2;
        match table[mid].name().as_bytes().cmp(key) {
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
            Ordering::Equal => {
                let duplicated = (mid > 0 && table[mid - 1].name() == name)
                    || table.get(mid + 1).is_some_and(|next| next.name() == name);
                assert!(!duplicated, "duplicate name '{}' in a type context table", name);
                return Some(mid);
            }
        }
    }

    None
}

/// Check that a table is strictly ascending by name
fn check_sorted<T: Named>(table: &[T], which: Table) -> Result<(), ContextError> {
    for pair in table.windows(2) {
        match pair[0].name().as_bytes().cmp(pair[1].name().as_bytes()) {
            Ordering::Less => {}
            Ordering::Equal => {
                return Err(ContextError::DuplicateName {
                    table: which,
                    name: pair[1].name().to_string(),
                });
            }
            Ordering::Greater => {
                return Err(ContextError::Unsorted {
                    table: which,
                    name: pair[1].name().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Raw tables for [`TypeContext::new`]
#[derive(Debug, Clone, Default)]
pub struct ContextTables {
    pub globals: Vec<GlobalEntry>,
    pub structs_unions: Vec<StructUnionEntry>,
    pub fields: Vec<FieldEntry>,
    pub enums: Vec<EnumEntry>,
    pub typenames: Vec<TypenameEntry>,
    pub types: Vec<Slot>,
}

/// Declared types and globals of one FFI instance
#[derive(Debug, Clone)]
pub struct TypeContext {
    pub(crate) globals: Vec<GlobalEntry>,
    pub(crate) structs_unions: Vec<StructUnionEntry>,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) enums: Vec<EnumEntry>,
    pub(crate) typenames: Vec<TypenameEntry>,
    pub(crate) types: OpcodeBuffer,
}

impl TypeContext {
    /// Load pre-built tables, validating them
    pub fn new(tables: ContextTables) -> Result<Self, ContextError> {
        let types = OpcodeBuffer::from_slots(tables.types, 0);
        let ctx = TypeContext {
            globals: tables.globals,
            structs_unions: tables.structs_unions,
            fields: tables.fields,
            enums: tables.enums,
            typenames: tables.typenames,
            types,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// A context declaring nothing; primitive types still parse
    pub fn empty() -> Self {
        TypeContext {
            globals: Vec::new(),
            structs_unions: Vec::new(),
            fields: Vec::new(),
            enums: Vec::new(),
            typenames: Vec::new(),
            types: OpcodeBuffer::new(0),
        }
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn validate(&self) -> Result<(), ContextError> {
        check_sorted(&self.globals, Table::Globals)?;
        check_sorted(&self.structs_unions, Table::StructsUnions)?;
        check_sorted(&self.enums, Table::Enums)?;
        check_sorted(&self.typenames, Table::Typenames)?;

        let len = self.types.len();
        let in_range = |table: Table, name: &str, index: usize| {
            if index < len {
                Ok(())
            } else {
                Err(ContextError::TypeIndexOutOfRange {
                    table,
                    name: name.to_string(),
                    index,
                    len,
                })
            }
        };

        for global in &self.globals {
            in_range(Table::Globals, &global.name, global.type_index)?;
        }
        for typename in &self.typenames {
            in_range(Table::Typenames, &typename.name, typename.type_index)?;
        }

        for entry in &self.structs_unions {
            in_range(Table::StructsUnions, &entry.name, entry.type_index)?;
            let end = entry.first_field + entry.num_fields;
            if end > self.fields.len() {
                return Err(ContextError::FieldRangeOutOfRange {
                    name: entry.name.clone(),
                    first: entry.first_field,
                    end,
                    len: self.fields.len(),
                });
            }
        }

        for field in &self.fields {
            let consistent = match field.type_op.op() {
                Some(Op::Noop) => field.bit_width.is_none(),
                Some(Op::Bitfield) => field.bit_width.is_some(),
                _ => false,
            };
            if !consistent {
                return Err(ContextError::BadFieldOpcode {
                    name: field.name.clone(),
                });
            }
            in_range(Table::Fields, &field.name, field.type_op.arg())?;
        }

        for entry in &self.enums {
            in_range(Table::Enums, &entry.name, entry.type_index)?;
            if !entry.underlying.is_integer() {
                return Err(ContextError::BadEnumBase {
                    name: entry.name.clone(),
                    underlying: entry.underlying.c_name().to_string(),
                });
            }
            for enumerator in entry.enumerator_names() {
                let declared = self
                    .search_global(enumerator)
                    .is_some_and(|i| matches!(self.globals[i].kind, GlobalKind::EnumConstant(_)));
                if !declared {
                    return Err(ContextError::MissingEnumerator {
                        name: entry.name.clone(),
                        enumerator: enumerator.to_string(),
                    });
                }
            }
        }

        self.validate_slots()
    }

    /// Walk every slot reachable from a table entry and check its opcode
    /// against the tables.  Unreachable slots (array lengths, spare
    /// parameter slots) are not opcodes and are left alone.
    fn validate_slots(&self) -> Result<(), ContextError> {
        let len = self.types.len();
        let mut visited = vec![false; len];
        let mut pending: Vec<usize> = self
            .globals
            .iter()
            .map(|g| g.type_index)
            .chain(self.typenames.iter().map(|t| t.type_index))
            .chain(self.structs_unions.iter().map(|s| s.type_index))
            .chain(self.enums.iter().map(|e| e.type_index))
            .chain(self.fields.iter().map(|f| f.type_op.arg()))
            .collect();

        let bad = |index: usize, problem: &'static str| ContextError::BadTypeSlot { index, problem };
        let target = |index: usize, arg: usize| {
            if arg < len {
                Ok(arg)
            } else {
                Err(bad(index, "refers past the end of the types array"))
            }
        };

        while let Some(index) = pending.pop() {
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            let op = match self.types.get(index) {
                Some(Slot::Op(op)) => op,
                _ => continue,
            };
            let arg = op.arg();
            match op.op() {
                Some(Op::Primitive) => {
                    if PrimitiveType::from_id(arg).is_none() {
                        return Err(bad(index, "unknown primitive type"));
                    }
                }
                Some(Op::Pointer) | Some(Op::OpenArray) | Some(Op::Noop) => {
                    pending.push(target(index, arg)?);
                }
                Some(Op::Array) => {
                    pending.push(target(index, arg)?);
                    if index + 1 >= len {
                        return Err(bad(index, "array without a length slot"));
                    }
                }
                Some(Op::StructUnion) if arg >= self.structs_unions.len() => {
                    return Err(bad(index, "struct/union index out of range"));
                }
                Some(Op::Enum) if arg >= self.enums.len() => {
                    return Err(bad(index, "enum index out of range"));
                }
                Some(Op::Typename) if arg >= self.typenames.len() => {
                    return Err(bad(index, "typename index out of range"));
                }
                Some(Op::StructUnion) | Some(Op::Enum) | Some(Op::Typename) => {}
                Some(Op::Function) => {
                    pending.push(target(index, arg)?);
                    let mut next = index + 1;
                    loop {
                        match self.types.get(next) {
                            None => return Err(bad(index, "function without FUNCTION_END")),
                            Some(Slot::Op(end)) if end.is(Op::FunctionEnd) => break,
                            Some(_) => pending.push(next),
                        }
                        next += 1;
                    }
                }
                Some(Op::FunctionEnd) | Some(Op::Bitfield) | None => {
                    return Err(bad(index, "not a type opcode"));
                }
            }
        }

        Ok(())
    }

    // ===== Search =====

    pub fn search_global(&self, name: &str) -> Option<usize> {
        search(&self.globals, name)
    }

    pub fn search_struct_union(&self, name: &str) -> Option<usize> {
        search(&self.structs_unions, name)
    }

    pub fn search_enum(&self, name: &str) -> Option<usize> {
        search(&self.enums, name)
    }

    pub fn search_typename(&self, name: &str) -> Option<usize> {
        search(&self.typenames, name)
    }

    // ===== Table access =====

    pub fn global(&self, index: usize) -> &GlobalEntry {
        &self.globals[index]
    }

    pub fn struct_union(&self, index: usize) -> &StructUnionEntry {
        &self.structs_unions[index]
    }

    /// Fields of the struct or union at `index`, in declaration order
    pub fn fields_of(&self, index: usize) -> &[FieldEntry] {
        let entry = &self.structs_unions[index];
        &self.fields[entry.first_field..entry.first_field + entry.num_fields]
    }

    pub fn enum_entry(&self, index: usize) -> &EnumEntry {
        &self.enums[index]
    }

    pub fn typename(&self, index: usize) -> &TypenameEntry {
        &self.typenames[index]
    }

    pub fn globals(&self) -> &[GlobalEntry] {
        &self.globals
    }

    pub fn structs_unions(&self) -> &[StructUnionEntry] {
        &self.structs_unions
    }

    pub fn enums(&self) -> &[EnumEntry] {
        &self.enums
    }

    pub fn typenames(&self) -> &[TypenameEntry] {
        &self.typenames
    }

    /// The persistent opcode array
    pub fn types(&self) -> &OpcodeBuffer {
        &self.types
    }
}

impl EnumEntry {
    pub fn enumerator_names(&self) -> impl Iterator<Item = &str> {
        self.enumerators.split(',').filter(|name| !name.is_empty())
    }
}
