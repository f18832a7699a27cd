//! Error types for context construction, realization and layout
//!
//! Parse errors live with the parser ([`ParseError`]); everything that can go
//! wrong afterwards is defined here.  All of these are recoverable: the caller
//! can drop the failed request and carry on with the same context.  Broken
//! invariants (a stale type handle, completing a struct twice) are bugs in the
//! caller and panic instead.

use thiserror::Error;

pub use crate::parser::parse::{ParseError, ParseErrorKind};

/// Result type for the [`Ffi`](crate::ffi::Ffi) API
pub type FfiResult<T> = Result<T, FfiError>;

/// Which side table of a type context an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Globals,
    StructsUnions,
    Fields,
    Enums,
    Typenames,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Table::Globals => "globals",
            Table::StructsUnions => "structs/unions",
            Table::Fields => "fields",
            Table::Enums => "enums",
            Table::Typenames => "typenames",
        };
        f.write_str(name)
    }
}

/// Errors building or validating a [`TypeContext`](crate::context::TypeContext)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("duplicate name '{name}' in {table} table")]
    DuplicateName { table: Table, name: String },

    #[error("{table} table is not sorted: '{name}' is out of order")]
    Unsorted { table: Table, name: String },

    #[error("{table} entry '{name}' refers to type index {index}, but there are only {len} types")]
    TypeIndexOutOfRange {
        table: Table,
        name: String,
        index: usize,
        len: usize,
    },

    #[error("struct/union '{name}' has fields {first}..{end}, but there are only {len} fields")]
    FieldRangeOutOfRange {
        name: String,
        first: usize,
        end: usize,
        len: usize,
    },

    #[error("field '{name}' has an inconsistent bit width for its type opcode")]
    BadFieldOpcode { name: String },

    #[error("enumerator '{enumerator}' of enum '{name}' is not declared as an enum constant")]
    MissingEnumerator { name: String, enumerator: String },

    #[error("enum '{name}' has non-integer underlying type '{underlying}'")]
    BadEnumBase { name: String, underlying: String },

    #[error("type slot {index} is malformed: {problem}")]
    BadTypeSlot { index: usize, problem: &'static str },

    #[error("in declaration of '{name}': {source}")]
    Declaration {
        name: String,
        #[source]
        source: ParseError,
    },
}

/// Errors computing a struct or union layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("field '{owner}.{field}' has ctype '{ctype}' of unknown size")]
    UnknownFieldSize {
        owner: String,
        field: String,
        ctype: String,
    },

    #[error("duplicate field name '{field}' in '{owner}'")]
    DuplicateField { owner: String, field: String },

    #[error("field '{owner}.{field}' declared as '{ctype}' cannot be a bit field")]
    BitFieldNotInteger {
        owner: String,
        field: String,
        ctype: String,
    },

    #[error("bit field '{owner}.{field}' is declared '{ctype}:{width}', which exceeds the width of the type")]
    BitFieldTooWide {
        owner: String,
        field: String,
        ctype: String,
        width: u32,
    },

    #[error("bit field '{owner}.{field}' has a {size}-byte type, but follows a bit field of a {previous}-byte type")]
    BitFieldTypeMismatch {
        owner: String,
        field: String,
        size: usize,
        previous: usize,
    },

    #[error("field '{owner}.{field}' is declared with :0")]
    NamedZeroWidth { owner: String, field: String },

    #[error("field '{owner}.{field}' is a bitfield, but a fixed offset is specified")]
    BitFieldWithOffset { owner: String, field: String },

    #[error("{owner} cannot be of size {size}: there are fields at least up to {needed}")]
    SizeTooSmall {
        owner: String,
        size: usize,
        needed: usize,
    },

    #[error("{owner} is too large: its fields overflow the address space")]
    TooLarge { owner: String },

    #[error("{owner}: wrong {what} (declared {declared}, computed {computed})")]
    Mismatch {
        owner: String,
        what: String,
        declared: usize,
        computed: usize,
    },
}

/// Errors turning opcodes into type descriptors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealizeError {
    #[error("the type '{0}' is a function type, not a pointer-to-function type")]
    FunctionNotPointer(String),

    #[error("array item of unknown size: '{0}'")]
    UnknownItemSize(String),

    #[error("array size would overflow a ssize_t")]
    ArrayTooLarge,

    #[error("argument {index} of type '{ctype}' is not allowed in a function type")]
    InvalidArgument { index: usize, ctype: String },

    #[error("invalid result type: '{0}'")]
    InvalidResult(String),

    #[error("abi number {0} not supported")]
    UnsupportedAbi(usize),

    #[error("unknown opcode {code} at slot {index}")]
    BadOpcode { code: u8, index: usize },

    #[error("type-building recursion too deep or infinite")]
    RecursionTooDeep,

    #[error("enumerator '{0}' has no integer value in this context")]
    MissingEnumerator(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Any error surfaced by an [`Ffi`](crate::ffi::Ffi) instance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FfiError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Realize(#[from] RealizeError),

    #[error("ctype '{0}' is of unknown size")]
    UnknownSize(String),

    #[error("'{0}' is not a struct or union type")]
    NotAStruct(String),

    #[error("'{0}' is not an enum type")]
    NotAnEnum(String),

    #[error("'{ctype}' has no field '{field}'")]
    NoSuchField { ctype: String, field: String },

    #[error("no global '{0}' in this context")]
    NoSuchGlobal(String),

    #[error("'{0}' is not an integer constant")]
    NotAnIntConstant(String),

    #[error("'{ctype}' has no enumerator '{name}'")]
    NoSuchEnumerator { ctype: String, name: String },
}

impl From<LayoutError> for FfiError {
    fn from(err: LayoutError) -> Self {
        FfiError::Realize(RealizeError::Layout(err))
    }
}

impl FfiError {
    /// Byte offset into the parsed text, for parse errors
    pub fn location(&self) -> Option<usize> {
        match self {
            FfiError::Parse(err) => Some(err.location),
            _ => None,
        }
    }
}
