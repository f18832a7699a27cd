//! Opcode encoding for parsed C types
//!
//! A parsed type is a flat array of word-sized opcodes.  Each opcode packs an
//! operation in its low 8 bits and an argument in the remaining bits:
//!
//! ```text
//! [argument: usize - 8 bits][op: 8 bits]
//! ```
//!
//! All operation codes are odd, so a raw opcode always has its low bit set.
//! Generated tables rely on that bit to tell raw opcodes apart from already
//! realized entries; here the distinction is carried by [`Slot`] instead.
//!
//! Slot arguments (`POINTER`, `ARRAY`, `OPEN_ARRAY`, `FUNCTION`, `NOOP`) refer
//! to earlier (or the same) slots of the array they live in.  `TYPENAME`,
//! `STRUCT_UNION` and `ENUM` index the context tables instead, and always
//! resolve through the context's persistent types array.

use std::fmt;

use crate::parser::parse::{ParseError, ParseErrorKind};
use crate::types::TypeId;

/// Operation stored in the low byte of an [`Opcode`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Primitive = 1,
    Pointer = 3,
    Array = 5,
    OpenArray = 7,
    StructUnion = 9,
    Enum = 11,
    Function = 13,
    FunctionEnd = 15,
    Noop = 17,
    Bitfield = 19,
    Typename = 21,
}

impl Op {
    pub fn from_code(code: u8) -> Option<Op> {
        let op = match code {
            1 => Op::Primitive,
            3 => Op::Pointer,
            5 => Op::Array,
            7 => Op::OpenArray,
            9 => Op::StructUnion,
            11 => Op::Enum,
            13 => Op::Function,
            15 => Op::FunctionEnd,
            17 => Op::Noop,
            19 => Op::Bitfield,
            21 => Op::Typename,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the argument of this op is a slot index in the same array
    pub fn targets_slot(self) -> bool {
        matches!(
            self,
            Op::Pointer | Op::Array | Op::OpenArray | Op::Function | Op::Noop | Op::Bitfield
        )
    }
}

/// `FUNCTION_END` flag: the parameter list ends with `...`
pub const FUNCTION_END_ELLIPSIS: usize = 0x01;

/// `FUNCTION_END` flag: `__stdcall` calling convention
pub const FUNCTION_END_STDCALL: usize = 0x02;

/// One packed instruction (or, after an `ARRAY`, a raw length word)
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Opcode(usize);

impl Opcode {
    pub const fn new(op: Op, arg: usize) -> Self {
        Opcode((arg << 8) | op as usize)
    }

    pub const fn from_raw(raw: usize) -> Self {
        Opcode(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }

    /// Operation code byte, which may not name a known [`Op`] for raw words
    pub const fn code(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn op(self) -> Option<Op> {
        Op::from_code(self.code())
    }

    pub const fn arg(self) -> usize {
        self.0 >> 8
    }

    pub fn is(self, op: Op) -> bool {
        self.code() == op as u8
    }

    /// Same operation, new argument
    pub fn with_arg(self, arg: usize) -> Self {
        Opcode((arg << 8) | (self.0 & 0xFF))
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "{:?}({})", op, self.arg()),
            None => write!(f, "Raw({})", self.0),
        }
    }
}

/// Result of realizing one slot.
///
/// A bare function type is kept apart from the function-pointer type it is
/// represented by, so that `int(int)` can be rejected where a value type is
/// required while still being a valid target of an enclosing `POINTER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Realized {
    Type(TypeId),
    Function(TypeId),
}

impl Realized {
    /// The descriptor, reading a function type as its function pointer
    pub fn as_fnptr(self) -> TypeId {
        match self {
            Realized::Type(id) | Realized::Function(id) => id,
        }
    }

    pub fn is_function(self) -> bool {
        matches!(self, Realized::Function(_))
    }
}

/// One entry of an opcode array: either still an opcode, or the memoized
/// result of realizing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Op(Opcode),
    Realized(Realized),
}

impl Slot {
    /// The opcode, if this slot has not been realized yet
    pub fn opcode(self) -> Option<Opcode> {
        match self {
            Slot::Op(op) => Some(op),
            Slot::Realized(_) => None,
        }
    }

    /// Whether the slot still holds the given raw op
    pub fn is_op(self, op: Op) -> bool {
        self.opcode().is_some_and(|code| code.is(op))
    }
}

impl From<Opcode> for Slot {
    fn from(op: Opcode) -> Self {
        Slot::Op(op)
    }
}

/// Fixed-capacity output buffer for the parser.
///
/// The parser appends after whatever the buffer already holds, so the same
/// type can write straight into a context's persistent array.  Pushing past
/// `limit` total slots is a capacity error rather than a reallocation.
#[derive(Debug, Clone)]
pub struct OpcodeBuffer {
    slots: Vec<Slot>,
    limit: usize,
}

impl OpcodeBuffer {
    pub fn new(limit: usize) -> Self {
        OpcodeBuffer {
            slots: Vec::new(),
            limit,
        }
    }

    /// Wrap existing slots, allowing `extra` more to be appended
    pub fn from_slots(slots: Vec<Slot>, extra: usize) -> Self {
        let limit = slots.len() + extra;
        OpcodeBuffer { slots, limit }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Allow `extra` more slots past the current length
    pub fn reserve_budget(&mut self, extra: usize) {
        self.limit = self.slots.len() + extra;
    }

    pub(crate) fn push(&mut self, op: Opcode, location: usize) -> Result<usize, ParseError> {
        if self.slots.len() >= self.limit {
            return Err(ParseError::new(
                location,
                "internal type complexity limit reached",
                ParseErrorKind::Capacity,
            ));
        }
        self.slots.push(Slot::Op(op));
        Ok(self.slots.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    /// Opcode at `index`; the parser only ever sees unrealized slots
    pub(crate) fn opcode(&self, index: usize) -> Opcode {
        match self.slots[index] {
            Slot::Op(op) => op,
            Slot::Realized(_) => Opcode::default(),
        }
    }

    pub(crate) fn set(&mut self, index: usize, op: Opcode) {
        self.slots[index] = Slot::Op(op);
    }

    /// Memoize the realization of `index`
    pub(crate) fn set_realized(&mut self, index: usize, realized: Realized) {
        self.slots[index] = Slot::Realized(realized);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<Slot> {
        self.slots
    }
}
