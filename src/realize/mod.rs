//! Realization: from opcodes to type descriptors
//!
//! The [`Realizer`] walks an opcode array from an entry slot and builds the
//! descriptors it describes, interning each one in the shared
//! [`TypeUniverse`] and listing it in the instance's [`LocalTypes`].
//!
//! # Rules
//!
//! - Results found in the context's persistent array are written back in
//!   place, so every slot is realized at most once per context
//! - Transient arrays (from a one-off parse) are never written to
//! - A struct or union is memoized in its primary slot *before* its layout
//!   is computed, which is what lets `struct node { struct node *next; }`
//!   terminate
//! - Structs without a declared size are laid out as soon as they are
//!   realized, unless a layout is already in progress; those, and structs
//!   with a declared size, are completed on demand
//! - A bare function type realizes to [`Realized::Function`]; it is only a
//!   value type behind a `POINTER`

pub mod layout;

use crate::config::FfiConfig;
use crate::context::{GlobalKind, TypeContext};
use crate::errors::RealizeError;
use crate::parser::opcodes::{
    Op, Opcode, Realized, Slot, FUNCTION_END_ELLIPSIS, FUNCTION_END_STDCALL,
};
use crate::types::descr::{Abi, EnumInfo, StructState};
use crate::types::primitives::PrimitiveType;
use crate::types::{LocalTypes, TypeId, TypeUniverse};

pub use layout::{FieldSpec, LayoutOptions};

/// Which opcode array a slot index refers to
#[derive(Debug, Clone, Copy)]
pub enum OpcodeArray<'s> {
    /// The context's persistent array, memoized in place
    Context,
    /// Output of a one-off parse
    Transient(&'s [Slot]),
}

/// Builds descriptors for one context against a locked universe
pub struct Realizer<'a> {
    ctx: &'a mut TypeContext,
    universe: &'a mut TypeUniverse,
    local: &'a mut LocalTypes,
    max_depth: usize,
    depth: usize,
    /// Number of struct layouts in progress
    completing: usize,
}

impl<'a> Realizer<'a> {
    pub fn new(
        ctx: &'a mut TypeContext,
        universe: &'a mut TypeUniverse,
        local: &'a mut LocalTypes,
        config: &FfiConfig,
    ) -> Self {
        Realizer {
            ctx,
            universe,
            local,
            max_depth: config.max_realize_depth,
            depth: 0,
            completing: 0,
        }
    }

    /// Realize the slot at `index` of `array`
    pub fn realize(&mut self, array: OpcodeArray<'_>, index: usize) -> Result<Realized, RealizeError> {
        let op = match self.slot(array, index) {
            Slot::Realized(realized) => return self.finish(realized),
            Slot::Op(op) => op,
        };

        if self.depth >= self.max_depth {
            return Err(RealizeError::RecursionTooDeep);
        }
        self.depth += 1;
        let result = self.realize_op(array, index, op);
        self.depth -= 1;
        let realized = result?;

        if let OpcodeArray::Context = array {
            if let Some(Slot::Op(_)) = self.ctx.types.get(index) {
                self.ctx.types.set_realized(index, realized);
            }
        }
        self.finish(realized)
    }

    /// Outside any layout, a struct without a declared size leaves the
    /// realizer complete, even when an earlier layout left it pending
    fn finish(&mut self, realized: Realized) -> Result<Realized, RealizeError> {
        if self.completing == 0 {
            if let Realized::Type(id) = realized {
                let descr = self.universe.get(id);
                if descr.size.is_none() && matches!(descr.struct_state(), Some(StructState::Pending { .. })) {
                    self.force_complete(id)?;
                }
            }
        }
        Ok(realized)
    }

    /// Realize a slot that must be a value type
    pub fn realize_type(&mut self, array: OpcodeArray<'_>, index: usize) -> Result<TypeId, RealizeError> {
        match self.realize(array, index)? {
            Realized::Type(id) => Ok(id),
            Realized::Function(id) => Err(RealizeError::FunctionNotPointer(
                self.universe.function_type_name(id),
            )),
        }
    }

    /// Lay out `id` now if it is a struct or union still waiting for it
    pub fn ensure_complete(&mut self, id: TypeId) -> Result<(), RealizeError> {
        self.force_complete(id)
    }

    fn slot(&self, array: OpcodeArray<'_>, index: usize) -> Slot {
        match array {
            OpcodeArray::Context => match self.ctx.types.get(index) {
                Some(slot) => slot,
                None => panic!("type slot {} out of range", index),
            },
            OpcodeArray::Transient(slots) => slots[index],
        }
    }

    fn realize_op(&mut self, array: OpcodeArray<'_>, index: usize, op: Opcode) -> Result<Realized, RealizeError> {
        let bad_opcode = RealizeError::BadOpcode {
            code: op.code(),
            index,
        };
        let Some(kind) = op.op() else {
            return Err(bad_opcode);
        };

        match kind {
            Op::Primitive => {
                let prim = PrimitiveType::from_id(op.arg()).ok_or(bad_opcode)?;
                Ok(Realized::Type(self.universe.primitive(prim)))
            }

            Op::Pointer => match self.realize(array, op.arg())? {
                // a pointer to a function type is the function pointer itself
                Realized::Function(id) => Ok(Realized::Type(id)),
                Realized::Type(item) => Ok(Realized::Type(self.universe.pointer_to(self.local, item))),
            },

            Op::Array | Op::OpenArray => {
                let item = self.realize_type(array, op.arg())?;
                let length = if kind == Op::Array {
                    match self.slot(array, index + 1) {
                        Slot::Op(word) => Some(word.raw()),
                        Slot::Realized(_) => panic!("array length slot {} was realized", index + 1),
                    }
                } else {
                    None
                };
                self.ensure_sized(item)?;
                let pointer = self.universe.pointer_to(self.local, item);
                let id = self.universe.array_of(self.local, pointer, length)?;
                Ok(Realized::Type(id))
            }

            Op::StructUnion => self.realize_struct(op.arg()),

            Op::Enum => self.realize_enum(op.arg()),

            Op::Function => self.realize_function(array, index, op.arg()),

            Op::Typename => {
                let primary = self.ctx.typename(op.arg()).type_index;
                self.realize(OpcodeArray::Context, primary)
            }

            Op::Noop => self.realize(array, op.arg()),

            Op::FunctionEnd | Op::Bitfield => Err(bad_opcode),
        }
    }

    fn realize_struct(&mut self, index: usize) -> Result<Realized, RealizeError> {
        let entry = self.ctx.struct_union(index);
        let primary = entry.type_index;
        if let Some(Slot::Realized(realized)) = self.ctx.types.get(primary) {
            return Ok(realized);
        }

        let state = if entry.flags.opaque {
            StructState::Opaque
        } else {
            StructState::Pending { index }
        };
        let sized = entry.size.is_some();
        let id = self.universe.new_struct(
            self.local,
            &entry.name,
            entry.is_union,
            state,
            entry.size,
            entry.alignment,
        );
        self.ctx.types.set_realized(primary, Realized::Type(id));

        if !sized && self.completing == 0 {
            if let Err(err) = self.force_complete(id) {
                self.ctx.types.set(primary, Opcode::new(Op::StructUnion, index));
                return Err(err);
            }
        }
        Ok(Realized::Type(id))
    }

    fn realize_enum(&mut self, index: usize) -> Result<Realized, RealizeError> {
        let entry = self.ctx.enum_entry(index);
        let primary = entry.type_index;
        if let Some(Slot::Realized(realized)) = self.ctx.types.get(primary) {
            return Ok(realized);
        }

        let mut enumerators = Vec::new();
        for name in entry.enumerator_names() {
            let value = self
                .ctx
                .search_global(name)
                .and_then(|i| match self.ctx.global(i).kind {
                    GlobalKind::EnumConstant(value) | GlobalKind::IntConstant(value) => Some(value),
                    _ => None,
                })
                .ok_or_else(|| RealizeError::MissingEnumerator(name.to_string()))?;
            enumerators.push((name.to_string(), value));
        }

        let tag = entry.name.clone();
        let info = EnumInfo::new(entry.underlying, enumerators);
        let id = self.universe.new_enum(self.local, &tag, info);
        let realized = Realized::Type(id);
        self.ctx.types.set_realized(primary, realized);
        Ok(realized)
    }

    fn realize_function(
        &mut self,
        array: OpcodeArray<'_>,
        index: usize,
        result_slot: usize,
    ) -> Result<Realized, RealizeError> {
        let result = match self.realize(array, result_slot)? {
            Realized::Type(id) => id,
            Realized::Function(id) => {
                return Err(RealizeError::InvalidResult(self.universe.function_type_name(id)));
            }
        };

        let mut args = Vec::new();
        let mut next = index + 1;
        let flags = loop {
            match self.slot(array, next) {
                Slot::Op(op) if op.is(Op::FunctionEnd) => break op.arg(),
                _ => {
                    args.push(self.realize(array, next)?.as_fnptr());
                    next += 1;
                }
            }
        };

        let variadic = flags & FUNCTION_END_ELLIPSIS != 0;
        let abi = match flags & !FUNCTION_END_ELLIPSIS {
            0 => Abi::Default,
            FUNCTION_END_STDCALL => Abi::Stdcall,
            other => return Err(RealizeError::UnsupportedAbi(other)),
        };
        let id = self.universe.function_ptr(self.local, result, &args, variadic, abi)?;
        Ok(Realized::Function(id))
    }

    /// Complete a pending struct whose size or alignment is still unknown
    fn ensure_sized(&mut self, id: TypeId) -> Result<(), RealizeError> {
        let descr = self.universe.get(id);
        let unsized_ = descr.size.is_none() || descr.align_or_length.is_none();
        if unsized_ && matches!(descr.struct_state(), Some(StructState::Pending { .. })) {
            self.force_complete(id)?;
        }
        Ok(())
    }

    fn force_complete(&mut self, id: TypeId) -> Result<(), RealizeError> {
        let index = match self.universe.get(id).struct_state() {
            Some(StructState::Pending { index }) => *index,
            _ => return Ok(()),
        };

        self.set_state(id, StructState::Completing { index });
        self.completing += 1;
        let result = self.lay_out(id, index);
        self.completing -= 1;
        if result.is_err() {
            self.set_state(id, StructState::Pending { index });
        }
        result
    }

    fn lay_out(&mut self, id: TypeId, index: usize) -> Result<(), RealizeError> {
        let entry = self.ctx.struct_union(index);
        let options = LayoutOptions {
            total_size: entry.size,
            total_alignment: entry.alignment,
            packed: entry.flags.packed,
            check_fields: entry.flags.check_fields,
        };
        let fields = self.ctx.fields_of(index).to_vec();

        let mut specs = Vec::with_capacity(fields.len());
        for field in fields {
            let ty = self.realize_type(OpcodeArray::Context, field.type_op.arg())?;
            self.ensure_sized(ty)?;
            specs.push(FieldSpec {
                name: field.name,
                ty,
                bit_width: field.bit_width,
                offset: field.offset,
            });
        }
        self.universe.complete_struct(id, &specs, options)?;
        Ok(())
    }

    fn set_state(&mut self, id: TypeId, state: StructState) {
        if let Some(current) = self.universe.get_mut(id).struct_state_mut() {
            *current = state;
        }
    }
}
