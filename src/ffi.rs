//! Query façade over one type context
//!
//! An [`Ffi`] owns a [`TypeContext`], the table of types realized for it and
//! a handle to the (usually process-wide) [`TypeUniverse`].  Every call locks
//! the universe for its own duration.  Dropping the instance releases the
//! types that belong to its context.

use std::fmt::Write as _;
use std::mem;

use rustc_hash::FxHashMap;

use crate::config::FfiConfig;
use crate::context::{GlobalKind, TypeContext};
use crate::errors::{FfiError, FfiResult, RealizeError};
use crate::parser::opcodes::{OpcodeBuffer, Realized};
use crate::parser::parse;
use crate::realize::{OpcodeArray, Realizer};
use crate::types::descr::{FieldInfo, StructState, TypeDescr, TypeKind};
use crate::types::{LocalTypes, SharedUniverse, TypeId, TypeUniverse};

/// Names declared in a context, as reported by [`Ffi::list_types`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeListing {
    pub typedefs: Vec<String>,
    /// Struct tags, without anonymous (`$`) ones
    pub structs: Vec<String>,
    pub unions: Vec<String>,
}

/// One FFI instance: a context plus the types realized for it
pub struct Ffi {
    context: TypeContext,
    universe: SharedUniverse,
    local: LocalTypes,
    config: FfiConfig,
    /// Parsed text -> result, so a type string is parsed once
    parsed: FxHashMap<String, Realized>,
}

impl Ffi {
    /// Instance over `context`, sharing the process-wide universe
    pub fn new(context: TypeContext) -> Self {
        Self::with_universe(context, TypeUniverse::process_default(), FfiConfig::default())
    }

    pub fn with_universe(context: TypeContext, universe: SharedUniverse, config: FfiConfig) -> Self {
        Ffi {
            context,
            universe,
            local: LocalTypes::new(),
            config,
            parsed: FxHashMap::default(),
        }
    }

    pub fn context(&self) -> &TypeContext {
        &self.context
    }

    pub fn universe(&self) -> SharedUniverse {
        self.universe.clone()
    }

    pub fn config(&self) -> &FfiConfig {
        &self.config
    }

    /// Number of types realized for this instance so far
    pub fn realized_count(&self) -> usize {
        self.local.len()
    }

    // ===== Parsing =====

    /// Parse and realize a C type.  Function types are rejected; see
    /// [`Ffi::type_of`].
    pub fn parse_type(&mut self, text: &str) -> FfiResult<TypeId> {
        match self.realize_text(text)? {
            Realized::Type(id) => Ok(id),
            Realized::Function(id) => {
                let name = self.universe.lock().function_type_name(id);
                Err(RealizeError::FunctionNotPointer(name).into())
            }
        }
    }

    /// Like [`Ffi::parse_type`], but a function type gives its function
    /// pointer type
    pub fn type_of(&mut self, text: &str) -> FfiResult<TypeId> {
        Ok(self.realize_text(text)?.as_fnptr())
    }

    fn realize_text(&mut self, text: &str) -> FfiResult<Realized> {
        if let Some(&realized) = self.parsed.get(text) {
            return Ok(realized);
        }

        let mut out = OpcodeBuffer::new(self.config.opcode_capacity);
        let entry = parse(&self.context, text, &mut out)?;

        let mut universe = self.universe.lock();
        let realized = Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config)
            .realize(OpcodeArray::Transient(out.slots()), entry)?;
        drop(universe);

        self.parsed.insert(text.to_string(), realized);
        Ok(realized)
    }

    // ===== Descriptors =====

    /// Copy of the descriptor behind `ty`
    pub fn descr(&self, ty: TypeId) -> TypeDescr {
        self.universe.lock().get(ty).clone()
    }

    /// Canonical name of `ty`
    pub fn name(&self, ty: TypeId) -> String {
        self.universe.lock().get(ty).name.clone()
    }

    /// The name of `ty` with `replace_with` spliced in where a declarator
    /// goes: `getctype(int[3], "*p")` is `int(*p)[3]`.
    pub fn getctype(&self, ty: TypeId, replace_with: &str) -> String {
        let universe = self.universe.lock();
        let descr = universe.get(ty);
        let replace_with = replace_with.trim();
        let (_, tail) = descr.name_parts();

        let insert = if replace_with.starts_with('*') && tail.starts_with('[') {
            format!("({})", replace_with)
        } else if !replace_with.is_empty() && !replace_with.starts_with(['[', '(']) {
            format!(" {}", replace_with)
        } else {
            replace_with.to_string()
        };
        descr.display_with(&insert)
    }

    /// Size in bytes.  A declared size is reported without laying the
    /// struct out.
    pub fn sizeof(&mut self, ty: TypeId) -> FfiResult<usize> {
        let mut universe = self.universe.lock();
        if universe.get(ty).size.is_none() {
            Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config).ensure_complete(ty)?;
        }
        let descr = universe.get(ty);
        descr
            .size
            .ok_or_else(|| FfiError::UnknownSize(descr.name.clone()))
    }

    pub fn alignof(&mut self, ty: TypeId) -> FfiResult<usize> {
        let mut universe = self.universe.lock();
        if universe.alignment_of(ty).is_none() {
            Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config).ensure_complete(ty)?;
        }
        universe
            .alignment_of(ty)
            .ok_or_else(|| FfiError::UnknownSize(universe.get(ty).name.clone()))
    }

    /// Byte offset of a (possibly nested) field: `["pos", "x"]` for
    /// `s.pos.x`
    pub fn offsetof(&mut self, ty: TypeId, path: &[&str]) -> FfiResult<usize> {
        let mut universe = self.universe.lock();
        let mut current = ty;
        let mut offset = 0;
        for &name in path {
            Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config)
                .ensure_complete(current)?;
            let descr = universe.get(current);
            let field = lookup_field(descr, name)?;
            offset += field.offset;
            current = field.ty;
        }
        Ok(offset)
    }

    /// Fields of a struct or union, in declaration order
    pub fn fields(&mut self, ty: TypeId) -> FfiResult<Vec<FieldInfo>> {
        let mut universe = self.universe.lock();
        Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config).ensure_complete(ty)?;
        let descr = universe.get(ty);
        Ok(complete_layout(descr)?.fields.clone())
    }

    pub fn enumerator_value(&self, ty: TypeId, name: &str) -> FfiResult<i64> {
        let universe = self.universe.lock();
        let descr = universe.get(ty);
        let info = descr
            .enum_info()
            .ok_or_else(|| FfiError::NotAnEnum(descr.name.clone()))?;
        info.value_of(name).ok_or_else(|| FfiError::NoSuchEnumerator {
            ctype: descr.name.clone(),
            name: name.to_string(),
        })
    }

    /// Enumerator spelling of `value`; a value no enumerator has is spelled
    /// as the number
    pub fn enumerator_name(&self, ty: TypeId, value: i64) -> FfiResult<String> {
        let universe = self.universe.lock();
        let descr = universe.get(ty);
        let info = descr
            .enum_info()
            .ok_or_else(|| FfiError::NotAnEnum(descr.name.clone()))?;
        Ok(info
            .name_of(value)
            .map_or_else(|| value.to_string(), str::to_string))
    }

    // ===== Globals =====

    /// Type of a function, variable or constant.  Functions give their
    /// function pointer type.
    pub fn global_type(&mut self, name: &str) -> FfiResult<TypeId> {
        let index = self
            .context
            .search_global(name)
            .ok_or_else(|| FfiError::NoSuchGlobal(name.to_string()))?;
        let slot = self.context.global(index).type_index;

        let mut universe = self.universe.lock();
        let realized = Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config)
            .realize(OpcodeArray::Context, slot)?;
        Ok(realized.as_fnptr())
    }

    pub fn integer_const(&self, name: &str) -> FfiResult<i64> {
        let index = self
            .context
            .search_global(name)
            .ok_or_else(|| FfiError::NoSuchGlobal(name.to_string()))?;
        match self.context.global(index).kind {
            GlobalKind::IntConstant(value) | GlobalKind::EnumConstant(value) => Ok(value),
            GlobalKind::Function | GlobalKind::Variable => {
                Err(FfiError::NotAnIntConstant(name.to_string()))
            }
        }
    }

    /// Typedef names and struct/union tags declared in the context
    pub fn list_types(&self) -> TypeListing {
        let mut listing = TypeListing {
            typedefs: self
                .context
                .typenames()
                .iter()
                .map(|entry| entry.name.clone())
                .collect(),
            ..Default::default()
        };
        for entry in self.context.structs_unions() {
            if entry.name.starts_with('$') {
                continue;
            }
            if entry.is_union {
                listing.unions.push(entry.name.clone());
            } else {
                listing.structs.push(entry.name.clone());
            }
        }
        listing
    }

    /// Multi-line, human readable summary of a type: size, alignment and,
    /// for structs, unions and enums, their members
    pub fn describe(&mut self, ty: TypeId) -> FfiResult<String> {
        let mut universe = self.universe.lock();
        Realizer::new(&mut self.context, &mut universe, &mut self.local, &self.config).ensure_complete(ty)?;
        let descr = universe.get(ty);

        let mut out = descr.name.clone();
        match (descr.size, universe.alignment_of(ty)) {
            (Some(size), Some(align)) => {
                let _ = write!(out, " (size {}, align {})", size, align);
            }
            _ => out.push_str(" (incomplete)"),
        }

        match &descr.kind {
            TypeKind::Struct(StructState::Complete(layout)) | TypeKind::Union(StructState::Complete(layout)) => {
                for field in &layout.fields {
                    let field_type = universe.get(field.ty);
                    let _ = write!(
                        out,
                        "\n  {} @{}",
                        field_type.display_with(&format!(" {}", field.name)),
                        field.offset
                    );
                    if let Some(bits) = field.bitfield {
                        let _ = write!(out, " bits {}..{}", bits.shift, bits.shift + bits.width);
                    }
                }
                if layout.custom_field_pos {
                    out.push_str("\n  (custom layout)");
                }
            }
            TypeKind::Enum(info) => {
                for (name, value) in &info.enumerators {
                    let _ = write!(out, "\n  {} = {}", name, value);
                }
            }
            TypeKind::FunctionPtr(sig) if sig.variadic => out.push_str("\n  variadic"),
            _ => {}
        }
        Ok(out)
    }
}

impl Drop for Ffi {
    fn drop(&mut self) {
        let local = mem::take(&mut self.local);
        let realized = local.len();
        let freed = self.universe.lock().release(local);
        log::debug!(
            "released ffi instance: {} types realized, {} context-local types freed",
            realized,
            freed
        );
    }
}

fn complete_layout(descr: &TypeDescr) -> FfiResult<&crate::types::StructLayout> {
    if !descr.is_struct_or_union() {
        return Err(FfiError::NotAStruct(descr.name.clone()));
    }
    descr
        .layout()
        .ok_or_else(|| FfiError::UnknownSize(descr.name.clone()))
}

fn lookup_field<'d>(descr: &'d TypeDescr, name: &str) -> FfiResult<&'d FieldInfo> {
    complete_layout(descr)?
        .field(name)
        .ok_or_else(|| FfiError::NoSuchField {
            ctype: descr.name.clone(),
            field: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffi() -> Ffi {
        Ffi::with_universe(TypeContext::empty(), TypeUniverse::new_shared(), FfiConfig::default())
    }

    #[test]
    fn test_getctype_splicing() {
        let mut ffi = ffi();
        let int = ffi.parse_type("int").unwrap();
        let array = ffi.parse_type("int[3]").unwrap();
        let fnptr = ffi.parse_type("int(*)(long)").unwrap();

        assert_eq!(ffi.getctype(int, ""), "int");
        assert_eq!(ffi.getctype(int, "x"), "int x");
        assert_eq!(ffi.getctype(int, " *p "), "int *p");
        assert_eq!(ffi.getctype(array, "*p"), "int(*p)[3]");
        assert_eq!(ffi.getctype(array, "[2]"), "int[2][3]");
        assert_eq!(ffi.getctype(fnptr, "callback"), "int(* callback)(long)");
    }

    #[test]
    fn test_parse_cache() {
        let mut ffi = ffi();
        let first = ffi.parse_type("char * *").unwrap();
        let count = ffi.realized_count();
        assert_eq!(ffi.parse_type("char * *").unwrap(), first);
        assert_eq!(ffi.realized_count(), count);
    }

    #[test]
    fn test_errors_are_typed() {
        let mut ffi = ffi();
        let err = ffi.parse_type("int(int)").unwrap_err();
        assert!(matches!(
            err,
            FfiError::Realize(RealizeError::FunctionNotPointer(ref name)) if name == "int(int)"
        ));
        assert_eq!(ffi.type_of("int(int)").map(|id| ffi.name(id)), Ok("int(*)(int)".to_string()));

        let void = ffi.parse_type("void").unwrap();
        assert_eq!(ffi.sizeof(void), Err(FfiError::UnknownSize("void".to_string())));

        let int = ffi.parse_type("int").unwrap();
        assert_eq!(ffi.fields(int), Err(FfiError::NotAStruct("int".to_string())));
        assert_eq!(ffi.enumerator_value(int, "A"), Err(FfiError::NotAnEnum("int".to_string())));
        assert_eq!(ffi.global_type("printf"), Err(FfiError::NoSuchGlobal("printf".to_string())));

        let err = ffi.parse_type("int *)").unwrap_err();
        assert_eq!(err.location(), Some(5));
    }
}
