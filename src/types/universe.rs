//! Descriptor arena and interning tables
//!
//! A [`TypeUniverse`] owns every [`TypeDescr`] ever built, addressed by
//! generational [`TypeId`] handles.  Two name-keyed tables point into it:
//!
//! - the **global** table, owned by the universe, lists every type that
//!   refers to no struct, union or enum (`int *`, `char[10]`, ...).  These
//!   entries live as long as the universe and are shared by all contexts.
//! - a **local** table ([`LocalTypes`]), owned by one FFI instance, lists
//!   every type realized for its context.  Releasing it frees the entries
//!   that are local to that context and leaves the global ones alone.
//!
//! Types are identified by their canonical name: building a type whose name
//! is already listed returns the existing handle.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::constants::POINTER_SIZE;
use crate::errors::RealizeError;
use crate::types::descr::{Abi, EnumInfo, FunctionSig, StructState, TypeDescr, TypeKind};
use crate::types::primitives::PrimitiveType;
use crate::types::TypeId;

/// A universe shared between FFI instances
pub type SharedUniverse = Arc<Mutex<TypeUniverse>>;

/// Name -> handle map of the types realized for one context
#[derive(Debug, Default)]
pub struct LocalTypes {
    by_name: FxHashMap<String, TypeId>,
}

impl LocalTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names and handles, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.by_name.iter().map(|(name, &id)| (name.as_str(), id))
    }
}

#[derive(Debug)]
struct ArenaEntry {
    generation: u32,
    descr: Option<TypeDescr>,
}

/// Owner of all type descriptors
#[derive(Debug, Default)]
pub struct TypeUniverse {
    entries: Vec<ArenaEntry>,
    free: Vec<u32>,
    global: FxHashMap<String, TypeId>,
    primitives: [Option<TypeId>; PrimitiveType::COUNT],
}

impl TypeUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh universe for sharing between instances
    pub fn new_shared() -> SharedUniverse {
        Arc::new(Mutex::new(Self::new()))
    }

    /// The process-wide universe used by [`Ffi::new`](crate::ffi::Ffi::new)
    pub fn process_default() -> SharedUniverse {
        static DEFAULT: OnceLock<SharedUniverse> = OnceLock::new();
        DEFAULT.get_or_init(TypeUniverse::new_shared).clone()
    }

    /// Descriptor behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was released with its context.
    pub fn get(&self, id: TypeId) -> &TypeDescr {
        match self.try_get(id) {
            Some(descr) => descr,
            None => panic!("stale type handle {:?}", id),
        }
    }

    pub fn try_get(&self, id: TypeId) -> Option<&TypeDescr> {
        self.entries
            .get(id.index())
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.descr.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: TypeId) -> &mut TypeDescr {
        match self
            .entries
            .get_mut(id.index())
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.descr.as_mut())
        {
            Some(descr) => descr,
            None => panic!("stale type handle {:?}", id),
        }
    }

    /// Number of live descriptors
    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    pub fn lookup_global(&self, name: &str) -> Option<TypeId> {
        self.global.get(name).copied()
    }

    fn alloc(&mut self, descr: TypeDescr) -> TypeId {
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.descr = Some(descr);
                TypeId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(ArenaEntry {
                    generation: 0,
                    descr: Some(descr),
                });
                TypeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Return the listed type with this descriptor's name, or list it
    fn intern(&mut self, local: &mut LocalTypes, descr: TypeDescr) -> TypeId {
        if let Some(id) = local.get(&descr.name) {
            return id;
        }
        if !descr.local {
            if let Some(&id) = self.global.get(&descr.name) {
                local.by_name.insert(descr.name, id);
                return id;
            }
        }

        let name = descr.name.clone();
        let is_local = descr.local;
        let id = self.alloc(descr);
        log::trace!("interned '{}' as {:?} (local: {})", name, id, is_local);
        if !is_local {
            self.global.insert(name.clone(), id);
        }
        local.by_name.insert(name, id);
        id
    }

    /// Cached singleton for a primitive
    pub fn primitive(&mut self, prim: PrimitiveType) -> TypeId {
        if let Some(id) = self.primitives[prim.id()] {
            return id;
        }

        let name = prim.c_name().to_string();
        let kind = match prim {
            PrimitiveType::Void => TypeKind::Void,
            other => TypeKind::Primitive(other),
        };
        let descr = TypeDescr {
            kind,
            size: prim.size(),
            align_or_length: prim.size().map(|_| prim.alignment()),
            item: None,
            name_position: name.len(),
            name,
            local: false,
        };
        let id = match self.global.get(&descr.name) {
            Some(&id) => id,
            None => {
                let name = descr.name.clone();
                let id = self.alloc(descr);
                self.global.insert(name, id);
                id
            }
        };
        self.primitives[prim.id()] = Some(id);
        id
    }

    /// `item *`; an array item gives `item(*)[N]`
    pub fn pointer_to(&mut self, local: &mut LocalTypes, item: TypeId) -> TypeId {
        let base = self.get(item);
        let insert = if base.is_array() { "(*)" } else { " *" };
        let name = base.display_with(insert);
        let name_position = base.name_position + 2;
        if let Some(id) = self.lookup(local, &name) {
            return id;
        }

        let descr = TypeDescr {
            kind: TypeKind::Pointer,
            size: Some(POINTER_SIZE),
            align_or_length: Some(POINTER_SIZE),
            item: Some(item),
            name,
            name_position,
            local: base.local,
        };
        self.intern(local, descr)
    }

    /// Array over the item of `pointer`, which must be the pointer-to-item
    /// type the array decays to.  `None` builds an open array (`item[]`).
    pub fn array_of(
        &mut self,
        local: &mut LocalTypes,
        pointer: TypeId,
        length: Option<usize>,
    ) -> Result<TypeId, RealizeError> {
        let item = match self.get(pointer).item {
            Some(item) => item,
            None => panic!("array_of expects a pointer type, got '{}'", self.get(pointer).name),
        };
        let base = self.get(item);
        let item_size = base
            .size
            .ok_or_else(|| RealizeError::UnknownItemSize(base.name.clone()))?;

        let size = match length {
            Some(length) => {
                let total = length
                    .checked_mul(item_size)
                    .filter(|&total| total <= isize::MAX as usize)
                    .ok_or(RealizeError::ArrayTooLarge)?;
                Some(total)
            }
            None => None,
        };
        let insert = match length {
            Some(length) => format!("[{}]", length),
            None => "[]".to_string(),
        };
        let name = base.display_with(&insert);
        let name_position = base.name_position;
        if let Some(id) = self.lookup(local, &name) {
            return Ok(id);
        }

        let descr = TypeDescr {
            kind: TypeKind::Array { decayed: pointer },
            size,
            align_or_length: length,
            item: Some(item),
            name,
            name_position,
            local: base.local,
        };
        Ok(self.intern(local, descr))
    }

    /// Function-pointer type.  Array arguments decay to their pointer type;
    /// `void` arguments and array results are rejected.
    pub fn function_ptr(
        &mut self,
        local: &mut LocalTypes,
        result: TypeId,
        args: &[TypeId],
        variadic: bool,
        abi: Abi,
    ) -> Result<TypeId, RealizeError> {
        let result_descr = self.get(result);
        if result_descr.is_array() {
            return Err(RealizeError::InvalidResult(result_descr.name.clone()));
        }

        let mut decayed = Vec::with_capacity(args.len());
        for (index, &arg) in args.iter().enumerate() {
            let descr = self.get(arg);
            match &descr.kind {
                TypeKind::Void => {
                    return Err(RealizeError::InvalidArgument {
                        index,
                        ctype: descr.name.clone(),
                    });
                }
                TypeKind::Array { decayed: pointer } => decayed.push(*pointer),
                _ => decayed.push(arg),
            }
        }

        let arg_names: Vec<&str> = decayed.iter().map(|&a| self.get(a).name.as_str()).collect();
        let mut params = arg_names.join(", ");
        if variadic {
            if !params.is_empty() {
                params.push_str(", ");
            }
            params.push_str("...");
        }

        let (head, tail) = result_descr.name_parts();
        let marker = match abi {
            Abi::Default => "(*)",
            Abi::Stdcall => "(__stdcall *)",
        };
        let mut name = String::with_capacity(head.len() + marker.len() + params.len() + tail.len() + 2);
        name.push_str(head);
        name.push_str(marker);
        let name_position = name.len() - 1;
        name.push('(');
        name.push_str(&params);
        name.push(')');
        name.push_str(tail);

        if let Some(id) = self.lookup(local, &name) {
            return Ok(id);
        }

        let is_local = result_descr.local || decayed.iter().any(|&a| self.get(a).local);
        let descr = TypeDescr {
            kind: TypeKind::FunctionPtr(FunctionSig {
                abi,
                result,
                args: decayed,
                variadic,
            }),
            size: Some(POINTER_SIZE),
            align_or_length: Some(POINTER_SIZE),
            item: None,
            name,
            name_position,
            local: is_local,
        };
        Ok(self.intern(local, descr))
    }

    /// Spelling of a function-pointer type as a bare function type:
    /// `int(*)(int)` reads `int(int)`
    pub fn function_type_name(&self, id: TypeId) -> String {
        let descr = self.get(id);
        let (head, tail) = descr.name_parts();
        let head = head
            .strip_suffix("(*")
            .or_else(|| head.strip_suffix("(__stdcall *"))
            .unwrap_or(head);
        let tail = tail.strip_prefix(')').unwrap_or(tail);
        format!("{}{}", head, tail)
    }

    /// Struct or union descriptor for a context tag.  A tag already listed in
    /// `local` (left behind by a failed completion) is returned as is.
    pub fn new_struct(
        &mut self,
        local: &mut LocalTypes,
        tag: &str,
        is_union: bool,
        state: StructState,
        size: Option<usize>,
        alignment: Option<usize>,
    ) -> TypeId {
        let keyword = if is_union { "union" } else { "struct" };
        let name = tag_display_name(keyword, tag);
        if let Some(id) = local.get(&name) {
            return id;
        }

        let kind = if is_union {
            TypeKind::Union(state)
        } else {
            TypeKind::Struct(state)
        };
        let descr = TypeDescr {
            kind,
            size,
            align_or_length: alignment,
            item: None,
            name_position: name.len(),
            name,
            local: true,
        };
        self.intern(local, descr)
    }

    pub fn new_enum(&mut self, local: &mut LocalTypes, tag: &str, info: EnumInfo) -> TypeId {
        let name = tag_display_name("enum", tag);
        if let Some(id) = local.get(&name) {
            return id;
        }

        let underlying = info.underlying;
        let descr = TypeDescr {
            kind: TypeKind::Enum(info),
            size: underlying.size(),
            align_or_length: Some(underlying.alignment()),
            item: None,
            name_position: name.len(),
            name,
            local: true,
        };
        self.intern(local, descr)
    }

    /// Alignment of a type; arrays align like their items
    pub fn alignment_of(&self, id: TypeId) -> Option<usize> {
        let descr = self.get(id);
        match (&descr.kind, descr.item) {
            (TypeKind::Array { .. }, Some(item)) => self.alignment_of(item),
            _ => descr.align_or_length,
        }
    }

    /// Free every context-local type listed in `local`.  Global types stay.
    pub fn release(&mut self, local: LocalTypes) -> usize {
        let mut freed = 0;
        for (_, id) in local.by_name {
            let entry = &mut self.entries[id.index()];
            let owned = entry.generation == id.generation
                && entry.descr.as_ref().is_some_and(|descr| descr.local);
            if owned {
                entry.descr = None;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(id.index);
                freed += 1;
            }
        }
        freed
    }

    fn lookup(&self, local: &mut LocalTypes, name: &str) -> Option<TypeId> {
        if let Some(id) = local.get(name) {
            return Some(id);
        }
        let id = self.lookup_global(name)?;
        local.by_name.insert(name.to_string(), id);
        Some(id)
    }
}

/// `struct foo`, or just `foo` for the tag `$foo` of an anonymous aggregate
/// named by a typedef.  Numbered anonymous tags (`$1`) keep the keyword.
pub(crate) fn tag_display_name(keyword: &str, tag: &str) -> String {
    match tag.strip_prefix('$') {
        Some(rest) if !rest.starts_with(|ch: char| ch.is_ascii_digit()) => rest.to_string(),
        _ => format!("{} {}", keyword, tag),
    }
}
