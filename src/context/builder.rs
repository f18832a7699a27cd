//! Building a [`TypeContext`] from declarations
//!
//! The builder collects declarations in any order.  [`ContextBuilder::build`]
//! sorts every table, rejects duplicate names, reserves the primary slot of
//! each struct, union and enum in the persistent array, and then parses every
//! type text (field types, typedefs, globals) straight into that array.
//! Because all names are known before the first parse, declarations may
//! refer to each other freely, including forward and self references.

use crate::config::FfiConfig;
use crate::context::{
    check_sorted, EnumEntry, FieldEntry, GlobalEntry, GlobalKind, StructFlags, StructUnionEntry,
    TypeContext, TypenameEntry,
};
use crate::errors::{ContextError, Table};
use crate::parser::opcodes::{Op, Opcode, OpcodeBuffer, Slot};
use crate::parser::parse::{parse, ParseError, ParseErrorKind};
use crate::types::primitives::PrimitiveType;

/// One field of a struct or union declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub ctype: String,
    pub bit_width: Option<u32>,
    pub offset: Option<usize>,
}

impl FieldDecl {
    pub fn new(name: &str, ctype: &str) -> Self {
        FieldDecl {
            name: name.to_string(),
            ctype: ctype.to_string(),
            bit_width: None,
            offset: None,
        }
    }

    /// Make this a bit-field of `width` bits
    pub fn bits(mut self, width: u32) -> Self {
        self.bit_width = Some(width);
        self
    }

    /// Force the byte offset instead of computing it
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A struct or union declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<FieldDecl>,
    pub size: Option<usize>,
    pub alignment: Option<usize>,
    pub flags: StructFlags,
}

impl StructDecl {
    pub fn new(name: &str) -> Self {
        StructDecl {
            name: name.to_string(),
            is_union: false,
            fields: Vec::new(),
            size: None,
            alignment: None,
            flags: StructFlags::default(),
        }
    }

    pub fn union(name: &str) -> Self {
        StructDecl {
            is_union: true,
            ..StructDecl::new(name)
        }
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDecl>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Size and alignment as reported by a compiler
    pub fn with_layout(mut self, size: usize, alignment: usize) -> Self {
        self.size = Some(size);
        self.alignment = Some(alignment);
        self
    }

    pub fn packed(mut self) -> Self {
        self.flags.packed = true;
        self
    }

    /// Treat a disagreement between explicit and computed layout as an error
    pub fn check_fields(mut self) -> Self {
        self.flags.check_fields = true;
        self
    }
}

#[derive(Debug, Clone)]
struct EnumDecl {
    name: String,
    underlying: PrimitiveType,
    enumerators: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
enum TypeSource {
    Text(String),
    /// Primary slot of a struct/union tag
    Tag(String),
    /// Primary slot of an enum tag
    EnumTag(String),
}

#[derive(Debug, Clone)]
struct NamedType {
    name: String,
    source: TypeSource,
}

#[derive(Debug, Clone)]
struct GlobalDecl {
    decl: NamedType,
    kind: GlobalKind,
}

/// Collects C declarations and builds a validated [`TypeContext`]
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: FfiConfig,
    structs: Vec<StructDecl>,
    enums: Vec<EnumDecl>,
    typedefs: Vec<NamedType>,
    globals: Vec<GlobalDecl>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits used while parsing the declarations
    pub fn with_config(mut self, config: FfiConfig) -> Self {
        self.config = config;
        self
    }

    /// `struct name { fields };`
    pub fn declare_struct(&mut self, name: &str, fields: Vec<FieldDecl>) -> &mut Self {
        self.declare(StructDecl::new(name).fields(fields))
    }

    /// `union name { fields };`
    pub fn declare_union(&mut self, name: &str, fields: Vec<FieldDecl>) -> &mut Self {
        self.declare(StructDecl::union(name).fields(fields))
    }

    /// A struct or union with explicit layout options
    pub fn declare(&mut self, decl: StructDecl) -> &mut Self {
        self.structs.push(decl);
        self
    }

    /// `struct name;`
    pub fn declare_opaque_struct(&mut self, name: &str) -> &mut Self {
        self.declare_opaque(name, false)
    }

    /// `union name;`
    pub fn declare_opaque_union(&mut self, name: &str) -> &mut Self {
        self.declare_opaque(name, true)
    }

    fn declare_opaque(&mut self, name: &str, is_union: bool) -> &mut Self {
        let mut decl = if is_union {
            StructDecl::union(name)
        } else {
            StructDecl::new(name)
        };
        decl.flags.opaque = true;
        self.declare(decl)
    }

    /// `typedef struct { ... } name;`.  The anonymous struct gets the tag
    /// `$name` and displays as `name`.
    pub fn declare_typedef_struct(&mut self, name: &str, mut decl: StructDecl) -> &mut Self {
        let tag = format!("${}", name);
        decl.name = tag.clone();
        self.structs.push(decl);
        self.typedefs.push(NamedType {
            name: name.to_string(),
            source: TypeSource::Tag(tag),
        });
        self
    }

    /// `enum name { A = 0, B = 1 };`.  The enumerators also become integer
    /// constants of the context.
    pub fn declare_enum(
        &mut self,
        name: &str,
        underlying: PrimitiveType,
        enumerators: &[(&str, i64)],
    ) -> &mut Self {
        for &(enumerator, value) in enumerators {
            self.globals.push(GlobalDecl {
                decl: NamedType {
                    name: enumerator.to_string(),
                    source: TypeSource::EnumTag(name.to_string()),
                },
                kind: GlobalKind::EnumConstant(value),
            });
        }
        self.enums.push(EnumDecl {
            name: name.to_string(),
            underlying,
            enumerators: enumerators
                .iter()
                .map(|&(enumerator, value)| (enumerator.to_string(), value))
                .collect(),
        });
        self
    }

    /// `typedef enum { ... } name;`
    pub fn declare_typedef_enum(
        &mut self,
        name: &str,
        underlying: PrimitiveType,
        enumerators: &[(&str, i64)],
    ) -> &mut Self {
        let tag = format!("${}", name);
        self.declare_enum(&tag, underlying, enumerators);
        self.typedefs.push(NamedType {
            name: name.to_string(),
            source: TypeSource::EnumTag(tag),
        });
        self
    }

    /// `typedef ctype name;`, with `ctype` spelled without the name
    pub fn declare_typedef(&mut self, name: &str, ctype: &str) -> &mut Self {
        self.typedefs.push(NamedType {
            name: name.to_string(),
            source: TypeSource::Text(ctype.to_string()),
        });
        self
    }

    /// A function of type `ctype`, e.g. `int(const char *, ...)`
    pub fn declare_function(&mut self, name: &str, ctype: &str) -> &mut Self {
        self.declare_global(name, ctype, GlobalKind::Function)
    }

    pub fn declare_variable(&mut self, name: &str, ctype: &str) -> &mut Self {
        self.declare_global(name, ctype, GlobalKind::Variable)
    }

    /// `#define NAME value`, typed `int` when it fits and `long long` otherwise
    pub fn declare_int_constant(&mut self, name: &str, value: i64) -> &mut Self {
        let ctype = if i32::try_from(value).is_ok() {
            "int"
        } else {
            "long long"
        };
        self.declare_global(name, ctype, GlobalKind::IntConstant(value))
    }

    fn declare_global(&mut self, name: &str, ctype: &str, kind: GlobalKind) -> &mut Self {
        self.globals.push(GlobalDecl {
            decl: NamedType {
                name: name.to_string(),
                source: TypeSource::Text(ctype.to_string()),
            },
            kind,
        });
        self
    }

    /// Sort, check and parse everything into a context
    pub fn build(&self) -> Result<TypeContext, ContextError> {
        let mut structs: Vec<&StructDecl> = self.structs.iter().collect();
        let mut enums: Vec<&EnumDecl> = self.enums.iter().collect();
        let mut typedefs: Vec<&NamedType> = self.typedefs.iter().collect();
        let mut globals: Vec<&GlobalDecl> = self.globals.iter().collect();
        structs.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        enums.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        typedefs.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        globals.sort_by(|a, b| a.decl.name.as_bytes().cmp(b.decl.name.as_bytes()));

        let mut ctx = TypeContext::empty();

        // Primary slots come first: struct i at slot i, enum j after them
        let mut primaries = Vec::with_capacity(structs.len() + enums.len());
        primaries.extend((0..structs.len()).map(|i| Slot::Op(Opcode::new(Op::StructUnion, i))));
        primaries.extend((0..enums.len()).map(|j| Slot::Op(Opcode::new(Op::Enum, j))));
        ctx.types = OpcodeBuffer::from_slots(primaries, 0);

        ctx.structs_unions = structs
            .iter()
            .enumerate()
            .map(|(i, decl)| StructUnionEntry {
                name: decl.name.clone(),
                type_index: i,
                is_union: decl.is_union,
                flags: decl.flags,
                size: decl.size,
                alignment: decl.alignment,
                first_field: 0,
                num_fields: 0,
            })
            .collect();
        ctx.enums = enums
            .iter()
            .enumerate()
            .map(|(j, decl)| EnumEntry {
                name: decl.name.clone(),
                type_index: structs.len() + j,
                underlying: decl.underlying,
                enumerators: decl
                    .enumerators
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            })
            .collect();
        ctx.typenames = typedefs
            .iter()
            .map(|decl| TypenameEntry {
                name: decl.name.clone(),
                type_index: 0,
            })
            .collect();
        ctx.globals = globals
            .iter()
            .map(|global| GlobalEntry {
                name: global.decl.name.clone(),
                type_index: 0,
                kind: global.kind,
            })
            .collect();

        // Duplicates must go before the first lookup
        check_sorted(&ctx.structs_unions, Table::StructsUnions)?;
        check_sorted(&ctx.enums, Table::Enums)?;
        check_sorted(&ctx.typenames, Table::Typenames)?;
        check_sorted(&ctx.globals, Table::Globals)?;

        for (i, decl) in structs.iter().enumerate() {
            let first_field = ctx.fields.len();
            for field in &decl.fields {
                let label = format!("{}.{}", decl.name, field.name);
                let slot = self.parse_into(&mut ctx, &field.ctype, &label)?;
                let op = if field.bit_width.is_some() {
                    Op::Bitfield
                } else {
                    Op::Noop
                };
                ctx.fields.push(FieldEntry {
                    name: field.name.clone(),
                    type_op: Opcode::new(op, slot),
                    offset: field.offset,
                    bit_width: field.bit_width,
                });
            }
            ctx.structs_unions[i].first_field = first_field;
            ctx.structs_unions[i].num_fields = decl.fields.len();
        }

        for (i, decl) in typedefs.iter().enumerate() {
            ctx.typenames[i].type_index = self.resolve(&mut ctx, decl)?;
        }
        for (i, global) in globals.iter().enumerate() {
            ctx.globals[i].type_index = self.resolve(&mut ctx, &global.decl)?;
        }

        ctx.validate()?;
        log::debug!(
            "built type context: {} structs/unions, {} fields, {} enums, {} typenames, {} globals, {} type slots",
            ctx.structs_unions.len(),
            ctx.fields.len(),
            ctx.enums.len(),
            ctx.typenames.len(),
            ctx.globals.len(),
            ctx.types.len()
        );
        Ok(ctx)
    }

    fn resolve(&self, ctx: &mut TypeContext, decl: &NamedType) -> Result<usize, ContextError> {
        match &decl.source {
            TypeSource::Text(text) => self.parse_into(ctx, text, &decl.name),
            TypeSource::Tag(tag) => {
                let index = ctx
                    .search_struct_union(tag)
                    .ok_or_else(|| missing_tag(&decl.name, "undefined struct/union name"))?;
                Ok(ctx.structs_unions[index].type_index)
            }
            TypeSource::EnumTag(tag) => {
                let index = ctx
                    .search_enum(tag)
                    .ok_or_else(|| missing_tag(&decl.name, "undefined enum name"))?;
                Ok(ctx.enums[index].type_index)
            }
        }
    }

    /// Parse `text` onto the end of the persistent array
    fn parse_into(&self, ctx: &mut TypeContext, text: &str, label: &str) -> Result<usize, ContextError> {
        let mut types = std::mem::replace(&mut ctx.types, OpcodeBuffer::new(0));
        types.reserve_budget(self.config.opcode_capacity);
        let result = parse(ctx, text, &mut types);
        types.reserve_budget(0);
        ctx.types = types;
        result.map_err(|source| ContextError::Declaration {
            name: label.to_string(),
            source,
        })
    }
}

fn missing_tag(name: &str, message: &'static str) -> ContextError {
    ContextError::Declaration {
        name: name.to_string(),
        source: ParseError::new(0, message, ParseErrorKind::Resolution),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sorts_tables() {
        let mut builder = ContextBuilder::new();
        builder
            .declare_struct("zeta", vec![FieldDecl::new("x", "int")])
            .declare_struct("alpha", vec![FieldDecl::new("z", "struct zeta *")])
            .declare_typedef("b_t", "int")
            .declare_typedef("a_t", "b_t *");
        let ctx = builder.build().unwrap();

        assert_eq!(ctx.structs_unions()[0].name, "alpha");
        assert_eq!(ctx.structs_unions()[1].name, "zeta");
        assert_eq!(ctx.typenames()[0].name, "a_t");
        assert_eq!(ctx.fields_of(0)[0].name, "z");
        assert_eq!(ctx.fields_of(1)[0].name, "x");

        // primary slots hold their own tag opcodes
        let zeta = ctx.search_struct_union("zeta").unwrap();
        let primary = ctx.struct_union(zeta).type_index;
        assert_eq!(
            ctx.types().get(primary),
            Some(Slot::Op(Opcode::new(Op::StructUnion, zeta)))
        );
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut builder = ContextBuilder::new();
        builder.declare_opaque_struct("s").declare_struct("s", vec![]);
        assert_eq!(
            builder.build().unwrap_err(),
            ContextError::DuplicateName {
                table: Table::StructsUnions,
                name: "s".to_string()
            }
        );

        let mut builder = ContextBuilder::new();
        builder
            .declare_enum("e", PrimitiveType::Int, &[("A", 0)])
            .declare_int_constant("A", 1);
        assert!(matches!(
            builder.build(),
            Err(ContextError::DuplicateName {
                table: Table::Globals,
                ..
            })
        ));
    }

    #[test]
    fn test_bad_declaration_names_the_culprit() {
        let mut builder = ContextBuilder::new();
        builder.declare_struct("point", vec![FieldDecl::new("x", "struct nowhere *")]);
        match builder.build().unwrap_err() {
            ContextError::Declaration { name, source } => {
                assert_eq!(name, "point.x");
                assert_eq!(source.location, 7);
                assert_eq!(source.kind, ParseErrorKind::Resolution);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_enum_constants_are_globals() {
        let mut builder = ContextBuilder::new();
        builder.declare_enum("color", PrimitiveType::UInt, &[("RED", 0), ("GREEN", 1)]);
        let ctx = builder.build().unwrap();

        let index = ctx.search_global("GREEN").unwrap();
        assert_eq!(ctx.global(index).kind, GlobalKind::EnumConstant(1));
        let color = ctx.search_enum("color").unwrap();
        assert_eq!(ctx.global(index).type_index, ctx.enum_entry(color).type_index);
        assert_eq!(ctx.enum_entry(color).enumerators, "RED,GREEN");
    }

    #[test]
    fn test_typedef_struct_uses_dollar_tag() {
        let mut builder = ContextBuilder::new();
        builder.declare_typedef_struct("point_t", StructDecl::new("").field(FieldDecl::new("x", "int")));
        let ctx = builder.build().unwrap();

        let tag = ctx.search_struct_union("$point_t").unwrap();
        let typedef = ctx.search_typename("point_t").unwrap();
        assert_eq!(ctx.typename(typedef).type_index, ctx.struct_union(tag).type_index);
    }

    #[test]
    fn test_constants_size_arrays() {
        let mut builder = ContextBuilder::new();
        builder
            .declare_int_constant("LEN", 16)
            .declare_int_constant("BIG", 1 << 40)
            .declare_variable("buffer", "char[LEN]");
        let ctx = builder.build().unwrap();

        let big = ctx.search_global("BIG").unwrap();
        let slot = ctx.types().get(ctx.global(big).type_index).unwrap();
        assert_eq!(
            slot,
            Slot::Op(Opcode::new(Op::Primitive, PrimitiveType::LongLong.id()))
        );

        let buffer = ctx.search_global("buffer").unwrap();
        let entry = ctx.global(buffer).type_index;
        assert_eq!(ctx.types().get(entry + 1), Some(Slot::Op(Opcode::from_raw(16))));
    }

    #[test]
    fn test_capacity_applies_per_declaration() {
        let mut builder = ContextBuilder::new().with_config(FfiConfig::default().with_opcode_capacity(3));
        builder.declare_typedef("p3", "int ***");
        assert!(builder.build().is_err());

        let mut builder = ContextBuilder::new().with_config(FfiConfig::default().with_opcode_capacity(3));
        builder.declare_typedef("p2", "int **").declare_typedef("q2", "char **");
        assert!(builder.build().is_ok());
    }
}
