// Integration tests for parsing, realization and the Ffi façade

use cffi_types::context::GlobalKind;
use cffi_types::errors::ParseErrorKind;
use cffi_types::{
    ContextBuilder, Ffi, FfiConfig, FfiError, FieldDecl, PrimitiveType, RealizeError, StructDecl,
    TypeContext, TypeUniverse,
};

fn fresh(ctx: TypeContext) -> Ffi {
    Ffi::with_universe(ctx, TypeUniverse::new_shared(), FfiConfig::default())
}

fn sample_context() -> TypeContext {
    let mut builder = ContextBuilder::new();
    builder
        .declare_struct(
            "node",
            vec![FieldDecl::new("value", "int"), FieldDecl::new("next", "struct node *")],
        )
        .declare_struct(
            "rect",
            vec![FieldDecl::new("origin", "point_t"), FieldDecl::new("size", "point_t")],
        )
        .declare_typedef_struct(
            "point_t",
            StructDecl::new("").fields([FieldDecl::new("x", "int"), FieldDecl::new("y", "int")]),
        )
        .declare_union("value", vec![FieldDecl::new("i", "long"), FieldDecl::new("f", "float")])
        .declare_opaque_struct("FILE_impl")
        .declare_typedef("FILE", "struct FILE_impl")
        .declare_enum(
            "color",
            PrimitiveType::UInt,
            &[("RED", 0), ("GREEN", 1), ("BLUE", 2)],
        )
        .declare_int_constant("NAME_MAX", 255)
        .declare_typedef("name_t", "char[NAME_MAX]")
        .declare_function("fopen", "FILE *(const char *, const char *)")
        .declare_function("printf", "int(const char *, ...)")
        .declare_variable("errno_value", "int");
    builder.build().expect("context builds")
}

#[test]
fn test_round_trip_naming() {
    let mut ffi = fresh(sample_context());
    let names = [
        "int",
        "unsigned long long",
        "char *",
        "int * *",
        "int[10]",
        "int[2][3]",
        "int(*)[5]",
        "int *[5]",
        "int(*)(int)",
        "char *(*)(int, ...)",
        "int(* *)(long)",
        "void(*)()",
        "struct node *",
        "point_t[4]",
        "enum color",
        "union value",
        "FILE *",
    ];
    for text in names {
        let id = ffi.parse_type(text).unwrap();
        let name = ffi.name(id);
        let expected = if text == "FILE *" { "struct FILE_impl *" } else { text };
        assert_eq!(name, expected);
        assert_eq!(ffi.parse_type(&name).unwrap(), id, "reparsing {}", name);
    }
}

#[test]
fn test_interning_within_a_context() {
    let mut ffi = fresh(sample_context());
    let a = ffi.parse_type("unsigned int *").unwrap();
    let b = ffi.parse_type("unsigned *").unwrap();
    let c = ffi.parse_type("const unsigned int * volatile").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);

    let node = ffi.parse_type("struct node").unwrap();
    assert_eq!(ffi.parse_type("struct node").unwrap(), node);
}

#[test]
fn test_interning_across_contexts() {
    let universe = TypeUniverse::new_shared();
    let mut first = Ffi::with_universe(sample_context(), universe.clone(), FfiConfig::default());
    let mut second = Ffi::with_universe(sample_context(), universe.clone(), FfiConfig::default());

    // no struct, union or enum involved: one shared descriptor
    assert_eq!(
        first.parse_type("char *(*)(int)").unwrap(),
        second.parse_type("char *(*)(int)").unwrap()
    );
    // each context has its own struct node
    assert_ne!(
        first.parse_type("struct node *").unwrap(),
        second.parse_type("struct node *").unwrap()
    );
}

#[test]
fn test_self_referential_struct() {
    let mut ffi = fresh(sample_context());
    let node = ffi.parse_type("struct node").unwrap();
    assert_eq!(ffi.sizeof(node).unwrap(), 16);
    assert_eq!(ffi.alignof(node).unwrap(), 8);

    let fields = ffi.fields(node).unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[1].name, "next");
    assert_eq!(ffi.descr(fields[1].ty).item, Some(node));
}

#[test]
fn test_parameter_decay() {
    let mut ffi = fresh(sample_context());
    let f = ffi.type_of("int(int[10])").unwrap();
    assert_eq!(ffi.name(f), "int(*)(int *)");
    assert_eq!(ffi.type_of("int(int *)").unwrap(), f);

    let g = ffi.type_of("void(int(long), char[])").unwrap();
    assert_eq!(ffi.name(g), "void(*)(int(*)(long), char *)");
}

#[test]
fn test_grouping_disambiguation() {
    let mut ffi = fresh(sample_context());
    let pointer_to_function = ffi.parse_type("int(*)(int)").unwrap();
    let function_returning_pointer = ffi.type_of("int *(int)").unwrap();
    assert_eq!(ffi.name(pointer_to_function), "int(*)(int)");
    assert_eq!(ffi.name(function_returning_pointer), "int *(*)(int)");
    assert_ne!(pointer_to_function, function_returning_pointer);

    // a named declarator: x is an array of pointers to functions
    let table = ffi.parse_type("int (*x[3])(void)").unwrap();
    assert_eq!(ffi.name(table), "int(*[3])()");
}

#[test]
fn test_empty_and_void_parameters() {
    let mut ffi = fresh(sample_context());
    let empty = ffi.type_of("int ()").unwrap();
    let void = ffi.type_of("int (void)").unwrap();
    let one = ffi.type_of("int (int)").unwrap();
    assert_eq!(empty, void);
    assert_ne!(empty, one);
    assert_eq!(ffi.descr(empty).signature().unwrap().args.len(), 0);
    assert_eq!(ffi.descr(one).signature().unwrap().args.len(), 1);
}

#[test]
fn test_error_locality() {
    let mut ffi = fresh(sample_context());
    let err = ffi.parse_type("struct Unknown *").unwrap_err();
    let FfiError::Parse(parse) = &err else {
        panic!("expected a parse error, got {:?}", err);
    };
    assert_eq!(parse.location, 7);
    assert_eq!(parse.kind, ParseErrorKind::Resolution);
    assert_eq!(parse.message, "undefined struct/union name");
    assert_eq!(err.location(), Some(7));

    // nothing was realized by the failed parse; the instance still works
    assert_eq!(ffi.realized_count(), 0);
    assert!(ffi.parse_type("struct node *").is_ok());

    let err = ffi.parse_type("int [").unwrap_err();
    assert!(matches!(err, FfiError::Parse(ref e) if e.kind == ParseErrorKind::Syntax));
}

#[test]
fn test_function_type_is_not_a_value_type() {
    let mut ffi = fresh(sample_context());
    let err = ffi.parse_type("int(int)").unwrap_err();
    assert_eq!(
        err.to_string(),
        "the type 'int(int)' is a function type, not a pointer-to-function type"
    );
    // a function returning an array
    let err = ffi.parse_type("int(int)[2]").unwrap_err();
    assert_eq!(
        err,
        FfiError::Realize(RealizeError::InvalidResult("int[2]".to_string()))
    );
}

#[test]
fn test_enum_round_trip() {
    let mut ffi = fresh(sample_context());
    let color = ffi.parse_type("enum color").unwrap();
    assert_eq!(ffi.enumerator_value(color, "GREEN").unwrap(), 1);
    assert_eq!(ffi.enumerator_name(color, 1).unwrap(), "GREEN");
    assert_eq!(ffi.enumerator_name(color, 9).unwrap(), "9");
    assert_eq!(ffi.sizeof(color).unwrap(), 4);
    assert!(matches!(
        ffi.enumerator_value(color, "PURPLE"),
        Err(FfiError::NoSuchEnumerator { .. })
    ));

    assert_eq!(ffi.integer_const("BLUE").unwrap(), 2);
    assert_eq!(ffi.global_type("BLUE").unwrap(), color);
}

#[test]
fn test_typedefs_and_constants() {
    let mut ffi = fresh(sample_context());
    let name = ffi.parse_type("name_t").unwrap();
    assert_eq!(ffi.name(name), "char[255]");
    assert_eq!(ffi.sizeof(name).unwrap(), 255);
    assert_eq!(ffi.integer_const("NAME_MAX").unwrap(), 255);
    assert!(matches!(
        ffi.integer_const("printf"),
        Err(FfiError::NotAnIntConstant(_))
    ));

    let rows = ffi.parse_type("int[NAME_MAX]").unwrap();
    assert_eq!(ffi.sizeof(rows).unwrap(), 255 * 4);

    let point = ffi.parse_type("point_t").unwrap();
    assert_eq!(ffi.name(point), "point_t");
    assert_eq!(ffi.sizeof(point).unwrap(), 8);
}

#[test]
fn test_globals() {
    let mut ffi = fresh(sample_context());
    let fopen = ffi.global_type("fopen").unwrap();
    assert_eq!(
        ffi.name(fopen),
        "struct FILE_impl *(*)(char *, char *)"
    );
    let printf = ffi.global_type("printf").unwrap();
    assert!(ffi.descr(printf).signature().unwrap().variadic);

    let errno_value = ffi.global_type("errno_value").unwrap();
    assert_eq!(ffi.name(errno_value), "int");

    let index = ffi.context().search_global("fopen").unwrap();
    assert_eq!(ffi.context().global(index).kind, GlobalKind::Function);
}

#[test]
fn test_offsetof_nested() {
    let mut ffi = fresh(sample_context());
    let rect = ffi.parse_type("struct rect").unwrap();
    assert_eq!(ffi.offsetof(rect, &["size"]).unwrap(), 8);
    assert_eq!(ffi.offsetof(rect, &["size", "y"]).unwrap(), 12);
    assert_eq!(ffi.offsetof(rect, &[]).unwrap(), 0);
    assert_eq!(
        ffi.offsetof(rect, &["size", "z"]),
        Err(FfiError::NoSuchField {
            ctype: "point_t".to_string(),
            field: "z".to_string(),
        })
    );
    assert!(matches!(
        ffi.offsetof(rect, &["origin", "x", "deeper"]),
        Err(FfiError::NotAStruct(_))
    ));
}

#[test]
fn test_opaque_structs() {
    let mut ffi = fresh(sample_context());
    let file = ffi.parse_type("FILE").unwrap();
    assert_eq!(ffi.name(file), "struct FILE_impl");
    assert!(matches!(ffi.sizeof(file), Err(FfiError::UnknownSize(_))));
    assert!(matches!(ffi.fields(file), Err(FfiError::UnknownSize(_))));
    assert!(ffi.parse_type("FILE *").is_ok());
    assert!(matches!(
        ffi.parse_type("FILE[2]"),
        Err(FfiError::Realize(RealizeError::UnknownItemSize(_)))
    ));
}

#[test]
fn test_list_types() {
    let ffi = fresh(sample_context());
    let listing = ffi.list_types();
    assert_eq!(listing.typedefs, vec!["FILE", "name_t", "point_t"]);
    assert_eq!(listing.structs, vec!["FILE_impl", "node", "rect"]);
    assert_eq!(listing.unions, vec!["value"]);
}

#[test]
fn test_describe() {
    let mut ffi = fresh(sample_context());
    let node = ffi.parse_type("struct node").unwrap();
    assert_eq!(
        ffi.describe(node).unwrap(),
        "struct node (size 16, align 8)\n  int value @0\n  struct node * next @8"
    );
    let color = ffi.parse_type("enum color").unwrap();
    assert_eq!(
        ffi.describe(color).unwrap(),
        "enum color (size 4, align 4)\n  RED = 0\n  GREEN = 1\n  BLUE = 2"
    );
    let void = ffi.parse_type("void").unwrap();
    assert_eq!(ffi.describe(void).unwrap(), "void (incomplete)");
}

#[test]
fn test_teardown_releases_local_types() {
    let universe = TypeUniverse::new_shared();
    let mut ffi = Ffi::with_universe(sample_context(), universe.clone(), FfiConfig::default());
    let node_ptr = ffi.parse_type("struct node *").unwrap();
    let int_ptr = ffi.parse_type("int *").unwrap();
    let before = universe.lock().len();
    drop(ffi);

    let universe = universe.lock();
    assert!(universe.try_get(node_ptr).is_none());
    assert!(universe.try_get(int_ptr).is_some());
    assert_eq!(universe.lookup_global("int *"), Some(int_ptr));
    assert!(universe.len() < before);
}

#[test]
fn test_capacity_limit() {
    let config = FfiConfig::default().with_opcode_capacity(8);
    let mut ffi = Ffi::with_universe(TypeContext::empty(), TypeUniverse::new_shared(), config);
    assert!(ffi.parse_type("int *").is_ok());
    let err = ffi
        .parse_type("int(*)(int, int, int, int, int, int, int)")
        .unwrap_err();
    assert!(matches!(err, FfiError::Parse(ref e) if e.kind == ParseErrorKind::Capacity));
}
