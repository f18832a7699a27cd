//! # Introduction
//!
//! cffi-types turns the text of C type declarations into runtime type
//! descriptors with sizes, alignments, field offsets and canonical names, as
//! needed by a foreign function interface.  Type text is compiled to a flat
//! array of opcodes, which is then realized into interned descriptors.
//!
//! ## Pipeline
//!
//! ```text
//! C type text → Lexer → Parser → opcodes → Realizer → TypeDescr (interned)
//!                          ↑                  ↑
//!                     TypeContext ──── persistent types array
//! ```
//!
//! 1. [`context`]: the declarations known to one library (structs, unions,
//!    enums, typedefs, globals) as name-sorted tables, usually produced by a
//!    [`ContextBuilder`].
//! 2. [`parser`]: tokenizes a C type and emits opcodes, resolving names
//!    against the context.
//! 3. [`realize`]: walks the opcodes and builds descriptors, computing
//!    struct and union layouts along the way.
//! 4. [`types`]: the descriptor model and the [`TypeUniverse`] that interns
//!    descriptors by canonical name.
//! 5. [`ffi`]: the [`Ffi`] query façade (`sizeof`, `offsetof`, ...).
//!
//! ## Example
//!
//! ```
//! use cffi_types::{ContextBuilder, Ffi, FieldDecl};
//!
//! let mut builder = ContextBuilder::new();
//! builder.declare_struct(
//!     "point",
//!     vec![FieldDecl::new("x", "int"), FieldDecl::new("y", "int")],
//! );
//! let mut ffi = Ffi::new(builder.build().unwrap());
//!
//! let point = ffi.parse_type("struct point *[4]").unwrap();
//! assert_eq!(ffi.name(point), "struct point *[4]");
//! assert_eq!(ffi.sizeof(point).unwrap(), 32);
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod ffi;
pub mod parser;
pub mod realize;
pub mod types;

pub use config::FfiConfig;
pub use context::{ContextBuilder, FieldDecl, StructDecl, TypeContext};
pub use errors::{ContextError, FfiError, FfiResult, LayoutError, ParseError, RealizeError};
pub use ffi::{Ffi, TypeListing};
pub use types::{PrimitiveType, TypeDescr, TypeId, TypeUniverse};
