//! C declaration parser
//!
//! This module compiles the text of a C type into opcodes:
//! - [`lexer`]: Tokenization (text → tokens)
//! - [`parse`]: Parser struct, errors and the [`parse`](parse::parse) entry point
//! - `specifiers` / `declarators`: the grammar, as `impl Parser` blocks
//! - [`opcodes`]: the opcode encoding and the output buffer
//!
//! # Supported C Subset
//!
//! - Primitive types with their modifier combinations, and the standard
//!   fixed-width names (`int32_t`, `size_t`, ...)
//! - `struct`/`union`/`enum` tags and typedef names from a [`TypeContext`](crate::context::TypeContext)
//! - Pointers, arrays (`[N]`, `[]`, `[CONSTANT]`), function types and
//!   function pointers, `__cdecl`/`__stdcall`, `...`
//! - `const`/`volatile` are accepted and ignored
//! - No expressions, initializers, bit-fields or declarations of new tags
//!
//! # Parser Implementation
//!
//! Hand-written recursive descent with one token of lookahead.  No external
//! parser generator dependencies.

mod declarators;
pub mod lexer;
pub mod opcodes;
pub mod parse;
mod specifiers;

pub use opcodes::{Op, Opcode, OpcodeBuffer, Realized, Slot};
pub use parse::{parse, ParseError, ParseErrorKind, Parser};
