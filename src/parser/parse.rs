//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct, the error type and the
//! [`parse`] entry point.
//!
//! # Parser Architecture
//!
//! The parser is recursive descent over a lazily scanned token stream:
//! - This module: Parser struct, token helpers, opcode output, entry point
//! - `specifiers`: qualifiers, modifier combinations and base types
//! - `declarators`: pointers, grouping parentheses, parameter lists, arrays
//!
//! Parser methods are split across these files using `impl Parser` blocks.
//!
//! # Failure
//!
//! The first error aborts the parse: every parsing method returns a
//! `Result`, and nothing reads another token once an `Err` is on its way
//! out.  Slots already appended to the output buffer are truncated away, so
//! a failed parse leaves the buffer as it found it.

use thiserror::Error;

use crate::context::TypeContext;
use crate::parser::lexer::{Lexer, Token, TokenKind};
use crate::parser::opcodes::{Opcode, OpcodeBuffer};

/// What class of problem a [`ParseError`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Malformed or unsupported declarator syntax
    Syntax,
    /// A name that the context does not declare, or declares differently
    Resolution,
    /// The output buffer is full
    Capacity,
}

/// Parser error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at offset {location})")]
pub struct ParseError {
    /// Byte offset into the parsed text
    pub location: usize,
    pub message: &'static str,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(location: usize, message: &'static str, kind: ParseErrorKind) -> Self {
        ParseError {
            location,
            message,
            kind,
        }
    }

    /// Two-line rendering of `input` with a caret under the error location
    pub fn caret(&self, input: &str) -> String {
        let column = input
            .get(..self.location)
            .map_or(self.location, |prefix| prefix.chars().count());
        format!("{}\n{}\n{}^", self.message, input, " ".repeat(column))
    }
}

/// Recursive descent parser for C type declarations
pub struct Parser<'a> {
    pub(crate) ctx: &'a TypeContext,
    pub(crate) input: &'a str,
    pub(crate) lexer: Lexer<'a>,
    pub(crate) token: Token,
    pub(crate) out: &'a mut OpcodeBuffer,
}

impl<'a> Parser<'a> {
    pub fn new(ctx: &'a TypeContext, input: &'a str, out: &'a mut OpcodeBuffer) -> Self {
        let lexer = Lexer::new(input);
        let token = lexer.token_at(0);
        Parser {
            ctx,
            input,
            lexer,
            token,
            out,
        }
    }

    /// Parse one complete type that must span the whole input.  Returns the
    /// index of its entry-point opcode.
    pub fn parse_type_entry(&mut self) -> Result<usize, ParseError> {
        let entry = self.parse_complete()?;
        if self.token.kind != TokenKind::End {
            return Err(self.syntax_error("unexpected symbol"));
        }
        Ok(entry)
    }

    // ===== Helper methods =====

    pub(crate) fn kind(&self) -> TokenKind {
        self.token.kind
    }

    pub(crate) fn advance(&mut self) {
        self.token = self.lexer.token_at(self.token.end());
    }

    pub(crate) fn text(&self) -> &'a str {
        self.token.text(self.input)
    }

    /// First non-blank character after the current token
    pub(crate) fn following_char(&self) -> Option<u8> {
        self.lexer.next_char(self.token.end())
    }

    pub(crate) fn syntax_error(&self, message: &'static str) -> ParseError {
        ParseError::new(self.token.start, message, ParseErrorKind::Syntax)
    }

    pub(crate) fn resolution_error(&self, message: &'static str) -> ParseError {
        ParseError::new(self.token.start, message, ParseErrorKind::Resolution)
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, message: &'static str) -> Result<(), ParseError> {
        if self.kind() != kind {
            return Err(self.syntax_error(message));
        }
        self.advance();
        Ok(())
    }

    /// Append an opcode, returning its slot index
    pub(crate) fn write(&mut self, op: Opcode) -> Result<usize, ParseError> {
        self.out.push(op, self.token.start)
    }

    /// Next free slot of the output buffer
    pub(crate) fn output_index(&self) -> usize {
        self.out.len()
    }
}

/// Parse `text` as one C type, appending its opcodes to `out`.
///
/// Returns the index of the entry-point opcode.  Names resolve against
/// `ctx`; on error `out` is restored to its previous length.
pub fn parse(ctx: &TypeContext, text: &str, out: &mut OpcodeBuffer) -> Result<usize, ParseError> {
    let start = out.len();
    let result = Parser::new(ctx, text, out).parse_type_entry();
    if result.is_err() {
        out.truncate(start);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TypeContext;
    use crate::parser::opcodes::{Op, Slot};

    fn ops(text: &str) -> Result<(usize, Vec<Slot>), ParseError> {
        let ctx = TypeContext::empty();
        let mut out = OpcodeBuffer::new(100);
        let entry = parse(&ctx, text, &mut out)?;
        Ok((entry, out.into_slots()))
    }

    fn op_at(slots: &[Slot], index: usize) -> (Op, usize) {
        let code = slots[index].opcode().expect("raw opcode");
        (code.op().expect("known op"), code.arg())
    }

    #[test]
    fn test_parse_primitive() {
        let (entry, slots) = ops("unsigned long").unwrap();
        assert_eq!(entry, 0);
        assert_eq!(op_at(&slots, 0), (Op::Primitive, 10));
    }

    #[test]
    fn test_parse_pointer_chain() {
        let (entry, slots) = ops("const char * volatile *").unwrap();
        assert_eq!(entry, 2);
        assert_eq!(op_at(&slots, 0), (Op::Primitive, 2));
        assert_eq!(op_at(&slots, 1), (Op::Pointer, 0));
        assert_eq!(op_at(&slots, 2), (Op::Pointer, 1));
    }

    #[test]
    fn test_parse_array_with_length_word() {
        let (entry, slots) = ops("int x[0x10]").unwrap();
        assert_eq!(op_at(&slots, entry), (Op::Array, 0));
        assert_eq!(slots[entry + 1], Slot::Op(Opcode::from_raw(16)));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = ops("int ;").unwrap_err();
        assert_eq!(err.message, "unexpected symbol");
        assert_eq!(err.location, 4);
        assert_eq!(err.kind, ParseErrorKind::Syntax);
    }

    #[test]
    fn test_failed_parse_restores_buffer() {
        let ctx = TypeContext::empty();
        let mut out = OpcodeBuffer::new(100);
        parse(&ctx, "int *", &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!(parse(&ctx, "int * (", &mut out).is_err());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_capacity_error() {
        let ctx = TypeContext::empty();
        let mut out = OpcodeBuffer::new(4);
        let err = parse(&ctx, "int *****", &mut out).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Capacity);
        assert_eq!(err.message, "internal type complexity limit reached");
        assert!(out.is_empty());
    }

    #[test]
    fn test_caret_rendering() {
        let err = ParseError::new(7, "undefined struct/union name", ParseErrorKind::Resolution);
        assert_eq!(
            err.caret("struct Unknown *"),
            "undefined struct/union name\nstruct Unknown *\n       ^"
        );
    }
}
