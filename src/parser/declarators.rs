//! Declarator parsing
//!
//! The "sequel" is everything after the type specifier: `*`, qualifiers,
//! an optional variable name, parenthesized groups, parameter lists and
//! array dimensions.
//!
//! ```text
//! sequel   ::= ("*" | qualifier | abi)* identifier? postfix* array*
//! postfix  ::= "(" abi? ( sequel | params ) ")"
//! params   ::= "void" | ( complete ("," complete)* ("," "...")? ) | "..." | ε
//! array    ::= "[" ( integer | constant-name )? "]"
//! ```
//!
//! C declarators read inside out, so the opcode of the innermost part is
//! written last but must be the entry point.  The sequel returns that entry
//! point and patches the argument of whichever opcode encloses the next
//! part (`link`), finally pointing the outermost one at `outer`.

use crate::context::GlobalKind;
use crate::parser::lexer::TokenKind;
use crate::parser::opcodes::{Op, Opcode, FUNCTION_END_ELLIPSIS, FUNCTION_END_STDCALL};
use crate::parser::parse::{ParseError, Parser};

/// Where the next inner part of the declarator gets linked
#[derive(Debug, Clone, Copy)]
enum Link {
    /// The return value of the sequel itself
    Result,
    /// The argument of an opcode already in the output
    Slot(usize),
}

impl<'a> Parser<'a> {
    /// Parse a declarator sequel around the already written type `outer`.
    /// Returns the index of the innermost opcode.
    pub(crate) fn parse_sequel(&mut self, mut outer: usize) -> Result<usize, ParseError> {
        let mut abi = None;

        loop {
            match self.kind() {
                TokenKind::Star => {
                    outer = self.write(Opcode::new(Op::Pointer, outer))?;
                }
                TokenKind::Const | TokenKind::Volatile => {}
                TokenKind::Cdecl | TokenKind::Stdcall => abi = Some(self.kind()),
                _ => break,
            }
            self.advance();
        }

        let mut check_for_grouping = 1i32;
        if self.kind() == TokenKind::Identifier {
            // variable name
            self.advance();
            check_for_grouping = 0;
        }

        let mut result = 0usize;
        let mut link = Link::Result;

        while self.kind() == TokenKind::LParen {
            self.advance();

            if self.kind().is_abi() {
                abi = Some(self.kind());
                self.advance();
            }

            let grouping = check_for_grouping == 1
                && matches!(
                    self.kind(),
                    TokenKind::Star | TokenKind::Const | TokenKind::Volatile | TokenKind::LBracket
                );
            check_for_grouping -= 1;

            if grouping {
                let noop = self.write(Opcode::new(Op::Noop, 0))?;
                link = Link::Slot(noop);
                result = self.parse_sequel(noop)?;
            } else {
                let stdcall = abi.take() == Some(TokenKind::Stdcall);
                let function = self.output_index();
                self.set_link(link, &mut result, function);
                link = Link::Slot(function);
                self.parse_parameters(stdcall)?;
            }

            self.expect(TokenKind::RParen, "expected ')'")?;
        }

        if abi.is_some() {
            return Err(self.syntax_error("expected '('"));
        }

        while self.kind() == TokenKind::LBracket {
            let array = self.output_index();
            self.set_link(link, &mut result, array);
            link = Link::Slot(array);

            self.advance();
            if self.kind() == TokenKind::RBracket {
                self.write(Opcode::new(Op::OpenArray, 0))?;
            } else {
                let length = self.parse_array_length()?;
                self.advance();
                self.write(Opcode::new(Op::Array, 0))?;
                self.write(Opcode::from_raw(length))?;
            }
            self.expect(TokenKind::RBracket, "expected ']'")?;
        }

        self.set_link(link, &mut result, outer);
        Ok(result)
    }

    fn set_link(&mut self, link: Link, result: &mut usize, target: usize) {
        match link {
            Link::Result => *result = target,
            Link::Slot(index) => {
                let op = self.out.opcode(index);
                self.out.set(index, op.with_arg(target));
            }
        }
    }

    /// Parameter list after the `(` of a function declarator.  Writes
    /// `FUNCTION`, one slot per parameter and `FUNCTION_END`; the `FUNCTION`
    /// argument (the result type) is linked by the caller.
    fn parse_parameters(&mut self, stdcall: bool) -> Result<(), ParseError> {
        let mut flags = if stdcall { FUNCTION_END_STDCALL } else { 0 };

        if self.kind() == TokenKind::Void && self.following_char() == Some(b')') {
            self.advance();
        }

        // may be one more than the real count, for `()`
        let arg_total = self.lexer.count_commas(self.token.start) + 1;

        let base = self.write(Opcode::new(Op::Function, 0))?;
        for _ in 0..=arg_total {
            self.write(Opcode::from_raw(0))?;
        }

        let mut next = base + 1;
        if self.kind() != TokenKind::RParen {
            loop {
                if self.kind() == TokenKind::Ellipsis {
                    // variadic functions are always cdecl
                    flags = FUNCTION_END_ELLIPSIS;
                    self.advance();
                    break;
                }

                let arg = self.parse_complete()?;
                let op = self.out.opcode(arg);
                // arrays and functions decay to pointers as parameters
                let decayed = match op.op() {
                    Some(Op::Array) | Some(Op::OpenArray) => Opcode::new(Op::Pointer, op.arg()),
                    Some(Op::Function) => Opcode::new(Op::Pointer, arg),
                    _ => Opcode::new(Op::Noop, arg),
                };
                debug_assert!(next - base <= arg_total);
                self.out.set(next, decayed);
                next += 1;

                if self.kind() != TokenKind::Comma {
                    break;
                }
                self.advance();
            }
        }

        self.out.set(next, Opcode::new(Op::FunctionEnd, flags));
        Ok(())
    }

    /// Length inside `[...]`: an integer literal, or the name of an integer
    /// or enum constant declared in the context
    fn parse_array_length(&self) -> Result<usize, ParseError> {
        match self.kind() {
            TokenKind::Integer => parse_c_integer(self.text()).map_err(|msg| self.syntax_error(msg)),
            TokenKind::Identifier => {
                let value = self
                    .ctx
                    .search_global(self.text())
                    .and_then(|index| match self.ctx.global(index).kind {
                        GlobalKind::IntConstant(value) | GlobalKind::EnumConstant(value) => {
                            Some(value)
                        }
                        _ => None,
                    });
                match value {
                    Some(value) if value < 0 => {
                        Err(self.syntax_error("expected a positive integer constant"))
                    }
                    Some(value) if value as u64 > isize::MAX as u64 => {
                        Err(self.syntax_error("integer constant too large"))
                    }
                    Some(value) => Ok(value as usize),
                    None => Err(self.syntax_error("expected a positive integer constant")),
                }
            }
            _ => Err(self.syntax_error("expected a positive integer constant")),
        }
    }
}

/// Integer literal with C prefixes: `0x` hex, leading `0` octal, decimal
fn parse_c_integer(text: &str) -> Result<usize, &'static str> {
    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };

    if digits.is_empty() || !digits.chars().all(|ch| ch.is_digit(radix)) {
        return Err("invalid number");
    }
    match u64::from_str_radix(digits, radix) {
        Ok(value) if value <= isize::MAX as u64 => Ok(value as usize),
        _ => Err("number too large"),
    }
}
