//! Type specifier parsing
//!
//! ```text
//! complete   ::= qualifier* modifier* base? sequel
//! qualifier  ::= "const" | "volatile"
//! modifier   ::= "short" | "long" | "signed" | "unsigned"
//! base       ::= "int" | "char" | "void" | "_Bool" | "float" | "double"
//!              | ("struct" | "union" | "enum") identifier
//!              | identifier
//! ```
//!
//! Modifiers follow C's combination rules: at most one sign, `short` and
//! `long` exclusive, `long` at most twice, and no modifiers at all on
//! `void`, `_Bool`, `float` or tagged types.  Modifiers with no base type
//! mean `int`.

use crate::parser::lexer::TokenKind;
use crate::parser::opcodes::{Op, Opcode};
use crate::parser::parse::{ParseError, Parser};
use crate::types::primitives::PrimitiveType;

/// Length modifier accumulated so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Length {
    None,
    Short,
    Long,
    LongLong,
    /// `char` combined with a sign
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    None,
    Signed,
    Unsigned,
}

fn modified_int(length: Length, sign: Sign) -> PrimitiveType {
    let unsigned = sign == Sign::Unsigned;
    match (length, unsigned) {
        (Length::Char, false) => PrimitiveType::SChar,
        (Length::Char, true) => PrimitiveType::UChar,
        (Length::Short, false) => PrimitiveType::Short,
        (Length::Short, true) => PrimitiveType::UShort,
        (Length::Long, false) => PrimitiveType::Long,
        (Length::Long, true) => PrimitiveType::ULong,
        (Length::LongLong, false) => PrimitiveType::LongLong,
        (Length::LongLong, true) => PrimitiveType::ULongLong,
        (Length::None, false) => PrimitiveType::Int,
        (Length::None, true) => PrimitiveType::UInt,
    }
}

impl<'a> Parser<'a> {
    /// Parse a full type: specifier followed by its declarator sequel.
    /// Returns the index of the entry-point opcode.
    pub(crate) fn parse_complete(&mut self) -> Result<usize, ParseError> {
        while self.kind().is_qualifier() {
            self.advance();
        }

        let base = self.parse_specifier()?;
        let outer = self.write(base)?;
        self.parse_sequel(outer)
    }

    fn parse_specifier(&mut self) -> Result<Opcode, ParseError> {
        let mut length = Length::None;
        let mut sign = Sign::None;

        loop {
            match self.kind() {
                TokenKind::Short => {
                    if length != Length::None {
                        return Err(self.syntax_error("'short' after another 'short' or 'long'"));
                    }
                    length = Length::Short;
                }
                TokenKind::Long => {
                    length = match length {
                        Length::None => Length::Long,
                        Length::Long => Length::LongLong,
                        Length::Short => return Err(self.syntax_error("'long' after 'short'")),
                        _ => return Err(self.syntax_error("'long long long' is too long")),
                    };
                }
                TokenKind::Signed | TokenKind::Unsigned => {
                    if sign != Sign::None {
                        return Err(self.syntax_error("multiple 'signed' or 'unsigned'"));
                    }
                    sign = if self.kind() == TokenKind::Signed {
                        Sign::Signed
                    } else {
                        Sign::Unsigned
                    };
                }
                _ => break,
            }
            self.advance();
        }

        if length != Length::None || sign != Sign::None {
            return self.parse_modified_base(length, sign);
        }

        let op = match self.kind() {
            TokenKind::Int => primitive(PrimitiveType::Int),
            TokenKind::Char => primitive(PrimitiveType::Char),
            TokenKind::Void => primitive(PrimitiveType::Void),
            TokenKind::Bool => primitive(PrimitiveType::Bool),
            TokenKind::Float => primitive(PrimitiveType::Float),
            TokenKind::Double => primitive(PrimitiveType::Double),
            TokenKind::Identifier => self.parse_typename()?,
            TokenKind::Struct | TokenKind::Union => self.parse_struct_union_tag()?,
            TokenKind::Enum => self.parse_enum_tag()?,
            _ => return Err(self.syntax_error("identifier expected")),
        };
        self.advance();
        Ok(op)
    }

    /// Base type after at least one modifier
    fn parse_modified_base(&mut self, mut length: Length, sign: Sign) -> Result<Opcode, ParseError> {
        match self.kind() {
            TokenKind::Void
            | TokenKind::Bool
            | TokenKind::Float
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum => Err(self.syntax_error("invalid combination of types")),
            TokenKind::Double => {
                if sign != Sign::None || length != Length::Long {
                    return Err(self.syntax_error("invalid combination of types"));
                }
                self.advance();
                Ok(primitive(PrimitiveType::LongDouble))
            }
            TokenKind::Char => {
                if length != Length::None {
                    return Err(self.syntax_error("invalid combination of types"));
                }
                length = Length::Char;
                self.advance();
                Ok(primitive(modified_int(length, sign)))
            }
            TokenKind::Int => {
                self.advance();
                Ok(primitive(modified_int(length, sign)))
            }
            // `unsigned x`, `long *`: the modifiers stand alone
            _ => Ok(primitive(modified_int(length, sign))),
        }
    }

    /// A bare identifier: context typedefs first, then the standard names
    fn parse_typename(&self) -> Result<Opcode, ParseError> {
        let name = self.text();
        if let Some(index) = self.ctx.search_typename(name) {
            return Ok(Opcode::new(Op::Typename, index));
        }
        match PrimitiveType::from_standard_typename(name) {
            Some(prim) => Ok(primitive(prim)),
            None => Err(self.resolution_error("undefined type name")),
        }
    }

    fn parse_struct_union_tag(&mut self) -> Result<Opcode, ParseError> {
        let want_union = self.kind() == TokenKind::Union;
        self.advance();
        if self.kind() != TokenKind::Identifier {
            return Err(self.syntax_error("struct or union name expected"));
        }

        let index = self
            .ctx
            .search_struct_union(self.text())
            .ok_or_else(|| self.resolution_error("undefined struct/union name"))?;
        if self.ctx.struct_union(index).is_union != want_union {
            return Err(self.resolution_error("wrong kind of tag: struct vs union"));
        }
        Ok(Opcode::new(Op::StructUnion, index))
    }

    fn parse_enum_tag(&mut self) -> Result<Opcode, ParseError> {
        self.advance();
        if self.kind() != TokenKind::Identifier {
            return Err(self.syntax_error("enum name expected"));
        }

        let index = self
            .ctx
            .search_enum(self.text())
            .ok_or_else(|| self.resolution_error("undefined enum name"))?;
        Ok(Opcode::new(Op::Enum, index))
    }
}

fn primitive(prim: PrimitiveType) -> Opcode {
    Opcode::new(Op::Primitive, prim.id())
}
