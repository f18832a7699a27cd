//! Lexer (tokenizer) for C type declarations
//!
//! Classifies the lexemes of a declaration string.  The lexer keeps no state
//! between calls: [`Lexer::token_at`] is a pure function of the input and a
//! byte position, so the parser can re-scan or look ahead freely.  Running out
//! of input yields an explicit [`TokenKind::End`] token, and bytes that are not
//! part of the grammar come back as [`TokenKind::Other`] for the parser to
//! reject with a located error.

use std::fmt;

/// Lexeme classes produced by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,

    // Keywords
    Void,
    Char,
    Short,
    Int,
    Long,
    Signed,
    Unsigned,
    Float,
    Double,
    Bool,
    Struct,
    Union,
    Enum,
    Const,
    Volatile,
    Cdecl,
    Stdcall,

    // Punctuation
    Star,         // *
    LParen,       // (
    RParen,       // )
    LBracket,     // [
    RBracket,     // ]
    Comma,        // ,
    Ellipsis,     // ...

    /// Any other byte
    Other(u8),

    /// End of input
    End,
}

impl TokenKind {
    pub fn is_qualifier(self) -> bool {
        matches!(self, TokenKind::Const | TokenKind::Volatile)
    }

    pub fn is_abi(self) -> bool {
        matches!(self, TokenKind::Cdecl | TokenKind::Stdcall)
    }
}

/// A lexeme: its class and its byte span in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub len: usize,
}

impl Token {
    /// Byte offset just past this token
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end()]
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier => write!(f, "identifier"),
            TokenKind::Integer => write!(f, "integer literal"),
            TokenKind::Void => write!(f, "'void'"),
            TokenKind::Char => write!(f, "'char'"),
            TokenKind::Short => write!(f, "'short'"),
            TokenKind::Int => write!(f, "'int'"),
            TokenKind::Long => write!(f, "'long'"),
            TokenKind::Signed => write!(f, "'signed'"),
            TokenKind::Unsigned => write!(f, "'unsigned'"),
            TokenKind::Float => write!(f, "'float'"),
            TokenKind::Double => write!(f, "'double'"),
            TokenKind::Bool => write!(f, "'_Bool'"),
            TokenKind::Struct => write!(f, "'struct'"),
            TokenKind::Union => write!(f, "'union'"),
            TokenKind::Enum => write!(f, "'enum'"),
            TokenKind::Const => write!(f, "'const'"),
            TokenKind::Volatile => write!(f, "'volatile'"),
            TokenKind::Cdecl => write!(f, "'__cdecl'"),
            TokenKind::Stdcall => write!(f, "'__stdcall'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Ellipsis => write!(f, "'...'"),
            TokenKind::Other(byte) => {
                if byte.is_ascii_graphic() {
                    write!(f, "'{}'", *byte as char)
                } else {
                    write!(f, "'\\x{:02x}'", byte)
                }
            }
            TokenKind::End => write!(f, "end of input"),
        }
    }
}

/// Lexer over one declaration string
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'a> {
    input: &'a [u8],
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
        }
    }

    /// Tokenize the entire input, ending with the `End` token
    pub fn tokenize(&self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0;

        loop {
            let token = self.token_at(position);
            tokens.push(token);
            if token.kind == TokenKind::End {
                break;
            }
            position = token.end();
        }

        tokens
    }

    /// Scan the token starting at or after `position`
    pub fn token_at(&self, position: usize) -> Token {
        let mut pos = position;

        while self.peek(pos).is_some_and(|ch| ch.is_ascii_whitespace()) {
            pos += 1;
        }

        let ch = match self.peek(pos) {
            Some(ch) => ch,
            None => {
                return Token {
                    kind: TokenKind::End,
                    start: self.input.len(),
                    len: 0,
                };
            }
        };

        match ch {
            b'0'..=b'9' => self.number_literal(pos),
            // `$` names the anonymous tags of generated tables
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.identifier_or_keyword(pos),
            b'.' if self.peek(pos + 1) == Some(b'.') && self.peek(pos + 2) == Some(b'.') => {
                Token {
                    kind: TokenKind::Ellipsis,
                    start: pos,
                    len: 3,
                }
            }
            _ => {
                let kind = match ch {
                    b'*' => TokenKind::Star,
                    b'(' => TokenKind::LParen,
                    b')' => TokenKind::RParen,
                    b'[' => TokenKind::LBracket,
                    b']' => TokenKind::RBracket,
                    b',' => TokenKind::Comma,
                    other => TokenKind::Other(other),
                };
                Token {
                    kind,
                    start: pos,
                    len: 1,
                }
            }
        }
    }

    /// Integer literal: decimal, octal, or `0x` hex digits
    fn number_literal(&self, start: usize) -> Token {
        let mut len = 1;
        if self.peek(start) == Some(b'0') && matches!(self.peek(start + 1), Some(b'x' | b'X')) {
            len = 2;
        }
        while self.peek(start + len).is_some_and(|ch| ch.is_ascii_hexdigit()) {
            len += 1;
        }
        Token {
            kind: TokenKind::Integer,
            start,
            len,
        }
    }

    fn identifier_or_keyword(&self, start: usize) -> Token {
        let mut len = 1;
        while self
            .peek(start + len)
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$')
        {
            len += 1;
        }

        let kind = match &self.input[start..start + len] {
            b"void" => TokenKind::Void,
            b"char" => TokenKind::Char,
            b"short" => TokenKind::Short,
            b"int" => TokenKind::Int,
            b"long" => TokenKind::Long,
            b"signed" => TokenKind::Signed,
            b"unsigned" => TokenKind::Unsigned,
            b"float" => TokenKind::Float,
            b"double" => TokenKind::Double,
            b"_Bool" => TokenKind::Bool,
            b"struct" => TokenKind::Struct,
            b"union" => TokenKind::Union,
            b"enum" => TokenKind::Enum,
            b"const" => TokenKind::Const,
            b"volatile" => TokenKind::Volatile,
            b"__cdecl" => TokenKind::Cdecl,
            b"__stdcall" => TokenKind::Stdcall,
            _ => TokenKind::Identifier,
        };

        Token { kind, start, len }
    }

    /// Number of top-level commas between `position` and the `)` closing the
    /// current parenthesis level (or the end of input)
    pub fn count_commas(&self, position: usize) -> usize {
        let mut count = 0;
        let mut nesting = 0usize;

        for &ch in &self.input[position.min(self.input.len())..] {
            match ch {
                b',' if nesting == 0 => count += 1,
                b'(' => nesting += 1,
                b')' => {
                    if nesting == 0 {
                        return count;
                    }
                    nesting -= 1;
                }
                _ => {}
            }
        }

        count
    }

    /// First non-blank byte at or after `position`
    pub fn next_char(&self, position: usize) -> Option<u8> {
        self.input[position.min(self.input.len())..]
            .iter()
            .copied()
            .find(|ch| !ch.is_ascii_whitespace())
    }

    fn peek(&self, pos: usize) -> Option<u8> {
        self.input.get(pos).copied()
    }
}
