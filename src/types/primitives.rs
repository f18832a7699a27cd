//! The closed set of C primitive types.
//!
//! Sizes and alignments follow the LP64 data model.  The numeric ids are the
//! arguments of `PRIMITIVE` opcodes and must stay stable.

use std::fmt;

/// How a primitive's values are represented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveClass {
    Void,
    Bool,
    /// `char`, `wchar_t`, `char16_t`, `char32_t`
    Char,
    Signed,
    Unsigned,
    Float,
}

macro_rules! define_primitives {
    ($($variant:ident = $id:literal, $cname:literal, $size:literal, $align:literal, $class:ident;)*) => {
        /// C primitive types, numbered by their `PRIMITIVE` opcode argument
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PrimitiveType {
            $($variant = $id,)*
        }

        impl PrimitiveType {
            pub const ALL: &'static [PrimitiveType] = &[$(PrimitiveType::$variant,)*];

            pub fn from_id(id: usize) -> Option<Self> {
                match id {
                    $($id => Some(PrimitiveType::$variant),)*
                    _ => None,
                }
            }

            /// C spelling, which is also the canonical type name
            pub fn c_name(self) -> &'static str {
                match self {
                    $(PrimitiveType::$variant => $cname,)*
                }
            }

            /// Size in bytes; `None` for `void`
            pub fn size(self) -> Option<usize> {
                match self {
                    $(PrimitiveType::$variant => if $size == 0 { None } else { Some($size) },)*
                }
            }

            pub fn alignment(self) -> usize {
                match self {
                    $(PrimitiveType::$variant => $align,)*
                }
            }

            pub fn class(self) -> PrimitiveClass {
                match self {
                    $(PrimitiveType::$variant => PrimitiveClass::$class,)*
                }
            }
        }
    };
}

define_primitives! {
    Void = 0, "void", 0, 1, Void;
    Bool = 1, "_Bool", 1, 1, Bool;
    Char = 2, "char", 1, 1, Char;
    SChar = 3, "signed char", 1, 1, Signed;
    UChar = 4, "unsigned char", 1, 1, Unsigned;
    Short = 5, "short", 2, 2, Signed;
    UShort = 6, "unsigned short", 2, 2, Unsigned;
    Int = 7, "int", 4, 4, Signed;
    UInt = 8, "unsigned int", 4, 4, Unsigned;
    Long = 9, "long", 8, 8, Signed;
    ULong = 10, "unsigned long", 8, 8, Unsigned;
    LongLong = 11, "long long", 8, 8, Signed;
    ULongLong = 12, "unsigned long long", 8, 8, Unsigned;
    Float = 13, "float", 4, 4, Float;
    Double = 14, "double", 8, 8, Float;
    LongDouble = 15, "long double", 16, 16, Float;
    WChar = 16, "wchar_t", 4, 4, Char;
    Int8 = 17, "int8_t", 1, 1, Signed;
    UInt8 = 18, "uint8_t", 1, 1, Unsigned;
    Int16 = 19, "int16_t", 2, 2, Signed;
    UInt16 = 20, "uint16_t", 2, 2, Unsigned;
    Int32 = 21, "int32_t", 4, 4, Signed;
    UInt32 = 22, "uint32_t", 4, 4, Unsigned;
    Int64 = 23, "int64_t", 8, 8, Signed;
    UInt64 = 24, "uint64_t", 8, 8, Unsigned;
    IntPtr = 25, "intptr_t", 8, 8, Signed;
    UIntPtr = 26, "uintptr_t", 8, 8, Unsigned;
    PtrDiff = 27, "ptrdiff_t", 8, 8, Signed;
    Size = 28, "size_t", 8, 8, Unsigned;
    SSize = 29, "ssize_t", 8, 8, Signed;
    Char16 = 30, "char16_t", 2, 2, Char;
    Char32 = 31, "char32_t", 4, 4, Char;
}

impl PrimitiveType {
    pub const COUNT: usize = 32;

    /// Types spelled as a single identifier rather than with keywords
    /// (`size_t`, `int32_t`, ...).  Only consulted after the context's own
    /// typedefs, so a cdef may shadow them.
    pub fn from_standard_typename(name: &str) -> Option<Self> {
        let prim = match name {
            "wchar_t" => PrimitiveType::WChar,
            "int8_t" => PrimitiveType::Int8,
            "uint8_t" => PrimitiveType::UInt8,
            "int16_t" => PrimitiveType::Int16,
            "uint16_t" => PrimitiveType::UInt16,
            "int32_t" => PrimitiveType::Int32,
            "uint32_t" => PrimitiveType::UInt32,
            "int64_t" => PrimitiveType::Int64,
            "uint64_t" => PrimitiveType::UInt64,
            "intptr_t" => PrimitiveType::IntPtr,
            "uintptr_t" => PrimitiveType::UIntPtr,
            "ptrdiff_t" => PrimitiveType::PtrDiff,
            "size_t" => PrimitiveType::Size,
            "ssize_t" => PrimitiveType::SSize,
            "char16_t" => PrimitiveType::Char16,
            "char32_t" => PrimitiveType::Char32,
            _ => return None,
        };
        Some(prim)
    }

    pub fn id(self) -> usize {
        self as usize
    }

    /// Usable as an enum's underlying type or as a bit-field
    pub fn is_integer(self) -> bool {
        matches!(
            self.class(),
            PrimitiveClass::Bool
                | PrimitiveClass::Char
                | PrimitiveClass::Signed
                | PrimitiveClass::Unsigned
        )
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}
