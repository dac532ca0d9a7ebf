//! Element types and the three FITS type-code schemes.
//!
//! FITS identifies pixel types three different ways: the BITPIX-style code
//! that declares how an image is stored, the datatype code used when moving
//! values between the file and a memory buffer, and the TFORM letter used in
//! table columns. Each scheme is an ordered table of `(type, code)` pairs.
//! Lookups in either direction resolve against the first registration, so a
//! type listed twice keeps its first code and a code listed twice maps back
//! to the first type that claimed it.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// A code in one of the [`CodeScheme`]s.
pub type TypeCode = i32;

/// The closed set of scalar element types known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Logical,
    Complex32,
    Complex64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
            ElementType::U64 => "u64",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::Logical => "logical",
            ElementType::Complex32 => "complex32",
            ElementType::Complex64 => "complex64",
        };
        f.write_str(name)
    }
}

/// The three independent code enumerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeScheme {
    /// BITPIX and its unsigned "equivalent type" extensions.
    Storage,
    /// Datatype codes for value transfer.
    Transfer,
    /// Binary-table TFORM letters, stored as their code point.
    ColumnLetter,
}

impl fmt::Display for CodeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeScheme::Storage => f.write_str("storage"),
            CodeScheme::Transfer => f.write_str("transfer"),
            CodeScheme::ColumnLetter => f.write_str("column-letter"),
        }
    }
}

/// Storage codes (BITPIX values and equivalent-type extensions).
pub mod storage {
    use super::TypeCode;

    pub const BYTE_IMG: TypeCode = 8;
    pub const SBYTE_IMG: TypeCode = 10;
    pub const SHORT_IMG: TypeCode = 16;
    pub const USHORT_IMG: TypeCode = 20;
    pub const LONG_IMG: TypeCode = 32;
    pub const ULONG_IMG: TypeCode = 40;
    pub const LONGLONG_IMG: TypeCode = 64;
    pub const ULONGLONG_IMG: TypeCode = 80;
    pub const FLOAT_IMG: TypeCode = -32;
    pub const DOUBLE_IMG: TypeCode = -64;
}

/// Transfer datatype codes.
pub mod transfer {
    use super::TypeCode;

    pub const TBYTE: TypeCode = 11;
    pub const TSBYTE: TypeCode = 12;
    pub const TLOGICAL: TypeCode = 14;
    pub const TUSHORT: TypeCode = 20;
    pub const TSHORT: TypeCode = 21;
    pub const TUINT: TypeCode = 30;
    pub const TINT: TypeCode = 31;
    pub const TULONG: TypeCode = 40;
    pub const TLONG: TypeCode = 41;
    pub const TFLOAT: TypeCode = 42;
    pub const TULONGLONG: TypeCode = 80;
    pub const TLONGLONG: TypeCode = 81;
    pub const TDOUBLE: TypeCode = 82;
    pub const TCOMPLEX: TypeCode = 83;
    pub const TDBLCOMPLEX: TypeCode = 163;
}

use ElementType::*;

const STORAGE_TABLE: &[(ElementType, TypeCode)] = &[
    (U8, storage::BYTE_IMG),
    (I8, storage::SBYTE_IMG),
    (I16, storage::SHORT_IMG),
    (U16, storage::USHORT_IMG),
    (I32, storage::LONG_IMG),
    (U32, storage::ULONG_IMG),
    (I64, storage::LONGLONG_IMG),
    (U64, storage::ULONGLONG_IMG),
    (F32, storage::FLOAT_IMG),
    (F64, storage::DOUBLE_IMG),
    // Logical pixels are stored as bytes.
    (Logical, storage::BYTE_IMG),
];

// 64-bit integers are registered with the LP64 `long` codes first; the
// `long long` codes only resolve in reverse.
const TRANSFER_TABLE: &[(ElementType, TypeCode)] = &[
    (U8, transfer::TBYTE),
    (I8, transfer::TSBYTE),
    (Logical, transfer::TLOGICAL),
    (U16, transfer::TUSHORT),
    (I16, transfer::TSHORT),
    (U32, transfer::TUINT),
    (I32, transfer::TINT),
    (U64, transfer::TULONG),
    (I64, transfer::TLONG),
    (F32, transfer::TFLOAT),
    (U64, transfer::TULONGLONG),
    (I64, transfer::TLONGLONG),
    (F64, transfer::TDOUBLE),
    (Complex32, transfer::TCOMPLEX),
    (Complex64, transfer::TDBLCOMPLEX),
];

const COLUMN_TABLE: &[(ElementType, TypeCode)] = &[
    (U8, b'B' as TypeCode),
    (I8, b'S' as TypeCode),
    (Logical, b'L' as TypeCode),
    (U16, b'U' as TypeCode),
    (I16, b'I' as TypeCode),
    (U32, b'V' as TypeCode),
    (I32, b'J' as TypeCode),
    (U64, b'W' as TypeCode),
    (I64, b'K' as TypeCode),
    (F32, b'E' as TypeCode),
    (F64, b'D' as TypeCode),
    (Complex32, b'C' as TypeCode),
    (Complex64, b'M' as TypeCode),
];

/// `(type, short suffix, long suffix)` fragments of host routine names.
const SUFFIX_TABLE: &[(ElementType, &str, &str)] = &[
    (U8, "b", "byt"),
    (I8, "sb", "sbyt"),
    (Logical, "l", "log"),
    (U16, "ui", "usht"),
    (I16, "i", "sht"),
    (U32, "uk", "uint"),
    (I32, "k", "int"),
    (U64, "uj", "ulng"),
    (I64, "j", "lng"),
    (U64, "ujj", "ulnglng"),
    (I64, "jj", "lnglng"),
    (F32, "e", "flt"),
    (F64, "d", "dbl"),
    (Complex32, "c", "cmp"),
    (Complex64, "m", "dblcmp"),
];

struct CodeTable {
    forward: HashMap<ElementType, TypeCode>,
    reverse: HashMap<TypeCode, ElementType>,
}

impl CodeTable {
    fn build(pairs: &[(ElementType, TypeCode)]) -> Self {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        for &(ty, code) in pairs {
            forward.entry(ty).or_insert(code);
            reverse.entry(code).or_insert(ty);
        }
        CodeTable { forward, reverse }
    }
}

struct Registry {
    storage: CodeTable,
    transfer: CodeTable,
    column: CodeTable,
    suffixes: HashMap<ElementType, (&'static str, &'static str)>,
}

impl Registry {
    fn build() -> Self {
        let mut suffixes = HashMap::new();
        for &(ty, short, long) in SUFFIX_TABLE {
            suffixes.entry(ty).or_insert((short, long));
        }
        Registry {
            storage: CodeTable::build(STORAGE_TABLE),
            transfer: CodeTable::build(TRANSFER_TABLE),
            column: CodeTable::build(COLUMN_TABLE),
            suffixes,
        }
    }

    fn table(&self, scheme: CodeScheme) -> &CodeTable {
        match scheme {
            CodeScheme::Storage => &self.storage,
            CodeScheme::Transfer => &self.transfer,
            CodeScheme::ColumnLetter => &self.column,
        }
    }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::build)
}

/// Look up the code for `ty` in `scheme`.
pub fn code_for_type(scheme: CodeScheme, ty: ElementType) -> Result<TypeCode> {
    registry()
        .table(scheme)
        .forward
        .get(&ty)
        .copied()
        .ok_or(Error::UnsupportedType { ty, scheme })
}

/// Look up the element type that first registered `code` in `scheme`.
pub fn type_for_code(scheme: CodeScheme, code: TypeCode) -> Result<ElementType> {
    registry()
        .table(scheme)
        .reverse
        .get(&code)
        .copied()
        .ok_or(Error::InvalidCode { scheme, code })
}

/// Short host routine suffix for `ty` (`"e"` for `f32`).
pub fn short_suffix(ty: ElementType) -> Result<&'static str> {
    suffixes(ty).map(|(short, _)| short)
}

/// Long host routine suffix for `ty` (`"flt"` for `f32`).
pub fn long_suffix(ty: ElementType) -> Result<&'static str> {
    suffixes(ty).map(|(_, long)| long)
}

fn suffixes(ty: ElementType) -> Result<(&'static str, &'static str)> {
    registry()
        .suffixes
        .get(&ty)
        .copied()
        .ok_or(Error::UnsupportedType {
            ty,
            scheme: CodeScheme::Transfer,
        })
}

/// Build a typed host routine name from a prefix.
///
/// A prefix ending in `_` selects long naming (`fits_read_img_flt`),
/// anything else short naming (`ffgpve`).
pub fn routine_name(prefix: &str, ty: ElementType) -> Result<String> {
    let suffix = if prefix.ends_with('_') {
        long_suffix(ty)?
    } else {
        short_suffix(ty)?
    };
    Ok(format!("{prefix}{suffix}"))
}

/// A numeric primitive that can be moved between memory and an image.
pub trait Element: bytemuck::Pod + PartialEq + Default + fmt::Debug {
    /// The registry entry for this primitive.
    const ELEMENT: ElementType;

    /// Transfer code used when handing a buffer of `Self` to the host.
    fn transfer_code() -> Result<TypeCode> {
        code_for_type(CodeScheme::Transfer, Self::ELEMENT)
    }

    /// Storage code used when creating an image of `Self`.
    fn storage_code() -> Result<TypeCode> {
        code_for_type(CodeScheme::Storage, Self::ELEMENT)
    }
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const ELEMENT: ElementType = ElementType::$variant;
        }
    };
}

impl_element!(u8, U8);
impl_element!(i8, I8);
impl_element!(u16, U16);
impl_element!(i16, I16);
impl_element!(u32, U32);
impl_element!(i32, I32);
impl_element!(u64, U64);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);
