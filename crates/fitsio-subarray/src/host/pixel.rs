//! Pixel encoding for the in-memory host.
//!
//! Stored pixels are big-endian values of the BITPIX type; transfer buffers
//! hold native-endian values of the transfer type. Every conversion passes
//! through [`Num`], which keeps integers exact up to the full `u64`/`i64`
//! range so that unsigned images stored with a BZERO offset survive a round
//! trip bit for bit.

use core::mem::size_of;

use super::{HostResult, Status};
use crate::types::{storage, transfer, TypeCode};

/// A pixel value in transit between storage and a transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i128),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(v) => v as f64,
            Num::Float(v) => v,
        }
    }
}

/// Linear BSCALE/BZERO calibration: `physical = zero + scale * stored`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub scale: f64,
    pub zero: f64,
}

impl Scaling {
    pub const IDENTITY: Scaling = Scaling {
        scale: 1.0,
        zero: 0.0,
    };

    /// The offset as an exact integer when the calibration is a pure integer
    /// shift.
    fn integer_offset(&self) -> Option<i128> {
        if self.scale == 1.0 && self.zero.fract() == 0.0 && self.zero.abs() <= 1.9e19 {
            Some(self.zero as i128)
        } else {
            None
        }
    }

    pub fn to_physical(&self, stored: Num) -> Num {
        match (self.integer_offset(), stored) {
            (Some(offset), Num::Int(v)) => Num::Int(v + offset),
            (Some(_), Num::Float(v)) => Num::Float(v + self.zero),
            (None, v) => Num::Float(self.zero + self.scale * v.as_f64()),
        }
    }

    pub fn to_stored(&self, physical: Num) -> Num {
        match (self.integer_offset(), physical) {
            (Some(offset), Num::Int(v)) => Num::Int(v - offset),
            (Some(_), Num::Float(v)) => Num::Float(v - self.zero),
            (None, v) => Num::Float((v.as_f64() - self.zero) / self.scale),
        }
    }
}

/// BITPIX and calibration used to store an image declared with `code`.
pub fn storage_layout(code: TypeCode) -> HostResult<(i64, Scaling)> {
    let offset = |zero: f64| Scaling { scale: 1.0, zero };
    match code {
        storage::BYTE_IMG
        | storage::SHORT_IMG
        | storage::LONG_IMG
        | storage::LONGLONG_IMG
        | storage::FLOAT_IMG
        | storage::DOUBLE_IMG => Ok((i64::from(code), Scaling::IDENTITY)),
        storage::SBYTE_IMG => Ok((8, offset(-128.0))),
        storage::USHORT_IMG => Ok((16, offset(32_768.0))),
        storage::ULONG_IMG => Ok((32, offset(2_147_483_648.0))),
        storage::ULONGLONG_IMG => Ok((64, offset(9_223_372_036_854_775_808.0))),
        _ => Err(Status::BAD_BITPIX),
    }
}

/// The equivalent storage code of a BITPIX plus calibration.
pub fn equivalent_code(bitpix: i64, scaling: Scaling) -> HostResult<TypeCode> {
    bytes_per_pixel(bitpix)?;
    let code = bitpix as TypeCode;
    if scaling == Scaling::IDENTITY || bitpix < 0 {
        return Ok(code);
    }
    let unsigned = match (bitpix, scaling.integer_offset()) {
        (8, Some(-128)) => Some(storage::SBYTE_IMG),
        (16, Some(32_768)) => Some(storage::USHORT_IMG),
        (32, Some(2_147_483_648)) => Some(storage::ULONG_IMG),
        (64, Some(9_223_372_036_854_775_808)) => Some(storage::ULONGLONG_IMG),
        _ => None,
    };
    Ok(unsigned.unwrap_or(storage::DOUBLE_IMG))
}

/// Returns the number of bytes per pixel for a given BITPIX value.
pub fn bytes_per_pixel(bitpix: i64) -> HostResult<usize> {
    match bitpix {
        8 | 16 | 32 | 64 | -32 | -64 => Ok((bitpix.unsigned_abs() / 8) as usize),
        _ => Err(Status::BAD_BITPIX),
    }
}

/// Width in bytes of one element of a transfer buffer.
pub fn transfer_width(code: TypeCode) -> HostResult<usize> {
    match code {
        transfer::TBYTE | transfer::TSBYTE => Ok(1),
        transfer::TUSHORT | transfer::TSHORT => Ok(2),
        transfer::TUINT | transfer::TINT | transfer::TFLOAT => Ok(4),
        transfer::TULONG
        | transfer::TLONG
        | transfer::TULONGLONG
        | transfer::TLONGLONG
        | transfer::TDOUBLE => Ok(8),
        _ => Err(Status::BAD_DATATYPE),
    }
}

macro_rules! read_ne {
    ($t:ty, $buf:expr, $i:expr) => {{
        const W: usize = size_of::<$t>();
        let mut bytes = [0u8; W];
        bytes.copy_from_slice(&$buf[$i * W..($i + 1) * W]);
        <$t>::from_ne_bytes(bytes)
    }};
}

macro_rules! read_be {
    ($t:ty, $buf:expr, $i:expr) => {{
        const W: usize = size_of::<$t>();
        let mut bytes = [0u8; W];
        bytes.copy_from_slice(&$buf[$i * W..($i + 1) * W]);
        <$t>::from_be_bytes(bytes)
    }};
}

fn put(buf: &mut [u8], i: usize, bytes: &[u8]) {
    let w = bytes.len();
    buf[i * w..(i + 1) * w].copy_from_slice(bytes);
}

fn to_int<T: TryFrom<i128>>(value: Num) -> HostResult<T> {
    let v = match value {
        Num::Int(v) => v,
        Num::Float(f) => {
            if !f.is_finite() {
                return Err(Status::NUM_OVERFLOW);
            }
            let r = libm::round(f);
            if r.abs() > 1.0e30 {
                return Err(Status::NUM_OVERFLOW);
            }
            r as i128
        }
    };
    T::try_from(v).map_err(|_| Status::NUM_OVERFLOW)
}

/// Decode stored pixel `i` (big-endian BITPIX type).
pub fn decode_stored(bitpix: i64, data: &[u8], i: usize) -> HostResult<Num> {
    Ok(match bitpix {
        8 => Num::Int(i128::from(data[i])),
        16 => Num::Int(i128::from(read_be!(i16, data, i))),
        32 => Num::Int(i128::from(read_be!(i32, data, i))),
        64 => Num::Int(i128::from(read_be!(i64, data, i))),
        -32 => Num::Float(f64::from(read_be!(f32, data, i))),
        -64 => Num::Float(read_be!(f64, data, i)),
        _ => return Err(Status::BAD_BITPIX),
    })
}

/// Encode `value` as stored pixel `i`, rounding and range-checking integers.
pub fn encode_stored(bitpix: i64, data: &mut [u8], i: usize, value: Num) -> HostResult<()> {
    match bitpix {
        8 => put(data, i, &[to_int::<u8>(value)?]),
        16 => put(data, i, &to_int::<i16>(value)?.to_be_bytes()),
        32 => put(data, i, &to_int::<i32>(value)?.to_be_bytes()),
        64 => put(data, i, &to_int::<i64>(value)?.to_be_bytes()),
        -32 => put(data, i, &(value.as_f64() as f32).to_be_bytes()),
        -64 => put(data, i, &value.as_f64().to_be_bytes()),
        _ => return Err(Status::BAD_BITPIX),
    }
    Ok(())
}

/// Load element `i` of a native-endian transfer buffer.
pub fn load(code: TypeCode, buf: &[u8], i: usize) -> HostResult<Num> {
    Ok(match code {
        transfer::TBYTE => Num::Int(i128::from(buf[i])),
        transfer::TSBYTE => Num::Int(i128::from(read_ne!(i8, buf, i))),
        transfer::TUSHORT => Num::Int(i128::from(read_ne!(u16, buf, i))),
        transfer::TSHORT => Num::Int(i128::from(read_ne!(i16, buf, i))),
        transfer::TUINT => Num::Int(i128::from(read_ne!(u32, buf, i))),
        transfer::TINT => Num::Int(i128::from(read_ne!(i32, buf, i))),
        transfer::TULONG | transfer::TULONGLONG => Num::Int(i128::from(read_ne!(u64, buf, i))),
        transfer::TLONG | transfer::TLONGLONG => Num::Int(i128::from(read_ne!(i64, buf, i))),
        transfer::TFLOAT => Num::Float(f64::from(read_ne!(f32, buf, i))),
        transfer::TDOUBLE => Num::Float(read_ne!(f64, buf, i)),
        _ => return Err(Status::BAD_DATATYPE),
    })
}

/// Store `value` as element `i` of a native-endian transfer buffer.
pub fn store(code: TypeCode, buf: &mut [u8], i: usize, value: Num) -> HostResult<()> {
    match code {
        transfer::TBYTE => put(buf, i, &[to_int::<u8>(value)?]),
        transfer::TSBYTE => put(buf, i, &to_int::<i8>(value)?.to_ne_bytes()),
        transfer::TUSHORT => put(buf, i, &to_int::<u16>(value)?.to_ne_bytes()),
        transfer::TSHORT => put(buf, i, &to_int::<i16>(value)?.to_ne_bytes()),
        transfer::TUINT => put(buf, i, &to_int::<u32>(value)?.to_ne_bytes()),
        transfer::TINT => put(buf, i, &to_int::<i32>(value)?.to_ne_bytes()),
        transfer::TULONG | transfer::TULONGLONG => {
            put(buf, i, &to_int::<u64>(value)?.to_ne_bytes())
        }
        transfer::TLONG | transfer::TLONGLONG => put(buf, i, &to_int::<i64>(value)?.to_ne_bytes()),
        transfer::TFLOAT => put(buf, i, &(value.as_f64() as f32).to_ne_bytes()),
        transfer::TDOUBLE => put(buf, i, &value.as_f64().to_ne_bytes()),
        _ => return Err(Status::BAD_DATATYPE),
    }
    Ok(())
}

/// Fill element `i` for an undefined pixel when no null value was supplied:
/// NaN for floating-point buffers, zero otherwise.
pub fn store_undefined(code: TypeCode, buf: &mut [u8], i: usize) -> HostResult<()> {
    match code {
        transfer::TFLOAT | transfer::TDOUBLE => store(code, buf, i, Num::Float(f64::NAN)),
        _ => store(code, buf, i, Num::Int(0)),
    }
}

/// Whether a stored value marks an undefined pixel.
pub fn is_undefined(stored: Num, blank: Option<i64>) -> bool {
    match stored {
        Num::Int(v) => blank.is_some_and(|b| i128::from(b) == v),
        Num::Float(v) => v.is_nan(),
    }
}
