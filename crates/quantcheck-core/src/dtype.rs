use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// DType — element types that can appear in a tensor descriptor
//
// The tags follow the descriptor wire format used by test fixtures:
//
//   f16 bf16 f32 f64          — floating point
//   i1 i8 i16 i32 i64         — signed integers (i1 is a boolean bit)
//   ui8 ui16 ui32 ui64        — unsigned integers
//   qi8 qi16 qi32             — quantized signed integers
//   qui8 qui16                — quantized unsigned integers
//
// A quantized tag signals that scale/zero-point tensors accompany the data
// as separate inputs; the tag itself never embeds them.

/// Coarse classification of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Float,
    SignedInt,
    UnsignedInt,
    QuantizedInt,
}

/// Enum of all element data types known to the descriptor grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    I1,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    QI8,
    QI16,
    QI32,
    QU8,
    QU16,
}

impl DType {
    /// The coarse kind of this dtype.
    pub fn kind(&self) -> DTypeKind {
        match self {
            DType::F16 | DType::BF16 | DType::F32 | DType::F64 => DTypeKind::Float,
            DType::I1 | DType::I8 | DType::I16 | DType::I32 | DType::I64 => DTypeKind::SignedInt,
            DType::U8 | DType::U16 | DType::U32 | DType::U64 => DTypeKind::UnsignedInt,
            DType::QI8 | DType::QI16 | DType::QI32 | DType::QU8 | DType::QU16 => {
                DTypeKind::QuantizedInt
            }
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        self.kind() == DTypeKind::Float
    }

    /// Whether this dtype is a quantized integer type.
    pub fn is_quantized(&self) -> bool {
        self.kind() == DTypeKind::QuantizedInt
    }

    /// Number of bits in one element.
    pub fn bit_width(&self) -> usize {
        match self {
            DType::I1 => 1,
            DType::I8 | DType::U8 | DType::QI8 | DType::QU8 => 8,
            DType::F16 | DType::BF16 | DType::I16 | DType::U16 | DType::QI16 | DType::QU16 => 16,
            DType::F32 | DType::I32 | DType::U32 | DType::QI32 => 32,
            DType::F64 | DType::I64 | DType::U64 => 64,
        }
    }

    /// Size of one element in bytes (i1 is stored as a byte).
    pub fn size_in_bytes(&self) -> usize {
        self.bit_width().div_ceil(8)
    }

    /// The representable integer range for integer and quantized dtypes.
    ///
    /// Returns `None` for floating-point dtypes. Quantized dtypes share the
    /// range of their storage integer (qi8 stores an i8, and so on).
    pub fn integer_range(&self) -> Option<(f64, f64)> {
        match self {
            DType::F16 | DType::BF16 | DType::F32 | DType::F64 => None,
            DType::I1 => Some((0.0, 1.0)),
            DType::I8 | DType::QI8 => Some((i8::MIN as f64, i8::MAX as f64)),
            DType::I16 | DType::QI16 => Some((i16::MIN as f64, i16::MAX as f64)),
            DType::I32 | DType::QI32 => Some((i32::MIN as f64, i32::MAX as f64)),
            DType::I64 => Some((i64::MIN as f64, i64::MAX as f64)),
            DType::U8 | DType::QU8 => Some((0.0, u8::MAX as f64)),
            DType::U16 | DType::QU16 => Some((0.0, u16::MAX as f64)),
            DType::U32 => Some((0.0, u32::MAX as f64)),
            DType::U64 => Some((0.0, u64::MAX as f64)),
        }
    }

    /// Round an f64 value through this dtype's storage representation.
    ///
    /// This is what a backend observes when a value is materialized in a
    /// buffer of this dtype: half floats lose mantissa bits, integers are
    /// rounded to the nearest representable value and clamped to range.
    pub fn materialize(&self, v: f64) -> f64 {
        match self {
            DType::F16 => round_through::<half::f16>(v),
            DType::BF16 => round_through::<half::bf16>(v),
            DType::F32 => round_through::<f32>(v),
            DType::F64 => v,
            DType::I1 => {
                if v != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            other => match other.integer_range() {
                Some((lo, hi)) => v.round().clamp(lo, hi),
                None => v,
            },
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I1 => "i1",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "ui8",
            DType::U16 => "ui16",
            DType::U32 => "ui32",
            DType::U64 => "ui64",
            DType::QI8 => "qi8",
            DType::QI16 => "qi16",
            DType::QI32 => "qi32",
            DType::QU8 => "qui8",
            DType::QU16 => "qui16",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let dtype = match s {
            "f16" => DType::F16,
            "bf16" => DType::BF16,
            "f32" => DType::F32,
            "f64" => DType::F64,
            "i1" => DType::I1,
            "i8" => DType::I8,
            "i16" => DType::I16,
            "i32" => DType::I32,
            "i64" => DType::I64,
            "u8" | "ui8" => DType::U8,
            "u16" | "ui16" => DType::U16,
            "u32" | "ui32" => DType::U32,
            "u64" | "ui64" => DType::U64,
            "qi8" => DType::QI8,
            "qi16" => DType::QI16,
            "qi32" => DType::QI32,
            "qu8" | "qui8" => DType::QU8,
            "qu16" | "qui16" => DType::QU16,
            _ => return Err(Error::msg(format!("unknown type tag `{}`", s))),
        };
        Ok(dtype)
    }
}

// WithDType — bridge between Rust storage types and the DType enum

/// Trait implemented by Rust types that can back a tensor element.
///
/// Provides the mapping between the concrete Rust type and the DType enum,
/// plus conversions to/from f64 for generic numeric code.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + std::fmt::Debug {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64.
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;
}

fn round_through<T: WithDType>(v: f64) -> f64 {
    T::from_f64(v).to_f64()
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}

macro_rules! with_dtype_int {
    ($ty:ty, $dtype:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = $dtype;
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(v: f64) -> Self {
                v as $ty
            }
        }
    };
}

with_dtype_int!(i8, DType::I8);
with_dtype_int!(i16, DType::I16);
with_dtype_int!(i32, DType::I32);
with_dtype_int!(i64, DType::I64);
with_dtype_int!(u8, DType::U8);
with_dtype_int!(u16, DType::U16);
with_dtype_int!(u32, DType::U32);
with_dtype_int!(u64, DType::U64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_tags_round_trip() {
        for tag in [
            "f16", "bf16", "f32", "f64", "i1", "i8", "i16", "i32", "i64", "ui8", "ui16", "ui32",
            "ui64", "qi8", "qi16", "qi32", "qui8", "qui16",
        ] {
            let dt: DType = tag.parse().unwrap();
            assert_eq!(dt.to_string(), tag);
        }
    }

    #[test]
    fn test_dtype_aliases() {
        assert_eq!("u8".parse::<DType>().unwrap(), DType::U8);
        assert_eq!("qu8".parse::<DType>().unwrap(), DType::QU8);
    }

    #[test]
    fn test_unknown_tag() {
        assert!("q8".parse::<DType>().is_err());
        assert!("float".parse::<DType>().is_err());
    }

    #[test]
    fn test_kind_and_width() {
        assert_eq!(DType::QI8.kind(), DTypeKind::QuantizedInt);
        assert!(DType::QI8.is_quantized());
        assert!(!DType::I8.is_quantized());
        assert_eq!(DType::QI8.bit_width(), 8);
        assert_eq!(DType::BF16.bit_width(), 16);
        assert_eq!(DType::I1.bit_width(), 1);
        assert_eq!(DType::I1.size_in_bytes(), 1);
        assert!(DType::F32.is_float());
        assert!(!DType::QU8.is_float());
    }

    #[test]
    fn test_integer_range() {
        assert_eq!(DType::QI8.integer_range(), Some((-128.0, 127.0)));
        assert_eq!(DType::QU8.integer_range(), Some((0.0, 255.0)));
        assert_eq!(DType::F32.integer_range(), None);
    }

    #[test]
    fn test_materialize_floats() {
        // f32 keeps more digits than f16
        let v = 3.14159265358979;
        assert!((DType::F32.materialize(v) - v).abs() < 1e-7);
        assert!((DType::F16.materialize(v) - v).abs() > 1e-7);
        assert_eq!(DType::F64.materialize(v), v);
    }

    #[test]
    fn test_with_dtype_casts_through_num_traits() {
        // Generic numeric code relies on the NumCast bound, including for
        // the half-precision storage types.
        fn unit<T: WithDType>() -> f64 {
            let one: T = num_traits::cast(1.0f64).unwrap();
            one.to_f64()
        }
        assert_eq!(unit::<half::f16>(), 1.0);
        assert_eq!(unit::<half::bf16>(), 1.0);
        assert_eq!(unit::<f32>(), 1.0);
        assert_eq!(unit::<i8>(), 1.0);
    }

    #[test]
    fn test_materialize_quantized_clamps() {
        assert_eq!(DType::QI8.materialize(300.0), 127.0);
        assert_eq!(DType::QI8.materialize(-300.0), -128.0);
        assert_eq!(DType::QI8.materialize(12.4), 12.0);
        assert_eq!(DType::QU8.materialize(-1.0), 0.0);
        assert_eq!(DType::I1.materialize(7.0), 1.0);
    }
}
