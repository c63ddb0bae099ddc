// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Runtime-typed values.
//!
//! Most call sites know their column types statically and use
//! [`crate::ColumnAppend`] and [`crate::ColumnRead`]. The rest (query
//! parameters, rows built from JSON documents, generic result printers) go
//! through [`Value`]: a closed enum of every kind the codec can represent.
//! Moving a value between kinds is always explicit, via [`Value::convert`],
//! and never silently truncates.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::NaiveDate;
use chrono_tz::Tz;
use enum_kinds::EnumKind;
use ordered_float::OrderedFloat;
use uuid::Uuid;

use crate::adt::{parse_magnitude, ParseWideIntError, I256, U256};
use crate::column::Column;
use crate::error::{ColumnError, ConvertError};

mod convert;

/// A dynamically typed value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumKind)]
#[enum_kind(ValueKind, derive(Hash, PartialOrd, Ord))]
pub enum Value {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// An 8-bit signed integer.
    Int8(i8),
    /// A 16-bit signed integer.
    Int16(i16),
    /// A 32-bit signed integer.
    Int32(i32),
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 128-bit signed integer.
    Int128(i128),
    /// A 256-bit signed integer.
    Int256(I256),
    /// An 8-bit unsigned integer.
    UInt8(u8),
    /// A 16-bit unsigned integer.
    UInt16(u16),
    /// A 32-bit unsigned integer.
    UInt32(u32),
    /// A 64-bit unsigned integer.
    UInt64(u64),
    /// A 128-bit unsigned integer.
    UInt128(u128),
    /// A 256-bit unsigned integer.
    UInt256(U256),
    /// A 32-bit float.
    Float32(OrderedFloat<f32>),
    /// A 64-bit float.
    Float64(OrderedFloat<f64>),
    /// An exact decimal.
    Decimal(Decimal),
    /// A UTF-8 string.
    String(String),
    /// An arbitrary byte string.
    Bytes(Vec<u8>),
    /// A calendar date.
    Date(NaiveDate),
    /// An instant, presented in a timezone.
    DateTime(chrono::DateTime<Tz>),
    /// A UUID.
    Uuid(Uuid),
    /// An IPv4 address.
    Ipv4(Ipv4Addr),
    /// An IPv6 address.
    Ipv6(Ipv6Addr),
    /// A list of values.
    Array(Vec<Value>),
    /// An ordered list of key/value pairs.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Reports whether the value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// An exact decimal number: `unscaled / 10^scale`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Decimal {
    /// The integer before scaling.
    pub unscaled: I256,
    /// The number of digits after the decimal point.
    pub scale: u32,
}

impl Decimal {
    /// Constructs a decimal from its parts.
    pub fn new(unscaled: impl Into<I256>, scale: u32) -> Decimal {
        Decimal {
            unscaled: unscaled.into(),
            scale,
        }
    }

    /// Converts to the nearest `f64`.
    pub fn to_f64(&self) -> f64 {
        self.unscaled.to_f64() / 10f64.powi(i32::try_from(self.scale).unwrap_or(i32::MAX))
    }

    /// Returns the same number at `scale` digits, failing if digits would be
    /// dropped or the unscaled integer overflows.
    pub fn rescale(&self, scale: u32) -> Result<Decimal, ConvertError> {
        let negative = self.unscaled.is_negative();
        let mut magnitude = self.unscaled.unsigned_abs();
        if scale >= self.scale {
            for _ in self.scale..scale {
                magnitude = magnitude
                    .checked_mul_add(10, 0)
                    .ok_or_else(|| ConvertError::Overflow {
                        value: self.to_string(),
                        to: ValueKind::Decimal,
                    })?;
            }
        } else {
            for _ in scale..self.scale {
                let (q, r) = magnitude.div_rem(10);
                if r != 0 {
                    return Err(ConvertError::PrecisionLoss {
                        value: self.to_string(),
                        to: ValueKind::Decimal,
                    });
                }
                magnitude = q;
            }
        }
        let unscaled = I256::from_sign_magnitude(negative, magnitude).ok_or_else(|| {
            ConvertError::Overflow {
                value: self.to_string(),
                to: ValueKind::Decimal,
            }
        })?;
        Ok(Decimal { unscaled, scale })
    }

    /// Returns the number of decimal digits in the unscaled integer.
    pub fn digits(&self) -> u32 {
        let mut magnitude = self.unscaled.unsigned_abs().div_rem(10).0;
        let mut digits = 1;
        while magnitude != U256::ZERO {
            magnitude = magnitude.div_rem(10).0;
            digits += 1;
        }
        digits
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.unsigned_abs().to_string();
        if self.unscaled.is_negative() {
            f.write_str("-")?;
        }
        let scale = usize::try_from(self.scale).unwrap_or(usize::MAX);
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{digits:0>scale$}")
        }
    }
}

impl FromStr for Decimal {
    type Err = ConvertError;

    /// Parses `[-+]digits[.digits]`, keeping every written fractional digit
    /// as scale.
    fn from_str(s: &str) -> Result<Decimal, ConvertError> {
        let invalid = |reason: &str| ConvertError::Invalid {
            value: s.into(),
            to: ValueKind::Decimal,
            reason: reason.into(),
        };
        let trimmed = s.trim();
        let (int, frac) = match trimmed.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (trimmed, ""),
        };
        if frac.starts_with(['-', '+']) || (frac.is_empty() && trimmed.ends_with('.')) {
            return Err(invalid("malformed fraction"));
        }
        let (negative, magnitude) = parse_magnitude(&format!("{int}{frac}")).map_err(|e| {
            match e {
                ParseWideIntError::OutOfRange(_) => ConvertError::Overflow {
                    value: s.into(),
                    to: ValueKind::Decimal,
                },
                ParseWideIntError::InvalidDigit(_) => invalid("not a decimal number"),
            }
        })?;
        let unscaled =
            I256::from_sign_magnitude(negative, magnitude).ok_or_else(|| ConvertError::Overflow {
                value: s.into(),
                to: ValueKind::Decimal,
            })?;
        let scale = u32::try_from(frac.len()).map_err(|_| invalid("too many digits"))?;
        Ok(Decimal { unscaled, scale })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Int128(v) => write!(f, "{v}"),
            Value::Int256(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::UInt128(v) => write!(f, "{v}"),
            Value::UInt256(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Ipv4(v) => write!(f, "{v}"),
            Value::Ipv6(v) => write!(f, "{v}"),
            Value::Array(vs) => {
                f.write_str("[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Map(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Value {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    I256 => Int256,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    U256 => UInt256,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
    NaiveDate => Date,
    chrono::DateTime<Tz> => DateTime,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(v: [u8; N]) -> Value {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map_or(Value::Null, Into::into)
    }
}

/// A type that can be extracted from a [`Value`].
///
/// Extraction converts the value to the type's kind with
/// [`Value::convert`] first, so e.g. an `i64` can be scanned out of a
/// `UInt8` column, but not a `u8` out of an `Int64` row holding `300`.
pub trait FromValue: Sized {
    /// Performs the extraction.
    fn from_value(value: &Value) -> Result<Self, ConvertError>;
}

macro_rules! from_value {
    ($($t:ty => $variant:ident($v:ident) => $extract:expr),* $(,)?) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<$t, ConvertError> {
                    match value.convert(ValueKind::$variant)? {
                        Value::$variant($v) => Ok($extract),
                        other => Err(ConvertError::Incompatible {
                            from: ValueKind::from(&other),
                            to: ValueKind::$variant,
                        }),
                    }
                }
            }
        )*
    };
}

from_value! {
    bool => Bool(v) => v,
    i8 => Int8(v) => v,
    i16 => Int16(v) => v,
    i32 => Int32(v) => v,
    i64 => Int64(v) => v,
    i128 => Int128(v) => v,
    I256 => Int256(v) => v,
    u8 => UInt8(v) => v,
    u16 => UInt16(v) => v,
    u32 => UInt32(v) => v,
    u64 => UInt64(v) => v,
    u128 => UInt128(v) => v,
    U256 => UInt256(v) => v,
    f32 => Float32(v) => v.into_inner(),
    f64 => Float64(v) => v.into_inner(),
    Decimal => Decimal(v) => v,
    String => String(v) => v,
    NaiveDate => Date(v) => v,
    chrono::DateTime<Tz> => DateTime(v) => v,
    Uuid => Uuid(v) => v,
    Ipv4Addr => Ipv4(v) => v,
    Ipv6Addr => Ipv6(v) => v,
}

impl<const N: usize> FromValue for [u8; N] {
    /// Extracts a `FixedString(N)` value, zero-padding shorter inputs.
    fn from_value(value: &Value) -> Result<[u8; N], ConvertError> {
        let bytes = match value {
            Value::Bytes(b) => b.as_slice(),
            Value::String(s) => s.as_bytes(),
            Value::Null => {
                return Err(ConvertError::UnexpectedNull {
                    to: ValueKind::Bytes,
                })
            }
            other => {
                return Err(ConvertError::Incompatible {
                    from: ValueKind::from(other),
                    to: ValueKind::Bytes,
                })
            }
        };
        if bytes.len() > N {
            return Err(ConvertError::Overflow {
                value: value.to_string(),
                to: ValueKind::Bytes,
            });
        }
        let mut out = [0; N];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(out)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Option<T>, ConvertError> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    /// Extracts an array. Byte strings extract element-wise as `UInt8`s.
    fn from_value(value: &Value) -> Result<Vec<T>, ConvertError> {
        match value {
            Value::Array(vs) => vs.iter().map(T::from_value).collect(),
            Value::Bytes(bs) => bs.iter().map(|b| T::from_value(&Value::UInt8(*b))).collect(),
            Value::Null => Err(ConvertError::UnexpectedNull {
                to: ValueKind::Array,
            }),
            other => Err(ConvertError::Incompatible {
                from: ValueKind::from(other),
                to: ValueKind::Array,
            }),
        }
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    /// Extracts a map. Later duplicate keys win.
    fn from_value(value: &Value) -> Result<BTreeMap<K, V>, ConvertError> {
        match value {
            Value::Map(pairs) => pairs
                .iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            Value::Null => Err(ConvertError::UnexpectedNull { to: ValueKind::Map }),
            other => Err(ConvertError::Incompatible {
                from: ValueKind::from(other),
                to: ValueKind::Map,
            }),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Value, ConvertError> {
        Ok(value.clone())
    }
}

/// Projects row `row` of `column` into a `T`, failing rather than truncating.
///
/// # Panics
///
/// Panics if `row` is out of bounds.
pub fn scan<T: FromValue>(column: &dyn Column, row: usize) -> Result<T, ColumnError> {
    T::from_value(&column.row_any(row)).map_err(|e| e.at_row(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_display() {
        assert_eq!(Decimal::new(12345i64, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5i64, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(7i64, 0).to_string(), "7");
    }

    #[test]
    fn test_decimal_parse() {
        assert_eq!("123.45".parse::<Decimal>(), Ok(Decimal::new(12345i64, 2)));
        assert_eq!("-0.005".parse::<Decimal>(), Ok(Decimal::new(-5i64, 3)));
        assert_eq!("42".parse::<Decimal>(), Ok(Decimal::new(42i64, 0)));
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("1.".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_rescale() {
        let d = Decimal::new(1234i64, 2);
        assert_eq!(d.rescale(4), Ok(Decimal::new(123400i64, 4)));
        assert_eq!(Decimal::new(1200i64, 2).rescale(0), Ok(Decimal::new(12i64, 0)));
        assert!(matches!(
            d.rescale(1),
            Err(ConvertError::PrecisionLoss { .. })
        ));
        assert_eq!(d.digits(), 4);
        assert_eq!(Decimal::new(0i64, 0).digits(), 1);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(i64::from_value(&Value::UInt8(7)), Ok(7));
        assert_eq!(Option::<i8>::from_value(&Value::Null), Ok(None));
        assert_eq!(
            Vec::<u16>::from_value(&Value::Bytes(vec![1, 2])),
            Ok(vec![1, 2])
        );
        assert_eq!(<[u8; 3]>::from_value(&Value::from("ab")), Ok([b'a', b'b', 0]));
        assert!(matches!(
            <[u8; 1]>::from_value(&Value::from("ab")),
            Err(ConvertError::Overflow { .. })
        ));
        assert!(matches!(
            u8::from_value(&Value::Int64(300)),
            Err(ConvertError::Overflow { .. })
        ));
        let map = BTreeMap::<String, u64>::from_value(&Value::Map(vec![
            (Value::from("a"), Value::UInt8(1)),
            (Value::from("b"), Value::UInt8(2)),
        ]))
        .unwrap();
        assert_eq!(map.get("b"), Some(&2));
    }
}
