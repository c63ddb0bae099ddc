// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Conversions between value kinds.
//!
//! Every conversion is range-checked: narrowing integers fail with
//! [`ConvertError::Overflow`], floats must be integral to become integers,
//! and integers must be exactly representable to become floats.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;
use ordered_float::OrderedFloat;
use uuid::Uuid;

use crate::adt::{parse_magnitude, ParseWideIntError, I256, U256};
use crate::error::ConvertError;
use crate::value::{Decimal, Value, ValueKind};

impl Value {
    /// Returns this value's kind.
    pub fn kind(&self) -> ValueKind {
        ValueKind::from(self)
    }

    /// Converts this value to kind `to`.
    ///
    /// Converting to the value's own kind is a clone. `Null` converts to
    /// nothing but `Null`.
    pub fn convert(&self, to: ValueKind) -> Result<Value, ConvertError> {
        let from = self.kind();
        if from == to {
            return Ok(self.clone());
        }
        if from == ValueKind::Null {
            return Err(ConvertError::UnexpectedNull { to });
        }
        match to {
            ValueKind::Int8
            | ValueKind::Int16
            | ValueKind::Int32
            | ValueKind::Int64
            | ValueKind::Int128
            | ValueKind::Int256
            | ValueKind::UInt8
            | ValueKind::UInt16
            | ValueKind::UInt32
            | ValueKind::UInt64
            | ValueKind::UInt128
            | ValueKind::UInt256 => Integer::of(self, to)?.into_value(self, to),
            ValueKind::Float32 | ValueKind::Float64 => to_float(self, to),
            ValueKind::Bool => to_bool(self),
            ValueKind::Decimal => to_decimal(self),
            ValueKind::String => to_string(self),
            ValueKind::Bytes => match self {
                Value::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec())),
                _ => Err(incompatible(self, to)),
            },
            ValueKind::Date => to_date(self),
            ValueKind::DateTime => to_datetime(self),
            ValueKind::Uuid => to_uuid(self),
            ValueKind::Ipv4 => to_ipv4(self),
            ValueKind::Ipv6 => to_ipv6(self),
            ValueKind::Null | ValueKind::Array | ValueKind::Map => Err(incompatible(self, to)),
        }
    }
}

fn incompatible(value: &Value, to: ValueKind) -> ConvertError {
    ConvertError::Incompatible {
        from: value.kind(),
        to,
    }
}

fn overflow(value: &Value, to: ValueKind) -> ConvertError {
    ConvertError::Overflow {
        value: value.to_string(),
        to,
    }
}

fn precision_loss(value: &Value, to: ValueKind) -> ConvertError {
    ConvertError::PrecisionLoss {
        value: value.to_string(),
        to,
    }
}

fn invalid(value: &Value, to: ValueKind, reason: impl ToString) -> ConvertError {
    ConvertError::Invalid {
        value: value.to_string(),
        to,
        reason: reason.to_string(),
    }
}

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// A sign and magnitude wide enough for any integer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Integer {
    negative: bool,
    magnitude: U256,
}

impl Integer {
    fn signed(v: impl Into<i128>) -> Integer {
        let v = v.into();
        Integer {
            negative: v < 0,
            magnitude: U256::from(v.unsigned_abs()),
        }
    }

    fn unsigned(v: impl Into<u128>) -> Integer {
        Integer {
            negative: false,
            magnitude: U256::from(v.into()),
        }
    }

    /// Extracts the integer held by `value`, on the way to kind `to`.
    fn of(value: &Value, to: ValueKind) -> Result<Integer, ConvertError> {
        let integer = match value {
            Value::Bool(v) => Integer::unsigned(u8::from(*v)),
            Value::Int8(v) => Integer::signed(*v),
            Value::Int16(v) => Integer::signed(*v),
            Value::Int32(v) => Integer::signed(*v),
            Value::Int64(v) => Integer::signed(*v),
            Value::Int128(v) => Integer::signed(*v),
            Value::Int256(v) => Integer {
                negative: v.is_negative(),
                magnitude: v.unsigned_abs(),
            },
            Value::UInt8(v) => Integer::unsigned(*v),
            Value::UInt16(v) => Integer::unsigned(*v),
            Value::UInt32(v) => Integer::unsigned(*v),
            Value::UInt64(v) => Integer::unsigned(*v),
            Value::UInt128(v) => Integer::unsigned(*v),
            Value::UInt256(v) => Integer {
                negative: false,
                magnitude: *v,
            },
            Value::Float32(v) => Integer::of_float(value, f64::from(v.into_inner()), to)?,
            Value::Float64(v) => Integer::of_float(value, v.into_inner(), to)?,
            Value::Decimal(d) => {
                let d = d.rescale(0).map_err(|_| precision_loss(value, to))?;
                Integer {
                    negative: d.unscaled.is_negative(),
                    magnitude: d.unscaled.unsigned_abs(),
                }
            }
            Value::String(s) => match parse_magnitude(s.trim()) {
                Ok((negative, magnitude)) => Integer {
                    negative: negative && magnitude != U256::ZERO,
                    magnitude,
                },
                Err(ParseWideIntError::OutOfRange(_)) => return Err(overflow(value, to)),
                Err(e @ ParseWideIntError::InvalidDigit(_)) => return Err(invalid(value, to, e)),
            },
            Value::Date(d) => Integer::signed(d.signed_duration_since(epoch()).num_days()),
            Value::DateTime(dt) => {
                if dt.timestamp_subsec_nanos() != 0 {
                    return Err(precision_loss(value, to));
                }
                Integer::signed(dt.timestamp())
            }
            Value::Ipv4(ip) => Integer::unsigned(u32::from(*ip)),
            _ => return Err(incompatible(value, to)),
        };
        Ok(integer)
    }

    fn of_float(value: &Value, f: f64, to: ValueKind) -> Result<Integer, ConvertError> {
        if f.is_nan() {
            return Err(invalid(value, to, "NaN has no integer value"));
        }
        if f.is_infinite() {
            return Err(overflow(value, to));
        }
        if f.fract() != 0.0 {
            return Err(precision_loss(value, to));
        }
        let magnitude = U256::try_from_f64(f.abs()).ok_or_else(|| overflow(value, to))?;
        Ok(Integer {
            negative: f < 0.0 && magnitude != U256::ZERO,
            magnitude,
        })
    }

    fn to_i128(self) -> Option<i128> {
        let m = self.magnitude.to_u128()?;
        if self.negative {
            if m > 1 << 127 {
                return None;
            }
            #[allow(clippy::cast_possible_wrap)]
            let m = m as i128;
            Some(m.wrapping_neg())
        } else {
            i128::try_from(m).ok()
        }
    }

    fn to_u128(self) -> Option<u128> {
        if self.negative {
            None
        } else {
            self.magnitude.to_u128()
        }
    }

    fn to_i64(self) -> Option<i64> {
        self.to_i128().and_then(|v| i64::try_from(v).ok())
    }

    fn into_value(self, source: &Value, to: ValueKind) -> Result<Value, ConvertError> {
        fn narrow<T: TryFrom<i128>>(v: Option<i128>) -> Option<T> {
            v.and_then(|v| T::try_from(v).ok())
        }
        fn narrow_u<T: TryFrom<u128>>(v: Option<u128>) -> Option<T> {
            v.and_then(|v| T::try_from(v).ok())
        }
        let value = match to {
            ValueKind::Int8 => narrow(self.to_i128()).map(Value::Int8),
            ValueKind::Int16 => narrow(self.to_i128()).map(Value::Int16),
            ValueKind::Int32 => narrow(self.to_i128()).map(Value::Int32),
            ValueKind::Int64 => narrow(self.to_i128()).map(Value::Int64),
            ValueKind::Int128 => self.to_i128().map(Value::Int128),
            ValueKind::Int256 => {
                I256::from_sign_magnitude(self.negative, self.magnitude).map(Value::Int256)
            }
            ValueKind::UInt8 => narrow_u(self.to_u128()).map(Value::UInt8),
            ValueKind::UInt16 => narrow_u(self.to_u128()).map(Value::UInt16),
            ValueKind::UInt32 => narrow_u(self.to_u128()).map(Value::UInt32),
            ValueKind::UInt64 => narrow_u(self.to_u128()).map(Value::UInt64),
            ValueKind::UInt128 => self.to_u128().map(Value::UInt128),
            ValueKind::UInt256 => (!self.negative).then_some(Value::UInt256(self.magnitude)),
            _ => return Err(incompatible(source, to)),
        };
        value.ok_or_else(|| overflow(source, to))
    }

    /// Converts to a float, failing unless the result is exact.
    fn to_f64_exact(self, source: &Value, to: ValueKind) -> Result<f64, ConvertError> {
        let magnitude = self.magnitude.to_f64();
        if U256::try_from_f64(magnitude) != Some(self.magnitude) {
            return Err(precision_loss(source, to));
        }
        Ok(if self.negative { -magnitude } else { magnitude })
    }
}

fn to_float(value: &Value, to: ValueKind) -> Result<Value, ConvertError> {
    let f = match value {
        Value::Float32(v) => f64::from(v.into_inner()),
        Value::Float64(v) => v.into_inner(),
        // Decimal and textual inputs are parsed at the target width directly
        // so that e.g. "0.1" becomes the nearest f32, not a rounded f64.
        Value::Decimal(d) => return parse_float(value, &d.to_string(), to),
        Value::String(s) => return parse_float(value, s.trim(), to),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Int8(_)
        | Value::Int16(_)
        | Value::Int32(_)
        | Value::Int64(_)
        | Value::Int128(_)
        | Value::Int256(_)
        | Value::UInt8(_)
        | Value::UInt16(_)
        | Value::UInt32(_)
        | Value::UInt64(_)
        | Value::UInt128(_)
        | Value::UInt256(_) => Integer::of(value, to)?.to_f64_exact(value, to)?,
        _ => return Err(incompatible(value, to)),
    };
    if to == ValueKind::Float64 {
        return Ok(Value::Float64(OrderedFloat(f)));
    }
    #[allow(clippy::cast_possible_truncation)]
    let narrowed = f as f32;
    if f.is_finite() && narrowed.is_infinite() {
        return Err(overflow(value, to));
    }
    if !f.is_nan() && f64::from(narrowed) != f {
        return Err(precision_loss(value, to));
    }
    Ok(Value::Float32(OrderedFloat(narrowed)))
}

fn parse_float(value: &Value, s: &str, to: ValueKind) -> Result<Value, ConvertError> {
    if to == ValueKind::Float32 {
        s.parse::<f32>()
            .map(|f| Value::Float32(OrderedFloat(f)))
            .map_err(|e| invalid(value, to, e))
    } else {
        s.parse::<f64>()
            .map(|f| Value::Float64(OrderedFloat(f)))
            .map_err(|e| invalid(value, to, e))
    }
}

fn to_bool(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::Bool;
    if let Value::String(s) = value {
        return match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(invalid(value, to, "expected true or false")),
        };
    }
    let integer = Integer::of(value, to)?;
    match integer.to_u128() {
        Some(0) => Ok(Value::Bool(false)),
        Some(1) => Ok(Value::Bool(true)),
        _ => Err(overflow(value, to)),
    }
}

fn to_decimal(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::Decimal;
    match value {
        Value::String(s) => s.trim().parse().map(Value::Decimal),
        Value::Float32(v) if !v.is_finite() => Err(invalid(value, to, "not a finite number")),
        Value::Float64(v) if !v.is_finite() => Err(invalid(value, to, "not a finite number")),
        // The shortest round-tripping text is the decimal the float stands
        // for.
        Value::Float32(_) | Value::Float64(_) => value.to_string().parse().map(Value::Decimal),
        _ => {
            let integer = Integer::of(value, to)?;
            let unscaled = I256::from_sign_magnitude(integer.negative, integer.magnitude)
                .ok_or_else(|| overflow(value, to))?;
            Ok(Value::Decimal(Decimal { unscaled, scale: 0 }))
        }
    }
}

fn to_string(value: &Value) -> Result<Value, ConvertError> {
    match value {
        Value::Bytes(b) => String::from_utf8(b.clone())
            .map(Value::String)
            .map_err(|e| invalid(value, ValueKind::String, e)),
        Value::Array(_) | Value::Map(_) => Err(incompatible(value, ValueKind::String)),
        _ => Ok(Value::String(value.to_string())),
    }
}

fn to_date(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::Date;
    match value {
        Value::DateTime(dt) => {
            if dt.time() != NaiveTime::MIN {
                return Err(precision_loss(value, to));
            }
            Ok(Value::Date(dt.date_naive()))
        }
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|e| invalid(value, to, e)),
        _ => {
            let days = Integer::of(value, to)?
                .to_i64()
                .and_then(TimeDelta::try_days)
                .ok_or_else(|| overflow(value, to))?;
            epoch()
                .checked_add_signed(days)
                .map(Value::Date)
                .ok_or_else(|| overflow(value, to))
        }
    }
}

fn to_datetime(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::DateTime;
    match value {
        Value::Date(d) => Ok(Value::DateTime(
            d.and_time(NaiveTime::MIN).and_utc().with_timezone(&Tz::UTC),
        )),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(Value::DateTime(dt.with_timezone(&Tz::UTC)));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map(|dt| Value::DateTime(dt.and_utc().with_timezone(&Tz::UTC)))
                .map_err(|e| invalid(value, to, e))
        }
        _ => {
            let secs = Integer::of(value, to)?
                .to_i64()
                .ok_or_else(|| overflow(value, to))?;
            DateTime::from_timestamp(secs, 0)
                .map(|dt| Value::DateTime(dt.with_timezone(&Tz::UTC)))
                .ok_or_else(|| overflow(value, to))
        }
    }
}

fn to_uuid(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::Uuid;
    match value {
        Value::String(s) => Uuid::parse_str(s.trim())
            .map(Value::Uuid)
            .map_err(|e| invalid(value, to, e)),
        Value::Bytes(b) => Uuid::from_slice(b)
            .map(Value::Uuid)
            .map_err(|e| invalid(value, to, e)),
        Value::UInt128(v) => Ok(Value::Uuid(Uuid::from_u128(*v))),
        _ => Err(incompatible(value, to)),
    }
}

fn to_ipv4(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::Ipv4;
    match value {
        Value::String(s) => s
            .trim()
            .parse::<Ipv4Addr>()
            .map(Value::Ipv4)
            .map_err(|e| invalid(value, to, e)),
        Value::Ipv6(ip) => ip
            .to_ipv4_mapped()
            .map(Value::Ipv4)
            .ok_or_else(|| overflow(value, to)),
        _ => {
            let v = Integer::of(value, to)?
                .to_u128()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| overflow(value, to))?;
            Ok(Value::Ipv4(Ipv4Addr::from(v)))
        }
    }
}

fn to_ipv6(value: &Value) -> Result<Value, ConvertError> {
    let to = ValueKind::Ipv6;
    match value {
        Value::String(s) => s
            .trim()
            .parse::<Ipv6Addr>()
            .map(Value::Ipv6)
            .map_err(|e| invalid(value, to, e)),
        Value::Ipv4(ip) => Ok(Value::Ipv6(ip.to_ipv6_mapped())),
        Value::Bytes(b) => <[u8; 16]>::try_from(b.as_slice())
            .map(|octets| Value::Ipv6(Ipv6Addr::from(octets)))
            .map_err(|_| invalid(value, to, "expected 16 bytes")),
        _ => Err(incompatible(value, to)),
    }
}
