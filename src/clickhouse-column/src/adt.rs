// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! 256-bit integers for `Int256`, `UInt256` and `Decimal256`.
//!
//! These types carry just enough arithmetic for the codec: conversion to and
//! from the wire's little-endian bytes, narrower integers, floats and decimal
//! text. They are not general purpose big integers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// An error parsing a 256-bit integer from text.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseWideIntError {
    /// The text is not a decimal integer.
    #[error("invalid digit in {0:?}")]
    InvalidDigit(String),
    /// The integer does not fit.
    #[error("{0} is out of range")]
    OutOfRange(String),
}

/// A signed 256-bit two's complement integer.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct I256 {
    // Field order matters for the derived `Ord`.
    hi: i128,
    lo: u128,
}

/// An unsigned 256-bit integer.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U256 {
    hi: u128,
    lo: u128,
}

const TWO_POW_128: f64 = 340_282_366_920_938_463_463_374_607_431_768_211_456.0;
const TWO_POW_255: f64 = TWO_POW_128 * 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
const TWO_POW_256: f64 = TWO_POW_255 * 2.0;

impl U256 {
    /// Zero.
    pub const ZERO: U256 = U256 { hi: 0, lo: 0 };
    /// The largest value.
    pub const MAX: U256 = U256 {
        hi: u128::MAX,
        lo: u128::MAX,
    };

    /// Constructs a value from its high and low halves.
    pub const fn from_parts(hi: u128, lo: u128) -> U256 {
        U256 { hi, lo }
    }

    /// Decodes the little-endian wire representation.
    pub fn from_le_bytes(bytes: [u8; 32]) -> U256 {
        let (lo, hi) = split_halves(bytes);
        U256 {
            hi: u128::from_le_bytes(hi),
            lo: u128::from_le_bytes(lo),
        }
    }

    /// Encodes the little-endian wire representation.
    pub fn to_le_bytes(self) -> [u8; 32] {
        join_halves(self.lo.to_le_bytes(), self.hi.to_le_bytes())
    }

    /// Returns the value as a `u128` if it fits.
    pub fn to_u128(self) -> Option<u128> {
        (self.hi == 0).then_some(self.lo)
    }

    /// Returns `10^exp`, or `None` on overflow.
    pub fn pow10(exp: u32) -> Option<U256> {
        let mut limbs = [1, 0, 0, 0];
        for _ in 0..exp {
            if mul_add_small(&mut limbs, 10, 0) {
                return None;
            }
        }
        Some(U256::from_limbs(limbs))
    }

    /// Multiplies by `m` and adds `a`, returning `None` on overflow.
    pub fn checked_mul_add(self, m: u64, a: u64) -> Option<U256> {
        let mut limbs = self.limbs();
        (!mul_add_small(&mut limbs, m, a)).then(|| U256::from_limbs(limbs))
    }

    /// Divides by `d`, returning the quotient and remainder.
    ///
    /// # Panics
    ///
    /// Panics if `d` is zero.
    pub fn div_rem(self, d: u64) -> (U256, u64) {
        let mut limbs = self.limbs();
        let rem = div_rem_small(&mut limbs, d);
        (U256::from_limbs(limbs), rem)
    }

    /// Converts to the nearest `f64`.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.hi as f64 * TWO_POW_128 + self.lo as f64
    }

    /// Converts from an `f64`, truncating towards zero and saturating at the
    /// bounds. NaN converts to zero.
    pub fn from_f64(f: f64) -> U256 {
        if f.is_nan() || f <= 0.0 {
            U256::ZERO
        } else if f >= TWO_POW_256 {
            U256::MAX
        } else {
            from_f64_magnitude(f.trunc())
        }
    }

    /// Converts from an `f64` exactly, or returns `None` if `f` is negative,
    /// fractional or out of range.
    pub fn try_from_f64(f: f64) -> Option<U256> {
        if !f.is_finite() || f < 0.0 || f.fract() != 0.0 || f >= TWO_POW_256 {
            return None;
        }
        Some(from_f64_magnitude(f))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn limbs(self) -> [u64; 4] {
        [
            self.lo as u64,
            (self.lo >> 64) as u64,
            self.hi as u64,
            (self.hi >> 64) as u64,
        ]
    }

    fn from_limbs(limbs: [u64; 4]) -> U256 {
        U256 {
            lo: u128::from(limbs[0]) | (u128::from(limbs[1]) << 64),
            hi: u128::from(limbs[2]) | (u128::from(limbs[3]) << 64),
        }
    }
}

impl I256 {
    /// Zero.
    pub const ZERO: I256 = I256 { hi: 0, lo: 0 };
    /// The smallest value.
    pub const MIN: I256 = I256 {
        hi: i128::MIN,
        lo: 0,
    };
    /// The largest value.
    pub const MAX: I256 = I256 {
        hi: i128::MAX,
        lo: u128::MAX,
    };

    /// Decodes the little-endian wire representation.
    pub fn from_le_bytes(bytes: [u8; 32]) -> I256 {
        let (lo, hi) = split_halves(bytes);
        I256 {
            hi: i128::from_le_bytes(hi),
            lo: u128::from_le_bytes(lo),
        }
    }

    /// Encodes the little-endian wire representation.
    pub fn to_le_bytes(self) -> [u8; 32] {
        join_halves(self.lo.to_le_bytes(), self.hi.to_le_bytes())
    }

    /// Reports whether the value is below zero.
    pub fn is_negative(self) -> bool {
        self.hi < 0
    }

    /// Returns the two's complement negation, wrapping at `MIN`.
    pub fn wrapping_neg(self) -> I256 {
        let lo = (!self.lo).wrapping_add(1);
        let hi = (!self.hi).wrapping_add(i128::from(lo == 0));
        I256 { hi, lo }
    }

    /// Returns the absolute value, which always fits a [`U256`].
    pub fn unsigned_abs(self) -> U256 {
        let abs = if self.is_negative() {
            self.wrapping_neg()
        } else {
            self
        };
        #[allow(clippy::cast_sign_loss)]
        let hi = abs.hi as u128;
        U256 { hi, lo: abs.lo }
    }

    /// Constructs a value from a sign and magnitude, or returns `None` if it
    /// doesn't fit.
    pub fn from_sign_magnitude(negative: bool, magnitude: U256) -> Option<I256> {
        #[allow(clippy::cast_possible_wrap)]
        let value = I256 {
            hi: magnitude.hi as i128,
            lo: magnitude.lo,
        };
        if negative {
            match magnitude.hi.cmp(&(1 << 127)) {
                Ordering::Less => Some(value.wrapping_neg()),
                Ordering::Equal if magnitude.lo == 0 => Some(I256::MIN),
                _ => None,
            }
        } else {
            (!value.is_negative()).then_some(value)
        }
    }

    /// Returns the value as an `i128` if it fits.
    pub fn to_i128(self) -> Option<i128> {
        #[allow(clippy::cast_possible_wrap)]
        let lo = self.lo as i128;
        match self.hi {
            0 if lo >= 0 => Some(lo),
            -1 if lo < 0 => Some(lo),
            _ => None,
        }
    }

    /// Converts to the nearest `f64`.
    pub fn to_f64(self) -> f64 {
        let magnitude = self.unsigned_abs().to_f64();
        if self.is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Converts from an `f64`, truncating towards zero and saturating at the
    /// bounds. NaN converts to zero.
    pub fn from_f64(f: f64) -> I256 {
        if f.is_nan() {
            I256::ZERO
        } else if f >= TWO_POW_255 {
            I256::MAX
        } else if f <= -TWO_POW_255 {
            I256::MIN
        } else {
            let magnitude = from_f64_magnitude(f.abs().trunc());
            I256::from_sign_magnitude(f < 0.0, magnitude).unwrap_or(I256::ZERO)
        }
    }
}

impl From<i128> for I256 {
    #[allow(clippy::cast_sign_loss)]
    fn from(v: i128) -> I256 {
        I256 {
            hi: if v < 0 { -1 } else { 0 },
            lo: v as u128,
        }
    }
}

macro_rules! wide_from {
    ($wide:ty, $via:ty, $($t:ty),*) => {
        $(
            impl From<$t> for $wide {
                fn from(v: $t) -> $wide {
                    <$wide>::from(<$via>::from(v))
                }
            }
        )*
    };
}

wide_from!(I256, i128, i8, i16, i32, i64);
wide_from!(U256, u128, u8, u16, u32, u64);

impl From<u128> for U256 {
    fn from(v: u128) -> U256 {
        U256 { hi: 0, lo: v }
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = self.to_u128() {
            return write!(f, "{v}");
        }
        // Peel off 19 digits at a time, the most that fit in a u64.
        const CHUNK: u64 = 10_000_000_000_000_000_000;
        let mut chunks = vec![];
        let mut rest = *self;
        while rest != U256::ZERO {
            let (q, r) = rest.div_rem(CHUNK);
            chunks.push(r);
            rest = q;
        }
        let mut chunks = chunks.into_iter().rev();
        if let Some(first) = chunks.next() {
            write!(f, "{first}")?;
        }
        for chunk in chunks {
            write!(f, "{chunk:019}")?;
        }
        Ok(())
    }
}

impl fmt::Display for I256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        write!(f, "{}", self.unsigned_abs())
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Debug for I256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Parses an optionally signed run of decimal digits into a sign and
/// magnitude.
pub(crate) fn parse_magnitude(s: &str) -> Result<(bool, U256), ParseWideIntError> {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() {
        return Err(ParseWideIntError::InvalidDigit(s.into()));
    }
    let mut magnitude = U256::ZERO;
    for ch in digits.chars() {
        let digit = ch
            .to_digit(10)
            .ok_or_else(|| ParseWideIntError::InvalidDigit(s.into()))?;
        magnitude = magnitude
            .checked_mul_add(10, u64::from(digit))
            .ok_or_else(|| ParseWideIntError::OutOfRange(s.into()))?;
    }
    Ok((negative, magnitude))
}

impl FromStr for U256 {
    type Err = ParseWideIntError;

    fn from_str(s: &str) -> Result<U256, ParseWideIntError> {
        match parse_magnitude(s)? {
            (true, m) if m != U256::ZERO => Err(ParseWideIntError::OutOfRange(s.into())),
            (_, m) => Ok(m),
        }
    }
}

impl FromStr for I256 {
    type Err = ParseWideIntError;

    fn from_str(s: &str) -> Result<I256, ParseWideIntError> {
        let (negative, magnitude) = parse_magnitude(s)?;
        I256::from_sign_magnitude(negative, magnitude)
            .ok_or_else(|| ParseWideIntError::OutOfRange(s.into()))
    }
}

fn split_halves(bytes: [u8; 32]) -> ([u8; 16], [u8; 16]) {
    let mut lo = [0; 16];
    let mut hi = [0; 16];
    lo.copy_from_slice(&bytes[..16]);
    hi.copy_from_slice(&bytes[16..]);
    (lo, hi)
}

fn join_halves(lo: [u8; 16], hi: [u8; 16]) -> [u8; 32] {
    let mut bytes = [0; 32];
    bytes[..16].copy_from_slice(&lo);
    bytes[16..].copy_from_slice(&hi);
    bytes
}

/// Converts a non-negative integral `f` below 2^256.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_f64_magnitude(f: f64) -> U256 {
    let hi = (f / TWO_POW_128).floor();
    let lo = f - hi * TWO_POW_128;
    U256 {
        hi: hi as u128,
        lo: lo as u128,
    }
}

/// Computes `limbs * m + a` in place, returning whether it overflowed.
fn mul_add_small(limbs: &mut [u64; 4], m: u64, a: u64) -> bool {
    let mut carry = u128::from(a);
    for limb in limbs.iter_mut() {
        let cur = u128::from(*limb) * u128::from(m) + carry;
        #[allow(clippy::cast_possible_truncation)]
        let low = cur as u64;
        *limb = low;
        carry = cur >> 64;
    }
    carry != 0
}

/// Divides `limbs` by `d` in place, returning the remainder.
fn div_rem_small(limbs: &mut [u64; 4], d: u64) -> u64 {
    let d = u128::from(d);
    let mut rem = 0u128;
    for limb in limbs.iter_mut().rev() {
        let cur = (rem << 64) | u128::from(*limb);
        #[allow(clippy::cast_possible_truncation)]
        let quotient = (cur / d) as u64;
        *limb = quotient;
        rem = cur % d;
    }
    #[allow(clippy::cast_possible_truncation)]
    let rem = rem as u64;
    rem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i256_le_bytes() {
        let v = I256::from(-2i64);
        let bytes = v.to_le_bytes();
        assert_eq!(bytes[0], 0xfe);
        assert!(bytes[1..].iter().all(|b| *b == 0xff));
        assert_eq!(I256::from_le_bytes(bytes), v);
        assert_eq!(v.to_i128(), Some(-2));
    }

    #[test]
    fn test_display_and_parse() {
        for s in [
            "0",
            "-1",
            "170141183460469231731687303715884105728",
            "57896044618658097711785492504343953926634992332820282019728792003956564819967",
            "-57896044618658097711785492504343953926634992332820282019728792003956564819968",
        ] {
            let v: I256 = s.parse().unwrap();
            assert_eq!(v.to_string(), s);
        }
        assert_eq!(
            "57896044618658097711785492504343953926634992332820282019728792003956564819968"
                .parse::<I256>(),
            Err(ParseWideIntError::OutOfRange(
                "57896044618658097711785492504343953926634992332820282019728792003956564819968"
                    .into()
            ))
        );
        assert_eq!(
            U256::MAX.to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
        assert!("-1".parse::<U256>().is_err());
        assert!("1x".parse::<U256>().is_err());
    }

    #[test]
    fn test_ordering() {
        let mut values = vec![
            I256::MAX,
            I256::from(1i64),
            I256::MIN,
            I256::from(-1i64),
            I256::ZERO,
        ];
        values.sort();
        assert_eq!(
            values,
            vec![I256::MIN, I256::from(-1i64), I256::ZERO, I256::from(1i64), I256::MAX]
        );
    }

    #[test]
    fn test_f64() {
        assert_eq!(I256::from_f64(-12.7), I256::from(-12i64));
        assert_eq!(I256::from_f64(1e300), I256::MAX);
        assert_eq!(I256::from_f64(f64::NAN), I256::ZERO);
        assert_eq!(I256::from_f64(TWO_POW_128).to_f64(), TWO_POW_128);
        assert_eq!(U256::try_from_f64(0.5), None);
        assert_eq!(U256::try_from_f64(TWO_POW_256), None);
        assert_eq!(U256::try_from_f64(3.0), Some(U256::from(3u8)));
        assert_eq!(U256::pow10(2), Some(U256::from(100u8)));
        assert_eq!(U256::pow10(78), None);
    }
}
