// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Scaled decimal columns.
//!
//! `Decimal(P, S)` stores `value * 10^S` as a two's complement integer whose
//! width is fixed by the precision `P`: 32 bits up to 9 digits, 64 up to 18,
//! 128 up to 38 and 256 up to 76. `Decimal32(S)` and friends are shorthand for
//! the widest precision of each width.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::adt::I256;
use crate::column::fixed::{FixedColumn, FixedValue};
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::{ColumnError, ConvertError};
use crate::types::TypeDesc;
use crate::value::{Decimal, FromValue, Value, ValueKind};

/// The integer storage of a decimal column.
pub trait DecimalRepr: FixedValue + Into<I256> {
    /// The shorthand type name, e.g. `Decimal64`.
    const NAME: &'static str;
    /// The smallest precision stored at this width.
    const MIN_PRECISION: u32;
    /// The largest precision stored at this width.
    const MAX_PRECISION: u32;

    /// Narrows a wide integer, or returns `None` if it doesn't fit.
    fn from_i256(v: I256) -> Option<Self>;

    /// Converts a float, truncating towards zero and saturating at the
    /// bounds.
    fn saturating_from_f64(f: f64) -> Self;
}

macro_rules! decimal_repr {
    ($($t:ty => $name:literal, $min:literal..=$max:literal;)*) => {
        $(
            impl DecimalRepr for $t {
                const NAME: &'static str = $name;
                const MIN_PRECISION: u32 = $min;
                const MAX_PRECISION: u32 = $max;

                fn from_i256(v: I256) -> Option<$t> {
                    v.to_i128().and_then(|v| <$t>::try_from(v).ok())
                }

                #[allow(clippy::cast_possible_truncation)]
                fn saturating_from_f64(f: f64) -> $t {
                    f as $t
                }
            }
        )*
    };
}

decimal_repr! {
    i32 => "Decimal32", 1..=9;
    i64 => "Decimal64", 10..=18;
    i128 => "Decimal128", 19..=38;
}

impl DecimalRepr for I256 {
    const NAME: &'static str = "Decimal256";
    const MIN_PRECISION: u32 = 39;
    const MAX_PRECISION: u32 = 76;

    fn from_i256(v: I256) -> Option<I256> {
        Some(v)
    }

    fn saturating_from_f64(f: f64) -> I256 {
        I256::from_f64(f)
    }
}

/// A `Decimal(P, S)` column stored as `R`.
#[derive(Debug)]
pub struct DecimalColumn<R: DecimalRepr> {
    meta: ColumnMeta,
    precision: u32,
    scale: u32,
    data: FixedColumn<R>,
}

/// A decimal column of up to 9 digits.
pub type Decimal32Column = DecimalColumn<i32>;
/// A decimal column of up to 18 digits.
pub type Decimal64Column = DecimalColumn<i64>;
/// A decimal column of up to 38 digits.
pub type Decimal128Column = DecimalColumn<i128>;
/// A decimal column of up to 76 digits.
pub type Decimal256Column = DecimalColumn<I256>;

impl<R: DecimalRepr> Default for DecimalColumn<R> {
    /// The widest precision of the storage, with no fractional digits.
    fn default() -> Self {
        DecimalColumn::new(R::MAX_PRECISION, 0)
    }
}

impl<R: DecimalRepr> DecimalColumn<R> {
    /// Constructs an empty `Decimal(precision, scale)` column.
    ///
    /// # Panics
    ///
    /// Panics if `R` is not the storage for `precision` or `scale` exceeds
    /// `precision`.
    pub fn new(precision: u32, scale: u32) -> Self {
        assert!(
            (R::MIN_PRECISION..=R::MAX_PRECISION).contains(&precision),
            "precision {precision} is not stored as {}",
            R::NAME
        );
        assert!(scale <= precision, "scale {scale} exceeds precision {precision}");
        DecimalColumn {
            meta: ColumnMeta::default(),
            precision,
            scale,
            data: FixedColumn::new(),
        }
    }

    /// Returns the number of significant digits.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Returns the number of fractional digits.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    fn factor(&self) -> f64 {
        10f64.powi(i32::try_from(self.scale).unwrap_or(i32::MAX))
    }

    /// Rounds `value` to the scale and checks it against the precision.
    fn scale_checked(&self, value: f64) -> Result<f64, ConvertError> {
        if !value.is_finite() {
            return Err(ConvertError::Invalid {
                value: value.to_string(),
                to: ValueKind::Decimal,
                reason: "not a finite number".into(),
            });
        }
        let scaled = (value * self.factor()).round();
        let limit = 10f64.powi(i32::try_from(self.precision).unwrap_or(i32::MAX));
        if scaled.abs() >= limit {
            return Err(ConvertError::Overflow {
                value: value.to_string(),
                to: ValueKind::Decimal,
            });
        }
        Ok(scaled)
    }

    /// Appends `value`, rounding to the scale and range checking against the
    /// precision.
    pub fn try_append(&mut self, value: f64) -> Result<(), ColumnError> {
        let scaled = self
            .scale_checked(value)
            .map_err(|e| e.at_row(self.num_rows()))?;
        self.data.append(R::saturating_from_f64(scaled));
        Ok(())
    }

    /// Appends an unscaled integer as is.
    pub fn append_raw(&mut self, raw: R) {
        self.data.append(raw);
    }

    /// Returns the unscaled integer of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_raw(&self, row: usize) -> R {
        self.data.row(row)
    }

    /// Returns row `row` as an exact decimal.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_decimal(&self, row: usize) -> Decimal {
        Decimal::new(self.data.row(row), self.scale)
    }

    /// Returns the declared precision and scale, or `None` if `desc` is not
    /// a decimal type stored as `R`.
    fn declared_params(desc: &TypeDesc) -> Option<(u32, u32)> {
        let param = |i| desc.number_param(i).and_then(|n| u32::try_from(n).ok());
        let (precision, scale) = match (desc.name(), desc.params().len()) {
            ("Decimal", 1) => (param(0)?, 0),
            ("Decimal", 2) => (param(0)?, param(1)?),
            (name, 1) if name == R::NAME => (R::MAX_PRECISION, param(0)?),
            _ => return None,
        };
        ((R::MIN_PRECISION..=R::MAX_PRECISION).contains(&precision) && scale <= precision)
            .then_some((precision, scale))
    }
}

impl<R: DecimalRepr> Column for DecimalColumn<R> {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.data.num_rows()
    }

    fn structural_type(&self) -> String {
        format!("Decimal({}, {})", self.precision, self.scale)
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        let Some((precision, scale)) = Self::declared_params(desc) else {
            return Err(ColumnError::mismatch(desc, self.structural_type()));
        };
        if (precision, scale) != (self.precision, self.scale) {
            if opts.for_insert {
                return Err(ColumnError::mismatch(desc, self.structural_type()));
            }
            debug!(
                column = %self.meta.name,
                precision,
                scale,
                "adopting declared decimal parameters"
            );
            self.precision = precision;
            self.scale = scale;
        }
        Ok(())
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.data.read_raw(num_rows, r)
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        self.data.write_to(w)
    }

    fn reset(&mut self) {
        self.data.reset();
    }

    fn append_empty(&mut self) {
        self.data.append_empty();
    }

    fn truncate(&mut self, num_rows: usize) {
        self.data.truncate(num_rows);
    }

    fn reserve(&mut self, bytes: usize) {
        self.data.reserve(bytes);
    }

    /// Appends an exact decimal, failing if it has more fractional digits
    /// than the scale or more digits than the precision.
    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        let row = self.num_rows();
        let overflow = || {
            ConvertError::Overflow {
                value: value.to_string(),
                to: ValueKind::Decimal,
            }
            .at_row(row)
        };
        let decimal = Decimal::from_value(value)
            .and_then(|d| d.rescale(self.scale))
            .map_err(|e| e.at_row(row))?;
        if decimal.digits() > self.precision {
            return Err(overflow());
        }
        let raw = R::from_i256(decimal.unscaled).ok_or_else(overflow)?;
        self.data.append(raw);
        Ok(())
    }

    fn row_any(&self, row: usize) -> Value {
        Value::Decimal(self.row_decimal(row))
    }
}

impl<R: DecimalRepr> ColumnAppend for DecimalColumn<R> {
    type Value<'v> = f64;

    /// Rounds to the nearest unit of the scale, saturating at the bounds of
    /// the storage.
    fn append(&mut self, value: f64) {
        if let Err(error) = self.scale_checked(value) {
            warn!(
                column = %self.meta.name,
                precision = self.precision,
                scale = self.scale,
                value,
                %error,
                "decimal value out of range, saturating"
            );
        }
        let scaled = (value * self.factor()).round();
        self.data.append(R::saturating_from_f64(scaled));
    }
}

impl<R: DecimalRepr> ColumnRead for DecimalColumn<R> {
    type Item<'a> = f64;

    fn row(&self, row: usize) -> f64 {
        self.row_decimal(row).to_f64()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_wire_and_scale() {
        let mut col = Decimal32Column::new(9, 2);
        col.append(1.23);
        col.append(-1.5);
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        assert_eq!(&wire[..4], &123i32.to_le_bytes());
        assert_eq!(&wire[4..], &(-150i32).to_le_bytes());

        let mut decoded = Decimal32Column::new(9, 2);
        decoded.read_raw(2, &mut &wire[..]).unwrap();
        assert!((decoded.row(0) - 1.23).abs() < 0.01);
        assert_eq!(decoded.row_any(1), Value::Decimal(Decimal::new(-150i32, 2)));
        assert_eq!(decoded.row_decimal(0).to_string(), "1.23");
    }

    #[test]
    fn test_rounding_and_saturation() {
        let mut col = Decimal64Column::new(18, 0);
        col.append(2.5);
        col.append(-2.5);
        col.append(1e30);
        assert_eq!(col.row_raw(0), 3);
        assert_eq!(col.row_raw(1), -3);
        assert_eq!(col.row_raw(2), i64::MAX);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_saturation_is_logged() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut col = Decimal32Column::new(5, 2);
            col.append(123.45);
            assert!(captured.0.lock().unwrap().is_empty());
            col.append(1234.5);
            col.append(f64::INFINITY);
            assert_eq!(col.row_raw(0), 12345);
            assert_eq!(col.row_raw(2), i32::MAX);
        });
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("decimal value out of range").count(), 2);
    }

    #[test]
    fn test_try_append() {
        let mut col = Decimal32Column::new(9, 2);
        col.try_append(1234567.89).unwrap();
        let err = col.try_append(12345678.9).unwrap_err();
        assert!(matches!(
            err,
            ColumnError::Convert {
                row: 1,
                source: ConvertError::Overflow { .. }
            }
        ));
        assert!(col.try_append(f64::NAN).is_err());
        assert_eq!(col.num_rows(), 1);
        assert_eq!(col.row_raw(0), 123456789);
    }

    #[test]
    fn test_append_any_exact() {
        let mut col = Decimal64Column::new(10, 2);
        col.append_any(&Value::from("12.34")).unwrap();
        col.append_any(&Value::Int64(5)).unwrap();
        col.append_any(&Value::Decimal(Decimal::new(1i64, 1))).unwrap();
        assert_eq!(col.row_raw(0), 1234);
        assert_eq!(col.row_raw(1), 500);
        assert_eq!(col.row_raw(2), 10);

        let err = col.append_any(&Value::from("12.345")).unwrap_err();
        assert!(matches!(
            err,
            ColumnError::Convert {
                row: 3,
                source: ConvertError::PrecisionLoss { .. }
            }
        ));
        let err = col.append_any(&Value::Int64(123_456_789)).unwrap_err();
        assert!(matches!(
            err,
            ColumnError::Convert {
                row: 3,
                source: ConvertError::Overflow { .. }
            }
        ));
        assert_eq!(col.num_rows(), 3);
    }

    #[test]
    fn test_decimal256() {
        let mut col = Decimal256Column::new(76, 10);
        col.append_any(&Value::from("-123456789012345678901234567890.0123456789"))
            .unwrap();
        assert_eq!(
            col.row_decimal(0).to_string(),
            "-123456789012345678901234567890.0123456789"
        );
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        assert_eq!(wire.len(), 32);
    }

    #[test]
    fn test_validate() {
        let select = ValidateOptions {
            strict: true,
            for_insert: false,
        };
        let insert = ValidateOptions {
            strict: true,
            for_insert: true,
        };
        let mut col = Decimal64Column::default();
        col.validate_type(&TypeDesc::parse("Decimal(12, 4)").unwrap(), select)
            .unwrap();
        assert_eq!((col.precision(), col.scale()), (12, 4));
        assert_eq!(col.structural_type(), "Decimal(12, 4)");
        assert!(col
            .validate_type(&TypeDesc::parse("Decimal(12, 3)").unwrap(), insert)
            .is_err());
        col.validate_type(&TypeDesc::parse("Decimal64(3)").unwrap(), select)
            .unwrap();
        assert_eq!((col.precision(), col.scale()), (18, 3));
        assert!(col
            .validate_type(&TypeDesc::parse("Decimal(9, 2)").unwrap(), select)
            .is_err());
        assert!(col
            .validate_type(&TypeDesc::parse("Decimal32(2)").unwrap(), select)
            .is_err());
    }
}
