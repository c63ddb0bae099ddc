// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Dates and timestamps.
//!
//! Every temporal type is an integer count since the Unix epoch:
//!
//! | type                | storage | unit                 |
//! |---------------------|---------|----------------------|
//! | `Date`              | `u16`   | days                 |
//! | `Date32`            | `i32`   | days                 |
//! | `DateTime[(tz)]`    | `u32`   | seconds              |
//! | `DateTime64(P[,tz])`| `i64`   | 10^-P seconds        |
//!
//! The optional timezone does not change the stored instant; it only
//! determines how rows are presented.

use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::column::fixed::{FixedColumn, FixedValue};
use crate::column::low_cardinality::DictionaryColumn;
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::{ColumnError, ConvertError};
use crate::types::{TypeDesc, TypeParam};
use crate::value::{FromValue, Value, ValueKind};

/// The largest `DateTime64` precision.
pub const MAX_DATETIME64_PRECISION: u32 = 9;

const DEFAULT_DATETIME64_PRECISION: u32 = 3;

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// One of the temporal wire types.
pub trait TemporalKind: fmt::Debug + Send + Sync + 'static {
    /// The integer the wire stores.
    type Storage: FixedValue;
    /// The presented row type.
    type Item: Copy + fmt::Debug + PartialEq + Send + Sync + FromValue + Into<Value>;

    /// The wire type name.
    const NAME: &'static str;
    /// The [`Value`] kind rows present as.
    const KIND: ValueKind;
    /// Whether the type takes a timezone parameter.
    const HAS_TIMEZONE: bool;
    /// Whether the type takes a precision parameter.
    const HAS_PRECISION: bool;

    /// Encodes `item`. Instants before the epoch encode as zero for the
    /// unsigned kinds. Instants the storage can't represent return the
    /// nearest representable value as an error.
    fn encode(item: Self::Item, precision: u32) -> Result<Self::Storage, Self::Storage>;

    /// Decodes a stored value, presenting it in `tz`.
    fn decode(raw: Self::Storage, precision: u32, tz: Tz) -> Self::Item;
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    date.signed_duration_since(epoch()).num_days()
}

fn date_from_days(days: i64) -> NaiveDate {
    TimeDelta::try_days(days)
        .and_then(|delta| epoch().checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

fn datetime_from_parts(secs: i64, nanos: u32, tz: Tz) -> DateTime<Tz> {
    let utc = DateTime::from_timestamp(secs, nanos).unwrap_or(if secs < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    });
    utc.with_timezone(&tz)
}

/// `Date`: days since the epoch as a `u16`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateKind;

impl TemporalKind for DateKind {
    type Storage = u16;
    type Item = NaiveDate;

    const NAME: &'static str = "Date";
    const KIND: ValueKind = ValueKind::Date;
    const HAS_TIMEZONE: bool = false;
    const HAS_PRECISION: bool = false;

    fn encode(item: NaiveDate, _: u32) -> Result<u16, u16> {
        let days = days_since_epoch(item);
        if days < 0 {
            Ok(0)
        } else {
            u16::try_from(days).map_err(|_| u16::MAX)
        }
    }

    fn decode(raw: u16, _: u32, _: Tz) -> NaiveDate {
        date_from_days(i64::from(raw))
    }
}

/// `Date32`: days since the epoch as an `i32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Date32Kind;

impl TemporalKind for Date32Kind {
    type Storage = i32;
    type Item = NaiveDate;

    const NAME: &'static str = "Date32";
    const KIND: ValueKind = ValueKind::Date;
    const HAS_TIMEZONE: bool = false;
    const HAS_PRECISION: bool = false;

    fn encode(item: NaiveDate, _: u32) -> Result<i32, i32> {
        let days = days_since_epoch(item);
        i32::try_from(days).map_err(|_| if days < 0 { i32::MIN } else { i32::MAX })
    }

    fn decode(raw: i32, _: u32, _: Tz) -> NaiveDate {
        date_from_days(i64::from(raw))
    }
}

/// `DateTime`: seconds since the epoch as a `u32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeKind;

impl TemporalKind for DateTimeKind {
    type Storage = u32;
    type Item = DateTime<Tz>;

    const NAME: &'static str = "DateTime";
    const KIND: ValueKind = ValueKind::DateTime;
    const HAS_TIMEZONE: bool = true;
    const HAS_PRECISION: bool = false;

    fn encode(item: DateTime<Tz>, _: u32) -> Result<u32, u32> {
        let secs = item.timestamp();
        if secs < 0 {
            Ok(0)
        } else {
            u32::try_from(secs).map_err(|_| u32::MAX)
        }
    }

    fn decode(raw: u32, _: u32, tz: Tz) -> DateTime<Tz> {
        datetime_from_parts(i64::from(raw), 0, tz)
    }
}

/// `DateTime64(P)`: ticks of 10^-P seconds since the epoch as an `i64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTime64Kind;

impl TemporalKind for DateTime64Kind {
    type Storage = i64;
    type Item = DateTime<Tz>;

    const NAME: &'static str = "DateTime64";
    const KIND: ValueKind = ValueKind::DateTime;
    const HAS_TIMEZONE: bool = true;
    const HAS_PRECISION: bool = true;

    /// Sub-tick nanoseconds are truncated.
    fn encode(item: DateTime<Tz>, precision: u32) -> Result<i64, i64> {
        let secs = item.timestamp();
        let ticks_per_sec = 10i64.pow(precision);
        let nanos_per_tick = 10i64.pow(MAX_DATETIME64_PRECISION - precision);
        let sub = i64::from(item.timestamp_subsec_nanos()) / nanos_per_tick;
        secs.checked_mul(ticks_per_sec)
            .and_then(|t| t.checked_add(sub))
            .ok_or(if secs < 0 { i64::MIN } else { i64::MAX })
    }

    fn decode(raw: i64, precision: u32, tz: Tz) -> DateTime<Tz> {
        let ticks_per_sec = 10i64.pow(precision);
        let nanos_per_tick = 10i64.pow(MAX_DATETIME64_PRECISION - precision);
        let secs = raw.div_euclid(ticks_per_sec);
        let nanos = u32::try_from(raw.rem_euclid(ticks_per_sec) * nanos_per_tick).unwrap_or(0);
        datetime_from_parts(secs, nanos, tz)
    }
}

/// A column of `K` values.
#[derive(Debug)]
pub struct TemporalColumn<K: TemporalKind> {
    meta: ColumnMeta,
    precision: u32,
    timezone: Option<Tz>,
    data: FixedColumn<K::Storage>,
    _kind: PhantomData<K>,
}

/// A `Date` column.
pub type DateColumn = TemporalColumn<DateKind>;
/// A `Date32` column.
pub type Date32Column = TemporalColumn<Date32Kind>;
/// A `DateTime` column.
pub type DateTimeColumn = TemporalColumn<DateTimeKind>;
/// A `DateTime64` column.
pub type DateTime64Column = TemporalColumn<DateTime64Kind>;

impl<K: TemporalKind> Default for TemporalColumn<K> {
    fn default() -> Self {
        TemporalColumn {
            meta: ColumnMeta::default(),
            precision: if K::HAS_PRECISION {
                DEFAULT_DATETIME64_PRECISION
            } else {
                0
            },
            timezone: None,
            data: FixedColumn::new(),
            _kind: PhantomData,
        }
    }
}

impl<K: TemporalKind> TemporalColumn<K> {
    /// Constructs an empty column. `DateTime64` columns default to
    /// millisecond precision.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timezone rows are presented in. Without one, rows are
    /// presented in UTC.
    ///
    /// # Panics
    ///
    /// Panics if the type has no timezone parameter.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        assert!(K::HAS_TIMEZONE, "{} has no timezone", K::NAME);
        self.timezone = Some(tz);
        self
    }

    /// Sets the sub-second precision.
    ///
    /// # Panics
    ///
    /// Panics if the type has no precision parameter or `precision` exceeds
    /// [`MAX_DATETIME64_PRECISION`].
    pub fn with_precision(mut self, precision: u32) -> Self {
        assert!(K::HAS_PRECISION, "{} has no precision", K::NAME);
        assert!(
            precision <= MAX_DATETIME64_PRECISION,
            "precision {precision} out of range"
        );
        self.precision = precision;
        self
    }

    /// Returns the sub-second precision, zero for types without one.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Returns the timezone, if any.
    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    /// Appends a stored integer as is.
    pub fn append_raw(&mut self, raw: K::Storage) {
        self.data.append(raw);
    }

    /// Returns the stored integer of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_raw(&self, row: usize) -> K::Storage {
        self.data.row(row)
    }

    fn presentation_tz(&self) -> Tz {
        self.timezone.unwrap_or(Tz::UTC)
    }

    /// Binds the declared timezone, which is adopted whether selecting or
    /// inserting since it only affects presentation.
    fn bind_timezone(
        &mut self,
        desc: &TypeDesc,
        param: Option<&TypeParam>,
    ) -> Result<(), ColumnError> {
        let tz = match param {
            None => return Ok(()),
            Some(TypeParam::String(name)) => name
                .parse::<Tz>()
                .map_err(|_| ColumnError::Unsupported(format!("unknown timezone {name:?}")))?,
            Some(_) => return Err(ColumnError::mismatch(desc, self.structural_type())),
        };
        if self.timezone != Some(tz) {
            debug!(column = %self.meta.name, timezone = tz.name(), "adopting declared timezone");
            self.timezone = Some(tz);
        }
        Ok(())
    }

    fn bind_precision(
        &mut self,
        desc: &TypeDesc,
        opts: ValidateOptions,
    ) -> Result<(), ColumnError> {
        let precision = desc
            .number_param(0)
            .and_then(|p| u32::try_from(p).ok())
            .filter(|p| *p <= MAX_DATETIME64_PRECISION)
            .ok_or_else(|| ColumnError::mismatch(desc, self.structural_type()))?;
        if precision != self.precision {
            if opts.for_insert {
                return Err(ColumnError::mismatch(desc, self.structural_type()));
            }
            debug!(
                column = %self.meta.name,
                precision,
                "adopting declared precision"
            );
            self.precision = precision;
        }
        Ok(())
    }
}

impl<K: TemporalKind> Column for TemporalColumn<K> {
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
        let mut params = vec![];
        if K::HAS_PRECISION {
            params.push(TypeParam::Number(i64::from(self.precision)));
        }
        if let Some(tz) = self.timezone {
            params.push(TypeParam::String(tz.name().into()));
        }
        TypeDesc::new(K::NAME, params).to_string()
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        if desc.name() != K::NAME {
            if !opts.strict && desc.fixed_width() == Some(K::Storage::WIDTH) {
                debug!(
                    declared = %desc,
                    bound = K::NAME,
                    "binding width-compatible type"
                );
                return Ok(());
            }
            return Err(ColumnError::mismatch(desc, self.structural_type()));
        }
        match (K::HAS_PRECISION, K::HAS_TIMEZONE, desc.params()) {
            (false, false, []) => Ok(()),
            (false, true, params) if params.len() <= 1 => self.bind_timezone(desc, params.first()),
            (true, true, params) if (1..=2).contains(&params.len()) => {
                self.bind_precision(desc, opts)?;
                self.bind_timezone(desc, params.get(1))
            }
            _ => Err(ColumnError::mismatch(desc, self.structural_type())),
        }
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

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        let row = self.num_rows();
        let item = K::Item::from_value(value).map_err(|e| e.at_row(row))?;
        match K::encode(item, self.precision) {
            Ok(raw) => {
                self.data.append(raw);
                Ok(())
            }
            Err(_) => Err(ConvertError::Overflow {
                value: value.to_string(),
                to: K::KIND,
            }
            .at_row(row)),
        }
    }

    fn row_any(&self, row: usize) -> Value {
        self.row(row).into()
    }
}

impl<K: TemporalKind> ColumnAppend for TemporalColumn<K> {
    type Value<'v> = K::Item;

    /// Out of range values saturate.
    fn append(&mut self, value: K::Item) {
        let raw = match K::encode(value, self.precision) {
            Ok(raw) => raw,
            Err(saturated) => {
                warn!(
                    column = %self.meta.name,
                    typ = K::NAME,
                    ?value,
                    ?saturated,
                    "temporal value out of range, saturating"
                );
                saturated
            }
        };
        self.data.append(raw);
    }
}

impl<K: TemporalKind> ColumnRead for TemporalColumn<K> {
    type Item<'a> = K::Item;

    fn row(&self, row: usize) -> K::Item {
        K::decode(self.data.row(row), self.precision, self.presentation_tz())
    }
}

impl<K: TemporalKind> DictionaryColumn for TemporalColumn<K> {
    fn row_key(&self, row: usize) -> &[u8] {
        self.data.row_key(row)
    }
}
