// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fixed-width columns.
//!
//! Every row of a fixed-width column occupies the same number of bytes, so
//! the payload of a block is simply the rows' encodings back to back. This
//! covers the numeric types, `Bool`, `UUID`, `IPv4`, `IPv6`, the wide
//! integers and `FixedString(N)`.

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::adt::{I256, U256};
use crate::column::low_cardinality::DictionaryColumn;
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::ColumnError;
use crate::types::TypeDesc;
use crate::value::{FromValue, Value, ValueKind};
use crate::wire::{self, IoContext};

/// A value with a fixed-width wire encoding.
pub trait FixedValue:
    Copy + fmt::Debug + PartialEq + Send + Sync + FromValue + Into<Value> + 'static
{
    /// The number of bytes in the encoding.
    const WIDTH: usize;

    /// The kind of [`Value`] this type converts to and from.
    const KIND: ValueKind;

    /// The wire type name, e.g. `UInt64`.
    fn type_name() -> Cow<'static, str>;

    /// Reports whether `desc` names this type exactly.
    fn accepts(desc: &TypeDesc) -> bool {
        desc.params().is_empty() && desc.name() == Self::type_name()
    }

    /// Appends the encoding of `self` to `buf`.
    fn put(self, buf: &mut Vec<u8>);

    /// Decodes a value from the first [`Self::WIDTH`] bytes of `bytes`.
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! fixed_value {
    ($($t:ty => $name:literal, $kind:ident $(, $alias:literal)?;)*) => {
        $(
            impl FixedValue for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();
                const KIND: ValueKind = ValueKind::$kind;

                fn type_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }

                fn accepts(desc: &TypeDesc) -> bool {
                    (desc.params().is_empty() && desc.name() == $name)
                        $(|| desc.name() == $alias)?
                }

                fn put(self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }

                fn get(bytes: &[u8]) -> $t {
                    let mut raw = [0; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

fixed_value! {
    i8 => "Int8", Int8, "Enum8";
    i16 => "Int16", Int16, "Enum16";
    i32 => "Int32", Int32;
    i64 => "Int64", Int64;
    i128 => "Int128", Int128;
    u8 => "UInt8", UInt8;
    u16 => "UInt16", UInt16;
    u32 => "UInt32", UInt32;
    u64 => "UInt64", UInt64;
    u128 => "UInt128", UInt128;
    f32 => "Float32", Float32;
    f64 => "Float64", Float64;
    I256 => "Int256", Int256;
    U256 => "UInt256", UInt256;
}

impl FixedValue for bool {
    const WIDTH: usize = 1;
    const KIND: ValueKind = ValueKind::Bool;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("Bool")
    }

    fn put(self, buf: &mut Vec<u8>) {
        buf.push(u8::from(self));
    }

    fn get(bytes: &[u8]) -> bool {
        bytes[0] != 0
    }
}

impl FixedValue for Uuid {
    const WIDTH: usize = 16;
    const KIND: ValueKind = ValueKind::Uuid;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("UUID")
    }

    /// The wire stores each 8-byte half of the UUID in reverse.
    fn put(self, buf: &mut Vec<u8>) {
        let bytes = self.as_bytes();
        buf.extend(bytes[..8].iter().rev());
        buf.extend(bytes[8..].iter().rev());
    }

    fn get(bytes: &[u8]) -> Uuid {
        let mut raw = [0; 16];
        for (i, b) in bytes[..8].iter().rev().chain(bytes[8..16].iter().rev()).enumerate() {
            raw[i] = *b;
        }
        Uuid::from_bytes(raw)
    }
}

impl FixedValue for Ipv4Addr {
    const WIDTH: usize = 4;
    const KIND: ValueKind = ValueKind::Ipv4;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("IPv4")
    }

    fn put(self, buf: &mut Vec<u8>) {
        u32::from(self).put(buf);
    }

    fn get(bytes: &[u8]) -> Ipv4Addr {
        Ipv4Addr::from(u32::get(bytes))
    }
}

impl FixedValue for Ipv6Addr {
    const WIDTH: usize = 16;
    const KIND: ValueKind = ValueKind::Ipv6;

    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("IPv6")
    }

    fn put(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.octets());
    }

    fn get(bytes: &[u8]) -> Ipv6Addr {
        let mut octets = [0; 16];
        octets.copy_from_slice(&bytes[..16]);
        Ipv6Addr::from(octets)
    }
}

impl<const N: usize> FixedValue for [u8; N] {
    const WIDTH: usize = N;
    const KIND: ValueKind = ValueKind::Bytes;

    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("FixedString({N})"))
    }

    fn accepts(desc: &TypeDesc) -> bool {
        desc.name() == "FixedString"
            && desc.params().len() == 1
            && desc.number_param(0).and_then(|n| usize::try_from(n).ok()) == Some(N)
    }

    fn put(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self);
    }

    fn get(bytes: &[u8]) -> [u8; N] {
        let mut raw = [0; N];
        raw.copy_from_slice(&bytes[..N]);
        raw
    }
}

/// A column of [`FixedValue`]s.
///
/// The same owned buffer backs both paths: appends encode into it, and
/// [`Column::read_raw`] overwrites it with the block's payload.
pub struct FixedColumn<T> {
    meta: ColumnMeta,
    data: Vec<u8>,
    num_rows: usize,
    _marker: PhantomData<T>,
}

impl<T: FixedValue> fmt::Debug for FixedColumn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedColumn")
            .field("type", &T::type_name())
            .field("name", &self.meta.name)
            .field("num_rows", &self.num_rows)
            .finish()
    }
}

impl<T: FixedValue> Default for FixedColumn<T> {
    fn default() -> Self {
        FixedColumn {
            meta: ColumnMeta::default(),
            data: Vec::new(),
            num_rows: 0,
            _marker: PhantomData,
        }
    }
}

impl<T: FixedValue> FixedColumn<T> {
    /// Constructs an empty column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns how many payload bytes fit without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Decodes the first `dst.len()` rows into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is longer than the column.
    pub fn fill(&self, dst: &mut [T]) {
        assert!(dst.len() <= self.num_rows, "fill past end of column");
        for (chunk, d) in self.data.chunks_exact(T::WIDTH).zip(dst.iter_mut()) {
            *d = T::get(chunk);
        }
    }
}

impl<T: FixedValue> Column for FixedColumn<T> {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn structural_type(&self) -> String {
        T::type_name().into_owned()
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        if T::accepts(desc) {
            return Ok(());
        }
        if !opts.strict && desc.fixed_width() == Some(T::WIDTH) {
            debug!(
                declared = %desc,
                bound = %T::type_name(),
                "binding width-compatible type"
            );
            return Ok(());
        }
        Err(ColumnError::mismatch(desc, T::type_name()))
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.reset();
        let len = num_rows
            .checked_mul(T::WIDTH)
            .ok_or_else(|| ColumnError::Malformed(format!("{num_rows} rows overflow")))?;
        wire::read_exact_into(r, &mut self.data, len)
            .context(&format!("{} data", T::type_name()))?;
        self.num_rows = num_rows;
        trace!(rows = num_rows, bytes = len, typ = %T::type_name(), "read fixed column");
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        let n = wire::write_buf(w, &self.data).context(&format!("{} data", T::type_name()))?;
        trace!(rows = self.num_rows, bytes = n, "flushed fixed column");
        Ok(n)
    }

    fn reset(&mut self) {
        self.data.clear();
        self.num_rows = 0;
    }

    fn append_empty(&mut self) {
        self.data.resize(self.data.len() + T::WIDTH, 0);
        self.num_rows += 1;
    }

    fn truncate(&mut self, num_rows: usize) {
        if num_rows < self.num_rows {
            self.data.truncate(num_rows * T::WIDTH);
            self.num_rows = num_rows;
        }
    }

    fn reserve(&mut self, bytes: usize) {
        self.data.reserve(bytes);
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        let v = T::from_value(value).map_err(|e| e.at_row(self.num_rows))?;
        self.append(v);
        Ok(())
    }

    fn row_any(&self, row: usize) -> Value {
        self.row(row).into()
    }
}

impl<T: FixedValue> ColumnAppend for FixedColumn<T> {
    type Value<'v> = T;

    fn append(&mut self, value: T) {
        value.put(&mut self.data);
        self.num_rows += 1;
    }
}

impl<T: FixedValue> ColumnRead for FixedColumn<T> {
    type Item<'a> = T;

    fn row(&self, row: usize) -> T {
        assert!(row < self.num_rows, "row {row} out of bounds");
        T::get(&self.data[row * T::WIDTH..])
    }
}

impl<T: FixedValue> DictionaryColumn for FixedColumn<T> {
    fn row_key(&self, row: usize) -> &[u8] {
        &self.data[row * T::WIDTH..(row + 1) * T::WIDTH]
    }
}
