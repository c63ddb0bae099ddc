// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Variable-length byte string columns.

use std::io::{Read, Write};
use std::str::Utf8Error;

use tracing::trace;

use crate::cast::CastFrom;
use crate::column::low_cardinality::DictionaryColumn;
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::{ColumnError, ConvertError};
use crate::types::TypeDesc;
use crate::value::{Value, ValueKind};
use crate::wire::{self, IoContext};

/// A `String` column.
///
/// Rows are kept in wire format, each a varint length followed by the bytes,
/// alongside a table of every row's payload extent so that rows can be
/// accessed in constant time.
#[derive(Debug, Default)]
pub struct StringColumn {
    meta: ColumnMeta,
    data: Vec<u8>,
    extents: Vec<(usize, usize)>,
}

impl StringColumn {
    /// Constructs an empty column.
    pub fn new() -> StringColumn {
        StringColumn::default()
    }

    /// Returns how many payload bytes fit without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Appends a UTF-8 string.
    pub fn append_str(&mut self, value: &str) {
        self.append(value.as_bytes());
    }

    /// Returns row `row` as UTF-8.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_str(&self, row: usize) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.row(row))
    }
}

impl Column for StringColumn {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.extents.len()
    }

    fn structural_type(&self) -> String {
        "String".into()
    }

    fn validate_type(&mut self, desc: &TypeDesc, _: ValidateOptions) -> Result<(), ColumnError> {
        if desc.name() == "String" && desc.params().is_empty() {
            Ok(())
        } else {
            Err(ColumnError::mismatch(desc, "String"))
        }
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.reset();
        for _ in 0..num_rows {
            let len = wire::read_uvarint_into(r, Some(&mut self.data)).context("string length")?;
            let start = self.data.len();
            wire::read_exact_into(r, &mut self.data, usize::cast_from(len))
                .context("string data")?;
            self.extents.push((start, self.data.len()));
        }
        trace!(rows = num_rows, bytes = self.data.len(), "read string column");
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        let n = wire::write_buf(w, &self.data).context("string data")?;
        trace!(rows = self.num_rows(), bytes = n, "flushed string column");
        Ok(n)
    }

    fn reset(&mut self) {
        self.data.clear();
        self.extents.clear();
    }

    fn append_empty(&mut self) {
        self.append(&[]);
    }

    fn truncate(&mut self, num_rows: usize) {
        if num_rows < self.extents.len() {
            let end = match num_rows {
                0 => 0,
                n => self.extents[n - 1].1,
            };
            self.data.truncate(end);
            self.extents.truncate(num_rows);
        }
    }

    fn reserve(&mut self, bytes: usize) {
        self.data.reserve(bytes);
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        match value {
            Value::Bytes(b) => self.append(b),
            Value::String(s) => self.append_str(s),
            v => match v.convert(ValueKind::String) {
                Ok(Value::String(s)) => self.append_str(&s),
                Ok(other) => {
                    return Err(ConvertError::Incompatible {
                        from: other.kind(),
                        to: ValueKind::String,
                    }
                    .at_row(self.num_rows()))
                }
                Err(e) => return Err(e.at_row(self.num_rows())),
            },
        }
        Ok(())
    }

    fn row_any(&self, row: usize) -> Value {
        match self.row_str(row) {
            Ok(s) => Value::String(s.into()),
            Err(_) => Value::Bytes(self.row(row).to_vec()),
        }
    }
}

impl ColumnAppend for StringColumn {
    type Value<'v> = &'v [u8];

    fn append(&mut self, value: &[u8]) {
        wire::put_uvarint(&mut self.data, u64::cast_from(value.len()));
        let start = self.data.len();
        self.data.extend_from_slice(value);
        self.extents.push((start, self.data.len()));
    }
}

impl ColumnRead for StringColumn {
    type Item<'a> = &'a [u8];

    fn row(&self, row: usize) -> &[u8] {
        let (start, end) = self.extents[row];
        &self.data[start..end]
    }
}

impl DictionaryColumn for StringColumn {
    fn row_key(&self, row: usize) -> &[u8] {
        self.row(row)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_reset_keeps_capacity() {
        let mut col = StringColumn::new();
        col.append_multi([&b"abc"[..], b"defgh", b""]);
        let data = col.data.capacity();
        let extents = col.extents.capacity();
        col.reset();
        assert_eq!(col.num_rows(), 0);
        assert_eq!(col.data.capacity(), data);
        assert_eq!(col.extents.capacity(), extents);
        col.append(b"x");
        assert_eq!(col.row(0), b"x");
    }

    #[test]
    fn test_wire_format() {
        let mut col = StringColumn::new();
        col.append_str("ab");
        col.append_str("");
        col.append(&[0xff; 200]);
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        assert_eq!(&wire[..4], &[2, b'a', b'b', 0]);
        assert_eq!(&wire[4..6], &[0xc8, 0x01]);
        assert_eq!(wire.len(), 6 + 200);

        let mut decoded = StringColumn::new();
        let mut r = &wire[..];
        decoded.read_raw(3, &mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(decoded.row_str(0), Ok("ab"));
        assert_eq!(decoded.row(1), b"");
        assert_eq!(decoded.row(2), &[0xff; 200][..]);
        assert!(decoded.row_str(2).is_err());
        assert_eq!(decoded.row_any(2), Value::Bytes(vec![0xff; 200]));
    }

    #[test]
    fn test_truncated_stream() {
        let wire = [3, b'a', b'b'];
        let mut col = StringColumn::new();
        match col.read_raw(1, &mut &wire[..]) {
            Err(ColumnError::Io { context, source }) => {
                assert_eq!(context, "string data");
                assert_eq!(source.kind(), io::ErrorKind::UnexpectedEof);
            }
            res => panic!("unexpected result {res:?}"),
        }
    }

    #[test]
    fn test_truncate() {
        let mut col = StringColumn::new();
        col.append_str("one");
        col.append_str("two");
        col.truncate(1);
        col.append_str("three");
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        assert_eq!(wire, b"\x03one\x05three");
    }

    #[test]
    fn test_append_any() {
        let mut col = StringColumn::new();
        col.append_any(&Value::from("x")).unwrap();
        col.append_any(&Value::Int32(-5)).unwrap();
        col.append_any(&Value::Bytes(vec![1, 2])).unwrap();
        assert_eq!(col.row_str(1), Ok("-5"));
        let err = col.append_any(&Value::Array(vec![])).unwrap_err();
        assert!(matches!(err, ColumnError::Convert { row: 3, .. }));
        let err = col.append_any(&Value::Null).unwrap_err();
        assert!(matches!(err, ColumnError::Convert { row: 3, .. }));
        assert_eq!(col.num_rows(), 3);
    }
}
