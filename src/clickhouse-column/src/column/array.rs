// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The array overlay.
//!
//! An array column is a column of cumulative element counts (the offsets)
//! plus a single inner column holding the elements of every row back to
//! back. Row `i` is `inner[offsets[i - 1]..offsets[i]]`, with `offsets[-1]`
//! taken as zero. The inner column can itself be an array, to any depth.

use std::borrow::Cow;
use std::io::{Read, Write};
use std::ops::Range;

use tracing::trace;

use crate::cast::CastFrom;
use crate::column::fixed::FixedColumn;
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::{ColumnError, ConvertError};
use crate::types::TypeDesc;
use crate::value::{Value, ValueKind};

/// Reads a block of offsets and checks that they never decrease.
pub(crate) fn read_offsets(
    offsets: &mut FixedColumn<u64>,
    num_rows: usize,
    r: &mut dyn Read,
    context: &str,
) -> Result<u64, ColumnError> {
    offsets
        .read_raw(num_rows, r)
        .map_err(|e| e.within(context))?;
    let mut last = 0;
    for (i, offset) in offsets.rows().enumerate() {
        if offset < last {
            return Err(ColumnError::Malformed(format!(
                "{context} decrease at row {i}: {offset} < {last}"
            )));
        }
        last = offset;
    }
    Ok(last)
}

/// Returns the element range of row `row` given cumulative `offsets`.
pub(crate) fn offset_range(offsets: &FixedColumn<u64>, row: usize) -> Range<usize> {
    let start = match row {
        0 => 0,
        row => usize::cast_from(offsets.row(row - 1)),
    };
    start..usize::cast_from(offsets.row(row))
}

/// Returns the number of elements in the first `num_rows` rows.
pub(crate) fn offset_end(offsets: &FixedColumn<u64>, num_rows: usize) -> u64 {
    match num_rows {
        0 => 0,
        n => offsets.row(n - 1),
    }
}

/// An `Array(T)` column wrapping a column of `T`.
#[derive(Debug, Default)]
pub struct Array<C> {
    meta: ColumnMeta,
    offsets: FixedColumn<u64>,
    last_offset: u64,
    inner: C,
}

impl<C: Column> Array<C> {
    /// Wraps `inner`, which must be empty.
    pub fn new(inner: C) -> Array<C> {
        assert_eq!(inner.num_rows(), 0, "wrapped column must be empty");
        Array {
            meta: ColumnMeta::default(),
            offsets: FixedColumn::new(),
            last_offset: 0,
            inner,
        }
    }

    /// Returns the element column.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the element column for appending.
    ///
    /// Every [`Array::append_len`] must be followed by exactly that many
    /// appends to the element column before the next row.
    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Returns the cumulative offsets column.
    pub fn offsets(&self) -> &FixedColumn<u64> {
        &self.offsets
    }

    /// Starts a row of `len` elements.
    pub fn append_len(&mut self, len: usize) {
        self.last_offset += u64::cast_from(len);
        self.offsets.append(self.last_offset);
    }

    /// Returns the element range of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_range(&self, row: usize) -> Range<usize> {
        offset_range(&self.offsets, row)
    }

    /// Calls `f` with the index and element range of every row.
    pub fn each_extent(&self, mut f: impl FnMut(usize, Range<usize>)) {
        for row in 0..self.offsets.num_rows() {
            f(row, self.row_range(row));
        }
    }

    /// Appends `items` as row `row`, rolling the inner column back if any of
    /// them fails to convert.
    fn append_items<'v>(
        &mut self,
        row: usize,
        items: impl Iterator<Item = Cow<'v, Value>>,
    ) -> Result<(), ColumnError> {
        let start = self.inner.num_rows();
        for item in items {
            if let Err(e) = self.inner.append_any(&item) {
                self.inner.truncate(start);
                return Err(e.at_row(row));
            }
        }
        let len = self.inner.num_rows() - start;
        self.append_len(len);
        Ok(())
    }
}

impl<C: Column> Column for Array<C> {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.offsets.num_rows()
    }

    fn structural_type(&self) -> String {
        format!("Array({})", self.inner.structural_type())
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        match desc.type_param(0) {
            Some(inner) if desc.is_wrapper("Array") => self.inner.validate_type(inner, opts),
            _ => Err(ColumnError::mismatch(desc, self.structural_type())),
        }
    }

    fn read_prefix(&mut self, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.inner.read_prefix(r)
    }

    fn write_prefix(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        self.inner.write_prefix(w)
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.last_offset = 0;
        let total = read_offsets(&mut self.offsets, num_rows, r, "array offsets")?;
        let elements = usize::try_from(total).map_err(|_| {
            ColumnError::Malformed(format!("array of {total} elements is too large"))
        })?;
        self.inner
            .read_raw(elements, r)
            .map_err(|e| e.within("array values"))?;
        if self.inner.num_rows() != elements {
            return Err(ColumnError::Malformed(format!(
                "array offsets end at {elements} but values hold {} rows",
                self.inner.num_rows()
            )));
        }
        self.last_offset = total;
        trace!(rows = num_rows, elements, "read array column");
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        let n = self
            .offsets
            .write_to(w)
            .map_err(|e| e.within("array offsets"))?;
        let m = self
            .inner
            .write_to(w)
            .map_err(|e| e.within("array values"))?;
        Ok(n + m)
    }

    fn reset(&mut self) {
        self.offsets.reset();
        self.last_offset = 0;
        self.inner.reset();
    }

    fn append_empty(&mut self) {
        self.append_len(0);
    }

    fn truncate(&mut self, num_rows: usize) {
        if num_rows < self.num_rows() {
            self.offsets.truncate(num_rows);
            self.last_offset = offset_end(&self.offsets, num_rows);
            self.inner.truncate(usize::cast_from(self.last_offset));
        }
    }

    fn reserve(&mut self, bytes: usize) {
        self.inner.reserve(bytes);
    }

    /// Appends an array row. A byte string appends element-wise as
    /// `UInt8`s, matching what [`crate::scan`] accepts for `Vec<T>`.
    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        let row = self.num_rows();
        match value {
            Value::Array(items) => self.append_items(row, items.iter().map(Cow::Borrowed)),
            Value::Bytes(bytes) => {
                self.append_items(row, bytes.iter().map(|b| Cow::Owned(Value::UInt8(*b))))
            }
            Value::Null => Err(ConvertError::UnexpectedNull {
                to: ValueKind::Array,
            }
            .at_row(row)),
            other => Err(ConvertError::Incompatible {
                from: other.kind(),
                to: ValueKind::Array,
            }
            .at_row(row)),
        }
    }

    fn row_any(&self, row: usize) -> Value {
        Value::Array(self.row_range(row).map(|i| self.inner.row_any(i)).collect())
    }
}

impl<C: ColumnAppend> ColumnAppend for Array<C> {
    type Value<'v> = Vec<C::Value<'v>>;

    fn append(&mut self, value: Vec<C::Value<'_>>) {
        self.append_len(value.len());
        for v in value {
            self.inner.append(v);
        }
    }
}

impl<C: ColumnRead> ColumnRead for Array<C> {
    type Item<'a>
        = Vec<C::Item<'a>>
    where
        Self: 'a;

    fn row(&self, row: usize) -> Vec<C::Item<'_>> {
        self.row_range(row).map(|i| self.inner.row(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::string::StringColumn;
    use crate::value::{scan, FromValue};

    #[test]
    fn test_reset_keeps_capacity() {
        let mut col = Array::new(StringColumn::new());
        col.append(vec![&b"abc"[..], b"de"]);
        col.append(vec![&b"f"[..]]);
        let offsets = col.offsets().capacity();
        let data = col.inner().capacity();
        col.reset();
        assert_eq!(col.num_rows(), 0);
        assert_eq!(col.inner().num_rows(), 0);
        assert_eq!(col.offsets().capacity(), offsets);
        assert_eq!(col.inner().capacity(), data);
        col.append(vec![&b"g"[..]]);
        assert_eq!(col.row(0), vec![&b"g"[..]]);
    }

    #[test]
    fn test_wire_format() {
        let mut col = Array::new(FixedColumn::<u8>::new());
        col.append(vec![1, 2]);
        col.append(vec![]);
        col.append(vec![3]);
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        let mut expected = Vec::new();
        for offset in [2u64, 2, 3] {
            expected.extend_from_slice(&offset.to_le_bytes());
        }
        expected.extend_from_slice(&[1, 2, 3]);
        assert_eq!(wire, expected);

        let mut decoded = Array::new(FixedColumn::<u8>::new());
        decoded.read_raw(3, &mut &wire[..]).unwrap();
        assert_eq!(decoded.row(0), vec![1, 2]);
        assert_eq!(decoded.row(1), Vec::<u8>::new());
        assert_eq!(decoded.row_range(2), 2..3);
        let mut extents = vec![];
        decoded.each_extent(|i, r| extents.push((i, r)));
        assert_eq!(extents, vec![(0, 0..2), (1, 2..2), (2, 2..3)]);
    }

    #[test]
    fn test_nested() {
        let mut col = Array::new(Array::new(StringColumn::new()));
        col.append(vec![vec![&b"a"[..], b"b"], vec![]]);
        col.append(vec![vec![&b"c"[..]]]);
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();

        let mut decoded = Array::new(Array::new(StringColumn::new()));
        decoded.read_raw(2, &mut &wire[..]).unwrap();
        assert_eq!(decoded.row(0), vec![vec![&b"a"[..], b"b"], vec![]]);
        assert_eq!(decoded.row(1), vec![vec![&b"c"[..]]]);
        assert_eq!(decoded.structural_type(), "Array(Array(String))");
    }

    #[test]
    fn test_decreasing_offsets() {
        let mut wire = Vec::new();
        for offset in [2u64, 1] {
            wire.extend_from_slice(&offset.to_le_bytes());
        }
        wire.extend_from_slice(&[0, 0]);
        let mut col = Array::new(FixedColumn::<u8>::new());
        let err = col.read_raw(2, &mut &wire[..]).unwrap_err();
        assert!(matches!(err, ColumnError::Malformed(_)), "{err}");
    }

    #[test]
    fn test_truncated_values() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&3u64.to_le_bytes());
        wire.extend_from_slice(&[0, 0]);
        let mut col = Array::new(FixedColumn::<u8>::new());
        let err = col.read_raw(1, &mut &wire[..]).unwrap_err();
        assert_eq!(err.to_string().split(':').next(), Some("array values"));
    }

    #[test]
    fn test_append_any_rolls_back() {
        let mut col = Array::new(FixedColumn::<i8>::new());
        col.append_any(&Value::Array(vec![Value::Int64(1)])).unwrap();
        let err = col
            .append_any(&Value::Array(vec![Value::Int64(2), Value::Int64(300)]))
            .unwrap_err();
        assert!(matches!(err, ColumnError::Convert { row: 1, .. }));
        assert_eq!(col.num_rows(), 1);
        assert_eq!(col.inner().num_rows(), 1);
        col.append_any(&Value::Array(vec![Value::Int64(3)])).unwrap();
        assert_eq!(col.row(1), vec![3]);
        assert_eq!(col.row_any(0), Value::Array(vec![Value::Int8(1)]));
    }

    #[test]
    fn test_append_any_bytes() {
        let mut col = Array::new(FixedColumn::<u8>::new());
        let bytes = Value::Bytes(vec![1, 2, 255]);
        col.append_any(&bytes).unwrap();
        assert_eq!(col.row(0), vec![1, 2, 255]);
        assert_eq!(
            scan::<Vec<u8>>(&col, 0).unwrap(),
            Vec::<u8>::from_value(&bytes).unwrap()
        );

        let mut col = Array::new(FixedColumn::<i8>::new());
        let err = col.append_any(&Value::Bytes(vec![1, 200])).unwrap_err();
        assert!(matches!(err, ColumnError::Convert { row: 0, .. }));
        assert!(Vec::<i8>::from_value(&Value::Bytes(vec![1, 200])).is_err());
        assert_eq!(col.num_rows(), 0);
        assert_eq!(col.inner().num_rows(), 0);
    }

    #[test]
    fn test_truncate() {
        let mut col = Array::new(FixedColumn::<u8>::new());
        col.append(vec![1, 2]);
        col.append(vec![3]);
        col.truncate(1);
        col.append(vec![4]);
        assert_eq!(col.row(1), vec![4]);
        assert_eq!(col.inner().num_rows(), 3);
    }
}
