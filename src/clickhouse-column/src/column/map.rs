// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The map overlay.

use std::io::{Read, Write};
use std::ops::Range;

use tracing::trace;

use crate::cast::CastFrom;
use crate::column::array::{offset_end, offset_range, read_offsets};
use crate::column::fixed::FixedColumn;
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::{ColumnError, ConvertError};
use crate::types::TypeDesc;
use crate::value::{Value, ValueKind};

/// A `Map(K, V)` column.
///
/// Laid out like an array of pairs whose keys and values are stored in two
/// separate columns sharing one set of offsets. The keys of every row come
/// before any of the values on the wire.
#[derive(Debug, Default)]
pub struct Map<K, V> {
    meta: ColumnMeta,
    offsets: FixedColumn<u64>,
    last_offset: u64,
    keys: K,
    values: V,
}

impl<K: Column, V: Column> Map<K, V> {
    /// Constructs a map over `keys` and `values`, which must be empty.
    pub fn new(keys: K, values: V) -> Map<K, V> {
        assert_eq!(keys.num_rows(), 0, "wrapped column must be empty");
        assert_eq!(values.num_rows(), 0, "wrapped column must be empty");
        Map {
            meta: ColumnMeta::default(),
            offsets: FixedColumn::new(),
            last_offset: 0,
            keys,
            values,
        }
    }

    /// Returns the key column.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Returns the value column.
    pub fn values(&self) -> &V {
        &self.values
    }

    /// Returns the key and value columns for appending.
    ///
    /// Every [`Map::append_len`] must be followed by exactly that many
    /// appends to each column before the next row.
    pub fn columns_mut(&mut self) -> (&mut K, &mut V) {
        (&mut self.keys, &mut self.values)
    }

    /// Starts a row of `len` pairs.
    pub fn append_len(&mut self, len: usize) {
        self.last_offset += u64::cast_from(len);
        self.offsets.append(self.last_offset);
    }

    /// Returns the pair range of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_range(&self, row: usize) -> Range<usize> {
        offset_range(&self.offsets, row)
    }

    /// Calls `f` with the index and pair range of every row, for value
    /// shapes the typed accessors can't project directly.
    pub fn each_extent(&self, mut f: impl FnMut(usize, Range<usize>)) {
        for row in 0..self.offsets.num_rows() {
            f(row, self.row_range(row));
        }
    }

    fn rollback(&mut self, pairs: usize) {
        self.keys.truncate(pairs);
        self.values.truncate(pairs);
    }
}

impl<K: Column, V: Column> Column for Map<K, V> {
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
        format!(
            "Map({}, {})",
            self.keys.structural_type(),
            self.values.structural_type()
        )
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        match (desc.type_param(0), desc.type_param(1)) {
            (Some(k), Some(v)) if desc.name() == "Map" && desc.params().len() == 2 => {
                self.keys.validate_type(k, opts)?;
                self.values.validate_type(v, opts)
            }
            _ => Err(ColumnError::mismatch(desc, self.structural_type())),
        }
    }

    fn read_prefix(&mut self, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.keys.read_prefix(r)?;
        self.values.read_prefix(r)
    }

    fn write_prefix(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        Ok(self.keys.write_prefix(w)? + self.values.write_prefix(w)?)
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.last_offset = 0;
        let total = read_offsets(&mut self.offsets, num_rows, r, "map offsets")?;
        let pairs = usize::try_from(total)
            .map_err(|_| ColumnError::Malformed(format!("map of {total} pairs is too large")))?;
        self.keys
            .read_raw(pairs, r)
            .map_err(|e| e.within("map keys"))?;
        self.values
            .read_raw(pairs, r)
            .map_err(|e| e.within("map values"))?;
        if self.keys.num_rows() != pairs || self.values.num_rows() != pairs {
            return Err(ColumnError::Malformed(format!(
                "map offsets end at {pairs} but keys hold {} rows and values {}",
                self.keys.num_rows(),
                self.values.num_rows()
            )));
        }
        self.last_offset = total;
        trace!(rows = num_rows, pairs, "read map column");
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        let mut n = self
            .offsets
            .write_to(w)
            .map_err(|e| e.within("map offsets"))?;
        n += self.keys.write_to(w).map_err(|e| e.within("map keys"))?;
        n += self
            .values
            .write_to(w)
            .map_err(|e| e.within("map values"))?;
        Ok(n)
    }

    fn reset(&mut self) {
        self.offsets.reset();
        self.last_offset = 0;
        self.keys.reset();
        self.values.reset();
    }

    fn append_empty(&mut self) {
        self.append_len(0);
    }

    fn truncate(&mut self, num_rows: usize) {
        if num_rows < self.num_rows() {
            self.offsets.truncate(num_rows);
            self.last_offset = offset_end(&self.offsets, num_rows);
            self.rollback(usize::cast_from(self.last_offset));
        }
    }

    fn reserve(&mut self, bytes: usize) {
        self.keys.reserve(bytes / 2);
        self.values.reserve(bytes / 2);
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        let row = self.num_rows();
        let pairs = match value {
            Value::Map(pairs) => pairs,
            Value::Null => {
                return Err(ConvertError::UnexpectedNull { to: ValueKind::Map }.at_row(row))
            }
            other => {
                return Err(ConvertError::Incompatible {
                    from: other.kind(),
                    to: ValueKind::Map,
                }
                .at_row(row))
            }
        };
        let start = usize::cast_from(self.last_offset);
        for (k, v) in pairs {
            let res = self
                .keys
                .append_any(k)
                .and_then(|()| self.values.append_any(v));
            if let Err(e) = res {
                self.rollback(start);
                return Err(e.at_row(row));
            }
        }
        self.append_len(pairs.len());
        Ok(())
    }

    fn row_any(&self, row: usize) -> Value {
        Value::Map(
            self.row_range(row)
                .map(|i| (self.keys.row_any(i), self.values.row_any(i)))
                .collect(),
        )
    }
}

impl<K: ColumnAppend, V: ColumnAppend> ColumnAppend for Map<K, V> {
    type Value<'v> = Vec<(K::Value<'v>, V::Value<'v>)>;

    fn append(&mut self, value: Self::Value<'_>) {
        self.append_len(value.len());
        for (k, v) in value {
            self.keys.append(k);
            self.values.append(v);
        }
    }
}

impl<K: ColumnRead, V: ColumnRead> ColumnRead for Map<K, V> {
    type Item<'a>
        = Vec<(K::Item<'a>, V::Item<'a>)>
    where
        Self: 'a;

    fn row(&self, row: usize) -> Self::Item<'_> {
        self.row_range(row)
            .map(|i| (self.keys.row(i), self.values.row(i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::array::Array;
    use crate::column::nullable::Nullable;
    use crate::column::string::StringColumn;

    #[test]
    fn test_reset_keeps_capacity() {
        let mut col = Map::new(StringColumn::new(), FixedColumn::<u32>::new());
        col.append(vec![(&b"a"[..], 1), (&b"bc"[..], 2)]);
        let offsets = col.offsets.capacity();
        let keys = col.keys().capacity();
        let values = col.values().capacity();
        col.reset();
        assert_eq!(col.num_rows(), 0);
        assert_eq!(col.offsets.capacity(), offsets);
        assert_eq!(col.keys().capacity(), keys);
        assert_eq!(col.values().capacity(), values);
        col.append(vec![(&b"d"[..], 4)]);
        assert_eq!(col.row(0), vec![(&b"d"[..], 4)]);
    }

    #[test]
    fn test_wire_format() {
        let mut col = Map::new(StringColumn::new(), FixedColumn::<u8>::new());
        col.append(vec![(&b"a"[..], 1), (&b"b"[..], 2)]);
        col.append(vec![]);
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.extend_from_slice(b"\x01a\x01b");
        expected.extend_from_slice(&[1, 2]);
        assert_eq!(wire, expected);

        let mut decoded = Map::new(StringColumn::new(), FixedColumn::<u8>::new());
        decoded.read_raw(2, &mut &wire[..]).unwrap();
        assert_eq!(decoded.row(0), vec![(&b"a"[..], 1), (&b"b"[..], 2)]);
        assert!(decoded.row(1).is_empty());
        assert_eq!(decoded.keys().num_rows(), decoded.values().num_rows());
        assert_eq!(decoded.structural_type(), "Map(String, UInt8)");
    }

    #[test]
    fn test_each_extent_nested_values() {
        let mut col = Map::new(
            FixedColumn::<u32>::new(),
            Array::new(Nullable::new(StringColumn::new())),
        );
        col.append(vec![(1, vec![Some(&b"x"[..]), None]), (2, vec![])]);
        col.append(vec![(3, vec![Some(&b"y"[..])])]);
        let mut seen = vec![];
        col.each_extent(|row, range| {
            for i in range {
                seen.push((row, col.keys().row(i), col.values().row(i).len()));
            }
        });
        assert_eq!(seen, vec![(0, 1, 2), (0, 2, 0), (1, 3, 1)]);
    }

    #[test]
    fn test_validate() {
        let opts = ValidateOptions {
            strict: true,
            for_insert: true,
        };
        let mut col = Map::new(StringColumn::new(), FixedColumn::<u64>::new());
        col.validate_type(&TypeDesc::parse("Map(String, UInt64)").unwrap(), opts)
            .unwrap();
        let err = col
            .validate_type(&TypeDesc::parse("Map(String, Int64)").unwrap(), opts)
            .unwrap_err();
        assert!(matches!(err, ColumnError::TypeMismatch { ref bound, .. } if bound == "UInt64"));
        assert!(col
            .validate_type(&TypeDesc::parse("Array(String)").unwrap(), opts)
            .is_err());
    }

    #[test]
    fn test_append_any_rolls_back_pairs() {
        let mut col = Map::new(StringColumn::new(), FixedColumn::<u8>::new());
        col.append_any(&Value::Map(vec![(Value::from("a"), Value::UInt64(1))]))
            .unwrap();
        let err = col
            .append_any(&Value::Map(vec![
                (Value::from("b"), Value::UInt64(2)),
                (Value::from("c"), Value::Int64(-1)),
            ]))
            .unwrap_err();
        assert!(matches!(err, ColumnError::Convert { row: 1, .. }));
        assert_eq!(col.num_rows(), 1);
        assert_eq!(col.keys().num_rows(), 1);
        assert_eq!(col.values().num_rows(), 1);
        assert_eq!(
            col.row_any(0),
            Value::Map(vec![(Value::from("a"), Value::UInt8(1))])
        );
    }

    #[test]
    fn test_truncated_values() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&1u64.to_le_bytes());
        wire.extend_from_slice(b"\x01k");
        let mut col = Map::new(StringColumn::new(), FixedColumn::<u16>::new());
        let err = col.read_raw(1, &mut &wire[..]).unwrap_err();
        let ColumnError::Io { context, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(context, "map values: UInt16 data");
    }
}
