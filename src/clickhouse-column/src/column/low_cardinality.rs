// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The dictionary (`LowCardinality`) overlay.
//!
//! A low cardinality column stores each distinct value once, in a dictionary
//! column, and each row as an index into that dictionary. The native protocol
//! frames this as follows. Once per column, ahead of the first block that has
//! rows, the sender writes a key serialization version (always
//! [`SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS`]). Then, for every block:
//!
//! ```text
//! u64   serialization type: index width code | HAS_ADDITIONAL_KEYS
//! u64   dictionary size
//! ...   dictionary column payload
//! u64   row count
//! ...   one index per row, at the chosen width
//! ```
//!
//! Blocks without rows carry nothing at all.
//!
//! The nullable variant, `LowCardinality(Nullable(T))`, does not wrap its
//! dictionary in [`Nullable`](crate::Nullable). Instead dictionary position 0
//! holds a placeholder value and index 0 means null.

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;
use tracing::{debug, trace};

use crate::cast::CastFrom;
use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::ColumnError;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::wire::{self, IoContext};

/// The only key serialization version the native protocol uses.
pub const SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS: u64 = 1;

/// Set when the block relies on a dictionary shared across blocks.
const NEED_GLOBAL_DICTIONARY: u64 = 1 << 8;
/// Set when the block carries its own dictionary.
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;
const INDEX_WIDTH_MASK: u64 = 0xff;

/// A column whose rows can serve as dictionary keys.
///
/// Two rows are the same dictionary entry exactly when their keys are equal.
pub trait DictionaryColumn: Column {
    /// Returns the encoded bytes of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    fn row_key(&self, row: usize) -> &[u8];
}

/// The width of the per-row dictionary indices on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexWidth {
    /// One byte per row.
    U8,
    /// Two bytes per row.
    U16,
    /// Four bytes per row.
    U32,
    /// Eight bytes per row.
    U64,
}

impl IndexWidth {
    /// Returns the narrowest width used for a dictionary of `size` entries.
    pub fn for_dictionary_size(size: usize) -> IndexWidth {
        let size = u64::cast_from(size);
        if size < 1 << 8 {
            IndexWidth::U8
        } else if size < 1 << 16 {
            IndexWidth::U16
        } else if size < 1 << 32 {
            IndexWidth::U32
        } else {
            IndexWidth::U64
        }
    }

    /// Returns the number of bytes per index.
    pub fn bytes(self) -> usize {
        match self {
            IndexWidth::U8 => 1,
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
            IndexWidth::U64 => 8,
        }
    }

    fn code(self) -> u64 {
        match self {
            IndexWidth::U8 => 0,
            IndexWidth::U16 => 1,
            IndexWidth::U32 => 2,
            IndexWidth::U64 => 3,
        }
    }

    fn from_code(code: u64) -> Option<IndexWidth> {
        match code {
            0 => Some(IndexWidth::U8),
            1 => Some(IndexWidth::U16),
            2 => Some(IndexWidth::U32),
            3 => Some(IndexWidth::U64),
            _ => None,
        }
    }

    /// Appends `index`, which must fit the width.
    #[allow(clippy::cast_possible_truncation)]
    fn put(self, buf: &mut Vec<u8>, index: u64) {
        match self {
            IndexWidth::U8 => buf.put_u8(index as u8),
            IndexWidth::U16 => buf.put_u16_le(index as u16),
            IndexWidth::U32 => buf.put_u32_le(index as u32),
            IndexWidth::U64 => buf.put_u64_le(index),
        }
    }

    fn get(self, bytes: &[u8]) -> u64 {
        match self {
            IndexWidth::U8 => u64::from(bytes[0]),
            IndexWidth::U16 => u64::from(LittleEndian::read_u16(bytes)),
            IndexWidth::U32 => u64::from(LittleEndian::read_u32(bytes)),
            IndexWidth::U64 => LittleEndian::read_u64(bytes),
        }
    }
}

/// The state shared by both variants: the dictionary, the per-row indices
/// and the encode-time map from key to dictionary position.
#[derive(Debug, Default)]
struct Dictionary<C> {
    column: C,
    positions: HashMap<Vec<u8>, u64>,
    indices: Vec<u64>,
    /// The width of the last decoded block, if the column was read.
    decoded_width: Option<IndexWidth>,
    scratch: Vec<u8>,
    /// Leading dictionary positions that are not real entries.
    reserved: usize,
}

impl<C: DictionaryColumn> Dictionary<C> {
    fn new(mut column: C, nullable: bool) -> Dictionary<C> {
        assert_eq!(column.num_rows(), 0, "wrapped column must be empty");
        let reserved = usize::from(nullable);
        for _ in 0..reserved {
            column.append_empty();
        }
        Dictionary {
            column,
            positions: HashMap::new(),
            indices: Vec::new(),
            decoded_width: None,
            scratch: Vec::new(),
            reserved,
        }
    }

    /// Resolves the value just appended to the dictionary column, dropping it
    /// again if an equal entry already exists, and records its index.
    fn intern_last(&mut self) {
        let pos = self.column.num_rows() - 1;
        let existing = self.positions.get(self.column.row_key(pos)).copied();
        let index = match existing {
            Some(index) => {
                self.column.truncate(pos);
                index
            }
            None => {
                let index = u64::cast_from(pos);
                let key = self.column.row_key(pos).to_vec();
                self.positions.insert(key, index);
                index
            }
        };
        self.indices.push(index);
        self.decoded_width = None;
    }

    fn push_null(&mut self) {
        self.indices.push(0);
        self.decoded_width = None;
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        self.column
            .append_any(value)
            .map_err(|e| e.at_row(self.indices.len()))?;
        self.intern_last();
        Ok(())
    }

    fn dictionary_row(&self, row: usize) -> usize {
        usize::cast_from(self.indices[row])
    }

    fn index_width(&self) -> IndexWidth {
        self.decoded_width
            .unwrap_or_else(|| IndexWidth::for_dictionary_size(self.column.num_rows()))
    }

    /// Reserves room for as many indices as `bytes` holds at the current
    /// index width.
    fn reserve(&mut self, bytes: usize) {
        self.indices.reserve(bytes / self.index_width().bytes());
    }

    fn reset(&mut self) {
        self.column.reset();
        self.positions.clear();
        self.indices.clear();
        self.decoded_width = None;
        for _ in 0..self.reserved {
            self.column.append_empty();
        }
    }

    fn rebuild_positions(&mut self) {
        self.positions.clear();
        for pos in self.reserved..self.column.num_rows() {
            let key = self.column.row_key(pos).to_vec();
            self.positions.entry(key).or_insert(u64::cast_from(pos));
        }
    }

    fn read_prefix(r: &mut dyn Read) -> Result<(), ColumnError> {
        let version = wire::read_u64(r).context("low cardinality key version")?;
        if version != SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS {
            return Err(ColumnError::Malformed(format!(
                "unknown low cardinality key version {version}"
            )));
        }
        Ok(())
    }

    fn write_prefix(w: &mut dyn Write) -> Result<usize, ColumnError> {
        wire::write_u64(w, SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS)
            .context("low cardinality key version")
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.reset();
        if num_rows == 0 {
            return Ok(());
        }
        let typ = wire::read_u64(r).context("low cardinality serialization type")?;
        if typ & NEED_GLOBAL_DICTIONARY != 0 || typ & HAS_ADDITIONAL_KEYS == 0 {
            return Err(ColumnError::Unsupported(format!(
                "low cardinality global dictionaries (serialization type {typ:#x})"
            )));
        }
        let width = IndexWidth::from_code(typ & INDEX_WIDTH_MASK).ok_or_else(|| {
            ColumnError::Malformed(format!("unknown low cardinality index width in {typ:#x}"))
        })?;

        let size = wire::read_u64(r).context("low cardinality dictionary size")?;
        let size = usize::try_from(size).map_err(|_| {
            ColumnError::Malformed(format!("low cardinality dictionary of {size} entries"))
        })?;
        self.column.reset();
        self.column
            .read_raw(size, r)
            .map_err(|e| e.within("low cardinality dictionary"))?;

        let rows = wire::read_u64(r).context("low cardinality row count")?;
        if rows != u64::cast_from(num_rows) {
            return Err(ColumnError::Malformed(format!(
                "low cardinality block has {rows} rows, expected {num_rows}"
            )));
        }
        let len = num_rows
            .checked_mul(width.bytes())
            .ok_or_else(|| ColumnError::Malformed(format!("{num_rows} rows overflow")))?;
        self.scratch.clear();
        wire::read_exact_into(r, &mut self.scratch, len).context("low cardinality indices")?;
        self.indices.reserve(num_rows);
        for (row, chunk) in self.scratch.chunks_exact(width.bytes()).enumerate() {
            let index = width.get(chunk);
            if index >= u64::cast_from(size) {
                return Err(ColumnError::MalformedDictionaryIndex {
                    row,
                    index,
                    dictionary_size: size,
                });
            }
            self.indices.push(index);
        }
        self.decoded_width = Some(width);
        self.rebuild_positions();
        trace!(rows = num_rows, dictionary = size, ?width, "read low cardinality column");
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        if self.indices.is_empty() {
            return Ok(0);
        }
        let size = self.column.num_rows();
        let width = IndexWidth::for_dictionary_size(size);
        debug!(dictionary = size, ?width, "chose low cardinality index width");

        let mut n = wire::write_u64(w, width.code() | HAS_ADDITIONAL_KEYS)
            .context("low cardinality serialization type")?;
        n += wire::write_u64(w, u64::cast_from(size)).context("low cardinality dictionary size")?;
        n += self
            .column
            .write_to(w)
            .map_err(|e| e.within("low cardinality dictionary"))?;
        n += wire::write_u64(w, u64::cast_from(self.indices.len()))
            .context("low cardinality row count")?;
        let mut buf = Vec::with_capacity(self.indices.len() * width.bytes());
        for index in &self.indices {
            width.put(&mut buf, *index);
        }
        n += wire::write_buf(w, &buf).context("low cardinality indices")?;
        Ok(n)
    }
}

/// A `LowCardinality(T)` column wrapping a dictionary column of `T`.
#[derive(Debug, Default)]
pub struct LowCardinality<C> {
    meta: ColumnMeta,
    dict: Dictionary<C>,
}

impl<C: DictionaryColumn> LowCardinality<C> {
    /// Wraps `dictionary`, which must be empty.
    pub fn new(dictionary: C) -> LowCardinality<C> {
        LowCardinality {
            meta: ColumnMeta::default(),
            dict: Dictionary::new(dictionary, false),
        }
    }

    /// Returns the dictionary of distinct values.
    pub fn dictionary(&self) -> &C {
        &self.dict.column
    }

    /// Returns each row's position in the dictionary.
    pub fn indices(&self) -> &[u64] {
        &self.dict.indices
    }

    /// Returns the index width of the last block read or, for a column being
    /// encoded, the width the next flush will use.
    pub fn index_width(&self) -> IndexWidth {
        self.dict.index_width()
    }
}

impl<C: DictionaryColumn> Column for LowCardinality<C> {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.dict.indices.len()
    }

    fn structural_type(&self) -> String {
        format!("LowCardinality({})", self.dict.column.structural_type())
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        match desc.type_param(0) {
            Some(inner) if desc.is_wrapper("LowCardinality") => {
                self.dict.column.validate_type(inner, opts)
            }
            _ => Err(ColumnError::mismatch(desc, self.structural_type())),
        }
    }

    fn read_prefix(&mut self, r: &mut dyn Read) -> Result<(), ColumnError> {
        Dictionary::<C>::read_prefix(r)
    }

    fn write_prefix(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        Dictionary::<C>::write_prefix(w)
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.dict.read_raw(num_rows, r)
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        self.dict.write_to(w)
    }

    fn reset(&mut self) {
        self.dict.reset();
    }

    fn append_empty(&mut self) {
        self.dict.column.append_empty();
        self.dict.intern_last();
    }

    fn truncate(&mut self, num_rows: usize) {
        self.dict.indices.truncate(num_rows);
    }

    fn reserve(&mut self, bytes: usize) {
        self.dict.reserve(bytes);
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        self.dict.append_any(value)
    }

    fn row_any(&self, row: usize) -> Value {
        self.dict.column.row_any(self.dict.dictionary_row(row))
    }
}

impl<C: DictionaryColumn + ColumnAppend> ColumnAppend for LowCardinality<C> {
    type Value<'v> = C::Value<'v>;

    fn append(&mut self, value: C::Value<'_>) {
        self.dict.column.append(value);
        self.dict.intern_last();
    }
}

impl<C: DictionaryColumn + ColumnRead> ColumnRead for LowCardinality<C> {
    type Item<'a>
        = C::Item<'a>
    where
        Self: 'a;

    fn row(&self, row: usize) -> C::Item<'_> {
        self.dict.column.row(self.dict.dictionary_row(row))
    }
}

/// A `LowCardinality(Nullable(T))` column wrapping a dictionary column of `T`.
#[derive(Debug)]
pub struct LowCardinalityNullable<C> {
    meta: ColumnMeta,
    dict: Dictionary<C>,
}

impl<C: DictionaryColumn + Default> Default for LowCardinalityNullable<C> {
    fn default() -> Self {
        LowCardinalityNullable::new(C::default())
    }
}

impl<C: DictionaryColumn> LowCardinalityNullable<C> {
    /// Wraps `dictionary`, which must be empty.
    pub fn new(dictionary: C) -> LowCardinalityNullable<C> {
        LowCardinalityNullable {
            meta: ColumnMeta::default(),
            dict: Dictionary::new(dictionary, true),
        }
    }

    /// Returns the dictionary. Position 0 holds the null placeholder.
    pub fn dictionary(&self) -> &C {
        &self.dict.column
    }

    /// Returns each row's position in the dictionary, 0 for null rows.
    pub fn indices(&self) -> &[u64] {
        &self.dict.indices
    }

    /// Returns the index width of the last block read or, for a column being
    /// encoded, the width the next flush will use.
    pub fn index_width(&self) -> IndexWidth {
        self.dict.index_width()
    }

    /// Appends a null row.
    pub fn append_nil(&mut self) {
        self.dict.push_null();
    }

    /// Reports whether row `row` is null.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_is_nil(&self, row: usize) -> bool {
        self.dict.indices[row] == 0
    }
}

impl<C: DictionaryColumn> Column for LowCardinalityNullable<C> {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.dict.indices.len()
    }

    fn structural_type(&self) -> String {
        format!(
            "LowCardinality(Nullable({}))",
            self.dict.column.structural_type()
        )
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        match desc.type_param(0) {
            Some(nullable) if desc.is_wrapper("LowCardinality") => match nullable.type_param(0) {
                Some(inner) if nullable.is_wrapper("Nullable") => {
                    self.dict.column.validate_type(inner, opts)
                }
                _ => Err(ColumnError::mismatch(desc, self.structural_type())),
            },
            _ => Err(ColumnError::mismatch(desc, self.structural_type())),
        }
    }

    fn read_prefix(&mut self, r: &mut dyn Read) -> Result<(), ColumnError> {
        Dictionary::<C>::read_prefix(r)
    }

    fn write_prefix(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        Dictionary::<C>::write_prefix(w)
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        self.dict.read_raw(num_rows, r)
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        self.dict.write_to(w)
    }

    fn reset(&mut self) {
        self.dict.reset();
    }

    fn append_empty(&mut self) {
        self.dict.push_null();
    }

    fn truncate(&mut self, num_rows: usize) {
        self.dict.indices.truncate(num_rows);
    }

    fn reserve(&mut self, bytes: usize) {
        self.dict.reserve(bytes);
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        if value.is_null() {
            self.dict.push_null();
            Ok(())
        } else {
            self.dict.append_any(value)
        }
    }

    fn row_any(&self, row: usize) -> Value {
        match self.dict.dictionary_row(row) {
            0 => Value::Null,
            pos => self.dict.column.row_any(pos),
        }
    }
}

impl<C: DictionaryColumn + ColumnAppend> ColumnAppend for LowCardinalityNullable<C> {
    type Value<'v> = Option<C::Value<'v>>;

    fn append(&mut self, value: Option<C::Value<'_>>) {
        match value {
            Some(value) => {
                self.dict.column.append(value);
                self.dict.intern_last();
            }
            None => self.dict.push_null(),
        }
    }
}

impl<C: DictionaryColumn + ColumnRead> ColumnRead for LowCardinalityNullable<C> {
    type Item<'a>
        = Option<C::Item<'a>>
    where
        Self: 'a;

    fn row(&self, row: usize) -> Option<C::Item<'_>> {
        match self.dict.dictionary_row(row) {
            0 => None,
            pos => Some(self.dict.column.row(pos)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::fixed::FixedColumn;
    use crate::column::string::StringColumn;
    use crate::column::ColumnExt;
    use crate::settings::DBMS_TCP_PROTOCOL_VERSION;

    fn block(
        typ: u64,
        dictionary: &[u8],
        dictionary_size: u64,
        indices: &[u8],
        rows: u64,
    ) -> Vec<u8> {
        let mut wire = Vec::new();
        wire.extend_from_slice(&typ.to_le_bytes());
        wire.extend_from_slice(&dictionary_size.to_le_bytes());
        wire.extend_from_slice(dictionary);
        wire.extend_from_slice(&rows.to_le_bytes());
        wire.extend_from_slice(indices);
        wire
    }

    #[test]
    fn test_dedup_wire_format() {
        let mut col = StringColumn::new().low_cardinality();
        col.append_multi([&b"a"[..], b"b", b"a", b"c"]);
        assert_eq!(col.indices(), &[0, 1, 0, 2]);
        assert_eq!(col.dictionary().num_rows(), 3);
        assert_eq!(col.index_width(), IndexWidth::U8);

        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        assert_eq!(
            wire,
            block(HAS_ADDITIONAL_KEYS, b"\x01a\x01b\x01c", 3, &[0, 1, 0, 2], 4)
        );

        let mut decoded = StringColumn::new().low_cardinality();
        decoded.read_raw(4, &mut &wire[..]).unwrap();
        assert_eq!(
            decoded.rows().collect::<Vec<_>>(),
            vec![&b"a"[..], b"b", b"a", b"c"]
        );
        assert_eq!(decoded.row_any(3), Value::from("c"));
    }

    #[test]
    fn test_reserve_follows_index_width() {
        let mut col = FixedColumn::<u32>::new().low_cardinality();
        col.reserve(64);
        assert!(col.dict.indices.capacity() >= 64);

        let mut col = FixedColumn::<u32>::new().low_cardinality();
        col.append_multi(0..256);
        assert_eq!(col.index_width(), IndexWidth::U16);
        let before = col.dict.indices.len();
        col.reserve(1024);
        assert!(col.dict.indices.capacity() >= before + 512);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut col = LowCardinalityNullable::new(StringColumn::new());
        col.append_multi([Some(&b"abc"[..]), None, Some(&b"defg"[..]), Some(&b"abc"[..])]);
        let data = col.dictionary().capacity();
        let indices = col.dict.indices.capacity();
        let positions = col.dict.positions.capacity();

        col.reset();
        assert_eq!(col.num_rows(), 0);
        assert_eq!(col.dictionary().num_rows(), 1);
        assert_eq!(col.dictionary().row(0), b"");
        assert_eq!(col.dictionary().capacity(), data);
        assert_eq!(col.dict.indices.capacity(), indices);
        assert_eq!(col.dict.positions.capacity(), positions);

        col.append_multi([None, Some(&b"abc"[..])]);
        assert_eq!(col.indices(), &[0, 1]);
        assert!(col.row_is_nil(0));
        assert_eq!(col.row(1), Some(&b"abc"[..]));
    }

    #[test]
    fn test_nullable_sentinel() {
        let mut col = LowCardinalityNullable::new(StringColumn::new());
        let rows = vec![Some(&b"x"[..]), None, Some(&b""[..]), Some(&b"x"[..]), None];
        col.append_multi(rows.clone());
        assert_eq!(col.indices(), &[1, 0, 2, 1, 0]);
        assert_eq!(col.dictionary().num_rows(), 3);
        assert!(col.row_is_nil(1));
        assert_eq!(col.row(2), Some(&b""[..]));

        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        let mut decoded = LowCardinalityNullable::new(StringColumn::new());
        decoded.read_raw(5, &mut &wire[..]).unwrap();
        assert_eq!(decoded.rows().collect::<Vec<_>>(), rows);
        assert_eq!(decoded.row_any(1), Value::Null);

        col.reset();
        assert_eq!(col.num_rows(), 0);
        assert_eq!(col.dictionary().num_rows(), 1);
        col.append(Some(&b"y"[..]));
        assert_eq!(col.indices(), &[1]);
    }

    #[test]
    fn test_repeated_value() {
        let mut col = FixedColumn::<i64>::new().low_cardinality();
        col.append_multi(std::iter::repeat(7).take(100));
        assert_eq!(col.dictionary().num_rows(), 1);
        assert!(col.indices().iter().all(|i| *i == 0));

        let mut col = LowCardinalityNullable::new(FixedColumn::<i64>::new());
        col.append_multi(std::iter::repeat(Some(7)).take(100));
        assert_eq!(col.dictionary().num_rows(), 2);
        assert!(col.indices().iter().all(|i| *i == 1));
    }

    #[test]
    fn test_index_width_thresholds() {
        assert_eq!(IndexWidth::for_dictionary_size(255), IndexWidth::U8);
        assert_eq!(IndexWidth::for_dictionary_size(256), IndexWidth::U16);
        assert_eq!(IndexWidth::for_dictionary_size(65535), IndexWidth::U16);
        assert_eq!(IndexWidth::for_dictionary_size(65536), IndexWidth::U32);

        let mut col = FixedColumn::<u32>::new().low_cardinality();
        col.append_multi(0..255);
        assert_eq!(col.index_width(), IndexWidth::U8);
        col.append(255);
        assert_eq!(col.index_width(), IndexWidth::U16);
        let mut wire = Vec::new();
        col.write_to(&mut wire).unwrap();
        assert_eq!(&wire[..8], &(1 | HAS_ADDITIONAL_KEYS).to_le_bytes());

        let mut decoded = FixedColumn::<u32>::new().low_cardinality();
        decoded.read_raw(256, &mut &wire[..]).unwrap();
        assert_eq!(decoded.index_width(), IndexWidth::U16);
        assert_eq!(decoded.row(255), 255);
    }

    #[test]
    fn test_malformed_index() {
        let wire = block(HAS_ADDITIONAL_KEYS, b"\x01a\x01b", 2, &[0, 2, 1], 3);
        let mut col = StringColumn::new().low_cardinality();
        match col.read_raw(3, &mut &wire[..]) {
            Err(ColumnError::MalformedDictionaryIndex {
                row,
                index,
                dictionary_size,
            }) => {
                assert_eq!((row, index, dictionary_size), (1, 2, 2));
            }
            res => panic!("unexpected result {res:?}"),
        }
    }

    #[test]
    fn test_rejects_unsupported_framing() {
        let mut col = StringColumn::new().low_cardinality();
        let wire = block(NEED_GLOBAL_DICTIONARY | HAS_ADDITIONAL_KEYS, b"", 0, &[], 0);
        assert!(matches!(
            col.read_raw(1, &mut &wire[..]),
            Err(ColumnError::Unsupported(_))
        ));
        let wire = block(HAS_ADDITIONAL_KEYS | 7, b"", 0, &[], 0);
        assert!(matches!(
            col.read_raw(1, &mut &wire[..]),
            Err(ColumnError::Malformed(_))
        ));
        let wire = block(HAS_ADDITIONAL_KEYS, b"\x01a", 1, &[0], 2);
        assert!(matches!(
            col.read_raw(1, &mut &wire[..]),
            Err(ColumnError::Malformed(_))
        ));
        assert!(matches!(
            col.read_prefix(&mut &2u64.to_le_bytes()[..]),
            Err(ColumnError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_block() {
        let col = StringColumn::new().low_cardinality();
        let mut wire = Vec::new();
        assert_eq!(col.write_to(&mut wire).unwrap(), 0);
        let mut decoded = StringColumn::new().low_cardinality();
        decoded.read_raw(0, &mut &wire[..]).unwrap();
        assert_eq!(decoded.num_rows(), 0);
    }

    #[test]
    fn test_header_carries_key_version() {
        let mut col = StringColumn::new().low_cardinality();
        col.set_name("lc".into());
        col.set_type("LowCardinality(String)".into());
        col.append(b"v");
        let mut wire = Vec::new();
        col.header_writer(&mut wire, DBMS_TCP_PROTOCOL_VERSION).unwrap();
        col.write_to(&mut wire).unwrap();

        let mut decoded = StringColumn::new().low_cardinality();
        let mut r = &wire[..];
        decoded
            .header_reader(&mut r, true, DBMS_TCP_PROTOCOL_VERSION, 1)
            .unwrap();
        decoded.validate(false).unwrap();
        decoded.read_raw(1, &mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(decoded.row(0), b"v");
    }

    #[test]
    fn test_validate() {
        let opts = ValidateOptions {
            strict: true,
            for_insert: false,
        };
        let mut col = LowCardinalityNullable::new(StringColumn::new());
        col.validate_type(
            &TypeDesc::parse("LowCardinality(Nullable(String))").unwrap(),
            opts,
        )
        .unwrap();
        assert!(col
            .validate_type(&TypeDesc::parse("LowCardinality(String)").unwrap(), opts)
            .is_err());

        let mut col = StringColumn::new().low_cardinality();
        assert!(col
            .validate_type(
                &TypeDesc::parse("LowCardinality(Nullable(String))").unwrap(),
                opts
            )
            .is_err());
    }

    #[test]
    fn test_append_any() {
        let mut col = FixedColumn::<u8>::new().low_cardinality();
        col.append_any(&Value::Int64(3)).unwrap();
        col.append_any(&Value::UInt16(3)).unwrap();
        let err = col.append_any(&Value::Int64(-3)).unwrap_err();
        assert!(matches!(err, ColumnError::Convert { row: 2, .. }));
        assert!(col.append_any(&Value::Null).is_err());
        assert_eq!(col.indices(), &[0, 0]);
        assert_eq!(col.dictionary().num_rows(), 1);

        let mut col = LowCardinalityNullable::new(FixedColumn::<u8>::new());
        col.append_any(&Value::Null).unwrap();
        col.append_any(&Value::UInt8(0)).unwrap();
        assert_eq!(col.indices(), &[0, 1]);
        assert_eq!(col.row_any(1), Value::UInt8(0));
    }
}
