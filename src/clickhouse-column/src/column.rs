// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The column abstraction.
//!
//! A column owns the payload of one column of one block. On the insert path
//! it accumulates appended rows in wire format and is flushed with
//! [`Column::write_to`]; on the select path [`Column::read_raw`] copies a
//! block's payload into the column, after which rows are projected straight
//! out of the owned buffer.
//!
//! [`Column`] is object safe, so a connection can drive a `Vec<Box<dyn
//! Column>>` without knowing the concrete types. Typed access goes through
//! [`ColumnAppend`] and [`ColumnRead`], whose associated types follow the
//! shape of the column: `Nullable<FixedColumn<i64>>` appends and reads
//! `Option<i64>`, `Array<StringColumn>` appends `Vec<&[u8]>`, and so on.

use std::fmt;
use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::column::array::Array;
use crate::column::low_cardinality::{DictionaryColumn, LowCardinality};
use crate::column::nullable::Nullable;
use crate::error::ColumnError;
use crate::settings::{ColumnSettings, DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::wire::{self, IoContext};

pub mod array;
pub mod bulk;
pub mod decimal;
pub mod fixed;
pub mod low_cardinality;
pub mod map;
pub mod nothing;
pub mod nullable;
pub mod string;
pub mod temporal;

/// Per-column metadata exchanged in the block header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMeta {
    /// The column's name. Empty for nested columns.
    pub name: String,
    /// The wire type, as declared by the server or set by the caller.
    pub declared_type: Option<String>,
    /// Whether [`Column::validate`] requires an exact type match.
    pub strict: bool,
}

impl Default for ColumnMeta {
    fn default() -> ColumnMeta {
        ColumnMeta {
            name: String::new(),
            declared_type: None,
            strict: true,
        }
    }
}

/// Options threaded through [`Column::validate_type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Require an exact structural match rather than a width-compatible one.
    pub strict: bool,
    /// Validating for an insert, in which case parameterized columns must
    /// agree with the declared parameters instead of adopting them.
    pub for_insert: bool,
}

/// A column of one block.
pub trait Column: fmt::Debug + Send {
    /// Returns the column's metadata.
    fn meta(&self) -> &ColumnMeta;

    /// Returns the column's metadata for modification.
    fn meta_mut(&mut self) -> &mut ColumnMeta;

    /// Returns the number of rows appended or read.
    fn num_rows(&self) -> usize;

    /// Renders the wire type this column's structure corresponds to, e.g.
    /// `Array(Nullable(Int64))`.
    fn structural_type(&self) -> String;

    /// Checks that the wire type `desc` can be bound to this column,
    /// recursing into nested columns.
    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions)
        -> Result<(), ColumnError>;

    /// Reads the column kind's state prefix, which precedes the first block's
    /// payload.
    fn read_prefix(&mut self, _r: &mut dyn Read) -> Result<(), ColumnError> {
        Ok(())
    }

    /// Writes the column kind's state prefix, returning the bytes written.
    fn write_prefix(&self, _w: &mut dyn Write) -> Result<usize, ColumnError> {
        Ok(0)
    }

    /// Replaces the column's contents with the payload of a block of
    /// `num_rows` rows, consuming exactly that payload from `r`.
    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError>;

    /// Writes the accumulated payload in wire order, returning the bytes
    /// written. The column is not modified, so a failed write can be retried.
    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError>;

    /// Removes all rows, retaining allocated capacity.
    fn reset(&mut self);

    /// Appends a zero or empty placeholder row.
    fn append_empty(&mut self);

    /// Removes every row past the first `num_rows`.
    fn truncate(&mut self, num_rows: usize);

    /// Reserves `bytes` of additional buffer capacity.
    fn reserve(&mut self, bytes: usize);

    /// Appends a dynamically typed value, converting it to the column's
    /// element type. On failure the column is left as it was.
    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError>;

    /// Projects row `row` into a dynamically typed value.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    fn row_any(&self, row: usize) -> Value;

    /// Returns the column's name.
    fn name(&self) -> &str {
        &self.meta().name
    }

    /// Sets the column's name.
    fn set_name(&mut self, name: String) {
        self.meta_mut().name = name;
    }

    /// Returns the declared wire type, or the structural type if none has
    /// been declared.
    fn column_type(&self) -> String {
        match &self.meta().declared_type {
            Some(typ) => typ.clone(),
            None => self.structural_type(),
        }
    }

    /// Declares the wire type.
    fn set_type(&mut self, typ: String) {
        self.meta_mut().declared_type = Some(typ);
    }

    /// Sets whether validation is strict.
    fn set_strict(&mut self, strict: bool) {
        self.meta_mut().strict = strict;
    }

    /// Applies codec settings.
    fn apply_settings(&mut self, settings: &ColumnSettings) {
        self.set_strict(settings.strict);
        self.reserve(settings.write_buffer_capacity);
    }

    /// Checks the declared wire type against the column's structure.
    ///
    /// `SimpleAggregateFunction(f, T)` validates as `T`. When the mismatch is
    /// nested, the error names the full declared and bound types and carries
    /// the innermost disagreement as detail.
    fn validate(&mut self, for_insert: bool) -> Result<(), ColumnError> {
        let meta = self.meta();
        let column = meta.name.clone();
        let Some(declared) = meta.declared_type.clone() else {
            return Err(ColumnError::UndeclaredType { column });
        };
        let opts = ValidateOptions {
            strict: meta.strict,
            for_insert,
        };
        let desc = TypeDesc::parse(&declared)?;
        let desc = desc.unwrap_simple_aggregate();
        match self.validate_type(desc, opts) {
            Err(ColumnError::TypeMismatch {
                declared: inner_declared,
                bound: inner_bound,
                ..
            }) => {
                let bound = self.structural_type();
                let detail = (inner_declared != desc.to_string() || inner_bound != bound)
                    .then(|| format!("{inner_declared} does not match {inner_bound}"));
                Err(ColumnError::TypeMismatch {
                    column,
                    declared,
                    bound,
                    detail,
                })
            }
            res => res,
        }
    }

    /// Reads the column name and type (when `read_column`) and the
    /// custom serialization flag, but not the state prefix. The server omits
    /// the prefix for blocks without rows.
    fn read_header_fields(
        &mut self,
        r: &mut dyn Read,
        read_column: bool,
        revision: u64,
    ) -> Result<(), ColumnError> {
        if read_column {
            let name = wire::read_string(r).context("column name")?;
            let typ = wire::read_string(r).context("column type")?;
            self.set_name(name);
            self.set_type(typ);
        }
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION {
            let custom = r.read_u8().context("custom serialization flag")?;
            if custom != 0 {
                return Err(ColumnError::Unsupported(format!(
                    "custom serialization for column {:?}",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    /// Reads the column header, followed by the state prefix when the block
    /// has rows. `num_rows` is the row count from the block header, which
    /// mirrors the condition under which [`Column::header_writer`] emits the
    /// prefix.
    fn header_reader(
        &mut self,
        r: &mut dyn Read,
        read_column: bool,
        revision: u64,
        num_rows: usize,
    ) -> Result<(), ColumnError> {
        self.read_header_fields(r, read_column, revision)?;
        if num_rows > 0 {
            self.read_prefix(r)?;
        }
        Ok(())
    }

    /// Writes the column header, followed by the state prefix when the
    /// column has rows to send. Returns the bytes written.
    fn header_writer(&self, w: &mut dyn Write, revision: u64) -> Result<usize, ColumnError> {
        let mut n = wire::write_string(w, self.name()).context("column name")?;
        n += wire::write_string(w, &self.column_type()).context("column type")?;
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION {
            n += wire::write_buf(w, &[0]).context("custom serialization flag")?;
        }
        if self.num_rows() > 0 {
            n += self.write_prefix(w)?;
        }
        Ok(n)
    }
}

impl Column for Box<dyn Column> {
    fn meta(&self) -> &ColumnMeta {
        (**self).meta()
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        (**self).meta_mut()
    }

    fn num_rows(&self) -> usize {
        (**self).num_rows()
    }

    fn structural_type(&self) -> String {
        (**self).structural_type()
    }

    fn validate_type(
        &mut self,
        desc: &TypeDesc,
        opts: ValidateOptions,
    ) -> Result<(), ColumnError> {
        (**self).validate_type(desc, opts)
    }

    fn read_prefix(&mut self, r: &mut dyn Read) -> Result<(), ColumnError> {
        (**self).read_prefix(r)
    }

    fn write_prefix(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        (**self).write_prefix(w)
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        (**self).read_raw(num_rows, r)
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        (**self).write_to(w)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn append_empty(&mut self) {
        (**self).append_empty()
    }

    fn truncate(&mut self, num_rows: usize) {
        (**self).truncate(num_rows)
    }

    fn reserve(&mut self, bytes: usize) {
        (**self).reserve(bytes)
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        (**self).append_any(value)
    }

    fn row_any(&self, row: usize) -> Value {
        (**self).row_any(row)
    }
}

/// Statically typed appends.
pub trait ColumnAppend: Column {
    /// The type of one row.
    type Value<'v>;

    /// Appends one row.
    fn append(&mut self, value: Self::Value<'_>);

    /// Appends every row of `values`.
    fn append_multi<'v>(&mut self, values: impl IntoIterator<Item = Self::Value<'v>>)
    where
        Self: Sized,
    {
        for value in values {
            self.append(value);
        }
    }
}

/// Statically typed row access.
pub trait ColumnRead: Column {
    /// The type of one row, borrowing from the column where possible.
    type Item<'a>
    where
        Self: 'a;

    /// Projects row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    fn row(&self, row: usize) -> Self::Item<'_>;

    /// Appends every row to `out`.
    fn read_all<'a>(&'a self, out: &mut Vec<Self::Item<'a>>) {
        out.reserve(self.num_rows());
        out.extend((0..self.num_rows()).map(|i| self.row(i)));
    }

    /// Iterates over every row.
    fn rows(&self) -> impl Iterator<Item = Self::Item<'_>> + '_
    where
        Self: Sized,
    {
        (0..self.num_rows()).map(move |i| self.row(i))
    }
}

/// Builder-style wrappers for any column.
pub trait ColumnExt: Column + Sized {
    /// Wraps the column in [`Nullable`].
    fn nullable(self) -> Nullable<Self> {
        Nullable::new(self)
    }

    /// Wraps the column in [`Array`].
    fn array(self) -> Array<Self> {
        Array::new(self)
    }

    /// Wraps the column in [`LowCardinality`].
    fn low_cardinality(self) -> LowCardinality<Self>
    where
        Self: DictionaryColumn,
    {
        LowCardinality::new(self)
    }
}

impl<C: Column> ColumnExt for C {}

/// Wraps `column` in `Nullable` (when `nullable`) and then `array_level`
/// levels of `Array`, for shapes only known at runtime.
pub fn elem(column: Box<dyn Column>, array_level: usize, nullable: bool) -> Box<dyn Column> {
    let mut column: Box<dyn Column> = if nullable {
        Box::new(Nullable::new(column))
    } else {
        column
    };
    for _ in 0..array_level {
        column = Box::new(Array::new(column));
    }
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::fixed::FixedColumn;
    use crate::column::string::StringColumn;
    use crate::settings::DBMS_TCP_PROTOCOL_VERSION;

    #[test]
    fn test_elem_structure() {
        let col = elem(Box::new(FixedColumn::<i64>::new()), 2, true);
        assert_eq!(col.structural_type(), "Array(Array(Nullable(Int64)))");
        let col = elem(Box::new(StringColumn::new()), 0, false);
        assert_eq!(col.structural_type(), "String");
    }

    #[test]
    fn test_validate_nested_mismatch() {
        let mut col = FixedColumn::<i64>::new().nullable().array();
        col.set_name("c".into());
        col.set_type("Array(Nullable(Int32))".into());
        match col.validate(false) {
            Err(ColumnError::TypeMismatch {
                column,
                declared,
                bound,
                detail,
            }) => {
                assert_eq!(column, "c");
                assert_eq!(declared, "Array(Nullable(Int32))");
                assert_eq!(bound, "Array(Nullable(Int64))");
                assert_eq!(detail.as_deref(), Some("Int32 does not match Int64"));
            }
            res => panic!("unexpected result {res:?}"),
        }
    }

    #[test]
    fn test_validate_undeclared_and_unparseable() {
        let mut col = FixedColumn::<u8>::new();
        assert!(matches!(
            col.validate(false),
            Err(ColumnError::UndeclaredType { .. })
        ));
        col.set_type("UInt8(".into());
        assert!(matches!(col.validate(false), Err(ColumnError::TypeParse(_))));
    }

    #[test]
    fn test_validate_simple_aggregate() {
        let mut col = FixedColumn::<u64>::new();
        col.set_type("SimpleAggregateFunction(sum, UInt64)".into());
        col.validate(true).unwrap();
    }

    #[test]
    fn test_header_roundtrip() {
        let mut col = StringColumn::new();
        col.set_name("s".into());
        col.set_type("String".into());
        let mut buf = Vec::new();
        let n = col.header_writer(&mut buf, DBMS_TCP_PROTOCOL_VERSION).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(buf, b"\x01s\x06String\x00");

        let mut decoded = StringColumn::new();
        decoded
            .header_reader(&mut &buf[..], true, DBMS_TCP_PROTOCOL_VERSION, 0)
            .unwrap();
        assert_eq!(decoded.name(), "s");
        assert_eq!(decoded.column_type(), "String");

        let mut old = Vec::new();
        col.header_writer(&mut old, 54453).unwrap();
        assert_eq!(old, b"\x01s\x06String");
    }

    #[test]
    fn test_header_custom_serialization_rejected() {
        let buf = b"\x01s\x06String\x01";
        let mut col = StringColumn::new();
        let err = col
            .header_reader(&mut &buf[..], true, DBMS_TCP_PROTOCOL_VERSION, 1)
            .unwrap_err();
        assert!(matches!(err, ColumnError::Unsupported(_)));
    }

    #[test]
    fn test_apply_settings() {
        let mut col = FixedColumn::<i32>::new();
        col.apply_settings(&ColumnSettings {
            strict: false,
            write_buffer_capacity: 64,
        });
        assert!(!col.meta().strict);
        col.set_type("Date32".into());
        col.validate(false).unwrap();
    }
}
