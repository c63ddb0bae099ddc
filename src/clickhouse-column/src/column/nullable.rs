// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The nullable overlay.

use std::io::{Read, Write};

use tracing::trace;

use crate::column::{Column, ColumnAppend, ColumnMeta, ColumnRead, ValidateOptions};
use crate::error::ColumnError;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::wire::{self, IoContext};

/// A `Nullable(T)` column wrapping a column of `T`.
///
/// On the wire a run of one byte per row (1 for null) precedes the wrapped
/// column's payload. Null rows still occupy a placeholder row in the wrapped
/// column, so the two always have the same number of rows.
#[derive(Debug, Default)]
pub struct Nullable<C> {
    meta: ColumnMeta,
    nulls: Vec<u8>,
    inner: C,
}

impl<C: Column> Nullable<C> {
    /// Wraps `inner`, which must be empty.
    pub fn new(inner: C) -> Nullable<C> {
        assert_eq!(inner.num_rows(), 0, "wrapped column must be empty");
        Nullable {
            meta: ColumnMeta::default(),
            nulls: Vec::new(),
            inner,
        }
    }

    /// Returns the wrapped column.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the null map, one byte per row.
    pub fn nulls(&self) -> &[u8] {
        &self.nulls
    }

    /// Appends a null row.
    pub fn append_nil(&mut self) {
        self.nulls.push(1);
        self.inner.append_empty();
    }

    /// Reports whether row `row` is null.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_is_nil(&self, row: usize) -> bool {
        self.nulls[row] != 0
    }
}

impl<C: Column> Column for Nullable<C> {
    fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ColumnMeta {
        &mut self.meta
    }

    fn num_rows(&self) -> usize {
        self.nulls.len()
    }

    fn structural_type(&self) -> String {
        format!("Nullable({})", self.inner.structural_type())
    }

    fn validate_type(&mut self, desc: &TypeDesc, opts: ValidateOptions) -> Result<(), ColumnError> {
        match desc.type_param(0) {
            Some(inner) if desc.is_wrapper("Nullable") => self.inner.validate_type(inner, opts),
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
        self.nulls.clear();
        wire::read_exact_into(r, &mut self.nulls, num_rows).context("nullable map")?;
        self.inner
            .read_raw(num_rows, r)
            .map_err(|e| e.within("nullable values"))?;
        trace!(rows = num_rows, "read nullable column");
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        let n = wire::write_buf(w, &self.nulls).context("nullable map")?;
        let m = self
            .inner
            .write_to(w)
            .map_err(|e| e.within("nullable values"))?;
        Ok(n + m)
    }

    fn reset(&mut self) {
        self.nulls.clear();
        self.inner.reset();
    }

    fn append_empty(&mut self) {
        self.nulls.push(0);
        self.inner.append_empty();
    }

    fn truncate(&mut self, num_rows: usize) {
        self.nulls.truncate(num_rows);
        self.inner.truncate(num_rows);
    }

    fn reserve(&mut self, bytes: usize) {
        self.inner.reserve(bytes);
    }

    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        if value.is_null() {
            self.append_nil();
            return Ok(());
        }
        let row = self.num_rows();
        self.inner.append_any(value).map_err(|e| e.at_row(row))?;
        self.nulls.push(0);
        Ok(())
    }

    fn row_any(&self, row: usize) -> Value {
        if self.row_is_nil(row) {
            Value::Null
        } else {
            self.inner.row_any(row)
        }
    }
}

impl<C: ColumnAppend> ColumnAppend for Nullable<C> {
    type Value<'v> = Option<C::Value<'v>>;

    fn append(&mut self, value: Option<C::Value<'_>>) {
        match value {
            Some(value) => {
                self.nulls.push(0);
                self.inner.append(value);
            }
            None => self.append_nil(),
        }
    }
}

impl<C: ColumnRead> ColumnRead for Nullable<C> {
    type Item<'a>
        = Option<C::Item<'a>>
    where
        Self: 'a;

    fn row(&self, row: usize) -> Option<C::Item<'_>> {
        if self.row_is_nil(row) {
            None
        } else {
            Some(self.inner.row(row))
        }
    }
}
