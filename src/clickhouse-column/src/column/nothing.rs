// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The `Nothing` type, which only ever appears as `Nullable(Nothing)`, the
//! type of a bare `NULL` literal.

use std::io::{self, Read, Write};

use crate::cast::CastFrom;
use crate::column::{Column, ColumnMeta, ValidateOptions};
use crate::error::{ColumnError, ConvertError};
use crate::types::TypeDesc;
use crate::value::{Value, ValueKind};
use crate::wire::{self, IoContext};

/// The placeholder byte the server writes for every row.
const PLACEHOLDER: u8 = b'0';

/// A column of `Nothing`: one meaningless placeholder byte per row.
#[derive(Debug, Default)]
pub struct NothingColumn {
    meta: ColumnMeta,
    num_rows: usize,
}

impl NothingColumn {
    /// Constructs an empty column.
    pub fn new() -> NothingColumn {
        NothingColumn::default()
    }
}

impl Column for NothingColumn {
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
        "Nothing".into()
    }

    fn validate_type(&mut self, desc: &TypeDesc, _: ValidateOptions) -> Result<(), ColumnError> {
        if desc.name() == "Nothing" && desc.params().is_empty() {
            Ok(())
        } else {
            Err(ColumnError::mismatch(desc, "Nothing"))
        }
    }

    fn read_raw(&mut self, num_rows: usize, r: &mut dyn Read) -> Result<(), ColumnError> {
        let want = u64::cast_from(num_rows);
        let got = io::copy(&mut (&mut *r).take(want), &mut io::sink()).context("Nothing data")?;
        if got != want {
            return Err(ColumnError::io(
                "Nothing data",
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {want} bytes, stream ended after {got}"),
                ),
            ));
        }
        self.num_rows = num_rows;
        Ok(())
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<usize, ColumnError> {
        wire::write_buf(w, &vec![PLACEHOLDER; self.num_rows]).context("Nothing data")
    }

    fn reset(&mut self) {
        self.num_rows = 0;
    }

    fn append_empty(&mut self) {
        self.num_rows += 1;
    }

    fn truncate(&mut self, num_rows: usize) {
        self.num_rows = self.num_rows.min(num_rows);
    }

    fn reserve(&mut self, _: usize) {}

    /// Only accepts [`Value::Null`], which must then be wrapped in a
    /// `Nullable` to mean anything.
    fn append_any(&mut self, value: &Value) -> Result<(), ColumnError> {
        if value.is_null() {
            self.append_empty();
            Ok(())
        } else {
            Err(ConvertError::Incompatible {
                from: value.kind(),
                to: ValueKind::Null,
            }
            .at_row(self.num_rows))
        }
    }

    fn row_any(&self, row: usize) -> Value {
        assert!(row < self.num_rows, "row {row} out of bounds");
        Value::Null
    }
}
