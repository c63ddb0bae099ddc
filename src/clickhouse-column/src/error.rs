// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Column codec errors.

use std::io;

use thiserror::Error;

use crate::types::{TypeDesc, TypeParseError};
use crate::value::ValueKind;

/// An error produced while validating, encoding or decoding a column.
#[derive(Error, Debug)]
pub enum ColumnError {
    /// The wire-declared type can't be bound to the column's structural type.
    #[error(
        "column {column:?}: declared type {declared} is incompatible with {bound}{}",
        .detail.as_ref().map(|d| format!(" ({d})")).unwrap_or_default()
    )]
    TypeMismatch {
        /// The column's name, empty for nested columns.
        column: String,
        /// The type declared on the wire.
        declared: String,
        /// The structural type of the bound column.
        bound: String,
        /// The innermost mismatch, when it differs from the outer types.
        detail: Option<String>,
    },
    /// Validation was requested before a wire type was declared.
    #[error("column {column:?} has no declared type")]
    UndeclaredType {
        /// The column's name.
        column: String,
    },
    /// A dynamic value could not be converted without loss.
    #[error("row {row}: {source}")]
    Convert {
        /// The row being appended or scanned.
        row: usize,
        /// The underlying conversion failure.
        #[source]
        source: ConvertError,
    },
    /// The underlying reader or writer failed.
    #[error("{context}: {source}")]
    Io {
        /// The sub-component that was being read or written.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A low cardinality index points past the end of its dictionary.
    #[error(
        "low cardinality index {index} at row {row} exceeds dictionary of size {dictionary_size}"
    )]
    MalformedDictionaryIndex {
        /// The offending row.
        row: usize,
        /// The offending index.
        index: u64,
        /// The number of entries in the dictionary.
        dictionary_size: usize,
    },
    /// The block is structurally invalid.
    #[error("malformed block: {0}")]
    Malformed(String),
    /// A wire type descriptor could not be parsed.
    #[error(transparent)]
    TypeParse(#[from] TypeParseError),
    /// The server used a protocol feature this codec does not implement.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ColumnError {
    /// Constructs a type mismatch between `declared` and `bound` for a nested
    /// column. [`crate::Column::validate`] fills in the column name.
    pub fn mismatch(declared: &TypeDesc, bound: impl Into<String>) -> ColumnError {
        ColumnError::TypeMismatch {
            column: String::new(),
            declared: declared.to_string(),
            bound: bound.into(),
            detail: None,
        }
    }

    /// Constructs an I/O error tagged with `context`.
    pub fn io(context: impl Into<String>, source: io::Error) -> ColumnError {
        ColumnError::Io {
            context: context.into(),
            source,
        }
    }

    /// Prefixes the context of an I/O error with the name of the enclosing
    /// component, e.g. `array values: string data`. Other errors pass through.
    pub fn within(self, outer: &str) -> ColumnError {
        match self {
            ColumnError::Io { context, source } => ColumnError::Io {
                context: format!("{outer}: {context}"),
                source,
            },
            other => other,
        }
    }

    /// Re-anchors a conversion error at `row` of the enclosing column.
    pub fn at_row(self, row: usize) -> ColumnError {
        match self {
            ColumnError::Convert { source, .. } => ColumnError::Convert { row, source },
            other => other,
        }
    }
}

/// A failed conversion between dynamic [`crate::Value`]s.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConvertError {
    /// The value does not fit the target's range.
    #[error("value {value} is out of range for {to:?}")]
    Overflow {
        /// The rendered source value.
        value: String,
        /// The target kind.
        to: ValueKind,
    },
    /// The conversion would discard information, e.g. a fractional part.
    #[error("converting {value} to {to:?} would lose precision")]
    PrecisionLoss {
        /// The rendered source value.
        value: String,
        /// The target kind.
        to: ValueKind,
    },
    /// No conversion exists between the two kinds.
    #[error("cannot convert {from:?} to {to:?}")]
    Incompatible {
        /// The source kind.
        from: ValueKind,
        /// The target kind.
        to: ValueKind,
    },
    /// A textual value could not be parsed as the target kind.
    #[error("invalid {to:?} value {value:?}: {reason}")]
    Invalid {
        /// The rendered source value.
        value: String,
        /// The target kind.
        to: ValueKind,
        /// Why parsing failed.
        reason: String,
    },
    /// A null was supplied where the column can't represent one.
    #[error("unexpected NULL for non-nullable {to:?}")]
    UnexpectedNull {
        /// The target kind.
        to: ValueKind,
    },
}

impl ConvertError {
    /// Attaches a row number, producing a [`ColumnError`].
    pub fn at_row(self, row: usize) -> ColumnError {
        ColumnError::Convert { row, source: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_nests_io_context() {
        let err = ColumnError::io(
            "string data",
            io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
        )
        .within("array values")
        .within("map values");
        assert_eq!(err.to_string(), "map values: array values: string data: eof");

        let err = ColumnError::Malformed("x".into()).within("array values");
        assert_eq!(err.to_string(), "malformed block: x");
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = ColumnError::TypeMismatch {
            column: "c".into(),
            declared: "Array(Int32)".into(),
            bound: "Array(Int64)".into(),
            detail: Some("Int32 does not match Int64".into()),
        };
        assert_eq!(
            err.to_string(),
            "column \"c\": declared type Array(Int32) is incompatible with Array(Int64) \
             (Int32 does not match Int64)"
        );
    }
}
