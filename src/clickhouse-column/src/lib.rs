// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Columnar encoding and decoding for the ClickHouse native protocol.
//!
//! The native protocol ships data in blocks: for every column of a block the
//! sender writes a small header (name, type, protocol-gated flags), an
//! optional per-column state prefix, and then the column's payload for all of
//! the block's rows at once. This crate implements the payload half of that
//! exchange: it turns Rust values into column payloads and back.
//!
//! The primary abstraction is the object safe [`Column`] trait, which is what
//! a connection layer drives: header exchange, [`Column::validate`],
//! [`Column::read_raw`] and [`Column::write_to`]. Concrete column types
//! compose by ownership rather than by inheritance:
//!
//! - [`FixedColumn`] stores any [`FixedValue`]: integers, floats, `Bool`,
//!   UUIDs, IP addresses, wide integers and `FixedString(N)`.
//! - [`StringColumn`] stores length-prefixed byte strings.
//! - [`DecimalColumn`] and [`TemporalColumn`] are annotated views over fixed
//!   width integer storage.
//! - [`Nullable`], [`Array`], [`Map`], [`LowCardinality`] and
//!   [`LowCardinalityNullable`] wrap other columns to any depth, e.g.
//!   `Array<Nullable<FixedColumn<i64>>>` for `Array(Nullable(Int64))`.
//!
//! Call sites that know their types statically use [`ColumnAppend`] and
//! [`ColumnRead`]. Call sites that don't (literals, JSON documents, user
//! supplied slices) go through the dynamic bridge: [`Column::append_any`],
//! [`Column::row_any`] and [`scan`], all of which traffic in [`Value`] and
//! refuse to silently truncate.
//!
//! ```
//! use mz_clickhouse_column::{Array, Column, ColumnAppend, ColumnRead, FixedColumn, Nullable};
//!
//! let mut col = Array::new(Nullable::new(FixedColumn::<i64>::new()));
//! col.append(vec![Some(1), None]);
//! col.append(vec![Some(2), Some(3), None]);
//!
//! let mut wire = Vec::new();
//! col.write_to(&mut wire).unwrap();
//!
//! let mut decoded = Array::new(Nullable::new(FixedColumn::<i64>::new()));
//! decoded.read_raw(2, &mut &wire[..]).unwrap();
//! assert_eq!(decoded.row(1), vec![Some(2), Some(3), None]);
//! ```

#![warn(missing_docs)]
#![warn(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod adt;
pub mod cast;
pub mod column;
pub mod error;
pub mod settings;
pub mod types;
pub mod value;
pub mod wire;

pub use crate::adt::{I256, U256};
pub use crate::column::array::Array;
pub use crate::column::decimal::{
    Decimal128Column, Decimal256Column, Decimal32Column, Decimal64Column, DecimalColumn,
    DecimalRepr,
};
pub use crate::column::fixed::{FixedColumn, FixedValue};
pub use crate::column::low_cardinality::{
    DictionaryColumn, IndexWidth, LowCardinality, LowCardinalityNullable,
};
pub use crate::column::map::Map;
pub use crate::column::nothing::NothingColumn;
pub use crate::column::nullable::Nullable;
pub use crate::column::string::StringColumn;
pub use crate::column::temporal::{
    Date32Column, DateColumn, DateTime64Column, DateTimeColumn, TemporalColumn, TemporalKind,
};
pub use crate::column::{
    elem, Column, ColumnAppend, ColumnExt, ColumnMeta, ColumnRead, ValidateOptions,
};
pub use crate::error::{ColumnError, ConvertError};
pub use crate::settings::ColumnSettings;
pub use crate::types::{TypeDesc, TypeParam, TypeParseError};
pub use crate::value::{scan, Decimal, FromValue, Value, ValueKind};
