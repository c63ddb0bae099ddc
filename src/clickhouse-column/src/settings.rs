// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Codec settings and protocol revision constants.

use serde::{Deserialize, Serialize};

/// The first protocol revision whose column headers carry a custom
/// serialization flag byte.
pub const DBMS_MIN_PROTOCOL_VERSION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;

/// The protocol revision this codec speaks.
pub const DBMS_TCP_PROTOCOL_VERSION: u64 = 54460;

/// Per-column codec settings.
///
/// These are usually deserialized once from client configuration and applied
/// to every column of a query with [`crate::Column::apply_settings`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnSettings {
    /// Whether validation requires the declared wire type to match the bound
    /// column exactly. When false, fixed-width columns also bind to any wire
    /// type of the same byte width, e.g. an `Int32` column to a `Date32`.
    pub strict: bool,
    /// Bytes to reserve up front in every write buffer.
    pub write_buffer_capacity: usize,
}

impl Default for ColumnSettings {
    fn default() -> ColumnSettings {
        ColumnSettings {
            strict: true,
            write_buffer_capacity: 0,
        }
    }
}
