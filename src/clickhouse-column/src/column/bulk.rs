// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Bulk access to plain-old-data fixed-width columns.
//!
//! On little-endian hosts the wire encoding of a numeric column is exactly its
//! in-memory representation, so whole blocks can be copied (or reinterpreted)
//! at once instead of decoding row by row. Both entry points fall back to the
//! element-wise path elsewhere.

use bytemuck::Pod;

use crate::column::fixed::{FixedColumn, FixedValue};
use crate::column::Column;

impl<T: FixedValue + Pod> FixedColumn<T> {
    /// Copies the first `dst.len()` rows into `dst`. Equivalent to
    /// [`FixedColumn::fill`].
    ///
    /// # Panics
    ///
    /// Panics if `dst` is longer than the column.
    #[cfg(target_endian = "little")]
    pub fn fill_bulk(&self, dst: &mut [T]) {
        assert!(dst.len() <= self.num_rows(), "fill past end of column");
        let bytes = &self.as_bytes()[..dst.len() * T::WIDTH];
        bytemuck::cast_slice_mut::<T, u8>(dst).copy_from_slice(bytes);
    }

    /// Copies the first `dst.len()` rows into `dst`. Equivalent to
    /// [`FixedColumn::fill`].
    ///
    /// # Panics
    ///
    /// Panics if `dst` is longer than the column.
    #[cfg(not(target_endian = "little"))]
    pub fn fill_bulk(&self, dst: &mut [T]) {
        self.fill(dst)
    }

    /// Reinterprets the payload as a slice of rows without copying, if the
    /// buffer happens to be suitably aligned.
    #[cfg(target_endian = "little")]
    pub fn as_slice(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.as_bytes()).ok()
    }

    /// Reinterprets the payload as a slice of rows without copying, which is
    /// never possible on big-endian hosts.
    #[cfg(not(target_endian = "little"))]
    pub fn as_slice(&self) -> Option<&[T]> {
        None
    }
}
