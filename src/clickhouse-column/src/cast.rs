// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Cast utilities.

/// A trait for safe, simple, and infallible casts.
///
/// `CastFrom` is like [`std::convert::From`], but it is implemented for the
/// platform-specific casts that row counts and wire offsets need. The wire
/// format counts rows and offsets in `u64`, while Rust indexes with `usize`;
/// there is no `From<u64> for usize` because Rust may someday support
/// platforms where `usize` is smaller than 64 bits. This crate only supports
/// 64-bit targets, so the cast is lossless here.
///
/// `CastFrom` should be preferred to the `as` operator, since the `as`
/// operator will silently truncate if the target type is smaller than the
/// source type.
pub trait CastFrom<T> {
    /// Performs the cast.
    fn cast_from(from: T) -> Self;
}

macro_rules! cast_from {
    ($from:ty, $to:ty) => {
        impl CastFrom<$from> for $to {
            #[inline]
            #[allow(clippy::cast_possible_truncation)]
            fn cast_from(from: $from) -> $to {
                from as $to
            }
        }
    };
}

cast_from!(u8, usize);
cast_from!(u16, usize);
cast_from!(u32, usize);
#[cfg(target_pointer_width = "64")]
cast_from!(u64, usize);

cast_from!(usize, u64);
cast_from!(usize, u128);
cast_from!(usize, i128);

/// The reciprocal of [`CastFrom`], as [`Into`] is to [`From`].
pub trait CastInto<T> {
    /// Performs the cast.
    fn cast_into(self) -> T;
}

impl<F, T> CastInto<T> for F
where
    T: CastFrom<F>,
{
    #[inline]
    fn cast_into(self) -> T {
        T::cast_from(self)
    }
}
