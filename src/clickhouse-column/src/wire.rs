// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Primitive encodings shared by every column kind.
//!
//! The native protocol frames variable-length data with unsigned LEB128
//! varints and fixed framing words (row counts, dictionary sizes) with
//! little-endian `u64`s.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BufMut;

use crate::cast::CastFrom;
use crate::error::ColumnError;

/// The longest encoding of a `u64` as a varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` to `buf` as an unsigned varint.
pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        // Truncation to the low seven bits is the point.
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u8(value as u8);
}

/// Reads an unsigned varint, additionally appending its raw bytes to `raw`
/// when provided.
pub fn read_uvarint_into(r: &mut dyn Read, mut raw: Option<&mut Vec<u8>>) -> io::Result<u64> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let byte = r.read_u8()?;
        if let Some(raw) = raw.as_mut() {
            raw.push(byte);
        }
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            break;
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return Ok(value);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "varint overflows a 64-bit integer",
    ))
}

/// Reads an unsigned varint.
pub fn read_uvarint(r: &mut dyn Read) -> io::Result<u64> {
    read_uvarint_into(r, None)
}

/// Appends exactly `len` bytes from `r` to `buf`.
///
/// The buffer grows with the data actually received rather than up front, so
/// a corrupt length can't force a huge allocation before the stream runs dry.
pub fn read_exact_into(r: &mut dyn Read, buf: &mut Vec<u8>, len: usize) -> io::Result<()> {
    let start = buf.len();
    let got = (&mut *r).take(u64::cast_from(len)).read_to_end(buf)?;
    if got != len {
        buf.truncate(start);
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, stream ended after {got}"),
        ));
    }
    Ok(())
}

/// Reads a varint length-prefixed UTF-8 string.
pub fn read_string(r: &mut dyn Read) -> io::Result<String> {
    let len = usize::cast_from(read_uvarint(r)?);
    let mut buf = Vec::new();
    read_exact_into(r, &mut buf, len)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes a varint length-prefixed string, returning the bytes written.
pub fn write_string(w: &mut dyn Write, s: &str) -> io::Result<usize> {
    let mut buf = Vec::with_capacity(s.len() + MAX_VARINT_LEN);
    put_uvarint(&mut buf, u64::cast_from(s.len()));
    buf.extend_from_slice(s.as_bytes());
    w.write_all(&buf)?;
    Ok(buf.len())
}

/// Reads a little-endian `u64` framing word.
pub fn read_u64(r: &mut dyn Read) -> io::Result<u64> {
    r.read_u64::<LittleEndian>()
}

/// Writes a little-endian `u64` framing word, returning the bytes written.
pub fn write_u64(w: &mut dyn Write, value: u64) -> io::Result<usize> {
    w.write_u64::<LittleEndian>(value)?;
    Ok(8)
}

/// Writes `buf` in full, returning the bytes written.
pub fn write_buf(w: &mut dyn Write, buf: &[u8]) -> io::Result<usize> {
    w.write_all(buf)?;
    Ok(buf.len())
}

/// Attaches a component name to I/O failures.
pub(crate) trait IoContext<T> {
    fn context(self, context: &str) -> Result<T, ColumnError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, context: &str) -> Result<T, ColumnError> {
        self.map_err(|e| ColumnError::io(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uvarint() {
        for (value, encoded) in [
            (0u64, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7f]),
            (128, vec![0x80, 0x01]),
            (300, vec![0xac, 0x02]),
            (
                u64::MAX,
                vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01],
            ),
        ] {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, value);
            assert_eq!(buf, encoded, "encoding {value}");
            let mut raw = Vec::new();
            let decoded = read_uvarint_into(&mut &encoded[..], Some(&mut raw)).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(raw, encoded);
        }
    }

    #[test]
    fn test_uvarint_overflow() {
        let bytes = [0xffu8; 11];
        let err = read_uvarint(&mut &bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_uvarint_truncated() {
        let bytes = [0x80u8, 0x80];
        let err = read_uvarint(&mut &bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_string() {
        let mut buf = Vec::new();
        assert_eq!(write_string(&mut buf, "Nullable(Int8)").unwrap(), 15);
        assert_eq!(read_string(&mut &buf[..]).unwrap(), "Nullable(Int8)");
    }

    #[test]
    fn test_read_exact_into_short() {
        let mut buf = vec![9];
        let err = read_exact_into(&mut &[1u8, 2][..], &mut buf, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(buf, vec![9]);
    }
}
