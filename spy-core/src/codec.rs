// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-width little-endian primitive decoders (spec §4.1).
//!
//! These are pure functions over an in-memory byte slice; they never touch
//! target process memory themselves. Callers (the memory reader, the
//! parsers) are responsible for getting the bytes here.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{GospyError, Result};

fn require(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        return Err(GospyError::MalformedRuntime(format!(
            "buffer too short: need {n} bytes, have {}",
            buf.len()
        )));
    }
    Ok(())
}

pub fn u8_at(buf: &[u8]) -> Result<u8> {
    require(buf, 1)?;
    Ok(buf[0])
}

pub fn bool_at(buf: &[u8]) -> Result<bool> {
    Ok(u8_at(buf)? != 0)
}

pub fn u16_at(buf: &[u8]) -> Result<u16> {
    require(buf, 2)?;
    Ok(LittleEndian::read_u16(buf))
}

pub fn u32_at(buf: &[u8]) -> Result<u32> {
    require(buf, 4)?;
    Ok(LittleEndian::read_u32(buf))
}

pub fn i32_at(buf: &[u8]) -> Result<i32> {
    require(buf, 4)?;
    Ok(LittleEndian::read_i32(buf))
}

pub fn u64_at(buf: &[u8]) -> Result<u64> {
    require(buf, 8)?;
    Ok(LittleEndian::read_u64(buf))
}

pub fn i64_at(buf: &[u8]) -> Result<i64> {
    require(buf, 8)?;
    Ok(LittleEndian::read_i64(buf))
}

pub fn f64_at(buf: &[u8]) -> Result<f64> {
    require(buf, 8)?;
    Ok(LittleEndian::read_f64(buf))
}

/// A Go slice header: `(data pointer, length, capacity)`, 24 bytes on a
/// 64-bit target. Length may not exceed capacity — a target that violates
/// this has a corrupt or concurrently-mutated runtime structure, which is a
/// hard error (`MalformedRuntime`), not something to tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    pub data_ptr: u64,
    pub len: u64,
    pub cap: u64,
}

pub const SLICE_HEADER_SIZE: usize = 24;

pub fn slice_header_at(buf: &[u8]) -> Result<SliceHeader> {
    require(buf, SLICE_HEADER_SIZE)?;
    let data_ptr = u64_at(&buf[0..8])?;
    let len = u64_at(&buf[8..16])?;
    let cap = u64_at(&buf[16..24])?;
    if len > cap {
        return Err(GospyError::MalformedRuntime(format!(
            "slice length {len} exceeds capacity {cap}"
        )));
    }
    Ok(SliceHeader { data_ptr, len, cap })
}

/// A Go string header: `(data pointer, length)`, 16 bytes on a 64-bit
/// target.
pub fn string_header_at(buf: &[u8]) -> Result<(u64, u64)> {
    require(buf, 16)?;
    Ok((u64_at(&buf[0..8])?, u64_at(&buf[8..16])?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_primitives() {
        assert_eq!(u8_at(&[0x7f]).unwrap(), 0x7f);
        assert!(bool_at(&[1]).unwrap());
        assert!(!bool_at(&[0]).unwrap());
        assert_eq!(u32_at(&[0x01, 0x00, 0x00, 0x00]).unwrap(), 1);
        assert_eq!(u64_at(&[1, 0, 0, 0, 0, 0, 0, 0]).unwrap(), 1);
    }

    #[test]
    fn malformed_buffer_is_an_error() {
        assert!(u64_at(&[0, 0, 0]).is_err());
        assert!(slice_header_at(&[0; 10]).is_err());
    }

    // spec §8: round-trip — decoding a 24-byte slice header with
    // (ptr=P, len=L, cap=C) then re-decoding the same bytes yields (P, L, C).
    #[test]
    fn slice_header_round_trips() {
        let mut buf = [0u8; 24];
        LittleEndian::write_u64(&mut buf[0..8], 0xdead_beef);
        LittleEndian::write_u64(&mut buf[8..16], 3);
        LittleEndian::write_u64(&mut buf[16..24], 8);

        let a = slice_header_at(&buf).unwrap();
        let b = slice_header_at(&buf).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.data_ptr, 0xdead_beef);
        assert_eq!(a.len, 3);
        assert_eq!(a.cap, 8);
        assert!(a.len <= a.cap);
    }

    #[test]
    fn slice_header_rejects_len_over_cap() {
        let mut buf = [0u8; 24];
        LittleEndian::write_u64(&mut buf[8..16], 10);
        LittleEndian::write_u64(&mut buf[16..24], 2);
        assert!(slice_header_at(&buf).is_err());
    }
}
