// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The process memory reader (spec §4.4): a platform-variant random-access
//! byte source over the target's virtual address space, plus the
//! higher-level typed reads (`commonMemReader` in `mem_reader_common.go`)
//! built on top of it.

pub mod linux;

use crate::codec::{self, SliceHeader};
use crate::error::{GospyError, Result};

/// Contract every platform variant implements: a raw, possibly-partial
/// random-access read, plus an idempotent close.
pub trait RawMemReader {
    /// Reads into `buf` starting at absolute virtual address `offset`,
    /// returning the number of bytes actually transferred. A short read is
    /// not itself an error here — callers decide whether a short read is
    /// tolerable.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;
    fn close(&mut self) -> std::io::Result<()>;
    fn ptr_size(&self) -> u8;
    fn static_base(&self) -> u64;
}

/// Typed reads shared by every platform variant, mirroring
/// `commonMemReader`'s methods over the raw `ReadAt` contract.
pub struct MemReader<R: RawMemReader> {
    inner: R,
}

impl<R: RawMemReader> MemReader<R> {
    pub fn new(inner: R) -> Self {
        MemReader { inner }
    }

    pub fn ptr_size(&self) -> u8 {
        self.inner.ptr_size()
    }

    pub fn static_base(&self) -> u64 {
        self.inner.static_base()
    }

    pub fn close(&mut self) -> std::io::Result<()> {
        self.inner.close()
    }

    fn read_exact(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let got = self
            .inner
            .read_at(&mut buf, addr)
            .map_err(|e| GospyError::ReadFailed {
                addr,
                source: e.to_string(),
            })?;
        if got < len {
            return Err(GospyError::ReadTruncated {
                addr,
                wanted: len,
                got,
            });
        }
        Ok(buf)
    }

    pub fn read_bool(&self, addr: u64) -> Result<bool> {
        codec::bool_at(&self.read_exact(addr, 1)?)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8> {
        codec::u8_at(&self.read_exact(addr, 1)?)
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32> {
        codec::u32_at(&self.read_exact(addr, 4)?)
    }

    pub fn read_i32(&self, addr: u64) -> Result<i32> {
        codec::i32_at(&self.read_exact(addr, 4)?)
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        codec::u64_at(&self.read_exact(addr, 8)?)
    }

    pub fn read_i64(&self, addr: u64) -> Result<i64> {
        codec::i64_at(&self.read_exact(addr, 8)?)
    }

    pub fn read_f64(&self, addr: u64) -> Result<f64> {
        codec::f64_at(&self.read_exact(addr, 8)?)
    }

    pub fn read_string(&self, addr: u64) -> Result<String> {
        let header = self.read_exact(addr, 16)?;
        let (data_ptr, len) = codec::string_header_at(&header)?;
        if data_ptr == 0 || len == 0 {
            return Ok(String::new());
        }
        let data = self.read_exact(data_ptr, len as usize)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Reads a slice header plus its backing `length * element_size` bytes.
    /// Returns `(data, length)`; an empty slice yields an empty vec.
    pub fn read_slice(&self, addr: u64, element_size: usize) -> Result<(Vec<u8>, u64)> {
        let header = self.read_exact(addr, codec::SLICE_HEADER_SIZE)?;
        let SliceHeader { data_ptr, len, .. } = codec::slice_header_at(&header)?;
        if data_ptr == 0 || len == 0 {
            return Ok((Vec::new(), 0));
        }
        let data = self.read_exact(data_ptr, len as usize * element_size)?;
        Ok((data, len))
    }

    /// Reads a slice of pointer-sized values (spec §4.6 step 2).
    pub fn read_ptr_slice(&self, addr: u64) -> Result<Vec<u64>> {
        let ptr_size = self.ptr_size() as usize;
        let (data, len) = self.read_slice(addr, ptr_size)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut pointers = Vec::with_capacity(len as usize);
        for i in 0..len as usize {
            let off = i * ptr_size;
            let v = if ptr_size == 8 {
                codec::u64_at(&data[off..off + 8])?
            } else {
                codec::u32_at(&data[off..off + 4])? as u64
            };
            pointers.push(v);
        }
        Ok(pointers)
    }

    /// Batch-reads a set of struct windows, one read per non-null pointer,
    /// into a single contiguous buffer (spec §4.6 step 4). Null pointers
    /// leave their window zeroed and are still present at their index so
    /// callers retain a 1:1 correspondence with `ptrs`.
    pub fn read_batch(&self, ptrs: &[u64], struct_size: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; struct_size as usize * ptrs.len()];
        for (i, &ptr) in ptrs.iter().enumerate() {
            if ptr == 0 {
                continue;
            }
            let window = self.read_exact(ptr, struct_size as usize)?;
            let start = i * struct_size as usize;
            buf[start..start + struct_size as usize].copy_from_slice(&window);
        }
        Ok(buf)
    }
}
