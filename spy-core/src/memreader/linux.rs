// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Linux `/proc/<pid>/mem` variant of the process memory reader,
//! ported from `mem_reader_linux.go`.

use std::fs::{self, File};
use std::os::unix::fs::FileExt;

use crate::binary::loader::BinaryLoader;
use crate::error::{GospyError, Result};

use super::RawMemReader;

const AT_NULL: u64 = 0;
const AT_ENTRY: u64 = 9;

/// Walks `/proc/<pid>/auxv`'s (tag, value) word pairs looking for
/// `AT_ENTRY`, the observed in-process entry address. Ported from
/// `parseAuxvEntry`.
fn parse_auxv_entry(data: &[u8], ptr_size: u8) -> u64 {
    let word = ptr_size as usize;
    let mut off = 0;
    loop {
        if off + 2 * word > data.len() {
            return 0;
        }
        let tag = read_uint_raw(&data[off..off + word], ptr_size);
        let val = read_uint_raw(&data[off + word..off + 2 * word], ptr_size);
        off += 2 * word;
        match tag {
            AT_ENTRY => return val,
            AT_NULL => return 0,
            _ => continue,
        }
    }
}

fn read_uint_raw(buf: &[u8], ptr_size: u8) -> u64 {
    if ptr_size == 4 {
        u32::from_le_bytes(buf[..4].try_into().unwrap()) as u64
    } else {
        u64::from_le_bytes(buf[..8].try_into().unwrap())
    }
}

pub struct LinuxMemReader {
    file: File,
    ptr_size: u8,
    static_base: u64,
}

impl LinuxMemReader {
    pub fn open(pid: i32, loader: &dyn BinaryLoader) -> Result<Self> {
        let auxv_path = format!("/proc/{pid}/auxv");
        let auxv = fs::read(&auxv_path)
            .map_err(|e| GospyError::ReadFailed {
                addr: 0,
                source: format!("reading {auxv_path}: {e}"),
            })?;

        let ptr_size = loader.ptr_size();
        let observed_entry = parse_auxv_entry(&auxv, ptr_size);
        let static_base = observed_entry.wrapping_sub(loader.entry());

        let mem_path = format!("/proc/{pid}/mem");
        let file = File::open(&mem_path).map_err(|e| GospyError::ReadFailed {
            addr: 0,
            source: format!("opening {mem_path}: {e}"),
        })?;

        Ok(LinuxMemReader {
            file,
            ptr_size,
            static_base,
        })
    }
}

impl RawMemReader for LinuxMemReader {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        // /proc/<pid>/mem permits full-size reads across ELF section gaps;
        // a partial read (rather than an error) at an unmapped page is the
        // common failure shape, so surface whatever was transferred.
        match self.file.read_at(buf, offset) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn ptr_size(&self) -> u8 {
        self.ptr_size
    }

    fn static_base(&self) -> u64 {
        self.static_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_at_entry_tag() {
        let ptr_size = 8u8;
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u64.to_le_bytes()); // AT_PHDR
        buf.extend_from_slice(&0x1000u64.to_le_bytes());
        buf.extend_from_slice(&AT_ENTRY.to_le_bytes());
        buf.extend_from_slice(&0xdead_beefu64.to_le_bytes());
        buf.extend_from_slice(&AT_NULL.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());

        assert_eq!(parse_auxv_entry(&buf, ptr_size), 0xdead_beef);
    }

    #[test]
    fn missing_entry_tag_yields_zero() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&AT_NULL.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(parse_auxv_entry(&buf, 8), 0);
    }
}
