// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decodes the function-to-PC line table embedded in `.gopclntab` (spec
//! §4.2). No `debug/gosym`-equivalent crate exists in the dependency
//! corpus, so this is a from-scratch reader over the table's binary layout
//! rather than a port of any single source file; `PCToLine`'s external
//! contract (`PC -> {file, line, func name}`) is what `binary_loader_linux.go`
//! exposes through `gosym.Table`, and this module reproduces that contract.

use std::collections::HashMap;

use crate::codec::{u32_at, u64_at};
use crate::error::{GospyError, Result};

const MAGIC_GO116: u32 = 0xfffffffa;
const MAGIC_GO118: u32 = 0xfffffff0;
const MAGIC_GO120: u32 = 0xfffffff1;

fn is_supported_magic(m: u32) -> bool {
    matches!(m, MAGIC_GO116 | MAGIC_GO118 | MAGIC_GO120)
}

struct Header {
    quantum: u8,
    ptr_size: u8,
    nfunc: u64,
    text_start: u64,
    funcname_off: u64,
    filetab_off: u64,
    pctab_off: u64,
    funcdata_off: u64,
}

fn uintptr_at(buf: &[u8], off: usize, ptr_size: u8) -> Result<u64> {
    if ptr_size == 4 {
        Ok(u32_at(&buf[off..])? as u64)
    } else {
        u64_at(&buf[off..])
    }
}

fn parse_header(data: &[u8]) -> Result<Header> {
    if data.len() < 8 {
        return Err(GospyError::InvalidExecutable(
            "gopclntab too short for header".into(),
        ));
    }
    let magic = u32_at(data)?;
    if !is_supported_magic(magic) {
        return Err(GospyError::InvalidExecutable(format!(
            "unrecognized gopclntab magic 0x{magic:x}"
        )));
    }
    let quantum = data[6];
    let ptr_size = data[7];
    let ps = ptr_size as usize;

    let mut off = 8;
    let nfunc = uintptr_at(data, off, ptr_size)?;
    off += ps;
    let _nfiles = u32_at(&data[off..])?;
    off += 4;
    // padding to align the following uintptr fields on a ptr_size boundary
    off += ps - 4;
    let text_start = uintptr_at(data, off, ptr_size)?;
    off += ps;
    let funcname_off = uintptr_at(data, off, ptr_size)?;
    off += ps;
    let _cu_off = uintptr_at(data, off, ptr_size)?;
    off += ps;
    let filetab_off = uintptr_at(data, off, ptr_size)?;
    off += ps;
    let pctab_off = uintptr_at(data, off, ptr_size)?;
    off += ps;
    let funcdata_off = uintptr_at(data, off, ptr_size)?;

    Ok(Header {
        quantum,
        ptr_size,
        nfunc,
        text_start,
        funcname_off,
        filetab_off,
        pctab_off,
        funcdata_off,
    })
}

const HEADER_SIZE_64: usize = 72;
const HEADER_SIZE_32: usize = 48;

#[derive(Debug, Clone, Copy)]
struct FuncTabEntry {
    entry_off: u32,
    func_off: u32,
}

/// A single `_func` record's fields relevant to line-table lookup.
#[derive(Debug, Clone, Copy)]
struct FuncRecord {
    name_off: i32,
    pcfile: u32,
    pcln: u32,
}

fn read_func_record(funcdata: &[u8], off: u32) -> Result<FuncRecord> {
    let off = off as usize;
    // entryOff(4) nameOff(4) args(4) deferreturn(4) pcsp(4) pcfile(4) pcln(4) ...
    let name_off = crate::codec::i32_at(&funcdata[off + 4..])?;
    let pcfile = u32_at(&funcdata[off + 20..])?;
    let pcln = u32_at(&funcdata[off + 24..])?;
    Ok(FuncRecord {
        name_off,
        pcfile,
        pcln,
    })
}

fn read_cstr(buf: &[u8], off: usize) -> String {
    let rest = &buf[off.min(buf.len())..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

/// Decodes Go's pcvalue varint encoding: a sequence of (pc-delta, value-delta)
/// pairs. Returns the value in effect at `target_pc`, or `None` if the table
/// runs out before reaching it.
fn pcvalue(tab: &[u8], entry: u64, quantum: u8, target_pc: u64) -> Option<i64> {
    let mut p = 0usize;
    let mut pc = entry;
    let mut val: i64 = -1;
    if target_pc < entry {
        return None;
    }
    loop {
        if p >= tab.len() {
            return None;
        }
        let (pc_delta, n) = read_uvarint(&tab[p..])?;
        p += n;
        pc += pc_delta * quantum as u64;
        if pc > target_pc {
            return Some(val);
        }
        if p >= tab.len() {
            return None;
        }
        let (val_delta, n) = read_varint(&tab[p..])?;
        p += n;
        val += val_delta;
    }
}

fn read_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        result |= ((b & 0x7f) as u64) << shift;
        if b & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}

fn read_varint(buf: &[u8]) -> Option<(i64, usize)> {
    let (u, n) = read_uvarint(buf)?;
    let s = ((u as i64) >> 1) ^ -((u & 1) as i64);
    Some((s, n))
}

/// The resolved location of a program counter.
#[derive(Debug, Clone)]
pub struct FuncLoc {
    pub pc: u64,
    pub func_name: String,
    pub file: String,
    pub line: i64,
}

pub struct LineTable {
    data: Vec<u8>,
    header: Header,
    functab: Vec<FuncTabEntry>,
}

impl LineTable {
    pub fn parse(data: Vec<u8>, text_addr_hint: u64) -> Result<Self> {
        let header = parse_header(&data)?;
        let header_size = if header.ptr_size == 8 {
            HEADER_SIZE_64
        } else {
            HEADER_SIZE_32
        };
        let text_start = if header.text_start != 0 {
            header.text_start
        } else {
            text_addr_hint
        };
        let mut header = header;
        header.text_start = text_start;

        let ps = header.ptr_size as usize;
        let nfunc = header.nfunc as usize;
        let mut functab = Vec::with_capacity(nfunc);
        let mut off = header_size;
        // entries are stored as native-uintptr pairs in older layouts but
        // as fixed 4-byte pairs from go1.16 onward regardless of ptr_size.
        let entry_width = if header.ptr_size == 8 { 4 } else { ps };
        for _ in 0..=nfunc {
            if off + entry_width * 2 > data.len() {
                break;
            }
            let entry_off = u32_at(&data[off..])?;
            let func_off = u32_at(&data[off + entry_width..])?;
            functab.push(FuncTabEntry {
                entry_off,
                func_off,
            });
            off += entry_width * 2;
        }
        functab.truncate(nfunc);

        Ok(LineTable {
            data,
            header,
            functab,
        })
    }

    fn funcdata(&self) -> &[u8] {
        &self.data[self.header.funcdata_off as usize..]
    }

    fn funcnametab(&self) -> &[u8] {
        &self.data[self.header.funcname_off as usize..]
    }

    fn pctab(&self) -> &[u8] {
        &self.data[self.header.pctab_off as usize..]
    }

    fn filetab(&self) -> &[u8] {
        &self.data[self.header.filetab_off as usize..]
    }

    /// Binary search over `functab` for the entry whose range contains `pc`
    /// (expressed relative to `text_start`), mirroring `gosym.Table.PCToLine`.
    pub fn pc_to_func(&self, pc: u64) -> Option<FuncLoc> {
        if pc < self.header.text_start {
            return None;
        }
        let rel = pc - self.header.text_start;
        let idx = self
            .functab
            .partition_point(|e| (e.entry_off as u64) <= rel);
        if idx == 0 {
            return None;
        }
        let entry = self.functab[idx - 1];
        let rec = read_func_record(self.funcdata(), entry.func_off).ok()?;

        let func_name = read_cstr(self.funcnametab(), rec.name_off.max(0) as usize);

        let file_idx = pcvalue(
            &self.pctab()[rec.pcfile as usize..],
            self.header.text_start + entry.entry_off as u64,
            self.header.quantum,
            pc,
        )
        .unwrap_or(-1);
        let line =
            pcvalue(
                &self.pctab()[rec.pcln as usize..],
                self.header.text_start + entry.entry_off as u64,
                self.header.quantum,
                pc,
            )
            .unwrap_or(-1);

        let file = if file_idx >= 0 {
            file_offset_to_name(self.filetab(), file_idx as usize)
        } else {
            String::new()
        };

        Some(FuncLoc {
            pc,
            func_name,
            file,
            line,
        })
    }
}

fn file_offset_to_name(filetab: &[u8], idx: usize) -> String {
    let Ok(count) = u32_at(filetab) else {
        return String::new();
    };
    if idx >= count as usize {
        return String::new();
    }
    let entry_off = 4 + idx * 4;
    let Ok(str_off) = u32_at(&filetab[entry_off..]) else {
        return String::new();
    };
    read_cstr(filetab, str_off as usize)
}

/// A flat, memoizable name → address map alongside the line table, built
/// once and shared by the binary loader.
pub type SymbolMap = HashMap<String, u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_magic() {
        let data = vec![0u8; 16];
        assert!(parse_header(&data).is_err());
    }

    #[test]
    fn uvarint_round_trips_small_values() {
        assert_eq!(read_uvarint(&[0x01]), Some((1, 1)));
        assert_eq!(read_uvarint(&[0x80, 0x01]), Some((128, 2)));
    }

    #[test]
    fn varint_zigzag_decodes_negative() {
        assert_eq!(read_varint(&[0x01]), Some((-1, 1)));
        assert_eq!(read_varint(&[0x02]), Some((1, 1)));
    }
}
