// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Linux ELF binary loading (spec §4.2).
//!
//! Grounded on `binary_loader_linux.go`'s `Load`/`LoadByPid`/`GetSymbols`
//! shape, using `goblin` for section and symbol-table parsing in place of
//! Go's `debug/elf`. Section lookup follows `build/xtask/src/elf.rs`'s
//! `get_section_by_name` idiom.

use std::fs;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use goblin::elf::Elf;

use super::dwarf::DwarfResolver;
use super::gopclntab::{FuncLoc, LineTable};
use super::loader::BinaryLoader;
use crate::error::{GospyError, Result};

fn get_section_by_name<'a>(elf: &'a Elf, name: &str) -> Option<&'a goblin::elf::SectionHeader> {
    elf.section_headers
        .iter()
        .find(|s| elf.shdr_strtab.get_at(s.sh_name) == Some(name))
}

pub struct LinuxBinaryLoader {
    path: PathBuf,
    ptr_size: u8,
    entry: u64,
    line_table: LineTable,
    symbols: OnceLock<Result<super::gopclntab::SymbolMap>>,
    raw: Vec<u8>,
    dwarf: OnceLock<Result<DwarfResolver>>,
    func_loc_cache: std::sync::Mutex<std::collections::HashMap<u64, Option<FuncLoc>>>,
}

impl LinuxBinaryLoader {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GospyError::BinaryNotFound(path.display().to_string())
            } else {
                GospyError::InvalidExecutable(format!("{}: {e}", path.display()))
            }
        })?;

        let elf = Elf::parse(&raw)
            .map_err(|e| GospyError::InvalidExecutable(format!("{}: {e}", path.display())))?;

        let ptr_size = if elf.is_64 { 8 } else { 4 };
        let entry = elf.entry;

        // §4.2: try the canonical section name first, then the fallback
        // PIE binaries use when the linker places it in the relro segment.
        let gopclntab = get_section_by_name(&elf, ".gopclntab")
            .or_else(|| get_section_by_name(&elf, ".data.rel.ro.gopclntab"))
            .ok_or_else(|| GospyError::InvalidExecutable("missing .gopclntab".into()))?;
        let text = get_section_by_name(&elf, ".text")
            .ok_or_else(|| GospyError::InvalidExecutable("missing .text".into()))?;

        let start = gopclntab.sh_offset as usize;
        let end = start + gopclntab.sh_size as usize;
        let section_data = raw
            .get(start..end)
            .ok_or_else(|| GospyError::InvalidExecutable("truncated .gopclntab".into()))?
            .to_vec();

        let line_table = LineTable::parse(section_data, text.sh_addr)?;

        Ok(LinuxBinaryLoader {
            path: path.to_path_buf(),
            ptr_size,
            entry,
            line_table,
            symbols: OnceLock::new(),
            raw,
            dwarf: OnceLock::new(),
            func_loc_cache: std::sync::Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn load_by_pid(pid: i32) -> Result<Self> {
        let exe_link = format!("/proc/{pid}/exe");
        let target = fs::read_link(&exe_link)
            .map_err(|_| GospyError::BinaryNotFound(format!("pid {pid} exe link")))?;
        Self::load(&target)
    }
}

impl BinaryLoader for LinuxBinaryLoader {
    fn ptr_size(&self) -> u8 {
        self.ptr_size
    }

    fn entry(&self) -> u64 {
        self.entry
    }

    fn symbols(&self) -> Result<&super::gopclntab::SymbolMap> {
        let result = self.symbols.get_or_init(|| {
            let elf = Elf::parse(&self.raw)
                .map_err(|e| GospyError::InvalidExecutable(format!("{e}")))?;
            let mut map = super::gopclntab::SymbolMap::new();
            for sym in &elf.syms {
                if sym.st_value == 0 {
                    continue;
                }
                if let Some(name) = elf.strtab.get_at(sym.st_name) {
                    map.insert(name.to_string(), sym.st_value);
                }
            }
            Ok(map)
        });
        result.as_ref().map_err(clone_err)
    }

    fn find_variable_address(&self, name: &str) -> Result<u64> {
        let symbols = self.symbols()?;
        symbols
            .get(name)
            .copied()
            .ok_or_else(|| GospyError::SymbolNotFound(name.to_string()))
    }

    fn pc_to_func_loc(&self, pc: u64) -> Option<FuncLoc> {
        let mut cache = self.func_loc_cache.lock().expect("func_loc cache poisoned");
        if let Some(cached) = cache.get(&pc) {
            return cached.clone();
        }
        let loc = self.line_table.pc_to_func(pc);
        cache.insert(pc, loc.clone());
        loc
    }

    fn dwarf(&self) -> Result<&DwarfResolver> {
        let result = self
            .dwarf
            .get_or_init(|| DwarfResolver::load(&self.raw, &self.path));
        result.as_ref().map_err(clone_err)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn clone_err(e: &GospyError) -> GospyError {
    GospyError::InvalidExecutable(e.to_string())
}

/// Reads `len` bytes at `offset` from an already-open file handle; used by
/// the memory reader for `/proc/<pid>/mem`, kept here since it shares the
/// same "platform I/O glue" grounding as the loader.
pub fn pread_exact(file: &fs::File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    file.read_at(buf, offset)
}
