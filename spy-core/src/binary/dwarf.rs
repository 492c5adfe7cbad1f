// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The debug-info resolver (spec §4.3), ported from `dwarf_common.go`'s
//! `dwarfLoader` onto `gimli` instead of `debug/dwarf`.
//!
//! Three queries, each memoized by a joined string key exactly as
//! `offsetCache map[string]uint64` does. DWARF sections are parsed lazily,
//! primed by the first successful query, guarded by a `Mutex` rather than
//! `sync.Once` since `gimli::Reader` values aren't `Sync` across a plain
//! `OnceLock`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use gimli::{AttributeValue, DebuggingInformationEntry, Dwarf, Reader, Unit};

use crate::error::{GospyError, Result};

type GimliReader = gimli::EndianSlice<'static, gimli::RunTimeEndian>;

pub struct DwarfResolver {
    dwarf: Dwarf<GimliReader>,
    cache: Mutex<HashMap<String, u64>>,
}

impl DwarfResolver {
    pub fn load(raw: &[u8], path: &Path) -> Result<Self> {
        let object = goblin::elf::Elf::parse(raw)
            .map_err(|e| GospyError::DebugInfoUnavailable(format!("{}: {e}", path.display())))?;
        let endian = if object.little_endian {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        // Leak the file bytes for the resolver's lifetime: gimli borrows
        // section data directly and this resolver lives as long as the
        // binary loader that owns it, i.e. for the whole process.
        let leaked: &'static [u8] = Box::leak(raw.to_vec().into_boxed_slice());

        let load_section = |id: gimli::SectionId| -> std::result::Result<GimliReader, gimli::Error> {
            let data = object
                .section_headers
                .iter()
                .find(|s| object.shdr_strtab.get_at(s.sh_name) == Some(id.name()))
                .and_then(|s| {
                    let start = s.sh_offset as usize;
                    let end = start + s.sh_size as usize;
                    leaked.get(start..end)
                })
                .unwrap_or(&[]);
            Ok(gimli::EndianSlice::new(data, endian))
        };

        let dwarf = Dwarf::load(load_section)
            .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?;

        Ok(DwarfResolver {
            dwarf,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn struct_size(&self, type_name: &str) -> Result<u64> {
        let key = format!("{type_name}.size");
        if let Some(v) = self.cache.lock().expect("dwarf cache poisoned").get(&key) {
            return Ok(*v);
        }
        let size = self.find_struct_size(type_name)?;
        self.cache
            .lock()
            .expect("dwarf cache poisoned")
            .insert(key, size);
        Ok(size)
    }

    pub fn field_offset(&self, type_name: &str, field_name: &str) -> Result<u64> {
        let key = format!("{type_name}.{field_name}");
        if let Some(v) = self.cache.lock().expect("dwarf cache poisoned").get(&key) {
            return Ok(*v);
        }
        let offset = self.find_field_offset(type_name, field_name)?;
        self.cache
            .lock()
            .expect("dwarf cache poisoned")
            .insert(key, offset);
        Ok(offset)
    }

    /// Spec §4.3: outer field's own offset, plus the inner field's offset
    /// within `inner_type`, the DWARF struct type the outer field is
    /// actually declared as (e.g. `runtime.g`'s `stack` field is a
    /// `runtime.stack`, not a synthetic `runtime.g.stack`).
    pub fn nested_offset(
        &self,
        outer_type: &str,
        outer_field: &str,
        inner_type: &str,
        inner_field: &str,
    ) -> Result<u64> {
        let outer_offset = self.field_offset(outer_type, outer_field)?;
        let inner_offset = self.field_offset(inner_type, inner_field)?;
        Ok(outer_offset + inner_offset)
    }

    fn units(&self) -> impl Iterator<Item = Result<Unit<GimliReader>>> + '_ {
        let mut headers = self.dwarf.units();
        std::iter::from_fn(move || {
            let header = headers.next().ok().flatten()?;
            Some(
                self.dwarf
                    .unit(header)
                    .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string())),
            )
        })
    }

    fn entry_name(&self, unit: &Unit<GimliReader>, entry: &DebuggingInformationEntry<GimliReader>) -> Option<String> {
        let attr = entry.attr_value(gimli::DW_AT_name).ok()??;
        self.dwarf.attr_string(unit, attr).ok().map(|s| {
            s.to_string_lossy().map(|c| c.into_owned()).unwrap_or_default()
        })
    }

    fn find_struct_size(&self, type_name: &str) -> Result<u64> {
        for unit in self.units() {
            let unit = unit?;
            let mut tree = unit
                .entries_tree(None)
                .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?;
            let root = tree
                .root()
                .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?;
            if let Some(size) = self.search_struct_size(&unit, root, type_name)? {
                return Ok(size);
            }
        }
        Err(GospyError::DebugInfoUnavailable(format!(
            "struct type {type_name:?} not found"
        )))
    }

    fn search_struct_size(
        &self,
        unit: &Unit<GimliReader>,
        mut node: gimli::EntriesTreeNode<GimliReader>,
        type_name: &str,
    ) -> Result<Option<u64>> {
        let entry = node.entry();
        if entry.tag() == gimli::DW_TAG_structure_type {
            if self.entry_name(unit, entry).as_deref() == Some(type_name) {
                if let Some(AttributeValue::Udata(size)) =
                    entry.attr_value(gimli::DW_AT_byte_size).ok().flatten()
                {
                    return Ok(Some(size));
                }
            }
        }
        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?
        {
            if let Some(size) = self.search_struct_size(unit, child, type_name)? {
                return Ok(Some(size));
            }
        }
        Ok(None)
    }

    fn find_field_offset(&self, type_name: &str, field_name: &str) -> Result<u64> {
        for unit in self.units() {
            let unit = unit?;
            let mut tree = unit
                .entries_tree(None)
                .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?;
            let root = tree
                .root()
                .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?;
            if let Some(offset) = self.search_field_offset(&unit, root, type_name, field_name)? {
                return Ok(offset);
            }
        }
        Err(GospyError::DebugInfoUnavailable(format!(
            "field {type_name}.{field_name} not found"
        )))
    }

    fn search_field_offset(
        &self,
        unit: &Unit<GimliReader>,
        mut node: gimli::EntriesTreeNode<GimliReader>,
        type_name: &str,
        field_name: &str,
    ) -> Result<Option<u64>> {
        let entry = node.entry();
        let is_target_struct =
            entry.tag() == gimli::DW_TAG_structure_type && self.entry_name(unit, entry).as_deref() == Some(type_name);

        if is_target_struct {
            let mut children = node.children();
            while let Some(child) = children
                .next()
                .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?
            {
                let member = child.entry();
                if member.tag() == gimli::DW_TAG_member
                    && self.entry_name(unit, member).as_deref() == Some(field_name)
                {
                    if let Some(AttributeValue::Udata(off)) =
                        member.attr_value(gimli::DW_AT_data_member_location).ok().flatten()
                    {
                        return Ok(Some(off));
                    }
                    if let Some(AttributeValue::Sdata(off)) =
                        member.attr_value(gimli::DW_AT_data_member_location).ok().flatten()
                    {
                        return Ok(Some(off as u64));
                    }
                }
            }
            return Ok(None);
        }

        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|e| GospyError::DebugInfoUnavailable(e.to_string()))?
        {
            if let Some(offset) = self.search_field_offset(unit, child, type_name, field_name)? {
                return Ok(Some(offset));
            }
        }
        Ok(None)
    }
}
