// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The processor parser (spec §4.7), ported from `p_parser.go` + `p.go` +
//! `p_types.go`.

use serde::Serialize;

use crate::binary::BinaryLoader;
use crate::error::Result;
use crate::memreader::{MemReader, RawMemReader};

fn stringify_status(raw: u32) -> String {
    match raw {
        0 => "idle".to_string(),
        1 => "running".to_string(),
        2 => "syscall".to_string(),
        3 => "gcstop".to_string(),
        4 => "dead".to_string(),
        n => format!("unknown({n})"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Processor {
    pub addr: u64,
    pub id: i32,
    pub status: String,
    pub mcache: u64,
    pub schedtick: u32,
}

struct ProcessorLayout {
    size: u64,
    id_off: u64,
    status_off: u64,
    mcache_off: u64,
    schedtick_off: u64,
}

fn resolve_layout(loader: &dyn BinaryLoader) -> Result<ProcessorLayout> {
    let dwarf = loader.dwarf()?;
    Ok(ProcessorLayout {
        size: dwarf.struct_size("runtime.p")?,
        id_off: dwarf.field_offset("runtime.p", "id")?,
        status_off: dwarf.field_offset("runtime.p", "status")?,
        mcache_off: dwarf.field_offset("runtime.p", "mcache")?,
        schedtick_off: dwarf.field_offset("runtime.p", "schedtick")?,
    })
}

fn decode_processor(addr: u64, data: &[u8], layout: &ProcessorLayout) -> Result<Processor> {
    let id = crate::codec::i32_at(&data[layout.id_off as usize..])?;
    let raw_status = crate::codec::u32_at(&data[layout.status_off as usize..])?;
    let mcache = crate::codec::u64_at(&data[layout.mcache_off as usize..])?;
    let schedtick = crate::codec::u32_at(&data[layout.schedtick_off as usize..])?;

    Ok(Processor {
        addr,
        id,
        status: stringify_status(raw_status),
        mcache,
        schedtick,
    })
}

/// Spec §4.7: analogous to the task parser, over the global processor
/// pointer slice.
pub fn processors<R: RawMemReader>(
    reader: &MemReader<R>,
    loader: &dyn BinaryLoader,
) -> Result<Vec<Processor>> {
    let allp_addr = loader.find_variable_address("runtime.allp")?;
    let ptrs = reader.read_ptr_slice(reader.static_base() + allp_addr)?;

    let layout = resolve_layout(loader)?;
    let batch = reader.read_batch(&ptrs, layout.size)?;

    let mut out = Vec::with_capacity(ptrs.len());
    for (i, &ptr) in ptrs.iter().enumerate() {
        if ptr == 0 {
            continue;
        }
        let start = i * layout.size as usize;
        let window = &batch[start..start + layout.size as usize];
        out.push(decode_processor(ptr, window, &layout)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_is_total_over_0_to_4() {
        assert_eq!(stringify_status(0), "idle");
        assert_eq!(stringify_status(1), "running");
        assert_eq!(stringify_status(2), "syscall");
        assert_eq!(stringify_status(3), "gcstop");
        assert_eq!(stringify_status(4), "dead");
    }

    #[test]
    fn out_of_range_renders_unknown_n() {
        assert_eq!(stringify_status(5), "unknown(5)");
    }
}
