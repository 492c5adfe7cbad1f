// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The task parser (spec §4.6), ported from `goroutine_parser.go` + `g.go`
//! + `const.go` + `gwaitreason.go`.

use serde::Serialize;

use crate::binary::BinaryLoader;
use crate::error::{GospyError, Result};
use crate::memreader::{MemReader, RawMemReader};
use crate::version_registry::VersionRegistry;

const SCAN_BIT: u32 = 0x1000;

fn base_status_name(base: u32) -> Option<&'static str> {
    match base {
        0 => Some("idle"),
        1 => Some("runnable"),
        2 => Some("running"),
        3 => Some("syscall"),
        4 => Some("waiting"),
        5 => Some("moribund_unused"),
        6 => Some("dead"),
        7 => Some("enqueue_unused"),
        8 => Some("copystack"),
        9 => Some("preempted"),
        _ => None,
    }
}

/// Scan-bit-qualified states that the original runtime names distinctly;
/// anything else with the scan bit set renders `scanunknown`.
fn scan_status_name(base: u32) -> Option<&'static str> {
    match base {
        1 => Some("scanrunnable"),
        2 => Some("scanrunning"),
        3 => Some("scansyscall"),
        4 => Some("scanwaiting"),
        9 => Some("scanpreempted"),
        0 => Some("scan"),
        _ => None,
    }
}

/// Mirrors `parseStatus`: mask off the scan bit, look up the base state,
/// and prefer the compound scan-qualified name if the bit was set.
pub fn stringify_status(raw: u32) -> String {
    let base = raw & !SCAN_BIT;
    let scanning = raw & SCAN_BIT != 0;
    match base_status_name(base) {
        Some(name) => {
            if scanning {
                scan_status_name(base).unwrap_or("scanunknown").to_string()
            } else {
                name.to_string()
            }
        }
        None => format!("unknown({raw})"),
    }
}

const DEAD_STATUS_CODE: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StackBounds {
    pub lo: u64,
    pub hi: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedContext {
    pub pc: u64,
    pub sp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub addr: u64,
    pub id: u64,
    pub status: String,
    pub wait_reason: Option<String>,
    pub stack: StackBounds,
    pub sched: SchedContext,
    pub cur_func: Option<String>,
    pub start_pc: u64,
    pub start_func: Option<String>,
}

impl Task {
    fn is_dead(&self) -> bool {
        self.status == "dead"
    }
}

/// Offsets into `runtime.g` (and its nested structs) needed to decode one
/// task record; resolved once per binary and reused for every task/lookup.
struct TaskLayout {
    size: u64,
    goid_off: u64,
    status_off: u64,
    waitreason_off: u64,
    startpc_off: u64,
    stack_lo_off: u64,
    stack_hi_off: u64,
    sched_pc_off: u64,
    sched_sp_off: u64,
}

fn resolve_layout(loader: &dyn BinaryLoader) -> Result<TaskLayout> {
    let dwarf = loader.dwarf()?;
    Ok(TaskLayout {
        size: dwarf.struct_size("runtime.g")?,
        goid_off: dwarf.field_offset("runtime.g", "goid")?,
        status_off: dwarf.field_offset("runtime.g", "atomicstatus")?,
        waitreason_off: dwarf.field_offset("runtime.g", "waitreason")?,
        startpc_off: dwarf.field_offset("runtime.g", "startpc")?,
        stack_lo_off: dwarf.nested_offset("runtime.g", "stack", "runtime.stack", "lo")?,
        stack_hi_off: dwarf.nested_offset("runtime.g", "stack", "runtime.stack", "hi")?,
        sched_pc_off: dwarf.nested_offset("runtime.g", "sched", "runtime.gobuf", "pc")?,
        sched_sp_off: dwarf.nested_offset("runtime.g", "sched", "runtime.gobuf", "sp")?,
    })
}

fn decode_task<R: RawMemReader>(
    addr: u64,
    data: &[u8],
    layout: &TaskLayout,
    reader: &MemReader<R>,
    loader: &dyn BinaryLoader,
    wait_reasons: &std::collections::BTreeMap<u8, &'static str>,
) -> Result<Task> {
    let id = crate::codec::u64_at(&data[layout.goid_off as usize..])?;
    let raw_status = crate::codec::u32_at(&data[layout.status_off as usize..])?;
    let status = stringify_status(raw_status);

    let wait_reason = if status == "waiting" {
        let code = data[layout.waitreason_off as usize];
        Some(
            wait_reasons
                .get(&code)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("unknown({code})")),
        )
    } else {
        None
    };

    let lo = crate::codec::u64_at(&data[layout.stack_lo_off as usize..])?;
    let hi = crate::codec::u64_at(&data[layout.stack_hi_off as usize..])?;
    let pc = crate::codec::u64_at(&data[layout.sched_pc_off as usize..])?;
    let sp = crate::codec::u64_at(&data[layout.sched_sp_off as usize..])?;

    let cur_func = if pc != 0 {
        loader
            .pc_to_func_loc(pc.wrapping_sub(reader.static_base()))
            .map(|f| f.func_name)
    } else {
        None
    };

    let start_pc = crate::codec::u64_at(&data[layout.startpc_off as usize..])?;
    let start_func = if start_pc != 0 {
        loader
            .pc_to_func_loc(start_pc.wrapping_sub(reader.static_base()))
            .map(|f| f.func_name)
    } else {
        None
    };

    Ok(Task {
        addr,
        id,
        status,
        wait_reason,
        stack: StackBounds { lo, hi },
        sched: SchedContext { pc, sp },
        cur_func,
        start_pc,
        start_func,
    })
}

/// Spec §4.6: reads the global task-pointer slice, batch-reads every task
/// struct, decodes each, optionally drops dead tasks, and sorts by id.
pub fn tasks<R: RawMemReader>(
    reader: &MemReader<R>,
    loader: &dyn BinaryLoader,
    version_registry: &VersionRegistry,
    go_version: &str,
    include_dead: bool,
) -> Result<Vec<Task>> {
    let allgs_addr = loader.find_variable_address("runtime.allgs")?;
    let ptrs = reader.read_ptr_slice(reader.static_base() + allgs_addr)?;

    let layout = resolve_layout(loader)?;
    let batch = reader.read_batch(&ptrs, layout.size)?;
    let wait_reasons = version_registry.wait_reason_map(go_version);

    let mut out = Vec::with_capacity(ptrs.len());
    for (i, &ptr) in ptrs.iter().enumerate() {
        if ptr == 0 {
            continue;
        }
        let start = i * layout.size as usize;
        let window = &batch[start..start + layout.size as usize];
        let task = decode_task(ptr, window, &layout, reader, loader, &wait_reasons)?;
        if !include_dead && task.is_dead() {
            continue;
        }
        out.push(task);
    }
    out.sort_by_key(|t| t.id);
    Ok(out)
}

/// Spec §4.6: single-task lookup by id — reads only `goid` per candidate
/// until a match, then fully decodes.
pub fn task_by_id<R: RawMemReader>(
    reader: &MemReader<R>,
    loader: &dyn BinaryLoader,
    version_registry: &VersionRegistry,
    go_version: &str,
    id: u64,
) -> Result<Task> {
    let allgs_addr = loader.find_variable_address("runtime.allgs")?;
    let ptrs = reader.read_ptr_slice(reader.static_base() + allgs_addr)?;
    let layout = resolve_layout(loader)?;
    let wait_reasons = version_registry.wait_reason_map(go_version);

    for &ptr in &ptrs {
        if ptr == 0 {
            continue;
        }
        let goid = reader.read_u64(ptr + layout.goid_off)?;
        if goid != id {
            continue;
        }
        let full = reader.read_batch(&[ptr], layout.size)?;
        return decode_task(ptr, &full, &layout, reader, loader, &wait_reasons);
    }
    Err(GospyError::TaskNotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_status_round_trips() {
        assert_eq!(stringify_status(0), "idle");
        assert_eq!(stringify_status(4), "waiting");
        assert_eq!(stringify_status(6), "dead");
    }

    #[test]
    fn scan_bit_prefers_compound_name() {
        assert_eq!(stringify_status(0x1000 | 4), "scanwaiting");
        assert_eq!(stringify_status(0x1000 | 9), "scanpreempted");
    }

    #[test]
    fn unknown_code_renders_unknown_n() {
        assert_eq!(stringify_status(42), "unknown(42)");
        assert_eq!(stringify_status(0x1000 | 42), "unknown(4138)");
    }

    #[test]
    fn dead_status_is_not_surfaced_as_unknown() {
        assert_eq!(DEAD_STATUS_CODE, 6);
        assert_eq!(stringify_status(DEAD_STATUS_CODE), "dead");
    }
}
