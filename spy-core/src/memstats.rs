// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The heap / GC-stats parser (spec §4.9's `mem_stats`), ported from
//! `mem_stat.go`. The only operation in the engine that tolerates partial
//! failure: every field is read independently and a failed field is
//! recorded in a composite `PartialRead` alongside the best-effort record.

use serde::Serialize;

use crate::binary::BinaryLoader;
use crate::error::{FieldError, GospyError, Result};
use crate::memreader::{MemReader, RawMemReader};

const RING_SIZE: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct MemStats {
    pub last_gc_ns: u64,
    pub pause_total_ns: u64,
    pub pause_ns: Vec<u64>,
    pub pause_end: Vec<u64>,
    pub num_gc: u32,
}

impl Default for MemStats {
    fn default() -> Self {
        MemStats {
            last_gc_ns: 0,
            pause_total_ns: 0,
            pause_ns: vec![0; RING_SIZE],
            pause_end: vec![0; RING_SIZE],
            num_gc: 0,
        }
    }
}

fn read_ring<R: RawMemReader>(reader: &MemReader<R>, addr: u64) -> Result<Vec<u64>> {
    let mut out = Vec::with_capacity(RING_SIZE);
    for i in 0..RING_SIZE {
        out.push(reader.read_u64(addr + (i as u64) * 8)?);
    }
    Ok(out)
}

/// Spec §4.9 / §4.5's composite-error contract: returns a best-effort
/// record; if any sub-field failed, also returns `Some(PartialRead)` whose
/// caller decides whether that's fatal.
pub fn mem_stats<R: RawMemReader>(
    reader: &MemReader<R>,
    loader: &dyn BinaryLoader,
) -> (MemStats, Option<GospyError>) {
    let mut stats = MemStats::default();
    let mut errors = Vec::new();

    let mstats_addr = match loader.find_variable_address("runtime.memstats") {
        Ok(a) => a,
        Err(e) => return (stats, Some(e)),
    };
    let base = reader.static_base() + mstats_addr;

    let dwarf = match loader.dwarf() {
        Ok(d) => d,
        Err(e) => return (stats, Some(e)),
    };

    match dwarf.field_offset("runtime.mstats", "last_gc_unix") {
        Ok(off) => match reader.read_u64(base + off) {
            Ok(v) => stats.last_gc_ns = v,
            Err(e) => errors.push(FieldError {
                field: "last_gc_unix",
                source: Box::new(e),
            }),
        },
        Err(e) => errors.push(FieldError {
            field: "last_gc_unix",
            source: Box::new(e),
        }),
    }

    match dwarf.field_offset("runtime.mstats", "pause_total_ns") {
        Ok(off) => match reader.read_u64(base + off) {
            Ok(v) => stats.pause_total_ns = v,
            Err(e) => errors.push(FieldError {
                field: "pause_total_ns",
                source: Box::new(e),
            }),
        },
        Err(e) => errors.push(FieldError {
            field: "pause_total_ns",
            source: Box::new(e),
        }),
    }

    match dwarf.field_offset("runtime.mstats", "pause_ns") {
        Ok(off) => match read_ring(reader, base + off) {
            Ok(v) => stats.pause_ns = v,
            Err(e) => errors.push(FieldError {
                field: "pause_ns",
                source: Box::new(e),
            }),
        },
        Err(e) => errors.push(FieldError {
            field: "pause_ns",
            source: Box::new(e),
        }),
    }

    match dwarf.field_offset("runtime.mstats", "pause_end") {
        Ok(off) => match read_ring(reader, base + off) {
            Ok(v) => stats.pause_end = v,
            Err(e) => errors.push(FieldError {
                field: "pause_end",
                source: Box::new(e),
            }),
        },
        Err(e) => errors.push(FieldError {
            field: "pause_end",
            source: Box::new(e),
        }),
    }

    match dwarf.field_offset("runtime.mstats", "numgc") {
        Ok(off) => match reader.read_u32(base + off) {
            Ok(v) => stats.num_gc = v,
            Err(e) => errors.push(FieldError {
                field: "numgc",
                source: Box::new(e),
            }),
        },
        Err(e) => errors.push(FieldError {
            field: "numgc",
            source: Box::new(e),
        }),
    }

    if errors.is_empty() {
        (stats, None)
    } else {
        (stats, Some(GospyError::PartialRead(errors)))
    }
}
