// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Non-invasive introspection engine for a running Go process.
//!
//! [`GoProcess`] is the public facade (spec §4.9): given a pid, it loads
//! the target binary, opens its memory, and exposes `runtime_info`,
//! `tasks`, `task_stack_trace`, `processors`, and `mem_stats` as snapshot
//! reads. Platform specifics live behind [`binary::BinaryLoader`] and
//! [`memreader::RawMemReader`]; only the Linux variants are implemented
//! (64-bit Linux targets only).

pub mod binary;
pub mod codec;
pub mod duration;
pub mod error;
pub mod memreader;
pub mod memstats;
pub mod processor;
pub mod runtime_facts;
pub mod task;
pub mod unwind;
pub mod var;
pub mod version_registry;

use std::path::Path;

use binary::elf::LinuxBinaryLoader;
use binary::BinaryLoader;
use error::{GospyError, Result};
use memreader::linux::LinuxMemReader;
use memreader::MemReader;
use memstats::MemStats;
use processor::Processor;
use runtime_facts::{RuntimeFactCache, RuntimeFacts};
use task::Task;
use unwind::StackFrame;
use var::{VarKind, VarValue};
use version_registry::VersionRegistry;

/// A live handle onto one target process. Binary metadata and runtime
/// facts are resolved once at construction; task/processor/mem-stats
/// records are fresh snapshots on every call (spec §3 "Lifecycle").
pub struct GoProcess {
    pid: i32,
    loader: LinuxBinaryLoader,
    reader: MemReader<LinuxMemReader>,
    version_registry: VersionRegistry,
    runtime_facts: RuntimeFactCache,
    closed: bool,
}

impl GoProcess {
    /// Attaches to `pid`, resolving its executable via `/proc/<pid>/exe`.
    pub fn attach(pid: i32) -> Result<Self> {
        let loader = LinuxBinaryLoader::load_by_pid(pid)?;
        let reader = LinuxMemReader::open(pid, &loader)?;
        Ok(GoProcess {
            pid,
            loader,
            reader: MemReader::new(reader),
            version_registry: VersionRegistry::new(),
            runtime_facts: RuntimeFactCache::new(),
            closed: false,
        })
    }

    /// Attaches to `pid` using an explicit binary path rather than
    /// resolving it from `/proc/<pid>/exe` — useful when the executable
    /// has been deleted from disk but the process is still running.
    pub fn attach_with_binary(pid: i32, binary_path: &Path) -> Result<Self> {
        let loader = LinuxBinaryLoader::load(binary_path)?;
        let reader = LinuxMemReader::open(pid, &loader)?;
        Ok(GoProcess {
            pid,
            loader,
            reader: MemReader::new(reader),
            version_registry: VersionRegistry::new(),
            runtime_facts: RuntimeFactCache::new(),
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(GospyError::ReadFailed {
                addr: 0,
                source: "reader closed".into(),
            });
        }
        Ok(())
    }

    pub fn runtime_info(&self) -> Result<RuntimeFacts> {
        self.check_open()?;
        self.runtime_facts.get(self.pid, &self.reader, &self.loader)
    }

    pub fn tasks(&self, include_dead: bool) -> Result<Vec<Task>> {
        self.check_open()?;
        let facts = self.runtime_info()?;
        task::tasks(
            &self.reader,
            &self.loader,
            &self.version_registry,
            &facts.version,
            include_dead,
        )
    }

    pub fn task_by_id(&self, id: u64) -> Result<Task> {
        self.check_open()?;
        let facts = self.runtime_info()?;
        task::task_by_id(&self.reader, &self.loader, &self.version_registry, &facts.version, id)
    }

    pub fn task_stack_trace(&self, id: u64) -> Result<Vec<StackFrame>> {
        self.check_open()?;
        let task = self.task_by_id(id)?;
        unwind::unwind(&task, &self.reader, &self.loader)
    }

    pub fn processors(&self) -> Result<Vec<Processor>> {
        self.check_open()?;
        processor::processors(&self.reader, &self.loader)
    }

    /// Ad hoc inspection of any named global of a known kind (spec §9's
    /// `Var` hierarchy, re-expressed as [`var::parse_var`]). Not one of the
    /// five spec §4.9 snapshot operations; exposed for the CLI's `var`
    /// command and the HTTP tool-protocol bridge's `/var` route.
    pub fn read_var(
        &self,
        name: &str,
        kind: VarKind,
        pointee_kind: Option<VarKind>,
    ) -> Result<VarValue> {
        self.check_open()?;
        let addr = self.loader.find_variable_address(name)?;
        var::parse_var(&self.reader, self.reader.static_base() + addr, kind, pointee_kind)
    }

    /// Spec §4.9: the only facade operation that may return a best-effort
    /// value alongside an error rather than failing outright.
    pub fn mem_stats(&self) -> (MemStats, Option<GospyError>) {
        if self.closed {
            return (
                MemStats::default(),
                Some(GospyError::ReadFailed {
                    addr: 0,
                    source: "reader closed".into(),
                }),
            );
        }
        memstats::mem_stats(&self.reader, &self.loader)
    }

    /// Idempotent; releases the memory-access handle.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.reader
            .close()
            .map_err(|e| GospyError::ReadFailed {
                addr: 0,
                source: e.to_string(),
            })?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for GoProcess {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
