// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! External collaborator: process-attach / ptrace suspension, and the
//! `/proc/<pid>/maps` reader (spec.md §1, "out of scope" collaborators).
//!
//! `proc.go`'s `Thread.Lock`/`Unlock` pair raw `PTRACE_ATTACH` /
//! `PTRACE_DETACH` syscalls directly; here that's done through `nix`
//! instead of hand-rolled `syscall.Ptrace*` calls. `procmaps.go`'s
//! `/proc/<pid>/maps` parser is replaced by the `procfs` crate, which
//! already exposes a typed maps reader.

use nix::sys::ptrace;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("ptrace attach failed for pid {pid}: {source}")]
    Attach { pid: i32, source: nix::Error },
    #[error("ptrace detach failed for pid {pid}: {source}")]
    Detach { pid: i32, source: nix::Error },
    #[error("waitpid failed for pid {pid}: {source}")]
    Wait { pid: i32, source: nix::Error },
    #[error("reading /proc/{pid}/maps failed: {source}")]
    Maps { pid: i32, source: procfs::ProcError },
}

pub type Result<T> = std::result::Result<T, AttachError>;

/// Suspends a single OS thread via `PTRACE_ATTACH`, releasing it with
/// `PTRACE_DETACH` on drop. Mirrors `Thread.Lock`/`Unlock`: never skip the
/// detach, or the target thread is left a zombie.
pub struct SuspendedThread {
    tid: i32,
    detached: bool,
}

impl SuspendedThread {
    pub fn attach(tid: i32) -> Result<Self> {
        let pid = Pid::from_raw(tid);
        ptrace::attach(pid).map_err(|source| AttachError::Attach { pid: tid, source })?;
        waitpid(pid, None).map_err(|source| AttachError::Wait { pid: tid, source })?;
        log::debug!("attached to thread {tid}");
        Ok(SuspendedThread {
            tid,
            detached: false,
        })
    }

    pub fn detach(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        let pid = Pid::from_raw(self.tid);
        ptrace::detach(pid, None).map_err(|source| AttachError::Detach {
            pid: self.tid,
            source,
        })?;
        self.detached = true;
        Ok(())
    }
}

impl Drop for SuspendedThread {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::warn!("failed to detach thread {}: {e}", self.tid);
        }
    }
}

/// Enumerates the OS threads of a process, mirroring `Process.Threads`'s
/// walk over `/proc/<pid>/task`.
pub fn list_threads(pid: i32) -> Result<Vec<i32>> {
    let proc = procfs::process::Process::new(pid)
        .map_err(|source| AttachError::Maps { pid, source })?;
    let tasks = proc
        .tasks()
        .map_err(|source| AttachError::Maps { pid, source })?;
    let mut tids = Vec::new();
    for task in tasks {
        let task = task.map_err(|source| AttachError::Maps { pid, source })?;
        tids.push(task.tid);
    }
    Ok(tids)
}

#[derive(Debug, Clone)]
pub struct MapRange {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub pathname: Option<String>,
}

impl MapRange {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_exec(&self) -> bool {
        self.perms.contains('x')
    }
}

/// Ported from `procmaps.ReadProcMaps`, backed by `procfs` instead of a
/// hand-rolled line parser.
pub fn read_proc_maps(pid: i32) -> Result<Vec<MapRange>> {
    let proc = procfs::process::Process::new(pid)
        .map_err(|source| AttachError::Maps { pid, source })?;
    let maps = proc
        .maps()
        .map_err(|source| AttachError::Maps { pid, source })?;

    Ok(maps
        .iter()
        .map(|m| MapRange {
            start: m.address.0,
            end: m.address.1,
            perms: format!("{:?}", m.perms),
            offset: m.offset,
            pathname: match &m.pathname {
                procfs::process::MMapPath::Path(p) => Some(p.display().to_string()),
                _ => None,
            },
        })
        .collect())
}
