// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The error taxonomy, mirroring the failure modes enumerated in spec §7.
//!
//! Each component returns one of these kinds directly; the facade attaches
//! operation context (which pid, which symbol) without wrapping the kind in
//! anything else, so callers can match on the taxonomy instead of parsing
//! strings.

use std::fmt;

/// Composite error for a single failed sub-field of a `mem_stats()` read.
/// The operation still returns a best-effort record alongside this.
#[derive(Debug)]
pub struct FieldError {
    pub field: &'static str,
    pub source: Box<GospyError>,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.source)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GospyError {
    #[error("binary not found: {0}")]
    BinaryNotFound(String),

    #[error("invalid or unsupported executable: {0}")]
    InvalidExecutable(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("debug info unavailable: {0}")]
    DebugInfoUnavailable(String),

    #[error("read truncated at 0x{addr:x}: wanted {wanted}, got {got}")]
    ReadTruncated {
        addr: u64,
        wanted: usize,
        got: usize,
    },

    #[error("read failed at 0x{addr:x}: {source}")]
    ReadFailed { addr: u64, source: String },

    #[error("malformed runtime value: {0}")]
    MalformedRuntime(String),

    #[error("task {0} not found")]
    TaskNotFound(u64),

    #[error("unwind aborted: {0}")]
    UnwindAborted(String),

    #[error("partial read: {0:?}")]
    PartialRead(Vec<FieldError>),
}

pub type Result<T> = std::result::Result<T, GospyError>;
