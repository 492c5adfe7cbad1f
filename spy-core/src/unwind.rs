// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The stack unwinder (spec §4.8). The original source resolves only the
//! current PC's location (`g.CurLoc` in `g.go`'s `Parse`); this module
//! builds the multi-frame walk spec.md §4.8 and §9(c) specify on top of
//! that single-frame lookup, falling back to the original's one-frame
//! behavior when the walk produces nothing.

use serde::Serialize;

use crate::binary::BinaryLoader;
use crate::error::{GospyError, Result};
use crate::memreader::{MemReader, RawMemReader};
use crate::task::Task;

const MAX_STACK_DEPTH: usize = 100;

const ROOT_TERMINATORS: &[&str] = &["goexit", "mstart", "rt0_go", "main"];

fn is_root_terminator(func_name: &str) -> bool {
    ROOT_TERMINATORS
        .iter()
        .any(|t| func_name == *t || func_name.ends_with(&format!(".{t}")))
}

fn is_morestack_trampoline(func_name: &str) -> bool {
    func_name.contains("morestack") || func_name.ends_with("systemstack_switch")
}

#[derive(Debug, Clone, Serialize)]
pub struct StackFrame {
    pub pc: u64,
    pub sp: u64,
    pub func_name: String,
    pub file: String,
    pub line: i64,
    /// Set once a growth trampoline has been crossed; later frames in the
    /// same trace carry lower confidence per spec §4.8 step 3.
    pub low_confidence: bool,
}

/// Spec §4.8: walks saved `{pc, sp}` to return addresses, symbolicating
/// each frame, terminating at a runtime root or an unreadable return
/// address, bounded by `MAX_STACK_DEPTH`.
pub fn unwind<R: RawMemReader>(
    task: &Task,
    reader: &MemReader<R>,
    loader: &dyn BinaryLoader,
) -> Result<Vec<StackFrame>> {
    if task.sched.pc == 0 {
        return Err(GospyError::UnwindAborted(
            "task has no saved program counter".into(),
        ));
    }

    let mut frames = Vec::new();
    let mut current_pc = task.sched.pc;
    let mut current_sp = task.sched.sp;
    let mut low_confidence = false;
    let ptr_size = reader.ptr_size() as u64;
    let static_base = reader.static_base();

    for i in 0..MAX_STACK_DEPTH {
        // §4.8 bounds discipline: sp outside [lo, hi], except the first
        // frame may sit exactly at hi.
        let in_bounds = current_sp >= task.stack.lo && current_sp <= task.stack.hi;
        if !(in_bounds || (i == 0 && current_sp == task.stack.hi)) {
            break;
        }

        let loc = loader.pc_to_func_loc(current_pc.wrapping_sub(static_base));
        let (func_name, file, line) = match &loc {
            Some(l) => (l.func_name.clone(), l.file.clone(), l.line),
            None => (String::new(), String::new(), -1),
        };

        frames.push(StackFrame {
            pc: current_pc,
            sp: current_sp,
            func_name: func_name.clone(),
            file,
            line,
            low_confidence,
        });

        if is_root_terminator(&func_name) {
            break;
        }
        if is_morestack_trampoline(&func_name) {
            low_confidence = true;
        }

        let return_pc = match reader.read_u64(current_sp) {
            Ok(v) => v,
            Err(_) => break,
        };
        current_pc = return_pc;
        current_sp += ptr_size;

        if current_pc == 0 {
            break;
        }
    }

    // Spec §9(c): when the walk above produces nothing — e.g. `sched.sp` is
    // zero or outside the stack bounds on the very first iteration — still
    // emit a single bottom frame for the saved `sched.pc`, since that PC is
    // known non-zero by the check at the top of this function. Retained
    // from the original's single-frame `CurLoc` resolution; soundness under
    // aggressive inlining is untested.
    if frames.is_empty() {
        let loc = loader.pc_to_func_loc(task.sched.pc.wrapping_sub(static_base));
        let (func_name, file, line) = match &loc {
            Some(l) => (l.func_name.clone(), l.file.clone(), l.line),
            None => (String::new(), String::new(), -1),
        };
        frames.push(StackFrame {
            pc: task.sched.pc,
            sp: task.sched.sp,
            func_name,
            file,
            line,
            low_confidence: false,
        });
    }

    Ok(frames)
}
