// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The platform-variant seam for binary loading (spec §4.2).
//!
//! `binary_loader.go` defines `BinaryLoader` as an interface implemented by
//! both a Linux and a Darwin loader; only the Linux variant is implemented
//! here (Non-goals: 64-bit Linux only), but the trait is kept so the shape
//! matches the original's platform-variant point.

use std::path::Path;

use super::dwarf::DwarfResolver;
use super::gopclntab::{FuncLoc, SymbolMap};
use crate::error::Result;

pub trait BinaryLoader {
    fn ptr_size(&self) -> u8;
    fn entry(&self) -> u64;
    fn symbols(&self) -> Result<&SymbolMap>;
    fn find_variable_address(&self, name: &str) -> Result<u64>;
    fn pc_to_func_loc(&self, pc: u64) -> Option<FuncLoc>;
    fn dwarf(&self) -> Result<&DwarfResolver>;
    fn path(&self) -> &Path;
}
