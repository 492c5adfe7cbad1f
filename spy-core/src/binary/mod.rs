// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary metadata loading (spec §4.2) and debug-info resolution (§4.3).

pub mod dwarf;
pub mod elf;
pub mod gopclntab;
pub mod loader;

pub use dwarf::DwarfResolver;
pub use gopclntab::FuncLoc;
pub use loader::BinaryLoader;
