// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The polymorphic variable reader (spec §9), ported from
//! `pkg/binary/var.go`'s `Var`/`UintVar`/`IntVar`/`BoolVar`/`StringVar`/
//! `PtrVar` hierarchy as a sum type plus a dispatching reader, rather than
//! Go's interface-per-kind approach.

use crate::error::Result;
use crate::memreader::{MemReader, RawMemReader};

/// The kind of a named global, as declared by its DWARF type. Chosen by
/// the caller (the CLI's `var` command, the HTTP tool-protocol bridge's
/// `/var` route)
/// rather than inferred, since DWARF type-name matching to kind is outside
/// this engine's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Uint,
    Int,
    Bool,
    Str,
    Ptr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Uint(u64),
    Int(i64),
    Bool(bool),
    Str(String),
    Ptr(u64, Box<VarValue>),
}

/// Reads a value of `kind` at `addr`. The `Ptr` case recurses through
/// `pointee_kind`, matching `PtrVar`'s behavior of loading what it points
/// to rather than just reporting the address.
pub fn parse_var<R: RawMemReader>(
    reader: &MemReader<R>,
    addr: u64,
    kind: VarKind,
    pointee_kind: Option<VarKind>,
) -> Result<VarValue> {
    match kind {
        VarKind::Uint => Ok(VarValue::Uint(reader.read_u64(addr)?)),
        VarKind::Int => Ok(VarValue::Int(reader.read_i64(addr)?)),
        VarKind::Bool => Ok(VarValue::Bool(reader.read_bool(addr)?)),
        VarKind::Str => Ok(VarValue::Str(reader.read_string(addr)?)),
        VarKind::Ptr => {
            let pointee_addr = reader.read_u64(addr)?;
            let inner_kind = pointee_kind.unwrap_or(VarKind::Uint);
            let inner = if pointee_addr == 0 {
                VarValue::Uint(0)
            } else {
                parse_var(reader, pointee_addr, inner_kind, None)?
            };
            Ok(VarValue::Ptr(pointee_addr, Box::new(inner)))
        }
    }
}
