// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The runtime fact cache (spec §4.5), ported from `runtime.go`'s
//! `RuntimeInfo`/`runtimeInfoCache`.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::binary::BinaryLoader;
use crate::memreader::{MemReader, RawMemReader};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeFacts {
    pub version: String,
    pub init_time_ns: i64,
}

#[derive(Default)]
pub struct RuntimeFactCache {
    by_pid: Mutex<HashMap<i32, RuntimeFacts>>,
}

impl RuntimeFactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<R: RawMemReader>(
        &self,
        pid: i32,
        reader: &MemReader<R>,
        loader: &dyn BinaryLoader,
    ) -> Result<RuntimeFacts> {
        if let Some(cached) = self.by_pid.lock().expect("runtime fact cache poisoned").get(&pid) {
            return Ok(cached.clone());
        }

        let version_addr = loader.find_variable_address("runtime.buildVersion")?;
        let version = reader.read_string(reader.static_base() + version_addr)?;

        let init_time_addr = loader.find_variable_address("runtime.runtimeInitTime")?;
        let init_time_ns = reader.read_i64(reader.static_base() + init_time_addr)?;

        let facts = RuntimeFacts {
            version,
            init_time_ns,
        };
        self.by_pid
            .lock()
            .expect("runtime fact cache poisoned")
            .insert(pid, facts.clone());
        Ok(facts)
    }
}
