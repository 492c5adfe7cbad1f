// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pid-keyed reader cache, ported from `server.go`'s `Server`
//! (`readers map[int]proc.ProcessMemReader` behind a `sync.RWMutex`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use spy_core::error::Result;
use spy_core::GoProcess;

#[derive(Clone)]
pub struct AppState {
    readers: Arc<RwLock<HashMap<i32, Arc<GoProcess>>>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            readers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the cached reader for `pid`, attaching a fresh one on a
    /// cache miss. Mirrors `Server.getReader`'s read-then-upgrade lock
    /// dance.
    pub fn get_reader(&self, pid: i32) -> Result<Arc<GoProcess>> {
        if let Some(proc) = self.readers.read().unwrap().get(&pid) {
            return Ok(proc.clone());
        }

        let proc = Arc::new(GoProcess::attach(pid)?);
        self.readers.write().unwrap().insert(pid, proc.clone());
        Ok(proc)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
