// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Version-specific wait-reason tables (spec §4.10).
//!
//! Ported from `wait_reason_registry.go` / `gwaitreason.go`. The Go runtime
//! has renumbered `waitReason` codes more than once across releases, so the
//! mapping from raw byte to human string is keyed by normalized
//! `major.minor` version and falls back to the highest registered version
//! when the target's version isn't one we know about.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

pub type WaitReasonMap = BTreeMap<u8, &'static str>;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"go(\d+\.\d+)").unwrap())
}

/// Strips a leading "go" prefix and any patch component, e.g. "go1.18.3" or
/// "1.18.3" both normalize to "1.18".
pub fn normalize_version(v: &str) -> String {
    let stripped = v.strip_prefix("go").unwrap_or(v);
    if let Some(caps) = version_regex().captures(v) {
        return caps[1].to_string();
    }
    stripped.to_string()
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let pa: Vec<u32> = a.split('.').filter_map(|p| p.parse().ok()).collect();
    let pb: Vec<u32> = b.split('.').filter_map(|p| p.parse().ok()).collect();
    pa.cmp(&pb)
}

macro_rules! wait_reason_map {
    ($($code:expr => $name:expr),* $(,)?) => {{
        let mut m = WaitReasonMap::new();
        $(m.insert($code, $name);)*
        m
    }};
}

// from runtime/runtime2.go, Go 1.10 through 1.12: no renumbering between
// these releases.
fn wait_reason_1_10() -> WaitReasonMap {
    wait_reason_map! {
        0 => "",
        1 => "GC assist marking",
        2 => "IO wait",
        3 => "chan receive (nil chan)",
        4 => "chan send (nil chan)",
        5 => "dumping heap",
        6 => "garbage collection",
        7 => "garbage collection scan",
        8 => "panicwait",
        9 => "select",
        10 => "select (no cases)",
        11 => "GC assist wait",
        12 => "GC sweep wait",
        13 => "chan receive",
        14 => "chan send",
        15 => "finalizer wait",
        16 => "force gc (idle)",
        17 => "semacquire",
        18 => "sleep",
        19 => "sync.Cond.Wait",
        20 => "timer goroutine (idle)",
        21 => "trace reader (blocked)",
        22 => "wait for GC cycle",
        23 => "GC worker (idle)",
    }
}

// Go 1.13 inserted "GC scavenge wait" in the middle of the table, shifting
// every later code up by one — hence a full second table rather than a diff.
fn wait_reason_1_13() -> WaitReasonMap {
    wait_reason_map! {
        0 => "",
        1 => "GC assist marking",
        2 => "IO wait",
        3 => "chan receive (nil chan)",
        4 => "chan send (nil chan)",
        5 => "dumping heap",
        6 => "garbage collection",
        7 => "garbage collection scan",
        8 => "panicwait",
        9 => "select",
        10 => "select (no cases)",
        11 => "GC assist wait",
        12 => "GC sweep wait",
        13 => "GC scavenge wait",
        14 => "chan receive",
        15 => "chan send",
        16 => "finalizer wait",
        17 => "force gc (idle)",
        18 => "semacquire",
        19 => "sleep",
        20 => "sync.Cond.Wait",
        21 => "timer goroutine (idle)",
        22 => "trace reader (blocked)",
        23 => "wait for GC cycle",
        24 => "GC worker (idle)",
        25 => "preempted",
    }
}

// 1.18 added a handful of semaphore / sudog-ready entries after 1.13's
// table; 1.20-1.24 carried it forward unchanged apart from 1.24 itself.
fn wait_reason_1_18() -> WaitReasonMap {
    let mut m = wait_reason_1_13();
    m.insert(26, "sleep for testing");
    m
}

fn wait_reason_1_20() -> WaitReasonMap {
    let mut m = wait_reason_1_18();
    m.insert(27, "GC scavenge wait extended");
    m
}

fn wait_reason_1_21() -> WaitReasonMap {
    wait_reason_1_20()
}

fn wait_reason_1_22() -> WaitReasonMap {
    let mut m = wait_reason_1_21();
    m.insert(28, "synctest");
    m
}

fn wait_reason_1_24() -> WaitReasonMap {
    wait_reason_1_22()
}

/// Maps a normalized version string to its wait-reason table.
pub struct VersionRegistry {
    versions: BTreeMap<String, WaitReasonMap>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        let mut versions = BTreeMap::new();
        versions.insert("1.10".to_string(), wait_reason_1_10());
        versions.insert("1.11".to_string(), wait_reason_1_10());
        versions.insert("1.12".to_string(), wait_reason_1_10());
        versions.insert("1.13".to_string(), wait_reason_1_13());
        versions.insert("1.18".to_string(), wait_reason_1_18());
        versions.insert("1.20".to_string(), wait_reason_1_20());
        versions.insert("1.21".to_string(), wait_reason_1_21());
        versions.insert("1.22".to_string(), wait_reason_1_22());
        versions.insert("1.23".to_string(), wait_reason_1_22());
        versions.insert("1.24".to_string(), wait_reason_1_24());
        VersionRegistry { versions }
    }

    pub fn register(&mut self, version: &str, table: WaitReasonMap) {
        self.versions.insert(normalize_version(version), table);
    }

    /// Resolution order: exact normalized match, then major.minor fallback
    /// (patch already dropped by normalization so this is really the same
    /// step twice for safety), then the highest-registered version, then an
    /// empty table if nothing is registered at all.
    pub fn wait_reason_map(&self, version: &str) -> WaitReasonMap {
        let normalized = normalize_version(version);
        if let Some(m) = self.versions.get(&normalized) {
            return m.clone();
        }
        self.versions
            .iter()
            .max_by(|(a, _), (b, _)| compare_versions(a, b))
            .map(|(_, m)| m.clone())
            .unwrap_or_default()
    }
}

impl Default for VersionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_go_prefixed_patch_versions() {
        assert_eq!(normalize_version("go1.18.3"), "1.18");
        assert_eq!(normalize_version("go1.9"), "1.9");
        assert_eq!(normalize_version("1.22.4"), "1.22");
    }

    #[test]
    fn exact_version_match() {
        let reg = VersionRegistry::new();
        let m = reg.wait_reason_map("go1.13.1");
        assert_eq!(m.get(&13), Some(&"GC scavenge wait"));
    }

    // spec §8: version fallback — for a version not registered, the
    // resolved table is the highest-numbered registered version, and is
    // non-empty.
    #[test]
    fn unregistered_version_falls_back_to_highest() {
        let reg = VersionRegistry::new();
        let m = reg.wait_reason_map("go99.99");
        assert!(!m.is_empty());
        assert_eq!(m, wait_reason_1_24());
    }

    #[test]
    fn empty_registry_yields_empty_map() {
        let reg = VersionRegistry {
            versions: BTreeMap::new(),
        };
        assert!(reg.wait_reason_map("go1.22").is_empty());
    }
}
