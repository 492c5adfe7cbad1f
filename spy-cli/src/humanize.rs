// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-count humanization, ported from `humanize.go`. A display-only
//! concern of the CLI shell, not part of the core's data model.

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

pub fn humanize_bytes(s: u64) -> String {
    let s = s as f64;
    if s < KB {
        format!("{}B", s as u64)
    } else if s < MB {
        format!("{:.2}KB", s / KB)
    } else if s < GB {
        format!("{:.2}MB", s / MB)
    } else {
        format!("{:.2}GB", s / GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_counts_render_as_bytes() {
        assert_eq!(humanize_bytes(500), "500B");
    }

    #[test]
    fn kilobyte_range() {
        assert_eq!(humanize_bytes(2048), "2.00KB");
    }

    #[test]
    fn megabyte_range() {
        assert_eq!(humanize_bytes(5 * 1024 * 1024), "5.00MB");
    }
}
