// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Human-readable duration formatting, ported from `duration_format.go`.
//! Used to render `RuntimeFacts`' uptime and task/processor ages in the CLI
//! and TUI shells.

use std::time::Duration;

/// Formats a duration rounded to the nearest second as `"3d12h45m30s"`,
/// dropping leading zero components (`"45s"`, `"2m30s"`, `"5h30m15s"`).
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs_f64().round() as u64;

    let days = total / 86_400;
    let rem = total % 86_400;
    let hours = rem / 3_600;
    let rem = rem % 3_600;
    let minutes = rem / 60;
    let seconds = rem % 60;

    if days > 0 {
        format!("{days}d{hours}h{minutes}m{seconds}s")
    } else if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_only() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(2 * 60 + 30)), "2m30s");
    }

    #[test]
    fn hours_minutes_and_seconds() {
        assert_eq!(
            format_duration(Duration::from_secs(5 * 3600 + 30 * 60 + 15)),
            "5h30m15s"
        );
    }

    #[test]
    fn days_hours_minutes_and_seconds() {
        assert_eq!(
            format_duration(Duration::from_secs(3 * 86400 + 12 * 3600 + 45 * 60 + 30)),
            "3d12h45m30s"
        );
    }

    #[test]
    fn zero_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
    }

    #[test]
    fn rounds_to_nearest_second() {
        assert_eq!(
            format_duration(Duration::from_millis(2 * 60_000 + 30_500)),
            "2m31s"
        );
    }
}
