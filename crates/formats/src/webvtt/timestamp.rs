// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! WebVTT timestamp parsing and formatting.

use std::fmt::Write;

/// Parse a `[HH:]MM:SS.mmm` timestamp into milliseconds. Minutes and
/// seconds are limited to 0-59 and milliseconds to 0-999; hours, when
/// present, take at least two digits and are unbounded.
pub fn parse_timestamp(source: &str) -> Option<u64> {
    if source.len() < 9 || !source.is_ascii() {
        tracing::warn!("timestamp '{source}' is malformed");
        return None;
    }

    let minutes_begin = source.len() - 9;
    let seconds_begin = source.len() - 6;
    let milliseconds_begin = source.len() - 3;

    let hours = if minutes_begin == 0 {
        0
    } else {
        // Anything before the minutes must be hour digits and a colon.
        if minutes_begin < 3 || source.as_bytes()[minutes_begin - 1] != b':' {
            tracing::warn!("timestamp '{source}' is malformed");
            return None;
        }
        match source[..minutes_begin - 1].parse::<u64>() {
            Ok(hours) => hours,
            Err(_) => {
                tracing::warn!("timestamp '{source}' is malformed");
                return None;
            },
        }
    };

    let parse_field = |range: std::ops::Range<usize>, max: u64| -> Option<u64> {
        let field = &source[range];
        if !field.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        field.parse::<u64>().ok().filter(|&value| value <= max)
    };

    let separators_ok = source.as_bytes()[seconds_begin - 1] == b':'
        && source.as_bytes()[milliseconds_begin - 1] == b'.';
    let parsed = separators_ok
        .then(|| {
            let minutes = parse_field(minutes_begin..seconds_begin - 1, 59)?;
            let seconds = parse_field(seconds_begin..milliseconds_begin - 1, 59)?;
            let milliseconds = parse_field(milliseconds_begin..source.len(), 999)?;
            Some(60 * 60 * 1000 * hours + 60 * 1000 * minutes + 1000 * seconds + milliseconds)
        })
        .flatten();

    if parsed.is_none() {
        tracing::warn!("timestamp '{source}' is malformed");
    }
    parsed
}

/// Format milliseconds as the canonical long form `HH:MM:SS.mmm`, with the
/// hour field growing past two digits as needed.
pub fn format_timestamp(ms: u64) -> String {
    let mut remaining = ms;
    let only_ms = remaining % 1000;
    remaining /= 1000;
    let only_seconds = remaining % 60;
    remaining /= 60;
    let only_minutes = remaining % 60;
    remaining /= 60;
    let only_hours = remaining;

    let mut out = String::with_capacity(12);
    // Infallible for String.
    let _ = write!(out, "{only_hours:02}:{only_minutes:02}:{only_seconds:02}.{only_ms:03}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short() {
        assert_eq!(parse_timestamp("00.000"), None);
    }

    #[test]
    fn test_right_length_but_meaningless() {
        assert_eq!(parse_timestamp("ABCDEFGHI"), None);
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(parse_timestamp("12:00:00.000"), Some(43_200_000));
    }

    #[test]
    fn test_parse_long_hours() {
        assert_eq!(parse_timestamp("120:00:00.000"), Some(432_000_000));
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_timestamp("00:12:00.000"), Some(720_000));
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_timestamp("00:00:12.000"), Some(12_000));
    }

    #[test]
    fn test_parse_ms() {
        assert_eq!(parse_timestamp("00:00:00.123"), Some(123));
    }

    #[test]
    fn test_parse_no_hours() {
        assert_eq!(parse_timestamp("12:00.000"), Some(720_000));
    }

    #[test]
    fn test_fail_with_short_hours() {
        assert_eq!(parse_timestamp("1:00:00.000"), None);
    }

    #[test]
    fn test_fail_with_short_minutes() {
        assert_eq!(parse_timestamp("00:1:00.000"), None);
    }

    #[test]
    fn test_fail_with_short_seconds() {
        assert_eq!(parse_timestamp("00:1.000"), None);
    }

    #[test]
    fn test_fail_with_short_ms() {
        assert_eq!(parse_timestamp("00:00.01"), None);
    }

    #[test]
    fn test_fail_with_non_digit() {
        assert_eq!(parse_timestamp("00:0A:00.000"), None);
    }

    #[test]
    fn test_fail_with_invalid_minutes() {
        assert_eq!(parse_timestamp("00:79:00.000"), None);
    }

    #[test]
    fn test_fail_with_invalid_seconds() {
        assert_eq!(parse_timestamp("00:00:79.000"), None);
    }

    #[test]
    fn test_format_milliseconds() {
        assert_eq!(format_timestamp(123), "00:00:00.123");
        assert_eq!(format_timestamp(12), "00:00:00.012");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_timestamp(12_000), "00:00:12.000");
        assert_eq!(format_timestamp(1000), "00:00:01.000");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_timestamp(720_000), "00:12:00.000");
        assert_eq!(format_timestamp(60_000), "00:01:00.000");
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_timestamp(43_200_000), "12:00:00.000");
        assert_eq!(format_timestamp(3_600_000), "01:00:00.000");
        assert_eq!(format_timestamp(442_800_000), "123:00:00.000");
    }
}
