//! Byte sizes in human readable form
//!
//! Disk space is declared as strings such as `"90GiB"` and reported back the
//! same way, so that a value read from the API can be compared with the
//! declared one.

use std::sync::LazyLock;

use regex::Regex;

pub const KIB: i64 = 1024;
pub const MIB: i64 = 1024 * KIB;

const SUFFIXES: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(\.\d+)*) ?([kKmMgGtTpP])?[iI]?[bB]?$").expect("valid size pattern")
});

/// Render a byte count with base 1024 units, GiB being the largest
///
/// At most 12 significant digits are kept, so sizes declared with MiB
/// precision survive the round trip.
pub fn human_readable_byte_size(bytes: i64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SUFFIXES.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{}{}", format_significant(size, 12), SUFFIXES[unit])
}

fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let int_digits = (value.abs().log10().floor() as i64 + 1).max(1) as usize;
    let decimals = digits.saturating_sub(int_digits);
    let formatted = format!("{:.*}", decimals, value);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

/// Parse sizes such as `"90GiB"`, `"512 MB"` or `"1.5g"` into bytes
///
/// Units are case-insensitive and always binary multiples.
pub fn parse_ram_in_bytes(s: &str) -> Result<i64, String> {
    let caps = SIZE_PATTERN
        .captures(s)
        .ok_or_else(|| format!("invalid size: '{}'", s))?;

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| format!("invalid size: '{}'", s))?;

    let multiplier = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1,
        Some(unit) => match unit.as_str() {
            "k" => KIB,
            "m" => MIB,
            "g" => 1024 * MIB,
            "t" => 1024 * 1024 * MIB,
            "p" => 1024 * 1024 * 1024 * MIB,
            _ => return Err(format!("invalid size: '{}'", s)),
        },
    };

    Ok((number * multiplier as f64) as i64)
}

/// Parse a declared disk size into MiB
pub fn parse_disk_space_mb(s: &str) -> Result<i64, String> {
    Ok(parse_ram_in_bytes(s)? / MIB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_readable_sizes() {
        assert_eq!(human_readable_byte_size(81920 * MIB), "80GiB");
        assert_eq!(human_readable_byte_size(1536 * MIB), "1.5GiB");
        assert_eq!(human_readable_byte_size(512 * MIB), "512MiB");
        assert_eq!(human_readable_byte_size(0), "0B");
        assert_eq!(human_readable_byte_size(1000), "1000B");
        assert_eq!(human_readable_byte_size(2048), "2KiB");
        // GiB is the largest unit
        assert_eq!(human_readable_byte_size(2048 * 1024 * MIB), "2048GiB");
    }

    #[test]
    fn mib_precision_survives() {
        let bytes = 92170 * MIB;
        let rendered = human_readable_byte_size(bytes);
        assert_eq!(rendered, "90.009765625GiB");
        assert_eq!(parse_ram_in_bytes(&rendered).unwrap(), bytes);
    }

    #[test]
    fn parse_sizes() {
        assert_eq!(parse_ram_in_bytes("90GiB").unwrap(), 90 * 1024 * MIB);
        assert_eq!(parse_ram_in_bytes("512 MB").unwrap(), 512 * MIB);
        assert_eq!(parse_ram_in_bytes("1.5g").unwrap(), 1536 * MIB);
        assert_eq!(parse_ram_in_bytes("10").unwrap(), 10);
        assert_eq!(parse_ram_in_bytes("4k").unwrap(), 4096);
        assert_eq!(parse_disk_space_mb("80GiB").unwrap(), 81920);
    }

    #[test]
    fn reject_invalid_sizes() {
        assert!(parse_ram_in_bytes("").is_err());
        assert!(parse_ram_in_bytes("-1GiB").is_err());
        assert!(parse_ram_in_bytes("ten gigs").is_err());
        assert!(parse_ram_in_bytes("10 XB").is_err());
    }

    #[test]
    fn size_pattern_is_shared_across_calls() {
        let pattern: &Regex = &SIZE_PATTERN;
        for _ in 0..3 {
            assert_eq!(parse_disk_space_mb("90GiB").unwrap(), 92160);
        }
        assert!(std::ptr::eq(pattern, &*SIZE_PATTERN));
    }
}
