//! Human-readable size strings (`500K`, `2M`, `4G`) to byte counts.

use crate::{Error, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Parse a size string made of digits and an optional `K`, `M` or `G` suffix.
///
/// The suffix is case-insensitive and surrounding whitespace is ignored. A
/// string without suffix is a raw byte count. Callers decide what an empty
/// value means; here it is an error like any other non-numeric body.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();

    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((idx, c)) if c.eq_ignore_ascii_case(&'k') => (&trimmed[..idx], KIB),
        Some((idx, c)) if c.eq_ignore_ascii_case(&'m') => (&trimmed[..idx], MIB),
        Some((idx, c)) if c.eq_ignore_ascii_case(&'g') => (&trimmed[..idx], GIB),
        _ => (trimmed, 1),
    };

    let invalid = || Error::InvalidSizeFormat {
        input: input.to_string(),
    };

    // `u64::from_str` accepts a leading '+', the size grammar does not
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// Format a byte count for log output, e.g. `1.5 MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(GIB, "GiB"), (MIB, "MiB"), (KIB, "KiB")];

    for (unit, label) in UNITS {
        if bytes >= unit {
            return format!("{:.1} {}", bytes as f64 / unit as f64, label);
        }
    }
    format!("{} B", bytes)
}
