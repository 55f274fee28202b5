//! Unit conversions shared by the parser and the reporter.

/// Bytes moved per remote cold read hit.
pub const CACHE_LINE_SIZE_BYTES: u64 = 64;

/// Division that yields 0 instead of inf/NaN when the divisor is 0.
pub fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a / b }
}

/// Cache-line hits over `time` seconds, in MB/s.
pub fn byte_to_mbs(hit_count: u64, time: f64) -> f64 {
    safe_div(
        hit_count as f64 * CACHE_LINE_SIZE_BYTES as f64,
        1_000_000.0 * time,
    )
}

pub fn byte_to_kb(bytes: u64) -> u64 {
    bytes / 1024
}
