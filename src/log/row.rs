use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseState {
    Success,
    Fail,
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseState::Success => f.write_str("success"),
            ParseState::Fail => f.write_str("fail"),
        }
    }
}

/// Counters extracted from one benchmark log, plus the derived bandwidth.
///
/// Numeric fields of a `Fail` record hold whatever was read before the
/// failure and must not feed any average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub state: ParseState,
    pub ref_count: u64,
    pub page_size: u64,
    /// MB/s per GB of touched memory.
    pub bw_per_gb: f64,
    /// page_count * page_size.
    pub total_byte: u64,
}

impl ParseResult {
    pub fn is_success(&self) -> bool {
        self.state == ParseState::Success
    }

    /// Space-joined line consumed by the plotting script:
    /// state ref_count page_size bw_per_gb total_byte
    pub fn raw_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.state,
            self.ref_count,
            self.page_size,
            float_field(self.bw_per_gb),
            self.total_byte
        )
    }
}

/// Shortest round-trip form, always carrying a decimal point (0 -> "0.0").
fn float_field(v: f64) -> String {
    let s = v.to_string();
    if v.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}
