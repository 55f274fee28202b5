use crate::log::row::{ParseResult, ParseState};
use crate::units::{byte_to_mbs, safe_div};
use anyhow::Context;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Raw counters as they accumulate while scanning a log.
#[derive(Debug, Clone, PartialEq)]
pub struct Counters {
    pub remote_read_cold: u64,
    /// Elapsed seconds.
    pub time: f64,
    pub ref_count: u64,
    pub page_size: u64,
    pub page_count: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            remote_read_cold: 0,
            time: 1.0,
            ref_count: 0,
            page_size: 0,
            page_count: 0,
        }
    }
}

impl Counters {
    /// Derive bandwidth-per-GB and seal the record.
    pub fn finish(self, state: ParseState) -> ParseResult {
        let bw_mb_per_s = byte_to_mbs(self.remote_read_cold, self.time);
        let total_byte = self.page_count.saturating_mul(self.page_size);
        let bw_per_gb = 1_000_000_000.0 * safe_div(bw_mb_per_s, total_byte as f64);

        ParseResult {
            state,
            ref_count: self.ref_count,
            page_size: self.page_size,
            bw_per_gb,
            total_byte,
        }
    }
}

/// Line patterns. None is anchored; each may appear anywhere on a line.
/// Digits are ASCII only.
struct Patterns {
    remote_read_cold: Regex,
    elapsed: Regex,
    ref_count: Regex,
    page_size: Regex,
    page_count: Regex,
}

impl Patterns {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            remote_read_cold: Regex::new(r"([0-9,]*)\s+remote_read_COLD")?,
            elapsed: Regex::new(r"([0-9.]*)\s+seconds\s+time\s+elapsed")?,
            ref_count: Regex::new(r"ref_count=([0-9]+)")?,
            page_size: Regex::new(r"page_size=([0-9]+)")?,
            page_count: Regex::new(r"page_count=([0-9]+)")?,
        })
    }

    /// Update every field whose pattern matches `line`; later lines win.
    fn apply(&self, line: &str, c: &mut Counters) {
        if let Some(v) = capture(&self.remote_read_cold, line) {
            c.remote_read_cold = lenient_u64(&v.replace(',', ""));
        }
        if let Some(v) = capture(&self.elapsed, line) {
            c.time = lenient_f64(v);
        }
        if let Some(v) = capture(&self.ref_count, line) {
            c.ref_count = lenient_u64(v);
        }
        if let Some(v) = capture(&self.page_size, line) {
            c.page_size = lenient_u64(v);
        }
        if let Some(v) = capture(&self.page_count, line) {
            c.page_count = lenient_u64(v);
        }
    }
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

// Empty captures count as 0; digit runs too long for u64 saturate.
fn lenient_u64(s: &str) -> u64 {
    match s.parse() {
        Ok(v) => v,
        Err(_) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            debug!(value = %s, "counter overflows u64, saturating");
            u64::MAX
        }
        Err(_) => 0,
    }
}

// "1.2.3" reads as 1.2; anything unreadable as 0.
fn lenient_f64(s: &str) -> f64 {
    let end = s
        .char_indices()
        .filter(|&(_, ch)| ch == '.')
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().unwrap_or(0.0)
}

/// Scan `reader` line by line into `counters`.
///
/// Counters keep whatever was accumulated when a read error interrupts the scan.
pub fn scan<R: BufRead>(reader: R, counters: &mut Counters) -> anyhow::Result<()> {
    let patterns = Patterns::new()?;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read error at line {}", lineno + 1))?;
        patterns.apply(&line, counters);
    }
    Ok(())
}

/// Parse one benchmark log from any reader. `source` names it in warnings.
pub fn parse_reader<R: BufRead>(reader: R, source: &str) -> ParseResult {
    let mut counters = Counters::default();
    let outcome = scan(reader, &mut counters);
    seal(counters, outcome, source)
}

/// Parse one benchmark log file.
///
/// Never fails: an unreadable file yields a `Fail` record and a warning.
pub fn parse_file(path: &Path) -> ParseResult {
    let source = path.display().to_string();
    match File::open(path).with_context(|| format!("open log file {}", source)) {
        Ok(file) => parse_reader(BufReader::new(file), &source),
        Err(err) => seal(Counters::default(), Err(err), &source),
    }
}

fn seal(counters: Counters, outcome: anyhow::Result<()>, source: &str) -> ParseResult {
    let state = match outcome {
        Ok(()) => ParseState::Success,
        Err(err) => {
            warn!(path = %source, error = %format!("{:#}", err), "failed to parse benchmark log");
            ParseState::Fail
        }
    };
    debug!(path = %source, counters = ?counters, ?state, "parsed benchmark log");
    counters.finish(state)
}
