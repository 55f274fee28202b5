//! Aggregation model: parsed records grouped by page size, and the report
//! numbers derived from them.

use crate::Result;
use crate::log::{ParseResult, parse_file};
use crate::units::{byte_to_kb, safe_div};
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Records for one page size, keyed by ref_count. Slots may be sparse.
pub type RefSlots = BTreeMap<u64, ParseResult>;

/// page_size -> ref_count -> record.
pub type AggregationTable = BTreeMap<u64, RefSlots>;

/// Store `result` under (page_size, ref_count).
///
/// A later record with the same key replaces the earlier one.
pub fn save(table: &mut AggregationTable, result: ParseResult) {
    let slots = table.entry(result.page_size).or_default();
    if let Some(prev) = slots.insert(result.ref_count, result) {
        debug!(
            page_size = prev.page_size,
            ref_count = prev.ref_count,
            "replaced earlier record with the same key"
        );
    }
}

/// Records gathered from a run, plus the failure tally.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub table: AggregationTable,
    /// `Fail` records seen, counted before `save` collapses equal keys.
    pub failed: usize,
}

impl Aggregation {
    pub fn record(&mut self, result: ParseResult) {
        if !result.is_success() {
            self.failed += 1;
        }
        save(&mut self.table, result);
    }
}

/// Parse every log named in `list_path` (one path per line) into `agg`.
///
/// Individual log failures become `Fail` records. Only the list file itself
/// being unreadable is an error; records gathered before a mid-file read
/// error stay in `agg`.
pub fn load_list(list_path: &Path, agg: &mut Aggregation) -> Result<()> {
    let file = File::open(list_path)
        .with_context(|| format!("open list file {}", list_path.display()))?;
    load_from(BufReader::new(file), agg)
        .with_context(|| format!("read list file {}", list_path.display()))
}

/// Drive the parser over each non-blank line of `list`.
pub fn load_from<R: BufRead>(list: R, agg: &mut Aggregation) -> Result<()> {
    for line in list.lines() {
        let line = line?;
        let log_path = line.trim_end_matches('\r');
        if log_path.trim().is_empty() {
            continue;
        }
        agg.record(parse_file(Path::new(log_path)));
    }
    Ok(())
}

/// One page-size group of the report.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub page_size: u64,
    pub page_kb: u64,
    /// Successful records, highest ref_count first.
    pub rows: Vec<ParseResult>,
    pub success_count: usize,
    pub bw_per_gb_sum: f64,
    pub average_bw_per_gb: f64,
    pub total_byte: u64,
    pub total_kb: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsView {
    pub groups: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub average_bw_per_gb: f64,
    pub total_byte: u64,
    pub total_kb: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub groups: Vec<GroupView>,
    pub totals: TotalsView,
}

/// Compute per-group and global sums and averages.
///
/// Groups come in ascending page size; rows within a group in descending
/// ref_count. Failed records are left out of every sum; `failed_count` is
/// the tally kept by `Aggregation::record`.
pub fn build_report_data(agg: &Aggregation) -> ReportData {
    let table = &agg.table;
    let mut groups = Vec::with_capacity(table.len());

    let mut bw_all = 0.0f64;
    let mut count_all = 0usize;
    let mut total_all = 0u64;

    for (&page_size, slots) in table {
        let mut rows = Vec::new();
        let mut bw_sum = 0.0f64;
        let mut total_byte = 0u64;

        for result in slots.values().rev().filter(|r| r.is_success()) {
            bw_sum += result.bw_per_gb;
            total_byte = total_byte.saturating_add(result.total_byte);
            rows.push(result.clone());
        }

        let success_count = rows.len();
        bw_all += bw_sum;
        count_all += success_count;
        total_all = total_all.saturating_add(total_byte);

        groups.push(GroupView {
            page_size,
            page_kb: byte_to_kb(page_size),
            rows,
            success_count,
            bw_per_gb_sum: bw_sum,
            average_bw_per_gb: safe_div(bw_sum, success_count as f64),
            total_byte,
            total_kb: byte_to_kb(total_byte),
        });
    }

    ReportData {
        totals: TotalsView {
            groups: groups.len(),
            success_count: count_all,
            failed_count: agg.failed,
            average_bw_per_gb: safe_div(bw_all, count_all as f64),
            total_byte: total_all,
            total_kb: byte_to_kb(total_all),
        },
        groups,
    }
}
