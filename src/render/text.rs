use crate::model::{GroupView, ReportData};
use crate::units::byte_to_kb;
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

static THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(\d{3})").expect("thousands pattern compiles"));

/// Group digits in threes from the right: 1234567 -> "1,234,567".
pub fn format_number<N: ToString>(n: N) -> String {
    group_thousands(&n.to_string())
}

/// Insert commas into every digit run until the string stops changing.
///
/// Already grouped input comes back unchanged. A leading '-' is kept aside
/// and restored.
pub fn group_thousands(s: &str) -> String {
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };

    let mut cur = digits.to_string();
    loop {
        let next = THOUSANDS.replace_all(&cur, "$1,$2").into_owned();
        if next == cur {
            break;
        }
        cur = next;
    }
    format!("{}{}", sign, cur)
}

/// Render the text report printed to stdout.
pub fn render_text_report(data: &ReportData) -> String {
    let mut out = String::new();

    for group in &data.groups {
        render_group(&mut out, group);
    }

    let t = &data.totals;
    let _ = writeln!(out, "\nAll average BW-per-GB: {:.2}", t.average_bw_per_gb);
    let _ = writeln!(out, "All total size:        {} KB", format_number(t.total_kb));
    if t.failed_count > 0 {
        let _ = writeln!(out, "failed count: {}", t.failed_count);
    }
    out
}

fn render_group(out: &mut String, g: &GroupView) {
    let _ = writeln!(out, "\n{}K-page histogram:", g.page_kb);
    out.push_str("ref_count    MBps-per-GB         size(KB)\n");
    out.push_str("==========================================\n");

    for row in &g.rows {
        let _ = writeln!(
            out,
            "{:9} {:14.2} {:>16}",
            row.ref_count,
            row.bw_per_gb,
            format_number(byte_to_kb(row.total_byte))
        );
    }

    let _ = writeln!(
        out,
        "{}K-page average BW-per-GB: {:.2}",
        g.page_kb, g.average_bw_per_gb
    );
    let _ = writeln!(
        out,
        "{}K-page total size:        {} KB",
        g.page_kb,
        format_number(g.total_kb)
    );
}
