//! Plot-data emission and the external histogram collaborator.
//!
//! The collaborator reads `bw_per_gb_raw.log` from its working directory and
//! writes `bw-per-gb-histogram.png` next to it. We only prepare the input,
//! run it, and move the image into the output directory.

use crate::Result;
use crate::model::{GroupView, ReportData};
use anyhow::{Context, bail};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

pub const RAW_DATA_FILE: &str = "bw_per_gb_raw.log";
pub const HISTOGRAM_IMAGE: &str = "bw-per-gb-histogram.png";
pub const DEFAULT_PLOT_SCRIPT: &str = "gnuplot_bw_per_gb.sh";

/// Synchronous renderer: consumes a raw-data file, returns the image it made.
pub trait Plotter {
    fn render(&self, input: &Path, page_size: u64) -> Result<PathBuf>;
}

/// Runs an external program in `work_dir` and waits for it.
///
/// The child starts in `work_dir`, so `program` and `work_dir` must not be
/// relative to the caller's cwd; `new` resolves both.
#[derive(Debug, Clone)]
pub struct PlotCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

impl PlotCommand {
    /// Resolve `work_dir` and `program` against the current directory.
    ///
    /// Without a program, `<work_dir>/gnuplot_bw_per_gb.sh` is used. A bare
    /// program name is left alone for `PATH` lookup.
    pub fn new(program: Option<PathBuf>, args: Vec<String>, work_dir: &Path) -> Result<Self> {
        let work_dir = std::path::absolute(work_dir)
            .with_context(|| format!("resolve work dir {}", work_dir.display()))?;
        let program = match program {
            Some(p) if p.components().count() > 1 => std::path::absolute(&p)
                .with_context(|| format!("resolve plot command {}", p.display()))?,
            Some(p) => p,
            None => work_dir.join(DEFAULT_PLOT_SCRIPT),
        };
        Ok(Self {
            program,
            args,
            work_dir,
        })
    }
}

impl Plotter for PlotCommand {
    fn render(&self, input: &Path, page_size: u64) -> Result<PathBuf> {
        let expected_input = self.work_dir.join(RAW_DATA_FILE);
        let input = std::path::absolute(input)
            .with_context(|| format!("resolve plot input {}", input.display()))?;
        if input != expected_input {
            bail!(
                "plot input must be {}, got {}",
                expected_input.display(),
                input.display()
            );
        }

        let image = self.work_dir.join(HISTOGRAM_IMAGE);
        // A leftover image from an earlier run must not pass for fresh output.
        if image.exists() {
            fs::remove_file(&image)
                .with_context(|| format!("remove stale {}", image.display()))?;
        }

        let out_path = self.work_dir.join(format!("gnuplot_bw_per_gb_{}.out", page_size));
        let err_path = self.work_dir.join(format!("gnuplot_bw_per_gb_{}.err", page_size));
        let stdout = File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?;
        let stderr = File::create(&err_path)
            .with_context(|| format!("create {}", err_path.display()))?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.work_dir)
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .with_context(|| format!("spawn {}", self.program.display()))?;

        if !status.success() {
            bail!(
                "{} exited with {} (see {})",
                self.program.display(),
                status,
                err_path.display()
            );
        }
        if !image.is_file() {
            bail!("{} did not produce {}", self.program.display(), image.display());
        }
        Ok(image)
    }
}

/// Outcome of one plotting pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlotSummary {
    pub rendered: Vec<PathBuf>,
    /// Page sizes whose histogram is missing.
    pub failed: Vec<u64>,
}

/// Write one raw-data line per successful row, in report order.
pub fn write_raw_data(group: &GroupView, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    for row in &group.rows {
        writeln!(w, "{}", row.raw_line())?;
    }
    w.flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Destination for a group's histogram: `<out_dir>/bw-per-gb-histogram-<KB>K.png`.
pub fn histogram_path(out_dir: &Path, page_kb: u64) -> PathBuf {
    out_dir.join(format!("bw-per-gb-histogram-{}K.png", page_kb))
}

// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("remove {}", from.display()))?;
    Ok(())
}

fn plot_group(
    group: &GroupView,
    plotter: &dyn Plotter,
    work_dir: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let raw = work_dir.join(RAW_DATA_FILE);
    write_raw_data(group, &raw)?;
    let image = plotter.render(&raw, group.page_size)?;
    let dest = histogram_path(out_dir, group.page_kb);
    move_file(&image, &dest)?;
    Ok(dest)
}

/// Emit raw data and render a histogram for every page-size group.
///
/// A failing group is logged and skipped; the rest still run.
pub fn generate_images(
    data: &ReportData,
    plotter: &dyn Plotter,
    work_dir: &Path,
    out_dir: &Path,
) -> PlotSummary {
    let mut summary = PlotSummary::default();
    for group in &data.groups {
        match plot_group(group, plotter, work_dir, out_dir) {
            Ok(dest) => {
                info!(page_size = group.page_size, image = %dest.display(), "rendered histogram");
                summary.rendered.push(dest);
            }
            Err(err) => {
                warn!(
                    page_size = group.page_size,
                    error = %format!("{:#}", err),
                    "failed to generate BW-per-GB histogram for page type"
                );
                summary.failed.push(group.page_size);
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{ParseResult, ParseState};
    use crate::model::{Aggregation, build_report_data};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn rec(state: ParseState, page_size: u64, ref_count: u64, bw: f64) -> ParseResult {
        ParseResult {
            state,
            ref_count,
            page_size,
            bw_per_gb: bw,
            total_byte: page_size * 10,
        }
    }

    fn sample_report() -> ReportData {
        let mut agg = Aggregation::default();
        agg.record(rec(ParseState::Success, 4096, 1, 781.25));
        agg.record(rec(ParseState::Fail, 4096, 2, 0.0));
        agg.record(rec(ParseState::Success, 4096, 4, 12.5));
        agg.record(rec(ParseState::Success, 2_097_152, 0, 3.0));
        build_report_data(&agg)
    }

    /// Copies its input to the image name, or fails for listed page sizes.
    struct FakePlotter {
        fail_for: Vec<u64>,
        seen: RefCell<Vec<String>>,
    }

    impl Plotter for FakePlotter {
        fn render(&self, input: &Path, page_size: u64) -> Result<PathBuf> {
            self.seen.borrow_mut().push(fs::read_to_string(input)?);
            if self.fail_for.contains(&page_size) {
                bail!("plot failed");
            }
            let image = input.with_file_name(HISTOGRAM_IMAGE);
            fs::copy(input, &image)?;
            Ok(image)
        }
    }

    #[test]
    fn raw_data_skips_failures_and_descends() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample_report();
        let path = dir.path().join(RAW_DATA_FILE);
        write_raw_data(&data.groups[0], &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "success 4 4096 12.5 40960\nsuccess 1 4096 781.25 40960\n"
        );
    }

    #[test]
    fn images_land_in_out_dir() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let plotter = FakePlotter {
            fail_for: vec![],
            seen: RefCell::new(vec![]),
        };

        let summary = generate_images(&sample_report(), &plotter, work.path(), out.path());

        assert_eq!(
            summary.rendered,
            vec![
                out.path().join("bw-per-gb-histogram-4K.png"),
                out.path().join("bw-per-gb-histogram-2048K.png"),
            ]
        );
        assert!(summary.failed.is_empty());
        assert!(!work.path().join(HISTOGRAM_IMAGE).exists());
        assert_eq!(
            plotter.seen.borrow()[1],
            "success 0 2097152 3.0 20971520\n"
        );
    }

    #[test]
    fn one_failing_group_does_not_stop_the_rest() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let plotter = FakePlotter {
            fail_for: vec![4096],
            seen: RefCell::new(vec![]),
        };

        let summary = generate_images(&sample_report(), &plotter, work.path(), out.path());

        assert_eq!(summary.failed, vec![4096]);
        assert_eq!(summary.rendered.len(), 1);
        assert!(!out.path().join("bw-per-gb-histogram-4K.png").exists());
        assert!(out.path().join("bw-per-gb-histogram-2048K.png").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn plot_command_runs_in_work_dir() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let plotter = PlotCommand {
            program: PathBuf::from("sh"),
            args: vec![
                "-c".into(),
                format!("echo plotting; cp {} {}", RAW_DATA_FILE, HISTOGRAM_IMAGE),
            ],
            work_dir: work.path().to_path_buf(),
        };

        let summary = generate_images(&sample_report(), &plotter, work.path(), out.path());

        assert!(summary.failed.is_empty());
        let image = fs::read_to_string(out.path().join("bw-per-gb-histogram-4K.png")).unwrap();
        assert_eq!(image, "success 4 4096 12.5 40960\nsuccess 1 4096 781.25 40960\n");
        let log = fs::read_to_string(work.path().join("gnuplot_bw_per_gb_4096.out")).unwrap();
        assert_eq!(log, "plotting\n");
    }

    #[cfg(unix)]
    #[test]
    fn plot_command_failure_is_reported() {
        let work = tempfile::tempdir().unwrap();
        let plotter = PlotCommand {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo boom >&2; exit 3".into()],
            work_dir: work.path().to_path_buf(),
        };
        let raw = work.path().join(RAW_DATA_FILE);
        fs::write(&raw, "").unwrap();

        let err = plotter.render(&raw, 4096).unwrap_err();
        assert!(err.to_string().contains("exited with"));
        let stderr = fs::read_to_string(work.path().join("gnuplot_bw_per_gb_4096.err")).unwrap();
        assert_eq!(stderr, "boom\n");
    }

    #[cfg(unix)]
    #[test]
    fn plot_command_without_image_fails() {
        let work = tempfile::tempdir().unwrap();
        let plotter = PlotCommand {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "true".into()],
            work_dir: work.path().to_path_buf(),
        };
        let raw = work.path().join(RAW_DATA_FILE);
        fs::write(&raw, "").unwrap();
        fs::write(work.path().join(HISTOGRAM_IMAGE), "stale").unwrap();

        let err = plotter.render(&raw, 4096).unwrap_err();
        assert!(err.to_string().contains("did not produce"));
    }

    #[test]
    fn relative_paths_resolve_against_caller_cwd() {
        let work = tempfile::tempdir_in(".").unwrap();
        assert!(work.path().is_relative());
        fs::write(work.path().join(DEFAULT_PLOT_SCRIPT), "#!/bin/sh\n").unwrap();

        let plotter = PlotCommand::new(None, vec![], work.path()).unwrap();
        assert!(plotter.work_dir.is_absolute());
        assert!(plotter.program.is_absolute());
        assert!(plotter.program.is_file());

        let custom =
            PlotCommand::new(Some(PathBuf::from("./tools/plot.sh")), vec![], work.path()).unwrap();
        assert!(custom.program.is_absolute());
        assert!(custom.program.ends_with("tools/plot.sh"));

        let bare = PlotCommand::new(Some(PathBuf::from("gnuplot")), vec![], work.path()).unwrap();
        assert_eq!(bare.program, PathBuf::from("gnuplot"));
    }

    #[cfg(unix)]
    #[test]
    fn plot_command_with_relative_work_dir() {
        let work = tempfile::tempdir_in(".").unwrap();
        let out = tempfile::tempdir().unwrap();
        let plotter = PlotCommand::new(
            Some(PathBuf::from("sh")),
            vec![
                "-c".into(),
                format!("cp {} {}", RAW_DATA_FILE, HISTOGRAM_IMAGE),
            ],
            work.path(),
        )
        .unwrap();

        let summary = generate_images(&sample_report(), &plotter, work.path(), out.path());

        assert!(summary.failed.is_empty());
        assert!(out.path().join("bw-per-gb-histogram-4K.png").is_file());
        assert!(work.path().join("gnuplot_bw_per_gb_4096.out").is_file());
    }

    #[test]
    fn missing_program_is_an_error() {
        let work = tempfile::tempdir().unwrap();
        let plotter = PlotCommand::new(None, vec![], work.path()).unwrap();
        let raw = work.path().join(RAW_DATA_FILE);
        fs::write(&raw, "").unwrap();
        assert!(plotter.render(&raw, 4096).is_err());
    }
}
