use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod log;
mod model;
mod plot;
mod render;
mod units;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "bw-per-gb-profiler")]
#[command(about = "Bandwidth-per-GB report for remote cold-cache benchmark logs", long_about = None)]
struct Cli {
    /// Directory that receives the rendered histograms.
    log_dir: PathBuf,

    /// File listing one benchmark log path per line.
    list_file: PathBuf,

    /// Where the raw data file is written and the plotter runs (default: cwd).
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Plotting program (default: <work_dir>/gnuplot_bw_per_gb.sh).
    #[arg(long)]
    plot_cmd: Option<PathBuf>,

    /// Extra argument for the plotting program; repeatable.
    #[arg(long = "plot-arg", allow_hyphen_values = true)]
    plot_args: Vec<String>,

    /// Skip raw-data emission and plotting.
    #[arg(long)]
    no_plot: bool,

    /// Also write the computed report as JSON.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // 1) Parse every listed log into the table.
    let mut agg = model::Aggregation::default();
    if let Err(err) = model::load_list(&cli.list_file, &mut agg) {
        warn!(error = %format!("{:#}", err), "cannot load list file");
    }

    if agg.table.is_empty() {
        println!("WARNING: No bw-per-gb data.");
        return Ok(());
    }

    // 2) Aggregate + print.
    let data = model::build_report_data(&agg);
    print!("{}", render::render_text_report(&data));

    if let Some(path) = &cli.json {
        let json = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, json)
            .with_context(|| format!("write report json {}", path.display()))?;
    }

    // 3) Plot each page-size group.
    if !cli.no_plot {
        let work_dir = cli
            .work_dir
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        match plot::PlotCommand::new(cli.plot_cmd, cli.plot_args, &work_dir) {
            Ok(plotter) => {
                let summary =
                    plot::generate_images(&data, &plotter, &plotter.work_dir, &cli.log_dir);
                if !summary.failed.is_empty() {
                    warn!(
                        rendered = summary.rendered.len(),
                        failed = ?summary.failed,
                        "some histograms were not generated"
                    );
                }
            }
            Err(err) => warn!(error = %format!("{:#}", err), "skipping histograms"),
        }
    }

    Ok(())
}
