use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use histoboard::html::HtmlSink;
use histoboard::session::run_session;
use histoboard::{
    telemetry, Composer, DashboardConfig, HttpSource, LayoutMode, OutputFormat, ReloadController,
};
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Png,
    Svg,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Svg => OutputFormat::Svg,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "histoboard")]
#[command(about = "Render bar-chart dashboards for a remote tabular dataset", long_about = None)]
struct Args {
    /// Dataset source URL handed to the aggregation service (e.g. a CSV export)
    url: Option<String>,

    /// Column to group the summary by
    #[arg(short, long)]
    group: Option<String>,

    /// Only chart these columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Lay the first groups out next to each other instead of in tabs
    #[arg(long)]
    side_by_side: bool,

    /// Directory the dashboard is written to
    #[arg(short, long, default_value = "dashboard")]
    out: PathBuf,

    /// Chart image format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Aggregation service base URL
    #[arg(long)]
    base_url: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read dashboard commands from stdin after the initial load
    #[arg(short, long)]
    interactive: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(if args.verbose { "debug" } else { "info" });

    let mut config =
        DashboardConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(format) = args.format {
        config.format = format.into();
    }
    config.validate().context("Invalid configuration")?;

    let source = HttpSource::from_config(&config).context("Failed to set up HTTP client")?;
    let sink = HtmlSink::new(&args.out, config.format);
    let composer = Composer::new(config.geometry.clone(), config.side_by_side_limit);
    let layout = if args.side_by_side {
        LayoutMode::SideBySide
    } else {
        LayoutMode::Tabs
    };
    let mut controller = ReloadController::new(source, sink, composer).with_layout(layout);

    match &args.url {
        Some(url) => {
            controller
                .load_dataset(url)
                .with_context(|| format!("Failed to load dataset '{}'", url))?;
            if args.group.is_some() {
                controller
                    .set_grouping(args.group.as_deref())
                    .context("Failed to apply grouping")?;
            }
            if let Some(columns) = args.columns {
                controller
                    .set_visible_columns(columns)
                    .context("Failed to apply column filter")?;
            }
        }
        None if !args.interactive => {
            anyhow::bail!("No dataset URL given (pass a URL or use --interactive)");
        }
        None => {}
    }

    if args.interactive {
        let stdin = io::stdin();
        run_session(&mut controller, stdin.lock(), io::stdout().lock())
            .context("Interactive session failed")?;
    } else {
        println!("{}", controller.sink().index_path().display());
    }

    Ok(())
}
