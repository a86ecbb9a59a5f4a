use std::error::Error;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dashboard_report::charts::ForecastChart;
use dashboard_report::forecast::{DEFAULT_HORIZON, MAX_HORIZON};
use dashboard_report::session::{load_models, train_models};
use dashboard_report::{
    DashboardConfig, DashboardSession, DateRange, Metric, RenderedReport, ReportBuilder,
    ReportError, REPORT_FILE_NAME,
};

/// Performance dashboard on the command line.
///
/// The dataset path is taken from `--data` or the `DASHBOARD_DATA_PATH`
/// environment variable; a `.env` file in the working directory is read first.
#[derive(Parser)]
#[command(author, version, about = "Performance dashboard metrics, charts, forecasts and reports")]
struct Cli {
    /// Dataset CSV file.
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Directory holding the forecast model artifacts.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// First day of the selected range (YYYY-MM-DD).
    #[arg(long, global = true)]
    start: Option<NaiveDate>,

    /// Last day of the selected range (YYYY-MM-DD).
    #[arg(long, global = true)]
    end: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the summary metrics of the selected range.
    Metrics,

    /// Print interactive chart data as JSON.
    Chart {
        /// Only print this metric (Spend, Impressions, Bookings, CPB, CPC).
        #[arg(long)]
        metric: Option<Metric>,
    },

    /// Print the forecast chart (history and forecast days) of every
    /// available model as JSON.
    Forecast {
        /// Estimated daily spend for the forecast days.
        #[arg(long, default_value_t = 0.0)]
        spend: f64,

        /// Number of days to forecast.
        #[arg(long, default_value_t = DEFAULT_HORIZON, value_parser = parse_horizon)]
        horizon: usize,
    },

    /// Fit the forecast models on the dataset and write their artifacts.
    Train,

    /// Render the PDF report for the selected range.
    Report {
        /// Commentary for a metric, as METRIC=TEXT.  May be repeated.
        #[arg(long = "comment", value_parser = parse_comment)]
        comments: Vec<(Metric, String)>,

        /// Output file.
        #[arg(long, default_value = REPORT_FILE_NAME)]
        output: PathBuf,

        /// Print "Page N of M" at the bottom of each page.
        #[arg(long)]
        page_numbers: bool,

        /// Add an outline entry for every metric section.
        #[arg(long)]
        bookmarks: bool,
    },
}

fn parse_comment(value: &str) -> Result<(Metric, String), String> {
    let (metric, text) = value
        .split_once('=')
        .ok_or_else(|| format!("expected METRIC=TEXT, got {:?}", value))?;
    let metric = metric.parse::<Metric>().map_err(|err| err.to_string())?;
    // Allow multi-line commentary from a shell that cannot pass newlines.
    Ok((metric, text.replace("\\n", "\n")))
}

fn parse_horizon(value: &str) -> Result<usize, String> {
    let days = value
        .parse::<usize>()
        .map_err(|err| format!("{value:?} is not a number of days: {err}"))?;
    if days > MAX_HORIZON {
        return Err(format!("at most {MAX_HORIZON} days can be forecast"));
    }
    Ok(days)
}

fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match cli.data {
        Some(path) => DashboardConfig::new(path),
        None => DashboardConfig::from_env()?,
    };
    if let Some(dir) = cli.models_dir {
        config = config.with_models_dir(dir);
    }

    log::debug!("Loading dataset from {}", config.data_path.display());
    let mut session = DashboardSession::open(&config)?;
    let current = session.range();
    session.set_range(DateRange::new(
        cli.start.unwrap_or(current.start()),
        cli.end.unwrap_or(current.end()),
    ));

    match cli.command {
        Commands::Metrics => {
            for (label, value) in session.metrics().entries() {
                println!("{}: {}", label, value);
            }
        }
        Commands::Chart { metric } => {
            for (chart_metric, json) in session.interactive_charts() {
                if metric.map_or(true, |wanted| wanted == chart_metric) {
                    println!("{}", json);
                }
            }
        }
        Commands::Forecast { spend, horizon } => {
            let mut models = Vec::new();
            for (target, result) in load_models(&config.models_dir) {
                match result {
                    Ok(model) => models.push((target, model)),
                    Err(err) => report_and_continue(&format!("{:?} model unavailable", target), &err),
                }
            }

            session.set_estimated_spend(spend);
            let session = session.with_models(models);
            for (target, result) in session.forecast_all(horizon) {
                match result {
                    Ok(forecast) => println!("{}", ForecastChart::new(target, &forecast).to_json()?),
                    Err(err) => report_and_continue(&format!("{:?} forecast failed", target), &err),
                }
            }
        }
        Commands::Train => {
            for (target, result) in train_models(session.dataset(), &config.models_dir)? {
                match result {
                    Ok(path) => println!("{:?}: wrote {}", target, path.display()),
                    Err(err) => report_and_continue(&format!("{:?} training failed", target), &err),
                }
            }
        }
        Commands::Report {
            comments,
            output,
            page_numbers,
            bookmarks,
        } => {
            for (metric, text) in comments {
                session.set_commentary(metric, text);
            }

            let builder = ReportBuilder::new().with_page_numbers(page_numbers);
            let report = render_report(&session, &builder, bookmarks)?;

            fs::write(&output, &report.bytes)?;
            println!(
                "Wrote {} ({} pages, {})",
                output.display(),
                report.page_count,
                report.media_type()
            );
        }
    }

    Ok(())
}

#[cfg(feature = "bookmarks")]
fn render_report(
    session: &DashboardSession,
    builder: &ReportBuilder,
    bookmarks: bool,
) -> Result<RenderedReport, ReportError> {
    if bookmarks {
        builder.render_with_bookmarks(&session.report_content()?)
    } else {
        session.generate_report(builder)
    }
}

#[cfg(not(feature = "bookmarks"))]
fn render_report(
    session: &DashboardSession,
    builder: &ReportBuilder,
    bookmarks: bool,
) -> Result<RenderedReport, ReportError> {
    if bookmarks {
        log::warn!("Built without the bookmarks feature; ignoring --bookmarks");
    }
    session.generate_report(builder)
}

fn report_and_continue(context: &str, err: &(dyn Error + 'static)) {
    eprintln!("Warning: {}: {}", context, err);
    print_error_sources(err);
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_is_bounded() {
        assert_eq!(parse_horizon("7"), Ok(7));
        assert_eq!(parse_horizon(&MAX_HORIZON.to_string()), Ok(MAX_HORIZON));
        assert!(parse_horizon("18446744073709551615").is_err());
        assert!(parse_horizon("-1").is_err());
    }

    #[test]
    fn comments_name_a_metric() {
        let (metric, text) = parse_comment("cpb=Flat\\nthen rising").unwrap();
        assert_eq!(metric, Metric::Cpb);
        assert_eq!(text, "Flat\nthen rising");
        assert!(parse_comment("Clicks=up").is_err());
        assert!(parse_comment("no separator").is_err());
    }

    #[test]
    fn oversized_horizon_fails_to_parse() {
        let result = Cli::try_parse_from(["dashboard", "forecast", "--horizon", "100000"]);
        assert!(result.is_err());
    }
}
