use anyhow::{Context, Result};
use clap::Parser;
use lpscan::{parse_arguments, LineProtocolDecoder, OutputFormat, Pipeline, RunConfig};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter},
    path::PathBuf,
    time::Instant,
};
use tracing::{debug, info, info_span};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter, project and summarize line protocol records.
///
/// Arguments are filter terms (`key=value`, `key=` or `key~prefix`) followed by the columns
/// to output. Without columns a summary of the values seen per tag is printed instead.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Comma separated output
    #[arg(long, conflicts_with = "tsv")]
    csv: bool,

    /// Tab separated output
    #[arg(long)]
    tsv: bool,

    /// Only consider records of this measurement
    #[arg(short = 'm', long = "measurement", value_name = "NAME")]
    measurement: Option<String>,

    /// Matching rows to skip before output starts
    #[arg(long)]
    skip: Option<u64>,

    /// Maximum number of rows to output
    #[arg(long = "lim", value_name = "N")]
    limit: Option<u64>,

    /// Read records from a file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Load a saved query; command line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Decode on a separate thread
    #[arg(long)]
    staged: bool,

    /// Log level for lpscan, overrides RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Filter terms, then column names
    #[arg(value_name = "TERM|COLUMN")]
    args: Vec<String>,
}

fn setup_logging(level: Option<&str>) -> Result<()> {
    let directive = format!("lpscan={}", level.unwrap_or("info"));
    let filter = match (level, EnvFilter::try_from_default_env()) {
        (None, Ok(env)) => env,
        (_, env) => env
            .unwrap_or_default()
            .add_directive(directive.parse().context("invalid log level")?),
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .try_init();
    Ok(())
}

/// Builds the run configuration from an optional saved query and the command line.
fn build_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if cli.csv {
        config.format = OutputFormat::Csv;
    } else if cli.tsv {
        config.format = OutputFormat::Tsv;
    }
    if let Some(m) = &cli.measurement {
        config.measurement = Some(m.clone());
    }
    if let Some(skip) = cli.skip {
        config.skip = skip;
    }
    if let Some(limit) = cli.limit {
        config.limit = Some(limit);
    }

    let (filters, columns) = parse_arguments(&cli.args)?;
    if !filters.is_empty() {
        config.filters = filters;
    }
    if !columns.is_empty() {
        config.columns = columns;
    }
    Ok(config)
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn BufRead + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref())?;

    let config = build_config(&cli)?;
    debug!(?config, "Run configuration");
    let pipeline = Pipeline::new(config)?;

    let _span = info_span!("lpscan", mode = ?pipeline.mode()).entered();
    let start = Instant::now();
    let mut source = LineProtocolDecoder::new(open_input(cli.input.as_ref())?);
    let out = BufWriter::new(io::stdout().lock());
    let stats = if cli.staged {
        pipeline.run_staged(&mut source, out)?
    } else {
        pipeline.run(&mut source, out)?
    };
    info!("wrote {} records in {:?}", stats.emitted, start.elapsed());
    Ok(())
}
