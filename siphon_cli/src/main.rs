mod prompt;

use siphon_core::config::{SiphonConfig, Strategy};
use siphon_core::extractor::ExtractionReport;
use siphon_core::oracle::{LocalOracle, Oracle};
use siphon_core::progress::ProgressSink;

use anyhow::Context;
use clap::Parser;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_FILE: &str = "siphon.toml";
const SIMULATED_URL: &str = "http://simulated.invalid/";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Prompt for the target parameters on stdin.
    #[clap(short, long)]
    interactive: bool,
    #[clap(long)]
    url: Option<String>,
    #[clap(short, long)]
    username: Option<String>,
    #[clap(long)]
    next_action: Option<String>,
    #[clap(long)]
    success_code: Option<u16>,
    /// `sequential` scans candidates in order, `concurrent` fans them all out.
    #[clap(long, value_name = "STRATEGY", conflicts_with = "concurrent")]
    strategy: Option<Strategy>,
    /// Shorthand for `--strategy concurrent`.
    #[clap(long)]
    concurrent: bool,
    #[clap(long)]
    delay_ms: Option<u64>,
    #[clap(long)]
    timeout_ms: Option<u64>,
    #[clap(long)]
    charset: Option<String>,
    #[clap(long)]
    no_prune: bool,
    #[clap(long)]
    max_length: Option<usize>,
    /// Accept invalid TLS certificates.
    #[clap(long)]
    insecure: bool,
    /// Run against an in-process oracle holding SECRET instead of a target.
    #[clap(long, value_name = "SECRET")]
    simulate: Option<String>,
    /// Print the final report as JSON. Status lines move to stderr.
    #[clap(long)]
    json: bool,
    #[clap(short, long)]
    verbose: bool,
    #[clap(short, long)]
    quiet: bool,
    #[clap(long)]
    log_level: Option<String>,
}

/// Prints every confirmed prefix, the way an operator watching the run
/// expects to see it.
struct StatusProgress<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> StatusProgress<W> {
    fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> ProgressSink for StatusProgress<W> {
    fn on_prefix(&self, prefix: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        // A closed stream must not abort the extraction.
        let _ = writeln!(out, "Current prefix: {prefix}");
        let _ = out.flush();
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(&cli);
    debug!("Arguments: {cli:?}");

    let mut config = load_config(cli.config_file.as_ref())?;
    apply_overrides(&mut config, &cli);

    if cli.interactive {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        if cli.json {
            prompt::prompt_target(&mut input, &mut std::io::stderr(), &mut config)?;
        } else {
            prompt::prompt_target(&mut input, &mut std::io::stdout(), &mut config)?;
        }
    }
    debug!("Effective configuration: {config:#?}");

    execute(&cli, &mut config, &mut std::io::stdout(), &mut std::io::stderr()).await
}

/// Runs the extraction and prints the report to `stdout`. Status lines share
/// `stdout` with the report unless `--json` is set, in which case they go to
/// `stderr` and `stdout` carries the JSON document alone.
async fn execute<O: Write + Send, E: Write + Send>(
    cli: &Cli,
    config: &mut SiphonConfig,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<(), anyhow::Error> {
    let simulate = cli.simulate.as_deref();
    let report = if cli.json {
        extract(config, simulate, &mut *stderr).await?
    } else {
        extract(config, simulate, &mut *stdout).await?
    };
    print_report(stdout, &report, cli.json)
}

async fn extract<S: Write + Send>(
    config: &mut SiphonConfig,
    simulate: Option<&str>,
    mut status: S,
) -> Result<ExtractionReport, anyhow::Error> {
    writeln!(status, "Initial charset: {}", config.alphabet())?;
    let progress = StatusProgress::new(status);

    let report = match simulate {
        Some(secret) => {
            // Any well-formed target satisfies validation; nothing is sent.
            if config.target.url.is_empty() {
                config.target.url = SIMULATED_URL.to_string();
            }
            if config.target.username.is_empty() {
                config.target.username = "simulated".to_string();
            }
            config.validate()?;
            let oracle: Arc<dyn Oracle> = Arc::new(
                LocalOracle::new(secret, config.extraction.wildcard)
                    .with_latency(Duration::from_millis(config.extraction.delay_ms)),
            );
            info!("simulating extraction against an in-process oracle");
            siphon_core::run_with_oracle(config, oracle, &progress).await
        }
        None => siphon_core::run(config, &progress).await,
    }
    .context("extraction failed")?;
    Ok(report)
}

fn load_config(path: Option<&PathBuf>) -> Result<SiphonConfig, anyhow::Error> {
    let config = match path {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            SiphonConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                SiphonConfig::load_from_file(&default_config_path)?
            } else {
                debug!("No config file found, using built-in defaults");
                SiphonConfig::default()
            }
        }
    };
    Ok(config)
}

fn apply_overrides(config: &mut SiphonConfig, cli: &Cli) {
    if let Some(url) = &cli.url {
        config.target.url = url.clone();
    }
    if let Some(username) = &cli.username {
        config.target.username = username.clone();
    }
    if let Some(next_action) = &cli.next_action {
        config.target.next_action = Some(next_action.clone());
    }
    if let Some(code) = cli.success_code {
        config.target.success_code = code;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.target.timeout_ms = timeout_ms;
    }
    if cli.insecure {
        config.target.insecure = true;
    }
    if let Some(strategy) = cli.strategy {
        config.extraction.strategy = strategy;
    } else if cli.concurrent {
        config.extraction.strategy = Strategy::Concurrent;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.extraction.delay_ms = delay_ms;
    }
    if let Some(charset) = &cli.charset {
        config.extraction.charset = Some(charset.clone());
    }
    if cli.no_prune {
        config.extraction.prune = false;
    }
    if cli.max_length.is_some() {
        config.extraction.max_length = cli.max_length;
    }
}

fn print_report<W: Write>(
    out: &mut W,
    report: &ExtractionReport,
    json: bool,
) -> Result<(), anyhow::Error> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
        return Ok(());
    }
    writeln!(out, "Pruned charset: {}", report.pruned_charset)?;
    writeln!(out, "Found secret: {}", report.secret)?;
    writeln!(
        out,
        "{} queries ({}) in {:.2?}",
        report.queries,
        report.strategy,
        Duration::from_millis(report.elapsed_ms)
    )?;
    Ok(())
}

fn init_logging(cli: &Cli) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &cli.log_level {
            parse_level(level_str)
        } else if cli.verbose {
            Level::DEBUG
        } else if cli.quiet {
            Level::ERROR
        } else {
            let level_str = env::var("SIPHON_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
            parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            for directive in [
                format!("siphon_core={level}"),
                format!("siphon={level}"),
                "hyper=warn".to_string(),
                "reqwest=warn".to_string(),
            ] {
                if let Ok(directive) = directive.parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{level_str}', defaulting to WARN. Valid levels: trace, debug, info, warn, error"
            );
            Level::WARN
        }
    }
}
