use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::info;

use regrecss::config::{self, Config, DEFAULT_REPORT_NAME, DriverKind};
use regrecss::report::{Summary, console_report, write_html_report};
use regrecss::{Comparison, RegressionError, create_suite, launcher_from_config, test_suite};

/// regrecss - visual regression testing for web pages
#[derive(Parser, Debug)]
#[command(
    name = "regrecss",
    about = "Capture web page snapshots from test scripts and diff them against a stored test suite",
    after_help = "ENVIRONMENT VARIABLES:\n\
        REGRECSS_WEBDRIVER_URL      chromedriver endpoint\n\
        REGRECSS_DRIVER             Browser driver (webdriver or mock)\n\
        REGRECSS_POLL_INTERVAL_MS   Polling interval of await actions (ms)\n\
        REGRECSS_POLL_TIMEOUT       Timeout of await actions (seconds)\n\
        REGRECSS_SCRATCH_DIR        Base directory for captured images\n\
        REGRECSS_REPORT             Path of the HTML report\n\
        RUST_LOG                    Log filter (default: info)"
)]
struct Args {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Browser driver
    #[arg(long, global = true, value_enum)]
    driver: Option<DriverKind>,

    /// WebDriver endpoint URL
    #[arg(long, global = true)]
    webdriver_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scripts and store them with their snapshots as a test suite
    Create {
        /// Test suite archive to write
        archive: PathBuf,

        /// Scripts to run, in order
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },

    /// Replay a test suite and compare fresh snapshots against its baselines
    Test {
        /// Test suite archive to replay
        archive: PathBuf,

        /// HTML report path (default: report.html next to the archive)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print a JSON summary instead of the console report
        #[arg(long)]
        json: bool,

        /// Keep the freshly captured images
        #[arg(long, short = 'k')]
        keep: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = config::get().clone();
    if let Some(kind) = args.driver {
        config.driver.kind = kind;
    }
    if let Some(url) = args.webdriver_url {
        config.driver.webdriver_url = url;
    }

    match run(args.command, &config) {
        Ok(code) => code,
        Err(e) => {
            let _ = report_fatal(&mut io::stderr().lock(), &e);
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands, config: &Config) -> regrecss::Result<ExitCode> {
    let launcher = launcher_from_config(config);

    match command {
        Commands::Create { archive, scripts } => {
            let captures = create_suite(&scripts, &archive, launcher.as_ref(), config)?;
            println!(
                "Created {} with {} script(s) and {} snapshot(s)",
                archive.display(),
                scripts.len(),
                captures.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Test {
            archive,
            report,
            json,
            keep,
        } => {
            let comparisons = test_suite(&archive, launcher.as_ref(), config, keep)?;

            let report_path = report
                .or_else(|| config.output.report_path.clone())
                .unwrap_or_else(|| default_report_path(&archive));
            write_html_report(&report_path, &comparisons)?;
            info!("HTML report written to {}", report_path.display());

            if json {
                println!("{}", Summary::new(&comparisons).to_json()?);
            } else {
                console_report(&mut io::stdout().lock(), &comparisons)?;
            }
            Ok(exit_code(&comparisons))
        }
    }
}

/// Fatal errors are printed once, outside the log stream
fn report_fatal<W: Write>(out: &mut W, err: &RegressionError) -> io::Result<()> {
    writeln!(out, "ERROR: {}", err)
}

fn default_report_path(archive: &Path) -> PathBuf {
    archive
        .parent()
        .map(|dir| dir.join(DEFAULT_REPORT_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_NAME))
}

fn exit_code(comparisons: &[Comparison]) -> ExitCode {
    if comparisons.iter().all(|c| c.passed()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_error_printed_once() {
        let mut out = Vec::new();
        report_fatal(&mut out, &RegressionError::SessionLost).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "ERROR: Browser quit unexpectedly\n");
    }

    #[test]
    fn test_default_report_path_next_to_archive() {
        assert_eq!(
            default_report_path(Path::new("suites/home.tar")),
            PathBuf::from("suites").join(DEFAULT_REPORT_NAME)
        );
    }
}
