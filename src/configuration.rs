use std::{
    convert::TryFrom,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30000;
pub const DEFAULT_BASE_DIFF_RATIO: f64 = 0.30;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_DEDUP_MEMORY_LIMIT: usize = 2048;
const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;

lazy_static::lazy_static! {
    static ref CONFIGURATION: Result<Configuration, anyhow::Error> =
        PartialConfiguration::get().and_then(Configuration::try_from);
}

/// Request-mutation audit engine that finds unhandled errors and phishing vectors in
/// web applications.
#[derive(Parser)]
#[command(about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// The list of supported subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the version and exit
    Version,
    /// Audit a set of baseline requests
    Scan {
        /// The path to a configuration file. If present, the configuration file is used
        /// to configure the scan. Arguments given on the command line take precedence
        /// over the configuration file.
        #[arg(long, value_parser, value_name = "CONFIG_FILE.YAML")]
        config: Option<PathBuf>,

        /// A YAML file with baseline requests, or a directory containing such files.
        #[arg(value_parser, value_name = "REQUESTS")]
        requests: Option<PathBuf>,

        /// Send every request to this server instead of the one in its URL. Paths and
        /// query strings are kept.
        #[arg(value_parser=verify_url, long)]
        target: Option<Url>,

        /// Per-request time-out in milliseconds. Defaults to DEFAULT_REQUEST_TIMEOUT milliseconds.
        #[arg(value_parser, long)]
        request_timeout: Option<u64>,

        /// Base tolerance, between 0 and 1, of the comparison of error responses with
        /// normal responses. Higher values report fewer, more certain, unhandled errors.
        #[arg(value_parser, long)]
        base_diff_ratio: Option<f64>,

        /// Maximum number of probes in flight at once.
        #[arg(value_parser, long)]
        concurrency: Option<NonZeroUsize>,

        /// Number of potential findings kept in memory before spilling to disk.
        #[arg(value_parser, long)]
        dedup_memory_limit: Option<usize>,

        /// If present, write a database with all probes, responses and findings
        /// to reports/trace/report.db
        #[arg(long, value_parser(clap::value_parser!(bool)), num_args(0..=1), require_equals = true, default_missing_value("true"), ignore_case = true)]
        report: Option<bool>,

        /// Output to stdout can be formatted in human readable format or json.
        #[arg(value_parser, long, value_enum, required = false, ignore_case = true)]
        output_format: Option<OutputFormat>,

        /// Custom (static) headers that should be added to each request. These headers
        /// are never mutated.
        #[arg(long, value_parser, value_name = "STATIC_HEADERS.YAML")]
        header: Option<PathBuf>,

        // Manually added possible values below, since automatically showing possible values of an external (remote) enum
        // such as log::LevelFilter is not well supported.
        // See https://github.com/serde-rs/serde/issues/1301, https://github.com/serde-rs/serde/issues/723
        /// Log level to output. This flag takes precedence over the environment variable. [possible values: off, error, warn, debug, info, trace]
        #[arg(value_parser = clap::value_parser!(log::LevelFilter), long, value_enum, env = "LOG_LEVEL", ignore_case = true)]
        log_level: Option<log::LevelFilter>,
    },
}

impl Commands {
    fn config_filename(&self) -> Option<&PathBuf> {
        match self {
            Commands::Scan { config, .. } => config.as_ref(),
            Commands::Version => None,
        }
    }

    fn scan_config(self) -> Result<PartialConfiguration, anyhow::Error> {
        match self {
            Commands::Scan {
                requests,
                target,
                request_timeout,
                base_diff_ratio,
                concurrency,
                dedup_memory_limit,
                report,
                output_format,
                header,
                log_level,
                ..
            } => Ok(PartialConfiguration {
                requests,
                target,
                request_timeout,
                base_diff_ratio,
                concurrency,
                dedup_memory_limit,
                report,
                output_format,
                header,
                log_level,
            }),
            Commands::Version => Err(anyhow::anyhow!(
                "Tried to generate a configuration for an unsupported command"
            )),
        }
    }
}

/// PartialConfiguration is a representation of a scan configuration, obtained from the
/// CLI or from a configuration file.
///
/// Partial configurations are only one source, e.g. config file or command line.
/// You can't make any field mandatory, since then they all need to be specified in both places,
/// which is counterproductive. The Configuration is combined from the two Partials
/// and does have mandatory fields. Therefore creating a Configuration from a PartialConfiguration
/// using TryFrom can fail.
#[derive(Debug, Default, PartialEq, Deserialize)]
struct PartialConfiguration {
    pub requests: Option<PathBuf>,
    pub target: Option<Url>,
    pub request_timeout: Option<u64>,
    pub base_diff_ratio: Option<f64>,
    pub concurrency: Option<NonZeroUsize>,
    pub dedup_memory_limit: Option<usize>,
    pub report: Option<bool>,
    pub output_format: Option<OutputFormat>,
    pub header: Option<PathBuf>,
    pub log_level: Option<log::LevelFilter>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Deserialize)]
pub enum OutputFormat {
    #[serde(alias = "json")]
    Json,
    #[serde(
        alias = "human-readable",
        alias = "human_readable",
        alias = "humanreadable"
    )]
    HumanReadable,
}

/// The main configuration object.
#[derive(Debug, PartialEq)]
pub struct Configuration {
    /// A YAML file with baseline requests, or a directory containing such files.
    pub requests: PathBuf,

    /// Send every request to this server instead of the one in its URL.
    pub target: Option<Url>,

    /// Per-request time-out in milliseconds. Defaults to DEFAULT_REQUEST_TIMEOUT miliseconds.
    pub request_timeout: u64,

    /// Base tolerance of the unhandled-error comparison, in [0, 1].
    pub base_diff_ratio: f64,

    /// Maximum number of probes in flight at once.
    pub concurrency: NonZeroUsize,

    /// Number of potential findings kept in memory before spilling to disk.
    pub dedup_memory_limit: usize,

    /// If present, write a trace database of the scan.
    pub report: bool,

    /// Output to stdout can be formatted in human readable format or json.
    pub output_format: OutputFormat,

    /// Custom (static) headers that should be added to each request. These headers
    /// are never mutated.
    pub header: Option<PathBuf>,

    /// Log level to output. This flag takes precedence over the environment variable.
    pub log_level: log::LevelFilter,
}

impl Configuration {
    /// Attempts to gather configuration from all sources. If certain required
    /// parameters are missing, the `Err` variant specifies what is missing.
    pub fn get() -> Result<&'static Self, &'static anyhow::Error> {
        CONFIGURATION.as_ref()
    }
}

impl TryFrom<PartialConfiguration> for Configuration {
    type Error = anyhow::Error;

    fn try_from(value: PartialConfiguration) -> Result<Self, Self::Error> {
        let Some(requests) = value.requests else {
            bail!("No request file or directory given");
        };

        let base_diff_ratio = value.base_diff_ratio.unwrap_or(DEFAULT_BASE_DIFF_RATIO);
        if !(0.0..=1.0).contains(&base_diff_ratio) {
            bail!("The base_diff_ratio must lie between 0 and 1, got {base_diff_ratio}");
        }

        if let Some(target) = &value.target {
            verify_url(target.as_str())?;
        }

        Ok(Self {
            requests,
            target: value.target,
            request_timeout: value.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            base_diff_ratio,
            concurrency: value
                .concurrency
                .or(NonZeroUsize::new(DEFAULT_CONCURRENCY))
                .unwrap_or(NonZeroUsize::MIN),
            dedup_memory_limit: value
                .dedup_memory_limit
                .unwrap_or(DEFAULT_DEDUP_MEMORY_LIMIT),
            report: value.report.unwrap_or(false),
            output_format: value.output_format.unwrap_or(OutputFormat::HumanReadable),
            header: value.header,
            log_level: value.log_level.unwrap_or(DEFAULT_LOG_LEVEL),
        })
    }
}

impl PartialConfiguration {
    /// Dynamically loads configuration from the command line arguments
    /// and from any file given as `--config <NAME>`.
    /// The values from the cli are preferred if given.
    pub fn get() -> Result<Self, anyhow::Error> {
        // Parse command line arguments
        let cli_config = Cli::parse();
        // Load any configuration file
        let mut file_config = match cli_config.command.config_filename() {
            Some(filename) => PartialConfiguration::from_yaml_file(filename)?,
            None => return cli_config.command.scan_config(),
        };

        // Prefer cli values if present
        file_config.overwrite_from(cli_config.command.scan_config()?);
        Ok(file_config)
    }

    /// Loads a Configuration from a yaml file
    fn from_yaml_file(filename: &Path) -> Result<Self, anyhow::Error> {
        let file = std::fs::File::open(filename)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Overwrites `self` with the options given in other. If `other` contains
    /// None for a certain field, leaves the value from `self` in place.
    fn overwrite_from(&mut self, other: PartialConfiguration) {
        *self = PartialConfiguration {
            requests: other.requests.or(self.requests.take()),
            target: other.target.or(self.target.take()),
            request_timeout: other.request_timeout.or(self.request_timeout.take()),
            base_diff_ratio: other.base_diff_ratio.or(self.base_diff_ratio.take()),
            concurrency: other.concurrency.or(self.concurrency.take()),
            dedup_memory_limit: other
                .dedup_memory_limit
                .or(self.dedup_memory_limit.take()),
            report: other.report.or(self.report.take()),
            output_format: other.output_format.or(self.output_format.take()),
            header: other.header.or(self.header.take()),
            log_level: other.log_level.or_else(|| self.log_level.take()),
        };
    }
}

fn verify_url(arg: &str) -> anyhow::Result<Url> {
    let url = url::Url::parse(arg)?;
    if !url.scheme().starts_with("http") {
        bail!("The given URL does not start with a scheme (http(s)://)")
    }
    if url.host().is_none() {
        bail!("The given URL does not seem to contain a hostname")
    }
    Ok(url)
}
