#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{command, value_parser, Arg, ArgAction, ArgMatches};
use indicatif::ProgressBar;

use warcio::Limits;
use warcscan::index::RecordIndex;
use warcscan::parsers::{RobotsSitemapParser, UrlListParser};
use warcscan::process::{PayloadParser, ProcessConfig, Processor};
use warcscan::{ArchiveScanner, ScanConfig};

const INDEX_HELP: &str = "Index all input files first, then process responses by URL. \
Index documents (such as robots.txt listing sitemaps) are followed one level deep.";

fn args() -> ArgMatches {
    command!()
        .arg(
            Arg::new("files")
                .required(true)
                .multiple_values(true)
                .value_parser(value_parser!(PathBuf))
                .help("WARC files to read, optionally gzip-compressed"),
        )
        .arg(
            Arg::new("index")
                .long("index")
                .action(ArgAction::SetTrue)
                .help(INDEX_HELP),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .takes_value(true)
                .help("Only process the response for this URL"),
        )
        .arg(
            Arg::new("parser")
                .long("parser")
                .takes_value(true)
                .value_parser(["url-list", "robots-sitemaps"])
                .default_value("robots-sitemaps")
                .help("How to interpret response payloads"),
        )
        .arg(
            Arg::new("max_payload_size")
                .long("max-payload-size")
                .takes_value(true)
                .value_parser(value_parser!(u64))
                .default_value("134217728")
                .help("Largest payload to read, in bytes"),
        )
        .arg(
            Arg::new("segment_size")
                .long("segment-size")
                .takes_value(true)
                .value_parser(value_parser!(usize))
                .default_value("8192")
                .help("Size of buffers used to accumulate payloads of unknown length"),
        )
        .arg(
            Arg::new("progress_interval")
                .long("progress-interval")
                .takes_value(true)
                .value_parser(value_parser!(u64))
                .default_value("1000")
                .help("Log progress every this many records; 0 to disable"),
        )
        .arg(
            Arg::new("slow_threshold_ms")
                .long("slow-threshold-ms")
                .takes_value(true)
                .value_parser(value_parser!(u64))
                .default_value("300")
                .help("Log parses that take longer than this many milliseconds"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Show a progress bar for each file"),
        )
        .get_matches()
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(log::LevelFilter::Info),
    };
    builder.init();
}

fn flag(matches: &ArgMatches, id: &str) -> bool {
    matches.get_one::<bool>(id).copied().unwrap_or(false)
}

fn number<T: Copy + Send + Sync + 'static>(matches: &ArgMatches, id: &str, default: T) -> T {
    matches.get_one::<T>(id).copied().unwrap_or(default)
}

fn main() {
    init_logging();
    let matches = args();
    let started = Instant::now();

    let defaults = Limits::default();
    let limits = Limits {
        max_payload_size: number(&matches, "max_payload_size", defaults.max_payload_size),
        segment_size: number(&matches, "segment_size", defaults.segment_size).max(1),
        ..defaults
    };
    let mut scanner = ArchiveScanner::new(ScanConfig {
        limits,
        progress_interval: number(&matches, "progress_interval", 1000),
    });
    if flag(&matches, "progress") {
        scanner = scanner.with_progress_bar(ProgressBar::new(0));
    }

    let config = ProcessConfig {
        slow_threshold: Duration::from_millis(number(&matches, "slow_threshold_ms", 300)),
        url_filter: matches.get_one::<String>("url").cloned(),
        ..Default::default()
    };
    let parser: Box<dyn PayloadParser> =
        match matches.get_one::<String>("parser").map(String::as_str) {
            Some("url-list") => Box::new(UrlListParser),
            _ => Box::new(RobotsSitemapParser),
        };
    let mut processor = Processor::new(parser, config, limits);

    let files: Vec<PathBuf> = matches
        .get_many::<PathBuf>("files")
        .map(|files| files.cloned().collect())
        .unwrap_or_default();
    let mut failed_files = 0;

    if flag(&matches, "index") {
        let mut index = RecordIndex::new();
        for path in &files {
            if let Err(e) = index.index_file(&scanner, path) {
                error!("{}", e);
                failed_files += 1;
            }
        }
        info!("Indexed {} URLs from {} files", index.len(), index.files().len());
        processor.process_index(&index);
    } else {
        for path in &files {
            if let Err(e) = processor.process_file(&scanner, path) {
                error!("{}", e);
                failed_files += 1;
            }
        }
    }

    processor.counter().log_summary(started.elapsed());
    if failed_files > 0 {
        error!("{} of {} files could not be read completely", failed_files, files.len());
        std::process::exit(1);
    }
}
