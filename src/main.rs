use std::path;
use std::process;

use clap::ArgEnum;
use env_logger;
use log;

use tape_sort::{ExternalSorter, ExternalSorterBuilder, TapeDevice, TapeDeviceConfig, TapeMode};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let input = path::Path::new(arg_parser.value_of("input").expect("value is required"));
    if !input.is_file() {
        log::error!("input tape {} does not exist", input.display());
        process::exit(1);
    }

    let output = path::Path::new(arg_parser.value_of("output").expect("value is required"));
    let output_dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => path::Path::new("."),
    };
    if !output_dir.is_dir() {
        log::error!("output directory {} does not exist", output_dir.display());
        process::exit(1);
    }

    let config_path = path::Path::new(arg_parser.value_of("config").expect("value has default"));
    let config = match TapeDeviceConfig::from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("device configuration loading error: {}", err);
            process::exit(1);
        }
    };
    log::info!("device configuration ({}):\n{}", config_path.display(), config);

    let mut device = match TapeDevice::new(input, TapeMode::ReadWrite, config) {
        Ok(device) => device,
        Err(err) => {
            log::error!("tape device initialization error: {}", err);
            process::exit(1);
        }
    };

    let mut sorter_builder = ExternalSorterBuilder::new().with_input(input).with_output(output);
    if let Some(tmp_dir) = arg_parser.value_of("tmp_dir") {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let mut sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = sorter.sort(&mut device) {
        log::error!("tape sorting error: {}", err);
        process::exit(1);
    }

    log::info!(
        "{} values sorted into {} ({} runs)",
        sorter.total_values(),
        output.display(),
        sorter.run_lengths().len()
    );
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("tape-sort")
        .about("tape device external sorter")
        .arg(
            clap::Arg::new("input")
                .help("tape to be sorted")
                .required(true)
                .takes_value(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("output")
                .help("tape to write sorted values to")
                .required(true)
                .takes_value(true)
                .index(2),
        )
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .help("tape device configuration file")
                .takes_value(true)
                .default_value("config/device_config.txt"),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary tapes (output directory by default)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
