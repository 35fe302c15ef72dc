// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line front end: render fractals into a directory store,
//! look stored ones up by fingerprint, and evict them.

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use failure::format_err;
use itertools::Itertools;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use num::Complex;
use std::str::FromStr;
use std::time::Duration;

use fractal_cache::request::MAX_ITERATIONS;
use fractal_cache::{
    ColorScheme, Config, Coordinator, DirectoryStore, Fingerprint, GenerationRequest,
};

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_number<T: FromStr>(s: &str, err: &str) -> Result<(), String> {
    match T::from_str(s) {
        Ok(_) => Ok(()),
        Err(_) => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const GENERATE: &str = "generate";
const LOOKUP: &str = "lookup";
const EVICT: &str = "evict";

const DIR: &str = "dir";
const VERBOSE: &str = "verbose";
const HASH: &str = "hash";
const SIZE: &str = "size";
const ITERATIONS: &str = "iterations";
const POWER: &str = "power";
const CONSTANT: &str = "constant";
const SCALE: &str = "scale";
const OFFSET: &str = "offset";
const COLOR: &str = "color";
const THREADS: &str = "threads";
const TIMEOUT: &str = "timeout";

const DEFAULT_DIR: &str = "fractals";

fn dir_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name(DIR)
        .long(DIR)
        .short("d")
        .takes_value(true)
        .default_value(DEFAULT_DIR)
        .help("Directory the rendered fractals are kept in")
}

fn verbose_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name(VERBOSE)
        .short("v")
        .multiple(true)
        .help("Log more; repeat for debug output")
}

fn hash_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name(HASH)
        .required(true)
        .index(1)
        .validator(|s| {
            Fingerprint::from_str(&s)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .help("Fingerprint of the fractal, 64 hex digits")
}

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();
    let color_help = format!(
        "Color scheme ({}); anything else means hsl",
        ColorScheme::ALL.iter().map(|s| s.name()).join(", ")
    );

    App::new("fractal")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Escape-time fractal renderer with a fingerprint-addressed cache")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name(GENERATE)
                .about("Render a fractal, or find the one already rendered")
                .arg(dir_arg())
                .arg(verbose_arg())
                .arg(
                    Arg::with_name(SIZE)
                        .long(SIZE)
                        .short("s")
                        .takes_value(true)
                        .default_value("1920x1080")
                        .validator(|s| validate_pair::<u32>(&s, 'x', "Could not parse output image size"))
                        .help("Size of output image"),
                )
                .arg(
                    Arg::with_name(ITERATIONS)
                        .long(ITERATIONS)
                        .short("i")
                        .takes_value(true)
                        .default_value("500")
                        .validator(move |s| {
                            validate_range(
                                &s,
                                1,
                                MAX_ITERATIONS,
                                "Could not parse iteration count",
                                &format!("Iteration count must be between 1 and {}", MAX_ITERATIONS),
                            )
                        })
                        .help("Maximum number of iterations per point"),
                )
                .arg(
                    Arg::with_name(POWER)
                        .long(POWER)
                        .short("p")
                        .takes_value(true)
                        .default_value("2")
                        .validator(|s| validate_number::<f64>(&s, "Could not parse power"))
                        .help("Exponent of the iterated map"),
                )
                .arg(
                    Arg::with_name(CONSTANT)
                        .long(CONSTANT)
                        .short("c")
                        .takes_value(true)
                        .allow_hyphen_values(true)
                        .default_value("0.285,0.01")
                        .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse the constant"))
                        .help("Complex constant added each iteration, as real,imag"),
                )
                .arg(
                    Arg::with_name(SCALE)
                        .long(SCALE)
                        .takes_value(true)
                        .default_value("1")
                        .validator(|s| validate_number::<f64>(&s, "Could not parse scale"))
                        .help("Half-width of the viewport"),
                )
                .arg(
                    Arg::with_name(OFFSET)
                        .long(OFFSET)
                        .takes_value(true)
                        .allow_hyphen_values(true)
                        .default_value("0,0")
                        .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse the offset"))
                        .help("Center of the viewport, as x,y"),
                )
                .arg(
                    Arg::with_name(COLOR)
                        .long(COLOR)
                        .takes_value(true)
                        .default_value("rainbow")
                        .help(&color_help),
                )
                .arg(
                    Arg::with_name(THREADS)
                        .long(THREADS)
                        .short("t")
                        .takes_value(true)
                        .validator(move |s| {
                            validate_range(
                                &s,
                                1,
                                max_threads,
                                "Could not parse thread count",
                                &format!("Thread count must be between 1 and {}", max_threads),
                            )
                        })
                        .help("Number of threads to use in the renderer (default: all cores)"),
                )
                .arg(
                    Arg::with_name(TIMEOUT)
                        .long(TIMEOUT)
                        .takes_value(true)
                        .default_value("120")
                        .validator(|s| validate_number::<u64>(&s, "Could not parse timeout"))
                        .help("Seconds before the render is abandoned; 0 for no limit"),
                ),
        )
        .subcommand(
            SubCommand::with_name(LOOKUP)
                .about("Print the parameters and image path of a stored fractal")
                .arg(dir_arg())
                .arg(verbose_arg())
                .arg(hash_arg()),
        )
        .subcommand(
            SubCommand::with_name(EVICT)
                .about("Delete a stored fractal")
                .arg(dir_arg())
                .arg(verbose_arg())
                .arg(hash_arg()),
        )
        .get_matches()
}

fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, failure::Error> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format_err!("missing --{}", name))?;
    T::from_str(raw).map_err(|_| format_err!("could not parse --{} value {:?}", name, raw))
}

fn pair<T: FromStr>(matches: &ArgMatches, name: &str, separator: char) -> Result<(T, T), failure::Error> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format_err!("missing --{}", name))?;
    parse_pair(raw, separator).ok_or_else(|| format_err!("could not parse --{} value {:?}", name, raw))
}

fn init_logging(verbosity: u64) -> Result<(), failure::Error> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S%.3f)} {l} {t} - {m}{n}")))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| format_err!("bad logging configuration: {}", err))?;
    log4rs::init_config(config).map_err(|err| format_err!("could not install logger: {}", err))?;
    Ok(())
}

fn open(matches: &ArgMatches, config: Config) -> Result<Coordinator<DirectoryStore>, failure::Error> {
    init_logging(matches.occurrences_of(VERBOSE))?;
    let store = DirectoryStore::open(matches.value_of(DIR).unwrap_or(DEFAULT_DIR))?;
    Ok(Coordinator::new(store, config))
}

fn generate(matches: &ArgMatches) -> Result<(), failure::Error> {
    let (width, height) = pair::<u32>(matches, SIZE, 'x')?;
    let (re, im) = pair::<f64>(matches, CONSTANT, ',')?;
    let (offset_x, offset_y) = pair::<f64>(matches, OFFSET, ',')?;
    let request = GenerationRequest {
        width,
        height,
        max_iterations: value(matches, ITERATIONS)?,
        power: value(matches, POWER)?,
        c: Complex::new(re, im),
        scale: value(matches, SCALE)?,
        offset_x,
        offset_y,
        color_scheme: ColorScheme::from_name(matches.value_of(COLOR).unwrap_or("rainbow")),
    };
    let timeout: u64 = value(matches, TIMEOUT)?;
    let threads = match matches.value_of(THREADS) {
        Some(_) => value(matches, THREADS)?,
        None => num_cpus::get(),
    };
    let config = Config {
        render_timeout: if timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(timeout))
        },
        threads,
        ..Config::default()
    };

    let coordinator = open(matches, config)?;
    let artifact = coordinator.get_or_generate(&request, None)?;
    println!(
        "{}\t{}",
        artifact.fingerprint,
        coordinator.store().image_path(&artifact.fingerprint).display()
    );
    Ok(())
}

fn lookup(matches: &ArgMatches) -> Result<(), failure::Error> {
    let fingerprint: Fingerprint = value(matches, HASH)?;
    let coordinator = open(matches, Config::default())?;
    match coordinator.lookup(&fingerprint)? {
        Some(artifact) => {
            println!("{}", artifact.request.canonical_form());
            println!("{}", coordinator.store().image_path(&fingerprint).display());
            Ok(())
        }
        None => Err(format_err!("no fractal stored under {}", fingerprint)),
    }
}

fn evict(matches: &ArgMatches) -> Result<(), failure::Error> {
    let fingerprint: Fingerprint = value(matches, HASH)?;
    let coordinator = open(matches, Config::default())?;
    if coordinator.evict(&fingerprint)? {
        println!("evicted {}", fingerprint);
        Ok(())
    } else {
        Err(format_err!("no fractal stored under {}", fingerprint))
    }
}

fn main() {
    let matches = args();
    let result = match matches.subcommand() {
        (GENERATE, Some(sub)) => generate(sub),
        (LOOKUP, Some(sub)) => lookup(sub),
        (EVICT, Some(sub)) => evict(sub),
        _ => Err(format_err!("no subcommand given")),
    };
    if let Err(e) = result {
        eprintln!("fractal: {}", e);
        std::process::exit(1);
    }
}
