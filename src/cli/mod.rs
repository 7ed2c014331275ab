/*
 * SPDX-FileCopyrightText: 2025 Inria
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Command-line interface structs, functions, and methods.
//!
//! Each command is a submodule with a `CliArgs` struct and a `main` function.

use std::io::Write;
use std::time::{Instant, SystemTime};

use anyhow::{anyhow, ensure, Result};
use clap::{Args, Parser, Subcommand};
use jiff::fmt::friendly::{Designator, Spacing, SpanPrinter};

pub mod bench;
pub mod estimate;

/// Parses a number of threads, which must be positive.
pub fn num_threads_parser(arg: &str) -> Result<usize> {
    let num_threads = arg.parse::<usize>()?;
    ensure!(num_threads > 0, "Number of threads must be greater than 0");
    Ok(num_threads)
}

/// Parses a number of bytes, possibly followed by one of the SI or NIST
/// multipliers k, M, G, T, P, ki, Mi, Gi, Ti, and Pi, and optionally by `B`.
///
/// ```
/// use pagedgraph::cli::bytes_parser;
///
/// assert_eq!(bytes_parser("100").unwrap(), 100);
/// assert_eq!(bytes_parser("2KiB").unwrap(), 2048);
/// assert_eq!(bytes_parser("1.5G").unwrap(), 1_500_000_000);
/// assert!(bytes_parser("3X").is_err());
/// ```
pub fn bytes_parser(arg: &str) -> Result<u64> {
    const PREF_SYMS: [(&str, u64); 11] = [
        ("", 1),
        ("ki", 1 << 10),
        ("mi", 1 << 20),
        ("gi", 1 << 30),
        ("ti", 1 << 40),
        ("pi", 1 << 50),
        ("k", 1E3 as u64),
        ("m", 1E6 as u64),
        ("g", 1E9 as u64),
        ("t", 1E12 as u64),
        ("p", 1E15 as u64),
    ];
    let arg = arg.trim().to_ascii_lowercase();
    ensure!(!arg.is_empty(), "empty string");

    let num_digits = arg
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .count();

    let number = arg[..num_digits].parse::<f64>()?;
    let suffix = arg[num_digits..].trim();
    let prefix = suffix.strip_suffix('b').unwrap_or(suffix);
    let multiplier = PREF_SYMS
        .iter()
        .find(|(x, _)| *x == prefix)
        .map(|(_, m)| m)
        .ok_or(anyhow!("invalid prefix symbol {}", suffix))?;

    Ok((number * (*multiplier as f64)) as u64)
}

/// Shared CLI arguments for commands that specify a number of threads.
#[derive(Args, Debug)]
pub struct NumThreadsArg {
    #[arg(short = 'j', long, default_value_t = rayon::current_num_threads().max(1), value_parser = num_threads_parser)]
    /// The number of threads to use.
    pub num_threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    Estimate(estimate::CliArgs),
    Bench(bench::CliArgs),
}

#[derive(Parser, Debug)]
#[command(name = "pagedgraph", version)]
/// Tools to estimate the memory usage of compressed graphs and to benchmark them.
pub struct Cli {
    #[command(subcommand)]
    pub command: SubCommands,
}

/// Initializes an `env_logger` logging at `info` level by default, whose
/// lines start with the wall-clock time and the time elapsed since
/// initialization.
pub fn init_env_logger() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    let start = Instant::now();
    let printer = SpanPrinter::new()
        .spacing(Spacing::None)
        .designator(Designator::Compact);
    builder.format(move |buf, record| {
        let Ok(ts) = jiff::Timestamp::try_from(SystemTime::now()) else {
            return Err(std::io::Error::other("Failed to get timestamp"));
        };
        let elapsed = start.elapsed();
        let span = jiff::Span::new()
            .seconds(elapsed.as_secs() as i64)
            .milliseconds(elapsed.subsec_millis() as i64);
        let style = buf.default_level_style(record.level());
        writeln!(
            buf,
            "{} {} {style}{}{style:#} [{:?}] {} - {}",
            ts.strftime("%F %T%.3f"),
            printer.span_to_string(&span),
            record.level(),
            std::thread::current().id(),
            record.target(),
            record.args()
        )
    });
    builder.try_init()?;
    Ok(())
}

/// The entry point of the command-line interface.
pub fn main<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let start = Instant::now();
    let cli = Cli::parse_from(args);
    match cli.command {
        SubCommands::Estimate(args) => estimate::main(args)?,
        SubCommands::Bench(args) => bench::main(args)?,
    }

    log::info!("The command took {:.3}s", start.elapsed().as_secs_f64());
    Ok(())
}
