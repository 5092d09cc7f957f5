#![deny(unsafe_code)]

//! Command-line front-end: `xxlsort <input> <output>`.
//!
//! The memory budget comes from the `AVAILABLE_MEM` environment variable
//! (decimal bytes with an optional k/M/G suffix, default 8 GiB). Errors are
//! reported on stderr prefixed with the program name; any failure exits
//! non-zero and leaves neither output nor temp files behind.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::info;

use xxlsort_lib::logging::OperationTimer;
use xxlsort_lib::mem::{GIB, KIB, MIB};
use xxlsort_lib::{ExternalSorter, Result, XxlsortError};

/// Environment variable naming the memory budget.
const AVAILABLE_MEM_ENV: &str = "AVAILABLE_MEM";

/// Sort a record file by its 64-byte binary keys.
#[derive(Debug, Parser)]
#[command(name = "xxlsort", version)]
struct Args {
    /// File of records to sort
    input: PathBuf,

    /// Sorted result file
    output: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let argv0 = std::env::args().next().unwrap_or_else(|| "xxlsort".to_string());
            eprintln!("{argv0}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let memory_limit = available_mem_size()?;
    let timer = OperationTimer::new("Sorting");

    let stats = ExternalSorter::new()
        .memory_limit(memory_limit)
        .sort(&args.input, &args.output)?;

    if stats.runs_written > 0 {
        info!(
            "spilled {} run(s), {} MiB; merged in {} pass(es)",
            stats.runs_written,
            stats.run_bytes / MIB as u64,
            stats.merge_passes
        );
    }
    timer.log_completion(stats.records);
    Ok(())
}

/// Reads the arena size from `AVAILABLE_MEM`; unset means 8 GiB.
fn available_mem_size() -> Result<usize> {
    match std::env::var_os(AVAILABLE_MEM_ENV) {
        None => Ok(xxlsort_lib::DEFAULT_MEMORY_LIMIT),
        Some(raw) => {
            let raw = raw.to_string_lossy();
            parse_mem_size(&raw).ok_or_else(|| XxlsortError::InvalidParameter {
                parameter: AVAILABLE_MEM_ENV.to_string(),
                reason: format!("invalid value '{raw}'"),
            })
        }
    }
}

/// Parses a decimal byte count with an optional k/K (KiB), m/M (MiB) or
/// g/G (GiB) suffix. Returns `None` for negative or malformed input.
fn parse_mem_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (number, multiplier) = match s.as_bytes()[s.len() - 1] {
        b'k' | b'K' => (&s[..s.len() - 1], KIB),
        b'm' | b'M' => (&s[..s.len() - 1], MIB),
        b'g' | b'G' => (&s[..s.len() - 1], GIB),
        _ => (s, 1),
    };
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier as f64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1024", 1024)]
    #[case("64k", 64 * KIB)]
    #[case("64K", 64 * KIB)]
    #[case("512M", 512 * MIB)]
    #[case("8G", 8 * GIB)]
    #[case("1.5g", (1.5 * GIB as f64) as usize)]
    #[case("0", 0)]
    fn test_parse_mem_size_valid(#[case] input: &str, #[case] expected: usize) {
        assert_eq!(parse_mem_size(input), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("-1G")]
    #[case("1Q")]
    #[case("12x34M")]
    #[case("nan")]
    fn test_parse_mem_size_invalid(#[case] input: &str) {
        assert_eq!(parse_mem_size(input), None);
    }
}
