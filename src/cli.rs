//! Helpers to parse CLI arguments in the accompanying
//! binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{fs::File, io::BufReader, io::Read};

use anyhow::{Context, Result};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use rayon::iter::{once, Either, IntoParallelIterator, ParallelIterator};
use tracing_subscriber::EnvFilter;

use crate::exiftool::ExiftoolEntry;

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

/// One image entry, with the JSON file it came from.
pub struct ThermalInput {
    pub path: String,
    pub entry: ExiftoolEntry,
}

fn read_exiftool_json<R: Read>(path: &str, rdr: R) -> Result<Vec<ThermalInput>> {
    let entries: Vec<ExiftoolEntry> = serde_json::from_reader(rdr)
        .with_context(|| format!("{}: not an `exiftool -b -j` array", path))?;
    Ok(entries
        .into_iter()
        .map(|entry| ThermalInput {
            path: path.to_string(),
            entry,
        })
        .collect())
}

/// Every image entry of the given ExifTool JSON files, in
/// parallel, with a progress bar over images.
pub fn process_paths_par(
    paths: Vec<String>,
) -> impl IntoParallelIterator<Item = Result<ThermalInput>> {
    let bar = progress_bar(paths.len());
    let bar_dup = bar.clone();

    paths
        .into_par_iter()
        .map(move |p| {
            let inputs = File::open(&p)
                .with_context(|| format!("{}: could not open", p))
                .and_then(|f| read_exiftool_json(&p, BufReader::new(f)));
            match inputs {
                Ok(inputs) => {
                    if inputs.len() > 1 {
                        bar.inc_length(inputs.len() as u64 - 1);
                    }
                    Either::Left(inputs.into_par_iter().map(Ok::<_, anyhow::Error>))
                }
                Err(e) => Either::Right(once(Err(e))),
            }
        })
        .flatten()
        .inspect(move |_| bar_dup.inc(1))
}

/// Apply `f` to every path in parallel, with a progress bar.
pub fn for_each_path_par<T, F>(paths: Vec<String>, f: F) -> Vec<(String, Result<T>)>
where
    T: Send,
    F: Fn(&str) -> Result<T> + Sync + Send,
{
    let bar = progress_bar(paths.len());
    let results = paths
        .into_par_iter()
        .map(|p| {
            let res = f(&p);
            bar.inc(1);
            (p, res)
        })
        .collect();
    bar.finish_and_clear();
    results
}
