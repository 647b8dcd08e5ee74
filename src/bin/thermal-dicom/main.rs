mod args;
mod proc;

use anyhow::Result;
use thermal_dicom::cli::{init_tracing, process_paths_par};
use tracing::{error, info};

use crate::{args::Args, proc::Pipeline};

fn main() -> Result<()> {
    init_tracing();
    let args = Args::from_cmd_line()?;
    let pipeline = Pipeline::from_args(&args)?;
    std::fs::create_dir_all(&args.output)?;

    use rayon::prelude::*;
    let (converted, failed) = process_paths_par(args.paths)
        .into_par_iter()
        .map(|input| -> Result<_> { pipeline.process(&input?) })
        .fold(
            || (0usize, 0usize),
            |(ok, failed), res| match res {
                Ok(_) => (ok + 1, failed),
                Err(e) => {
                    error!("{:#}", e);
                    (ok, failed + 1)
                }
            },
        )
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    info!(converted, failed, "done");
    if failed > 0 {
        anyhow::bail!("{} image(s) could not be converted", failed);
    }
    Ok(())
}
