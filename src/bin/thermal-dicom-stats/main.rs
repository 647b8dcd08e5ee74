use anyhow::Result;
use serde_derive::*;
use thermal_dicom::{
    arg, args_parser,
    cli::{for_each_path_par, init_tracing},
    opt,
    stats::Stats,
    units::TemperatureUnit,
    ThermalDicomObject,
};
use tracing::error;

struct Args {
    paths: Vec<String>,
    pretty: bool,
}

impl Args {
    fn from_cmd_line() -> Args {
        let matches = args_parser!("thermal-dicom-stats")
            .about("Compute temperature stats of thermal DICOM files.")
            .arg(
                opt!("pretty")
                    .takes_value(false)
                    .help("Pretty-print the json output"),
            )
            .arg(
                arg!("paths")
                    .required(true)
                    .multiple(true)
                    .help("Paths of .dcm files"),
            )
            .get_matches();

        Args {
            paths: matches
                .values_of("paths")
                .unwrap()
                .map(|f| f.into())
                .collect(),
            pretty: matches.is_present("pretty"),
        }
    }
}

#[derive(Serialize, Debug)]
struct ImageStats {
    path: String,
    patient_id: Option<String>,
    sop_instance_uid: String,
    width: usize,
    height: usize,
    unit: TemperatureUnit,
    invalid: usize,
    stats: Stats,
}

impl ImageStats {
    fn from_path(path: &str) -> Result<Self> {
        let object = ThermalDicomObject::open(path)?;
        let field = object.temperature();
        let (height, width) = field.dim();
        Ok(ImageStats {
            path: path.to_string(),
            patient_id: object.metadata().patient().id.clone(),
            sop_instance_uid: object.uids().sop_instance.clone(),
            width,
            height,
            unit: field.unit(),
            invalid: field.invalid_count(),
            stats: field.to_unit(TemperatureUnit::Celsius).statistics(),
        })
    }
}

#[derive(Debug, Serialize)]
struct OutputJson {
    image_stats: Vec<ImageStats>,
    /// °C
    cumulative: Stats,
    failed: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::from_cmd_line();

    let mut output = OutputJson {
        image_stats: vec![],
        cumulative: Stats::default(),
        failed: vec![],
    };
    for (path, res) in for_each_path_par(args.paths, ImageStats::from_path) {
        match res {
            Ok(stats) => {
                output.cumulative += &stats.stats;
                output.image_stats.push(stats);
            }
            Err(e) => {
                error!(%path, "{:#}", e);
                output.failed.push(path);
            }
        }
    }

    let stdout = std::io::stdout();
    if args.pretty {
        serde_json::to_writer_pretty(stdout.lock(), &output)?;
    } else {
        serde_json::to_writer(stdout.lock(), &output)?;
    }
    Ok(())
}
