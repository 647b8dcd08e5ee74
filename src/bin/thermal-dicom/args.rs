use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermal_dicom::{arg, args_parser, colormap::Colormap, opt};

pub struct Args {
    pub paths: Vec<String>,
    pub metadata: PathBuf,
    pub output: PathBuf,
    pub distance: Option<f64>,
    pub bad_pixel_threshold: Option<f64>,
    pub colormap: Colormap,
    pub preview: bool,
    pub uid_root: Option<String>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-dicom")
            .about("Calibrate radiometric images and encode them as DICOM.")
            .arg(
                opt!("metadata")
                    .short("m")
                    .required(true)
                    .help("Study metadata json (patient, study, series, equipment, ...)"),
            )
            .arg(
                opt!("output")
                    .short("o")
                    .required(true)
                    .help("Output directory for the .dcm files"),
            )
            .arg(
                opt!("distance")
                    .short("d")
                    .help("Object distance in meters (default: from metadata or camera)"),
            )
            .arg(
                opt!("bad pixel threshold")
                    .short("b")
                    .help("Detect and correct bad pixels beyond this many robust sigmas"),
            )
            .arg(
                opt!("colormap")
                    .short("c")
                    .possible_values(&["grayscale", "iron", "rainbow", "hot"])
                    .default_value("iron")
                    .help("Palette of the display image"),
            )
            .arg(
                opt!("preview")
                    .short("p")
                    .takes_value(false)
                    .help("Also write the display image as png"),
            )
            .arg(opt!("uid root").help("Organization root for generated UIDs (default: 2.25)"))
            .arg(
                arg!("paths")
                    .required(true)
                    .multiple(true)
                    .help("Json paths created using `exiftool -b -j`"),
            )
            .get_matches();

        let paths = matches
            .values_of("paths")
            .unwrap()
            .map(|f| f.into())
            .collect();
        let metadata = value_t_or_exit!(matches, "metadata", PathBuf);
        let output = value_t_or_exit!(matches, "output", PathBuf);
        let distance = matches
            .is_present("distance")
            .then(|| value_t_or_exit!(matches.value_of("distance"), f64));
        let bad_pixel_threshold = matches
            .is_present("bad pixel threshold")
            .then(|| value_t_or_exit!(matches.value_of("bad pixel threshold"), f64));
        let colormap = value_t_or_exit!(matches, "colormap", Colormap);
        let preview = matches.is_present("preview");
        let uid_root = matches.value_of("uid root").map(String::from);

        Ok(Args {
            paths,
            metadata,
            output,
            distance,
            bad_pixel_threshold,
            colormap,
            preview,
            uid_root,
        })
    }
}
