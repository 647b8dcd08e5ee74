use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use thermal_dicom::{
    bad_pixels::{correct, detect_bad_pixels},
    cli::ThermalInput,
    colormap::Colormap,
    CalibrationParameters, DatasetAssembler, ThermalError, ThermalMetadataRecord,
};
use tracing::{debug, info, warn};

use super::Args;

pub struct Pipeline {
    record: ThermalMetadataRecord,
    assembler: DatasetAssembler,
    distance: Option<f64>,
    bad_pixel_threshold: Option<f64>,
    colormap: Colormap,
    preview: bool,
    output: PathBuf,
}

impl Pipeline {
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = File::open(&args.metadata)
            .with_context(|| format!("could not open {:?}", args.metadata))?;
        let record = ThermalMetadataRecord::from_json_reader(std::io::BufReader::new(file))
            .with_context(|| format!("invalid metadata in {:?}", args.metadata))?;

        let mut assembler = DatasetAssembler::new();
        if let Some(root) = &args.uid_root {
            assembler = assembler.with_uid_root(root)?;
        }

        Ok(Pipeline {
            record,
            assembler,
            distance: args.distance,
            bad_pixel_threshold: args.bad_pixel_threshold,
            colormap: args.colormap,
            preview: args.preview,
            output: args.output.clone(),
        })
    }

    /// Scene parameters from the study metadata. Values the
    /// metadata leaves out come from what the camera recorded.
    fn scene(&self, input: &ThermalInput) -> Result<CalibrationParameters> {
        let thermal = self.record.thermal();
        let mut params = match thermal.calibration_parameters() {
            Ok(params) => params,
            Err(ThermalError::IncompleteMetadata { missing }) => {
                debug!(
                    source = %input.entry.source_file,
                    ?missing,
                    "taking scene parameters from the camera"
                );
                thermal.calibration_parameters_or(&input.entry.calibration_parameters()?)?
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(distance) = self.distance {
            params.distance_from_camera = distance;
            params.validate()?;
        }
        Ok(params)
    }

    fn output_stem_for(&self, input: &ThermalInput) -> Result<PathBuf> {
        let stem = Path::new(&input.entry.source_file)
            .file_stem()
            .ok_or_else(|| anyhow!("{}: no file name", input.entry.source_file))?;
        Ok(self.output.join(stem))
    }

    pub fn process(&self, input: &ThermalInput) -> Result<PathBuf> {
        let params = self.scene(input)?;
        let mut field = input.entry.calibrate_with(&params)?;

        let mut record = self.record.clone();
        let mut qc = record.quality_control().clone();
        if let Some(threshold) = self.bad_pixel_threshold {
            let bad = detect_bad_pixels(&field, threshold)?;
            let correction = correct(&field, &bad)?;
            correction.record_into(&mut qc);
            if !correction.unrecoverable.is_empty() {
                warn!(
                    source = %input.entry.source_file,
                    count = correction.unrecoverable.len(),
                    "left bad pixels uncorrected"
                );
            }
            field = correction.field;
        }
        record.set_quality_control(qc)?;

        record.set_calibration_parameters(&params)?;
        let mut thermal = record.thermal().clone();
        if thermal.camera_model.is_none() {
            thermal.camera_model = input.entry.camera_model.clone();
            record.set_thermal_parameters(thermal)?;
        }

        let mut equipment = record.equipment().clone();
        let camera = input.entry.equipment();
        equipment.manufacturer = equipment.manufacturer.or(camera.manufacturer);
        equipment.model = equipment.model.or(camera.model);
        equipment.serial_number = equipment.serial_number.or(camera.serial_number);
        record.set_equipment(equipment)?;

        let display = self.colormap.render(&field, None)?;
        let stem = self.output_stem_for(input)?;
        if self.preview {
            write_png(&display, &stem.with_extension("png"))?;
        }

        let object = self.assembler.assemble(field, Some(display), record)?;
        let out_path = stem.with_extension("dcm");
        object.save(&out_path)?;
        info!(source = %input.entry.source_file, output = ?out_path, "converted");
        Ok(out_path)
    }
}

fn write_png(image: &RgbImage, path: &Path) -> Result<()> {
    let image_writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(image_writer, image.width(), image.height());
    encoder.set_color(png::ColorType::RGB);
    encoder.set_depth(png::BitDepth::Eight);
    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(image.as_raw())?;
    Ok(())
}
