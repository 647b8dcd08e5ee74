use std::path::PathBuf;
use std::{env, fs::File, io::BufReader};

use anyhow::Result;
use criterion::*;
use glob::{glob_with, MatchOptions};
use ndarray::Array2;
use thermal_dicom::{
    bad_pixels::{correct, detect_bad_pixels},
    calibrate, calibrate_counts,
    exiftool::ExiftoolEntry,
    CalibrationParameters, TemperatureField,
};

fn synthetic_field(rows: usize, cols: usize) -> TemperatureField {
    let values = Array2::from_shape_fn((rows, cols), |(r, c)| {
        33. + 2. * ((r as f64 / 37.).sin() + (c as f64 / 23.).cos())
    });
    TemperatureField::new(values)
}

/// ExifTool json exports under `$EXIFTOOL_SAMPLES`.
fn get_samples(key: &'static str) -> Result<Vec<PathBuf>> {
    let base = env::var(key)?;
    let mut opts = MatchOptions::new();
    opts.case_sensitive = false;
    let samples: Vec<_> = glob_with(&format!("{base}/**/*.json"), opts)?
        .into_iter()
        .take(5)
        .map(|r| Result::Ok(r?))
        .collect::<Result<_>>()?;
    Ok(samples)
}

fn calibration(c: &mut Criterion) {
    let params = CalibrationParameters::new(0.98, 1.0, 22.0);

    c.bench_function("calibrate_640x480", |b| {
        let field = synthetic_field(480, 640);
        b.iter(|| calibrate(black_box(&field), &params).unwrap())
    });

    c.bench_function("calibrate_counts_640x480", |b| {
        let counts = Array2::from_shape_fn((480, 640), |(r, c)| 15000. + (r + c) as f64);
        b.iter(|| calibrate_counts(black_box(&counts), &params).unwrap())
    });

    c.bench_function("bad_pixels_640x480", |b| {
        let field = synthetic_field(480, 640);
        b.iter(|| {
            let bad = detect_bad_pixels(black_box(&field), 5.).unwrap();
            correct(&field, &bad).unwrap()
        })
    });

    c.bench_function("exiftool_calibrate", |b| {
        let samples = get_samples("EXIFTOOL_SAMPLES").expect("samples");
        let entries: Vec<ExiftoolEntry> = samples
            .iter()
            .flat_map(|path| {
                let rdr = BufReader::new(File::open(path).unwrap());
                serde_json::from_reader::<_, Vec<ExiftoolEntry>>(rdr).unwrap()
            })
            .collect();
        b.iter(|| {
            for entry in entries.iter() {
                entry.calibrate().unwrap();
            }
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = calibration
}

criterion_main!(benches);
