use image::DynamicImage;
use ndarray::Array2;
use snafu::{OptionExt, ResultExt, Snafu};
use std::path::{Path, PathBuf};

use crate::sample::{Mask, PairedSample, Volume};

#[derive(Debug, Snafu)]
pub enum LoadError {
    #[snafu(display("could not open image file {}", path.display()))]
    OpenImage {
        #[snafu(source(from(image::ImageError, Box::new)))]
        source: Box<image::ImageError>,
        path: PathBuf,
    },

    #[snafu(display(
        "mask {} must be stored as 8- or 16-bit grayscale to keep labels intact",
        path.display()
    ))]
    UnsupportedMaskFormat { path: PathBuf },

    #[snafu(display("could not read manifest {}", path.display()))]
    ReadManifest {
        #[snafu(source(from(csv::Error, Box::new)))]
        source: Box<csv::Error>,
        path: PathBuf,
    },

    #[snafu(display("manifest {} is missing an '{}' column", path.display(), column))]
    MissingColumn { path: PathBuf, column: &'static str },

    #[snafu(display("manifest {} record {} is missing a value", path.display(), record))]
    MissingValue { path: PathBuf, record: usize },
}

/// Load a grayscale raster image as a floating-point volume.
pub fn load_image(path: &Path) -> Result<Volume, LoadError> {
    let image = image::open(path).context(OpenImageSnafu { path })?;
    let buffer = image.to_luma32f();
    let (width, height) = buffer.dimensions();
    let data = Array2::from_shape_vec((height as usize, width as usize), buffer.into_raw())
        .unwrap();
    Ok(Volume::new(data.into_dyn()))
}

/// Load an integer label mask, preserving raw sample values.
pub fn load_mask(path: &Path) -> Result<Mask, LoadError> {
    let image = image::open(path).context(OpenImageSnafu { path })?;
    let (data, width, height) = match image {
        DynamicImage::ImageLuma8(buffer) => {
            let (width, height) = buffer.dimensions();
            let data: Vec<i32> = buffer.into_raw().into_iter().map(i32::from).collect();
            (data, width, height)
        }
        DynamicImage::ImageLuma16(buffer) => {
            let (width, height) = buffer.dimensions();
            let data: Vec<i32> = buffer.into_raw().into_iter().map(i32::from).collect();
            (data, width, height)
        }
        _ => return UnsupportedMaskFormatSnafu { path }.fail(),
    };
    let data = Array2::from_shape_vec((height as usize, width as usize), data).unwrap();
    Ok(Mask::new(data.into_dyn()))
}

/// Load a co-registered image/mask pair. Shape congruence is checked by
/// the pipeline at entry, not here.
pub fn load_pair(image_path: &Path, mask_path: &Path) -> Result<PairedSample, LoadError> {
    let image = load_image(image_path)?;
    let mask = load_mask(mask_path)?;
    Ok(PairedSample::new(image, mask))
}

/// One row of the training manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub image: PathBuf,
    pub mask: PathBuf,
}

/// Read a CSV manifest with `image` and `mask` columns of file paths.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestEntry>, LoadError> {
    let mut reader = csv::Reader::from_path(path).context(ReadManifestSnafu { path })?;
    let headers = reader.headers().context(ReadManifestSnafu { path })?.clone();
    let image_column = headers
        .iter()
        .position(|header| header == "image")
        .context(MissingColumnSnafu {
            path,
            column: "image",
        })?;
    let mask_column = headers
        .iter()
        .position(|header| header == "mask")
        .context(MissingColumnSnafu {
            path,
            column: "mask",
        })?;

    let mut entries = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.context(ReadManifestSnafu { path })?;
        let image = record
            .get(image_column)
            .context(MissingValueSnafu { path, record: index })?;
        let mask = record
            .get(mask_column)
            .context(MissingValueSnafu { path, record: index })?;
        entries.push(ManifestEntry {
            image: image.into(),
            mask: mask.into(),
        });
    }
    Ok(entries)
}
