use snafu::{ensure, ResultExt, Snafu};
use std::fs::File;
use std::path::{Path, PathBuf};
use tiff::encoder::colortype::{Gray16, Gray32Float};
use tiff::encoder::TiffEncoder;
use tiff::TiffError;

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::sample::PairedSample;

#[derive(Debug, Snafu)]
pub enum SaveError {
    #[snafu(display("could not create TIFF file {}", path.display()))]
    CreateFile {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
        path: PathBuf,
    },

    #[snafu(display("could not open TIFF file {}", path.display()))]
    OpenTiff {
        #[snafu(source(from(TiffError, Box::new)))]
        source: Box<TiffError>,
        path: PathBuf,
    },

    WriteToTiff {
        #[snafu(source(from(TiffError, Box::new)))]
        source: Box<TiffError>,
    },

    #[snafu(display("tensor of rank {} cannot be saved as a TIFF stack", ndim))]
    UnsupportedRank { ndim: usize },

    #[snafu(display("label {} cannot be stored in a 16-bit mask page", label))]
    LabelRange { label: i32 },
}

/// Writes a prepared pair as TIFF: `Gray32Float` pages for the image and
/// `Gray16` pages for the mask. A 3D tensor (or a channel-first 2D image)
/// becomes a multi-page file, one page per leading-axis slice.
#[derive(Debug, Default, Clone, Copy)]
pub struct PairSaver;

impl PairSaver {
    pub fn new() -> Self {
        PairSaver
    }

    pub fn save_pair(
        &self,
        sample: &PairedSample,
        image_path: &Path,
        mask_path: &Path,
    ) -> Result<(), SaveError> {
        self.save_image(&sample.image.data, image_path)?;
        self.save_mask(&sample.mask.data, mask_path)?;
        Ok(())
    }

    pub fn save_image(&self, data: &ArrayD<f32>, path: &Path) -> Result<(), SaveError> {
        let mut encoder = open_encoder(path)?;
        for page in pages(data)? {
            let (rows, cols) = (page.shape()[0], page.shape()[1]);
            let samples: Vec<f32> = page.iter().copied().collect();
            encoder
                .write_image::<Gray32Float>(cols as u32, rows as u32, &samples)
                .context(WriteToTiffSnafu)?;
        }
        Ok(())
    }

    pub fn save_mask(&self, data: &ArrayD<i32>, path: &Path) -> Result<(), SaveError> {
        let mut encoder = open_encoder(path)?;
        for page in pages(data)? {
            let (rows, cols) = (page.shape()[0], page.shape()[1]);
            let mut samples = Vec::with_capacity(rows * cols);
            for &label in page.iter() {
                ensure!(
                    (0..=i32::from(u16::MAX)).contains(&label),
                    LabelRangeSnafu { label }
                );
                samples.push(label as u16);
            }
            encoder
                .write_image::<Gray16>(cols as u32, rows as u32, &samples)
                .context(WriteToTiffSnafu)?;
        }
        Ok(())
    }
}

fn open_encoder(path: &Path) -> Result<TiffEncoder<File>, SaveError> {
    let file = File::create(path).context(CreateFileSnafu { path })?;
    TiffEncoder::new(file).context(OpenTiffSnafu { path })
}

/// View a 2D tensor as one page, a 3D tensor as its leading-axis slices.
fn pages<A>(data: &ArrayD<A>) -> Result<Vec<ArrayViewD<'_, A>>, SaveError> {
    match data.ndim() {
        2 => Ok(vec![data.view()]),
        3 => Ok(data.axis_iter(Axis(0)).collect()),
        ndim => UnsupportedRankSnafu { ndim }.fail(),
    }
}
