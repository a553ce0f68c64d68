use snafu::{ensure, Snafu};

use crate::sample::{Mask, PairedSample, Volume};
use crate::transform::resample::remap_channelwise;
use crate::transform::{GridRemap, Interpolation, InterpolationConfigError, InterpolationPolicy, Transform};

#[derive(Debug, Snafu)]
pub enum ResizeError {
    #[snafu(display(
        "target size has {} axes but sample has {} spatial axes",
        target,
        actual
    ))]
    SizeRank { target: usize, actual: usize },

    #[snafu(display("target size has zero extent at axis {}", axis))]
    ZeroExtent { axis: usize },
}

/// Resizes both tensors of a paired sample to a fixed spatial size.
///
/// A direct remap onto the target extents: aspect ratio is not preserved
/// and nothing is cropped or padded, so distortion on non-matching inputs
/// is expected behavior. The image uses the configured continuous kernel,
/// the mask nearest-neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resize {
    pub size: Vec<usize>,
    image_kernel: Interpolation,
}

impl Resize {
    pub fn new(
        size: Vec<usize>,
        policy: &InterpolationPolicy,
    ) -> Result<Self, InterpolationConfigError> {
        policy.ensure_mask_nearest()?;
        Ok(Resize {
            size,
            image_kernel: policy.image,
        })
    }

    pub fn apply(&self, sample: &PairedSample) -> Result<PairedSample, ResizeError> {
        let ndim = sample.image.spatial_ndim();
        ensure!(
            self.size.len() == ndim,
            SizeRankSnafu {
                target: self.size.len(),
                actual: ndim
            }
        );
        for (axis, &extent) in self.size.iter().enumerate() {
            ensure!(extent > 0, ZeroExtentSnafu { axis });
        }

        let image_remap = GridRemap::new(self.size.clone(), self.image_kernel);
        let image_data = remap_channelwise(&sample.image, &image_remap);
        let mask_remap = GridRemap::new(self.size.clone(), Interpolation::Nearest);
        let mask_data = mask_remap.apply(&sample.mask.data);

        // Physical spacing stretches by the inverse of the extent ratio.
        let spacing = sample.image.spacing.as_ref().map(|spacing| {
            spacing
                .iter()
                .zip(sample.image.spatial_shape().iter().zip(self.size.iter()))
                .map(|(&mm, (&from, &to))| mm * from as f64 / to as f64)
                .collect()
        });

        Ok(PairedSample {
            image: Volume {
                data: image_data,
                spacing,
                orientation: sample.image.orientation,
                channel_first: sample.image.channel_first,
            },
            mask: Mask::new(mask_data),
        })
    }
}
