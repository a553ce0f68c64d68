use itertools::Itertools;
use ndarray::{ArrayD, Axis, IxDyn};
use snafu::{ensure, OptionExt, Snafu};

use crate::sample::{Mask, PairedSample, Volume};
use crate::transform::{GridRemap, Interpolation, InterpolationConfigError, InterpolationPolicy, Transform};

#[derive(Debug, Snafu)]
pub enum ResampleError {
    #[snafu(display("sample carries no spacing metadata; cannot resample to target spacing"))]
    MissingSpacing,

    #[snafu(display(
        "spacing rank mismatch: sample has {} spacing entries for {} spatial axes",
        actual,
        expected
    ))]
    SpacingRank { expected: usize, actual: usize },

    #[snafu(display("non-positive spacing {} at axis {}", value, axis))]
    NonPositiveSpacing { axis: usize, value: f64 },
}

/// Resamples a paired sample onto a target physical spacing.
///
/// Per-axis scale factors come from the ratio of current to target
/// spacing; the image is resampled with the configured continuous kernel,
/// the mask with nearest-neighbor. The output volume records the target
/// spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct Resample {
    pub target_spacing: Vec<f64>,
    image_kernel: Interpolation,
}

impl Resample {
    pub fn new(
        target_spacing: Vec<f64>,
        policy: &InterpolationPolicy,
    ) -> Result<Self, InterpolationConfigError> {
        policy.ensure_mask_nearest()?;
        Ok(Resample {
            target_spacing,
            image_kernel: policy.image,
        })
    }

    fn validate_spacing(spacing: &[f64], ndim: usize) -> Result<(), ResampleError> {
        ensure!(
            spacing.len() == ndim,
            SpacingRankSnafu {
                expected: ndim,
                actual: spacing.len()
            }
        );
        for (axis, &value) in spacing.iter().enumerate() {
            ensure!(value > 0.0, NonPositiveSpacingSnafu { axis, value });
        }
        Ok(())
    }

    /// Output extents implied by the spacing change, never collapsing an
    /// axis below a single sample.
    fn output_shape(&self, shape: &[usize], current: &[f64]) -> Vec<usize> {
        shape
            .iter()
            .zip(current.iter().zip(self.target_spacing.iter()))
            .map(|(&extent, (&cur, &target))| {
                ((extent as f64 * cur / target).round() as usize).max(1)
            })
            .collect()
    }

    pub fn apply(&self, sample: &PairedSample) -> Result<PairedSample, ResampleError> {
        let ndim = sample.image.spatial_ndim();
        let current = sample
            .image
            .spacing
            .as_deref()
            .context(MissingSpacingSnafu)?;
        Self::validate_spacing(current, ndim)?;
        Self::validate_spacing(&self.target_spacing, ndim)?;

        let out_shape = self.output_shape(sample.image.spatial_shape(), current);
        tracing::debug!(
            "resampling {} -> {} (spacing {:?} -> {:?})",
            sample.image.spatial_shape().iter().join("x"),
            out_shape.iter().join("x"),
            current,
            self.target_spacing,
        );

        let image_remap = GridRemap::new(out_shape.clone(), self.image_kernel);
        let image_data = remap_channelwise(&sample.image, &image_remap);
        let mask_remap = GridRemap::new(out_shape, Interpolation::Nearest);
        let mask_data = mask_remap.apply(&sample.mask.data);

        Ok(PairedSample {
            image: Volume {
                data: image_data,
                spacing: Some(self.target_spacing.clone()),
                orientation: sample.image.orientation,
                channel_first: sample.image.channel_first,
            },
            mask: Mask::new(mask_data),
        })
    }
}

/// Apply a spatial remap to a volume's data, per channel when a leading
/// channel axis is present.
pub(crate) fn remap_channelwise(volume: &Volume, remap: &GridRemap) -> ArrayD<f32> {
    match volume.channel_first {
        false => remap.apply(&volume.data),
        true => {
            let mut out_shape = vec![volume.channels()];
            out_shape.extend_from_slice(&remap.target);
            let mut output = ArrayD::zeros(IxDyn(&out_shape));
            for (channel, slice) in volume.data.outer_iter().enumerate() {
                let remapped = remap.apply(&slice.to_owned());
                output.index_axis_mut(Axis(0), channel).assign(&remapped);
            }
            output
        }
    }
}
