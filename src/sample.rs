use itertools::Itertools;
use ndarray::ArrayD;
use snafu::{ensure, Snafu};
use std::collections::BTreeSet;

use crate::transform::orient::Orientation;

#[derive(Debug, Snafu)]
#[snafu(display(
    "image/mask spatial shape mismatch at {}: image is {}, mask is {}",
    stage,
    image_shape.iter().join("x"),
    mask_shape.iter().join("x")
))]
pub struct ShapeMismatchError {
    pub stage: &'static str,
    pub image_shape: Vec<usize>,
    pub mask_shape: Vec<usize>,
}

/// A continuous-intensity image tensor with its geometric metadata.
///
/// The array holds 2 or 3 spatial axes, optionally preceded by a channel
/// axis when `channel_first` is set. Spacing and orientation are carried
/// when the source container provides them and are consumed by the
/// resampling and reorientation stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub data: ArrayD<f32>,
    pub spacing: Option<Vec<f64>>,
    pub orientation: Option<Orientation>,
    pub channel_first: bool,
}

impl Volume {
    pub fn new(data: ArrayD<f32>) -> Self {
        Volume {
            data,
            spacing: None,
            orientation: None,
            channel_first: false,
        }
    }

    pub fn with_spacing(mut self, spacing: Vec<f64>) -> Self {
        self.spacing = Some(spacing);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_channel_axis(mut self) -> Self {
        self.channel_first = true;
        self
    }

    /// Shape of the spatial axes, excluding any leading channel axis.
    pub fn spatial_shape(&self) -> &[usize] {
        match self.channel_first {
            true => &self.data.shape()[1..],
            false => self.data.shape(),
        }
    }

    pub fn spatial_ndim(&self) -> usize {
        self.spatial_shape().len()
    }

    pub fn channels(&self) -> usize {
        match self.channel_first {
            true => self.data.shape()[0],
            false => 1,
        }
    }
}

/// An integer label map co-registered with a [`Volume`].
///
/// Masks are spatial-only; labels are the distinct values present in the
/// data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub data: ArrayD<i32>,
}

impl Mask {
    pub fn new(data: ArrayD<i32>) -> Self {
        Mask { data }
    }

    pub fn spatial_shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn spatial_ndim(&self) -> usize {
        self.data.ndim()
    }

    /// The set of distinct label values present in the mask.
    pub fn label_set(&self) -> BTreeSet<i32> {
        self.data.iter().copied().collect()
    }
}

/// A co-registered (image, mask) pair.
///
/// Invariant: at every pipeline boundary the spatial shapes of both
/// tensors are exactly equal. The pair is a value; stages consume a
/// reference and produce a new pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedSample {
    pub image: Volume,
    pub mask: Mask,
}

impl PairedSample {
    pub fn new(image: Volume, mask: Mask) -> Self {
        PairedSample { image, mask }
    }

    /// Verify the image and mask agree on spatial shape.
    pub fn ensure_congruent(&self, stage: &'static str) -> Result<(), ShapeMismatchError> {
        ensure!(
            self.image.spatial_shape() == self.mask.spatial_shape(),
            ShapeMismatchSnafu {
                stage,
                image_shape: self.image.spatial_shape().to_vec(),
                mask_shape: self.mask.spatial_shape().to_vec(),
            }
        );
        Ok(())
    }

    pub fn spatial_shape(&self) -> &[usize] {
        self.image.spatial_shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use rstest::rstest;

    #[rstest]
    #[case(vec![4, 6], false, vec![4, 6], 1)]
    #[case(vec![3, 4, 6], true, vec![4, 6], 3)]
    #[case(vec![2, 8, 8, 8], true, vec![8, 8, 8], 2)]
    fn test_spatial_shape(
        #[case] shape: Vec<usize>,
        #[case] channel_first: bool,
        #[case] expected: Vec<usize>,
        #[case] channels: usize,
    ) {
        let mut volume = Volume::new(ArrayD::zeros(shape));
        if channel_first {
            volume = volume.with_channel_axis();
        }
        assert_eq!(volume.spatial_shape(), expected.as_slice());
        assert_eq!(volume.channels(), channels);
    }

    #[test]
    fn test_label_set() {
        let mask = Mask::new(
            Array2::from_shape_vec((2, 3), vec![0, 1, 2, 2, 1, 0])
                .unwrap()
                .into_dyn(),
        );
        assert_eq!(mask.label_set(), BTreeSet::from([0, 1, 2]));
    }

    #[rstest]
    #[case(vec![100, 100], vec![100, 100], true)]
    #[case(vec![100, 100], vec![100, 101], false)]
    #[case(vec![16, 16, 16], vec![16, 16, 16], true)]
    fn test_ensure_congruent(
        #[case] image_shape: Vec<usize>,
        #[case] mask_shape: Vec<usize>,
        #[case] ok: bool,
    ) {
        let sample = PairedSample::new(
            Volume::new(ArrayD::zeros(image_shape)),
            Mask::new(ArrayD::zeros(mask_shape)),
        );
        assert_eq!(sample.ensure_congruent("input").is_ok(), ok);
    }

    #[test]
    fn test_congruence_ignores_channel_axis() {
        let image = Volume::new(Array3::<f32>::zeros((3, 8, 8)).into_dyn()).with_channel_axis();
        let mask = Mask::new(Array2::<i32>::zeros((8, 8)).into_dyn());
        let sample = PairedSample::new(image, mask);
        assert!(sample.ensure_congruent("input").is_ok());
    }
}
