use ndarray::{Array3, ArrayD, ArrayView3, Axis, Ix3, IxDyn};
use num::Zero;
use snafu::{ensure, OptionExt, Snafu};
use std::fmt;
use std::str::FromStr;

use crate::sample::{Mask, PairedSample, Volume};
use crate::transform::Transform;

#[derive(Debug, Snafu)]
pub enum OrientationError {
    #[snafu(display("sample carries no orientation metadata; cannot reorient to {}", target))]
    MissingMetadata { target: Orientation },

    #[snafu(display("orientation codes apply to 3D volumes; sample is rank {}", ndim))]
    NotVolumetric { ndim: usize },

    #[snafu(display(
        "orientation code '{}' must have exactly 3 axis letters, found {}",
        code,
        len
    ))]
    InvalidLength { code: String, len: usize },

    #[snafu(display("orientation code '{}' contains unknown axis letter '{}'", code, letter))]
    UnknownCode { code: String, letter: char },

    #[snafu(display("orientation code '{}' names the same anatomical axis twice", code))]
    DuplicateAxis { code: String },
}

/// Direction of increasing index along one array axis, in anatomical terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisCode {
    Right,
    Left,
    Anterior,
    Posterior,
    Superior,
    Inferior,
}

impl AxisCode {
    fn from_char(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'R' => Some(AxisCode::Right),
            'L' => Some(AxisCode::Left),
            'A' => Some(AxisCode::Anterior),
            'P' => Some(AxisCode::Posterior),
            'S' => Some(AxisCode::Superior),
            'I' => Some(AxisCode::Inferior),
            _ => None,
        }
    }

    /// Anatomical axis: 0 = lateral, 1 = antero-posterior, 2 = cranio-caudal.
    fn axis(&self) -> usize {
        match self {
            AxisCode::Right | AxisCode::Left => 0,
            AxisCode::Anterior | AxisCode::Posterior => 1,
            AxisCode::Superior | AxisCode::Inferior => 2,
        }
    }

    fn to_char(self) -> char {
        match self {
            AxisCode::Right => 'R',
            AxisCode::Left => 'L',
            AxisCode::Anterior => 'A',
            AxisCode::Posterior => 'P',
            AxisCode::Superior => 'S',
            AxisCode::Inferior => 'I',
        }
    }
}

/// A validated anatomical axis-codes value such as `RAS` or `LPS`.
///
/// Position `j` names the direction of increasing index along spatial axis
/// `j`. Validation guarantees the three letters cover three distinct
/// anatomical axes, so any two orientations are mutually mappable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation([AxisCode; 3]);

impl Orientation {
    pub const RAS: Orientation =
        Orientation([AxisCode::Right, AxisCode::Anterior, AxisCode::Superior]);

    pub fn codes(&self) -> [AxisCode; 3] {
        self.0
    }
}

impl FromStr for Orientation {
    type Err = OrientationError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let letters: Vec<char> = code.chars().collect();
        ensure!(
            letters.len() == 3,
            InvalidLengthSnafu {
                code,
                len: letters.len()
            }
        );
        let mut codes = [AxisCode::Right; 3];
        for (slot, &letter) in codes.iter_mut().zip(letters.iter()) {
            *slot = AxisCode::from_char(letter).context(UnknownCodeSnafu { code, letter })?;
        }
        let mut seen = [false; 3];
        for axis_code in codes.iter() {
            ensure!(!seen[axis_code.axis()], DuplicateAxisSnafu { code });
            seen[axis_code.axis()] = true;
        }
        Ok(Orientation(codes))
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis_code in self.0.iter() {
            write!(f, "{}", axis_code.to_char())?;
        }
        Ok(())
    }
}

/// The axis permutation and per-axis flips taking one orientation to
/// another. Output axis `j` reads input axis `perm[j]`, reversed when
/// `flip[j]` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxesMap {
    pub perm: [usize; 3],
    pub flip: [bool; 3],
}

impl AxesMap {
    pub fn between(from: &Orientation, to: &Orientation) -> Self {
        let mut axis_to_input = [0usize; 3];
        for (i, axis_code) in from.0.iter().enumerate() {
            axis_to_input[axis_code.axis()] = i;
        }
        let mut perm = [0usize; 3];
        let mut flip = [false; 3];
        for (j, target_code) in to.0.iter().enumerate() {
            let i = axis_to_input[target_code.axis()];
            perm[j] = i;
            flip[j] = from.0[i] != *target_code;
        }
        AxesMap { perm, flip }
    }

    pub fn is_identity(&self) -> bool {
        self.perm == [0, 1, 2] && self.flip == [false; 3]
    }

    /// Reindex a 3D array, skipping a leading channel axis when present.
    pub fn reorder<A>(&self, input: &ArrayD<A>, channel_first: bool) -> ArrayD<A>
    where
        A: Copy + Zero,
    {
        if channel_first {
            let spatial = &input.shape()[1..];
            let mut out_shape = vec![input.shape()[0]];
            out_shape.extend((0..3).map(|j| spatial[self.perm[j]]));
            let mut output = ArrayD::zeros(IxDyn(&out_shape));
            for (channel, slice) in input.outer_iter().enumerate() {
                let view = slice.into_dimensionality::<Ix3>().unwrap();
                output
                    .index_axis_mut(Axis(0), channel)
                    .assign(&self.reorder3(view));
            }
            output
        } else {
            let view = input.view().into_dimensionality::<Ix3>().unwrap();
            self.reorder3(view).into_dyn()
        }
    }

    fn reorder3<A>(&self, input: ArrayView3<A>) -> Array3<A>
    where
        A: Copy + Zero,
    {
        let (d0, d1, d2) = input.dim();
        let dims = [d0, d1, d2];
        let out_dims = [dims[self.perm[0]], dims[self.perm[1]], dims[self.perm[2]]];
        let mut output = Array3::zeros((out_dims[0], out_dims[1], out_dims[2]));
        for a in 0..out_dims[0] {
            for b in 0..out_dims[1] {
                for c in 0..out_dims[2] {
                    let out_idx = [a, b, c];
                    let mut src = [0usize; 3];
                    for j in 0..3 {
                        src[self.perm[j]] = match self.flip[j] {
                            true => out_dims[j] - 1 - out_idx[j],
                            false => out_idx[j],
                        };
                    }
                    output[[a, b, c]] = input[[src[0], src[1], src[2]]];
                }
            }
        }
        output
    }
}

impl Transform<ArrayD<f32>> for AxesMap {
    fn apply(&self, target: &ArrayD<f32>) -> ArrayD<f32> {
        self.reorder(target, false)
    }
}

impl Transform<ArrayD<i32>> for AxesMap {
    fn apply(&self, target: &ArrayD<i32>) -> ArrayD<i32> {
        self.reorder(target, false)
    }
}

/// Reorders and flips the spatial axes of a paired sample into a target
/// anatomical orientation. Pure reindexing; the image and mask get the
/// exact same map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orient {
    pub target: Orientation,
}

impl Orient {
    pub fn new(target: Orientation) -> Self {
        Orient { target }
    }

    pub fn apply(&self, sample: &PairedSample) -> Result<PairedSample, OrientationError> {
        let ndim = sample.image.spatial_ndim();
        ensure!(ndim == 3, NotVolumetricSnafu { ndim });
        let current = sample
            .image
            .orientation
            .context(MissingMetadataSnafu {
                target: self.target,
            })?;

        let map = AxesMap::between(&current, &self.target);
        let image_data = match map.is_identity() {
            true => sample.image.data.clone(),
            false => map.reorder(&sample.image.data, sample.image.channel_first),
        };
        let mask_data = match map.is_identity() {
            true => sample.mask.data.clone(),
            false => map.reorder(&sample.mask.data, false),
        };

        // Spacing follows the permutation so each entry still describes its axis.
        let spacing = sample.image.spacing.as_ref().map(|spacing| {
            match spacing.len() == 3 {
                true => (0..3).map(|j| spacing[map.perm[j]]).collect(),
                false => spacing.clone(),
            }
        });

        Ok(PairedSample {
            image: Volume {
                data: image_data,
                spacing,
                orientation: Some(self.target),
                channel_first: sample.image.channel_first,
            },
            mask: Mask::new(mask_data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rstest::rstest;

    #[rstest]
    #[case("RAS", "RAS")]
    #[case("ras", "RAS")]
    #[case("LPS", "LPS")]
    #[case("sar", "SAR")]
    fn test_parse_valid(#[case] code: &str, #[case] display: &str) {
        let orientation: Orientation = code.parse().unwrap();
        assert_eq!(orientation.to_string(), display);
    }

    #[rstest]
    #[case("RA")]
    #[case("RASI")]
    #[case("RAX")]
    #[case("RLS")]
    #[case("RAR")]
    fn test_parse_invalid(#[case] code: &str) {
        assert!(code.parse::<Orientation>().is_err());
    }

    #[test]
    fn test_identity_map() {
        let ras: Orientation = "RAS".parse().unwrap();
        let map = AxesMap::between(&ras, &ras);
        assert!(map.is_identity());
    }

    #[test]
    fn test_full_flip_map() {
        let lps: Orientation = "LPS".parse().unwrap();
        let ras: Orientation = "RAS".parse().unwrap();
        let map = AxesMap::between(&lps, &ras);
        assert_eq!(map.perm, [0, 1, 2]);
        assert_eq!(map.flip, [true, true, false]);
    }

    #[test]
    fn test_permutation_reorder() {
        // SAR -> RAS swaps the first and last axes with no flips.
        let sar: Orientation = "SAR".parse().unwrap();
        let ras: Orientation = "RAS".parse().unwrap();
        let map = AxesMap::between(&sar, &ras);
        assert_eq!(map.perm, [2, 1, 0]);
        assert_eq!(map.flip, [false; 3]);

        let input = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| (a * 100 + b * 10 + c) as i32);
        let output = map.reorder(&input.clone().into_dyn(), false);
        assert_eq!(output.shape(), &[4, 3, 2]);
        for a in 0..4 {
            for b in 0..3 {
                for c in 0..2 {
                    assert_eq!(output[[a, b, c]], input[[c, b, a]]);
                }
            }
        }
    }

    #[test]
    fn test_flip_reorder() {
        let ras: Orientation = "RAS".parse().unwrap();
        let las: Orientation = "LAS".parse().unwrap();
        let map = AxesMap::between(&ras, &las);
        assert_eq!(map.perm, [0, 1, 2]);
        assert_eq!(map.flip, [true, false, false]);

        let input = Array3::from_shape_fn((3, 2, 2), |(a, b, c)| (a * 100 + b * 10 + c) as i32);
        let output = map.reorder(&input.clone().into_dyn(), false);
        for a in 0..3 {
            for b in 0..2 {
                for c in 0..2 {
                    assert_eq!(output[[a, b, c]], input[[2 - a, b, c]]);
                }
            }
        }
    }

    #[test]
    fn test_orient_round_trip() {
        let input = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| (a * 100 + b * 10 + c) as f32);
        let sample = PairedSample::new(
            Volume::new(input.clone().into_dyn())
                .with_orientation("LPI".parse().unwrap())
                .with_spacing(vec![1.0, 2.0, 3.0]),
            Mask::new(Array3::<i32>::zeros((2, 3, 4)).into_dyn()),
        );

        let there = Orient::new("RAS".parse().unwrap()).apply(&sample).unwrap();
        assert_eq!(there.image.orientation, Some("RAS".parse().unwrap()));
        let back = Orient::new("LPI".parse().unwrap()).apply(&there).unwrap();
        assert_eq!(back.image.data, sample.image.data);
        assert_eq!(back.image.spacing, sample.image.spacing);
    }

    #[test]
    fn test_missing_metadata_fails() {
        let sample = PairedSample::new(
            Volume::new(Array3::<f32>::zeros((2, 2, 2)).into_dyn()),
            Mask::new(Array3::<i32>::zeros((2, 2, 2)).into_dyn()),
        );
        let error = Orient::new(Orientation::RAS).apply(&sample).unwrap_err();
        assert!(matches!(error, OrientationError::MissingMetadata { .. }));
    }

    #[test]
    fn test_2d_sample_fails() {
        let sample = PairedSample::new(
            Volume::new(ArrayD::<f32>::zeros(IxDyn(&[4, 4]))),
            Mask::new(ArrayD::<i32>::zeros(IxDyn(&[4, 4]))),
        );
        let error = Orient::new(Orientation::RAS).apply(&sample).unwrap_err();
        assert!(matches!(error, OrientationError::NotVolumetric { ndim: 2 }));
    }

    #[test]
    fn test_channel_axis_reorder() {
        let image = Array3::from_shape_fn((2, 3, 4), |(a, b, c)| (a * 100 + b * 10 + c) as f32);
        let stacked = ndarray::stack(Axis(0), &[image.view(), image.view()]).unwrap();
        let sar: Orientation = "SAR".parse().unwrap();
        let map = AxesMap::between(&sar, &"RAS".parse().unwrap());
        let output = map.reorder(&stacked.into_dyn(), true);
        assert_eq!(output.shape(), &[2, 4, 3, 2]);
        for channel in 0..2 {
            assert_eq!(output[[channel, 1, 2, 0]], image[[0, 2, 1]]);
        }
    }
}
