use ndarray::{Array2, Array3, ArrayD, ArrayView2, ArrayView3, Ix2, Ix3};
use num::Zero;
use snafu::{ensure, Snafu};
use std::fmt;

use crate::transform::Transform;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kernel_str = match self {
            Interpolation::Linear => "linear",
            Interpolation::Nearest => "nearest",
        };
        write!(f, "{kernel_str}")
    }
}

#[derive(Debug, Snafu)]
#[snafu(display(
    "continuous kernel '{}' requested for a label-valued tensor; labels must use nearest-neighbor",
    requested
))]
pub struct InterpolationConfigError {
    pub requested: Interpolation,
}

/// Per-tensor-kind kernel assignment.
///
/// The image kernel is configurable; the mask kernel is nearest-neighbor
/// and may not be changed to a continuous kernel, since interpolating a
/// label map would synthesize labels that never existed in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpolationPolicy {
    pub image: Interpolation,
    pub mask: Interpolation,
}

impl Default for InterpolationPolicy {
    fn default() -> Self {
        InterpolationPolicy {
            image: Interpolation::Linear,
            mask: Interpolation::Nearest,
        }
    }
}

impl InterpolationPolicy {
    pub fn ensure_mask_nearest(&self) -> Result<(), InterpolationConfigError> {
        ensure!(
            self.mask == Interpolation::Nearest,
            InterpolationConfigSnafu {
                requested: self.mask
            }
        );
        Ok(())
    }
}

/// Remaps a 2D or 3D array onto a target extent grid.
///
/// Sampling uses half-pixel centers: output index `i` reads source
/// coordinate `(i + 0.5) * in/out - 0.5`, so a remap onto the input's own
/// extents is the identity for both kernels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRemap {
    pub target: Vec<usize>,
    pub kernel: Interpolation,
}

impl GridRemap {
    pub fn new(target: Vec<usize>, kernel: Interpolation) -> Self {
        GridRemap { target, kernel }
    }
}

impl Transform<ArrayD<f32>> for GridRemap {
    fn apply(&self, input: &ArrayD<f32>) -> ArrayD<f32> {
        assert_eq!(
            input.ndim(),
            self.target.len(),
            "remap rank mismatch: input is rank {}, target is rank {}",
            input.ndim(),
            self.target.len()
        );
        match self.kernel {
            Interpolation::Linear => remap_linear(input, &self.target),
            Interpolation::Nearest => remap_nearest(input, &self.target),
        }
    }
}

impl Transform<ArrayD<i32>> for GridRemap {
    fn apply(&self, input: &ArrayD<i32>) -> ArrayD<i32> {
        assert_eq!(
            input.ndim(),
            self.target.len(),
            "remap rank mismatch: input is rank {}, target is rank {}",
            input.ndim(),
            self.target.len()
        );
        assert_eq!(
            self.kernel,
            Interpolation::Nearest,
            "label tensors are remapped with nearest-neighbor only"
        );
        remap_nearest(input, &self.target)
    }
}

fn src_center(index: usize, scale: f64) -> f64 {
    (index as f64 + 0.5) * scale - 0.5
}

fn nearest_index(index: usize, scale: f64, len: usize) -> usize {
    let src = ((index as f64 + 0.5) * scale).floor().max(0.0) as usize;
    src.min(len - 1)
}

/// Bracketing indices and fractional offset for linear interpolation along
/// one axis, clamped to the valid range.
fn linear_axis(index: usize, scale: f64, len: usize) -> (usize, usize, f64) {
    let src = src_center(index, scale).clamp(0.0, (len - 1) as f64);
    let lo = src.floor() as usize;
    let hi = (lo + 1).min(len - 1);
    (lo, hi, src - lo as f64)
}

fn remap_linear(input: &ArrayD<f32>, target: &[usize]) -> ArrayD<f32> {
    match input.ndim() {
        2 => {
            let view = input.view().into_dimensionality::<Ix2>().unwrap();
            linear_2d(view, (target[0], target[1])).into_dyn()
        }
        3 => {
            let view = input.view().into_dimensionality::<Ix3>().unwrap();
            linear_3d(view, (target[0], target[1], target[2])).into_dyn()
        }
        n => panic!("unsupported spatial rank {n}; expected 2 or 3"),
    }
}

fn remap_nearest<A>(input: &ArrayD<A>, target: &[usize]) -> ArrayD<A>
where
    A: Copy + Zero,
{
    match input.ndim() {
        2 => {
            let view = input.view().into_dimensionality::<Ix2>().unwrap();
            nearest_2d(view, (target[0], target[1])).into_dyn()
        }
        3 => {
            let view = input.view().into_dimensionality::<Ix3>().unwrap();
            nearest_3d(view, (target[0], target[1], target[2])).into_dyn()
        }
        n => panic!("unsupported spatial rank {n}; expected 2 or 3"),
    }
}

fn linear_2d(input: ArrayView2<f32>, target: (usize, usize)) -> Array2<f32> {
    let (rows, cols) = input.dim();
    let (out_rows, out_cols) = target;
    let row_axis: Vec<_> = (0..out_rows)
        .map(|r| linear_axis(r, rows as f64 / out_rows as f64, rows))
        .collect();
    let col_axis: Vec<_> = (0..out_cols)
        .map(|c| linear_axis(c, cols as f64 / out_cols as f64, cols))
        .collect();

    let mut output = Array2::zeros((out_rows, out_cols));
    for (r, &(r0, r1, fr)) in row_axis.iter().enumerate() {
        for (c, &(c0, c1, fc)) in col_axis.iter().enumerate() {
            let top = input[[r0, c0]] as f64 * (1.0 - fc) + input[[r0, c1]] as f64 * fc;
            let bottom = input[[r1, c0]] as f64 * (1.0 - fc) + input[[r1, c1]] as f64 * fc;
            output[[r, c]] = (top * (1.0 - fr) + bottom * fr) as f32;
        }
    }
    output
}

fn linear_3d(input: ArrayView3<f32>, target: (usize, usize, usize)) -> Array3<f32> {
    let (depth, rows, cols) = input.dim();
    let (out_depth, out_rows, out_cols) = target;
    let depth_axis: Vec<_> = (0..out_depth)
        .map(|d| linear_axis(d, depth as f64 / out_depth as f64, depth))
        .collect();
    let row_axis: Vec<_> = (0..out_rows)
        .map(|r| linear_axis(r, rows as f64 / out_rows as f64, rows))
        .collect();
    let col_axis: Vec<_> = (0..out_cols)
        .map(|c| linear_axis(c, cols as f64 / out_cols as f64, cols))
        .collect();

    let mut output = Array3::zeros((out_depth, out_rows, out_cols));
    for (d, &(d0, d1, fd)) in depth_axis.iter().enumerate() {
        for (r, &(r0, r1, fr)) in row_axis.iter().enumerate() {
            for (c, &(c0, c1, fc)) in col_axis.iter().enumerate() {
                let lerp_rc = |dz: usize| -> f64 {
                    let top =
                        input[[dz, r0, c0]] as f64 * (1.0 - fc) + input[[dz, r0, c1]] as f64 * fc;
                    let bottom =
                        input[[dz, r1, c0]] as f64 * (1.0 - fc) + input[[dz, r1, c1]] as f64 * fc;
                    top * (1.0 - fr) + bottom * fr
                };
                output[[d, r, c]] = (lerp_rc(d0) * (1.0 - fd) + lerp_rc(d1) * fd) as f32;
            }
        }
    }
    output
}

fn nearest_2d<A>(input: ArrayView2<A>, target: (usize, usize)) -> Array2<A>
where
    A: Copy + Zero,
{
    let (rows, cols) = input.dim();
    let (out_rows, out_cols) = target;
    let row_axis: Vec<_> = (0..out_rows)
        .map(|r| nearest_index(r, rows as f64 / out_rows as f64, rows))
        .collect();
    let col_axis: Vec<_> = (0..out_cols)
        .map(|c| nearest_index(c, cols as f64 / out_cols as f64, cols))
        .collect();

    let mut output = Array2::zeros((out_rows, out_cols));
    for (r, &sr) in row_axis.iter().enumerate() {
        for (c, &sc) in col_axis.iter().enumerate() {
            output[[r, c]] = input[[sr, sc]];
        }
    }
    output
}

fn nearest_3d<A>(input: ArrayView3<A>, target: (usize, usize, usize)) -> Array3<A>
where
    A: Copy + Zero,
{
    let (depth, rows, cols) = input.dim();
    let (out_depth, out_rows, out_cols) = target;
    let depth_axis: Vec<_> = (0..out_depth)
        .map(|d| nearest_index(d, depth as f64 / out_depth as f64, depth))
        .collect();
    let row_axis: Vec<_> = (0..out_rows)
        .map(|r| nearest_index(r, rows as f64 / out_rows as f64, rows))
        .collect();
    let col_axis: Vec<_> = (0..out_cols)
        .map(|c| nearest_index(c, cols as f64 / out_cols as f64, cols))
        .collect();

    let mut output = Array3::zeros((out_depth, out_rows, out_cols));
    for (d, &sd) in depth_axis.iter().enumerate() {
        for (r, &sr) in row_axis.iter().enumerate() {
            for (c, &sc) in col_axis.iter().enumerate() {
                output[[d, r, c]] = input[[sd, sr, sc]];
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr3;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rstest::rstest;
    use std::collections::BTreeSet;

    #[rstest]
    #[case(
        vec![
            vec![1, 1, 2, 2],
            vec![1, 1, 2, 2],
            vec![3, 3, 4, 4],
            vec![3, 3, 4, 4],
        ],
        (2, 2),
        vec![
            vec![1, 2],
            vec![3, 4],
        ],
    )]
    #[case(
        vec![
            vec![1, 2],
            vec![3, 4],
        ],
        (4, 4),
        vec![
            vec![1, 1, 2, 2],
            vec![1, 1, 2, 2],
            vec![3, 3, 4, 4],
            vec![3, 3, 4, 4],
        ],
    )]
    fn test_nearest_2d(
        #[case] input: Vec<Vec<i32>>,
        #[case] target: (usize, usize),
        #[case] expected: Vec<Vec<i32>>,
    ) {
        let input = Array2::from_shape_vec(
            (input.len(), input[0].len()),
            input.into_iter().flatten().collect(),
        )
        .unwrap();
        let expected = Array2::from_shape_vec(
            (expected.len(), expected[0].len()),
            expected.into_iter().flatten().collect(),
        )
        .unwrap();
        assert_eq!(nearest_2d(input.view(), target), expected);
    }

    #[rstest]
    #[case(vec![0.0, 1.0, 2.0, 3.0], 2, vec![0.5, 2.5])]
    #[case(vec![0.0, 2.0], 4, vec![0.0, 0.5, 1.5, 2.0])]
    #[case(vec![1.0, 1.0, 1.0], 5, vec![1.0, 1.0, 1.0, 1.0, 1.0])]
    fn test_linear_2d_rows(
        #[case] input: Vec<f32>,
        #[case] out_cols: usize,
        #[case] expected: Vec<f32>,
    ) {
        let cols = input.len();
        let input = Array2::from_shape_vec((1, cols), input).unwrap();
        let output = linear_2d(input.view(), (1, out_cols));
        let expected = Array2::from_shape_vec((1, out_cols), expected).unwrap();
        for (actual, want) in output.iter().zip(expected.iter()) {
            assert!((actual - want).abs() < 1e-6, "{actual} != {want}");
        }
    }

    #[test]
    fn test_linear_3d_collapse_depth() {
        // Two constant slices blend to their midpoint when reduced to one.
        let input = arr3(&[[[0.0_f32, 0.0], [0.0, 0.0]], [[2.0, 2.0], [2.0, 2.0]]]);
        let output = linear_3d(input.view(), (1, 2, 2));
        for value in output.iter() {
            assert!((value - 1.0).abs() < 1e-6);
        }
    }

    #[rstest]
    #[case(Interpolation::Linear)]
    #[case(Interpolation::Nearest)]
    fn test_same_size_remap_is_identity(#[case] kernel: Interpolation) {
        let mut rng = StdRng::seed_from_u64(0);
        let input: ArrayD<f32> =
            ArrayD::from_shape_fn(vec![5, 7], |_| rng.gen_range(-10.0..10.0));
        let remap = GridRemap::new(vec![5, 7], kernel);
        let output = remap.apply(&input);
        for (actual, want) in output.iter().zip(input.iter()) {
            assert!((actual - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_idempotent_at_fixed_target() {
        let mut rng = StdRng::seed_from_u64(1);
        let input: ArrayD<f32> =
            ArrayD::from_shape_fn(vec![9, 11], |_| rng.gen_range(0.0..1.0));
        let remap = GridRemap::new(vec![4, 6], Interpolation::Linear);
        let once = remap.apply(&input);
        let twice = remap.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nearest_never_invents_labels() {
        let mut rng = StdRng::seed_from_u64(2);
        let input: ArrayD<i32> = ArrayD::from_shape_fn(vec![13, 17], |_| rng.gen_range(0..4));
        let before: BTreeSet<i32> = input.iter().copied().collect();
        let remap = GridRemap::new(vec![5, 29], Interpolation::Nearest);
        let output: ArrayD<i32> = remap.apply(&input);
        let after: BTreeSet<i32> = output.iter().copied().collect();
        assert!(after.is_subset(&before));
    }

    #[test]
    #[should_panic(expected = "nearest-neighbor only")]
    fn test_continuous_kernel_on_labels_panics() {
        let input: ArrayD<i32> = ArrayD::zeros(vec![4, 4]);
        let remap = GridRemap::new(vec![2, 2], Interpolation::Linear);
        let _: ArrayD<i32> = remap.apply(&input);
    }

    #[test]
    fn test_policy_rejects_continuous_mask_kernel() {
        let policy = InterpolationPolicy {
            image: Interpolation::Linear,
            mask: Interpolation::Linear,
        };
        let error = policy.ensure_mask_nearest().unwrap_err();
        assert_eq!(error.requested, Interpolation::Linear);
        assert!(InterpolationPolicy::default().ensure_mask_nearest().is_ok());
    }

    #[test]
    fn test_nearest_3d_downsample() {
        let input = arr3(&[
            [[1, 1, 2, 2], [1, 1, 2, 2]],
            [[1, 1, 2, 2], [1, 1, 2, 2]],
            [[3, 3, 4, 4], [3, 3, 4, 4]],
            [[3, 3, 4, 4], [3, 3, 4, 4]],
        ]);
        let output = nearest_3d(input.view(), (2, 1, 2));
        assert_eq!(output, arr3(&[[[1, 2]], [[3, 4]]]));
    }

    #[test]
    fn test_display() {
        assert_eq!(Interpolation::Linear.to_string(), "linear");
        assert_eq!(Interpolation::Nearest.to_string(), "nearest");
    }
}
