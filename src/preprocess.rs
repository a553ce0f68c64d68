use snafu::{ensure, ResultExt, Snafu};

use crate::sample::{PairedSample, ShapeMismatchError};
use crate::transform::{
    InterpolationConfigError, InterpolationPolicy, Modality, Normalize, Orient, Orientation,
    OrientationError, Resample, ResampleError, Resize, ResizeError, Transform, Window,
};

#[derive(Debug, Snafu)]
pub enum PreprocessError {
    #[snafu(display("{}", source))]
    ShapeCheck {
        #[snafu(source(from(ShapeMismatchError, Box::new)))]
        source: Box<ShapeMismatchError>,
    },

    #[snafu(display("sample has {} spatial axes, expected 2 or 3", actual))]
    SpatialRank { actual: usize },

    #[snafu(display("invalid CT window: min {} must be below max {}", min_hu, max_hu))]
    InvalidWindow { min_hu: f32, max_hu: f32 },

    #[snafu(display("invalid interpolation config: {}", source))]
    Interpolation {
        #[snafu(source(from(InterpolationConfigError, Box::new)))]
        source: Box<InterpolationConfigError>,
    },

    #[snafu(display("orientation stage failed: {}", source))]
    Orientation {
        #[snafu(source(from(OrientationError, Box::new)))]
        source: Box<OrientationError>,
    },

    #[snafu(display("spacing resample stage failed: {}", source))]
    SpacingResample {
        #[snafu(source(from(ResampleError, Box::new)))]
        source: Box<ResampleError>,
    },

    #[snafu(display("spatial resize stage failed: {}", source))]
    SpatialResize {
        #[snafu(source(from(ResizeError, Box::new)))]
        source: Box<ResizeError>,
    },
}

// Responsible for bringing a paired sample into the canonical geometric
// and intensity space consumed by training.
//
// Stage order is fixed: orientation, spacing resample, intensity
// normalization, spatial resize. Intensity runs before the resize, so CT
// bounds hold exactly on the output while MRI statistics are those of the
// pre-resize grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    pub modality: Modality,
    pub window: Window,
    pub size: Vec<usize>,
    pub spacing: Option<Vec<f64>>,
    pub orientation: Option<Orientation>,
    pub interpolation: InterpolationPolicy,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Preprocessor {
            modality: Modality::Mri,
            window: Window::default(),
            size: vec![256, 256],
            spacing: None,
            orientation: None,
            interpolation: InterpolationPolicy::default(),
        }
    }
}

impl Preprocessor {
    /// Run the full pipeline on one sample, producing a new prepared pair.
    pub fn prepare(&self, sample: &PairedSample) -> Result<PairedSample, PreprocessError> {
        sample.ensure_congruent("input").context(ShapeCheckSnafu)?;
        let ndim = sample.image.spatial_ndim();
        ensure!(ndim == 2 || ndim == 3, SpatialRankSnafu { actual: ndim });
        if self.modality == Modality::Ct {
            ensure!(
                self.window.min_hu < self.window.max_hu,
                InvalidWindowSnafu {
                    min_hu: self.window.min_hu,
                    max_hu: self.window.max_hu,
                }
            );
        }

        #[cfg(debug_assertions)]
        let input_labels = sample.mask.label_set();

        let sample = match &self.orientation {
            Some(target) => Orient::new(*target)
                .apply(sample)
                .context(OrientationSnafu)?,
            None => sample.clone(),
        };

        let sample = match &self.spacing {
            Some(target) => Resample::new(target.clone(), &self.interpolation)
                .context(InterpolationSnafu)?
                .apply(&sample)
                .context(SpacingResampleSnafu)?,
            None => sample,
        };

        let normalize = Normalize::new(self.modality, self.window);
        let sample = PairedSample {
            image: normalize.apply(&sample.image),
            mask: sample.mask,
        };

        let resize = Resize::new(self.size.clone(), &self.interpolation)
            .context(InterpolationSnafu)?;
        let output = resize.apply(&sample).context(SpatialResizeSnafu)?;

        debug_assert_eq!(output.image.spatial_shape(), self.size.as_slice());
        debug_assert_eq!(output.mask.spatial_shape(), self.size.as_slice());
        #[cfg(debug_assertions)]
        debug_assert!(
            output.mask.label_set().is_subset(&input_labels),
            "nearest-neighbor remapping must not invent labels"
        );

        Ok(output)
    }
}
