use snafu::Snafu;
use std::fmt;
use std::str::FromStr;

use crate::sample::Volume;
use crate::transform::Transform;

/// Stabilizer for the z-score denominator on (near-)constant volumes.
pub const STD_EPSILON: f32 = 1e-8;

pub const DEFAULT_WINDOW_MIN_HU: f32 = -1000.0;
pub const DEFAULT_WINDOW_MAX_HU: f32 = 400.0;

#[derive(Debug, Snafu)]
#[snafu(display("unsupported modality '{}', expected one of: MRI, CT", value))]
pub struct UnsupportedModalityError {
    pub value: String,
}

/// The imaging technique that produced a volume.
///
/// Closed enumeration; adding a modality means adding a variant and a
/// normalization branch. Free-form strings are validated at the parse
/// boundary instead of being compared in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Modality {
    Mri,
    Ct,
}

impl FromStr for Modality {
    type Err = UnsupportedModalityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "MRI" => Ok(Modality::Mri),
            "CT" => Ok(Modality::Ct),
            _ => UnsupportedModalitySnafu { value }.fail(),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modality_str = match self {
            Modality::Mri => "MRI",
            Modality::Ct => "CT",
        };
        write!(f, "{modality_str}")
    }
}

/// Hounsfield-unit clipping bounds for CT intensity rescaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub min_hu: f32,
    pub max_hu: f32,
}

impl Default for Window {
    fn default() -> Self {
        Window {
            min_hu: DEFAULT_WINDOW_MIN_HU,
            max_hu: DEFAULT_WINDOW_MAX_HU,
        }
    }
}

impl Window {
    pub fn new(min_hu: f32, max_hu: f32) -> Self {
        Window { min_hu, max_hu }
    }

    pub fn width(&self) -> f32 {
        self.max_hu - self.min_hu
    }
}

impl From<(f32, f32)> for Window {
    fn from((min_hu, max_hu): (f32, f32)) -> Self {
        Window::new(min_hu, max_hu)
    }
}

/// Modality-specific intensity normalization for the image tensor.
///
/// MRI volumes are standardized to zero mean and unit variance using
/// statistics computed over the sample's full tensor. CT volumes are
/// clipped to the Hounsfield window and linearly rescaled to [0, 1]. The
/// mask never passes through this stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub modality: Modality,
    pub window: Window,
}

impl Normalize {
    pub fn new(modality: Modality, window: Window) -> Self {
        Normalize { modality, window }
    }
}

impl Transform<Volume> for Normalize {
    fn apply(&self, target: &Volume) -> Volume {
        let data = match self.modality {
            Modality::Mri => {
                let mean = target.data.mean().unwrap_or(0.0);
                let std = target.data.std(0.0);
                target.data.mapv(|value| (value - mean) / (std + STD_EPSILON))
            }
            Modality::Ct => {
                let Window { min_hu, max_hu } = self.window;
                let width = self.window.width();
                target
                    .data
                    .mapv(|value| (value.clamp(min_hu, max_hu) - min_hu) / width)
            }
        };
        Volume {
            data,
            spacing: target.spacing.clone(),
            orientation: target.orientation,
            channel_first: target.channel_first,
        }
    }
}
