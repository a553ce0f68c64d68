use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::Parser;
use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use rayon::prelude::*;
use snafu::{Report, ResultExt, Snafu, Whatever};
use tracing::{error, Level};

use seg_preprocessing::load::{load_pair, read_manifest, LoadError, ManifestEntry};
use seg_preprocessing::preprocess::{PreprocessError, Preprocessor};
use seg_preprocessing::save::{PairSaver, SaveError};
use seg_preprocessing::transform::{Interpolation, InterpolationPolicy, Modality, Orientation, Window};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("No samples found in manifest: {}", path.display()))]
    NoSamples { path: PathBuf },

    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Load error on {}: {}", path.display(), source))]
    Load {
        path: PathBuf,
        #[snafu(source(from(LoadError, Box::new)))]
        source: Box<LoadError>,
    },

    #[snafu(display("Preprocessing error on {}: {}", path.display(), source))]
    Preprocess {
        path: PathBuf,
        #[snafu(source(from(PreprocessError, Box::new)))]
        source: Box<PreprocessError>,
    },

    #[snafu(display("Save error on {}: {}", path.display(), source))]
    Save {
        path: PathBuf,
        #[snafu(source(from(SaveError, Box::new)))]
        source: Box<SaveError>,
    },
}

// Newtypes keep clap from treating the comma-separated tuples as
// multi-value arguments.
#[derive(Debug, Clone)]
struct SizeArg(Vec<usize>);

#[derive(Debug, Clone)]
struct SpacingArg(Vec<f64>);

fn parse_size(value: &str) -> Result<SizeArg, clap::Error> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid size"))?;
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|&extent| extent == 0) {
        return Err(clap::Error::raw(
            ErrorKind::InvalidValue,
            "Size must be 2 or 3 positive extents, e.g. 256,256",
        ));
    }
    Ok(SizeArg(parts))
}

fn parse_spacing(value: &str) -> Result<SpacingArg, clap::Error> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid spacing"))?;
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|&spacing| spacing <= 0.0) {
        return Err(clap::Error::raw(
            ErrorKind::InvalidValue,
            "Spacing must be 2 or 3 positive values, e.g. 1.0,1.0,1.0",
        ));
    }
    Ok(SpacingArg(parts))
}

fn parse_window(value: &str) -> Result<Window, clap::Error> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() == 2 {
        let min_hu = parts[0]
            .trim()
            .parse::<f32>()
            .map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid window minimum"))?;
        let max_hu = parts[1]
            .trim()
            .parse::<f32>()
            .map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid window maximum"))?;
        if min_hu >= max_hu {
            return Err(clap::Error::raw(
                ErrorKind::InvalidValue,
                "Window minimum must be below the maximum",
            ));
        }
        Ok(Window::new(min_hu, max_hu))
    } else {
        Err(clap::Error::raw(
            ErrorKind::InvalidValue,
            "Window must be in the format min,max",
        ))
    }
}

fn parse_orientation(value: &str) -> Result<Orientation, clap::Error> {
    value
        .parse::<Orientation>()
        .map_err(|e| clap::Error::raw(ErrorKind::InvalidValue, e.to_string()))
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Preprocess image/mask pairs for segmentation training", long_about = None)]
struct Args {
    #[arg(
        help = "Source path. A CSV manifest with 'image' and 'mask' columns, or a single image file when --mask is given"
    )]
    source: PathBuf,

    #[arg(help = "Output directory for the prepared TIFF pairs")]
    output: PathBuf,

    #[arg(
        help = "Mask path for single-pair mode",
        long = "mask",
        short = 'k'
    )]
    mask: Option<PathBuf>,

    #[arg(
        help = "Acquisition modality of the image tensors",
        long = "modality",
        short = 'm',
        value_parser = clap::value_parser!(Modality),
        default_value = "mri"
    )]
    modality: Modality,

    #[arg(
        help = "Target size (2 or 3 extents, e.g. 256,256)",
        long = "size",
        short = 's',
        value_parser = clap::builder::ValueParser::new(parse_size),
        default_value = "256,256"
    )]
    size: SizeArg,

    #[arg(
        help = "Target physical spacing per axis (e.g. 1.0,1.0,1.0)",
        long = "spacing",
        value_parser = clap::builder::ValueParser::new(parse_spacing)
    )]
    spacing: Option<SpacingArg>,

    #[arg(
        help = "Target anatomical orientation code (e.g. RAS)",
        long = "orientation",
        value_parser = clap::builder::ValueParser::new(parse_orientation)
    )]
    orientation: Option<Orientation>,

    #[arg(
        help = "CT Hounsfield window (min,max); only consulted for CT",
        long = "window",
        short = 'w',
        value_parser = clap::builder::ValueParser::new(parse_window),
        default_value = "-1000,400",
        allow_hyphen_values = true
    )]
    window: Window,

    #[arg(
        help = "Interpolation kernel for the image tensor",
        long = "image-interp",
        value_parser = clap::value_parser!(Interpolation),
        default_value_t = Interpolation::default(),
    )]
    image_interp: Interpolation,

    #[arg(
        help = "Fail on the first sample that cannot be processed",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,
}

fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::ERROR)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn output_paths(entry: &ManifestEntry, dest: &Path) -> (PathBuf, PathBuf) {
    let stem = entry
        .image
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sample".to_string());
    (
        dest.join(format!("{stem}.tiff")),
        dest.join(format!("{stem}_mask.tiff")),
    )
}

fn process(entry: &ManifestEntry, dest: &Path, preprocessor: &Preprocessor) -> Result<(), Error> {
    let sample = load_pair(&entry.image, &entry.mask).context(LoadSnafu {
        path: entry.image.clone(),
    })?;

    let prepared = preprocessor.prepare(&sample).context(PreprocessSnafu {
        path: entry.image.clone(),
    })?;

    let (image_path, mask_path) = output_paths(entry, dest);
    tracing::info!(
        "Processing {} -> {}",
        entry.image.display(),
        image_path.display()
    );
    PairSaver::new()
        .save_pair(&prepared, &image_path, &mask_path)
        .context(SaveSnafu { path: image_path })?;

    Ok(())
}

fn run(args: Args) -> Result<(), Error> {
    // Parse the sources
    let entries = match (&args.mask, args.source.extension()) {
        (Some(mask), _) => vec![ManifestEntry {
            image: args.source.clone(),
            mask: mask.clone(),
        }],
        (None, Some(extension)) if extension == "csv" => {
            read_manifest(&args.source).context(LoadSnafu {
                path: args.source.clone(),
            })?
        }
        _ => {
            return InvalidSourcePathSnafu {
                path: args.source.clone(),
            }
            .fail()
        }
    };
    if entries.is_empty() {
        return NoSamplesSnafu { path: args.source }.fail();
    }
    tracing::info!("Number of samples found: {}", entries.len());

    // Validate the output path
    if !args.output.exists() {
        std::fs::create_dir_all(&args.output).context(CreateDirSnafu {
            path: args.output.clone(),
        })?;
    } else if !args.output.is_dir() {
        return InvalidOutputPathSnafu { path: args.output }.fail();
    }

    // Build the preprocessor
    let preprocessor = Preprocessor {
        modality: args.modality,
        window: args.window,
        size: args.size.0,
        spacing: args.spacing.map(|spacing| spacing.0),
        orientation: args.orientation,
        interpolation: InterpolationPolicy {
            image: args.image_interp,
            ..InterpolationPolicy::default()
        },
    };

    // Create progress bar
    let pb = ProgressBar::new(entries.len() as u64).with_finish(ProgressFinish::AndLeave);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec})",
            )
            .unwrap(),
    );
    pb.set_message("Preprocessing samples");

    // Define function to process each sample in parallel
    let par_func = |entry: ManifestEntry| {
        let result = process(&entry, &args.output, &preprocessor);
        pb.inc(1);
        match result {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(
                    "Error processing sample {}: {}",
                    entry.image.display(),
                    Report::from_error(&e)
                );
                Err(e)
            }
        }
    };

    // Run processing in parallel
    if args.strict {
        // In strict mode, abort on first error
        entries.into_par_iter().try_for_each(par_func)?;
    } else {
        // In non-strict mode, only log errors and continue
        entries.into_par_iter().map(par_func).collect::<Vec<_>>();
    }

    Ok(())
}
