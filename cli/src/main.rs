//! pmstereo — dense stereo matching with slanted support windows.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use log::info;

use pm_core::{OutOfBounds, Params};
use pm_stereo::{init_thread_pool, DisparityMap, PatchMatcher};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser, Debug)]
#[command(name = "pmstereo")]
#[command(version)]
#[command(about = "Dense disparity maps for a rectified stereo pair \
                   (PatchMatch with slanted support windows)")]
struct Cli {
    /// Left and right input images (PNG or JPEG).
    #[arg(value_name = "IMAGE", num_args = 0..=2)]
    images: Vec<PathBuf>,

    /// Left and right input images; alternative to the positional form.
    #[arg(short = 'I', long = "inputs", num_args = 2, value_name = "IMAGE")]
    inputs: Option<Vec<PathBuf>>,

    /// Base path of the output files; view suffixes are inserted before
    /// the extension.
    #[arg(short = 'o', long = "output", default_value = "disparity.png")]
    output: PathBuf,

    /// Log verbosity, 0 (silent) to 3.
    #[arg(short = 'l', long = "log", default_value_t = 1,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    log_level: u8,

    /// Balance between the color term (0) and the gradient term (1).
    #[arg(long = "alfa", default_value_t = 0.5)]
    alfa: f64,

    /// Truncation of the color difference.
    #[arg(long = "tau_col", default_value_t = 60.0)]
    tau_col: f64,

    /// Truncation of the gradient difference.
    #[arg(long = "tau_grad", default_value_t = 30.0)]
    tau_grad: f64,

    /// Falloff of the adaptive support weights.
    #[arg(long = "gamma", default_value_t = 15.0)]
    gamma: f64,

    /// Side of the square support window; must be odd.
    #[arg(short = 'w', long = "window_size", default_value_t = 35)]
    window_size: u32,

    /// Minimum disparity.
    #[arg(short = 'm', long = "min_d", default_value_t = 0, allow_hyphen_values = true)]
    min_d: i32,

    /// Maximum disparity; must be positive and exceed the minimum.
    #[arg(short = 'M', long = "max_d", default_value_t = 70)]
    max_d: i32,

    /// Number of optimization sweeps.
    #[arg(short = 'i', long = "iteration", default_value_t = 3)]
    iterations: u32,

    /// Plane slope cap in degrees.
    #[arg(long = "max_slope", default_value_t = 45.0)]
    max_slope: f64,

    /// Rescale the gradient maps to unit maximum magnitude.
    #[arg(long = "normalize_gradients", default_value_t = true,
          num_args = 0..=1, default_missing_value = "true",
          action = clap::ArgAction::Set)]
    normalize_gradients: bool,

    /// Out-of-bounds policy: repeat, black, zero, error or nan.
    #[arg(long = "out_of_bounds", default_value = "nan")]
    out_of_bounds: OutOfBounds,

    /// Shrink the support window for steep planes.
    #[arg(long = "resize_window", default_value_t = true,
          num_args = 0..=1, default_missing_value = "true",
          action = clap::ArgAction::Set)]
    resize_windows: bool,

    /// Clamp every evaluated disparity into the configured range.
    #[arg(long = "planes_saturation", default_value_t = true,
          num_args = 0..=1, default_missing_value = "true",
          action = clap::ArgAction::Set)]
    planes_saturation: bool,

    /// Derive all random draws from a fixed seed (repeatable runs).
    #[arg(long = "use_pseudorand", default_value_t = false,
          num_args = 0..=1, default_missing_value = "true",
          action = clap::ArgAction::Set)]
    use_pseudorand: bool,

    /// Restrict planes to fronto-parallel (constant disparity).
    #[arg(long = "const_disparities", default_value_t = false,
          num_args = 0..=1, default_missing_value = "true",
          action = clap::ArgAction::Set)]
    const_disparities: bool,
}

impl Cli {
    fn params(&self) -> Params {
        Params {
            alfa: self.alfa,
            tau_col: self.tau_col,
            tau_grad: self.tau_grad,
            gamma: self.gamma,
            window_size: self.window_size,
            min_d: self.min_d,
            max_d: self.max_d,
            iterations: self.iterations,
            max_slope: self.max_slope,
            normalize_gradients: self.normalize_gradients,
            out_of_bounds: self.out_of_bounds,
            resize_windows: self.resize_windows,
            planes_saturation: self.planes_saturation,
            use_pseudorand: self.use_pseudorand,
            const_disparities: self.const_disparities,
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(1),
                _ => ExitCode::from(2),
            };
        }
    };

    init_logger(cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn init_logger(level: u8) {
    let filter = match level {
        0 => "off",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn run(cli: &Cli) -> CliResult<()> {
    let (left_path, right_path) = resolve_inputs(cli)?;

    let params = cli.params();
    params.validate()?;
    init_thread_pool(None)?;

    let left = image::open(&left_path)
        .map_err(|e| format!("failed to read {}: {e}", left_path.display()))?
        .to_rgb8();
    let right = image::open(&right_path)
        .map_err(|e| format!("failed to read {}: {e}", right_path.display()))?
        .to_rgb8();

    info!(
        "matching {} and {}",
        left_path.display(),
        right_path.display()
    );

    let matcher = PatchMatcher::new(params.clone());
    let (left_disp, right_disp) = matcher.compute(&left, &right)?;

    write_outputs(&cli.output, &left_disp, &right_disp, &params)?;
    Ok(())
}

fn resolve_inputs(cli: &Cli) -> CliResult<(PathBuf, PathBuf)> {
    let paths: &[PathBuf] = match &cli.inputs {
        Some(inputs) => inputs,
        None => &cli.images,
    };
    if paths.len() != 2 {
        return Err("need exactly two input images (positional or via --inputs)".into());
    }
    for path in paths {
        if fs::metadata(path).is_err() {
            return Err(format!("input not found: {}", path.display()).into());
        }
    }
    Ok((paths[0].clone(), paths[1].clone()))
}

/// Per-view output paths for an `--output` base of `path/name.ext`:
/// `path/nameL.ext`, `path/nameR.ext` and the matching `.csv` pair.
fn output_paths(base: &Path) -> [(PathBuf, PathBuf); 2] {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "disparity".to_string());
    let ext = base
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    let dir = base.parent().unwrap_or_else(|| Path::new(""));

    let make = |suffix: &str| {
        (
            dir.join(format!("{stem}{suffix}.{ext}")),
            dir.join(format!("{stem}{suffix}.csv")),
        )
    };
    [make("L"), make("R")]
}

fn write_outputs(
    base: &Path,
    left: &DisparityMap,
    right: &DisparityMap,
    params: &Params,
) -> CliResult<()> {
    let nan_invalid = params.out_of_bounds == OutOfBounds::NanCost;
    let [(left_img, left_csv), (right_img, right_csv)] = output_paths(base);

    for (map, img_path, csv_path) in [(left, left_img, left_csv), (right, right_img, right_csv)] {
        map.to_image()
            .save(&img_path)
            .map_err(|e| format!("failed to write {}: {e}", img_path.display()))?;
        map.write_csv_file(&csv_path, nan_invalid)?;
        info!(
            "wrote {} and {} ({:.1}% valid)",
            img_path.display(),
            csv_path.display(),
            map.valid_fraction() * 100.0
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_insert_view_suffixes() {
        let [(l_img, l_csv), (r_img, r_csv)] = output_paths(Path::new("out/depth.png"));
        assert_eq!(l_img, Path::new("out/depthL.png"));
        assert_eq!(l_csv, Path::new("out/depthL.csv"));
        assert_eq!(r_img, Path::new("out/depthR.png"));
        assert_eq!(r_csv, Path::new("out/depthR.csv"));
    }

    #[test]
    fn extensionless_output_defaults_to_png() {
        let [(l_img, _), _] = output_paths(Path::new("disparity"));
        assert_eq!(l_img, Path::new("disparityL.png"));
    }

    #[test]
    fn cli_parses_the_full_flag_surface() {
        let cli = Cli::try_parse_from([
            "pmstereo",
            "left.png",
            "right.png",
            "--alfa",
            "0.7",
            "--tau_col",
            "30",
            "--window_size",
            "21",
            "-m",
            "-5",
            "-M",
            "40",
            "--iteration",
            "5",
            "--out_of_bounds",
            "black",
            "--use_pseudorand",
            "--const_disparities",
            "false",
        ])
        .unwrap();

        let params = cli.params();
        assert_eq!(params.alfa, 0.7);
        assert_eq!(params.tau_col, 30.0);
        assert_eq!(params.window_size, 21);
        assert_eq!(params.min_d, -5);
        assert_eq!(params.max_d, 40);
        assert_eq!(params.iterations, 5);
        assert_eq!(params.out_of_bounds, OutOfBounds::BlackPixel);
        assert!(params.use_pseudorand);
        assert!(!params.const_disparities);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn unknown_policy_token_is_rejected() {
        let res = Cli::try_parse_from(["pmstereo", "l.png", "r.png", "--out_of_bounds", "mirror"]);
        assert!(res.is_err());
    }
}
