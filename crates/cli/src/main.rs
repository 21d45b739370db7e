//! geokrig CLI - variogram fitting and kriging interpolation of point data

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use geokrig_algorithms::kriging::{
    interpolate, CrossValidation, CrossValidationSummary, ErrorMeasure, KrigingOutput,
    KrigingSettings, KrigingVariant, OrdinaryKriging, SimpleKriging, UniversalKriging,
};
use geokrig_algorithms::points::WorkingPoints;
use geokrig_algorithms::search::SearchDirection;
use geokrig_algorithms::variogram::{VariogramFitSession, VariogramSettings};
use geokrig_core::io::{read_geotiff, write_geotiff};
use geokrig_core::prelude::*;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geokrig")]
#[command(author, version, about = "Variogram fitting and kriging interpolation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the empirical variogram and fit a model
    Variogram {
        #[command(flatten)]
        input: PointArgs,
        #[command(flatten)]
        variogram: VariogramArgs,
    },
    /// Interpolate points onto a grid
    Krige(KrigeArgs),
}

/// Point layer options
#[derive(Args)]
struct PointArgs {
    /// Delimited text file with a header row
    points: PathBuf,
    /// Attribute column to interpolate
    #[arg(short, long)]
    field: String,
    /// X coordinate column
    #[arg(long, default_value = "x")]
    x: String,
    /// Y coordinate column
    #[arg(long, default_value = "y")]
    y: String,
    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// Work on ln(1 + v - min) instead of the raw values
    #[arg(long)]
    log: bool,
}

/// Variogram options; unset values keep the configured or suggested ones
#[derive(Args)]
struct VariogramArgs {
    /// Number of lag classes
    #[arg(long)]
    lag_classes: Option<usize>,
    /// Maximum pair distance
    #[arg(long)]
    max_distance: Option<f64>,
    /// Pair sampling stride
    #[arg(long)]
    skip: Option<usize>,
    /// Model family (linear, spherical, ...) or formula in x
    #[arg(short, long)]
    model: Option<String>,
    /// Only fit classes up to this distance
    #[arg(long)]
    fitting_range: Option<f64>,
}

#[derive(Args)]
struct KrigeArgs {
    #[command(flatten)]
    input: PointArgs,
    /// Output prediction raster
    output: PathBuf,
    /// Output error raster
    #[arg(short, long)]
    error: Option<PathBuf>,
    /// JSON settings file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Kriging method: simple, ordinary, universal
    #[arg(long, default_value = "ordinary")]
    method: String,
    /// Known mean for simple kriging (default: sample mean)
    #[arg(long)]
    mean: Option<f64>,
    /// Covariate raster for universal kriging (repeatable)
    #[arg(long)]
    covariate: Vec<PathBuf>,
    /// Use the x and y coordinates as drift terms
    #[arg(long)]
    coordinate_drift: bool,
    /// Covariate sampling: nearest, bilinear, bicubic, bspline
    #[arg(long, default_value = "bspline")]
    resampling: String,
    /// Output cell size
    #[arg(short, long)]
    cell_size: Option<f64>,
    /// Block edge length for block kriging
    #[arg(long)]
    block: Option<f64>,
    /// Error measure: stddev, variance
    #[arg(long)]
    error_measure: Option<String>,
    #[command(flatten)]
    variogram: VariogramArgs,
    /// Minimum neighbours for a prediction
    #[arg(long)]
    min_points: Option<usize>,
    /// Maximum neighbours, 0 for all points
    #[arg(long)]
    max_points: Option<usize>,
    /// Search radius
    #[arg(long)]
    radius: Option<f64>,
    /// Search each quadrant separately
    #[arg(long)]
    quadrants: bool,
    /// Cross-validation: none, loo, 2-fold, k-fold
    #[arg(long)]
    cv: Option<String>,
    /// Number of folds for k-fold
    #[arg(long, default_value = "10")]
    cv_folds: usize,
    /// Refit the variogram for every training set
    #[arg(long)]
    cv_refit: bool,
    /// Leave-one-out residuals as CSV
    #[arg(long)]
    cv_residuals: Option<PathBuf>,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn progress_bar(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=> "),
    );
    pb.set_message(msg.to_string());
    Ok(pb)
}

/// Read a delimited point file into a feature collection.
///
/// Records without parseable coordinates get no geometry; attribute cells
/// that are empty or not numbers become nulls.
fn read_points(args: &PointArgs) -> Result<FeatureCollection> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(u8::try_from(args.delimiter).context("delimiter must be a single byte")?)
        .trim(csv::Trim::All)
        .from_path(&args.points)
        .with_context(|| format!("Failed to open {}", args.points.display()))?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("Column '{}' not found in {}", name, args.points.display()))
    };
    let (xi, yi, fi) = (column(&args.x)?, column(&args.y)?, column(&args.field)?);

    let mut layer = FeatureCollection::new();
    for record in reader.records() {
        let record = record.context("Failed to read point record")?;
        let number = |i: usize| record.get(i).and_then(|s| s.parse::<f64>().ok());
        let mut feature = match (number(xi), number(yi)) {
            (Some(x), Some(y)) => Feature::point(x, y),
            _ => Feature {
                geometry: None,
                properties: Default::default(),
            },
        };
        let value = number(fi).map_or(AttributeValue::Null, AttributeValue::Float);
        feature.set_property(args.field.clone(), value);
        layer.push(feature);
    }
    Ok(layer)
}

fn load_points(args: &PointArgs) -> Result<WorkingPoints> {
    let pb = spinner("Reading points...")?;
    let layer = read_points(args)?;
    pb.finish_and_clear();
    let points = WorkingPoints::from_source(&layer, &args.field, args.log)
        .with_context(|| format!("No usable values in field '{}'", args.field))?;
    info!(
        "Points: {} usable, {} skipped",
        points.len(),
        points.skipped()
    );
    Ok(points)
}

fn apply_variogram_args(settings: &mut VariogramSettings, args: &VariogramArgs) {
    if let Some(n) = args.lag_classes {
        settings.lag_classes = n;
    }
    if let Some(d) = args.max_distance {
        settings.max_distance = Some(d);
    }
    if let Some(s) = args.skip {
        settings.skip = s;
    }
    if let Some(m) = &args.model {
        settings.model = m.clone();
    }
    if let Some(r) = args.fitting_range {
        settings.fitting_range = Some(r);
    }
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...")?;
    write_geotiff(raster, path).with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn print_variogram(session: &VariogramFitSession) {
    println!("{:>6} {:>14} {:>8} {:>14} {:>14} {:>14}", "class", "distance", "pairs", "semivariance", "cumulative", "model");
    for c in &session.empirical().classes {
        println!(
            "{:>6} {:>14.6} {:>8} {:>14.6} {:>14.6} {:>14.6}",
            c.class,
            c.distance,
            c.count,
            c.semivariance,
            c.cumulative,
            session.model().evaluate(c.distance)
        );
    }
    println!();
    println!("{}", session.summary());
    if !session.model().is_monotonic_non_negative() {
        println!("Warning: the model is not monotonically increasing or becomes negative");
    }
}

fn print_cross_validation(cv: &CrossValidationSummary) {
    println!("\nCross-validation ({:?}):", cv.method);
    println!("  Samples: {}", cv.samples);
    if cv.folds_failed > 0 || cv.predictions_failed > 0 {
        println!(
            "  Failed: {} trainings, {} predictions",
            cv.folds_failed, cv.predictions_failed
        );
    }
    println!("  MSE: {:.6}", cv.mse);
    println!("  RMSE: {:.6}", cv.rmse);
    println!("  NRMSE: {:.2}%", cv.nrmse);
    println!("  R²: {:.2}%", cv.r2);
}

fn write_residuals(cv: &CrossValidationSummary, path: &Path) -> Result<()> {
    if cv.residuals.is_empty() {
        warn!("Residuals are only recorded for leave-one-out; {} not written", path.display());
        return Ok(());
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for r in &cv.residuals {
        writer.serialize(r)?;
    }
    writer.flush()?;
    Ok(())
}

fn settings_for(args: &KrigeArgs, points: &WorkingPoints) -> Result<KrigingSettings> {
    let mut settings = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        }
        None => KrigingSettings {
            variogram: VariogramSettings::suggest(points.points()),
            ..Default::default()
        },
    };

    apply_variogram_args(&mut settings.variogram, &args.variogram);
    if let Some(n) = args.min_points {
        settings.search.min_points = n;
    }
    if let Some(n) = args.max_points {
        settings.search.max_points = n;
    }
    if let Some(r) = args.radius {
        settings.search.max_radius = Some(r);
    }
    if args.quadrants {
        settings.search.direction = SearchDirection::Quadrants;
    }
    if let Some(c) = args.cell_size {
        settings.cell_size = Some(c);
        settings.grid = None;
    }
    if args.block.is_some() {
        settings.block_size = args.block;
    }
    if let Some(m) = &args.error_measure {
        settings.error_measure = m.parse::<ErrorMeasure>()?;
    }
    settings.compute_error = args.error.is_some();
    if let Some(cv) = &args.cv {
        settings.cross_validation = CrossValidation::from_name(cv, args.cv_folds)?;
    }
    if args.cv_refit {
        settings.cv_refit = true;
    }
    Ok(settings)
}

fn run<V: KrigingVariant>(
    points: &WorkingPoints,
    variant: V,
    settings: &KrigingSettings,
) -> Result<KrigingOutput> {
    let pb = progress_bar("Kriging")?;
    let progress = |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
        true
    };
    let output = interpolate(points, variant, settings, &progress)?;
    pb.finish_and_clear();
    Ok(output)
}

fn krige(args: KrigeArgs) -> Result<()> {
    let points = load_points(&args.input)?;
    let settings = settings_for(&args, &points)?;

    let start = Instant::now();
    let mut output = match args.method.to_lowercase().as_str() {
        "simple" | "sk" => {
            let variant = match args.mean {
                Some(m) => SimpleKriging::with_mean(m),
                None => SimpleKriging::new(),
            };
            run(&points, variant, &settings)?
        }
        "ordinary" | "ok" => run(&points, OrdinaryKriging, &settings)?,
        "universal" | "uk" => {
            if args.covariate.is_empty() && !args.coordinate_drift {
                bail!("universal kriging needs --covariate grids or --coordinate-drift");
            }
            let covariates = args
                .covariate
                .iter()
                .map(|path| {
                    read_geotiff(path)
                        .map(Arc::new)
                        .with_context(|| format!("Failed to read covariate {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let variant = UniversalKriging::new(covariates)
                .with_resampling(args.resampling.parse::<Resampling>()?)
                .with_coordinates(args.coordinate_drift);
            run(&points, variant, &settings)?
        }
        other => bail!("Unknown method: {} (expected simple, ordinary or universal)", other),
    };
    let elapsed = start.elapsed();

    if let Some(t) = points.log_transform() {
        output
            .prediction
            .data_mut()
            .mapv_inplace(|v| if v.is_finite() { t.inverse(v) } else { v });
    }

    println!("{}", output.session.summary());
    let (rows, cols) = output.prediction.shape();
    println!("\nGrid: {} x {} ({} cells, {} no-data)", cols, rows, rows * cols, output.failed);

    write_result(&output.prediction, &args.output)?;
    println!("Prediction saved to: {}", args.output.display());
    if let (Some(raster), Some(path)) = (&output.error, &args.error) {
        write_result(raster, path)?;
        println!("Error ({}) saved to: {}", settings.error_measure, path.display());
    }

    if let Some(cv) = &output.cross_validation {
        print_cross_validation(cv);
        if let Some(path) = &args.cv_residuals {
            write_residuals(cv, path)?;
        }
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Variogram { input, variogram } => {
            let points = load_points(&input)?;
            let mut settings = VariogramSettings::suggest(points.points());
            apply_variogram_args(&mut settings, &variogram);

            let start = Instant::now();
            let pb = progress_bar("Variogram")?;
            let progress = |done: usize, total: usize| {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
                true
            };
            let session = VariogramFitSession::fit(points.points(), &settings, &progress)?;
            pb.finish_and_clear();

            print_variogram(&session);
            println!("  Processing time: {:.2?}", start.elapsed());
        }
        Commands::Krige(args) => krige(args)?,
    }

    Ok(())
}
