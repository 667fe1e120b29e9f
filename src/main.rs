use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use rust_gpx_tracker::fix::MPS_TO_MPH;
use rust_gpx_tracker::gpx_codec::{self, to_gpx_string};
use rust_gpx_tracker::pipeline::{elevation_chart, speed_chart};
use rust_gpx_tracker::track_stats::calculate_stats_with_idle_speed;
use rust_gpx_tracker::track_analysis::{
    derived_speeds, interpolate_track, returns_to_start, DEFAULT_INTERPOLATION_SECONDS,
    DEFAULT_LOOP_RADIUS_M, DEFAULT_LOOP_SKIP_POINTS,
};
use rust_gpx_tracker::{
    ChartConfig, LivePipeline, PipelineConfig, StatsSource, VelocityBucket,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "GPS track smoothing, classification and trip statistics", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trip statistics for GPX files or folders of GPX files
    Stats(StatsArgs),
    /// Feed a GPX track through the live pipeline fix by fix
    Replay(ReplayArgs),
    /// Fill time gaps with linearly interpolated points
    Interpolate(InterpolateArgs),
    /// List the points where a track comes back to its start
    Loops(LoopsArgs),
}

#[derive(Parser, Debug)]
struct StatsArgs {
    /// GPX files or directories to scan
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Report distance in km and speeds in km/h
    #[arg(long, action = ArgAction::SetTrue)]
    metric: bool,

    /// Compute statistics on pipeline-smoothed fixes instead of raw ones
    #[arg(long, action = ArgAction::SetTrue)]
    smoothed: bool,

    /// Pipeline configuration JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Output CSV path
    #[arg(short, long, default_value = "track_stats.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Pipeline configuration JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Record the replayed fixes to this GPX file
    #[arg(long, value_hint = ValueHint::FilePath)]
    record: Option<PathBuf>,

    /// Per-fix output CSV path
    #[arg(short, long, default_value = "replay.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct InterpolateArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Maximum spacing between points, in seconds
    #[arg(long, default_value_t = DEFAULT_INTERPOLATION_SECONDS)]
    interval: i64,

    /// Output GPX path (stdout when omitted)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct LoopsArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Distance from the start that counts as a return, in meters
    #[arg(long, default_value_t = DEFAULT_LOOP_RADIUS_M)]
    radius: f64,

    /// Leading points to ignore
    #[arg(long, default_value_t = DEFAULT_LOOP_SKIP_POINTS)]
    skip: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Stats(args) => handle_stats(args),
        Command::Replay(args) => handle_replay(args),
        Command::Interpolate(args) => handle_interpolate(args),
        Command::Loops(args) => handle_loops(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn collect_gpx_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut gpx_files = Vec::new();
    for input in inputs {
        for entry in WalkDir::new(input) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_gpx = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("gpx"))
                .unwrap_or(false);
            if is_gpx {
                gpx_files.push(entry.path().to_path_buf());
            }
        }
    }
    gpx_files.sort();
    Ok(gpx_files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Serialize, Default)]
struct StatsRow {
    filename: String,
    points: usize,
    vertical_feet_up: f64,
    vertical_feet_down: f64,
    horizontal_distance: f64,
    avg_uphill_pace: f64,
    avg_downhill_pace: f64,
    num_uphill_segments: u32,
    num_downhill_segments: u32,
    moving_time_seconds: f64,
    status: String,
}

fn summarize_file(path: &Path, config: &PipelineConfig, smoothed: bool) -> Result<StatsRow> {
    let fixes = gpx_codec::read_file(path).with_context(|| format!("reading {}", path.display()))?;

    let stats = if smoothed {
        let mut pipeline = LivePipeline::new(config.clone())?;
        for fix in &fixes {
            pipeline.process_fix(*fix);
        }
        pipeline.stats(StatsSource::Smoothed)
    } else {
        calculate_stats_with_idle_speed(
            &fixes,
            config.use_metric,
            config.thresholds.idle_cutoff_mph(),
        )
    };

    Ok(StatsRow {
        filename: file_name(path),
        points: fixes.len(),
        vertical_feet_up: stats.vertical_feet_up,
        vertical_feet_down: stats.vertical_feet_down,
        horizontal_distance: stats.horizontal_distance,
        avg_uphill_pace: stats.avg_uphill_pace,
        avg_downhill_pace: stats.avg_downhill_pace,
        num_uphill_segments: stats.num_uphill_segments,
        num_downhill_segments: stats.num_downhill_segments,
        moving_time_seconds: stats.moving_time_seconds,
        status: "OK".to_string(),
    })
}

fn handle_stats(args: StatsArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.use_metric = config.use_metric || args.metric;

    let gpx_files = collect_gpx_files(&args.inputs)?;
    if gpx_files.is_empty() {
        return Err(anyhow!("no GPX files found in the given inputs"));
    }

    info!(
        files = gpx_files.len(),
        cores = num_cpus::get(),
        "summarizing tracks"
    );

    let rows: Vec<StatsRow> = gpx_files
        .par_iter()
        .map(|path| {
            summarize_file(path, &config, args.smoothed).unwrap_or_else(|e| {
                warn!(file = %path.display(), error = %e, "skipping track");
                StatsRow {
                    filename: file_name(path),
                    status: format!("ERROR: {:#}", e),
                    ..StatsRow::default()
                }
            })
        })
        .collect();

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let (distance_unit, speed_unit) = if config.use_metric { ("km", "km/h") } else { ("mi", "mph") };
    let ok: Vec<&StatsRow> = rows.iter().filter(|r| r.status == "OK").collect();

    println!("\n🏔️  TRACK STATISTICS");
    println!("===================");
    for row in &ok {
        println!(
            "📍 {}: {:.2} {} | ⬆️ {:.0} ft ⬇️ {:.0} ft | moving {:.0} min | up {:.1} {} down {:.1} {}",
            row.filename,
            row.horizontal_distance,
            distance_unit,
            row.vertical_feet_up,
            row.vertical_feet_down,
            row.moving_time_seconds / 60.0,
            row.avg_uphill_pace,
            speed_unit,
            row.avg_downhill_pace,
            speed_unit
        );
    }
    println!(
        "\n✅ {} processed, ❌ {} failed. Results saved to {}",
        ok.len(),
        rows.len() - ok.len(),
        args.output.display()
    );

    Ok(())
}

#[derive(Debug, Serialize)]
struct ReplayRow {
    index: usize,
    timestamp: DateTime<Utc>,
    raw_speed_mph: Option<f64>,
    smoothed_speed_mph: f64,
    raw_altitude_m: f64,
    smoothed_altitude_m: f64,
    bucket: VelocityBucket,
    interpolation: f64,
    chart_speed_mph: Option<f64>,
    chart_altitude_m: Option<f64>,
}

fn handle_replay(args: ReplayArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.use_metric = false;

    let fixes = gpx_codec::read_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut pipeline = LivePipeline::new(config)?;
    if let Some(record) = &args.record {
        pipeline
            .start_recording(record)
            .with_context(|| format!("creating {}", record.display()))?;
    }

    let chart = ChartConfig::default();
    let chart_speeds = speed_chart(&fixes, false, &chart);
    let chart_altitudes = elevation_chart(&fixes, &chart);
    let raw_speeds = derived_speeds(&fixes);

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut write_failures = 0;

    for (index, fix) in fixes.iter().enumerate() {
        let out = pipeline.process_fix(*fix);
        if out.write_error.is_some() {
            write_failures += 1;
        }

        writer.serialize(ReplayRow {
            index,
            timestamp: fix.timestamp,
            raw_speed_mph: fix.speed.or(raw_speeds[index]).map(|s| s * MPS_TO_MPH),
            smoothed_speed_mph: out.smoothed_speed_mph,
            raw_altitude_m: fix.altitude,
            smoothed_altitude_m: out.smoothed_fix.altitude,
            bucket: out.classification.bucket,
            interpolation: out.classification.interpolation,
            chart_speed_mph: chart_speeds[index],
            chart_altitude_m: chart_altitudes[index],
        })?;
    }
    writer.flush()?;
    pipeline.finish()?;

    let raw = pipeline.stats(StatsSource::Raw);
    let smoothed = pipeline.stats(StatsSource::Smoothed);

    println!("\n🎿 REPLAY: {}", file_name(&args.input));
    println!("================================");
    println!("   Fixes: {}", fixes.len());
    println!(
        "   Raw:      ⬆️ {:.0} ft ⬇️ {:.0} ft, {:.2} mi",
        raw.vertical_feet_up, raw.vertical_feet_down, raw.horizontal_distance
    );
    println!(
        "   Smoothed: ⬆️ {:.0} ft ⬇️ {:.0} ft, {:.2} mi",
        smoothed.vertical_feet_up, smoothed.vertical_feet_down, smoothed.horizontal_distance
    );
    if write_failures > 0 {
        println!("   ⚠️  {} fixes could not be recorded", write_failures);
    }
    println!("✅ Per-fix results saved to {}", args.output.display());

    Ok(())
}

fn handle_interpolate(args: InterpolateArgs) -> Result<()> {
    let fixes = gpx_codec::read_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let interpolated = interpolate_track(&fixes, Duration::seconds(args.interval))?;

    info!(
        original = fixes.len(),
        interpolated = interpolated.len(),
        "interpolated {}",
        args.input.display()
    );

    let gpx = to_gpx_string(&interpolated, &PipelineConfig::default().creator);
    match &args.output {
        Some(path) => {
            fs::write(path, gpx).with_context(|| format!("writing {}", path.display()))?
        }
        None => print!("{}", gpx),
    }

    Ok(())
}

fn handle_loops(args: LoopsArgs) -> Result<()> {
    let fixes = gpx_codec::read_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let (Some(first), Some(last)) = (fixes.first(), fixes.last()) else {
        println!("No points in {}", args.input.display());
        return Ok(());
    };

    let returns = returns_to_start(&fixes, args.radius, args.skip);

    println!("\n🔁 LOOP ANALYSIS: {}", file_name(&args.input));
    println!("================================");
    println!("   Points: {}", fixes.len());
    println!("   Duration: {:.1} min", last.seconds_since(first) / 60.0);
    println!("   Start to end: {:.1} m", first.distance_to(last));
    println!("\n=== Points within {:.0}m of start ===", args.radius);
    for r in &returns {
        println!(
            "   Point {:4}: {:5.1} m from start (at {:.1} min)",
            r.index,
            r.distance_m,
            r.seconds_since_start / 60.0
        );
    }
    println!("\n   Times returned to start: {}", returns.len());

    Ok(())
}
