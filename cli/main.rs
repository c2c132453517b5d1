#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::process;

use cngender::config::GenderConfig;
use cngender::engine::{check_intensity_files, log_intensity_issues, run_gender_engine};
use cngender::files::{list_intensity_files, read_file_list};

#[derive(Parser)]
#[command(
    name = "cngender",
    about = "Copy-number probe intensity ratio gender calling",
    long_about = "Calls sample gender from the ratio of mean haploid-chromosome (Y or W) \
                 to mean diploid-chromosome (X or Z) probe intensities."
)]
struct Cli {
    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct InputArgs {
    /// Intensity files, or directories holding them
    #[arg(value_name = "INTENSITY_PATH")]
    inputs: Vec<PathBuf>,

    /// Text file with an 'intensity_files' header followed by one path per line
    #[arg(long, value_name = "PATH")]
    file_list: Option<PathBuf>,

    /// Number of threads for the intensity check (defaults to all cores)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

#[derive(Args)]
struct CallArgs {
    #[command(flatten)]
    input: InputArgs,

    /// TOML file with default settings; flags given here take precedence
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Probe file for chromosome X
    #[arg(
        long = "chrX-probes",
        value_name = "PATH",
        conflicts_with_all = ["chr_z_probes", "chr_w_probes"]
    )]
    chr_x_probes: Option<PathBuf>,

    /// Probe file for chromosome Y
    #[arg(
        long = "chrY-probes",
        value_name = "PATH",
        conflicts_with_all = ["chr_z_probes", "chr_w_probes"]
    )]
    chr_y_probes: Option<PathBuf>,

    /// Probe file for chromosome Z (implies --zw)
    #[arg(long = "chrZ-probes", value_name = "PATH")]
    chr_z_probes: Option<PathBuf>,

    /// Probe file for chromosome W (implies --zw)
    #[arg(long = "chrW-probes", value_name = "PATH")]
    chr_w_probes: Option<PathBuf>,

    /// Ratios below this are called female [default: 0.48]
    #[arg(long, value_name = "RATIO")]
    female_thresh: Option<f64>,

    /// Ratios above this are called male [default: 0.71]
    #[arg(long, value_name = "RATIO")]
    male_thresh: Option<f64>,

    /// Use the Z/W convention, where the homogametic sex is male
    #[arg(long)]
    zw: bool,

    /// Scan every intensity file for zero, negative, NaN and infinite values first
    #[arg(long)]
    check_intensities: bool,

    /// Directory for genderCalls.txt and genderMetrics.txt
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Call gender for every intensity file
    #[command(about = "Call gender (outputs: genderCalls.txt, genderMetrics.txt)")]
    Call(CallArgs),

    /// Check intensity files for invalid values without calling gender
    #[command(about = "Check intensity files for invalid values")]
    Check(InputArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    let cli = Cli::parse();
    let Cli { log_level, command } = cli;
    init_logging(&log_level);

    let result = match command {
        Some(Commands::Call(args)) => run_call(args),
        Some(Commands::Check(args)) => run_check(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Warning: Invalid log level '{level}' provided. Defaulting to Info.");
        log::LevelFilter::Info
    });
    env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp_micros()
        .init();
}

fn configure_threads(threads: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(n) = threads {
        info!("Using {n} threads for the intensity check.");
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()?;
    }
    Ok(())
}

fn collect_inputs(args: &InputArgs) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for input in &args.inputs {
        files.extend(list_intensity_files(input)?);
    }
    if let Some(list) = &args.file_list {
        files.extend(read_file_list(list)?);
    }
    Ok(files)
}

fn run_call(args: CallArgs) -> Result<(), Box<dyn std::error::Error>> {
    configure_threads(args.input.threads)?;
    let inputs = collect_inputs(&args.input)?;

    let mut config = match &args.config {
        Some(path) => GenderConfig::from_toml_path(path)?,
        None => GenderConfig::default(),
    };
    if args.zw || args.chr_z_probes.is_some() || args.chr_w_probes.is_some() {
        config.zw_gender_calling = true;
    }
    if let Some(path) = args.chr_x_probes.or(args.chr_z_probes) {
        config.diploid_probes = Some(path);
    }
    if let Some(path) = args.chr_y_probes.or(args.chr_w_probes) {
        config.haploid_probes = Some(path);
    }
    if let Some(value) = args.female_thresh {
        config.female_threshold = value;
    }
    if let Some(value) = args.male_thresh {
        config.male_threshold = value;
    }
    if args.check_intensities {
        config.check_intensities = true;
    }
    if let Some(dir) = args.out_dir {
        config.out_dir = dir;
    }

    let summary = run_gender_engine(&config, &inputs)?;
    println!(
        "Called {} samples ({} male, {} female, {} unknown)",
        summary.samples, summary.males, summary.females, summary.unknowns
    );
    println!("Gender calls written to {}", summary.calls_path.display());
    println!("Gender metrics written to {}", summary.metrics_path.display());
    Ok(())
}

fn run_check(args: InputArgs) -> Result<(), Box<dyn std::error::Error>> {
    configure_threads(args.threads)?;
    let inputs = collect_inputs(&args)?;
    if inputs.is_empty() {
        return Err("No intensity files specified.".into());
    }

    let mut failing = 0usize;
    for (path, outcome) in check_intensity_files(&inputs) {
        let issues = outcome?;
        if issues.is_clean() {
            println!("{}\tok", path.display());
        } else {
            failing += 1;
            log_intensity_issues(&path, &issues);
            println!(
                "{}\tzero={}\tnegative={}\tnan={}\tinfinite={}",
                path.display(),
                issues.zero,
                issues.negative,
                issues.nan,
                issues.infinite
            );
        }
    }

    if failing > 0 {
        return Err(format!(
            "{failing} of {} intensity files contain invalid values",
            inputs.len()
        )
        .into());
    }
    Ok(())
}

/// Renders an age in seconds with the largest unit that keeps it above one.
fn format_duration_ago(seconds: u64) -> String {
    const UNITS: [(u64, &str); 6] = [
        (365 * 24 * 3600, "years"),
        (30 * 24 * 3600, "months"),
        (7 * 24 * 3600, "weeks"),
        (24 * 3600, "days"),
        (3600, "hours"),
        (60, "minutes"),
    ];
    for (size, unit) in UNITS {
        if seconds >= size {
            return format!("{:.1} {unit} ago", seconds as f64 / size as f64);
        }
    }
    format!("{seconds} seconds ago")
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("CNGENDER_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("cngender {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
