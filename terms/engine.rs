// ========================================================================================
//                          Batch driver for copy-number gender calling
// ========================================================================================

use std::fs::{self, File};
use std::io::{BufWriter, IsTerminal};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::chip::{ChipError, IntensityIssues, IntensityTable, scan_intensities};
use crate::config::{ConfigError, GenderConfig};
use crate::metrics::{MetricsError, MetricsReport};
use crate::sex::{GenderCallError, GenderCaller, SampleResult};
use crate::types::Gender;

pub const GENDER_CALLS_FILE: &str = "genderCalls.txt";
pub const GENDER_METRICS_FILE: &str = "genderMetrics.txt";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("No intensity files specified.")]
    NoInputs,
    #[error(transparent)]
    GenderCall(#[from] GenderCallError),
    #[error(transparent)]
    Chip(#[from] ChipError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("failed to write gender calls: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tallies and output locations of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSummary {
    pub samples: usize,
    pub males: usize,
    pub females: usize,
    pub unknowns: usize,
    pub calls_path: PathBuf,
    pub metrics_path: PathBuf,
}

impl EngineSummary {
    fn tally(results: &[SampleResult], calls_path: PathBuf, metrics_path: PathBuf) -> Self {
        let count = |gender: Gender| results.iter().filter(|r| r.gender == gender).count();
        Self {
            samples: results.len(),
            males: count(Gender::Male),
            females: count(Gender::Female),
            unknowns: count(Gender::Unknown),
            calls_path,
            metrics_path,
        }
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) =
        ProgressStyle::with_template("> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Loads and scans every file in parallel. Results keep the input order.
pub fn check_intensity_files(paths: &[PathBuf]) -> Vec<(PathBuf, Result<IntensityIssues, ChipError>)> {
    paths
        .par_iter()
        .map(|path| {
            let issues = IntensityTable::from_path(path).map(|table| scan_intensities(&table));
            (path.clone(), issues)
        })
        .collect()
}

/// Logs one warning per kind of suspicious value found in a file.
pub fn log_intensity_issues(path: &Path, issues: &IntensityIssues) {
    let name = path.display();
    for probe in &issues.zero_examples {
        warn!("Intensity file {name} contains a zero intensity value at probe {probe}.");
    }
    if issues.zero > issues.zero_examples.len() {
        warn!("Intensity file {name} contains {} zero intensity values in total.", issues.zero);
    }
    if issues.negative > 0 {
        warn!("Intensity file {name} contains {} negative intensity values.", issues.negative);
    }
    if issues.nan > 0 {
        warn!("Intensity file {name} contains {} NaN intensity values.", issues.nan);
    }
    if issues.infinite > 0 {
        warn!("Intensity file {name} contains {} infinite intensity values.", issues.infinite);
    }
}

/// Runs the gender caller over `inputs` in order and writes the calls and
/// metrics reports into the configured output directory.
pub fn run_gender_engine(
    config: &GenderConfig,
    inputs: &[PathBuf],
) -> Result<EngineSummary, EngineError> {
    config.validate()?;
    if inputs.is_empty() {
        return Err(EngineError::NoInputs);
    }
    let thresholds = config.thresholds();
    if !thresholds.is_ordered() {
        warn!(
            "Female threshold {} is above male threshold {}; ratios between them are called by whichever test matches first.",
            thresholds.female, thresholds.male
        );
    }

    if config.check_intensities {
        info!("Checking {} intensity files for invalid values", inputs.len());
        for (path, outcome) in check_intensity_files(inputs) {
            match outcome {
                Ok(issues) => log_intensity_issues(&path, &issues),
                Err(e) => warn!("Could not check {}: {e}", path.display()),
            }
        }
    }

    let diploid = config.diploid_probes.as_deref().unwrap_or(Path::new(""));
    let haploid = config.haploid_probes.as_deref().unwrap_or(Path::new(""));
    let mut caller = GenderCaller::from_probe_files(
        diploid,
        haploid,
        thresholds,
        config.zw_gender_calling,
    )?;
    let mut report = MetricsReport::new(caller.metric_declarations());

    let pb = create_progress_bar(inputs.len() as u64, "Calling gender");
    for (idx, path) in inputs.iter().enumerate() {
        let mut chip = IntensityTable::from_path(path)?;
        debug!("Loaded {} probes from {}", chip.probe_count(), path.display());
        let metrics = caller.process_chip(&mut chip)?;
        report.push(metrics)?;
        if let Some(result) = caller.last_result() {
            info!(
                "Sample {}:\t{}\t{}\t{:.6}",
                idx + 1,
                result.chip,
                result.gender.report_label(),
                result.ratio
            );
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    fs::create_dir_all(&config.out_dir).map_err(|source| EngineError::Io {
        path: config.out_dir.clone(),
        source,
    })?;
    let calls_path = config.out_dir.join(GENDER_CALLS_FILE);
    let metrics_path = config.out_dir.join(GENDER_METRICS_FILE);

    write_gender_calls(&calls_path, caller.results())?;
    let metrics_file = File::create(&metrics_path).map_err(|source| EngineError::Io {
        path: metrics_path.clone(),
        source,
    })?;
    report.write_tsv(BufWriter::new(metrics_file))?;

    let summary = EngineSummary::tally(caller.results(), calls_path, metrics_path);
    info!(
        "Called {} samples: {} male, {} female, {} unknown",
        summary.samples, summary.males, summary.females, summary.unknowns
    );
    Ok(summary)
}

/// Writes one row per sample: name, call label and ratio to six decimals.
pub fn write_gender_calls(path: &Path, results: &[SampleResult]) -> Result<(), EngineError> {
    let file = File::create(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(BufWriter::new(file));
    writer.write_record(["Sample Name", "GenderCall", "Intensity Ratio"])?;
    for result in results {
        let ratio = format!("{:.6}", result.ratio);
        writer.write_record([
            result.chip.as_str(),
            result.gender.report_label(),
            ratio.as_str(),
        ])?;
    }
    writer.flush().map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
