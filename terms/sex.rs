use std::path::Path;

use log::{info, warn};
use thiserror::Error;

use crate::chip::{ChipError, ChipHandle};
use crate::metrics::{ChipMetrics, Metric, MetricDeclaration};
use crate::probes::{ProbeGroupSet, ProbeListError, load_probe_file};
use crate::types::{ChromosomeConvention, Gender, Thresholds};

#[derive(Debug, Error)]
pub enum GenderCallError {
    #[error("a {which} probe file is required for copy-number gender calling")]
    MissingProbeFile { which: String },
    #[error("probe list error: {0}")]
    ProbeList(#[from] ProbeListError),
    #[error("chip access error: {0}")]
    Chip(#[from] ChipError),
}

/// The outcome recorded for one processed chip.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub chip: String,
    pub gender: Gender,
    /// Haploid over diploid mean intensity. Zero when a probe group was empty,
    /// NaN when the diploid mean was zero.
    pub ratio: f32,
}

/// Names of the four metrics a caller emits, fixed at construction.
#[derive(Debug, Clone)]
struct MetricNames {
    mean_diploid: String,
    mean_haploid: String,
    ratio: String,
    gender: String,
}

impl MetricNames {
    fn for_convention(convention: ChromosomeConvention) -> Self {
        let method = convention.method_name();
        Self {
            mean_diploid: format!("{method}_gender_mean{}", convention.diploid_label()),
            mean_haploid: format!("{method}_gender_mean{}", convention.haploid_label()),
            ratio: format!("{method}_gender_ratio"),
            gender: format!("{method}_gender"),
        }
    }
}

/// Calls gender from the ratio of mean haploid-chromosome to mean
/// diploid-chromosome probe intensity.
///
/// One caller serves one run: every chip handed to [`GenderCaller::process_chip`]
/// adds a [`SampleResult`], and results are never removed.
#[derive(Debug)]
pub struct GenderCaller {
    diploid: ProbeGroupSet,
    haploid: ProbeGroupSet,
    thresholds: Thresholds,
    convention: ChromosomeConvention,
    names: MetricNames,
    results: Vec<SampleResult>,
}

impl GenderCaller {
    /// Loads both probe groups from probe files. Either path being empty is fatal.
    pub fn from_probe_files(
        diploid_path: &Path,
        haploid_path: &Path,
        thresholds: Thresholds,
        zw: bool,
    ) -> Result<Self, GenderCallError> {
        let convention = ChromosomeConvention::from_zw_flag(zw);
        if diploid_path.as_os_str().is_empty() {
            return Err(GenderCallError::MissingProbeFile {
                which: format!("chr{}", convention.diploid_label()),
            });
        }
        if haploid_path.as_os_str().is_empty() {
            return Err(GenderCallError::MissingProbeFile {
                which: format!("chr{}", convention.haploid_label()),
            });
        }

        let diploid = load_probe_file(diploid_path)?;
        let haploid = load_probe_file(haploid_path)?;
        Ok(Self::new(diploid, haploid, thresholds, zw))
    }

    pub fn new(
        diploid: ProbeGroupSet,
        haploid: ProbeGroupSet,
        thresholds: Thresholds,
        zw: bool,
    ) -> Self {
        let convention = ChromosomeConvention::from_zw_flag(zw);
        let (d, h) = (convention.diploid_label(), convention.haploid_label());

        if diploid.is_empty() {
            warn!("No chr{d} probes were loaded; every chip will be called unknown.");
        }
        if haploid.is_empty() {
            warn!("No chr{h} probes were loaded; every chip will be called unknown.");
        }
        info!(
            "Gender calling with chr{d} probes per channel {:?} and chr{h} probes per channel {:?}",
            diploid.per_channel_counts(),
            haploid.per_channel_counts()
        );

        Self {
            diploid,
            haploid,
            thresholds,
            convention,
            names: MetricNames::for_convention(convention),
            results: Vec::new(),
        }
    }

    /// The columns this caller contributes to a metrics report.
    pub fn metric_declarations(&self) -> Vec<MetricDeclaration> {
        vec![
            MetricDeclaration::double(self.names.mean_diploid.clone()),
            MetricDeclaration::double(self.names.mean_haploid.clone()),
            MetricDeclaration::double(self.names.ratio.clone()),
            MetricDeclaration::text(self.names.gender.clone()),
        ]
    }

    pub fn method_name(&self) -> String {
        self.convention.method_name()
    }

    pub fn convention(&self) -> ChromosomeConvention {
        self.convention
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn diploid_probes(&self) -> &ProbeGroupSet {
        &self.diploid
    }

    pub fn haploid_probes(&self) -> &ProbeGroupSet {
        &self.haploid
    }

    /// Every result recorded so far, in processing order.
    pub fn results(&self) -> &[SampleResult] {
        &self.results
    }

    pub fn last_result(&self) -> Option<&SampleResult> {
        self.results.last()
    }

    /// Calls gender for one chip, records the result and returns the chip's metrics.
    pub fn process_chip<C: ChipHandle + ?Sized>(
        &mut self,
        chip: &mut C,
    ) -> Result<ChipMetrics, GenderCallError> {
        let chip_name = chip.file_name().to_string();
        let synthetic = chip.channels().is_empty();
        let mut metrics = ChipMetrics::new(chip_name.clone());

        let sum_diploid = sum_intensities(chip, &self.diploid, synthetic)?;
        let sum_haploid = sum_intensities(chip, &self.haploid, synthetic)?;
        let count_diploid = self.diploid.total_probes();
        let count_haploid = self.haploid.total_probes();

        if count_diploid == 0 || count_haploid == 0 {
            metrics.push(Metric::text(
                self.names.gender.clone(),
                Gender::Unknown.to_string(),
            ));
            self.results.push(SampleResult {
                chip: chip_name,
                gender: Gender::Unknown,
                ratio: 0.0,
            });
            return Ok(metrics);
        }

        let mean_diploid = (sum_diploid / count_diploid as f64) as f32;
        let mean_haploid = (sum_haploid / count_haploid as f64) as f32;
        metrics.push(Metric::double(
            self.names.mean_diploid.clone(),
            f64::from(mean_diploid),
        ));
        metrics.push(Metric::double(
            self.names.mean_haploid.clone(),
            f64::from(mean_haploid),
        ));

        let (ratio, mut gender) = if mean_diploid == 0.0 {
            // The report carries 0.0 here while the recorded ratio is NaN.
            metrics.push(Metric::double(self.names.ratio.clone(), 0.0));
            (f32::NAN, Gender::Unknown)
        } else {
            let ratio = mean_haploid / mean_diploid;
            metrics.push(Metric::double(self.names.ratio.clone(), f64::from(ratio)));
            (ratio, self.thresholds.classify(f64::from(ratio)))
        };

        if self.convention.is_zw() {
            gender = gender.flipped();
        }
        metrics.push(Metric::text(self.names.gender.clone(), gender.to_string()));

        info!(
            "{}: mean{}={:.4} mean{}={:.4} ratio={:.4} call={}",
            chip_name,
            self.convention.diploid_label(),
            mean_diploid,
            self.convention.haploid_label(),
            mean_haploid,
            ratio,
            gender
        );
        self.results.push(SampleResult {
            chip: chip_name,
            gender,
            ratio,
        });

        Ok(metrics)
    }
}

/// Sums the intensities of every probe in `group`, channel by channel.
///
/// Partition `i` is read from the chip's `i`-th channel. When `synthetic` is
/// set the chip exposes no channel names, so only partition 0 can be read and
/// the active channel is left alone.
pub fn sum_intensities<C: ChipHandle + ?Sized>(
    chip: &mut C,
    group: &ProbeGroupSet,
    synthetic: bool,
) -> Result<f64, ChipError> {
    let mut total = 0.0f64;
    for (channel, probes) in group.iter().enumerate() {
        if probes.is_empty() {
            continue;
        }
        if synthetic {
            if channel != 0 {
                return Err(ChipError::ChannelOutOfRange {
                    chip: chip.file_name().to_string(),
                    requested: channel,
                    available: 1,
                });
            }
        } else {
            let name = chip.channels().get(channel).cloned().ok_or_else(|| {
                ChipError::ChannelOutOfRange {
                    chip: chip.file_name().to_string(),
                    requested: channel,
                    available: chip.channels().len(),
                }
            })?;
            chip.select_channel(&name)?;
        }
        for &probe in probes {
            total += f64::from(chip.intensity(probe)?);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::IntensityTable;
    use crate::metrics::MetricValue;
    use crate::types::ProbeIndex;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::fs;
    use tempfile::tempdir;

    fn group(raw: &[u32]) -> ProbeGroupSet {
        ProbeGroupSet::single_channel(raw.iter().copied().map(ProbeIndex).collect())
    }

    /// Probes 0 and 1 read 100, probes 2 and 3 read 10.
    fn reference_chip() -> IntensityTable {
        IntensityTable::single_channel("sample", vec![100.0, 100.0, 10.0, 10.0])
    }

    fn caller(female: f64, male: f64, zw: bool) -> GenderCaller {
        GenderCaller::new(
            group(&[0, 1]),
            group(&[2, 3]),
            Thresholds::new(female, male),
            zw,
        )
    }

    /// Wraps a table and counts channel selections.
    struct CountingChip {
        inner: IntensityTable,
        selections: usize,
    }

    impl ChipHandle for CountingChip {
        fn file_name(&self) -> &str {
            self.inner.file_name()
        }

        fn channels(&self) -> &[String] {
            self.inner.channels()
        }

        fn select_channel(&mut self, channel: &str) -> Result<(), ChipError> {
            self.selections += 1;
            self.inner.select_channel(channel)
        }

        fn intensity(&self, probe: ProbeIndex) -> Result<f32, ChipError> {
            self.inner.intensity(probe)
        }
    }

    #[test]
    fn low_ratio_is_female() -> Result<(), GenderCallError> {
        let mut caller = caller(0.5, 0.9, false);
        let metrics = caller.process_chip(&mut reference_chip())?;

        assert_eq!(caller.results().len(), 1);
        let result = &caller.results()[0];
        assert_eq!(caller.last_result(), Some(result));
        assert_eq!(result.gender, Gender::Female);
        assert_relative_eq!(result.ratio, 0.1, epsilon = 1e-6);

        let names: Vec<&str> = metrics.metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "cn-probe-chrXY-ratio_gender_meanX",
                "cn-probe-chrXY-ratio_gender_meanY",
                "cn-probe-chrXY-ratio_gender_ratio",
                "cn-probe-chrXY-ratio_gender",
            ]
        );
        assert_eq!(
            metrics.get("cn-probe-chrXY-ratio_gender_meanX"),
            Some(&MetricValue::Double(100.0))
        );
        assert_eq!(
            metrics.get("cn-probe-chrXY-ratio_gender"),
            Some(&MetricValue::Text("female".into()))
        );
        Ok(())
    }

    #[test]
    fn high_ratio_is_male() -> Result<(), GenderCallError> {
        let mut caller = caller(0.05, 0.08, false);
        caller.process_chip(&mut reference_chip())?;
        assert_eq!(caller.results()[0].gender, Gender::Male);
        Ok(())
    }

    #[test]
    fn ratio_between_thresholds_is_unknown() -> Result<(), GenderCallError> {
        let mut caller = caller(0.05, 0.2, false);
        caller.process_chip(&mut reference_chip())?;
        assert_eq!(caller.results()[0].gender, Gender::Unknown);
        Ok(())
    }

    #[test]
    fn empty_diploid_group_short_circuits() -> Result<(), GenderCallError> {
        let mut caller = GenderCaller::new(
            ProbeGroupSet::default(),
            group(&[2, 3]),
            Thresholds::new(0.5, 0.9),
            false,
        );
        let metrics = caller.process_chip(&mut reference_chip())?;

        let result = &caller.results()[0];
        assert_eq!(result.gender, Gender::Unknown);
        assert_eq!(result.ratio, 0.0);
        assert_eq!(metrics.metrics.len(), 1);
        assert_eq!(
            metrics.get("cn-probe-chrXY-ratio_gender"),
            Some(&MetricValue::Text("unknown".into()))
        );
        Ok(())
    }

    #[test]
    fn empty_haploid_group_short_circuits() -> Result<(), GenderCallError> {
        let mut caller = GenderCaller::new(
            group(&[0, 1]),
            ProbeGroupSet::new(vec![Vec::new(), Vec::new()]),
            Thresholds::new(0.5, 0.9),
            false,
        );
        let metrics = caller.process_chip(&mut reference_chip())?;
        assert_eq!(caller.results()[0].gender, Gender::Unknown);
        assert_eq!(caller.results()[0].ratio, 0.0);
        assert_eq!(metrics.metrics.len(), 1);
        Ok(())
    }

    #[test]
    fn zw_mode_flips_the_call_and_renames_metrics() -> Result<(), GenderCallError> {
        let mut caller = caller(0.5, 0.9, true);
        let metrics = caller.process_chip(&mut reference_chip())?;

        assert_eq!(caller.results()[0].gender, Gender::Male);
        assert_eq!(caller.method_name(), "cn-probe-chrZW-ratio");
        assert!(metrics.get("cn-probe-chrZW-ratio_gender_meanZ").is_some());
        assert!(metrics.get("cn-probe-chrZW-ratio_gender_meanW").is_some());
        assert_eq!(
            metrics.get("cn-probe-chrZW-ratio_gender"),
            Some(&MetricValue::Text("male".into()))
        );
        Ok(())
    }

    #[test]
    fn zw_mode_leaves_unknown_alone() -> Result<(), GenderCallError> {
        let mut caller = caller(0.05, 0.2, true);
        caller.process_chip(&mut reference_chip())?;
        assert_eq!(caller.results()[0].gender, Gender::Unknown);
        Ok(())
    }

    #[test]
    fn zero_diploid_mean_records_nan_but_reports_zero() -> Result<(), GenderCallError> {
        let mut caller = caller(0.5, 0.9, false);
        let mut chip = IntensityTable::single_channel("dark", vec![0.0, 0.0, 10.0, 10.0]);
        let metrics = caller.process_chip(&mut chip)?;

        let result = &caller.results()[0];
        assert!(result.ratio.is_nan());
        assert_eq!(result.gender, Gender::Unknown);
        assert_eq!(
            metrics.get("cn-probe-chrXY-ratio_gender_ratio"),
            Some(&MetricValue::Double(0.0))
        );
        assert_eq!(
            metrics.get("cn-probe-chrXY-ratio_gender"),
            Some(&MetricValue::Text("unknown".into()))
        );
        Ok(())
    }

    #[test]
    fn results_accumulate_in_order() -> Result<(), GenderCallError> {
        let mut caller = caller(0.5, 0.9, false);
        let mut first = IntensityTable::single_channel("first", vec![100.0, 100.0, 10.0, 10.0]);
        let mut second = IntensityTable::single_channel("second", vec![10.0, 10.0, 10.0, 10.0]);
        caller.process_chip(&mut first)?;
        caller.process_chip(&mut second)?;

        let chips: Vec<&str> = caller.results().iter().map(|r| r.chip.as_str()).collect();
        assert_eq!(chips, vec!["first", "second"]);
        assert_eq!(caller.results()[1].gender, Gender::Male);
        Ok(())
    }

    #[test]
    fn summing_is_idempotent_and_skips_selection_for_synthetic_channels()
    -> Result<(), ChipError> {
        let mut chip = CountingChip {
            inner: reference_chip(),
            selections: 0,
        };
        let probes = group(&[0, 2, 3]);
        let first = sum_intensities(&mut chip, &probes, true)?;
        let second = sum_intensities(&mut chip, &probes, true)?;
        assert_eq!(first, 120.0);
        assert_eq!(first, second);
        assert_eq!(chip.selections, 0);
        Ok(())
    }

    #[test]
    fn multi_channel_groups_read_their_own_channels() -> Result<(), GenderCallError> {
        let table = IntensityTable::multi_channel(
            "two-colour",
            vec!["A".into(), "B".into()],
            array![[100.0, 1.0], [1.0, 100.0], [10.0, 1.0], [1.0, 10.0]],
        )?;
        let mut chip = CountingChip {
            inner: table,
            selections: 0,
        };

        let diploid = ProbeGroupSet::new(vec![
            vec![ProbeIndex(0)],
            vec![ProbeIndex(1)],
        ]);
        let haploid = ProbeGroupSet::new(vec![
            vec![ProbeIndex(2)],
            vec![ProbeIndex(3)],
        ]);
        assert_eq!(sum_intensities(&mut chip, &diploid, false)?, 200.0);
        assert_eq!(chip.selections, 2);

        let mut caller = GenderCaller::new(diploid, haploid, Thresholds::new(0.5, 0.9), false);
        caller.process_chip(&mut chip)?;
        let result = &caller.results()[0];
        assert_eq!(result.gender, Gender::Female);
        assert_relative_eq!(result.ratio, 0.1, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn out_of_range_probes_and_channels_are_fatal() {
        let mut caller = GenderCaller::new(
            group(&[0, 99]),
            group(&[2]),
            Thresholds::new(0.5, 0.9),
            false,
        );
        assert!(matches!(
            caller.process_chip(&mut reference_chip()),
            Err(GenderCallError::Chip(ChipError::ProbeOutOfRange { .. }))
        ));

        let mut caller = GenderCaller::new(
            ProbeGroupSet::new(vec![Vec::new(), vec![ProbeIndex(0)]]),
            group(&[2]),
            Thresholds::new(0.5, 0.9),
            false,
        );
        assert!(matches!(
            caller.process_chip(&mut reference_chip()),
            Err(GenderCallError::Chip(ChipError::ChannelOutOfRange {
                requested: 1,
                available: 1,
                ..
            }))
        ));
        assert!(caller.results().is_empty());
    }

    #[test]
    fn probe_files_are_required_and_loaded() -> Result<(), Box<dyn std::error::Error>> {
        let result = GenderCaller::from_probe_files(
            Path::new(""),
            Path::new("chrY.txt"),
            Thresholds::new(0.48, 0.71),
            false,
        );
        match result {
            Err(GenderCallError::MissingProbeFile { which }) => assert_eq!(which, "chrX"),
            other => panic!("expected a missing probe file error, got {other:?}"),
        }

        let dir = tempdir()?;
        let z = dir.path().join("chrZ.txt");
        let w = dir.path().join("chrW.txt");
        fs::write(&z, "probe_id\n1\n2\n")?;
        fs::write(&w, "probe_id\tchannel\n3\t0\n4\t0\n")?;

        let caller =
            GenderCaller::from_probe_files(&z, &w, Thresholds::new(0.48, 0.71), true)?;
        assert_eq!(caller.convention(), ChromosomeConvention::ZW);
        assert_eq!(caller.diploid_probes().total_probes(), 2);
        assert_eq!(caller.haploid_probes().per_channel_counts(), vec![2]);
        assert_eq!(caller.metric_declarations().len(), 4);
        assert_eq!(caller.thresholds(), Thresholds::new(0.48, 0.71));
        Ok(())
    }
}
