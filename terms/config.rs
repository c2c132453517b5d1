use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::types::{ChromosomeConvention, Thresholds};

pub const DEFAULT_FEMALE_THRESHOLD: f64 = 0.48;
pub const DEFAULT_MALE_THRESHOLD: f64 = 0.71;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Must specify a chr{0} probe file.")]
    MissingProbeFile(char),
    #[error("The {which} threshold must be a finite number (got {value}).")]
    NonFiniteThreshold { which: &'static str, value: f64 },
}

/// Settings for one gender-calling run. Every field has a default, so a config
/// file only needs the keys it wants to set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenderConfig {
    /// Probe file for the chromosome present twice in the homogametic sex (X or Z).
    pub diploid_probes: Option<PathBuf>,
    /// Probe file for the sex-specific chromosome (Y or W).
    pub haploid_probes: Option<PathBuf>,
    pub female_threshold: f64,
    pub male_threshold: f64,
    pub zw_gender_calling: bool,
    pub check_intensities: bool,
    pub out_dir: PathBuf,
}

impl Default for GenderConfig {
    fn default() -> Self {
        Self {
            diploid_probes: None,
            haploid_probes: None,
            female_threshold: DEFAULT_FEMALE_THRESHOLD,
            male_threshold: DEFAULT_MALE_THRESHOLD,
            zw_gender_calling: false,
            check_intensities: false,
            out_dir: PathBuf::from("."),
        }
    }
}

impl GenderConfig {
    /// Loads a config from a TOML file. Relative probe paths are resolved
    /// against the directory holding the file.
    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&toml_string)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for probes in [&mut config.diploid_probes, &mut config.haploid_probes]
            .into_iter()
            .flatten()
        {
            if probes.is_relative() {
                *probes = base.join(&*probes);
            }
        }
        Ok(config)
    }

    pub fn convention(&self) -> ChromosomeConvention {
        ChromosomeConvention::from_zw_flag(self.zw_gender_calling)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.female_threshold, self.male_threshold)
    }

    /// Checks that both probe files are named and both thresholds are finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let convention = self.convention();
        if self
            .diploid_probes
            .as_ref()
            .is_none_or(|p| p.as_os_str().is_empty())
        {
            return Err(ConfigError::MissingProbeFile(convention.diploid_label()));
        }
        if self
            .haploid_probes
            .as_ref()
            .is_none_or(|p| p.as_os_str().is_empty())
        {
            return Err(ConfigError::MissingProbeFile(convention.haploid_label()));
        }
        for (which, value) in [
            ("female", self.female_threshold),
            ("male", self.male_threshold),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteThreshold { which, value });
            }
        }
        Ok(())
    }
}
