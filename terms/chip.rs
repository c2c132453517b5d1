//! Access to one chip's probe intensities.
//!
//! [`ChipHandle`] is the narrow interface the gender caller reads through:
//! a sample name, a list of channel names, a way to pick the active channel
//! and random access to intensities by zero-based probe index. The only
//! implementation shipped here is [`IntensityTable`], an in-memory matrix that
//! can be built directly or read from a tab-separated intensity export.

use crate::files::{open_text_source, sample_name_from_path};
use crate::types::ProbeIndex;
use ndarray::{Array1, Array2, Axis};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How many zero-intensity probes are kept as examples by [`scan_intensities`].
const ZERO_EXAMPLE_LIMIT: usize = 3;

/// Largest 1-based probe id accepted from an intensity file.
pub const MAX_PROBE_ID: u32 = 1 << 26;

#[derive(Debug, Error)]
pub enum ChipError {
    #[error("cannot read intensity file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed intensity file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("unable to find {column} column in intensity file '{path}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("intensity file '{0}' has no intensity columns")]
    NoIntensityColumns(PathBuf),
    #[error("line {line} of {path}: {message}")]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },
    #[error("intensity matrix has {found} columns but {expected} channels were named")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("probe index {probe} is out of range for chip '{chip}' with {len} probes")]
    ProbeOutOfRange {
        chip: String,
        probe: ProbeIndex,
        len: usize,
    },
    #[error("chip '{chip}' has no channel named '{channel}'")]
    UnknownChannel { chip: String, channel: String },
    #[error("probe group expects channel {requested} but chip '{chip}' only has {available}")]
    ChannelOutOfRange {
        chip: String,
        requested: usize,
        available: usize,
    },
}

/// Random access to a single chip's intensities.
pub trait ChipHandle {
    /// Identifier reported alongside the chip's results.
    fn file_name(&self) -> &str;

    /// Channel names in acquisition order. Empty for single-channel data.
    fn channels(&self) -> &[String];

    /// Makes `channel` the channel that [`ChipHandle::intensity`] reads from.
    fn select_channel(&mut self, channel: &str) -> Result<(), ChipError>;

    /// The intensity of `probe` in the active channel.
    fn intensity(&self, probe: ProbeIndex) -> Result<f32, ChipError>;
}

/// A chip held fully in memory: one row per probe, one column per channel.
#[derive(Debug, Clone)]
pub struct IntensityTable {
    name: String,
    channels: Vec<String>,
    values: Array2<f32>,
    active: usize,
}

impl IntensityTable {
    /// A single-channel chip. Its channel list is empty.
    pub fn single_channel(name: impl Into<String>, values: Vec<f32>) -> Self {
        let values = Array1::from(values).insert_axis(Axis(1));
        Self {
            name: name.into(),
            channels: Vec::new(),
            values,
            active: 0,
        }
    }

    /// A chip with named channels; `values` must have one column per channel.
    pub fn multi_channel(
        name: impl Into<String>,
        channels: Vec<String>,
        values: Array2<f32>,
    ) -> Result<Self, ChipError> {
        let expected = channels.len().max(1);
        if values.ncols() != expected {
            return Err(ChipError::ShapeMismatch {
                expected,
                found: values.ncols(),
            });
        }
        Ok(Self {
            name: name.into(),
            channels,
            values,
            active: 0,
        })
    }

    /// Reads a tab-separated intensity export.
    ///
    /// The header must contain `probe_id` (1-based). Every other column is a
    /// channel named by its header; a single value column is treated as
    /// single-channel data. Rows may come in any order and probes without a row
    /// read back as NaN.
    pub fn from_path(path: &Path) -> Result<Self, ChipError> {
        let source = open_text_source(path).map_err(|source| ChipError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let csv_err = |source| ChipError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .has_headers(true)
            .from_reader(source);

        let headers = reader.headers().map_err(csv_err)?.clone();
        let probe_col = headers
            .iter()
            .position(|name| name.trim() == "probe_id")
            .ok_or_else(|| ChipError::MissingColumn {
                path: path.to_path_buf(),
                column: "probe_id",
            })?;
        let value_cols: Vec<usize> = (0..headers.len()).filter(|&c| c != probe_col).collect();
        if value_cols.is_empty() {
            return Err(ChipError::NoIntensityColumns(path.to_path_buf()));
        }

        let mut rows: Vec<(usize, Vec<f32>)> = Vec::new();
        let mut probe_count = 0usize;
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let line = record.position().map_or(0, |pos| pos.line());
            let parse_err = |message: String| ChipError::Parse {
                path: path.to_path_buf(),
                line,
                message,
            };

            let raw_id = record.get(probe_col).unwrap_or("").trim();
            let probe = raw_id
                .parse::<u32>()
                .ok()
                .and_then(ProbeIndex::from_one_based)
                .ok_or_else(|| parse_err(format!("invalid probe id '{raw_id}'")))?;
            if probe.0 >= MAX_PROBE_ID {
                return Err(parse_err(format!(
                    "probe id {raw_id} exceeds the largest supported id {MAX_PROBE_ID}"
                )));
            }

            let mut values = Vec::with_capacity(value_cols.len());
            for &col in &value_cols {
                let raw = record.get(col).unwrap_or("").trim();
                let value = raw
                    .parse::<f32>()
                    .map_err(|_| parse_err(format!("invalid intensity '{raw}'")))?;
                values.push(value);
            }

            probe_count = probe_count.max(probe.as_usize().saturating_add(1));
            rows.push((probe.as_usize(), values));
        }

        let mut matrix = Array2::from_elem((probe_count, value_cols.len()), f32::NAN);
        for (probe, values) in rows {
            for (col, value) in values.into_iter().enumerate() {
                matrix[[probe, col]] = value;
            }
        }

        let channels = if value_cols.len() == 1 {
            Vec::new()
        } else {
            value_cols
                .iter()
                .map(|&c| headers.get(c).unwrap_or("").trim().to_string())
                .collect()
        };

        Self::multi_channel(sample_name_from_path(path), channels, matrix)
    }

    pub fn probe_count(&self) -> usize {
        self.values.nrows()
    }
}

impl ChipHandle for IntensityTable {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> &[String] {
        &self.channels
    }

    fn select_channel(&mut self, channel: &str) -> Result<(), ChipError> {
        if self.channels.is_empty() {
            return Ok(());
        }
        match self.channels.iter().position(|name| name == channel) {
            Some(idx) => {
                self.active = idx;
                Ok(())
            }
            None => Err(ChipError::UnknownChannel {
                chip: self.name.clone(),
                channel: channel.to_string(),
            }),
        }
    }

    fn intensity(&self, probe: ProbeIndex) -> Result<f32, ChipError> {
        self.values
            .get((probe.as_usize(), self.active))
            .copied()
            .ok_or_else(|| ChipError::ProbeOutOfRange {
                chip: self.name.clone(),
                probe,
                len: self.values.nrows(),
            })
    }
}

/// Suspicious values found by [`scan_intensities`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntensityIssues {
    pub zero: usize,
    pub negative: usize,
    pub nan: usize,
    pub infinite: usize,
    /// The first few probes that read exactly zero.
    pub zero_examples: Vec<ProbeIndex>,
}

impl IntensityIssues {
    pub fn is_clean(&self) -> bool {
        self.zero == 0 && self.negative == 0 && self.nan == 0 && self.infinite == 0
    }
}

/// Counts zero, negative, NaN and infinite intensities across every channel.
pub fn scan_intensities(table: &IntensityTable) -> IntensityIssues {
    let mut issues = IntensityIssues::default();
    for ((probe, _), &value) in table.values.indexed_iter() {
        if value == 0.0 {
            issues.zero += 1;
            if issues.zero_examples.len() < ZERO_EXAMPLE_LIMIT {
                issues.zero_examples.push(ProbeIndex(probe as u32));
            }
        } else if value < 0.0 {
            issues.negative += 1;
        } else if value.is_nan() {
            issues.nan += 1;
        } else if value.is_infinite() {
            issues.infinite += 1;
        }
    }
    issues
}
