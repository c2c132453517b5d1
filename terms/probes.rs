//! Channel-partitioned probe groups and the probe-index file loader.
//!
//! A probe file is a tab-separated table with a required `probe_id` column
//! holding 1-based probe ids and an optional `channel` column holding the
//! 0-based acquisition channel. Lines starting with `#` are ignored, which
//! covers the `#%key=value` headers written by the array tooling.

use crate::files::open_text_source;
use crate::types::ProbeIndex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Highest number of acquisition channels a probe file may address.
pub const MAX_CHANNELS: usize = 64;

#[derive(Debug, Error)]
pub enum ProbeListError {
    #[error("couldn't open probe file {path} to read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed probe file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("unable to find {column} column in file '{path}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("invalid probe id '{value}' on line {line} of {path}: probe ids are positive 1-based integers")]
    InvalidProbeId {
        path: PathBuf,
        line: u64,
        value: String,
    },
    #[error("invalid channel '{value}' on line {line} of {path}: channels are integers below {max}", max = MAX_CHANNELS)]
    InvalidChannel {
        path: PathBuf,
        line: u64,
        value: String,
    },
}

/// Probe indices grouped by acquisition channel. Entry `i` holds the probes read
/// from channel `i`; any entry may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeGroupSet {
    channels: Vec<Vec<ProbeIndex>>,
}

impl ProbeGroupSet {
    pub fn new(channels: Vec<Vec<ProbeIndex>>) -> Self {
        Self { channels }
    }

    pub fn single_channel(probes: Vec<ProbeIndex>) -> Self {
        Self {
            channels: vec![probes],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[ProbeIndex]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[ProbeIndex]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn total_probes(&self) -> usize {
        self.channels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_probes() == 0
    }

    pub fn per_channel_counts(&self) -> Vec<usize> {
        self.channels.iter().map(Vec::len).collect()
    }

    fn push(&mut self, channel: usize, probe: ProbeIndex) {
        let len = channel.saturating_add(1);
        if len > self.channels.len() {
            self.channels.resize_with(len, Vec::new);
        }
        if let Some(probes) = self.channels.get_mut(channel) {
            probes.push(probe);
        }
    }
}

/// Loads a probe file into a [`ProbeGroupSet`], converting ids to zero-based indices.
pub fn load_probe_file(path: &Path) -> Result<ProbeGroupSet, ProbeListError> {
    let source = open_text_source(path).map_err(|source| ProbeListError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let csv_err = |source| ProbeListError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .has_headers(true)
        .from_reader(source);

    let headers = reader.headers().map_err(csv_err)?.clone();
    let probe_col = headers
        .iter()
        .position(|name| name.trim() == "probe_id")
        .ok_or_else(|| ProbeListError::MissingColumn {
            path: path.to_path_buf(),
            column: "probe_id",
        })?;
    let channel_col = headers.iter().position(|name| name.trim() == "channel");

    let mut groups = ProbeGroupSet::default();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map_or(0, |pos| pos.line());

        let raw_id = record.get(probe_col).unwrap_or("").trim();
        let probe = raw_id
            .parse::<u32>()
            .ok()
            .and_then(ProbeIndex::from_one_based)
            .ok_or_else(|| ProbeListError::InvalidProbeId {
                path: path.to_path_buf(),
                line,
                value: raw_id.to_string(),
            })?;

        let channel = match channel_col {
            Some(col) => {
                let raw_channel = record.get(col).unwrap_or("").trim();
                raw_channel
                    .parse::<usize>()
                    .ok()
                    .filter(|&channel| channel < MAX_CHANNELS)
                    .ok_or_else(|| ProbeListError::InvalidChannel {
                        path: path.to_path_buf(),
                        line,
                        value: raw_channel.to_string(),
                    })?
            }
            None => 0,
        };

        groups.push(channel, probe);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn indices(raw: &[u32]) -> Vec<ProbeIndex> {
        raw.iter().copied().map(ProbeIndex).collect()
    }

    #[test]
    fn single_column_files_load_into_channel_zero() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("chrX.txt");
        fs::write(&path, "#%chip_type=GenomeWideSNP_6\nprobe_id\n11\n12\n1\n")?;

        let groups = load_probe_file(&path)?;
        assert_eq!(groups.channel_count(), 1);
        assert_eq!(groups.channel(0), Some(indices(&[10, 11, 0]).as_slice()));
        assert_eq!(groups.total_probes(), 3);
        Ok(())
    }

    #[test]
    fn channel_column_partitions_probes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("chrY.txt");
        fs::write(&path, "probe_id\tchannel\n5\t0\n6\t2\n7\t0\n")?;

        let groups = load_probe_file(&path)?;
        assert_eq!(groups.per_channel_counts(), vec![2, 0, 1]);
        assert_eq!(groups.channel(2), Some(indices(&[5]).as_slice()));
        assert_eq!(groups.channel(3), None);
        Ok(())
    }

    #[test]
    fn header_only_files_are_empty_not_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.txt");
        fs::write(&path, "probe_id\n")?;

        let groups = load_probe_file(&path)?;
        assert!(groups.is_empty());
        assert_eq!(groups.channel_count(), 0);
        Ok(())
    }

    #[test]
    fn missing_probe_id_column_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("bad.txt");
        fs::write(&path, "probeset_id\n5\n")?;

        assert!(matches!(
            load_probe_file(&path),
            Err(ProbeListError::MissingColumn { column: "probe_id", .. })
        ));
        Ok(())
    }

    #[test]
    fn zero_and_garbage_probe_ids_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("zero.txt");
        fs::write(&path, "probe_id\n3\n0\n")?;
        match load_probe_file(&path) {
            Err(ProbeListError::InvalidProbeId { line, value, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "0");
            }
            other => panic!("expected InvalidProbeId, got {other:?}"),
        }

        fs::write(&path, "probe_id\tchannel\n3\tred\n")?;
        assert!(matches!(
            load_probe_file(&path),
            Err(ProbeListError::InvalidChannel { .. })
        ));
        Ok(())
    }

    #[test]
    fn oversized_channels_are_rejected_with_their_line() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("channels.txt");

        for raw in ["18446744073709551615", "1000000000", "64"] {
            fs::write(&path, format!("probe_id\tchannel\n4\t0\n5\t{raw}\n"))?;
            match load_probe_file(&path) {
                Err(ProbeListError::InvalidChannel { line, value, .. }) => {
                    assert_eq!(line, 3);
                    assert_eq!(value, raw);
                }
                other => panic!("expected InvalidChannel for {raw}, got {other:?}"),
            }
        }

        fs::write(&path, "probe_id\tchannel\n5\t63\n")?;
        assert_eq!(load_probe_file(&path)?.channel_count(), MAX_CHANNELS);
        Ok(())
    }

    #[test]
    fn gzip_probe_files_load_like_plain_ones() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("chrX.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
        encoder.write_all(b"#%chip_type=test\nprobe_id\tchannel\n2\t0\n9\t1\n")?;
        encoder.finish()?;

        let groups = load_probe_file(&path)?;
        assert_eq!(groups.channel(0), Some(indices(&[1]).as_slice()));
        assert_eq!(groups.channel(1), Some(indices(&[8]).as_slice()));
        Ok(())
    }

    #[test]
    fn unreadable_files_surface_io_errors() {
        let result = load_probe_file(Path::new("/definitely/not/here.txt"));
        assert!(matches!(result, Err(ProbeListError::Io { .. })));
    }
}
