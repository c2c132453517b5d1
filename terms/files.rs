use flate2::read::MultiGzDecoder;
use log::debug;
use natord::compare;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header accepted on the first line of a file list.
const FILE_LIST_HEADERS: [&str; 2] = ["intensity_files", "cel_files"];

#[derive(Debug, Error)]
pub enum InputListError {
    #[error("I/O error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no intensity files found in directory {0}")]
    EmptyDirectory(PathBuf),
    #[error("input path {0} does not exist")]
    Missing(PathBuf),
    #[error("file list {path} must start with a header line of 'intensity_files' or 'cel_files' (found '{found}')")]
    BadListHeader { path: PathBuf, found: String },
}

/// Opens a text file for buffered line reading, decompressing `.gz` files on the fly.
pub fn open_text_source(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// The sample name implied by an intensity file path: the basename with `.gz`
/// and then one more extension removed.
pub fn sample_name_from_path(path: &Path) -> String {
    let mut stem = path.to_path_buf();
    if stem.extension().is_some_and(|ext| ext == "gz") {
        stem.set_extension("");
    }
    stem.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn has_intensity_extension(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_ascii_lowercase();
    lower.ends_with(".txt")
        || lower.ends_with(".tsv")
        || lower.ends_with(".txt.gz")
        || lower.ends_with(".tsv.gz")
}

fn compare_paths(a: &Path, b: &Path) -> std::cmp::Ordering {
    let a_str = a
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| a.to_string_lossy().into_owned());
    let b_str = b
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| b.to_string_lossy().into_owned());
    compare(&a_str, &b_str)
}

/// Expands one user-supplied input into intensity file paths.
///
/// A directory yields every intensity file inside it in natural order
/// (`chip2` before `chip10`). A regular file is passed through untouched.
pub fn list_intensity_files(path: &Path) -> Result<Vec<PathBuf>, InputListError> {
    if path.is_dir() {
        let read_dir = fs::read_dir(path).map_err(|source| InputListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| InputListError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let candidate = entry.path();
            if candidate.is_file() && has_intensity_extension(&candidate) {
                files.push(candidate);
            }
        }
        if files.is_empty() {
            return Err(InputListError::EmptyDirectory(path.to_path_buf()));
        }
        files.sort_by(|a, b| compare_paths(a, b));
        debug!("Found {} intensity files in {}", files.len(), path.display());
        Ok(files)
    } else if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(InputListError::Missing(path.to_path_buf()))
    }
}

/// Reads a list file: a header line naming the column, then one path per line.
/// Relative paths are resolved against the directory holding the list.
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>, InputListError> {
    let io_err = |source| InputListError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = open_text_source(path).map_err(io_err)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut header_seen = false;
    let mut files = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(io_err)?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !header_seen {
            if !FILE_LIST_HEADERS.contains(&trimmed) {
                return Err(InputListError::BadListHeader {
                    path: path.to_path_buf(),
                    found: trimmed.to_string(),
                });
            }
            header_seen = true;
            continue;
        }
        let entry = PathBuf::from(trimmed);
        if entry.is_absolute() {
            files.push(entry);
        } else {
            files.push(base.join(entry));
        }
    }
    Ok(files)
}
