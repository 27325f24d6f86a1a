//! Manifest files: one `(path, label)` sample per line
//!
//! Three line formats are supported:
//! - `Tab` (default): `<path>\t<label>`; paths may contain spaces
//! - `Space`: `<path> <label>`, the historical format. The path ends at the
//!   first space and the label is the following space-separated token, so
//!   a path containing a space is misparsed (`images/a b.png cat` reads as
//!   path `images/a`, label `b.png`).
//! - `JsonLines`: `{"path": "...", "label": "..."}`
//!
//! Writing is not atomic: a failed write leaves a truncated manifest behind.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{FinetuneError, IoResultExt, Result};

/// Default file name of the training manifest
pub const TRAIN_MANIFEST: &str = "train_set.txt";
/// Default file name of the validation manifest
pub const VALIDATION_MANIFEST: &str = "validation_set.txt";
/// Default file name of the test manifest
pub const TEST_MANIFEST: &str = "test_set.txt";

/// A labeled image path. The label is the name of the file's class directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label (directory name)
    pub label: String,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }
}

/// Line format of a manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// `<path> <label>`
    Space,
    /// `<path>\t<label>`
    #[default]
    Tab,
    /// One JSON object per line
    #[serde(rename = "jsonl")]
    JsonLines,
}

impl ManifestFormat {
    /// Render one sample as a manifest line (without the trailing newline)
    pub fn format_line(&self, sample: &Sample) -> Result<String> {
        let path = sample.path.to_string_lossy();
        match self {
            ManifestFormat::Space => Ok(format!("{} {}", path, sample.label)),
            ManifestFormat::Tab => Ok(format!("{}\t{}", path, sample.label)),
            ManifestFormat::JsonLines => serde_json::to_string(sample)
                .map_err(|e| FinetuneError::Serialization(e.to_string())),
        }
    }

    /// Parse one manifest line; the error is a human-readable reason
    pub fn parse_line(&self, line: &str) -> std::result::Result<Sample, String> {
        let (path, label) = match self {
            ManifestFormat::Space => {
                let mut parts = line.split(' ');
                let path = parts.next().unwrap_or_default();
                let label = parts
                    .next()
                    .ok_or_else(|| "missing ' ' separator between path and label".to_string())?;
                (path, label.trim_end())
            }
            ManifestFormat::Tab => {
                let (path, label) = line
                    .split_once('\t')
                    .ok_or_else(|| "missing tab separator between path and label".to_string())?;
                (path, label.trim_end())
            }
            ManifestFormat::JsonLines => {
                let sample: Sample =
                    serde_json::from_str(line).map_err(|e| format!("invalid JSON: {}", e))?;
                if sample.path.as_os_str().is_empty() {
                    return Err("empty path".to_string());
                }
                if sample.label.trim().is_empty() {
                    return Err("empty label".to_string());
                }
                return Ok(sample);
            }
        };

        if path.is_empty() {
            return Err("empty path".to_string());
        }
        if label.is_empty() {
            return Err("empty label".to_string());
        }

        Ok(Sample::new(path, label))
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestFormat::Space => write!(f, "space"),
            ManifestFormat::Tab => write!(f, "tab"),
            ManifestFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

impl FromStr for ManifestFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "space" => Ok(ManifestFormat::Space),
            "tab" | "tsv" => Ok(ManifestFormat::Tab),
            "jsonl" | "json" | "jsonlines" => Ok(ManifestFormat::JsonLines),
            other => Err(format!(
                "unknown manifest format '{}' (expected space, tab or jsonl)",
                other
            )),
        }
    }
}

/// Write samples to `path` in the given order, replacing any existing file
pub fn write_manifest(
    samples: &[Sample],
    path: impl AsRef<Path>,
    format: ManifestFormat,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_path(path)?;
    let mut writer = BufWriter::new(file);

    for sample in samples {
        let line = format.format_line(sample)?;
        writeln!(writer, "{}", line).with_path(path)?;
    }
    writer.flush().with_path(path)?;

    debug!("Wrote {} samples to {:?} ({})", samples.len(), path, format);
    Ok(())
}

/// Read every sample of a manifest, in file order
pub fn read_manifest(path: impl AsRef<Path>, format: ManifestFormat) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    let file = File::open(path).with_path(path)?;
    let reader = BufReader::new(file);

    let mut samples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_path(path)?;
        let sample = format
            .parse_line(&line)
            .map_err(|msg| FinetuneError::parse(path, idx + 1, msg))?;
        samples.push(sample);
    }

    debug!("Read {} samples from {:?} ({})", samples.len(), path, format);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_space_format_splits_on_first_space() {
        let sample = ManifestFormat::Space
            .parse_line("images/a b.png label1")
            .unwrap();
        assert_eq!(sample.path, PathBuf::from("images/a"));
        assert_eq!(sample.label, "b.png");
    }

    #[test]
    fn test_space_format_trims_label() {
        let sample = ManifestFormat::Space
            .parse_line("data/cat/1.jpg cat \r")
            .unwrap();
        assert_eq!(sample.label, "cat");
    }

    #[test]
    fn test_missing_separator_is_rejected() {
        assert!(ManifestFormat::Space.parse_line("no_separator.jpg").is_err());
        assert!(ManifestFormat::Tab.parse_line("no separator.jpg").is_err());
        assert!(ManifestFormat::Tab.parse_line("").is_err());
    }

    #[test]
    fn test_tab_format_keeps_spaces_in_path() {
        let sample = Sample::new("images/a b.png", "label1");
        let line = ManifestFormat::Tab.format_line(&sample).unwrap();
        assert_eq!(line, "images/a b.png\tlabel1");
        assert_eq!(ManifestFormat::Tab.parse_line(&line).unwrap(), sample);
    }

    #[test]
    fn test_json_lines_keeps_spaces_in_path() {
        let sample = Sample::new("images/a b.png", "label 1");
        let line = ManifestFormat::JsonLines.format_line(&sample).unwrap();
        assert_eq!(ManifestFormat::JsonLines.parse_line(&line).unwrap(), sample);
        assert!(ManifestFormat::JsonLines.parse_line("{\"path\": 3}").is_err());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("TAB".parse::<ManifestFormat>(), Ok(ManifestFormat::Tab));
        assert_eq!("space".parse::<ManifestFormat>(), Ok(ManifestFormat::Space));
        assert_eq!("jsonl".parse::<ManifestFormat>(), Ok(ManifestFormat::JsonLines));
        assert!("csv".parse::<ManifestFormat>().is_err());
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TRAIN_MANIFEST);
        let samples = vec![
            Sample::new("root/dog/2.jpg", "dog"),
            Sample::new("root/cat/1.jpg", "cat"),
            Sample::new("root/dog/1.jpg", "dog"),
        ];

        for format in [
            ManifestFormat::Space,
            ManifestFormat::Tab,
            ManifestFormat::JsonLines,
        ] {
            write_manifest(&samples, &path, format).unwrap();
            assert_eq!(read_manifest(&path, format).unwrap(), samples);
        }
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("set.txt");
        std::fs::write(&path, "old\tcontent\nmore\tlines\nthird\tline\n").unwrap();

        write_manifest(&[Sample::new("a.png", "x")], &path, ManifestFormat::Tab).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.png\tx\n");
    }

    #[test]
    fn test_read_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.txt");
        std::fs::write(&path, "a.png cat\nbroken\n").unwrap();

        match read_manifest(&path, ManifestFormat::Space) {
            Err(FinetuneError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_manifest("/nonexistent/manifest.txt", ManifestFormat::Tab);
        assert!(matches!(result, Err(FinetuneError::Filesystem { .. })));
    }
}
