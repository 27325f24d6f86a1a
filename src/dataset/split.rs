//! Stratified train/validation/test splitting
//!
//! The input is a directory whose immediate subdirectories are class labels:
//!
//! ```text
//! root/
//! ├── catA/
//! │   ├── 1.jpg
//! │   └── 2.jpg
//! └── dogB/
//!     └── 3.jpg
//! ```
//!
//! Validation and test sets have exactly the requested number of samples and
//! the training set receives the rest. Each class is apportioned over the
//! three sets in proportion to its share of the whole dataset, and every
//! class must appear at least once in every set.
//!
//! The split is deterministic for a fixed seed and does not depend on the
//! order in which samples are handed in.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::manifest::{
    write_manifest, ManifestFormat, Sample, TEST_MANIFEST, TRAIN_MANIFEST, VALIDATION_MANIFEST,
};
use crate::utils::error::{FinetuneError, IoResultExt, Result};
use crate::utils::percent;

/// Default number of validation samples
pub const DEFAULT_VALIDATION_SIZE: usize = 2000;

/// Default number of test samples
pub const DEFAULT_TEST_SIZE: usize = 3000;

/// Default random seed
pub const DEFAULT_SEED: u64 = 42;

/// Split names in allocation order
const SPLIT_NAMES: [&str; 3] = ["validation", "test", "train"];

/// Configuration for dataset splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Absolute number of validation samples
    pub validation_size: usize,
    /// Absolute number of test samples
    pub test_size: usize,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Line format of the written manifests
    pub format: ManifestFormat,
    /// File name of the training manifest
    pub train_file: String,
    /// File name of the validation manifest
    pub validation_file: String,
    /// File name of the test manifest
    pub test_file: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_size: DEFAULT_VALIDATION_SIZE,
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
            format: ManifestFormat::default(),
            train_file: TRAIN_MANIFEST.to_string(),
            validation_file: VALIDATION_MANIFEST.to_string(),
            test_file: TEST_MANIFEST.to_string(),
        }
    }
}

impl SplitConfig {
    pub fn new(validation_size: usize, test_size: usize, seed: u64) -> Self {
        Self {
            validation_size,
            test_size,
            seed,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let files = [&self.train_file, &self.validation_file, &self.test_file];
        if files.iter().any(|f| f.trim().is_empty()) {
            return Err(FinetuneError::Config(
                "manifest file names must not be empty".to_string(),
            ));
        }
        if files[0] == files[1] || files[0] == files[2] || files[1] == files[2] {
            return Err(FinetuneError::Config(
                "train, validation and test manifests must use distinct file names".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FinetuneError::Serialization(e.to_string()))?;
        std::fs::write(path, json).with_path(path)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&json).map_err(|e| FinetuneError::Serialization(e.to_string()))
    }
}

/// The three disjoint sample sets produced by a split
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplits {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
    pub test: Vec<Sample>,
}

impl DatasetSplits {
    /// Total number of samples over all three sets
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// Per-set and per-class counts
    pub fn report(&self) -> SplitReport {
        let mut class_counts: BTreeMap<String, [usize; 3]> = BTreeMap::new();
        for (slot, set) in [&self.train, &self.validation, &self.test].into_iter().enumerate() {
            for sample in set {
                class_counts.entry(sample.label.clone()).or_default()[slot] += 1;
            }
        }

        SplitReport {
            train: self.train.len(),
            validation: self.validation.len(),
            test: self.test.len(),
            class_counts,
        }
    }
}

/// Paths of the three manifests inside an output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub train: PathBuf,
    pub validation: PathBuf,
    pub test: PathBuf,
}

/// Statistics about a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
    /// label -> [train, validation, test]
    pub class_counts: BTreeMap<String, [usize; 3]>,
}

impl SplitReport {
    pub fn total(&self) -> usize {
        self.train + self.validation + self.test
    }

    pub fn num_classes(&self) -> usize {
        self.class_counts.len()
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total();
        writeln!(f, "Dataset Split Statistics:")?;
        writeln!(f, "  Total samples: {}", total)?;
        writeln!(f, "  Number of classes: {}", self.num_classes())?;
        writeln!(f, "  Train set: {} ({:.1}%)", self.train, percent(self.train, total))?;
        writeln!(
            f,
            "  Validation set: {} ({:.1}%)",
            self.validation,
            percent(self.validation, total)
        )?;
        writeln!(f, "  Test set: {} ({:.1}%)", self.test, percent(self.test, total))?;
        writeln!(f, "  Per class (train / validation / test):")?;
        for (label, [train, validation, test]) in &self.class_counts {
            writeln!(f, "    {:30} {:>6} / {:>5} / {:>5}", label, train, validation, test)?;
        }
        Ok(())
    }
}

/// Discovers labeled images, splits them and writes the manifests
#[derive(Debug, Clone, Default)]
pub struct DatasetSplitter {
    config: SplitConfig,
}

impl DatasetSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Collect `(root/<label>/<file>, label)` for every regular file one level
    /// below each immediate subdirectory of `root`.
    ///
    /// Symlinks to files count as files. Top-level files are ignored, as are
    /// directories nested inside a class directory and dangling symlinks. Output is sorted by label, then by file name.
    pub fn discover(root: impl AsRef<Path>) -> Result<Vec<Sample>> {
        let root = root.as_ref();

        let mut class_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(root).with_path(root)? {
            let entry = entry.with_path(root)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) => class_dirs.push((name.to_string(), path)),
                None => warn!("Skipping class directory with non UTF-8 name: {:?}", path),
            }
        }
        class_dirs.sort();

        let mut samples = Vec::new();
        for (label, class_dir) in &class_dirs {
            let before = samples.len();
            for entry in WalkDir::new(class_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| class_dir.clone());
                    FinetuneError::filesystem(path, e.into())
                })?;
                // follows symlinks; a dangling link is not a file
                if entry.path().is_file() {
                    samples.push(Sample::new(entry.into_path(), label.clone()));
                } else if entry.path_is_symlink() && !entry.path().exists() {
                    warn!("Skipping dangling symlink {:?}", entry.path());
                }
            }
            debug!("Class '{}': {} files", label, samples.len() - before);
        }

        info!(
            "Discovered {} samples in {} classes under {:?}",
            samples.len(),
            class_dirs.len(),
            root
        );
        Ok(samples)
    }

    /// Stratified three-way split.
    ///
    /// Fails with [`FinetuneError::SplitSize`] when `validation_size +
    /// test_size` exceeds the number of samples or when some class cannot
    /// get at least one sample in each of the three sets.
    pub fn split(
        samples: &[Sample],
        validation_size: usize,
        test_size: usize,
        seed: u64,
    ) -> Result<DatasetSplits> {
        let total = samples.len();
        if total == 0 {
            return Err(FinetuneError::SplitSize("no samples to split".to_string()));
        }

        let held_out = validation_size
            .checked_add(test_size)
            .filter(|&n| n <= total)
            .ok_or_else(|| {
                FinetuneError::SplitSize(format!(
                    "validation_size ({}) + test_size ({}) exceeds the {} available samples",
                    validation_size, test_size, total
                ))
            })?;
        let sizes = [validation_size, test_size, total - held_out];

        let mut by_class: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
        for sample in samples {
            by_class.entry(sample.label.as_str()).or_default().push(sample);
        }
        let num_classes = by_class.len();

        for (name, size) in SPLIT_NAMES.iter().zip(sizes) {
            if size < num_classes {
                return Err(FinetuneError::SplitSize(format!(
                    "{} set of {} samples cannot hold one sample from each of the {} classes",
                    name, size, num_classes
                )));
            }
        }
        for (label, members) in &by_class {
            if members.len() < SPLIT_NAMES.len() {
                return Err(FinetuneError::SplitSize(format!(
                    "class '{}' has {} samples, at least {} are needed to appear in every set",
                    label,
                    members.len(),
                    SPLIT_NAMES.len()
                )));
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
        let allocation = apportion(&counts, sizes, &mut rng)?;

        let mut splits = DatasetSplits::default();
        for ((label, mut members), quota) in by_class.into_iter().zip(allocation) {
            if let Some(slot) = quota.iter().position(|&n| n == 0) {
                return Err(FinetuneError::SplitSize(format!(
                    "class '{}' ({} samples) is too small to be represented in the {} set",
                    label,
                    members.len(),
                    SPLIT_NAMES[slot]
                )));
            }

            members.sort();
            members.shuffle(&mut rng);

            let (validation, rest) = members.split_at(quota[0]);
            let (test, train) = rest.split_at(quota[1]);
            splits.validation.extend(validation.iter().map(|s| (*s).clone()));
            splits.test.extend(test.iter().map(|s| (*s).clone()));
            splits.train.extend(train.iter().map(|s| (*s).clone()));
        }

        splits.train.shuffle(&mut rng);
        splits.validation.shuffle(&mut rng);
        splits.test.shuffle(&mut rng);

        debug!(
            "Split {} samples into train={} validation={} test={} (seed {})",
            total,
            splits.train.len(),
            splits.validation.len(),
            splits.test.len(),
            seed
        );
        Ok(splits)
    }

    /// Split with the sizes and seed of this splitter's configuration
    pub fn split_samples(&self, samples: &[Sample]) -> Result<DatasetSplits> {
        Self::split(
            samples,
            self.config.validation_size,
            self.config.test_size,
            self.config.seed,
        )
    }

    /// Write `samples` as a manifest at `path`, replacing any existing file
    pub fn persist(&self, samples: &[Sample], path: impl AsRef<Path>) -> Result<()> {
        write_manifest(samples, path, self.config.format)
    }

    /// Manifest locations inside `out_dir`
    pub fn manifest_paths(&self, out_dir: impl AsRef<Path>) -> ManifestPaths {
        let out_dir = out_dir.as_ref();
        ManifestPaths {
            train: out_dir.join(&self.config.train_file),
            validation: out_dir.join(&self.config.validation_file),
            test: out_dir.join(&self.config.test_file),
        }
    }

    /// Discover, split and persist all three manifests into `out_dir`
    pub fn run(&self, root: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<SplitReport> {
        self.config.validate()?;

        let samples = Self::discover(root)?;
        let splits = self.split_samples(&samples)?;

        let out_dir = out_dir.as_ref();
        std::fs::create_dir_all(out_dir).with_path(out_dir)?;
        let paths = self.manifest_paths(out_dir);

        self.persist(&splits.train, &paths.train)?;
        self.persist(&splits.validation, &paths.validation)?;
        self.persist(&splits.test, &paths.test)?;

        info!(
            "Wrote manifests {:?}, {:?}, {:?}",
            paths.train, paths.validation, paths.test
        );
        Ok(splits.report())
    }
}

/// Integer allocation of each class's samples over the three sets.
///
/// Every cell is the floor or the ceiling of the proportional share
/// `count * size / total`; rows sum to the class counts and columns sum to
/// the requested sizes. Choosing which cells round up is a bipartite flow
/// from classes to sets, which always has an integral solution. Rounding up
/// a cell whose floor is already non-zero costs 1 and rounding up an empty
/// cell is free, so the cheapest flow fills as many empty cells as possible.
/// If one is still zero afterwards, no floor/ceiling allocation fills them all.
fn apportion(
    counts: &[usize],
    sizes: [usize; 3],
    rng: &mut ChaCha8Rng,
) -> Result<Vec<[usize; 3]>> {
    let total: usize = counts.iter().sum();
    let num_classes = counts.len();

    let mut allocation = vec![[0usize; 3]; num_classes];
    let mut can_round_up = vec![[false; 3]; num_classes];
    let mut row_need = vec![0usize; num_classes];
    for (class, &count) in counts.iter().enumerate() {
        for slot in 0..3 {
            let share = count as u128 * sizes[slot] as u128;
            allocation[class][slot] = (share / total as u128) as usize;
            can_round_up[class][slot] = share % total as u128 != 0;
        }
        row_need[class] = count - allocation[class].iter().sum::<usize>();
    }
    let mut col_need = [0usize; 3];
    for slot in 0..3 {
        col_need[slot] = sizes[slot] - allocation.iter().map(|row| row[slot]).sum::<usize>();
    }

    // nodes: source, one per class, one per set, sink
    let source = 0;
    let first_set = num_classes + 1;
    let sink = num_classes + 4;
    let mut network = FlowNetwork::new(num_classes + 5);

    // among equally cheap choices the seed decides which classes round up
    let mut order: Vec<usize> = (0..num_classes).collect();
    order.shuffle(rng);

    let mut round_up_edges = Vec::new();
    for &class in &order {
        network.add_edge(source, 1 + class, row_need[class], 0);
        for slot in 0..3 {
            if can_round_up[class][slot] {
                let cost = if allocation[class][slot] == 0 { 0 } else { 1 };
                let edge = network.add_edge(1 + class, first_set + slot, 1, cost);
                round_up_edges.push((class, slot, edge));
            }
        }
    }
    for (slot, &need) in col_need.iter().enumerate() {
        network.add_edge(first_set + slot, sink, need, 0);
    }

    let required: usize = row_need.iter().sum();
    let flow = network.min_cost_flow(source, sink);
    if flow != required {
        return Err(FinetuneError::SplitSize(
            "cannot apportion classes over the requested set sizes".to_string(),
        ));
    }

    for (class, slot, edge) in round_up_edges {
        allocation[class][slot] += network.flow(edge);
    }
    Ok(allocation)
}

/// Residual graph for min-cost max flow by successive shortest paths.
/// Edges are stored in pairs: `e` forward, `e ^ 1` its reverse.
struct FlowNetwork {
    adjacency: Vec<Vec<usize>>,
    target: Vec<usize>,
    capacity: Vec<usize>,
    cost: Vec<i64>,
}

impl FlowNetwork {
    fn new(nodes: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); nodes],
            target: Vec::new(),
            capacity: Vec::new(),
            cost: Vec::new(),
        }
    }

    fn add_edge(&mut self, from: usize, to: usize, capacity: usize, cost: i64) -> usize {
        let edge = self.target.len();
        self.target.push(to);
        self.capacity.push(capacity);
        self.cost.push(cost);
        self.adjacency[from].push(edge);
        self.target.push(from);
        self.capacity.push(0);
        self.cost.push(-cost);
        self.adjacency[to].push(edge + 1);
        edge
    }

    /// Flow currently pushed through forward edge `edge`
    fn flow(&self, edge: usize) -> usize {
        self.capacity[edge ^ 1]
    }

    /// Maximum flow from `source` to `sink`, of minimum total cost among
    /// maximum flows. Each round augments along a cheapest residual path
    /// found with Bellman-Ford (SPFA), since reverse edges carry negative
    /// costs.
    fn min_cost_flow(&mut self, source: usize, sink: usize) -> usize {
        let nodes = self.adjacency.len();
        let mut total = 0;

        loop {
            let mut distance = vec![i64::MAX; nodes];
            let mut parent: Vec<Option<usize>> = vec![None; nodes];
            let mut queued = vec![false; nodes];
            distance[source] = 0;
            queued[source] = true;
            let mut queue = VecDeque::from([source]);

            while let Some(node) = queue.pop_front() {
                queued[node] = false;
                for &edge in &self.adjacency[node] {
                    if self.capacity[edge] == 0 {
                        continue;
                    }
                    let next = self.target[edge];
                    let candidate = distance[node] + self.cost[edge];
                    if candidate < distance[next] {
                        distance[next] = candidate;
                        parent[next] = Some(edge);
                        if !queued[next] {
                            queued[next] = true;
                            queue.push_back(next);
                        }
                    }
                }
            }

            if distance[sink] == i64::MAX {
                return total;
            }

            let mut bottleneck = usize::MAX;
            let mut node = sink;
            while let Some(edge) = parent[node] {
                bottleneck = bottleneck.min(self.capacity[edge]);
                node = self.target[edge ^ 1];
            }

            let mut node = sink;
            while let Some(edge) = parent[node] {
                self.capacity[edge] -= bottleneck;
                self.capacity[edge ^ 1] += bottleneck;
                node = self.target[edge ^ 1];
            }

            total += bottleneck;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::manifest::read_manifest;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn make_samples(class_sizes: &[(&str, usize)]) -> Vec<Sample> {
        let mut samples = Vec::new();
        for (label, n) in class_sizes {
            for i in 0..*n {
                samples.push(Sample::new(format!("root/{}/{}.jpg", label, i), *label));
            }
        }
        samples
    }

    fn as_set(samples: &[Sample]) -> HashSet<Sample> {
        samples.iter().cloned().collect()
    }

    fn count_label(samples: &[Sample], label: &str) -> usize {
        samples.iter().filter(|s| s.label == label).count()
    }

    #[test]
    fn test_discover_uses_directory_names_as_labels() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("catA")).unwrap();
        fs::create_dir(root.join("dogB")).unwrap();
        fs::create_dir(root.join("dogB").join("nested")).unwrap();
        fs::write(root.join("catA").join("1.jpg"), b"x").unwrap();
        fs::write(root.join("catA").join("2.jpg"), b"x").unwrap();
        fs::write(root.join("dogB").join("3.jpg"), b"x").unwrap();
        fs::write(root.join("dogB").join("nested").join("4.jpg"), b"x").unwrap();
        fs::write(root.join("README.txt"), b"top-level file").unwrap();

        let samples = DatasetSplitter::discover(root).unwrap();

        assert_eq!(
            samples,
            vec![
                Sample::new(root.join("catA").join("1.jpg"), "catA"),
                Sample::new(root.join("catA").join("2.jpg"), "catA"),
                Sample::new(root.join("dogB").join("3.jpg"), "dogB"),
            ]
        );
    }

    #[test]
    fn test_discover_missing_root() {
        let result = DatasetSplitter::discover("/definitely/not/here");
        assert!(matches!(result, Err(FinetuneError::Filesystem { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_follows_symlinked_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("images");
        let elsewhere = dir.path().join("elsewhere");
        fs::create_dir_all(root.join("catA")).unwrap();
        fs::create_dir(&elsewhere).unwrap();
        fs::write(elsewhere.join("real.jpg"), b"x").unwrap();
        fs::write(root.join("catA").join("1.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(elsewhere.join("real.jpg"), root.join("catA").join("2.jpg"))
            .unwrap();
        std::os::unix::fs::symlink(elsewhere.join("gone.jpg"), root.join("catA").join("3.jpg"))
            .unwrap();
        std::os::unix::fs::symlink(&elsewhere, root.join("catA").join("linked_dir")).unwrap();

        let samples = DatasetSplitter::discover(&root).unwrap();

        assert_eq!(
            samples,
            vec![
                Sample::new(root.join("catA").join("1.jpg"), "catA"),
                Sample::new(root.join("catA").join("2.jpg"), "catA"),
            ]
        );
    }

    #[test]
    fn test_two_per_class_cannot_be_stratified() {
        let samples = make_samples(&[("catA", 2), ("dogB", 2)]);
        let result = DatasetSplitter::split(&samples, 1, 1, 42);
        assert!(matches!(result, Err(FinetuneError::SplitSize(_))));
    }

    #[test]
    fn test_ten_per_class_succeeds() {
        let samples = make_samples(&[("catA", 10), ("dogB", 10)]);
        let splits = DatasetSplitter::split(&samples, 2, 2, 42).unwrap();

        assert_eq!(splits.train.len(), 16);
        assert_eq!(splits.validation.len(), 2);
        assert_eq!(splits.test.len(), 2);
        for set in [&splits.train, &splits.validation, &splits.test] {
            assert!(count_label(set, "catA") >= 1);
            assert!(count_label(set, "dogB") >= 1);
        }
    }

    #[test]
    fn test_held_out_larger_than_dataset() {
        let samples = make_samples(&[("a", 5), ("b", 5)]);
        let result = DatasetSplitter::split(&samples, 6, 5, 42);
        assert!(matches!(result, Err(FinetuneError::SplitSize(_))));
    }

    #[test]
    fn test_tiny_class_is_rejected() {
        let samples = make_samples(&[("big", 100), ("tiny", 2)]);
        let result = DatasetSplitter::split(&samples, 10, 10, 42);
        assert!(matches!(result, Err(FinetuneError::SplitSize(_))));
    }

    #[test]
    fn test_underrepresented_class_is_rejected() {
        // 3 of 1003 samples: proportional share of a 10-sample set rounds to 0
        let samples = make_samples(&[("big", 1000), ("rare", 3)]);
        let result = DatasetSplitter::split(&samples, 10, 10, 42);
        assert!(matches!(result, Err(FinetuneError::SplitSize(_))));
    }

    #[test]
    fn test_small_class_is_represented_for_every_seed() {
        // shares of "r" are 0.6 / 0.6 / 3.8: both held-out sets must round up
        let samples = make_samples(&[("big", 95), ("r", 5)]);
        for seed in 0..50 {
            let splits = DatasetSplitter::split(&samples, 12, 12, seed)
                .unwrap_or_else(|e| panic!("seed {} rejected: {}", seed, e));
            let report = splits.report();
            assert_eq!(report.class_counts["r"], [3, 1, 1], "seed {}", seed);
            assert_eq!(report.class_counts["big"], [73, 11, 11], "seed {}", seed);
            for counts in report.class_counts.values() {
                assert!(counts.iter().all(|&n| n >= 1), "seed {}", seed);
            }
        }
    }

    #[test]
    fn test_small_classes_fill_held_out_sets_first() {
        // several classes with a fractional held-out share compete for the
        // few cells left after flooring
        let samples = make_samples(&[("a", 6), ("b", 7), ("c", 8), ("big", 79)]);
        for seed in 0..30 {
            let splits = DatasetSplitter::split(&samples, 15, 15, seed)
                .unwrap_or_else(|e| panic!("seed {} rejected: {}", seed, e));
            assert_eq!(splits.validation.len(), 15);
            assert_eq!(splits.test.len(), 15);
            for (label, counts) in &splits.report().class_counts {
                assert!(counts.iter().all(|&n| n >= 1), "seed {} class {}", seed, label);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            DatasetSplitter::split(&[], 0, 0, 42),
            Err(FinetuneError::SplitSize(_))
        ));
    }

    #[test]
    fn test_sizes_are_exact_and_sets_disjoint() {
        let samples = make_samples(&[("a", 7), ("b", 13), ("c", 30), ("d", 50)]);

        for (validation_size, test_size) in [(15, 15), (20, 25), (30, 30), (40, 17)] {
            let splits = DatasetSplitter::split(&samples, validation_size, test_size, 7).unwrap();

            assert_eq!(splits.validation.len(), validation_size);
            assert_eq!(splits.test.len(), test_size);
            assert_eq!(splits.total(), samples.len());

            let train = as_set(&splits.train);
            let validation = as_set(&splits.validation);
            let test = as_set(&splits.test);
            assert!(train.is_disjoint(&validation));
            assert!(train.is_disjoint(&test));
            assert!(validation.is_disjoint(&test));

            let union: HashSet<Sample> = train.union(&validation).cloned().collect();
            let union: HashSet<Sample> = union.union(&test).cloned().collect();
            assert_eq!(union, as_set(&samples));
        }
    }

    #[test]
    fn test_each_class_within_one_sample_of_its_share() {
        let classes = [("a", 7), ("b", 13), ("c", 30), ("d", 50), ("e", 11)];
        let samples = make_samples(&classes);
        let total = samples.len();

        for seed in 0..5 {
            let splits = DatasetSplitter::split(&samples, 19, 26, seed).unwrap();
            for (label, n) in classes {
                for set in [&splits.train, &splits.validation, &splits.test] {
                    // |count - n * |set| / total| < 1
                    let count = count_label(set, label) as i64;
                    let scaled = count * total as i64;
                    let expected = (n * set.len()) as i64;
                    assert!(
                        (scaled - expected).abs() < total as i64,
                        "class {} has {} of {} samples",
                        label,
                        count,
                        set.len()
                    );
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_partition() {
        let samples = make_samples(&[("a", 20), ("b", 35), ("c", 45)]);
        let first = DatasetSplitter::split(&samples, 10, 20, 42).unwrap();
        let second = DatasetSplitter::split(&samples, 10, 20, 42).unwrap();
        assert_eq!(first, second);

        let mut reversed = samples.clone();
        reversed.reverse();
        let third = DatasetSplitter::split(&reversed, 10, 20, 42).unwrap();
        assert_eq!(as_set(&first.train), as_set(&third.train));
        assert_eq!(as_set(&first.validation), as_set(&third.validation));
        assert_eq!(as_set(&first.test), as_set(&third.test));
    }

    #[test]
    fn test_different_seed_changes_partition() {
        let samples = make_samples(&[("a", 200), ("b", 300)]);
        let first = DatasetSplitter::split(&samples, 50, 50, 1).unwrap();
        let second = DatasetSplitter::split(&samples, 50, 50, 2).unwrap();
        assert_ne!(as_set(&first.test), as_set(&second.test));
    }

    #[test]
    fn test_report_counts() {
        let samples = make_samples(&[("catA", 10), ("dogB", 10)]);
        let report = DatasetSplitter::split(&samples, 2, 2, 42).unwrap().report();

        assert_eq!(report.total(), 20);
        assert_eq!(report.num_classes(), 2);
        assert_eq!(report.class_counts["catA"], [8, 1, 1]);
        assert_eq!(report.class_counts["dogB"], [8, 1, 1]);
        assert!(report.to_string().contains("Validation set: 2 (10.0%)"));
    }

    #[test]
    fn test_run_writes_three_manifests() {
        let data = TempDir::new().unwrap();
        for label in ["catA", "dogB"] {
            fs::create_dir(data.path().join(label)).unwrap();
            for i in 0..10 {
                fs::write(data.path().join(label).join(format!("{}.jpg", i)), b"x").unwrap();
            }
        }
        let out = TempDir::new().unwrap();

        let splitter = DatasetSplitter::new(SplitConfig::new(2, 4, 42));
        let report = splitter.run(data.path(), out.path()).unwrap();
        assert_eq!((report.train, report.validation, report.test), (14, 2, 4));

        let paths = splitter.manifest_paths(out.path());
        let format = splitter.config().format;
        let train = read_manifest(&paths.train, format).unwrap();
        let validation = read_manifest(&paths.validation, format).unwrap();
        let test = read_manifest(&paths.test, format).unwrap();
        assert_eq!(train.len() + validation.len() + test.len(), 20);

        let discovered = DatasetSplitter::discover(data.path()).unwrap();
        let mut written: Vec<Sample> = train.into_iter().chain(validation).chain(test).collect();
        written.sort();
        assert_eq!(written, discovered);
    }

    #[test]
    fn test_config_validation_and_json() {
        let mut config = SplitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation_size, 2000);
        assert_eq!(config.test_size, 3000);

        config.test_file = config.train_file.clone();
        assert!(config.validate().is_err());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("split.json");
        let config = SplitConfig {
            format: ManifestFormat::JsonLines,
            ..SplitConfig::new(5, 6, 7)
        };
        config.save(&path).unwrap();
        assert_eq!(SplitConfig::load(&path).unwrap(), config);
    }
}
