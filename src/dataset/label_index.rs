//! Label string to dense class index mapping

use std::collections::{BTreeSet, HashMap};

use crate::utils::error::{FinetuneError, Result};

/// Maps each distinct label to an index in `[0, num_classes)`.
///
/// Labels are sorted lexicographically before indices are assigned, so the
/// same set of labels always yields the same mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelIndex {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelIndex {
    /// Build the index over the distinct values of `labels`
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();
        let labels: Vec<String> = distinct.into_iter().collect();
        let index = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx))
            .collect();

        Self { labels, index }
    }

    /// Index of `label`, if known
    pub fn get(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Index of `label`, failing with [`FinetuneError::UnknownLabel`]
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.get(label)
            .ok_or_else(|| FinetuneError::UnknownLabel(label.to_string()))
    }

    /// Label stored at `index`
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Labels ordered by index
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_sorted_and_contiguous() {
        let index = LabelIndex::from_labels(["dogB", "catA", "dogB", "bird", "catA"]);

        assert_eq!(index.len(), 3);
        assert_eq!(index.get("bird"), Some(0));
        assert_eq!(index.get("catA"), Some(1));
        assert_eq!(index.get("dogB"), Some(2));
        assert_eq!(index.label(2), Some("dogB"));
        assert_eq!(index.label(3), None);
    }

    #[test]
    fn test_independent_of_input_order() {
        let a = LabelIndex::from_labels(["z", "a", "m"]);
        let b = LabelIndex::from_labels(vec!["m".to_string(), "z".to_string(), "a".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_label() {
        let index = LabelIndex::from_labels(["cat"]);
        assert!(matches!(
            index.index_of("dog"),
            Err(FinetuneError::UnknownLabel(ref l)) if l == "dog"
        ));
    }

    #[test]
    fn test_empty() {
        let index = LabelIndex::from_labels(Vec::<String>::new());
        assert!(index.is_empty());
    }
}
