//! Visual vocabulary for Bag-of-Words place recognition.
//!
//! The vocabulary is a hierarchical k-means tree trained offline on binary
//! descriptors (DBoW2 text format). The front-end quantizes descriptors
//! against it, so the detection core only needs the tree's metadata and its
//! scoring rule: which similarity to apply to a pair of BoW vectors.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use super::vector::{l1_score, BowVector};

/// How two BoW vectors are compared. The tree's training fixes this; only
/// the L1 norm over TF-IDF weights is supported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringType {
    L1Norm,
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("vocabulary I/O error: {0}")]
    Io(String),
    #[error("vocabulary parse error: {0}")]
    Parse(String),
    #[error("unsupported vocabulary: scoring={scoring} weighting={weighting} (expected L1 / TF-IDF)")]
    Unsupported { scoring: u32, weighting: u32 },
}

/// Vocabulary metadata and scoring.
///
/// The node descriptors themselves are not retained: quantization happens in
/// the VIO front-end, and scoring only needs the header.
#[derive(Debug)]
pub struct Vocabulary {
    /// Branching factor.
    k: usize,
    /// Depth levels.
    l: usize,
    /// Number of leaf nodes (visual words).
    num_words: usize,
    scoring: ScoringType,
}

impl Vocabulary {
    /// Load vocabulary metadata from the DBoW2 text format.
    ///
    /// # File Format
    ///
    /// ```text
    /// k L scoring weighting
    /// parent_id is_leaf desc[0] ... desc[D-1] weight
    /// ...
    /// ```
    ///
    /// Line 1 is the header; each following line describes one node
    /// (excluding the root), with `is_leaf = 1` marking visual words.
    pub fn load_from_text<P: AsRef<Path>>(path: P) -> Result<Self, VocabularyError> {
        let file = File::open(path.as_ref())
            .map_err(|e| VocabularyError::Io(format!("failed to open vocabulary file: {}", e)))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header = lines
            .next()
            .ok_or_else(|| VocabularyError::Parse("empty vocabulary file".to_string()))?
            .map_err(|e| VocabularyError::Io(e.to_string()))?;

        let header_parts: Vec<&str> = header.split_whitespace().collect();
        if header_parts.len() < 4 {
            return Err(VocabularyError::Parse(
                "invalid header, expected: k L scoring weighting".to_string(),
            ));
        }

        let k: usize = header_parts[0]
            .parse()
            .map_err(|_| VocabularyError::Parse("invalid k value".to_string()))?;
        let l: usize = header_parts[1]
            .parse()
            .map_err(|_| VocabularyError::Parse("invalid L value".to_string()))?;
        let scoring: u32 = header_parts[2]
            .parse()
            .map_err(|_| VocabularyError::Parse("invalid scoring value".to_string()))?;
        let weighting: u32 = header_parts[3]
            .parse()
            .map_err(|_| VocabularyError::Parse("invalid weighting value".to_string()))?;

        // DBoW2 encodes L1_NORM scoring and TF_IDF weighting as 0.
        if scoring != 0 || weighting != 0 {
            return Err(VocabularyError::Unsupported { scoring, weighting });
        }

        let mut num_words = 0usize;
        for line_result in lines {
            let line = line_result.map_err(|e| VocabularyError::Io(e.to_string()))?;
            let mut parts = line.split_whitespace();

            // parent_id, then the leaf flag
            let Some(_parent) = parts.next() else {
                continue;
            };
            match parts.next() {
                Some("1") => num_words += 1,
                Some(_) => {}
                None => continue,
            }
        }

        tracing::info!(
            "Loaded vocabulary: k={}, L={}, {} words",
            k,
            l,
            num_words
        );

        Ok(Self {
            k,
            l,
            num_words,
            scoring: ScoringType::L1Norm,
        })
    }

    /// Tree parameters (branching factor, depth).
    pub fn params(&self) -> (usize, usize) {
        (self.k, self.l)
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    pub fn scoring(&self) -> ScoringType {
        self.scoring
    }

    /// Similarity between two BoW vectors under the vocabulary's scoring
    /// rule. In [0, 1]; identical vectors score 1.
    pub fn score(&self, v1: &BowVector, v2: &BowVector) -> f64 {
        match self.scoring {
            ScoringType::L1Norm => l1_score(v1, v2),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_vocab(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// A tiny two-word vocabulary in DBoW2 text format.
    fn tiny_vocab_text() -> String {
        let zeros = "0 ".repeat(32);
        format!(
            "2 1 0 0\n0 1 {z}0.5\n0 1 {z}0.5\n",
            z = zeros
        )
    }

    #[test]
    fn test_load_tiny_vocabulary() {
        let file = write_vocab(&tiny_vocab_text());
        let vocab = Vocabulary::load_from_text(file.path()).unwrap();

        assert_eq!(vocab.params(), (2, 1));
        assert_eq!(vocab.num_words(), 2);
        assert_eq!(vocab.scoring(), ScoringType::L1Norm);
    }

    #[test]
    fn test_inner_nodes_not_counted_as_words() {
        let zeros = "0 ".repeat(32);
        let text = format!(
            "2 2 0 0\n0 0 {z}0.0\n0 0 {z}0.0\n1 1 {z}0.5\n1 1 {z}0.5\n",
            z = zeros
        );
        let file = write_vocab(&text);
        let vocab = Vocabulary::load_from_text(file.path()).unwrap();

        assert_eq!(vocab.num_words(), 2);
    }

    #[test]
    fn test_unsupported_scoring_rejected() {
        let file = write_vocab("10 6 1 0\n");
        match Vocabulary::load_from_text(file.path()) {
            Err(VocabularyError::Unsupported { scoring: 1, .. }) => {}
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = write_vocab("");
        assert!(matches!(
            Vocabulary::load_from_text(file.path()),
            Err(VocabularyError::Parse(_))
        ));
    }

    #[test]
    fn test_score_delegates_to_l1() {
        let file = write_vocab(&tiny_vocab_text());
        let vocab = Vocabulary::load_from_text(file.path()).unwrap();

        let v1 = BowVector::from_pairs([(0, 0.5), (1, 0.5)]);
        let v2 = BowVector::from_pairs([(0, 0.5), (1, 0.5)]);
        assert!((vocab.score(&v1, &v2) - 1.0).abs() < 1e-12);
    }
}
