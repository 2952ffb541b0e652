//! Inverted-index Bag-of-Words database.
//!
//! Append-only store of BoW vectors with word-indexed retrieval: a query
//! only scores entries that share at least one visual word with it, the way
//! DBoW2 databases do.

use std::collections::HashMap;
use std::sync::Arc;

use super::vector::BowVector;
use super::vocabulary::Vocabulary;

/// A single query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Index of the matched entry (as returned by `add`).
    pub id: u32,
    /// Similarity score in [0, 1].
    pub score: f64,
}

/// Append-only BoW database over a shared vocabulary.
pub struct BowDatabase {
    vocab: Arc<Vocabulary>,
    entries: Vec<BowVector>,
    /// word_id -> indices of entries containing that word.
    inverted_index: HashMap<u32, Vec<u32>>,
}

impl BowDatabase {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self {
            vocab,
            entries: Vec::new(),
            inverted_index: HashMap::new(),
        }
    }

    /// Append a vector and return its assigned index.
    pub fn add(&mut self, v: BowVector) -> u32 {
        let id = self.entries.len() as u32;
        for word in v.words() {
            self.inverted_index.entry(word).or_default().push(id);
        }
        self.entries.push(v);
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&BowVector> {
        self.entries.get(id as usize)
    }

    /// Similarity between two vectors under the database's vocabulary,
    /// independent of stored entries.
    pub fn score(&self, v1: &BowVector, v2: &BowVector) -> f64 {
        self.vocab.score(v1, v2)
    }

    /// Query for the `max_results` most similar entries.
    ///
    /// Only entries sharing at least one word with the query are scored.
    /// When `max_id` is given, entries with index greater than `max_id` are
    /// excluded. Results are ordered by descending score, ties broken by
    /// ascending index. The database is not mutated.
    pub fn query(
        &self,
        v: &BowVector,
        max_results: usize,
        max_id: Option<u32>,
    ) -> Vec<QueryResult> {
        if max_results == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        // Entries sharing at least one word with the query. The per-word
        // posting lists are in ascending id order, so a merge via a seen-set
        // keeps candidate collection linear.
        let mut seen = vec![false; self.entries.len()];
        let mut candidates: Vec<u32> = Vec::new();
        for word in v.words() {
            if let Some(ids) = self.inverted_index.get(&word) {
                for &id in ids {
                    if let Some(limit) = max_id {
                        if id > limit {
                            continue;
                        }
                    }
                    if !seen[id as usize] {
                        seen[id as usize] = true;
                        candidates.push(id);
                    }
                }
            }
        }

        let mut results: Vec<QueryResult> = candidates
            .into_iter()
            .map(|id| QueryResult {
                id,
                score: self.vocab.score(v, &self.entries[id as usize]),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        results.truncate(max_results);
        results
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn test_vocab() -> Arc<Vocabulary> {
        let zeros = "0 ".repeat(32);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "2 1 0 0\n0 1 {z}0.5\n0 1 {z}0.5\n", z = zeros).unwrap();
        Arc::new(Vocabulary::load_from_text(file.path()).unwrap())
    }

    fn bow(pairs: &[(u32, f64)]) -> BowVector {
        BowVector::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_add_assigns_sequential_indices() {
        let mut db = BowDatabase::new(test_vocab());
        assert_eq!(db.add(bow(&[(0, 1.0)])), 0);
        assert_eq!(db.add(bow(&[(1, 1.0)])), 1);
        assert_eq!(db.add(bow(&[(2, 1.0)])), 2);
        assert_eq!(db.len(), 3);
    }

    #[test]
    fn test_query_identical_scores_one() {
        let mut db = BowDatabase::new(test_vocab());
        let v = bow(&[(0, 0.5), (1, 0.5)]);
        db.add(v.clone());

        let results = db.query(&v, 5, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 0);
        assert!((results[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_query_orders_by_descending_score() {
        let mut db = BowDatabase::new(test_vocab());
        db.add(bow(&[(0, 0.5), (9, 0.5)])); // half overlap
        db.add(bow(&[(0, 0.5), (1, 0.5)])); // exact
        db.add(bow(&[(7, 1.0)])); // disjoint, never scored

        let query = bow(&[(0, 0.5), (1, 0.5)]);
        let results = db.query(&query, 5, None);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[1].id, 0);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_query_ties_break_by_ascending_id() {
        let mut db = BowDatabase::new(test_vocab());
        let v = bow(&[(0, 0.5), (1, 0.5)]);
        db.add(v.clone());
        db.add(v.clone());
        db.add(v.clone());

        let results = db.query(&v, 2, None);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 0);
        assert_eq!(results[1].id, 1);
    }

    #[test]
    fn test_query_respects_max_id() {
        let mut db = BowDatabase::new(test_vocab());
        let v = bow(&[(0, 1.0)]);
        for _ in 0..5 {
            db.add(v.clone());
        }

        let results = db.query(&v, 10, Some(2));
        let ids: Vec<u32> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_query_does_not_mutate() {
        let mut db = BowDatabase::new(test_vocab());
        db.add(bow(&[(0, 1.0)]));

        let before = db.len();
        let _ = db.query(&bow(&[(0, 1.0)]), 3, None);
        let _ = db.query(&bow(&[(5, 1.0)]), 3, None);
        assert_eq!(db.len(), before);
    }

    #[test]
    fn test_query_empty_db() {
        let db = BowDatabase::new(test_vocab());
        assert!(db.query(&bow(&[(0, 1.0)]), 3, None).is_empty());
    }
}
