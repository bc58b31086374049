use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::combinator::Dataset;
use crate::model::RecordId;
use crate::vector::Differences;

/// Neighbors returned per query.
pub const DEFAULT_NEIGHBORS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: RecordId,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    score: OrderedFloat<f64>,
    order: usize,
    id: RecordId,
}

// Greater is better: higher score, then earlier corpus position.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.order.cmp(&self.order))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exhaustive top-K ranking over a corpus.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityEngine {
    limit: usize,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBORS)
    }
}

impl SimilarityEngine {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Scores every corpus record against `query` and keeps the best `limit`,
    /// most similar first. The query itself is never returned; ties keep
    /// corpus order. The query only has to exist in the store, not in the corpus.
    pub fn rank(&self, corpus: &Dataset, query: RecordId) -> Vec<Neighbor> {
        if corpus.len() <= 1 || self.limit == 0 {
            return Vec::new();
        }
        let store = corpus.store();
        let Some(query_slot) = store.slot(query) else {
            warn!(query, "rank requested for unknown record");
            return Vec::new();
        };
        let query_side = (store.record_at(query_slot), store.features_at(query_slot));

        // Min-heap on candidate quality; the root is the weakest kept neighbor.
        let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(self.limit + 1);
        for (order, &slot) in corpus.slots().iter().enumerate() {
            if slot == query_slot {
                continue;
            }
            let candidate_side = (store.record_at(slot), store.features_at(slot));
            let score = Differences::between(candidate_side, query_side).score();

            heap.push(Reverse(Candidate {
                score: OrderedFloat(score),
                order,
                id: candidate_side.0.id,
            }));
            if heap.len() > self.limit {
                heap.pop();
            }
        }

        let ranked: Vec<Neighbor> = heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| Neighbor { id: c.id, score: c.score.into_inner() })
            .collect();
        debug!(query, corpus = corpus.len(), returned = ranked.len(), "ranked neighbors");
        ranked
    }

    pub fn rank_ids(&self, corpus: &Dataset, query: RecordId) -> Vec<RecordId> {
        self.rank(corpus, query).into_iter().map(|n| n.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, LabelSet, Record, ReleaseDate};
    use crate::store::RecordStore;
    use std::sync::Arc;

    fn record(id: RecordId, price: u64, rating: f64) -> Record {
        Record {
            id,
            name: format!("Game {id}"),
            url: String::new(),
            image: String::new(),
            released: ReleaseDate { year: 2012, month: 8, day: 1 },
            price,
            rating,
            duration: 20.0,
            difficulty: Difficulty::Tough,
            genres: ["Strategy"].into_iter().collect(),
            modes: ["Single-player"].into_iter().collect(),
            tags: LabelSet::new(),
            platforms: Vec::new(),
        }
    }

    fn corpus(records: Vec<Record>) -> Dataset {
        Dataset::full(Arc::new(RecordStore::from_records(records, 1648.0).unwrap()))
    }

    #[test]
    fn tiny_corpora_have_no_neighbors() {
        let engine = SimilarityEngine::default();
        assert!(engine.rank(&corpus(Vec::new()), 1).is_empty());
        assert!(engine.rank(&corpus(vec![record(1, 100, 50.0)]), 1).is_empty());
    }

    #[test]
    fn unknown_query_yields_nothing() {
        let engine = SimilarityEngine::default();
        let data = corpus(vec![record(1, 100, 50.0), record(2, 100, 60.0)]);
        assert!(engine.rank(&data, 42).is_empty());
    }

    #[test]
    fn keeps_best_nine_and_excludes_query() {
        let records: Vec<Record> = (0..20).map(|i| record(i, 1000, 50.0 + i as f64)).collect();
        let data = corpus(records);
        let ranked = SimilarityEngine::default().rank(&data, 10);

        assert_eq!(ranked.len(), 9);
        assert!(ranked.iter().all(|n| n.id != 10));
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        let mut closest = vec![ranked[0].id, ranked[1].id];
        closest.sort();
        assert_eq!(closest, vec![9, 11]);
    }

    #[test]
    fn ties_keep_corpus_order() {
        let records: Vec<Record> = (1..=5).map(|i| record(i, 500, 70.0)).collect();
        let data = corpus(records);
        assert_eq!(SimilarityEngine::new(3).rank_ids(&data, 3), vec![1, 2, 4]);
    }
}
