//! Per-view aggregates, derived from datasets carried on the bus.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;

use crate::combinator::Dataset;
use crate::filter::Dimension;
use crate::index::Neighbor;
use crate::model::{LabelSet, Record, RecordId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarCount {
    pub label: String,
    pub count: usize,
}

/// Bars of a categorical view: totals from the view's whole dataset, plus the
/// filtered counts drawn on top when the working dataset is narrower.
#[derive(Debug, Clone, PartialEq)]
pub struct BarModel {
    pub dimension: Dimension,
    pub whole: Vec<BarCount>,
    pub subset: Option<Vec<BarCount>>,
    pub active: LabelSet,
}

impl BarModel {
    pub fn is_highlighted(&self, label: &str) -> bool {
        self.active.is_empty() || self.active.contains(label)
    }
}

/// Label frequencies, most frequent first, ties by label.
pub fn category_counts(dataset: &Dataset, dimension: Dimension) -> Vec<BarCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in dataset.records() {
        for label in dimension.labels(record) {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    let mut bars: Vec<BarCount> = counts
        .into_iter()
        .map(|(label, count)| BarCount { label: label.to_string(), count })
        .collect();
    bars.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    bars
}

pub fn bar_model(dimension: Dimension, whole: &Dataset, working: &Dataset, active: LabelSet) -> BarModel {
    let whole_bars = category_counts(whole, dimension);
    let subset = if working == whole {
        None
    } else {
        let order: HashMap<&str, usize> = whole_bars
            .iter()
            .enumerate()
            .map(|(i, b)| (b.label.as_str(), i))
            .collect();
        let mut bars = category_counts(working, dimension);
        bars.sort_by_key(|b| order.get(b.label.as_str()).copied().unwrap_or(usize::MAX));
        Some(bars)
    };
    BarModel { dimension, whole: whole_bars, subset, active }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagShare {
    pub tag: String,
    pub count: usize,
    /// Share of all tag occurrences among the kept tags.
    pub proportion: f64,
}

pub fn tag_proportions(dataset: &Dataset, limit: usize) -> Vec<TagShare> {
    let mut bars = category_counts(dataset, Dimension::Tag);
    bars.truncate(limit);
    let total: usize = bars.iter().map(|b| b.count).sum();
    bars.into_iter()
        .map(|b| TagShare {
            proportion: if total == 0 { 0.0 } else { b.count as f64 / total as f64 },
            tag: b.label,
            count: b.count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterModel {
    pub points: Vec<RecordId>,
    pub price_extent: Option<(u64, u64)>,
    pub rating_extent: Option<(f64, f64)>,
}

fn by_rating_desc<'a>(dataset: &'a Dataset) -> Vec<&'a Record> {
    let mut records: Vec<&Record> = dataset.records().collect();
    records.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    records
}

/// Highest rated `limit` points once the dataset reaches `limit`; all points otherwise.
pub fn scatter_model(dataset: &Dataset, limit: usize) -> ScatterModel {
    let points: Vec<&Record> = if dataset.len() >= limit {
        by_rating_desc(dataset).into_iter().take(limit).collect()
    } else {
        dataset.records().collect()
    };

    let price_extent = points.iter().map(|r| r.price).fold(None, |acc: Option<(u64, u64)>, p| {
        Some(acc.map_or((p, p), |(lo, hi)| (lo.min(p), hi.max(p))))
    });
    let rating_extent = points.iter().map(|r| r.rating).fold(None, |acc: Option<(f64, f64)>, v| {
        Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
    });

    ScatterModel {
        points: points.iter().map(|r| r.id).collect(),
        price_extent,
        rating_extent,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelSort {
    #[default]
    Rating,
    Price,
    Duration,
    Difficulty,
}

impl ParallelSort {
    fn key(self, record: &Record) -> f64 {
        match self {
            ParallelSort::Rating => record.rating,
            ParallelSort::Price => record.price as f64,
            ParallelSort::Duration => record.duration,
            ParallelSort::Difficulty => record.difficulty.scale(),
        }
    }
}

impl FromStr for ParallelSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rating" => Ok(ParallelSort::Rating),
            "price" => Ok(ParallelSort::Price),
            "duration" | "time" => Ok(ParallelSort::Duration),
            "difficulty" => Ok(ParallelSort::Difficulty),
            other => Err(format!("cannot sort titles by {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelRow {
    pub position: usize,
    pub id: RecordId,
    pub name: String,
    pub selected: bool,
}

/// Rows of the parallel-coordinates view: the top rated titles, or the
/// selected title followed by its neighbors, ordered by `sort` descending.
pub fn parallel_model(
    dataset: &Dataset,
    focus: Option<(RecordId, &[Neighbor])>,
    sort: ParallelSort,
    top: usize,
) -> Vec<ParallelRow> {
    let store = dataset.store();
    let mut rows: Vec<&Record> = match focus {
        Some((selected, neighbors)) => store
            .get(selected)
            .into_iter()
            .chain(neighbors.iter().filter(|n| dataset.contains(n.id)).filter_map(|n| store.get(n.id)))
            .collect(),
        None => by_rating_desc(dataset).into_iter().take(top).collect(),
    };
    rows.sort_by(|a, b| sort.key(b).total_cmp(&sort.key(a)));

    let selected = focus.map(|(id, _)| id);
    rows.into_iter()
        .enumerate()
        .map(|(i, r)| ParallelRow {
            position: i + 1,
            id: r.id,
            name: r.name.clone(),
            selected: Some(r.id) == selected,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, ReleaseDate};
    use crate::store::RecordStore;
    use std::sync::Arc;

    fn record(id: RecordId, rating: f64, genres: &[&str], tags: &[&str]) -> Record {
        Record {
            id,
            name: format!("Game {id}"),
            url: String::new(),
            image: String::new(),
            released: ReleaseDate { year: 2018, month: 2, day: 2 },
            price: id * 100,
            rating,
            duration: 8.0,
            difficulty: Difficulty::Easy,
            genres: genres.iter().copied().collect(),
            modes: LabelSet::new(),
            tags: tags.iter().copied().collect(),
            platforms: Vec::new(),
        }
    }

    fn dataset() -> Dataset {
        Dataset::full(Arc::new(
            RecordStore::from_records(
                vec![
                    record(1, 60.0, &["RPG", "Indie"], &["Pixel Graphics"]),
                    record(2, 95.0, &["RPG"], &["Pixel Graphics", "Story Rich"]),
                    record(3, 70.0, &["Action"], &["Story Rich", "Pixel Graphics"]),
                ],
                1648.0,
            )
            .unwrap(),
        ))
    }

    #[test]
    fn counts_sort_by_frequency_then_label() {
        let bars = category_counts(&dataset(), Dimension::Genre);
        let flat: Vec<(&str, usize)> = bars.iter().map(|b| (b.label.as_str(), b.count)).collect();
        assert_eq!(flat, vec![("RPG", 2), ("Action", 1), ("Indie", 1)]);
    }

    #[test]
    fn subset_bars_only_when_narrower() {
        let all = dataset();
        let model = bar_model(Dimension::Genre, &all, &all, LabelSet::new());
        assert!(model.subset.is_none());
        assert!(model.is_highlighted("Action"));

        let store = all.store().clone();
        let mut filters = crate::filter::FilterSet::new(&store);
        filters.set_category_selection(Dimension::Tag, ["Story Rich"].into_iter().collect()).unwrap();
        let narrowed = crate::combinator::Combinator::new(store, &filters).combine(&filters);

        let model = bar_model(Dimension::Genre, &all, &narrowed, ["RPG"].into_iter().collect());
        let subset = model.subset.clone().unwrap();
        assert_eq!(subset.iter().map(|b| b.label.as_str()).collect::<Vec<_>>(), vec!["RPG", "Action"]);
        assert!(!model.is_highlighted("Action"));
    }

    #[test]
    fn tag_shares_sum_to_one() {
        let shares = tag_proportions(&dataset(), 50);
        assert_eq!(shares[0].tag, "Pixel Graphics");
        assert_eq!(shares[0].count, 3);
        let total: f64 = shares.iter().map(|s| s.proportion).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(tag_proportions(&dataset(), 1).len(), 1);
    }

    #[test]
    fn scatter_keeps_top_rated_when_full() {
        let model = scatter_model(&dataset(), 2);
        assert_eq!(model.points, vec![2, 3]);
        assert_eq!(model.price_extent, Some((200, 300)));
        assert_eq!(model.rating_extent, Some((70.0, 95.0)));

        let small = scatter_model(&dataset(), 10);
        assert_eq!(small.points, vec![1, 2, 3]);
    }

    #[test]
    fn parallel_rows_follow_the_chosen_sort() {
        let data = dataset();
        let rows = parallel_model(&data, None, ParallelSort::Price, 2);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(rows[0].position, 1);

        let neighbors = [Neighbor { id: 1, score: 0.9 }, Neighbor { id: 3, score: 0.5 }];
        let rows = parallel_model(&data, Some((2, &neighbors)), ParallelSort::Rating, 10);
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert!(rows[0].selected);
        assert!(!rows[1].selected);
    }

    #[test]
    fn sort_keys_parse() {
        assert_eq!("Difficulty".parse::<ParallelSort>(), Ok(ParallelSort::Difficulty));
        assert!("position".parse::<ParallelSort>().is_err());
    }
}
