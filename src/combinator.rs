use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bit_vec::BitVec;
use tracing::debug;

use crate::filter::{Dimension, FilterSet};
use crate::model::{Record, RecordId};
use crate::store::RecordStore;

/// A subset of the record store, in store order.
#[derive(Clone)]
pub struct Dataset {
    store: Arc<RecordStore>,
    slots: Arc<[usize]>,
}

impl Dataset {
    pub fn full(store: Arc<RecordStore>) -> Self {
        let slots: Arc<[usize]> = (0..store.len()).collect();
        Self { store, slots }
    }

    fn from_mask(store: Arc<RecordStore>, mask: &BitVec) -> Self {
        let slots: Arc<[usize]> = mask.iter().enumerate().filter(|(_, keep)| *keep).map(|(slot, _)| slot).collect();
        Self { store, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.slots.iter().map(|&slot| self.store.record_at(slot))
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records().map(|r| r.id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.store
            .slot(id)
            .map_or(false, |slot| self.slots.binary_search(&slot).is_ok())
    }

    pub fn is_subset_of(&self, other: &Dataset) -> bool {
        self.slots.iter().all(|slot| other.slots.binary_search(slot).is_ok())
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store) && self.slots == other.slots
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
        .field("len", &self.len())
        .field("ids", &self.ids().collect::<Vec<_>>())
        .finish()
    }
}

/// Builds working datasets out of the filter set.
///
/// Each numeric dimension keeps its own mask over store slots, rescanned only
/// when that dimension changes. A combination ANDs the masks, then runs one
/// linear pass for the category selections. Leaving one dimension out of both
/// steps gives the "whole" dataset a view draws behind its own selection.
#[derive(Debug)]
pub struct Combinator {
    store: Arc<RecordStore>,
    masks: BTreeMap<Dimension, BitVec>,
}

impl Combinator {
    pub fn new(store: Arc<RecordStore>, filters: &FilterSet) -> Self {
        let mut combinator = Self { store, masks: BTreeMap::new() };
        combinator.refresh_all(filters);
        combinator
    }

    /// Rescans the mask of one numeric dimension. Category dimensions have no mask.
    pub fn refresh(&mut self, dimension: Dimension, filters: &FilterSet) {
        if !dimension.is_numeric() {
            return;
        }
        let mut mask = BitVec::from_elem(self.store.len(), false);
        for (slot, record) in self.store.records().iter().enumerate() {
            if filters.matches(dimension, record) {
                mask.set(slot, true);
            }
        }
        debug!(%dimension, kept = mask.iter().filter(|b| *b).count(), "mask refreshed");
        self.masks.insert(dimension, mask);
    }

    pub fn refresh_all(&mut self, filters: &FilterSet) {
        for dim in Dimension::NUMERIC {
            self.refresh(dim, filters);
        }
    }

    /// Records passing every filter.
    pub fn combine(&self, filters: &FilterSet) -> Dataset {
        self.intersect(filters, None)
    }

    /// Records passing every filter except `own`.
    pub fn combine_excluding(&self, filters: &FilterSet, own: Dimension) -> Dataset {
        self.intersect(filters, Some(own))
    }

    fn intersect(&self, filters: &FilterSet, skip: Option<Dimension>) -> Dataset {
        let mut acc = BitVec::from_elem(self.store.len(), true);
        for (dim, mask) in &self.masks {
            if Some(*dim) != skip {
                acc.and(mask);
            }
        }

        let categories: Vec<Dimension> = Dimension::CATEGORY
            .iter()
            .copied()
            .filter(|&d| Some(d) != skip && filters.is_active(d))
            .collect();
        if !categories.is_empty() {
            for slot in 0..self.store.len() {
                if acc[slot] {
                    let record = self.store.record_at(slot);
                    if !categories.iter().all(|&d| filters.matches(d, record)) {
                        acc.set(slot, false);
                    }
                }
            }
        }

        Dataset::from_mask(self.store.clone(), &acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, LabelSet, Platform, ReleaseDate};

    fn record(id: RecordId, price: u64, rating: f64, os: Platform, genre: &str) -> Record {
        Record {
            id,
            name: format!("Game {id}"),
            url: String::new(),
            image: String::new(),
            released: ReleaseDate { year: 2010, month: 5, day: 5 },
            price,
            rating,
            duration: 5.0,
            difficulty: Difficulty::JustRight,
            genres: [genre].into_iter().collect(),
            modes: LabelSet::new(),
            tags: LabelSet::new(),
            platforms: vec![os],
        }
    }

    fn fixture() -> (Arc<RecordStore>, FilterSet) {
        let store = Arc::new(
            RecordStore::from_records(
                vec![
                    record(10, 100, 90.0, Platform::Windows, "RPG"),
                    record(20, 200, 80.0, Platform::Mac, "RPG"),
                    record(30, 900, 10.0, Platform::Windows, "Racing"),
                ],
                1648.0,
            )
            .unwrap(),
        );
        let filters = FilterSet::new(&store);
        (store, filters)
    }

    fn ids(dataset: &Dataset) -> Vec<RecordId> {
        dataset.ids().collect()
    }

    #[test]
    fn untouched_filters_keep_everything() {
        let (store, filters) = fixture();
        let combinator = Combinator::new(store.clone(), &filters);
        assert_eq!(combinator.combine(&filters), Dataset::full(store));
    }

    #[test]
    fn numeric_and_category_filters_intersect() {
        let (store, mut filters) = fixture();
        let mut combinator = Combinator::new(store, &filters);

        filters.set_range(Dimension::Price, 150.0, 1000.0).unwrap();
        combinator.refresh(Dimension::Price, &filters);
        assert_eq!(ids(&combinator.combine(&filters)), vec![20, 30]);

        filters.set_category_selection(Dimension::Platform, ["WIN"].into_iter().collect()).unwrap();
        assert_eq!(ids(&combinator.combine(&filters)), vec![30]);
        assert_eq!(ids(&combinator.combine_excluding(&filters, Dimension::Platform)), vec![20, 30]);
        assert_eq!(ids(&combinator.combine_excluding(&filters, Dimension::Price)), vec![10, 30]);
    }

    #[test]
    fn an_empty_dimension_empties_the_intersection() {
        let (store, mut filters) = fixture();
        let mut combinator = Combinator::new(store, &filters);
        filters.set_range(Dimension::Rating, 95.0, 100.0).unwrap();
        combinator.refresh(Dimension::Rating, &filters);

        assert!(combinator.combine(&filters).is_empty());
        assert_eq!(combinator.combine_excluding(&filters, Dimension::Rating).len(), 3);
    }

    #[test]
    fn stale_masks_are_only_rebuilt_on_refresh() {
        let (store, mut filters) = fixture();
        let mut combinator = Combinator::new(store, &filters);
        filters.set_range(Dimension::Price, 0.0, 150.0).unwrap();
        assert_eq!(combinator.combine(&filters).len(), 3);
        combinator.refresh_all(&filters);
        assert_eq!(ids(&combinator.combine(&filters)), vec![10]);
    }

    #[test]
    fn dataset_membership() {
        let (store, mut filters) = fixture();
        let mut combinator = Combinator::new(store.clone(), &filters);
        filters.set_range(Dimension::Price, 150.0, 250.0).unwrap();
        combinator.refresh(Dimension::Price, &filters);
        let working = combinator.combine(&filters);

        assert!(working.contains(20));
        assert!(!working.contains(10));
        assert!(!working.contains(999));
        assert!(working.is_subset_of(&Dataset::full(store)));
    }
}
