use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{LabelSet, Platform, Record, RecordId};
use crate::store::RecordStore;

/// Independently filterable facet of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Year,
    Price,
    Rating,
    Difficulty,
    Time,
    Platform,
    Genre,
    Mode,
    Tag,
}

impl Dimension {
    pub const ALL: [Dimension; 9] = [
        Dimension::Year,
        Dimension::Price,
        Dimension::Rating,
        Dimension::Difficulty,
        Dimension::Time,
        Dimension::Platform,
        Dimension::Genre,
        Dimension::Mode,
        Dimension::Tag,
    ];

    pub const NUMERIC: [Dimension; 5] = [
        Dimension::Year,
        Dimension::Price,
        Dimension::Rating,
        Dimension::Difficulty,
        Dimension::Time,
    ];

    pub const CATEGORY: [Dimension; 4] = [
        Dimension::Platform,
        Dimension::Genre,
        Dimension::Mode,
        Dimension::Tag,
    ];

    pub fn is_numeric(self) -> bool {
        Self::NUMERIC.contains(&self)
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Year => "Year",
            Dimension::Price => "Price",
            Dimension::Rating => "Rating",
            Dimension::Difficulty => "Difficulty",
            Dimension::Time => "Time",
            Dimension::Platform => "OS",
            Dimension::Genre => "Genre",
            Dimension::Mode => "Mode",
            Dimension::Tag => "Tag",
        }
    }

    /// Position of a record on a numeric axis. Difficulty uses the 1-5 slider scale.
    pub fn value(self, record: &Record) -> Option<f64> {
        match self {
            Dimension::Year => Some(record.released.year as f64),
            Dimension::Price => Some(record.price as f64),
            Dimension::Rating => Some(record.rating),
            Dimension::Difficulty => Some(record.difficulty.scale()),
            Dimension::Time => Some(record.duration),
            _ => None,
        }
    }

    /// Labels a record carries on a category axis. Platforms yield their codes.
    pub fn labels(self, record: &Record) -> Vec<&str> {
        match self {
            Dimension::Platform => record.platforms.iter().map(|p| p.code()).collect(),
            Dimension::Genre => record.genres.iter().collect(),
            Dimension::Mode => record.modes.iter().collect(),
            Dimension::Tag => record.tags.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "year" | "date" => Ok(Dimension::Year),
            "price" => Ok(Dimension::Price),
            "rating" => Ok(Dimension::Rating),
            "difficulty" => Ok(Dimension::Difficulty),
            "time" | "duration" => Ok(Dimension::Time),
            "os" | "platform" | "platforms" => Ok(Dimension::Platform),
            "genre" | "genres" => Ok(Dimension::Genre),
            "mode" | "modes" => Ok(Dimension::Mode),
            "tag" | "tags" => Ok(Dimension::Tag),
            _ => Err(FilterError::UnknownDimension(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("inverted bound for {dimension}: {lo} > {hi}")]
    Inverted { dimension: Dimension, lo: f64, hi: f64 },
    #[error("bound for {0} is not a finite number")]
    NonFinite(Dimension),
    #[error("unknown dimension {0:?}")]
    UnknownDimension(String),
    #[error("{0} is a category dimension; select labels instead")]
    NotNumeric(Dimension),
    #[error("{0} is a numeric dimension; set a range instead")]
    NotCategorical(Dimension),
    #[error("unknown platform {0:?}")]
    UnknownPlatform(String),
    #[error("no record with id {0}")]
    UnknownRecord(RecordId),
    #[error("filter state lock poisoned")]
    Poisoned,
}

/// Inclusive numeric interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBound {
    pub lo: f64,
    pub hi: f64,
}

impl RangeBound {
    pub fn contains(&self, value: f64) -> bool {
        self.lo <= value && value <= self.hi
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Range(RangeBound),
    Labels(LabelSet),
}

/// Current bound of every dimension.
///
/// Numeric dimensions start at the extent observed at load. Category
/// dimensions start empty, and an empty selection matches every record on
/// all four of them:
/// - `Platform`: record runs on any selected OS code.
/// - `Genre`, `Mode`, `Tag`: record carries any selected label.
///
/// Every accepted mutation bumps `version`. A rejected one leaves the set untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSet {
    version: u64,
    extents: BTreeMap<Dimension, RangeBound>,
    ranges: BTreeMap<Dimension, RangeBound>,
    selections: BTreeMap<Dimension, LabelSet>,
}

impl FilterSet {
    pub fn new(store: &RecordStore) -> Self {
        let extents: BTreeMap<Dimension, RangeBound> = Dimension::NUMERIC
            .iter()
            .map(|&dim| (dim, observed_extent(store, dim)))
            .collect();
        let selections = Dimension::CATEGORY.iter().map(|&dim| (dim, LabelSet::new())).collect();

        Self {
            version: 0,
            ranges: extents.clone(),
            extents,
            selections,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_range(&mut self, dimension: Dimension, lo: f64, hi: f64) -> Result<(), FilterError> {
        if !dimension.is_numeric() {
            return Err(FilterError::NotNumeric(dimension));
        }
        if !lo.is_finite() || !hi.is_finite() {
            warn!(%dimension, lo, hi, "rejected non-finite bound");
            return Err(FilterError::NonFinite(dimension));
        }
        if lo > hi {
            warn!(%dimension, lo, hi, "rejected inverted bound");
            return Err(FilterError::Inverted { dimension, lo, hi });
        }

        self.ranges.insert(dimension, RangeBound { lo, hi });
        self.version += 1;
        debug!(%dimension, lo, hi, version = self.version, "range set");
        Ok(())
    }

    /// Stores `labels` verbatim. Platform labels are normalized to their codes.
    pub fn set_category_selection(&mut self, dimension: Dimension, labels: LabelSet) -> Result<(), FilterError> {
        if dimension.is_numeric() {
            return Err(FilterError::NotCategorical(dimension));
        }
        let labels = if dimension == Dimension::Platform {
            labels
                .iter()
                .map(|l| Platform::from_code(l).map(Platform::code).ok_or_else(|| FilterError::UnknownPlatform(l.to_string())))
                .collect::<Result<LabelSet, _>>()?
        } else {
            labels
        };

        debug!(%dimension, labels = %labels, "selection set");
        self.selections.insert(dimension, labels);
        self.version += 1;
        Ok(())
    }

    pub fn reset(&mut self, dimension: Dimension) {
        if let Some(extent) = self.extents.get(&dimension) {
            self.ranges.insert(dimension, *extent);
        } else {
            self.selections.insert(dimension, LabelSet::new());
        }
        self.version += 1;
    }

    pub fn reset_all(&mut self) {
        self.ranges = self.extents.clone();
        for selection in self.selections.values_mut() {
            *selection = LabelSet::new();
        }
        self.version += 1;
    }

    pub fn bound(&self, dimension: Dimension) -> Bound {
        match self.ranges.get(&dimension) {
            Some(range) => Bound::Range(*range),
            None => Bound::Labels(self.selection(dimension).cloned().unwrap_or_default()),
        }
    }

    pub fn range(&self, dimension: Dimension) -> Option<RangeBound> {
        self.ranges.get(&dimension).copied()
    }

    pub fn extent(&self, dimension: Dimension) -> Option<RangeBound> {
        self.extents.get(&dimension).copied()
    }

    pub fn selection(&self, dimension: Dimension) -> Option<&LabelSet> {
        self.selections.get(&dimension)
    }

    /// True when the dimension currently excludes anything it did not at load.
    pub fn is_active(&self, dimension: Dimension) -> bool {
        match self.ranges.get(&dimension) {
            Some(range) => self.extents.get(&dimension) != Some(range),
            None => self.selection(dimension).map_or(false, |s| !s.is_empty()),
        }
    }

    pub fn matches(&self, dimension: Dimension, record: &Record) -> bool {
        if let Some(range) = self.ranges.get(&dimension) {
            return dimension.value(record).map_or(false, |v| range.contains(v));
        }
        match self.selections.get(&dimension) {
            None => true,
            Some(selected) if selected.is_empty() => true,
            Some(selected) => dimension.labels(record).into_iter().any(|l| selected.contains(l)),
        }
    }
}

fn observed_extent(store: &RecordStore, dimension: Dimension) -> RangeBound {
    let mut values = store.records().iter().filter_map(|r| dimension.value(r));
    let first = match values.next() {
        Some(v) => v,
        None => return RangeBound { lo: 0.0, hi: 0.0 },
    };
    values.fold(RangeBound { lo: first, hi: first }, |acc, v| RangeBound {
        lo: acc.lo.min(v),
        hi: acc.hi.max(v),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, ReleaseDate};

    fn record(id: RecordId, price: u64, rating: f64, platforms: Vec<Platform>, genres: &[&str]) -> Record {
        Record {
            id,
            name: format!("Game {id}"),
            url: String::new(),
            image: String::new(),
            released: ReleaseDate { year: 2000 + id as i32, month: 1, day: 1 },
            price,
            rating,
            duration: 10.0,
            difficulty: Difficulty::Easy,
            genres: genres.iter().copied().collect(),
            modes: LabelSet::new(),
            tags: LabelSet::new(),
            platforms,
        }
    }

    fn store() -> RecordStore {
        RecordStore::from_records(
            vec![
                record(1, 100, 90.0, vec![Platform::Windows], &["RPG"]),
                record(2, 500, 40.0, vec![Platform::Mac, Platform::Linux], &["Racing", "Sports"]),
            ],
            1648.0,
        )
        .unwrap()
    }

    #[test]
    fn starts_at_observed_extent() {
        let filters = FilterSet::new(&store());
        assert_eq!(filters.range(Dimension::Price), Some(RangeBound { lo: 100.0, hi: 500.0 }));
        assert_eq!(filters.range(Dimension::Year), Some(RangeBound { lo: 2001.0, hi: 2002.0 }));
        assert_eq!(filters.bound(Dimension::Genre), Bound::Labels(LabelSet::new()));
        assert!(Dimension::ALL.iter().all(|&d| !filters.is_active(d)));
    }

    #[test]
    fn inverted_bound_keeps_previous_value() {
        let mut filters = FilterSet::new(&store());
        filters.set_range(Dimension::Rating, 10.0, 50.0).unwrap();
        let before = filters.clone();

        let err = filters.set_range(Dimension::Rating, 5.0, 1.0).unwrap_err();
        assert_eq!(err, FilterError::Inverted { dimension: Dimension::Rating, lo: 5.0, hi: 1.0 });
        assert_eq!(filters, before);
    }

    #[test]
    fn non_finite_and_misdirected_bounds_are_rejected() {
        let mut filters = FilterSet::new(&store());
        assert_eq!(filters.set_range(Dimension::Price, f64::NAN, 1.0), Err(FilterError::NonFinite(Dimension::Price)));
        assert_eq!(filters.set_range(Dimension::Genre, 0.0, 1.0), Err(FilterError::NotNumeric(Dimension::Genre)));
        assert_eq!(
            filters.set_category_selection(Dimension::Time, LabelSet::new()),
            Err(FilterError::NotCategorical(Dimension::Time))
        );
        assert_eq!(filters.version(), 0);
    }

    #[test]
    fn range_outside_data_is_allowed() {
        let mut filters = FilterSet::new(&store());
        filters.set_range(Dimension::Price, 10_000.0, 20_000.0).unwrap();
        let s = store();
        assert!(s.records().iter().all(|r| !filters.matches(Dimension::Price, r)));
    }

    #[test]
    fn platform_labels_normalize_and_match() {
        let s = store();
        let mut filters = FilterSet::new(&s);
        filters
            .set_category_selection(Dimension::Platform, ["LINUX"].into_iter().collect())
            .unwrap();
        assert_eq!(filters.selection(Dimension::Platform).unwrap().iter().collect::<Vec<_>>(), vec!["LNX"]);
        assert!(!filters.matches(Dimension::Platform, s.get(1).unwrap()));
        assert!(filters.matches(Dimension::Platform, s.get(2).unwrap()));

        assert_eq!(
            filters.set_category_selection(Dimension::Platform, ["AMIGA"].into_iter().collect()),
            Err(FilterError::UnknownPlatform("AMIGA".into()))
        );
    }

    #[test]
    fn empty_selection_matches_everything() {
        let s = store();
        let mut filters = FilterSet::new(&s);
        filters.set_category_selection(Dimension::Genre, ["Sports"].into_iter().collect()).unwrap();
        assert!(!filters.matches(Dimension::Genre, s.get(1).unwrap()));
        filters.reset(Dimension::Genre);
        assert!(s.records().iter().all(|r| filters.matches(Dimension::Genre, r)));
    }

    #[test]
    fn reset_all_restores_defaults_and_bumps_version() {
        let s = store();
        let pristine = FilterSet::new(&s);
        let mut filters = pristine.clone();
        filters.set_range(Dimension::Price, 200.0, 300.0).unwrap();
        filters.set_category_selection(Dimension::Mode, ["Co-op"].into_iter().collect()).unwrap();
        filters.reset_all();

        assert_eq!(filters.version(), 3);
        for dim in Dimension::ALL {
            assert_eq!(filters.bound(dim), pristine.bound(dim));
        }
    }

    #[test]
    fn dimension_names_parse_case_insensitively() {
        assert_eq!("PRICE".parse::<Dimension>(), Ok(Dimension::Price));
        assert_eq!("os".parse::<Dimension>(), Ok(Dimension::Platform));
        assert_eq!("duration".parse::<Dimension>(), Ok(Dimension::Time));
        assert_eq!("color".parse::<Dimension>(), Err(FilterError::UnknownDimension("color".into())));
    }
}
