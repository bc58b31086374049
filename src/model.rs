use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::parser;

/// Stable store id of a game. Never reused.
pub type RecordId = u64;

/// Difficulty vocabulary, easiest first.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[archive(check_bytes)]
pub enum Difficulty {
    Simple,
    SimpleEasy,
    Easy,
    EasyJustRight,
    JustRight,
    JustRightTough,
    Tough,
    ToughUnforgiving,
    Unforgiving,
}

impl Difficulty {
    pub const ALL: [Difficulty; 9] = [
        Difficulty::Simple,
        Difficulty::SimpleEasy,
        Difficulty::Easy,
        Difficulty::EasyJustRight,
        Difficulty::JustRight,
        Difficulty::JustRightTough,
        Difficulty::Tough,
        Difficulty::ToughUnforgiving,
        Difficulty::Unforgiving,
    ];

    pub const MAX_INDEX: usize = Self::ALL.len() - 1;

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Simple => "Simple",
            Difficulty::SimpleEasy => "Simple-Easy",
            Difficulty::Easy => "Easy",
            Difficulty::EasyJustRight => "Easy-Just Right",
            Difficulty::JustRight => "Just Right",
            Difficulty::JustRightTough => "Just Right-Tough",
            Difficulty::Tough => "Tough",
            Difficulty::ToughUnforgiving => "Tough-Unforgiving",
            Difficulty::Unforgiving => "Unforgiving",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.iter().copied().find(|d| d.label() == label)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Ordinal index scaled into [0, 1].
    pub fn normalized(self) -> f64 {
        self.index() as f64 / Self::MAX_INDEX as f64
    }

    /// Slider scale: 1.0 (Simple) to 5.0 (Unforgiving) in half steps.
    pub fn scale(self) -> f64 {
        1.0 + 0.5 * self.index() as f64
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[archive(check_bytes)]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    pub fn code(self) -> &'static str {
        match self {
            Platform::Windows => "WIN",
            Platform::Mac => "MAC",
            Platform::Linux => "LNX",
        }
    }

    /// Accepts the data codes plus the legend's `LINUX` display alias.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "WIN" => Some(Platform::Windows),
            "MAC" => Some(Platform::Mac),
            "LNX" | "LINUX" => Some(Platform::Linux),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Calendar date as published in the store listing.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[archive(check_bytes)]
pub struct ReleaseDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

impl ReleaseDate {
    /// Parses `YYYY-MM-DD`. Returns None on anything else.
    pub fn parse(input: &str) -> Option<Self> {
        parser::parse_iso_date(input)
    }
}

impl fmt::Display for ReleaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Sorted, deduplicated set of labels.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
#[archive(check_bytes)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wraps `labels` as given, skipping the sort. Only for building broken fixtures.
    #[cfg(test)]
    pub(crate) fn unchecked(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.binary_search_by(|held| held.as_str().cmp(label)).is_ok()
    }

    pub fn intersects(&self, other: &LabelSet) -> bool {
        self.intersection_len(other) > 0
    }

    /// Merge walk over both sorted vectors.
    pub fn intersection_len(&self, other: &LabelSet) -> usize {
        let (mut i, mut j, mut count) = (0, 0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    count += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        count
    }

    pub fn union_len(&self, other: &LabelSet) -> usize {
        self.0.len() + other.0.len() - self.intersection_len(other)
    }

    /// Returns a copy with `label` added if absent, removed if present.
    pub fn toggled(&self, label: &str) -> LabelSet {
        if self.contains(label) {
            Self(self.0.iter().filter(|l| l.as_str() != label).cloned().collect())
        } else {
            self.iter().chain(std::iter::once(label)).collect()
        }
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut labels: Vec<String> = iter.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        Self(labels)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// One game, validated and cleaned at load.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub url: String,
    pub image: String,
    pub released: ReleaseDate,

    /// Minor currency units (cents)
    pub price: u64,

    /// Composite score, 0..=100
    pub rating: f64,

    /// Hours to complete
    pub duration: f64,

    pub difficulty: Difficulty,
    pub genres: LabelSet,
    pub modes: LabelSet,
    pub tags: LabelSet,

    /// Sorted, deduplicated
    pub platforms: Vec<Platform>,
}

/// Wire shape of the dataset resource. Converted to [`Record`] by the store.
#[derive(Deserialize, Debug, Clone)]
pub struct RawRecord {
    pub id: RecordId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub image: String,
    pub date: String,
    pub price: u64,
    pub rating: f64,
    pub duration: f64,
    pub difficulty: String,
    pub genres: Vec<String>,
    pub mode: Vec<String>,
    pub os: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Highlight style of a hovered genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenreStyle {
    Indie,
    Action,
    Adventure,
    Rpg,
    Strategy,
    Casual,
    Simulation,
    Racing,
    Sports,
    Violent,
    Other,
}

impl GenreStyle {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Indie" => GenreStyle::Indie,
            "Action" => GenreStyle::Action,
            "Adventure" => GenreStyle::Adventure,
            "RPG" => GenreStyle::Rpg,
            "Strategy" => GenreStyle::Strategy,
            "Casual" => GenreStyle::Casual,
            "Simulation" => GenreStyle::Simulation,
            "Racing" => GenreStyle::Racing,
            "Sports" => GenreStyle::Sports,
            "Violent" => GenreStyle::Violent,
            _ => GenreStyle::Other,
        }
    }

    pub fn highlight_class(self) -> &'static str {
        match self {
            GenreStyle::Indie => "cluster-highlighted-indie",
            GenreStyle::Action => "cluster-highlighted-action",
            GenreStyle::Adventure => "cluster-highlighted-adventure",
            GenreStyle::Rpg => "cluster-highlighted-rpg",
            GenreStyle::Strategy => "cluster-highlighted-strategy",
            GenreStyle::Casual => "cluster-highlighted-casual",
            GenreStyle::Simulation => "cluster-highlighted-simulation",
            GenreStyle::Racing => "cluster-highlighted-racing",
            GenreStyle::Sports => "cluster-highlighted-sports",
            GenreStyle::Violent => "cluster-highlighted-violent",
            GenreStyle::Other => "cluster-highlighted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_round_trips_labels_and_scales() {
        for d in Difficulty::ALL {
            assert_eq!(Difficulty::from_label(d.label()), Some(d));
        }
        assert_eq!(Difficulty::Simple.normalized(), 0.0);
        assert_eq!(Difficulty::Unforgiving.normalized(), 1.0);
        assert_eq!(Difficulty::Unforgiving.scale(), 5.0);
        assert_eq!(Difficulty::Easy.scale(), 2.0);
        assert_eq!(Difficulty::from_label("Brutal"), None);
    }

    #[test]
    fn platform_codes_accept_linux_alias() {
        assert_eq!(Platform::from_code("LINUX"), Some(Platform::Linux));
        assert_eq!(Platform::from_code("lnx"), Some(Platform::Linux));
        assert_eq!(Platform::from_code("WIN"), Some(Platform::Windows));
        assert_eq!(Platform::from_code("DOS"), None);
    }

    #[test]
    fn label_set_is_sorted_and_deduplicated() {
        let set: LabelSet = ["RPG", "Action", "RPG"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["Action", "RPG"]);
        assert!(set.contains("RPG"));
        assert!(!set.contains("Racing"));
    }

    #[test]
    fn label_set_counts_overlap() {
        let a: LabelSet = ["A", "B", "C"].into_iter().collect();
        let b: LabelSet = ["B", "C", "D", "E"].into_iter().collect();
        assert_eq!(a.intersection_len(&b), 2);
        assert_eq!(a.union_len(&b), 5);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&LabelSet::new()));
    }

    #[test]
    fn toggling_adds_then_removes() {
        let set = LabelSet::new().toggled("Co-op");
        assert!(set.contains("Co-op"));
        assert!(set.toggled("Co-op").is_empty());
    }

    #[test]
    fn unknown_genres_fall_back_to_plain_highlight() {
        assert_eq!(GenreStyle::from_label("RPG").highlight_class(), "cluster-highlighted-rpg");
        assert_eq!(GenreStyle::from_label("Puzzle"), GenreStyle::Other);
        assert_eq!(GenreStyle::Other.highlight_class(), "cluster-highlighted");
    }
}
