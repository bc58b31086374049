use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Difficulty, LabelSet, Platform, RawRecord, Record, RecordId, ReleaseDate};
use crate::storage;
use crate::vector::{FeatureVector, PriceQuantileScale};

const PLAYER_MODES: [&str; 11] = [
    "Single-player",
    "Multi-player",
    "Remote Play Together",
    "PvP",
    "Online PvP",
    "Co-op",
    "Online Co-op",
    "Shared/Split Screen Co-op",
    "Shared/Split Screen",
    "Cross-Platform Multiplayer",
    "Shared/Split Screen PvP",
];

const SPLIT_SCREEN: &str = "Shared/Split Screen";

const NON_GENRES: [&str; 6] = [
    "Nudity",
    "Sexual Content",
    "Early Access",
    "Massively Multiplayer",
    "Free to Play",
    "Gore",
];

// Tags already expressed by a mode.
const MODE_TAGS: [&str; 9] = [
    "Singleplayer",
    "Co-op",
    "Multiplayer",
    "Online Co-Op",
    "Local Co-op",
    "Local Multiplayer",
    "PvP",
    "Split Screen",
    "Asynchronous Multiplayer",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record {id}: malformed date {value:?}")]
    Date { id: RecordId, value: String },
    #[error("record {id}: unknown difficulty {value:?}")]
    Difficulty { id: RecordId, value: String },
    #[error("record {id}: unknown platform {value:?}")]
    Platform { id: RecordId, value: String },
    #[error("record {id}: {field} out of range ({value})")]
    Numeric { id: RecordId, field: &'static str, value: f64 },
    #[error("duplicate record id {0}")]
    DuplicateId(RecordId),
    #[error("snapshot rejected: {0}")]
    Snapshot(String),
}

/// The immutable base collection plus one feature vector per record.
///
/// Records keep their load order; a record's position is its slot.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<Record>,
    features: Vec<FeatureVector>,
    slots: HashMap<RecordId, usize>,
    prices: PriceQuantileScale,
}

impl RecordStore {
    /// Reads and validates the JSON dataset resource.
    pub async fn load_json(path: &Path, duration_divisor: f64) -> Result<Self, LoadError> {
        info!(path = %path.display(), "loading dataset");
        let bytes = tokio::fs::read(path).await?;
        let raw: Vec<RawRecord> = serde_json::from_slice(&bytes)?;
        Self::from_raw(raw, duration_divisor)
    }

    /// Reads a binary snapshot written by [`storage::snapshot`].
    pub async fn load_snapshot(path: &Path, duration_divisor: f64) -> Result<Self, LoadError> {
        info!(path = %path.display(), "loading snapshot");
        let bytes = tokio::fs::read(path).await?;
        let records = storage::restore(&bytes)?;
        Self::from_records(records, duration_divisor)
    }

    pub fn from_raw(raw: Vec<RawRecord>, duration_divisor: f64) -> Result<Self, LoadError> {
        // Tags that are a genre anywhere in the corpus carry no extra signal.
        let genre_vocabulary: BTreeSet<String> = raw
            .iter()
            .flat_map(|r| r.genres.iter())
            .map(|g| g.trim().to_string())
            .filter(|g| !NON_GENRES.contains(&g.as_str()))
            .collect();

        let records = raw
            .into_iter()
            .map(|r| validate(r, &genre_vocabulary))
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_records(records, duration_divisor)
    }

    /// Snapshots arrive here too, so set-valued fields are re-sorted and
    /// deduplicated rather than trusted.
    pub fn from_records(mut records: Vec<Record>, duration_divisor: f64) -> Result<Self, LoadError> {
        let mut slots = HashMap::with_capacity(records.len());
        for (slot, record) in records.iter_mut().enumerate() {
            normalize(record);
            check_numeric(record)?;
            if slots.insert(record.id, slot).is_some() {
                return Err(LoadError::DuplicateId(record.id));
            }
        }

        let prices = PriceQuantileScale::fit(records.iter().map(|r| r.price));
        let features = records
            .iter()
            .map(|r| FeatureVector::derive(r, &prices, duration_divisor))
            .collect();

        info!(records = records.len(), "record store ready");
        Ok(Self { records, features, slots, prices })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.slot(id).map(|slot| &self.records[slot])
    }

    pub fn slot(&self, id: RecordId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn record_at(&self, slot: usize) -> &Record {
        &self.records[slot]
    }

    pub fn features_at(&self, slot: usize) -> &FeatureVector {
        &self.features[slot]
    }

    pub fn price_scale(&self) -> &PriceQuantileScale {
        &self.prices
    }
}

fn validate(raw: RawRecord, genre_vocabulary: &BTreeSet<String>) -> Result<Record, LoadError> {
    let id = raw.id;
    let released = ReleaseDate::parse(&raw.date)
        .ok_or_else(|| LoadError::Date { id, value: raw.date.clone() })?;
    let difficulty = Difficulty::from_label(&raw.difficulty)
        .ok_or_else(|| LoadError::Difficulty { id, value: raw.difficulty.clone() })?;

    let mut platforms = raw
        .os
        .iter()
        .map(|code| Platform::from_code(code).ok_or_else(|| LoadError::Platform { id, value: code.clone() }))
        .collect::<Result<Vec<_>, _>>()?;
    platforms.sort();
    platforms.dedup();

    let record = Record {
        id,
        name: raw.name.trim().to_string(),
        url: raw.url,
        image: raw.image,
        released,
        price: raw.price,
        rating: raw.rating,
        duration: raw.duration,
        difficulty,
        genres: clean_genres(&raw.genres),
        modes: clean_modes(&raw.mode),
        tags: clean_tags(&raw.tags, genre_vocabulary),
        platforms,
    };
    debug!(id, name = %record.name, "validated record");
    Ok(record)
}

fn normalize(record: &mut Record) {
    record.genres = record.genres.iter().collect();
    record.modes = record.modes.iter().collect();
    record.tags = record.tags.iter().collect();
    record.platforms.sort();
    record.platforms.dedup();
}

fn check_numeric(record: &Record) -> Result<(), LoadError> {
    let id = record.id;
    if !record.rating.is_finite() || !(0.0..=100.0).contains(&record.rating) {
        return Err(LoadError::Numeric { id, field: "rating", value: record.rating });
    }
    if !record.duration.is_finite() || record.duration <= 0.0 {
        return Err(LoadError::Numeric { id, field: "duration", value: record.duration });
    }
    Ok(())
}

/// Keeps player-interaction modes only and folds split-screen variants together.
pub fn clean_modes(modes: &[String]) -> LabelSet {
    modes
        .iter()
        .map(|m| m.trim())
        .filter(|m| PLAYER_MODES.contains(m))
        .map(|m| if m.starts_with(SPLIT_SCREEN) { SPLIT_SCREEN } else { m })
        .collect()
}

pub fn clean_genres(genres: &[String]) -> LabelSet {
    genres
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty() && !NON_GENRES.contains(g))
        .collect()
}

pub fn clean_tags(tags: &[String], genre_vocabulary: &BTreeSet<String>) -> LabelSet {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && !MODE_TAGS.contains(t) && !genre_vocabulary.contains(*t))
        .collect()
}
