use crate::model::{LabelSet, Record};

/// Number of buckets on the price quantile scale (0.0, 0.1, ..., 1.0).
pub const PRICE_BUCKETS: usize = 11;

/// Default divisor applied to `log10(duration)`.
pub const DURATION_LOG_DIVISOR: f64 = 1648.0;

/// Longest possible difference vector (tags included).
pub const MAX_COMPONENTS: usize = 7;

/// Quantile scale over every price in the corpus. Fitted once at load.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuantileScale {
    thresholds: Vec<f64>,
}

impl PriceQuantileScale {
    pub fn fit<I: IntoIterator<Item = u64>>(prices: I) -> Self {
        let mut sorted: Vec<f64> = prices.into_iter().map(|p| p as f64).collect();
        if sorted.is_empty() {
            return Self { thresholds: Vec::new() };
        }
        sorted.sort_by(f64::total_cmp);

        let thresholds = (1..PRICE_BUCKETS)
            .map(|i| quantile_sorted(&sorted, i as f64 / PRICE_BUCKETS as f64))
            .collect();
        Self { thresholds }
    }

    /// Bucket of `price`, scaled into [0, 1].
    pub fn bucket(&self, price: u64) -> f64 {
        if self.thresholds.is_empty() {
            return 0.0;
        }
        let price = price as f64;
        // bisect right: a price equal to a threshold belongs to the upper bucket
        let idx = self.thresholds.partition_point(|t| *t <= price);
        idx as f64 / (PRICE_BUCKETS - 1) as f64
    }
}

/// Linear interpolation between the two closest ranks.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let base = sorted[lo];
    match sorted.get(lo + 1) {
        Some(next) => base + (next - base) * (h - lo as f64),
        None => base,
    }
}

/// Normalized numeric view of a record, used only for similarity scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub price_bucket: f64,
    pub difficulty: f64,
    pub log_duration: f64,
    pub rating: f64,
}

impl FeatureVector {
    pub fn derive(record: &Record, prices: &PriceQuantileScale, duration_divisor: f64) -> Self {
        Self {
            price_bucket: prices.bucket(record.price),
            difficulty: record.difficulty.normalized(),
            log_duration: record.duration.log10() / duration_divisor,
            rating: record.rating / 100.0,
        }
    }
}

/// |A ∩ B| / |A ∪ B|, and 0 when both sets are empty.
pub fn jaccard(a: &LabelSet, b: &LabelSet) -> f64 {
    let union = a.union_len(b);
    if union == 0 {
        return 0.0;
    }
    a.intersection_len(b) as f64 / union as f64
}

/// Per-feature difference between a candidate and a query.
///
/// Six components, or seven when both sides carry tags. The tag component
/// changes the mean's denominator, not just its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Differences {
    values: [f64; MAX_COMPONENTS],
    len: usize,
}

impl Differences {
    pub fn between(
        candidate: (&Record, &FeatureVector),
        query: (&Record, &FeatureVector),
    ) -> Self {
        let (c, cf) = candidate;
        let (q, qf) = query;

        let mut out = Self { values: [0.0; MAX_COMPONENTS], len: 0 };
        out.push(cf.price_bucket - qf.price_bucket);
        out.push(1.0 - jaccard(&c.modes, &q.modes));
        out.push(1.0 - jaccard(&c.genres, &q.genres));
        if !c.tags.is_empty() && !q.tags.is_empty() {
            out.push(1.0 - jaccard(&c.tags, &q.tags));
        }
        out.push(cf.difficulty - qf.difficulty);
        out.push(cf.log_duration - qf.log_duration);
        out.push(cf.rating - qf.rating);
        out
    }

    fn push(&mut self, value: f64) {
        self.values[self.len] = value;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    pub fn rmse(&self) -> f64 {
        let values = self.as_slice();
        if values.is_empty() {
            return 0.0;
        }
        let sum: f64 = values.iter().map(|d| d * d).sum();
        (sum / values.len() as f64).sqrt()
    }

    /// Higher is more similar; 1.0 means identical on every component.
    pub fn score(&self) -> f64 {
        1.0 - self.rmse()
    }
}
