use tracing::info;

use crate::filter::Dimension;
use crate::index::DEFAULT_NEIGHBORS;
use crate::vector::DURATION_LOG_DIVISOR;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Neighbors per similarity query.
    pub neighbor_limit: usize,

    /// Views that draw their own dimension's totals behind the filtered bars.
    /// Each gets a "whole" dataset in every `DatasetChanged`.
    pub tracked_views: Vec<Dimension>,

    /// Points drawn by the scatter view (highest rated first).
    pub scatter_limit: usize,

    /// Tags shown by the proportion chart.
    pub tag_limit: usize,

    /// Rows in the parallel-coordinates view when nothing is selected.
    pub top_titles: usize,

    pub duration_log_divisor: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            neighbor_limit: DEFAULT_NEIGHBORS,
            tracked_views: vec![Dimension::Genre, Dimension::Mode],
            scatter_limit: 500,
            tag_limit: 50,
            top_titles: 10,
            duration_log_divisor: DURATION_LOG_DIVISOR,
        }
    }
}

impl DashboardConfig {
    pub fn log_summary(&self) {
        info!("--- [Dashboard Config] ---");
        info!("Neighbors per query: {}", self.neighbor_limit);
        info!(
            "Tracked views: {}",
            self.tracked_views.iter().map(|d| d.name()).collect::<Vec<_>>().join(", ")
        );
        info!("Scatter points: {} | Tags: {} | Top titles: {}", self.scatter_limit, self.tag_limit, self.top_titles);
        info!("Duration log divisor: {}", self.duration_log_divisor);
    }
}
