pub mod model;
pub mod vector;
pub mod index;
pub mod store;
pub mod storage;
pub mod filter;
pub mod combinator;
pub mod bus;
pub mod views;
pub mod parser;
pub mod config;
pub mod console;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use parking_lot::ReentrantMutex;
use tracing::{debug, info, warn};

use crate::bus::{DatasetUpdate, Event, EventBus, Highlight, HoverTarget, RankOrigin, SubscriptionId, Topic};
use crate::combinator::{Combinator, Dataset};
use crate::config::DashboardConfig;
use crate::filter::{Dimension, FilterError, FilterSet};
use crate::index::{Neighbor, SimilarityEngine};
use crate::model::{GenreStyle, LabelSet, RecordId};
use crate::store::RecordStore;
use crate::views::{BarModel, ParallelRow, ParallelSort, ScatterModel, TagShare};

/// The only mutations the filter set accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCommand {
    SetRange { dimension: Dimension, lo: f64, hi: f64 },
    SetCategorySelection { dimension: Dimension, labels: LabelSet },
    Reset(Dimension),
    ResetAll,
}

impl FilterCommand {
    fn dimension(&self) -> Option<Dimension> {
        match self {
            FilterCommand::SetRange { dimension, .. }
            | FilterCommand::SetCategorySelection { dimension, .. }
            | FilterCommand::Reset(dimension) => Some(*dimension),
            FilterCommand::ResetAll => None,
        }
    }
}

struct State {
    filters: FilterSet,
    combinator: Combinator,
    working: Dataset,
    focus: Option<RecordId>,
}

/// Coordinates filters, combination and similarity for every view.
///
/// Filter state lives behind one mutex and changes only through [`Dashboard::apply`].
/// Results are published after that lock is released, so a handler may read
/// the dashboard or publish again without deadlocking.
///
/// `delivery` is taken before `state` and held until the `DatasetChanged`
/// publish returns, so updates reach subscribers in version order across
/// threads. It is reentrant: a handler applying another command on the same
/// thread nests instead of blocking.
pub struct Dashboard {
    store: Arc<RecordStore>,
    bus: Arc<EventBus>,
    config: DashboardConfig,
    engine: SimilarityEngine,
    delivery: ReentrantMutex<()>,
    state: Mutex<State>,
}

impl fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dashboard")
        .field("records", &self.store.len())
        .field("version", &self.version())
        .finish()
    }
}

impl Dashboard {
    pub fn new(store: Arc<RecordStore>, bus: Arc<EventBus>, config: DashboardConfig) -> Arc<Self> {
        let filters = FilterSet::new(&store);
        let combinator = Combinator::new(store.clone(), &filters);
        let working = combinator.combine(&filters);
        info!(records = store.len(), "dashboard initialized");

        Arc::new(Self {
            engine: SimilarityEngine::new(config.neighbor_limit),
            store,
            bus,
            config,
            delivery: ReentrantMutex::new(()),
            state: Mutex::new(State { filters, combinator, working, focus: None }),
        })
    }

    /// Subscribes the dashboard to every input topic on its bus.
    pub fn attach(self: &Arc<Self>) -> Vec<SubscriptionId> {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.bus.subscribe_many(
            &Topic::inputs(),
            Arc::new(move |event: &Event| {
                if let Some(dashboard) = weak.upgrade() {
                    dashboard.handle(event);
                }
            }),
        )
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn version(&self) -> u64 {
        self.lock().filters.version()
    }

    pub fn filters(&self) -> FilterSet {
        self.lock().filters.clone()
    }

    pub fn working(&self) -> Dataset {
        self.lock().working.clone()
    }

    /// Every filter applied except `own`.
    pub fn whole_excluding(&self, own: Dimension) -> Dataset {
        let state = self.lock();
        state.combinator.combine_excluding(&state.filters, own)
    }

    pub fn focus(&self) -> Option<RecordId> {
        self.lock().focus
    }

    /// Applies one filter mutation, recombines, and publishes `DatasetChanged`.
    ///
    /// A rejected command leaves every bound as it was and publishes nothing.
    pub fn apply(&self, command: FilterCommand) -> Result<DatasetUpdate, FilterError> {
        let _delivery = self.delivery.lock();
        let update = {
            let mut state = self.state.lock().map_err(|_| FilterError::Poisoned)?;
            let state = &mut *state;
            match &command {
                FilterCommand::SetRange { dimension, lo, hi } => {
                    state.filters.set_range(*dimension, *lo, *hi)?;
                    state.combinator.refresh(*dimension, &state.filters);
                }
                FilterCommand::SetCategorySelection { dimension, labels } => {
                    state.filters.set_category_selection(*dimension, labels.clone())?;
                    state.focus = None;
                }
                FilterCommand::Reset(dimension) => {
                    state.filters.reset(*dimension);
                    state.combinator.refresh(*dimension, &state.filters);
                }
                FilterCommand::ResetAll => {
                    state.filters.reset_all();
                    state.combinator.refresh_all(&state.filters);
                    state.focus = None;
                }
            }

            state.working = state.combinator.combine(&state.filters);
            let whole: BTreeMap<Dimension, Dataset> = self
                .config
                .tracked_views
                .iter()
                .map(|&dim| (dim, state.combinator.combine_excluding(&state.filters, dim)))
                .collect();

            DatasetUpdate {
                version: state.filters.version(),
                working: state.working.clone(),
                whole,
            }
        };

        info!(
            command = ?command.dimension(),
            version = update.version,
            working = update.working.len(),
            "dataset changed"
        );
        self.bus.publish(Event::DatasetChanged(update.clone()));
        Ok(update)
    }

    /// Neighbors of `query` within the current working dataset.
    pub fn rank(&self, query: RecordId) -> Vec<Neighbor> {
        let working = self.working();
        self.engine.rank(&working, query)
    }

    /// Ranks the hovered record's neighbors, or highlights every record
    /// carrying the hovered label.
    pub fn hover(&self, target: HoverTarget) {
        match target {
            HoverTarget::Record(id) => {
                let neighbors = self.rank(id);
                let ids = neighbors.iter().map(|n| n.id).collect();
                self.bus.publish(Event::NeighborsRanked { query: id, origin: RankOrigin::Hover, neighbors });
                self.bus.publish(Event::Highlight(Highlight {
                    source: HoverTarget::Record(id),
                    ids,
                    class: GenreStyle::Other.highlight_class(),
                }));
            }
            HoverTarget::Label { dimension, label } => {
                let ids = self
                    .store
                    .records()
                    .iter()
                    .filter(|r| dimension.labels(r).contains(&label.as_str()))
                    .map(|r| r.id)
                    .collect();
                let class = match dimension {
                    Dimension::Genre => GenreStyle::from_label(&label).highlight_class(),
                    _ => GenreStyle::Other.highlight_class(),
                };
                let source = HoverTarget::Label { dimension, label };
                self.bus.publish(Event::Highlight(Highlight { source, ids, class }));
            }
        }
    }

    pub fn unhover(&self) {
        self.bus.publish(Event::HighlightCleared);
    }

    /// Focuses one title and publishes its neighbors within the working dataset.
    pub fn select(&self, id: RecordId) -> Result<Vec<Neighbor>, FilterError> {
        if self.store.get(id).is_none() {
            return Err(FilterError::UnknownRecord(id));
        }
        self.lock().focus = Some(id);
        let neighbors = self.rank(id);
        debug!(id, neighbors = neighbors.len(), "title selected");
        self.bus.publish(Event::NeighborsRanked {
            query: id,
            origin: RankOrigin::Selection,
            neighbors: neighbors.clone(),
        });
        Ok(neighbors)
    }

    /// Case-insensitive name-prefix search over the working dataset.
    pub fn search(&self, prefix: &str) -> Vec<(RecordId, String)> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }
        self.working()
            .records()
            .filter(|r| r.name.to_lowercase().starts_with(&prefix))
            .map(|r| (r.id, r.name.clone()))
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<RecordId> {
        let name = name.trim();
        self.store.records().iter().find(|r| r.name == name).map(|r| r.id)
    }

    pub fn bar_model(&self, dimension: Dimension) -> BarModel {
        let (whole, working, active) = {
            let state = self.lock();
            (
                state.combinator.combine_excluding(&state.filters, dimension),
                state.working.clone(),
                state.filters.selection(dimension).cloned().unwrap_or_default(),
            )
        };
        views::bar_model(dimension, &whole, &working, active)
    }

    pub fn tag_model(&self) -> Vec<TagShare> {
        views::tag_proportions(&self.working(), self.config.tag_limit)
    }

    pub fn scatter_model(&self) -> ScatterModel {
        views::scatter_model(&self.working(), self.config.scatter_limit)
    }

    pub fn parallel_model(&self, sort: ParallelSort) -> Vec<ParallelRow> {
        let working = self.working();
        match self.focus() {
            Some(id) => {
                let neighbors = self.engine.rank(&working, id);
                views::parallel_model(&working, Some((id, &neighbors)), sort, self.config.top_titles)
            }
            None => views::parallel_model(&working, None, sort, self.config.top_titles),
        }
    }

    fn handle(&self, event: &Event) {
        let command = match event {
            Event::RangeChanged { dimension, lo, hi } => FilterCommand::SetRange {
                dimension: *dimension,
                lo: *lo,
                hi: *hi,
            },
            Event::CategorySelectionChanged { dimension, labels } => FilterCommand::SetCategorySelection {
                dimension: *dimension,
                labels: labels.clone(),
            },
            Event::Reset => FilterCommand::ResetAll,
            Event::HoverBegin(target) => return self.hover(target.clone()),
            Event::HoverEnd(_) => return self.unhover(),
            Event::SelectionMade { record } => {
                if let Err(error) = self.select(*record) {
                    warn!(%error, "selection rejected");
                    self.bus.publish(Event::FilterRejected { dimension: None, error });
                }
                return;
            }
            _ => return,
        };

        let dimension = command.dimension();
        if let Err(error) = self.apply(command) {
            warn!(?dimension, %error, "filter change rejected");
            self.bus.publish(Event::FilterRejected { dimension, error });
        }
    }
}
