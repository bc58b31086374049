use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::combinator::Dataset;
use crate::filter::{Dimension, FilterError};
use crate::index::Neighbor;
use crate::model::{LabelSet, RecordId};

/// Fixed topic vocabulary. Filter topics are addressed per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RangeChanged(Dimension),
    CategorySelectionChanged(Dimension),
    HoverBegin,
    HoverEnd,
    SelectionMade,
    Reset,
    DatasetChanged,
    NeighborsRanked,
    Highlight,
    FilterRejected,
}

impl Topic {
    /// Every topic a view adapter can publish into the core.
    pub fn inputs() -> Vec<Topic> {
        let mut topics: Vec<Topic> = Dimension::NUMERIC.iter().map(|&d| Topic::RangeChanged(d)).collect();
        topics.extend(Dimension::CATEGORY.iter().map(|&d| Topic::CategorySelectionChanged(d)));
        topics.extend([Topic::HoverBegin, Topic::HoverEnd, Topic::SelectionMade, Topic::Reset]);
        topics
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoverTarget {
    Record(RecordId),
    Label { dimension: Dimension, label: String },
}

/// Why a neighbor list was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrigin {
    Hover,
    Selection,
}

/// Result of one completed combination.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetUpdate {
    /// Filter set version this dataset was derived from.
    pub version: u64,
    pub working: Dataset,
    /// Per tracked view: every filter applied except the view's own dimension.
    pub whole: BTreeMap<Dimension, Dataset>,
}

impl DatasetUpdate {
    pub fn whole_for(&self, dimension: Dimension) -> Option<&Dataset> {
        self.whole.get(&dimension)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub source: HoverTarget,
    pub ids: Vec<RecordId>,
    pub class: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RangeChanged { dimension: Dimension, lo: f64, hi: f64 },
    CategorySelectionChanged { dimension: Dimension, labels: LabelSet },
    HoverBegin(HoverTarget),
    HoverEnd(HoverTarget),
    SelectionMade { record: RecordId },
    Reset,
    DatasetChanged(DatasetUpdate),
    NeighborsRanked { query: RecordId, origin: RankOrigin, neighbors: Vec<Neighbor> },
    Highlight(Highlight),
    HighlightCleared,
    FilterRejected { dimension: Option<Dimension>, error: FilterError },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::RangeChanged { dimension, .. } => Topic::RangeChanged(*dimension),
            Event::CategorySelectionChanged { dimension, .. } => Topic::CategorySelectionChanged(*dimension),
            Event::HoverBegin(_) => Topic::HoverBegin,
            Event::HoverEnd(_) => Topic::HoverEnd,
            Event::SelectionMade { .. } => Topic::SelectionMade,
            Event::Reset => Topic::Reset,
            Event::DatasetChanged(_) => Topic::DatasetChanged,
            Event::NeighborsRanked { .. } => Topic::NeighborsRanked,
            Event::Highlight(_) | Event::HighlightCleared => Topic::Highlight,
            Event::FilterRejected { .. } => Topic::FilterRejected,
        }
    }
}

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous named-topic broadcaster.
///
/// `publish` runs every handler of the topic, in subscription order, before it
/// returns. A handler may publish again; the nested event is delivered in full
/// first. The handler list is snapshotted per publish, so subscribing from
/// inside a handler takes effect on the next publish.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<Topic, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_handler(topic, Arc::new(handler))
    }

    pub fn subscribe_handler(&self, topic: Topic, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic)
            .or_default()
            .push((id, handler));
        id
    }

    /// Subscribes one shared handler to several topics.
    pub fn subscribe_many(&self, topics: &[Topic], handler: Handler) -> Vec<SubscriptionId> {
        topics.iter().map(|&topic| self.subscribe_handler(topic, handler.clone())).collect()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Delivers `event` and returns how many handlers saw it. No subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(&topic) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => Vec::new(),
            }
        };

        trace!(?topic, subscribers = snapshot.len(), "publish");
        for handler in &snapshot {
            handler(&event);
        }
        snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Event) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &str| {
            let sink = sink.clone();
            let name = name.to_string();
            Box::new(move |e: &Event| sink.lock().unwrap().push(format!("{name}:{:?}", e.topic())))
                as Box<dyn Fn(&Event) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(Event::Reset), 0);
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.subscribe(Topic::Reset, make("first"));
        bus.subscribe(Topic::Reset, make("second"));
        bus.subscribe(Topic::HoverEnd, make("other"));

        assert_eq!(bus.publish(Event::Reset), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first:Reset", "second:Reset"]);
    }

    #[test]
    fn nested_publish_completes_depth_first() {
        let bus = Arc::new(EventBus::new());
        let (log, make) = recorder();

        let inner = bus.clone();
        bus.subscribe(Topic::Reset, make("a"));
        bus.subscribe(Topic::Reset, move |_| {
            inner.publish(Event::HighlightCleared);
        });
        bus.subscribe(Topic::Reset, make("c"));
        bus.subscribe(Topic::Highlight, make("h"));

        bus.publish(Event::Reset);
        assert_eq!(*log.lock().unwrap(), vec!["a:Reset", "h:Highlight", "c:Reset"]);
    }

    #[test]
    fn per_dimension_topics_are_distinct() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.subscribe(Topic::RangeChanged(Dimension::Price), make("price"));

        bus.publish(Event::RangeChanged { dimension: Dimension::Rating, lo: 0.0, hi: 1.0 });
        assert!(log.lock().unwrap().is_empty());
        bus.publish(Event::RangeChanged { dimension: Dimension::Price, lo: 0.0, hi: 1.0 });
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let id = bus.subscribe(Topic::Reset, make("gone"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(Event::Reset);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bus.subscriber_count(Topic::Reset), 0);
    }

    #[test]
    fn input_topics_cover_every_filter_dimension() {
        let inputs = Topic::inputs();
        assert_eq!(inputs.len(), Dimension::ALL.len() + 4);
        assert!(inputs.contains(&Topic::CategorySelectionChanged(Dimension::Tag)));
        assert!(!inputs.contains(&Topic::DatasetChanged));
    }
}
