//! Interactive text view. Reads console commands, publishes the matching
//! bus events, and prints whatever the core publishes back.

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::bus::{Event, HoverTarget, RankOrigin, SubscriptionId, Topic};
use crate::filter::{Bound, Dimension, FilterError};
use crate::model::{LabelSet, Platform, RecordId};
use crate::parser::{self, Command};
use crate::store::RecordStore;
use crate::views::ParallelSort;
use crate::{Dashboard, FilterCommand};

/// Whether the loop keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Console<W: Write + Send + 'static> {
    dashboard: Arc<Dashboard>,
    out: Arc<Mutex<W>>,
    hovered: Mutex<Option<HoverTarget>>,
    subscriptions: Vec<SubscriptionId>,
}

// Bus handlers cannot return an error; a failed write is logged and dropped.
fn emit<W: Write>(out: &Mutex<W>, line: impl Display) {
    let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(error) = writeln!(out, "{line}") {
        debug!(%error, "console write failed");
    }
}

fn title(store: &RecordStore, id: RecordId) -> String {
    store.get(id).map_or_else(|| format!("#{id}"), |r| r.name.clone())
}

impl<W: Write + Send + 'static> Console<W> {
    /// Subscribes to every output topic of the dashboard's bus.
    pub fn new(dashboard: Arc<Dashboard>, out: Arc<Mutex<W>>) -> Self {
        let bus = dashboard.bus().clone();
        let store = dashboard.store().clone();
        let mut subscriptions = Vec::new();

        let sink = out.clone();
        subscriptions.push(bus.subscribe(Topic::DatasetChanged, move |event| {
            if let Event::DatasetChanged(update) = event {
                emit(&sink, format_args!("[\u{2713} v{}] {} titles match.", update.version, update.working.len()));
                for (dimension, whole) in &update.whole {
                    emit(&sink, format_args!("    {dimension} view draws {} titles behind its bars", whole.len()));
                }
            }
        }));

        let sink = out.clone();
        let names = store.clone();
        subscriptions.push(bus.subscribe(Topic::NeighborsRanked, move |event| {
            if let Event::NeighborsRanked { query, origin, neighbors } = event {
                let verb = match origin {
                    RankOrigin::Hover => "Hovering",
                    RankOrigin::Selection => "Selected",
                };
                emit(&sink, format_args!("{verb} {}: {} similar titles", title(&names, *query), neighbors.len()));
                for n in neighbors {
                    emit(&sink, format_args!("  \u{2022} {} {} (score {:.4})", n.id, title(&names, n.id), n.score));
                }
            }
        }));

        let sink = out.clone();
        subscriptions.push(bus.subscribe(Topic::Highlight, move |event| match event {
            Event::Highlight(h) => emit(&sink, format_args!("[{}] {} titles", h.class, h.ids.len())),
            Event::HighlightCleared => emit(&sink, "[highlight cleared]"),
            _ => {}
        }));

        let sink = out.clone();
        subscriptions.push(bus.subscribe(Topic::FilterRejected, move |event| {
            if let Event::FilterRejected { error, .. } = event {
                emit(&sink, format_args!("[\u{26a0}\u{fe0f} Rejected] {error}"));
            }
        }));

        Self {
            dashboard,
            out,
            hovered: Mutex::new(None),
            subscriptions,
        }
    }

    fn say(&self, line: impl Display) {
        emit(&self.out, line);
    }

    pub fn print_banner(&self) {
        self.say("\n==================================================");
        self.say("   gamedash - linked views over the game catalog");
        self.say("==================================================\n");
        self.say(format_args!("Loaded {} titles.", self.dashboard.store().len()));
        self.say("Type 'HELP' for supported commands or 'EXIT' to quit.\n");
    }

    pub fn print_help(&self) {
        self.say("\n--- Available Commands ---");
        self.say("1. RANGE:   RANGE price [150, 1000]");
        self.say("2. SELECT:  SELECT genre RPG, Indie      (no labels clears the selection)");
        self.say("3. TOGGLE:  TOGGLE os LINUX");
        self.say("4. RESET:   RESET            | RESET rating");
        self.say("5. HOVER:   HOVER 42         | HOVER genre RPG | UNHOVER");
        self.say("6. PICK:    PICK 42          | PICK \"Hollow Knight\"");
        self.say("7. FIND:    FIND hol");
        self.say("8. RANK:    RANK 42");
        self.say("9. VIEWS:   SHOW [dimension] | BARS genre | TAGS | TOP [BY price] | SCATTER");
        self.say("10. EXIT:   Quit\n");
    }

    /// Reads commands until end of input or `EXIT`.
    pub fn run<R: BufRead>(&self, mut input: R) -> io::Result<()> {
        self.print_banner();
        let mut buffer = String::new();

        loop {
            {
                let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
                write!(out, "gamedash> ")?;
                out.flush()?;
            }
            buffer.clear();

            if input.read_line(&mut buffer)? == 0 {
                break;
            }
            if buffer.trim().is_empty() {
                continue;
            }

            match parser::parse_command(&buffer) {
                Ok(cmd) => match self.execute(cmd) {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => self.say(format_args!("[\u{26a0}\u{fe0f} Error] {e}")),
                },
                Err(e) => {
                    self.say(format_args!("[\u{2717} Syntax Error] {e}"));
                    if buffer.to_uppercase().starts_with("RANGE") {
                        self.say("    \u{2139}\u{fe0f}  Hint: Try 'RANGE price 150 1000'");
                    } else if buffer.to_uppercase().starts_with("HOVER") {
                        self.say("    \u{2139}\u{fe0f}  Hint: Try 'HOVER 42' or 'HOVER genre RPG'");
                    }
                }
            }
        }
        Ok(())
    }

    pub fn execute(&self, cmd: Command) -> Result<Flow, String> {
        let bus = self.dashboard.bus();
        match cmd {
            Command::Help => self.print_help(),
            Command::Exit => return Ok(Flow::Exit),

            Command::Range { dimension, lo, hi } => {
                let dimension = numeric(&dimension)?;
                bus.publish(Event::RangeChanged { dimension, lo, hi });
            }
            Command::Select { dimension, labels } => {
                let dimension = categorical(&dimension)?;
                let labels: LabelSet = labels.into_iter().collect();
                bus.publish(Event::CategorySelectionChanged { dimension, labels });
            }
            Command::Toggle { dimension, label } => {
                let dimension = categorical(&dimension)?;
                let current = self.dashboard.filters().selection(dimension).cloned().unwrap_or_default();
                let label = if dimension == Dimension::Platform {
                    Platform::from_code(&label)
                        .map(|p| p.code().to_string())
                        .ok_or_else(|| FilterError::UnknownPlatform(label.clone()).to_string())?
                } else {
                    label
                };
                bus.publish(Event::CategorySelectionChanged { dimension, labels: current.toggled(&label) });
            }
            Command::Reset { dimension: None } => {
                bus.publish(Event::Reset);
            }
            Command::Reset { dimension: Some(name) } => {
                let dimension = dimension(&name)?;
                self.dashboard
                    .apply(FilterCommand::Reset(dimension))
                    .map_err(|e| e.to_string())?;
            }

            Command::Hover { id } => self.hover(HoverTarget::Record(id)),
            Command::HoverLabel { dimension: name, label } => {
                let dimension = categorical(&name)?;
                self.hover(HoverTarget::Label { dimension, label });
            }
            Command::Unhover => {
                let last = self.hovered.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(target) = last {
                    bus.publish(Event::HoverEnd(target));
                }
            }

            Command::Pick { id } => self.pick(id),
            Command::PickName { name } => {
                let id = self
                    .dashboard
                    .find_by_name(&name)
                    .ok_or_else(|| format!("No title named \"{name}\""))?;
                self.pick(id);
            }
            Command::Find { prefix } => {
                let found = self.dashboard.search(&prefix);
                self.say(format_args!("Found {} titles:", found.len()));
                for (id, name) in found {
                    self.say(format_args!("  \u{2022} {id} {name}"));
                }
            }
            Command::Rank { id } => {
                let neighbors = self.dashboard.rank(id);
                let store = self.dashboard.store();
                self.say(format_args!("\n{} nearest to {}:", neighbors.len(), title(store, id)));
                for n in neighbors {
                    self.say(format_args!("  \u{2022} {} {} (score {:.4})", n.id, title(store, n.id), n.score));
                }
            }

            Command::Show { dimension: None } => {
                let filters = self.dashboard.filters();
                self.say(format_args!("Filters (v{}), {} titles match:", filters.version(), self.dashboard.working().len()));
                for dim in Dimension::ALL {
                    self.show_bound(dim, &filters.bound(dim), filters.is_active(dim));
                }
            }
            Command::Show { dimension: Some(name) } => {
                let dim = dimension(&name)?;
                let filters = self.dashboard.filters();
                self.show_bound(dim, &filters.bound(dim), filters.is_active(dim));
            }
            Command::Bars { dimension: name } => {
                let dim = categorical(&name)?;
                let model = self.dashboard.bar_model(dim);
                self.say(format_args!("{dim} ({} labels):", model.whole.len()));
                for bar in &model.whole {
                    let filtered = model
                        .subset
                        .as_ref()
                        .map(|s| s.iter().find(|b| b.label == bar.label).map_or(0, |b| b.count));
                    let mark = if model.is_highlighted(&bar.label) { "*" } else { " " };
                    match filtered {
                        Some(n) => self.say(format_args!(" {mark} {:<28} {:>6} / {}", bar.label, n, bar.count)),
                        None => self.say(format_args!(" {mark} {:<28} {:>6}", bar.label, bar.count)),
                    }
                }
            }
            Command::Tags => {
                for share in self.dashboard.tag_model() {
                    self.say(format_args!("  {:<28} {:>5.1}% ({})", share.tag, share.proportion * 100.0, share.count));
                }
            }
            Command::Top { sort } => {
                let sort = match sort {
                    Some(s) => s.parse::<ParallelSort>()?,
                    None => ParallelSort::default(),
                };
                for row in self.dashboard.parallel_model(sort) {
                    let mark = if row.selected { ">" } else { " " };
                    self.say(format_args!("{mark}{:>3}. {} {}", row.position, row.id, row.name));
                }
            }
            Command::Scatter => {
                let model = self.dashboard.scatter_model();
                self.say(format_args!("Scatter: {} points", model.points.len()));
                if let (Some((plo, phi)), Some((rlo, rhi))) = (model.price_extent, model.rating_extent) {
                    self.say(format_args!("  price {plo}..{phi} | rating {rlo}..{rhi}"));
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Ends the previous hover, if any, before beginning the new one.
    fn hover(&self, target: HoverTarget) {
        let previous = self
            .hovered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(target.clone());
        let bus = self.dashboard.bus();
        if let Some(previous) = previous {
            bus.publish(Event::HoverEnd(previous));
        }
        bus.publish(Event::HoverBegin(target));
    }

    // A picked title starts from a clean slate.
    fn pick(&self, id: RecordId) {
        let bus = self.dashboard.bus();
        bus.publish(Event::Reset);
        bus.publish(Event::SelectionMade { record: id });
    }

    fn show_bound(&self, dimension: Dimension, bound: &Bound, active: bool) {
        let mark = if active { "*" } else { " " };
        match bound {
            Bound::Range(range) => self.say(format_args!(" {mark} {:<10} {range}", dimension.name())),
            Bound::Labels(labels) if labels.is_empty() => {
                self.say(format_args!(" {mark} {:<10} (all)", dimension.name()))
            }
            Bound::Labels(labels) => self.say(format_args!(" {mark} {:<10} {labels}", dimension.name())),
        }
    }
}

impl<W: Write + Send + 'static> Drop for Console<W> {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.dashboard.bus().unsubscribe(id);
        }
    }
}

fn dimension(name: &str) -> Result<Dimension, String> {
    name.parse::<Dimension>().map_err(|e| e.to_string())
}

fn numeric(name: &str) -> Result<Dimension, String> {
    let dim = dimension(name)?;
    if dim.is_numeric() {
        Ok(dim)
    } else {
        Err(FilterError::NotNumeric(dim).to_string())
    }
}

fn categorical(name: &str) -> Result<Dimension, String> {
    let dim = dimension(name)?;
    if dim.is_numeric() {
        Err(FilterError::NotCategorical(dim).to_string())
    } else {
        Ok(dim)
    }
}
