//! Structured pipeline events.
//!
//! Interval workers run in parallel, so instead of a shared logger the
//! pipeline components receive an injected `EventSink`. Each event names
//! the interval and product it concerns, which is what the end-of-run
//! summary is assembled from.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    IntervalAccepted,
    IntervalSkipped,
    CoverageIncomplete,
    ProductFailed,
    MosaicWritten,
}

impl EventKind {
    fn is_warning(self) -> bool {
        matches!(
            self,
            EventKind::IntervalSkipped
                | EventKind::CoverageIncomplete
                | EventKind::ProductFailed
        )
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub interval: Option<String>,
    pub product: Option<String>,
    pub detail: String,
}

impl Event {
    pub fn new(kind: EventKind, detail: impl Into<String>) -> Self {
        Event {
            kind,
            interval: None,
            product: None,
            detail: detail.into(),
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(interval) = &self.interval {
            write!(f, " interval={}", interval)?;
        }
        if let Some(product) = &self.product {
            write!(f, " product={}", product)?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Destination for pipeline events. Implementations must be safe to share
/// across parallel interval workers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events to the `log` facade
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        if event.kind.is_warning() {
            log::warn!("{}", event);
        } else {
            log::info!("{}", event);
        }
    }
}

/// Collects events in memory; used by tests and by the run summary
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}

/// Emits to both an in-memory collector and the log
pub struct TeeSink<'a> {
    pub memory: &'a MemorySink,
    pub log: LogSink,
}

impl EventSink for TeeSink<'_> {
    fn emit(&self, event: Event) {
        self.log.emit(event.clone());
        self.memory.emit(event);
    }
}
