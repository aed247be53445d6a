use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use chrono::{DateTime, Local};
use crate::network::ProbeKind;
use crate::render::{render, ChartSpec, DisplayParams, Interval};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Latency(f64),
    Failed,
}

impl Outcome {
    /// Failed probes plot at zero.
    pub fn value_ms(self) -> f64 {
        match self {
            Outcome::Latency(ms) => ms,
            Outcome::Failed => 0.0,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Outcome::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub outcome: Outcome,
}

// Bounded, oldest-first latency history
#[derive(Debug)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `sample`, evicting the single oldest entry when full. Returns
    /// the sample as stored: a timestamp older than the newest entry is
    /// raised to it so the history never runs backwards.
    pub fn push(&mut self, mut sample: Sample) -> Sample {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                sample.timestamp = newest.timestamp;
            }
        }

        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        sample
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// Written by the sampler thread, read by the UI thread
#[derive(Debug, Clone)]
pub struct SharedHistory(Arc<Mutex<HistoryBuffer>>);

impl SharedHistory {
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(HistoryBuffer::new(capacity))))
    }

    fn lock(&self) -> MutexGuard<'_, HistoryBuffer> {
        // the buffer is never left half-written, so a poisoned lock is still usable
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, sample: Sample) -> Sample {
        self.lock().push(sample)
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().snapshot()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.lock().latest()
    }

    /// Newest sample, length and capacity, read under one lock.
    pub fn status(&self) -> HistoryStatus {
        let buffer = self.lock();
        HistoryStatus {
            latest: buffer.latest(),
            len: buffer.len(),
            capacity: buffer.capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryStatus {
    pub latest: Option<Sample>,
    pub len: usize,
    pub capacity: usize,
}

// Everything that makes the chart stale
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Update {
    NewSample,
    SetInterval(Interval),
    SetZoom { upper: f64, lower: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoomField {
    #[default]
    Upper,
    Lower,
}

// Text entry for the two zoom bounds
#[derive(Debug, Default)]
pub struct ZoomForm {
    pub upper: String,
    pub lower: String,
    pub focus: ZoomField,
}

impl ZoomForm {
    pub fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            ZoomField::Upper => &mut self.upper,
            ZoomField::Lower => &mut self.lower,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            ZoomField::Upper => ZoomField::Lower,
            ZoomField::Lower => ZoomField::Upper,
        };
    }

    /// Parses both fields. Anything that is not a finite number on either
    /// side falls back to `(0, 0)`, the auto-range sentinel.
    pub fn submit(&self) -> (f64, f64) {
        let parse = |text: &str| text.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        match (parse(&self.upper), parse(&self.lower)) {
            (Some(upper), Some(lower)) => (upper, lower),
            _ => (0.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    EditingZoom,
}

// Main application state
pub struct App {
    pub target: String,
    pub probe_kind: ProbeKind,
    pub history: SharedHistory,
    pub params: DisplayParams,
    pub chart: ChartSpec,
    pub zoom_form: ZoomForm,
    pub input_mode: InputMode,
}

impl App {
    pub fn new(target: &str, probe_kind: ProbeKind, history: SharedHistory, params: DisplayParams) -> App {
        let chart = render(&history.snapshot(), &params);
        App {
            target: target.to_string(),
            probe_kind,
            history,
            params,
            chart,
            zoom_form: ZoomForm::default(),
            input_mode: InputMode::Normal,
        }
    }

    pub fn apply(&mut self, update: Update) {
        match update {
            Update::NewSample => self.refresh(),
            Update::SetInterval(interval) => self.set_interval(interval),
            Update::SetZoom { upper, lower } => self.set_zoom_range(upper, lower),
        }
    }

    pub fn set_interval(&mut self, interval: Interval) {
        self.params.interval = interval;
        self.refresh();
    }

    pub fn set_zoom_range(&mut self, upper: f64, lower: f64) {
        self.params.zoom_upper = upper;
        self.params.zoom_lower = lower;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.chart = render(&self.history.snapshot(), &self.params);
    }
}
