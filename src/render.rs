use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Local};

use crate::app::Sample;

/// Time window selected by the user. Only changes tick density, never which
/// samples are plotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    OneMin,
    FiveMin,
    TenMin,
    ThirtyMin,
    #[default]
    Full,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::OneMin,
        Interval::FiveMin,
        Interval::TenMin,
        Interval::ThirtyMin,
        Interval::Full,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::OneMin => "1min",
            Interval::FiveMin => "5min",
            Interval::TenMin => "10min",
            Interval::ThirtyMin => "30min",
            Interval::Full => "full",
        }
    }

    pub fn tick_policy(self) -> TickPolicy {
        match self {
            Interval::OneMin => TickPolicy::Every(Duration::seconds(10)),
            Interval::FiveMin => TickPolicy::Every(Duration::minutes(1)),
            Interval::TenMin => TickPolicy::Every(Duration::minutes(2)),
            Interval::ThirtyMin => TickPolicy::Every(Duration::minutes(5)),
            Interval::Full => TickPolicy::AnchorAtOrigin,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown interval '{}' (expected 1min, 5min, 10min, 30min or full)", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPolicy {
    Every(Duration),
    /// One tick pinned at the first sample.
    AnchorAtOrigin,
}

impl TickPolicy {
    pub fn label_format(&self) -> &'static str {
        match self {
            TickPolicy::Every(step) if *step < Duration::minutes(1) => "%H:%M:%S",
            _ => "%H:%M",
        }
    }

    fn positions(&self, first: DateTime<Local>, last: DateTime<Local>) -> Vec<DateTime<Local>> {
        let step = match self {
            TickPolicy::AnchorAtOrigin => return vec![first],
            TickPolicy::Every(step) => step.num_seconds().max(1),
        };

        // first whole second at or after `first`, then up to the next multiple of step
        let nanos = i64::from(first.timestamp_subsec_nanos());
        let start = first.timestamp() + i64::from(nanos > 0);
        let mut secs = start + (step - start.rem_euclid(step)) % step;
        let end = last.timestamp();

        let mut ticks = Vec::new();
        while secs <= end {
            ticks.push(first + Duration::seconds(secs - first.timestamp()) - Duration::nanoseconds(nanos));
            secs += step;
        }
        ticks
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YRange {
    /// Let the drawing surface fit the data.
    Auto,
    Fixed { lower: f64, upper: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayParams {
    pub interval: Interval,
    pub zoom_upper: f64,
    pub zoom_lower: f64,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            interval: Interval::Full,
            zoom_upper: 0.0,
            zoom_lower: 0.0,
        }
    }
}

impl DisplayParams {
    pub fn y_range(&self) -> YRange {
        if self.zoom_upper == 0.0 && self.zoom_lower == 0.0 {
            YRange::Auto
        } else {
            YRange::Fixed {
                lower: self.zoom_lower,
                upper: self.zoom_upper,
            }
        }
    }
}

/// Everything the drawing surface needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub x: Vec<DateTime<Local>>,
    pub y: Vec<f64>,
    pub failed: Vec<bool>,
    pub tick_policy: TickPolicy,
    pub ticks: Vec<DateTime<Local>>,
    pub y_range: YRange,
}

pub fn render(snapshot: &[Sample], params: &DisplayParams) -> ChartSpec {
    let tick_policy = params.interval.tick_policy();
    let ticks = match (snapshot.first(), snapshot.last()) {
        (Some(first), Some(last)) => tick_policy.positions(first.timestamp, last.timestamp),
        _ => Vec::new(),
    };

    ChartSpec {
        x: snapshot.iter().map(|s| s.timestamp).collect(),
        y: snapshot.iter().map(|s| s.outcome.value_ms()).collect(),
        failed: snapshot.iter().map(|s| s.outcome.is_failed()).collect(),
        tick_policy,
        ticks,
        y_range: params.y_range(),
    }
}
