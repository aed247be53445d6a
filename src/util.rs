use crate::app::{Outcome, Sample};

// Latency for display: sub-millisecond values keep two decimals
pub fn format_latency(outcome: Outcome) -> String {
    match outcome {
        Outcome::Failed => "timeout".to_string(),
        Outcome::Latency(ms) if ms < 1.0 => format!("{:.2} ms", ms),
        Outcome::Latency(ms) if ms < 100.0 => format!("{:.1} ms", ms),
        Outcome::Latency(ms) => format!("{:.0} ms", ms),
    }
}

pub fn format_sample_line(target: &str, sample: &Sample) -> String {
    format!(
        "{}  {}  {}",
        sample.timestamp.format("%H:%M:%S"),
        target,
        format_latency(sample.outcome)
    )
}

/// Bounds that fit `values`, always including zero.
pub fn auto_bounds(values: &[f64]) -> [f64; 2] {
    let min = values.iter().copied().fold(0.0, f64::min);
    let max = values.iter().copied().fold(0.0, f64::max);
    if max - min <= f64::EPSILON {
        [min, min + 1.0]
    } else {
        [min, max * 1.1]
    }
}
