use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use chrono::Local;
use tracing::{debug, info, warn};

use crate::app::{Outcome, Sample, SharedHistory, Update};
use crate::network::Probe;

pub struct Sampler {
    target: String,
    probe: Box<dyn Probe>,
    history: SharedHistory,
    period: Duration,
    timeout: Duration,
    updates: Sender<Update>,
    stop: Arc<AtomicBool>,
}

impl Sampler {
    pub fn new(
        target: &str,
        probe: Box<dyn Probe>,
        history: SharedHistory,
        period: Duration,
        timeout: Duration,
        updates: Sender<Update>,
    ) -> Self {
        Self {
            target: target.to_string(),
            probe,
            history,
            period,
            // a probe may never hold up the next tick
            timeout: timeout.min(period),
            updates,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One probe, one append, one notification.
    pub fn tick(&mut self) -> Sample {
        let started = Instant::now();
        let outcome = match self.probe.probe(&self.target, self.timeout) {
            Ok(rtt) => Outcome::Latency(rtt.as_secs_f64() * 1000.0),
            Err(err) => {
                warn!(host = %self.target, error = %err, "probe failed");
                Outcome::Failed
            }
        };
        if started.elapsed() > self.period {
            warn!(host = %self.target, elapsed = ?started.elapsed(), "probe overran its deadline");
        }

        let sample = self.history.push(Sample {
            timestamp: Local::now(),
            outcome,
        });
        debug!(host = %self.target, ?outcome, "sample recorded");

        if self.updates.send(Update::NewSample).is_err() {
            debug!("renderer is gone, dropping notification");
        }
        sample
    }

    /// Samples once per period until the stop flag is raised.
    pub fn run(mut self) {
        info!(host = %self.target, period = ?self.period, "sampler started");
        let mut next = Instant::now();

        while !self.stop.load(Ordering::Acquire) {
            self.tick();

            next += self.period;
            let now = Instant::now();
            if next < now {
                // overran: restart the schedule rather than burst
                next = now;
            }
            while !self.stop.load(Ordering::Acquire) {
                let now = Instant::now();
                if now >= next {
                    break;
                }
                thread::park_timeout(next - now);
            }
        }
        info!(host = %self.target, "sampler stopped");
    }

    pub fn spawn(self) -> io::Result<SamplerHandle> {
        let stop = Arc::clone(&self.stop);
        let thread = thread::Builder::new()
            .name("sampler".into())
            .spawn(move || self.run())?;
        Ok(SamplerHandle { stop, thread })
    }
}

pub struct SamplerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl SamplerHandle {
    /// Raises the stop flag, wakes the sampler out of its wait and joins it.
    /// A probe already in flight finishes first.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        self.thread.thread().unpark();
        if self.thread.join().is_err() {
            warn!("sampler thread panicked");
        }
    }
}
