mod app;
mod config;
mod constants;
mod error;
mod network;
mod render;
mod sampler;
mod ui;
mod util;

use std::{
    error::Error,
    fs::File,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc, Mutex,
    },
    time::Duration,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use crate::app::{App, SharedHistory, Update};
use crate::config::{Cli, Config};
use crate::constants::UI_POLL_MS;
use crate::network::build_probe;
use crate::sampler::Sampler;
use crate::util::format_sample_line;

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::try_from(Cli::parse())?;
    init_logging(&config)?;

    let probe = build_probe(config.probe, config.port).map_err(|err| {
        format!("cannot open {} probe: {} (try --probe tcp without root)", config.probe, err)
    })?;

    let history = SharedHistory::new(config.capacity);
    let (updates_tx, updates_rx) = mpsc::channel::<Update>();
    let sampler = Sampler::new(
        &config.target,
        probe,
        history.clone(),
        config.period,
        config.timeout,
        updates_tx,
    )
    .spawn()?;

    info!(target_host = %config.target, probe = %config.probe, capacity = config.capacity, "monitor started");

    let res = if config.headless {
        run_headless(&config.target, &history, updates_rx)
    } else {
        let app = App::new(&config.target, config.probe, history, config.params);
        ui::run(app, updates_rx)
    };

    sampler.stop();
    info!("monitor stopped");
    Ok(res?)
}

fn init_logging(config: &Config) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.headless)
        .with_writer(log_writer(config)?)
        .try_init()
        .map_err(|e| e as Box<dyn Error>)?;
    Ok(())
}

// Headless logs to stderr; in chart mode the alternate screen owns the terminal
fn log_writer(config: &Config) -> io::Result<BoxMakeWriter> {
    if config.headless {
        Ok(BoxMakeWriter::new(io::stderr))
    } else {
        let file = File::create(&config.log_file)?;
        Ok(BoxMakeWriter::new(Mutex::new(file)))
    }
}

// Prints every new sample until Ctrl-C
fn run_headless(target: &str, history: &SharedHistory, updates: Receiver<Update>) -> io::Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::Release))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    }

    while !interrupted.load(Ordering::Acquire) {
        match updates.recv_timeout(Duration::from_millis(UI_POLL_MS)) {
            Ok(Update::NewSample) => {
                if let Some(sample) = history.latest() {
                    println!("{}", format_sample_line(target, &sample));
                }
            }
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("sampler exited");
                break;
            }
        }
    }
    Ok(())
}
