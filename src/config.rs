use std::{path::PathBuf, time::Duration};
use clap::Parser;

use crate::constants::{
    DEFAULT_TCP_PORT, HISTORY_CAPACITY, LOG_FILE_NAME, PROBE_TIMEOUT_MS, SAMPLE_PERIOD_MS,
};
use crate::error::ConfigError;
use crate::network::ProbeKind;
use crate::render::{DisplayParams, Interval};

#[derive(Parser, Debug)]
#[command(name = "ping_monitor", version, about = "Live round-trip latency chart for one host")]
pub struct Cli {
    /// Hostname or IP address to probe
    pub target: String,

    /// icmp (needs raw socket privileges) or tcp
    #[arg(long, default_value = "icmp")]
    pub probe: ProbeKind,

    /// Port for the tcp probe
    #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
    pub port: u16,

    #[arg(long, default_value_t = SAMPLE_PERIOD_MS)]
    pub period_ms: u64,

    /// Clamped to the sampling period
    #[arg(long, default_value_t = PROBE_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Number of samples kept
    #[arg(long, default_value_t = HISTORY_CAPACITY)]
    pub capacity: usize,

    /// 1min, 5min, 10min, 30min or full
    #[arg(long, default_value = "full")]
    pub interval: Interval,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub zoom_upper: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub zoom_lower: f64,

    /// Print samples to stdout instead of drawing the chart
    #[arg(long)]
    pub headless: bool,

    /// Log destination in chart mode (headless logs to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: String,
    pub probe: ProbeKind,
    pub port: u16,
    pub period: Duration,
    pub timeout: Duration,
    pub capacity: usize,
    pub params: DisplayParams,
    pub headless: bool,
    pub log_file: PathBuf,
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.period_ms == 0 {
            return Err(ConfigError::NotPositive("--period-ms"));
        }
        if cli.timeout_ms == 0 {
            return Err(ConfigError::NotPositive("--timeout-ms"));
        }
        if cli.capacity == 0 {
            return Err(ConfigError::NotPositive("--capacity"));
        }
        if !cli.zoom_upper.is_finite() || !cli.zoom_lower.is_finite() {
            return Err(ConfigError::NonFiniteZoom);
        }

        Ok(Config {
            target: cli.target,
            probe: cli.probe,
            port: cli.port,
            period: Duration::from_millis(cli.period_ms),
            timeout: Duration::from_millis(cli.timeout_ms),
            capacity: cli.capacity,
            params: DisplayParams {
                interval: cli.interval,
                zoom_upper: cli.zoom_upper,
                zoom_lower: cli.zoom_lower,
            },
            headless: cli.headless,
            log_file: cli
                .log_file
                .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE_NAME)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let cli = Cli::try_parse_from(std::iter::once("ping_monitor").chain(args.iter().copied()))
            .expect("valid command line");
        Config::try_from(cli)
    }

    #[test]
    fn defaults() {
        let config = parse(&["1.1.1.1"]).unwrap();
        assert_eq!(config.target, "1.1.1.1");
        assert_eq!(config.probe, ProbeKind::Icmp);
        assert_eq!(config.period, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.capacity, 100);
        assert_eq!(config.params, DisplayParams::default());
        assert!(!config.headless);
        assert!(config.log_file.ends_with(LOG_FILE_NAME));
    }

    #[test]
    fn explicit_options() {
        let config = parse(&[
            "example.net",
            "--probe", "tcp",
            "--port", "443",
            "--period-ms", "250",
            "--capacity", "600",
            "--interval", "10min",
            "--zoom-upper", "80",
            "--zoom-lower", "-5",
            "--headless",
        ])
        .unwrap();
        assert_eq!(config.probe, ProbeKind::Tcp);
        assert_eq!(config.port, 443);
        assert_eq!(config.period, Duration::from_millis(250));
        assert_eq!(config.capacity, 600);
        assert_eq!(config.params.interval, Interval::TenMin);
        assert_eq!(config.params.zoom_upper, 80.0);
        assert_eq!(config.params.zoom_lower, -5.0);
        assert!(config.headless);
    }

    #[test]
    fn rejects_zero_values() {
        assert_eq!(parse(&["h", "--period-ms", "0"]).unwrap_err(), ConfigError::NotPositive("--period-ms"));
        assert_eq!(parse(&["h", "--timeout-ms", "0"]).unwrap_err(), ConfigError::NotPositive("--timeout-ms"));
        assert_eq!(parse(&["h", "--capacity", "0"]).unwrap_err(), ConfigError::NotPositive("--capacity"));
    }

    #[test]
    fn rejects_non_finite_zoom() {
        assert_eq!(parse(&["h", "--zoom-upper", "inf"]).unwrap_err(), ConfigError::NonFiniteZoom);
    }

    #[test]
    fn rejects_unknown_interval() {
        let result = Cli::try_parse_from(["ping_monitor", "h", "--interval", "2min"]);
        assert!(result.is_err());
    }
}
