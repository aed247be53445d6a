pub const SAMPLE_PERIOD_MS: u64 = 1000; // one probe per second
pub const PROBE_TIMEOUT_MS: u64 = 1000;
pub const HISTORY_CAPACITY: usize = 100;
pub const UI_POLL_MS: u64 = 250;
pub const DEFAULT_TCP_PORT: u16 = 80;
pub const ICMP_PAYLOAD_LEN: usize = 32;
pub const LOG_FILE_NAME: &str = "ping_monitor.log";
