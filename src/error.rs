use std::{io, net::IpAddr, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} has no address usable by this probe")]
    NoAddress(String),
    #[error("no reply from {addr} within {timeout:?}")]
    Timeout { addr: IpAddr, timeout: Duration },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("zoom bounds must be finite numbers")]
    NonFiniteZoom,
}
