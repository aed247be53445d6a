use std::{
    fmt,
    io,
    net::{IpAddr, SocketAddr, TcpStream},
    str::FromStr,
    time::{Duration, Instant},
};
use dns_lookup::lookup_host;
use pnet::packet::{
    icmp::{
        echo_reply::EchoReplyPacket,
        echo_request::MutableEchoRequestPacket,
        IcmpTypes,
    },
    ip::IpNextHeaderProtocols,
    Packet,
};
use pnet::transport::{
    icmp_packet_iter, transport_channel, TransportChannelType::Layer4, TransportProtocol::Ipv4,
    TransportReceiver, TransportSender,
};
use pnet::util::checksum;
use tracing::debug;

use crate::constants::ICMP_PAYLOAD_LEN;
use crate::error::ProbeError;

/// One round-trip measurement against `target`, bounded by `timeout`.
pub trait Probe: Send {
    fn probe(&mut self, target: &str, timeout: Duration) -> Result<Duration, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Icmp,
    Tcp,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Icmp => f.write_str("icmp"),
            ProbeKind::Tcp => f.write_str("tcp"),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icmp" => Ok(ProbeKind::Icmp),
            "tcp" => Ok(ProbeKind::Tcp),
            other => Err(format!("unknown probe '{}' (expected icmp or tcp)", other)),
        }
    }
}

pub fn build_probe(kind: ProbeKind, port: u16) -> Result<Box<dyn Probe>, ProbeError> {
    Ok(match kind {
        ProbeKind::Icmp => Box::new(IcmpProbe::open()?),
        ProbeKind::Tcp => Box::new(TcpProbe::new(port)),
    })
}

pub fn resolve(target: &str) -> Result<Vec<IpAddr>, ProbeError> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    lookup_host(target).map_err(|source| ProbeError::Resolve {
        target: target.to_string(),
        source,
    })
}

// Resolved once per target, retried on every probe until it succeeds
#[derive(Debug, Default)]
struct CachedAddr {
    target: String,
    addr: Option<IpAddr>,
}

impl CachedAddr {
    fn get(
        &mut self,
        target: &str,
        pick: impl Fn(&[IpAddr]) -> Option<IpAddr>,
    ) -> Result<IpAddr, ProbeError> {
        if self.target != target {
            self.target = target.to_string();
            self.addr = None;
        }
        if let Some(addr) = self.addr {
            return Ok(addr);
        }
        let addrs = resolve(target)?;
        let addr = pick(&addrs).ok_or_else(|| ProbeError::NoAddress(target.to_string()))?;
        debug!(host = target, %addr, "resolved probe target");
        self.addr = Some(addr);
        Ok(addr)
    }
}

/// Measures the time to complete (or be refused) a TCP handshake.
pub struct TcpProbe {
    port: u16,
    cache: CachedAddr,
}

impl TcpProbe {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            cache: CachedAddr::default(),
        }
    }
}

impl Probe for TcpProbe {
    fn probe(&mut self, target: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let addr = self.cache.get(target, |addrs| addrs.first().copied())?;
        let start = Instant::now();
        match TcpStream::connect_timeout(&SocketAddr::new(addr, self.port), timeout) {
            Ok(_) => Ok(start.elapsed()),
            // a RST is still a round trip to the host
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(start.elapsed()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(ProbeError::Timeout { addr, timeout }),
            Err(e) => Err(e.into()),
        }
    }
}

/// ICMP echo over a raw IPv4 socket. Needs root or CAP_NET_RAW.
pub struct IcmpProbe {
    tx: TransportSender,
    rx: TransportReceiver,
    identifier: u16,
    sequence: u16,
    cache: CachedAddr,
}

impl IcmpProbe {
    pub fn open() -> Result<Self, ProbeError> {
        let (tx, rx) = transport_channel(4096, Layer4(Ipv4(IpNextHeaderProtocols::Icmp)))?;
        Ok(Self {
            tx,
            rx,
            identifier: (std::process::id() & 0xffff) as u16,
            sequence: 0,
            cache: CachedAddr::default(),
        })
    }
}

pub fn echo_request(buf: &mut [u8], identifier: u16, sequence: u16) -> Option<MutableEchoRequestPacket<'_>> {
    let mut packet = MutableEchoRequestPacket::new(buf)?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_identifier(identifier);
    packet.set_sequence_number(sequence);
    packet.set_checksum(0);
    let sum = checksum(packet.packet(), 1);
    packet.set_checksum(sum);
    Some(packet)
}

impl Probe for IcmpProbe {
    fn probe(&mut self, target: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let addr = self.cache.get(target, |addrs| addrs.iter().copied().find(IpAddr::is_ipv4))?;
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + ICMP_PAYLOAD_LEN];
        let packet = echo_request(&mut buf, self.identifier, self.sequence)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "echo buffer too small"))?;

        let start = Instant::now();
        self.tx.send_to(packet, addr)?;

        let mut replies = icmp_packet_iter(&mut self.rx);
        loop {
            let remaining = match timeout.checked_sub(start.elapsed()) {
                Some(left) if !left.is_zero() => left,
                _ => return Err(ProbeError::Timeout { addr, timeout }),
            };
            let Some((reply, from)) = replies.next_with_timeout(remaining)? else {
                return Err(ProbeError::Timeout { addr, timeout });
            };
            if from != addr || reply.get_icmp_type() != IcmpTypes::EchoReply {
                continue;
            }
            let Some(echo) = EchoReplyPacket::new(reply.packet()) else {
                continue;
            };
            // the raw socket sees every echo reply on the host
            if echo.get_identifier() == self.identifier && echo.get_sequence_number() == self.sequence {
                return Ok(start.elapsed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    #[test]
    fn resolve_accepts_literal_addresses() {
        assert_eq!(resolve("127.0.0.1").unwrap(), vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        assert_eq!(resolve("::1").unwrap(), vec!["::1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn probe_kind_parses() {
        assert_eq!("icmp".parse::<ProbeKind>(), Ok(ProbeKind::Icmp));
        assert_eq!("tcp".parse::<ProbeKind>(), Ok(ProbeKind::Tcp));
        assert!("udp".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn tcp_probe_measures_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut probe = TcpProbe::new(port);
        let rtt = probe.probe("127.0.0.1", Duration::from_secs(1)).unwrap();
        assert!(rtt < Duration::from_secs(1));
    }

    #[test]
    fn tcp_probe_counts_refused_as_reply() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut probe = TcpProbe::new(port);
        assert!(probe.probe("127.0.0.1", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn icmp_probe_rejects_ipv6_only_target() {
        let mut cache = CachedAddr::default();
        let err = cache
            .get("::1", |addrs| addrs.iter().copied().find(IpAddr::is_ipv4))
            .unwrap_err();
        assert!(matches!(err, ProbeError::NoAddress(_)));
    }

    #[test]
    fn echo_request_has_valid_checksum() {
        let mut buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + ICMP_PAYLOAD_LEN];
        let packet = echo_request(&mut buf, 0x1234, 7).unwrap();
        assert_eq!(packet.get_identifier(), 0x1234);
        assert_eq!(packet.get_sequence_number(), 7);
        assert_ne!(packet.get_checksum(), 0);
        assert_eq!(packet.get_checksum(), checksum(packet.packet(), 1));
    }
}
