//! DogStatsD over UDP.
//!
//! Every series becomes one line, `name:value|c` or `name:value|g`, with
//! tags appended as `|#tag1,tag2`. Lines are packed into datagrams no larger
//! than `max_packet_size`, newline separated. A single line longer than that
//! still goes out, alone.

use super::{Error, Request, Transport};
use crate::series::{Series, SeriesType};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

/// Configuration for `UdpTransport`.
#[derive(Clone, Debug, PartialEq)]
pub struct UdpConfig {
    /// Agent host.
    pub host: String,
    /// Agent port.
    pub port: u16,
    /// Prepended, with a dot, to every series name.
    pub prefix: Option<String>,
    /// Upper bound on one datagram's payload.
    pub max_packet_size: usize,
}

impl Default for UdpConfig {
    fn default() -> UdpConfig {
        UdpConfig {
            host: "localhost".to_string(),
            port: 8125,
            prefix: None,
            max_packet_size: 1432,
        }
    }
}

/// Writes series to a DogStatsD agent.
pub struct UdpTransport {
    config: UdpConfig,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Create the transport. Nothing is resolved or bound until a request is
    /// sent.
    pub fn new(config: UdpConfig) -> UdpTransport {
        UdpTransport {
            config,
            closed: AtomicBool::new(false),
        }
    }
}

impl Transport for UdpTransport {
    fn prepare(&self) -> Result<Box<dyn Request>, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(Box::new(UdpRequest {
            config: self.config.clone(),
            lines: Vec::new(),
        }))
    }

    fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct UdpRequest {
    config: UdpConfig,
    lines: Vec<String>,
}

impl UdpRequest {
    fn add(&mut self, series: &Series) {
        if let Some(line) = fmt_line(self.config.prefix.as_ref().map(|s| s.as_str()), series) {
            self.lines.push(line);
        }
    }
}

impl Request for UdpRequest {
    fn add_counter(&mut self, counter: Series) -> Result<(), Error> {
        self.add(&counter);
        Ok(())
    }

    fn add_gauge(&mut self, gauge: Series) -> Result<(), Error> {
        self.add(&gauge);
        Ok(())
    }

    fn send(self: Box<Self>) -> Result<(), Error> {
        if self.lines.is_empty() {
            return Ok(());
        }
        let addr = resolve(&self.config.host, self.config.port)?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let packets = pack(&self.lines, self.config.max_packet_size);
        trace!(
            "writing {} lines in {} datagrams to {}",
            self.lines.len(),
            packets.len(),
            addr
        );
        for packet in packets {
            socket.send_to(packet.as_bytes(), addr)?;
        }
        Ok(())
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}:{}", host, port),
            ))
        })
}

#[inline]
fn fmt_line(prefix: Option<&str>, series: &Series) -> Option<String> {
    let value = series.value()?;
    let mut line = String::with_capacity(64);
    if let Some(prefix) = prefix {
        line.push_str(prefix);
        line.push('.');
    }
    line.push_str(&series.metric);
    line.push(':');
    line.push_str(&value.to_string());
    line.push_str(match series.kind {
        SeriesType::Counter => "|c",
        SeriesType::Gauge => "|g",
    });
    let mut tags: Vec<String> = series.tags.clone();
    if let Some(ref host) = series.host {
        tags.push(format!("host:{}", host));
    }
    if !tags.is_empty() {
        line.push_str("|#");
        line.push_str(&tags.join(","));
    }
    Some(line)
}

fn pack(lines: &[String], max_packet_size: usize) -> Vec<String> {
    let mut packets = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && current.len() + 1 + line.len() > max_packet_size {
            packets.push(current);
            current = String::new();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        packets.push(current);
    }
    packets
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metric::Number;
    use quickcheck::{QuickCheck, TestResult};
    use std::time::Duration;

    fn series(kind: SeriesType, value: Number, host: Option<&str>, tags: &[&str]) -> Series {
        Series::new(
            "a.b",
            kind,
            value,
            100,
            host.map(|h| h.to_string()),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn counter_line() {
        let s = series(SeriesType::Counter, Number::Integer(3), None, &[]);
        assert_eq!(Some("a.b:3|c".to_string()), fmt_line(None, &s));
    }

    #[test]
    fn gauge_line_with_prefix_and_tags() {
        let s = series(SeriesType::Gauge, Number::Float(1.5), None, &["env:prod", "x"]);
        assert_eq!(
            Some("app.a.b:1.5|g|#env:prod,x".to_string()),
            fmt_line(Some("app"), &s)
        );
    }

    #[test]
    fn host_becomes_last_tag() {
        let s = series(SeriesType::Gauge, Number::Integer(1), Some("h1"), &["env:prod"]);
        assert_eq!(
            Some("a.b:1|g|#env:prod,host:h1".to_string()),
            fmt_line(None, &s)
        );
        let s = series(SeriesType::Gauge, Number::Integer(1), Some("h1"), &[]);
        assert_eq!(Some("a.b:1|g|#host:h1".to_string()), fmt_line(None, &s));
    }

    #[test]
    fn packets_respect_limit() {
        fn inner(lens: Vec<u8>, max: u8) -> TestResult {
            let max = max as usize + 1;
            let lines: Vec<String> = lens
                .iter()
                .map(|l| "x".repeat(*l as usize % max + 1))
                .collect();
            let packets = pack(&lines, max);
            for p in &packets {
                assert!(p.len() <= max || !p.contains('\n'));
            }
            let rejoined: Vec<&str> = packets.iter().flat_map(|p| p.split('\n')).collect();
            let original: Vec<&str> = lines.iter().map(|l| l.as_str()).collect();
            assert_eq!(original, rejoined);
            TestResult::passed()
        }
        QuickCheck::new().quickcheck(inner as fn(Vec<u8>, u8) -> TestResult);
    }

    #[test]
    fn sends_to_agent() {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        agent.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = agent.local_addr().unwrap().port();
        let transport = UdpTransport::new(UdpConfig {
            host: "127.0.0.1".into(),
            port,
            prefix: None,
            max_packet_size: 1432,
        });
        let mut request = transport.prepare().unwrap();
        request
            .add_counter(series(SeriesType::Counter, Number::Integer(1), None, &[]))
            .unwrap();
        request
            .add_gauge(series(SeriesType::Gauge, Number::Integer(2), None, &[]))
            .unwrap();
        request.send().unwrap();

        let mut buf = [0; 2048];
        let n = agent.recv(&mut buf).unwrap();
        assert_eq!("a.b:1|c\na.b:2|g", String::from_utf8_lossy(&buf[..n]));
    }

    #[test]
    fn closed_transport_refuses_requests() {
        let transport = UdpTransport::new(UdpConfig::default());
        transport.close().unwrap();
        assert!(transport.prepare().is_err());
    }
}
