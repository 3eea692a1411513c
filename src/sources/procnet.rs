//! Socket tables from /proc/net/{tcp,tcp6,udp,udp6}

use crate::models::{MonitorError, TcpConnection, UdpListener};
use crate::sources::NetworkSource;
use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

pub struct ProcNetSource {
    root: PathBuf,
}

impl ProcNetSource {
    pub fn new() -> Self {
        Self::with_root("/proc/net")
    }

    /// Read tables from another directory (tests, containers with a bind-mounted procfs)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rows of one table, header skipped. The IPv6 tables are optional.
    fn rows(&self, table: &str, required: bool) -> Result<Vec<String>, MonitorError> {
        let path = self.root.join(table);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content
                .lines()
                .skip(1)
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound && !required => Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(MonitorError::Unavailable(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ProcNetSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSource for ProcNetSource {
    fn tcp_connections(&self) -> Result<Vec<TcpConnection>, MonitorError> {
        let mut connections = Vec::new();
        for row in self.rows("tcp", true)?.iter().chain(self.rows("tcp6", false)?.iter()) {
            connections.push(parse_tcp_line(row)?);
        }
        Ok(connections)
    }

    fn udp_listeners(&self) -> Result<Vec<UdpListener>, MonitorError> {
        let mut listeners = Vec::new();
        for row in self.rows("udp", true)?.iter().chain(self.rows("udp6", false)?.iter()) {
            let fields: Vec<&str> = row.split_whitespace().collect();
            if fields.len() < 2 {
                return Err(parse_error("udp table row", row));
            }
            listeners.push(UdpListener { local: parse_endpoint(fields[1])? });
        }
        Ok(listeners)
    }
}

pub(crate) fn parse_tcp_line(line: &str) -> Result<TcpConnection, MonitorError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(parse_error("tcp table row", line));
    }

    Ok(TcpConnection {
        local: parse_endpoint(fields[1])?,
        remote: parse_endpoint(fields[2])?,
        state: tcp_state_name(fields[3]).to_string(),
    })
}

/// `0100007F:0016` or the 32-digit IPv6 form. Addresses are printed as
/// native-endian 32-bit words, so each word's bytes come from `to_ne_bytes`.
pub(crate) fn parse_endpoint(s: &str) -> Result<SocketAddr, MonitorError> {
    let (addr_hex, port_hex) = s.split_once(':').ok_or_else(|| parse_error("endpoint", s))?;
    let port = u16::from_str_radix(port_hex, 16).map_err(|_| parse_error("port", s))?;
    if !addr_hex.is_ascii() {
        return Err(parse_error("address", s));
    }

    let ip = match addr_hex.len() {
        8 => {
            let word = u32::from_str_radix(addr_hex, 16).map_err(|_| parse_error("IPv4 address", s))?;
            IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
        }
        32 => {
            let mut bytes = [0u8; 16];
            for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
                let word = u32::from_str_radix(&addr_hex[i * 8..i * 8 + 8], 16)
                    .map_err(|_| parse_error("IPv6 address", s))?;
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            let v6 = Ipv6Addr::from(bytes);
            match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            }
        }
        _ => return Err(parse_error("address", s)),
    };

    Ok(SocketAddr::new(ip, port))
}

fn tcp_state_name(hex: &str) -> &'static str {
    match hex {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
}

fn parse_error(what: &'static str, input: &str) -> MonitorError {
    MonitorError::Parse { what, input: input.to_string() }
}
