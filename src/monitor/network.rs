//! Network monitor: new TCP connections and UDP listeners

use crate::constants::SOURCE_NETWORK;
use crate::intel::ThreatIntelCache;
use crate::models::{EventDetails, MonitorError, Protocol, SecurityEvent, TcpConnection, UdpListener};
use crate::monitor::PollingMonitor;
use crate::sources::NetworkSource;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Ports associated with backdoors, IRC botnets and exposed databases
pub const DEFAULT_SUSPICIOUS_PORTS: &[u16] = &[4444, 31337, 6667, 5555, 12345, 1337, 8080, 1433, 3306];

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

pub struct NetworkMonitor {
    source: Arc<dyn NetworkSource>,
    cache: Arc<ThreatIntelCache>,
    suspicious_ports: HashSet<u16>,
    interval: Duration,
    state: Mutex<NetworkState>,
}

#[derive(Default)]
struct NetworkState {
    /// `protocol|local|remote|state` of every connection seen this run
    connections: HashSet<String>,
    udp_ports: HashSet<u16>,
}

impl NetworkMonitor {
    pub fn new(source: Arc<dyn NetworkSource>, cache: Arc<ThreatIntelCache>) -> Self {
        Self {
            source,
            cache,
            suspicious_ports: DEFAULT_SUSPICIOUS_PORTS.iter().copied().collect(),
            interval: DEFAULT_INTERVAL,
            state: Mutex::new(NetworkState::default()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_suspicious_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.suspicious_ports = ports.into_iter().collect();
        self
    }

    fn is_suspicious_port(&self, port: u16) -> bool {
        self.suspicious_ports.contains(&port)
    }

    fn classify_connection(&self, connection: &TcpConnection, events: &mut Vec<SecurityEvent>) {
        let details: EventDetails = vec![
            ("LocalEndpoint", connection.local.to_string()),
            ("RemoteEndpoint", connection.remote.to_string()),
            ("State", connection.state.clone()),
            ("Protocol", Protocol::Tcp.as_str().to_string()),
        ]
        .into_iter()
        .collect();

        if self.cache.is_suspicious(&connection.remote.ip()) {
            events.push(
                SecurityEvent::critical(SOURCE_NETWORK, "Connection to known malicious IP detected")
                    .with_details(details.clone()),
            );
        }

        if self.is_suspicious_port(connection.local.port()) || self.is_suspicious_port(connection.remote.port()) {
            events.push(
                SecurityEvent::critical(SOURCE_NETWORK, "Suspicious port detected in network connection")
                    .with_details(details),
            );
        }
    }

    fn classify_listener(&self, listener: &UdpListener, events: &mut Vec<SecurityEvent>) {
        if self.is_suspicious_port(listener.local.port()) {
            events.push(
                SecurityEvent::warning(SOURCE_NETWORK, "Suspicious UDP port listening detected")
                    .with_detail("Port", listener.local.port().to_string())
                    .with_detail("LocalEndpoint", listener.local.to_string())
                    .with_detail("Protocol", Protocol::Udp.as_str()),
            );
        }
    }
}

fn connection_key(connection: &TcpConnection) -> String {
    format!("{}|{}|{}|{}", Protocol::Tcp.as_str(), connection.local, connection.remote, connection.state)
}

impl PollingMonitor for NetworkMonitor {
    fn name(&self) -> &'static str {
        SOURCE_NETWORK
    }

    fn description(&self) -> &'static str {
        "Network monitoring"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn describe(&self) -> EventDetails {
        let mut details = EventDetails::new();
        details.insert("InitialThreatIPs", self.cache.len().to_string());
        details
    }

    fn tick(&self) -> Result<Vec<SecurityEvent>, MonitorError> {
        let connections = self.source.tcp_connections()?;
        let listeners = self.source.udp_listeners()?;

        let (new_connections, new_listeners) = {
            let mut state = self.state.lock();
            let new_connections: Vec<TcpConnection> = connections
                .into_iter()
                .filter(|c| state.connections.insert(connection_key(c)))
                .collect();
            let new_listeners: Vec<UdpListener> = listeners
                .into_iter()
                .filter(|l| state.udp_ports.insert(l.local.port()))
                .collect();
            (new_connections, new_listeners)
        };

        let mut events = Vec::new();
        for connection in &new_connections {
            self.classify_connection(connection, &mut events);
        }
        for listener in &new_listeners {
            self.classify_listener(listener, &mut events);
        }
        Ok(events)
    }
}
