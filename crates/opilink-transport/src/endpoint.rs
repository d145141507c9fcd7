use std::fmt;

/// Where to dial (client topology) or listen (server topology).
///
/// OPI terminals conventionally use two sockets: the primary one carries
/// POS requests, the secondary one terminal-initiated device requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEndpoint {
    pub host: String,
    pub primary_port: u16,
    pub secondary_port: Option<u16>,
}

impl TerminalEndpoint {
    pub fn new(host: impl Into<String>, primary_port: u16) -> Self {
        Self {
            host: host.into(),
            primary_port,
            secondary_port: None,
        }
    }

    pub fn with_secondary_port(mut self, port: u16) -> Self {
        self.secondary_port = Some(port);
        self
    }

    /// Every configured port, primary first.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports = vec![self.primary_port];
        if let Some(secondary) = self.secondary_port {
            if secondary != self.primary_port {
                ports.push(secondary);
            }
        }
        ports
    }

    /// `host:port` with IPv6 literals bracketed.
    pub fn authority(&self, port: u16) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{port}", self.host)
        } else {
            format!("{}:{port}", self.host)
        }
    }

    /// URL dialed by the client topology.
    pub fn websocket_url(&self) -> String {
        format!("ws://{}", self.authority(self.primary_port))
    }
}

impl fmt::Display for TerminalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.secondary_port {
            Some(secondary) => write!(f, "{}+{secondary}", self.authority(self.primary_port)),
            None => f.write_str(&self.authority(self.primary_port)),
        }
    }
}
