use clap::ValueEnum;
use std::fmt;

/// One captured packet reduced to the fields the analyzer needs
#[derive(Debug, Clone)]
pub struct PacketRecord {
    pub timestamp: f64,          // Seconds since the capture epoch
    pub layers: Vec<ProtocolLayer>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
}

impl PacketRecord {
    pub fn new(timestamp: f64, layers: Vec<ProtocolLayer>) -> Self {
        Self {
            timestamp,
            layers,
            source_port: None,
            dest_port: None,
        }
    }

    pub fn with_ports(mut self, source_port: u16, dest_port: u16) -> Self {
        self.source_port = Some(source_port);
        self.dest_port = Some(dest_port);
        self
    }

    pub fn has_layer(&self, layer: ProtocolLayer) -> bool {
        self.layers.contains(&layer)
    }

    /// True when either transport port matches
    pub fn involves_port(&self, port: u16) -> bool {
        self.source_port == Some(port) || self.dest_port == Some(port)
    }
}

/// Protocol headers recognized while walking a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolLayer {
    Ethernet,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
}

/// Transport-layer filter selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub fn layer(self) -> ProtocolLayer {
        match self {
            TransportProtocol::Tcp => ProtocolLayer::Tcp,
            TransportProtocol::Udp => ProtocolLayer::Udp,
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
        })
    }
}
