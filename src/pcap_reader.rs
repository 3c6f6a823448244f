use anyhow::{Context, Result};
use pcap::{Capture, Error as PcapError};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::packet::{PacketRecord, ProtocolLayer};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Capture file not found: {0}")]
    NotFound(String),
}

/// An immutable capture, in original capture order
#[derive(Debug)]
pub struct Trace {
    records: Vec<PacketRecord>,
}

#[derive(Debug)]
pub struct TraceSummary {
    pub total_packets: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub duration_seconds: f64,
    pub calculated_rate: u64,
    pub ports: Vec<u16>,
}

impl Trace {
    pub fn new(records: Vec<PacketRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Single pass over the records: transport counts, capture duration,
    /// average packet rate, and the destination ports seen
    pub fn summary(&self) -> TraceSummary {
        let mut ports = HashSet::new();
        let mut tcp_packets = 0u64;
        let mut udp_packets = 0u64;
        let mut first_timestamp: Option<f64> = None;
        let mut last_timestamp: Option<f64> = None;

        for record in &self.records {
            if first_timestamp.is_none() {
                first_timestamp = Some(record.timestamp);
            }
            last_timestamp = Some(record.timestamp);

            if record.has_layer(ProtocolLayer::Tcp) {
                tcp_packets += 1;
            } else if record.has_layer(ProtocolLayer::Udp) {
                udp_packets += 1;
            } else {
                continue;
            }

            if let Some(port) = record.dest_port {
                ports.insert(port);
            }
        }

        let duration_seconds =
            if let (Some(first), Some(last)) = (first_timestamp, last_timestamp) {
                (last - first).max(0.001) // Minimum 1ms to avoid division by zero
            } else {
                1.0
            };

        let transport_packets = tcp_packets + udp_packets;
        let calculated_rate = if transport_packets > 0 {
            (transport_packets as f64 / duration_seconds).round() as u64
        } else {
            0
        };

        let mut sorted_ports: Vec<u16> = ports.into_iter().collect();
        sorted_ports.sort();

        TraceSummary {
            total_packets: self.records.len() as u64,
            tcp_packets,
            udp_packets,
            duration_seconds,
            calculated_rate,
            ports: sorted_ports,
        }
    }
}

/// Load a capture file into memory as an ordered sequence of packet records.
///
/// The path must exist; a missing file is the one failure reported as a typed
/// error. Anything else libpcap raises while opening propagates with context.
pub fn load_trace(path: &str) -> Result<Trace> {
    info!("Loading capture file: {}", path);

    if !Path::new(path).exists() {
        return Err(TraceError::NotFound(path.to_string()).into());
    }

    let mut capture = Capture::from_file(Path::new(path))
        .with_context(|| format!("Failed to open capture file: {}", path))?;

    let mut records = Vec::new();
    loop {
        let packet = match capture.next_packet() {
            Ok(packet) => packet,
            Err(PcapError::NoMorePackets) => break,
            Err(e) => {
                warn!("Error reading packet #{}: {}", records.len() + 1, e);
                continue;
            }
        };

        records.push(parse_record(&packet));
    }

    debug!("Loaded {} packets from {}", records.len(), path);
    Ok(Trace::new(records))
}

/// Walk the frame headers and tag every layer that parses. Truncated or
/// unknown frames keep their timestamp with whatever layers were recognized.
fn parse_record(packet: &pcap::Packet) -> PacketRecord {
    let timestamp =
        packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1_000_000.0;
    let mut layers = Vec::new();

    // Parse Ethernet frame
    let ethernet = match EthernetPacket::new(packet.data) {
        Some(eth) => eth,
        None => {
            debug!("Failed to parse Ethernet frame");
            return PacketRecord::new(timestamp, layers);
        }
    };
    layers.push(ProtocolLayer::Ethernet);

    let transport = match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ipv4 = match Ipv4Packet::new(ethernet.payload()) {
                Some(ip) => ip,
                None => {
                    debug!("Failed to parse IPv4 packet");
                    return PacketRecord::new(timestamp, layers);
                }
            };
            layers.push(ProtocolLayer::Ipv4);
            parse_transport(ipv4.get_next_level_protocol(), ipv4.payload())
        }
        EtherTypes::Ipv6 => {
            let ipv6 = match Ipv6Packet::new(ethernet.payload()) {
                Some(ip) => ip,
                None => {
                    debug!("Failed to parse IPv6 packet");
                    return PacketRecord::new(timestamp, layers);
                }
            };
            layers.push(ProtocolLayer::Ipv6);
            parse_transport(ipv6.get_next_header(), ipv6.payload())
        }
        _ => None,
    };

    match transport {
        Some((layer, source_port, dest_port)) => {
            layers.push(layer);
            PacketRecord::new(timestamp, layers).with_ports(source_port, dest_port)
        }
        None => PacketRecord::new(timestamp, layers),
    }
}

fn parse_transport(
    protocol: IpNextHeaderProtocol,
    payload: &[u8],
) -> Option<(ProtocolLayer, u16, u16)> {
    if protocol == IpNextHeaderProtocols::Tcp {
        let tcp = TcpPacket::new(payload)?;
        Some((ProtocolLayer::Tcp, tcp.get_source(), tcp.get_destination()))
    } else if protocol == IpNextHeaderProtocols::Udp {
        let udp = UdpPacket::new(payload)?;
        Some((ProtocolLayer::Udp, udp.get_source(), udp.get_destination()))
    } else {
        None
    }
}
