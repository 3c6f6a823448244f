use std::io::{self, Write};

use crate::packet::{PacketRecord, TransportProtocol};
use crate::pcap_reader::Trace;

/// Which packets contribute to the timing sequence
#[derive(Debug, Clone, Copy)]
pub struct PacketFilter {
    pub protocol: TransportProtocol,
    pub port: Option<u16>,
}

impl PacketFilter {
    pub fn new(protocol: TransportProtocol, port: Option<u16>) -> Self {
        Self { protocol, port }
    }

    fn matches(&self, record: &PacketRecord) -> bool {
        if !record.has_layer(self.protocol.layer()) {
            return false;
        }
        match self.port {
            Some(port) => record.involves_port(port),
            None => true,
        }
    }
}

/// Timestamps of matching packets, preserving capture order
pub fn extract_timestamps(trace: &Trace, filter: &PacketFilter) -> Vec<f64> {
    trace
        .records()
        .iter()
        .filter(|record| filter.matches(record))
        .map(|record| record.timestamp)
        .collect()
}

/// Consecutive timestamp differences in seconds. `None` means fewer than two
/// samples, which is an expected outcome rather than an error.
pub fn compute_deltas(timestamps: &[f64]) -> Option<Vec<f64>> {
    if timestamps.len() < 2 {
        return None;
    }
    Some(timestamps.windows(2).map(|pair| pair[1] - pair[0]).collect())
}

#[derive(Debug)]
pub enum Analysis {
    Report {
        timestamps: Vec<f64>,
        deltas: Vec<f64>,
    },
    InsufficientData {
        matched: usize,
    },
}

pub fn analyze(trace: &Trace, filter: &PacketFilter) -> Analysis {
    let timestamps = extract_timestamps(trace, filter);
    match compute_deltas(&timestamps) {
        Some(deltas) => Analysis::Report { timestamps, deltas },
        None => Analysis::InsufficientData {
            matched: timestamps.len(),
        },
    }
}

/// Write the analysis outcome: one millisecond value per delta in capture
/// order, then the count of packets that matched the filter.
pub fn render_report<W: Write>(mut out: W, analysis: &Analysis) -> io::Result<()> {
    match analysis {
        Analysis::Report { timestamps, deltas } => {
            writeln!(out, "Inter-arrival timings (ms):")?;
            for delta in deltas {
                writeln!(out, "{:.2}", delta * 1000.0)?;
            }
            writeln!(out)?;
            writeln!(out, "Packets processed: {}", timestamps.len())?;
        }
        Analysis::InsufficientData { matched } => {
            writeln!(
                out,
                "Not enough matching packets for timing analysis (found {})",
                matched
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ProtocolLayer;

    fn tcp_record(timestamp: f64) -> PacketRecord {
        PacketRecord::new(
            timestamp,
            vec![ProtocolLayer::Ethernet, ProtocolLayer::Ipv4, ProtocolLayer::Tcp],
        )
        .with_ports(47000, 22)
    }

    fn udp_record(timestamp: f64) -> PacketRecord {
        PacketRecord::new(
            timestamp,
            vec![ProtocolLayer::Ethernet, ProtocolLayer::Ipv4, ProtocolLayer::Udp],
        )
        .with_ports(5353, 53)
    }

    fn tcp_filter() -> PacketFilter {
        PacketFilter::new(TransportProtocol::Tcp, None)
    }

    #[test]
    fn deltas_are_consecutive_differences_in_order() {
        let deltas = compute_deltas(&[1.0, 1.5, 1.75]).unwrap();
        assert_eq!(deltas, vec![0.5, 0.25]);
    }

    #[test]
    fn delta_count_is_one_less_than_sample_count() {
        let timestamps: Vec<f64> = (0..10).map(|i| i as f64 * 0.25).collect();
        let deltas = compute_deltas(&timestamps).unwrap();
        assert_eq!(deltas.len(), timestamps.len() - 1);
    }

    #[test]
    fn fewer_than_two_samples_is_insufficient() {
        assert!(compute_deltas(&[]).is_none());
        assert!(compute_deltas(&[4.2]).is_none());
    }

    #[test]
    fn filter_drops_other_protocols() {
        let trace = Trace::new(vec![
            tcp_record(1.0),
            udp_record(1.2),
            tcp_record(1.5),
            udp_record(1.7),
            PacketRecord::new(1.9, vec![ProtocolLayer::Ethernet]),
        ]);

        assert_eq!(extract_timestamps(&trace, &tcp_filter()), vec![1.0, 1.5]);
        assert_eq!(
            extract_timestamps(&trace, &PacketFilter::new(TransportProtocol::Udp, None)),
            vec![1.2, 1.7]
        );
    }

    #[test]
    fn filter_narrows_by_port() {
        let trace = Trace::new(vec![
            tcp_record(1.0),
            PacketRecord::new(
                2.0,
                vec![ProtocolLayer::Ethernet, ProtocolLayer::Ipv4, ProtocolLayer::Tcp],
            )
            .with_ports(51000, 443),
            tcp_record(3.0),
        ]);

        let filter = PacketFilter::new(TransportProtocol::Tcp, Some(22));
        assert_eq!(extract_timestamps(&trace, &filter), vec![1.0, 3.0]);

        let no_match = PacketFilter::new(TransportProtocol::Tcp, Some(8080));
        assert!(extract_timestamps(&trace, &no_match).is_empty());
    }

    #[test]
    fn analyze_reports_when_enough_data() {
        let trace = Trace::new(vec![tcp_record(1.0), tcp_record(1.5), tcp_record(1.75)]);

        match analyze(&trace, &tcp_filter()) {
            Analysis::Report { timestamps, deltas } => {
                assert_eq!(timestamps.len(), 3);
                assert_eq!(deltas, vec![0.5, 0.25]);
            }
            Analysis::InsufficientData { .. } => panic!("expected a report"),
        }
    }

    #[test]
    fn analyze_flags_insufficient_data() {
        let trace = Trace::new(vec![tcp_record(1.0), udp_record(1.2)]);

        match analyze(&trace, &tcp_filter()) {
            Analysis::InsufficientData { matched } => assert_eq!(matched, 1),
            Analysis::Report { .. } => panic!("expected insufficient data"),
        }
    }

    #[test]
    fn report_rescales_to_milliseconds_with_two_decimals() {
        let analysis = Analysis::Report {
            timestamps: vec![1.0, 1.01234, 1.51234],
            deltas: vec![0.01234, 0.5],
        };

        let mut out = Vec::new();
        render_report(&mut out, &analysis).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "Inter-arrival timings (ms):\n12.34\n500.00\n\nPackets processed: 3\n"
        );
    }

    #[test]
    fn insufficient_report_has_no_delta_lines() {
        let mut out = Vec::new();
        render_report(&mut out, &Analysis::InsufficientData { matched: 1 }).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("found 1"));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let trace = Trace::new(vec![tcp_record(1.0), tcp_record(1.5), tcp_record(2.5)]);

        let render = |analysis: &Analysis| {
            let mut out = Vec::new();
            render_report(&mut out, analysis).unwrap();
            String::from_utf8(out).unwrap()
        };

        let first = render(&analyze(&trace, &tcp_filter()));
        let second = render(&analyze(&trace, &tcp_filter()));
        assert_eq!(first, second);
    }
}
