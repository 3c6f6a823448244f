use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use tracing::{info, warn};

mod packet;
mod pcap_reader;
mod timing;

use packet::TransportProtocol;
use timing::PacketFilter;

#[derive(Parser, Debug)]
#[command(name = "trace-timing")]
#[command(about = "Inter-arrival timing analysis for recorded packet captures")]
#[command(version = "1.0.0")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print inter-arrival timings for packets matching a transport filter
    Analyze {
        /// Path to the capture file
        #[arg(short, long)]
        file: String,

        /// Transport protocol to match
        #[arg(short, long, value_enum, default_value_t = TransportProtocol::Tcp)]
        protocol: TransportProtocol,

        /// Only match packets with this source or destination port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Summarize the contents of a capture file
    Info {
        /// Path to the capture file
        #[arg(short, long)]
        file: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging with smart defaults
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Analyze { file, protocol, port } => {
            info!("Starting timing analysis");
            info!("Protocol filter: {}", protocol);
            if let Some(port) = port {
                info!("Port filter: {}", port);
            }

            let trace = pcap_reader::load_trace(&file)?;
            info!("Loaded {} packets", trace.len());

            let filter = PacketFilter::new(protocol, port);
            let analysis = timing::analyze(&trace, &filter);

            timing::render_report(io::stdout().lock(), &analysis)?;
        }
        Commands::Info { file } => {
            let trace = pcap_reader::load_trace(&file)?;
            if trace.is_empty() {
                warn!("Capture file contains no packets");
            }
            let summary = trace.summary();

            info!("Capture summary:");
            info!("  Total packets: {}", summary.total_packets);
            info!("  TCP packets: {}", summary.tcp_packets);
            info!("  UDP packets: {}", summary.udp_packets);
            info!("  Duration: {:.3} seconds", summary.duration_seconds);
            info!("  Average rate: {} packets/second", summary.calculated_rate);
            info!(
                "  Detected {} unique ports: {:?}",
                summary.ports.len(),
                summary.ports
            );

            if summary.ports.is_empty() {
                warn!("No transport packets with ports found in capture");
            }
        }
    }

    Ok(())
}
