//! Command line interface for the `framecast` binary.
//!
//! Shared with `build.rs`, which renders the man page from these
//! definitions; this file may only depend on `clap` and `std`.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command line arguments for the `framecast` binary.
#[derive(Debug, Parser)]
#[command(
    name = "framecast",
    version,
    about = "Send and receive media frames over UDP"
)]
pub struct Cli {
    #[command(flatten)]
    pub protocol: ProtocolArgs,
    /// Expose Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    #[command(subcommand)]
    pub command: Command,
}

/// Wire protocol selection.
#[derive(Debug, Args)]
pub struct ProtocolArgs {
    /// Carry explicit payload offsets in slave chunks.
    #[arg(long)]
    pub extended: bool,
    /// Encode multi-byte fields little-endian.
    #[arg(long)]
    pub little_endian: bool,
    /// Largest frame payload accepted, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_size: Option<usize>,
}

/// Bounds on the reassembly table.
#[derive(Debug, Args)]
pub struct ReassemblyArgs {
    /// Discard incomplete frames older than this; 0 keeps them forever.
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    pub reassembly_timeout_ms: u64,
    /// Most incomplete frames held at once; 0 removes the cap.
    #[arg(long, value_name = "COUNT", default_value_t = 64)]
    pub max_in_flight: usize,
}

/// Labels and kind stamped on outgoing frames.
#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Producing task name, at most 6 bytes.
    #[arg(long, default_value = "fcast")]
    pub task: String,
    /// Flow name, at most 6 bytes.
    #[arg(long)]
    pub flow: String,
    /// Payload kind recorded in every chunk.
    #[arg(long, value_enum, default_value_t = PayloadKind::Unspecified)]
    pub kind: PayloadKind,
    /// Files sent as one frame each.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// Payload kind of the frames being sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    Unspecified,
    Audio,
    Video,
}

/// Subcommands of the binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send each file as one frame to a fixed address.
    Send {
        /// Destination address.
        #[arg(long)]
        to: SocketAddr,
        /// Local address to send from.
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Receive and reassemble frames.
    Receive {
        /// Local address to receive on.
        #[arg(long)]
        bind: SocketAddr,
        #[command(flatten)]
        reassembly: ReassemblyArgs,
        /// Write each frame to a file in this directory.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Subscribe to a flow through this control server.
        #[arg(long, value_name = "ADDR", requires = "flow")]
        control: Option<SocketAddr>,
        /// Flow to subscribe to.
        #[arg(long)]
        flow: Option<String>,
        /// Address announced in the subscription; defaults to the bound address.
        #[arg(long, value_name = "ADDR")]
        advertise: Option<SocketAddr>,
    },
    /// Publish files repeatedly to whoever subscribes to the flow.
    Serve {
        /// Address of the control listener.
        #[arg(long, default_value = "127.0.0.1:7700")]
        control: SocketAddr,
        /// Local address to send from.
        #[arg(long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Delay between two frames.
        #[arg(long, value_name = "MS", default_value_t = 40)]
        interval_ms: u64,
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, PayloadKind};

    #[test]
    fn parses_send() {
        let cli = Cli::parse_from([
            "framecast",
            "--extended",
            "send",
            "--to",
            "127.0.0.1:5000",
            "--flow",
            "video1",
            "--kind",
            "video",
            "a.h264",
            "b.h264",
        ]);
        assert!(cli.protocol.extended);
        let Command::Send { to, source, .. } = cli.command else {
            panic!("expected send");
        };
        assert_eq!(to.port(), 5000);
        assert_eq!(source.kind, PayloadKind::Video);
        assert_eq!(source.task, "fcast");
        assert_eq!(source.files.len(), 2);
    }

    #[test]
    fn receive_defaults_to_bounded_reassembly() {
        let cli = Cli::parse_from(["framecast", "receive", "--bind", "0.0.0.0:5000"]);
        let Command::Receive { reassembly, control, .. } = cli.command else {
            panic!("expected receive");
        };
        assert_eq!(reassembly.reassembly_timeout_ms, 5_000);
        assert_eq!(reassembly.max_in_flight, 64);
        assert!(control.is_none());
    }

    #[test]
    fn control_requires_a_flow() {
        let result = Cli::try_parse_from([
            "framecast",
            "receive",
            "--bind",
            "0.0.0.0:5000",
            "--control",
            "127.0.0.1:7700",
        ]);
        assert!(result.is_err());
    }
}
