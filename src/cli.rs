//! Command-line argument parsing for the ENIP/CIP stack binary.
//!
//! Two subcommands:
//! - `serve` runs the device simulator (TCP + optional UDP discovery).
//! - `poll` runs the pipelining client against a remote device.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, Subcommand, ValueEnum,
};
use std::path::PathBuf;

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// An EtherNet/IP (ENIP) / CIP device simulator and pipelining client.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress the colorized console log; still writes the detailed file log.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write the detailed log here instead of a daily-rotating file in the
    /// current directory. Pass "stderr" to log to stderr instead of a file.
    #[arg(long, global = true)]
    pub log_file: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the device simulator.
    Serve {
        /// Path to the `.ini` configuration file (Identity/TCPIP/UCMM/Tags).
        #[arg(short, long)]
        config: PathBuf,

        /// TCP listen address for explicit messaging.
        #[arg(long, default_value = "0.0.0.0:44818")]
        listen: String,

        /// UDP listen address for List-Identity/List-Services discovery.
        /// Omit to disable the UDP listener.
        #[arg(long)]
        udp_listen: Option<String>,
    },

    /// Run the pipelining client against a remote device.
    Poll {
        /// `host:port` of the target device.
        #[arg(short, long)]
        target: String,

        /// Tag/attribute operations, e.g. "SCADA[0-9]" or "@22/1/1=(INT)7".
        #[arg(num_args = 1..)]
        operations: Vec<String>,

        /// Maximum number of requests kept outstanding at once.
        #[arg(long, default_value_t = 1)]
        depth: usize,

        /// Byte budget for Multiple Service Packet aggregation; 0 disables
        /// aggregation and sends one request per operation.
        #[arg(long, default_value_t = 0)]
        multiple_budget: usize,

        /// Repeat the operation batch on an interval instead of running once.
        #[arg(long)]
        cycle_ms: Option<u64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
