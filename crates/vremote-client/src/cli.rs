//! Command-line interface for the `vremote` binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use vremote_core::protocol::OpenFlags;
use vremote_core::transport::TlsPaths;

/// Log output format (CLI wrapper).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for vremote_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => vremote_core::LogFormat::Text,
            CliLogFormat::Json => vremote_core::LogFormat::Json,
        }
    }
}

/// Query and control a remote hypervisor-management daemon.
#[derive(Debug, Parser)]
#[command(name = "vremote", version, about)]
pub struct Cli {
    /// Connection URI, e.g. qemu+ssh://root@host/system
    #[arg(short = 'c', long = "connect", value_name = "URI")]
    pub connect: String,

    /// Open a read-only connection
    #[arg(short = 'r', long = "readonly")]
    pub readonly: bool,

    /// CA certificate used to verify the server
    #[arg(long = "ca-cert", value_name = "FILE")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate presented to the server
    #[arg(long = "client-cert", value_name = "FILE")]
    pub client_cert: Option<PathBuf>,

    /// Private key of the client certificate
    #[arg(long = "client-key", value_name = "FILE")]
    pub client_key: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,

    /// Print results as JSON
    #[arg(long = "json")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the hypervisor type
    Type,
    /// Print the hypervisor version
    Version,
    /// Print host hardware information
    Nodeinfo,
    /// Print the capabilities XML
    Capabilities,
    /// Print the maximum number of virtual CPUs per guest
    MaxVcpus {
        /// Hypervisor type to query
        #[arg(long = "type")]
        ty: Option<String>,
    },
    /// List domains
    List {
        /// Include defined but inactive domains
        #[arg(long)]
        all: bool,
    },
    /// Print run state and resource usage of a domain
    Dominfo { domain: String },
    /// Print the XML definition of a domain
    Dumpxml { domain: String },
    /// Suspend a running domain
    Suspend { domain: String },
    /// Resume a suspended domain
    Resume { domain: String },
    /// Gracefully shut down a domain
    Shutdown { domain: String },
    /// Reboot a domain
    Reboot { domain: String },
    /// Forcefully stop a domain
    Destroy { domain: String },
    /// List active networks
    NetList,
    /// Print the XML definition of a network
    NetDumpxml { network: String },
    /// Print the bridge device of a network
    NetBridge { network: String },
}

impl Cli {
    pub fn open_flags(&self) -> OpenFlags {
        OpenFlags {
            read_only: self.readonly,
        }
    }

    /// Default credential locations with any command-line overrides applied.
    pub fn tls_paths(&self) -> TlsPaths {
        let mut paths = TlsPaths::default();
        if let Some(path) = &self.ca_cert {
            paths = paths.with_ca_cert(path.clone());
        }
        if let Some(path) = &self.client_cert {
            paths = paths.with_client_cert(path.clone());
        }
        if let Some(path) = &self.client_key {
            paths = paths.with_client_key(path.clone());
        }
        paths
    }
}
