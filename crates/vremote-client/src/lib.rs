//! vremote-client: client side of the remote hypervisor-management protocol.
//!
//! Provides:
//! - The RPC call engine (serial numbering, reply validation, error replies)
//! - Connection lifecycle (open, close, closed-handle rejection)
//! - The driver entry point that turns a URI into an open connection
//! - Typed wrappers for host, domain and network procedures
//! - CLI argument parsing and command execution for the `vremote` binary

pub mod cli;
pub mod commands;
pub mod connection;
pub mod driver;
pub mod ops;
pub mod rpc;

pub use cli::{Cli, CliLogFormat, Command};
pub use commands::{execute, find_domain, state_name};
pub use connection::Connection;
pub use driver::RemoteDriver;
pub use rpc::RpcClient;
