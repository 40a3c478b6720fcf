#![deny(missing_docs)]
//! Thin command-line utilities for a memcached-compatible key/value server.
//!
//! `mcctl` is a generic subcommand dispatcher built on [`tool::CliTool`];
//! `sync-repl` exercises durable write operations via [`exercise::run_op`].
//! Both parse a `host[:port]` address, open one blocking connection through
//! [`client::McClient`] and forward arguments to it.

pub mod addr;
pub mod client;
pub mod exercise;
pub mod tool;

mod error;
pub use error::{McError, Result};

pub use addr::{parse_address, AddrFamily, ConnectionTarget};
pub use client::{Client, DurabilityLevel, DurabilityRequirement, McClient, MutationResult};
