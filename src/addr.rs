//! Parsing of `host[:port]` address strings.

use crate::{McError, Result};

/// Data port used when the address string carries no explicit port.
pub const DEFAULT_PORT: u16 = 11210;

/// Network protocol family inferred from the address syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    /// No preference, let resolution decide.
    Unspec,
    /// IPv4 only.
    Inet,
    /// IPv6 only, forced by `[host]` bracket syntax.
    Inet6,
}

/// Where to connect: derived once from the CLI address string,
/// immutable after parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Host name or literal address, without brackets.
    pub host: String,
    /// Data port, `DEFAULT_PORT` when omitted.
    pub port: u16,
    /// Address family inferred from the syntax.
    pub family: AddrFamily,
}

/// Parse a host string with optional port number into a
/// (host, port, family) triple.
///
/// `[host]` and `[host]:port` force IPv6; `host` and `host:port` leave the
/// family unspecified. The port defaults to 11210 when omitted.
pub fn parse_address(addr: &str) -> Result<ConnectionTarget> {
    let invalid = || McError::AddressFormat(addr.to_string());

    let (host, rest, family) = if let Some(bracketed) = addr.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
        // Only `[host]` and `[host]:port` are valid, nothing may trail the
        // bracket except a port suffix.
        let rest = match rest {
            "" => None,
            trailing => Some(trailing.strip_prefix(':').ok_or_else(invalid)?),
        };
        (host, rest, AddrFamily::Inet6)
    } else {
        match addr.split_once(':') {
            Some((host, port)) => (host, Some(port), AddrFamily::Unspec),
            None => (addr, None, AddrFamily::Unspec),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }

    let port = match rest {
        Some(port) => parse_port(port).ok_or_else(invalid)?,
        None => DEFAULT_PORT,
    };

    Ok(ConnectionTarget {
        host: host.to_string(),
        port,
        family,
    })
}

fn parse_port(s: &str) -> Option<u16> {
    // Strictly digits: reject signs, whitespace and port 0.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|&p| p > 0)
}
