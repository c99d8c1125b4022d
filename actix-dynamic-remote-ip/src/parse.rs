//! Parsers for fetched range lists and connection peer addresses.

use std::net::{AddrParseError, IpAddr};

use derive_more::{Display, Error};
use ipnetwork::{IpNetwork, IpNetworkError};

/// A non-blank line of a range list body that is not a CIDR literal.
#[derive(Debug, Display, Error)]
#[display("malformed IP range {line:?}: {source}")]
pub struct MalformedRange {
    line: String,
    source: IpNetworkError,
}

impl MalformedRange {
    /// Returns the offending line, trimmed.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// A peer address that does not contain a valid IPv4 or IPv6 literal.
#[derive(Debug, Display, Error)]
#[display("invalid peer address {addr:?}: {source}")]
pub struct InvalidAddress {
    addr: String,
    source: AddrParseError,
}

impl InvalidAddress {
    /// Returns the raw peer address that failed to parse.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

/// Parses a line-delimited list of CIDR prefixes.
///
/// Blank lines are skipped. Each other line must be an address followed by an explicit prefix
/// length; parsing stops at the first line that isn't.
///
/// # Examples
/// ```
/// use actix_dynamic_remote_ip::parse_prefix_list;
///
/// let ranges = parse_prefix_list("173.245.48.0/20\n\n2400:cb00::/32\n").unwrap();
/// assert_eq!(ranges.len(), 2);
///
/// assert!(parse_prefix_list("173.245.48.0/20\n<html>\n").is_err());
/// ```
pub fn parse_prefix_list(body: &str) -> Result<Vec<IpNetwork>, MalformedRange> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_prefix)
        .collect()
}

fn parse_prefix(line: &str) -> Result<IpNetwork, MalformedRange> {
    let malformed = |source| MalformedRange {
        line: line.to_owned(),
        source,
    };

    // ipnetwork reads a bare address as a host route and `/255.0.0.0` as a netmask; a range list
    // entry must give its length as a decimal prefix
    let Some((_, prefix_len)) = line.split_once('/') else {
        return Err(malformed(IpNetworkError::InvalidCidrFormat(
            "missing prefix length".to_owned(),
        )));
    };

    if prefix_len.is_empty() || !prefix_len.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(IpNetworkError::InvalidCidrFormat(format!(
            "prefix length {prefix_len:?} is not a number"
        ))));
    }

    line.parse().map_err(malformed)
}

/// Parses a connection's peer address into a bare IP address.
///
/// Accepts `host:port`, `[host]:port` and bare hosts. Any zone (scope) suffix after a `%` is
/// discarded.
///
/// # Examples
/// ```
/// use std::net::IpAddr;
///
/// use actix_dynamic_remote_ip::parse_peer_address;
///
/// let ip = parse_peer_address("[2001:db8::1%eth0]:443").unwrap();
/// assert_eq!(ip, "2001:db8::1".parse::<IpAddr>().unwrap());
/// ```
pub fn parse_peer_address(raw: &str) -> Result<IpAddr, InvalidAddress> {
    let host = split_host_port(raw).unwrap_or(raw);

    let host = match host.split_once('%') {
        Some((addr, _zone)) => addr,
        None => host,
    };

    host.parse().map_err(|source| InvalidAddress {
        addr: raw.to_owned(),
        source,
    })
}

/// Returns the host part of `host:port` or `[host]:port`, or `None` if there is no port
/// separator.
///
/// The port itself may be empty. Unbracketed input with more than one colon (a bare IPv6 address)
/// has no port.
fn split_host_port(raw: &str) -> Option<&str> {
    if let Some(rest) = raw.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        after.strip_prefix(':')?;
        return Some(host);
    }

    let (host, _port) = raw.rsplit_once(':')?;

    if host.contains(':') {
        return None;
    }

    Some(host)
}
