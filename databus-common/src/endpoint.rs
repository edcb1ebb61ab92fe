//! Strict endpoint grammar.
//!
//! ```text
//! endpoint = scheme "://" host ":" port [ "/" path ]
//! scheme   = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
//! host     = label *( "." label ) / "[" ipv6 "]"
//! port     = 1*5DIGIT            ; 1..=65535, mandatory
//! path     = segment *( "/" segment )
//! ```
//!
//! Userinfo, query strings and fragments are rejected. Empty path segments
//! are skipped, so `mqtt://host:1883/` and `mqtt://host:1883` are equivalent.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A parsed transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
    path: Vec<String>,
}

impl Endpoint {
    /// Parse an endpoint string, failing closed on anything outside the grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let fail = |reason: &str| Error::bad_endpoint(input, reason);

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| fail("expected '<scheme>://'"))?;
        validate_scheme(scheme).map_err(|r| fail(r))?;

        if rest.contains(['?', '#']) {
            return Err(fail("query strings and fragments are not supported"));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        if authority.contains('@') {
            return Err(fail("credentials in the endpoint are not supported"));
        }

        let (host, port) = split_host_port(authority).map_err(|r| fail(r))?;

        let path = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
                    Err(fail("path segments must not contain whitespace"))
                } else {
                    Ok(s.to_string())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host,
            port,
            path,
        })
    }

    /// Lowercased scheme, e.g. `mqtt`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or address. IPv6 literals are returned without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Non-empty path segments.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Path segments joined with `/`; empty when the endpoint has no path.
    pub fn namespace(&self) -> String {
        self.path.join("/")
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/", self.scheme, self.authority())?;
        if !self.path.is_empty() {
            write!(f, "{}/", self.namespace())?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_scheme(scheme: &str) -> std::result::Result<(), &'static str> {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        Some(_) => return Err("scheme must start with a letter"),
        None => return Err("scheme must not be empty"),
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Ok(())
    } else {
        Err("scheme contains invalid characters")
    }
}

fn split_host_port(authority: &str) -> std::result::Result<(String, u16), &'static str> {
    if authority.is_empty() {
        return Err("missing host");
    }

    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (literal, after) = rest.split_once(']').ok_or("unterminated IPv6 literal")?;
        literal
            .parse::<Ipv6Addr>()
            .map_err(|_| "invalid IPv6 literal")?;
        let port = after.strip_prefix(':').ok_or("missing port")?;
        (literal.to_string(), port)
    } else {
        let (host, port) = authority.rsplit_once(':').ok_or("missing port")?;
        validate_host(host)?;
        (host.to_ascii_lowercase(), port)
    };

    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err("port must be a decimal number");
    }
    let port: u16 = port.parse().map_err(|_| "port out of range")?;
    if port == 0 {
        return Err("port must not be zero");
    }

    Ok((host, port))
}

fn validate_host(host: &str) -> std::result::Result<(), &'static str> {
    if host.is_empty() {
        return Err("missing host");
    }
    if host.len() > 253 {
        return Err("host name too long");
    }
    for label in host.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err("invalid host label");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("host labels must not start or end with '-'");
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err("host contains invalid characters");
        }
    }
    Ok(())
}
