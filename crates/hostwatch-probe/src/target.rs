//! Probe targets: `host[:port]` parsing.

use std::fmt;

use crate::error::TargetError;

/// Port used when a target does not name one.
pub const DEFAULT_PORT: u16 = 443;

/// A host and port to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    /// Hostname or IP literal, without brackets.
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TargetError::EmptyHost);
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| TargetError::UnterminatedIpv6(input.to_string()))?;
            let port = match after {
                "" => DEFAULT_PORT,
                _ => after
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(|| TargetError::InvalidPort(input.to_string()))?,
            };
            return Self::checked(host, port);
        }

        match input.matches(':').count() {
            0 => Self::checked(input, DEFAULT_PORT),
            1 => {
                let (host, port) = input.split_once(':').unwrap_or((input, ""));
                let port = port
                    .parse()
                    .map_err(|_| TargetError::InvalidPort(input.to_string()))?;
                Self::checked(host, port)
            }
            // Bare IPv6 literal.
            _ => Self::checked(input, DEFAULT_PORT),
        }
    }

    fn checked(host: &str, port: u16) -> Result<Self, TargetError> {
        if host.is_empty() {
            return Err(TargetError::EmptyHost);
        }
        Ok(Self::new(host, port))
    }

    fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// Value for the HTTP `Host` header; the port is omitted when it is 443.
    pub fn host_header(&self) -> String {
        let host = if self.is_ipv6() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == DEFAULT_PORT {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
