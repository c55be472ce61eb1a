// src/core/socket.rs

//! Socket addresses as they appear in deployment settings.
//!
//! Accepted forms:
//! - `/path/to/unix.sock` or `<any scheme>:///path/to/unix.sock`
//! - `127.0.0.1:1234`, `tcp://127.0.0.1:1234` or `udp://127.0.0.1:1234`

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Template used by [`format_socket`] when none is given.
pub const DEFAULT_TEMPLATE: &str = "{scheme}://{location}";

/// Why a socket address could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// An IP address followed by a path.
    #[error("Unrecognised format: \"{0}\" - IP address with path")]
    AddressWithPath(String),
    /// An IP address without a port.
    #[error("Unrecognised format: \"{0}\" - IP address with no port")]
    MissingPort(String),
    /// Nothing usable left after the scheme.
    #[error("Unrecognised format: \"{0}\" - Neither IP nor path")]
    Empty(String),
}

/// Address family of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `host:port`
    Inet,
    /// Filesystem path.
    Unix,
}

/// Transport named by the scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    /// `tcp://`
    Tcp,
    /// `udp://`
    Udp,
}

impl SocketType {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }

    /// Scheme name, e.g. `tcp`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// A parsed socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    /// `host:port` or a filesystem path.
    pub location: String,
    /// Inet or unix.
    pub protocol: Protocol,
    /// Transport, when the scheme names one.
    pub socket_type: Option<SocketType>,
}

impl Socket {
    /// `(host, port)` of an inet socket. Unix sockets have neither.
    pub fn split_location(&self) -> Option<(&str, &str)> {
        match self.protocol {
            Protocol::Unix => {
                log::warn!("Unix sockets ({}) can not be split into host and port", self.location);
                None
            }
            Protocol::Inet => Some(
                self.location
                    .split_once(':')
                    .unwrap_or((self.location.as_str(), "")),
            ),
        }
    }

    /// Host part of an inet socket.
    pub fn host(&self) -> Option<&str> {
        self.split_location().map(|(host, _)| host)
    }

    /// Port part of an inet socket.
    pub fn port(&self) -> Option<&str> {
        self.split_location().map(|(_, port)| port)
    }
}

impl FromStr for Socket {
    type Err = SocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (Some(scheme), rest),
            None => (None, s),
        };

        // `scheme:///path` and bare paths name a unix socket.
        if rest.starts_with('/') {
            return Ok(Self {
                location: rest.to_string(),
                protocol: Protocol::Unix,
                socket_type: None,
            });
        }
        if rest.is_empty() {
            return Err(SocketError::Empty(s.to_string()));
        }

        let (netloc, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        if !path.is_empty() {
            return Err(SocketError::AddressWithPath(s.to_string()));
        }
        match netloc.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(SocketError::MissingPort(s.to_string())),
        }

        Ok(Self {
            location: netloc.to_string(),
            protocol: Protocol::Inet,
            socket_type: scheme.and_then(SocketType::from_scheme),
        })
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.protocol, self.socket_type) {
            (Protocol::Unix, _) => write!(f, "unix://{}", self.location),
            (Protocol::Inet, Some(kind)) => write!(f, "{}://{}", kind.name(), self.location),
            (Protocol::Inet, None) => write!(f, "{}", self.location),
        }
    }
}

/// Renders `socket` through a `{scheme}`/`{location}` template.
///
/// Unix sockets use `unix_template` when given, and the `unix_scheme`
/// default (or `unix`) as scheme. Inet sockets without a type take the
/// `scheme` default. Other defaults fill any remaining placeholders.
pub fn format_socket(
    socket: &Socket,
    template: &str,
    unix_template: Option<&str>,
    defaults: &HashMap<String, String>,
) -> String {
    let scheme = match socket.protocol {
        Protocol::Inet => socket
            .socket_type
            .map(|t| t.name().to_string())
            .or_else(|| defaults.get("scheme").cloned())
            .unwrap_or_default(),
        Protocol::Unix => defaults
            .get("unix_scheme")
            .cloned()
            .unwrap_or_else(|| "unix".to_string()),
    };

    let template = match (socket.protocol, unix_template) {
        (Protocol::Unix, Some(unix)) => unix,
        _ => template,
    };

    let mut out = template
        .replace("{scheme}", &scheme)
        .replace("{location}", &socket.location);
    for (key, value) in defaults {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}
