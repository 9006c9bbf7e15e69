//! Aggregator configuration.
//!
//! Listener and scrape addresses are URIs whose scheme selects the socket
//! family, e.g. `tcp://127.0.0.1:8192`, `udp6://[::1]:8192` or
//! `unix:///run/promagg.sock`.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{ServerError, ServerResult};

/// Default address for metric writes.
pub const DEFAULT_LISTEN_ADDR: &str = "tcp://127.0.0.1:8192";

/// Default address for Prometheus scrapes.
pub const DEFAULT_SCRAPE_ADDR: &str = "tcp://127.0.0.1:8193/metrics";

/// Default HTTP path for scrapes.
pub const DEFAULT_SCRAPE_PATH: &str = "/metrics";

/// HTTP path of the declaration dump.
pub const DECLARATIONS_PATH: &str = "/declarations";

/// Default maximum line length: 64KB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default grace period for in-flight scrapes at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Transport selected by a URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// TCP over IPv4 or IPv6.
    Tcp,
    /// TCP over IPv4 only.
    Tcp4,
    /// TCP over IPv6 only.
    Tcp6,
    /// Unix stream socket.
    Unix,
    /// Unix sequenced-packet socket.
    UnixPacket,
    /// UDP over IPv4 or IPv6.
    Udp,
    /// UDP over IPv4 only.
    Udp4,
    /// UDP over IPv6 only.
    Udp6,
    /// Unix datagram socket.
    UnixGram,
}

impl Scheme {
    /// Parses a URI scheme.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tcp" => Some(Self::Tcp),
            "tcp4" => Some(Self::Tcp4),
            "tcp6" => Some(Self::Tcp6),
            "unix" => Some(Self::Unix),
            "unixpacket" => Some(Self::UnixPacket),
            "udp" => Some(Self::Udp),
            "udp4" => Some(Self::Udp4),
            "udp6" => Some(Self::Udp6),
            "unixgram" => Some(Self::UnixGram),
            _ => None,
        }
    }

    /// Returns the URI scheme name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Unix => "unix",
            Self::UnixPacket => "unixpacket",
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::UnixGram => "unixgram",
        }
    }

    /// Returns true for datagram transports.
    #[must_use]
    pub const fn is_packet(self) -> bool {
        matches!(self, Self::Udp | Self::Udp4 | Self::Udp6 | Self::UnixGram)
    }

    /// Returns true for transports addressed by a filesystem path.
    #[must_use]
    pub const fn is_unix(self) -> bool {
        matches!(self, Self::Unix | Self::UnixPacket | Self::UnixGram)
    }

    /// Returns true if a resolved socket address is usable with this scheme.
    #[must_use]
    pub const fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Tcp4 | Self::Udp4 => addr.is_ipv4(),
            Self::Tcp6 | Self::Udp6 => addr.is_ipv6(),
            _ => true,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a socket lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, resolved at bind time.
    Inet(String),
    /// Filesystem path of a unix socket.
    Unix(PathBuf),
}

/// A listener for metric writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    uri: String,
    scheme: Scheme,
    endpoint: Endpoint,
}

impl ListenAddr {
    /// Returns the URI this address was parsed from.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the transport scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the socket endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the socket path for unix transports.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Path> {
        match &self.endpoint {
            Endpoint::Unix(path) => Some(path),
            Endpoint::Inet(_) => None,
        }
    }
}

impl Default for ListenAddr {
    fn default() -> Self {
        Self {
            uri: DEFAULT_LISTEN_ADDR.to_string(),
            scheme: Scheme::Tcp,
            endpoint: Endpoint::Inet("127.0.0.1:8192".to_string()),
        }
    }
}

impl FromStr for ListenAddr {
    type Err = ServerError;

    fn from_str(uri: &str) -> ServerResult<Self> {
        let (url, scheme) = parse_uri(uri, "writes")?;
        let endpoint = if scheme.is_unix() {
            Endpoint::Unix(unix_socket_path(uri, &url)?)
        } else {
            Endpoint::Inet(host_port(uri, &url)?)
        };
        Ok(Self {
            uri: uri.to_string(),
            scheme,
            endpoint,
        })
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// The scrape listener: a stream socket plus the HTTP path to serve.
///
/// For `unix://` addresses the URI path is the socket path and the scrape
/// is served at [`DEFAULT_SCRAPE_PATH`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeAddr {
    listen: ListenAddr,
    path: String,
}

impl ScrapeAddr {
    /// Returns the socket to listen on.
    #[must_use]
    pub const fn listen(&self) -> &ListenAddr {
        &self.listen
    }

    /// Returns the HTTP path serving the scrape document.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Default for ScrapeAddr {
    fn default() -> Self {
        Self {
            listen: ListenAddr {
                uri: DEFAULT_SCRAPE_ADDR.to_string(),
                scheme: Scheme::Tcp,
                endpoint: Endpoint::Inet("127.0.0.1:8193".to_string()),
            },
            path: DEFAULT_SCRAPE_PATH.to_string(),
        }
    }
}

impl FromStr for ScrapeAddr {
    type Err = ServerError;

    fn from_str(uri: &str) -> ServerResult<Self> {
        let (url, scheme) = parse_uri(uri, "scrapes")?;
        match scheme {
            Scheme::Tcp | Scheme::Tcp4 | Scheme::Tcp6 => {
                let path = match url.path() {
                    "" => DEFAULT_SCRAPE_PATH.to_string(),
                    path => path.to_string(),
                };
                Ok(Self {
                    listen: ListenAddr {
                        uri: uri.to_string(),
                        scheme,
                        endpoint: Endpoint::Inet(host_port(uri, &url)?),
                    },
                    path,
                })
            }
            Scheme::Unix => Ok(Self {
                listen: ListenAddr {
                    uri: uri.to_string(),
                    scheme,
                    endpoint: Endpoint::Unix(unix_socket_path(uri, &url)?),
                },
                path: DEFAULT_SCRAPE_PATH.to_string(),
            }),
            other => Err(ServerError::UnsupportedScheme {
                scheme: other.as_str().to_string(),
                role: "scrapes",
            }),
        }
    }
}

impl fmt::Display for ScrapeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listen.uri)
    }
}

fn parse_uri(uri: &str, role: &'static str) -> ServerResult<(Url, Scheme)> {
    let url = Url::parse(uri).map_err(|e| invalid(uri, e.to_string()))?;
    let scheme = Scheme::from_name(url.scheme()).ok_or_else(|| ServerError::UnsupportedScheme {
        scheme: url.scheme().to_string(),
        role,
    })?;
    Ok((url, scheme))
}

fn host_port(uri: &str, url: &Url) -> ServerResult<String> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid(uri, "missing host"))?;
    let port = url.port().ok_or_else(|| invalid(uri, "missing port"))?;
    Ok(format!("{host}:{port}"))
}

// `unix:///tmp/a.sock` is absolute; `unix://a.sock` is relative to the
// working directory.
fn unix_socket_path(uri: &str, url: &Url) -> ServerResult<PathBuf> {
    let path = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
    if path.is_empty() {
        return Err(invalid(uri, "missing socket path"));
    }
    Ok(PathBuf::from(path))
}

fn invalid(uri: &str, reason: impl Into<String>) -> ServerError {
    ServerError::InvalidAddress {
        uri: uri.to_string(),
        reason: reason.into(),
    }
}

/// Configuration for the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Listeners accepting metric writes.
    pub listeners: Vec<ListenAddr>,
    /// Listener serving scrapes and HTTP writes.
    pub scrape: ScrapeAddr,
    /// JSON file of initial declarations.
    pub declfile: Option<PathBuf>,
    /// Close stream connections on the first bad line.
    pub strict: bool,
    /// Longest accepted line in bytes.
    pub max_line_length: usize,
    /// Time in-flight scrapes get to finish at shutdown.
    pub shutdown_grace: Duration,
}

impl AggregatorConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: vec![ListenAddr::default()],
            scrape: ScrapeAddr::default(),
            declfile: None,
            strict: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Replace the write listeners.
    #[must_use]
    pub fn with_listeners(mut self, listeners: Vec<ListenAddr>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Set the scrape listener.
    #[must_use]
    pub fn with_scrape(mut self, scrape: ScrapeAddr) -> Self {
        self.scrape = scrape;
        self
    }

    /// Set the declaration file.
    #[must_use]
    pub fn with_declfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.declfile = Some(path.into());
        self
    }

    /// Enable or disable strict mode.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the maximum line length.
    #[must_use]
    pub const fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Check the configuration for conflicts.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] when no listener is configured,
    /// the line limit is zero, the scrape path is unusable, or two sockets
    /// share an address.
    pub fn validate(&self) -> ServerResult<()> {
        if self.listeners.is_empty() {
            return Err(ServerError::InvalidConfig(
                "at least one write listener is required".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(ServerError::InvalidConfig(
                "max line length must be positive".to_string(),
            ));
        }

        let path = self.scrape.path();
        if !path.starts_with('/') {
            return Err(ServerError::InvalidConfig(format!(
                "scrape path {path} must start with '/'"
            )));
        }
        if path.contains(['{', '}']) || path.split('/').any(|seg| seg.starts_with([':', '*'])) {
            return Err(ServerError::InvalidConfig(format!(
                "scrape path {path} must be a literal path"
            )));
        }
        if path == DECLARATIONS_PATH {
            return Err(ServerError::InvalidConfig(format!(
                "scrape path {path} is reserved"
            )));
        }

        let mut endpoints = vec![self.scrape.listen().endpoint()];
        for listener in &self.listeners {
            // TCP and UDP may share a port; unix paths may not be reused.
            let clash = endpoints.iter().any(|e| match (e, listener.endpoint()) {
                (Endpoint::Unix(a), Endpoint::Unix(b)) => a == b,
                _ => false,
            });
            if clash || self.listeners.iter().filter(|l| *l == listener).count() > 1 {
                return Err(ServerError::InvalidConfig(format!(
                    "address {listener} is used more than once"
                )));
            }
            endpoints.push(listener.endpoint());
        }
        Ok(())
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
