use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Where the local relay listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEndpoint {
    Unix(PathBuf),
    /// `host:port`, normally loopback.
    Tcp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid relay endpoint {0:?}: expected unix:/path, /path, or host:port")]
pub struct InvalidRelayEndpoint(pub String);

impl FromStr for RelayEndpoint {
    type Err = InvalidRelayEndpoint;

    /// Accepts `unix:/path/to.sock`, a bare absolute path, `tcp:host:port`,
    /// or `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || InvalidRelayEndpoint(s.to_owned());

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }

        let addr = s.strip_prefix("tcp:").unwrap_or(s);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Self::Tcp(addr.to_owned()))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => f.write_str(addr),
        }
    }
}
