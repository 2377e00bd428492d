use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::EisenbahnError;

/// Directory holding IPC sockets created from a bare name.
pub const IPC_DIR: &str = "/tmp/fusionguard";

/// Transport layer for ZeroMQ connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Unix domain socket at the given path. Fastest option on one host.
    Ipc(PathBuf),

    /// TCP transport for distributed deployment.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// IPC socket named `name` under [`IPC_DIR`].
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(Path::new(IPC_DIR).join(format!("{name}.sock")))
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Generate the ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{}", path.display()),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// For IPC transports, ensure the parent directory exists.
    ///
    /// ZeroMQ requires the directory to exist before binding an IPC socket.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(path) = self {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Remove a stale IPC socket file left over from a previous run.
    ///
    /// An IPC socket file outlives a crashed process and makes the next bind
    /// fail with `EADDRINUSE`. No-op for TCP or when the file is absent.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        if let Self::Ipc(path) = self {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed stale IPC socket");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl FromStr for Transport {
    type Err = EisenbahnError;

    /// Parse `ipc:///path/to.sock` or `tcp://host:port`.
    fn from_str(endpoint: &str) -> Result<Self, Self::Err> {
        let invalid = || EisenbahnError::InvalidEndpoint(endpoint.to_string());

        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::Ipc(PathBuf::from(path)));
        }

        let addr = endpoint.strip_prefix("tcp://").ok_or_else(invalid)?;
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self::tcp(host, port))
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_endpoint() {
        let t = Transport::ipc("features");
        assert_eq!(t.endpoint(), "ipc:///tmp/fusionguard/features.sock");
    }

    #[test]
    fn tcp_endpoint() {
        let t = Transport::tcp("127.0.0.1", 5555);
        assert_eq!(t.endpoint(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn display_matches_endpoint() {
        let t = Transport::tcp("localhost", 9090);
        assert_eq!(t.to_string(), t.endpoint());
    }

    #[test]
    fn parses_configured_endpoints() {
        let t: Transport = "ipc:///tmp/fusionguard/telemetry-raw.sock".parse().unwrap();
        assert_eq!(t, Transport::ipc("telemetry-raw"));
        assert_eq!(t.endpoint(), "ipc:///tmp/fusionguard/telemetry-raw.sock");

        let t: Transport = "ipc:///var/run/fg/risk.sock".parse().unwrap();
        assert_eq!(t, Transport::Ipc(PathBuf::from("/var/run/fg/risk.sock")));

        let t: Transport = "tcp://10.0.0.5:7001".parse().unwrap();
        assert_eq!(t, Transport::tcp("10.0.0.5", 7001));
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in ["", "udp://x:1", "tcp://host", "tcp://host:port", "tcp://:80", "ipc://"] {
            assert!(
                matches!(bad.parse::<Transport>(), Err(EisenbahnError::InvalidEndpoint(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn ipc_dir_and_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/stage.sock");
        let t = Transport::Ipc(path.clone());

        t.ensure_ipc_dir().unwrap();
        assert!(path.parent().unwrap().is_dir());

        std::fs::write(&path, b"").unwrap();
        t.remove_stale_socket().unwrap();
        assert!(!path.exists());
        // Second removal is a no-op.
        t.remove_stale_socket().unwrap();
    }
}
