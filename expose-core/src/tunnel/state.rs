//! Service record and status types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local TCP port in the range 1-65535
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

/// Rejected port value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid port '{0}': expected a number between 1 and 65535")]
pub struct InvalidPort(pub String);

impl Port {
    pub fn new(value: u16) -> Result<Self, InvalidPort> {
        if value == 0 {
            return Err(InvalidPort(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Port {
    type Error = InvalidPort;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl FromStr for Port {
    type Err = InvalidPort;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u16 = s.trim().parse().map_err(|_| InvalidPort(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an exposed port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Started,
    Stopped,
    /// Only ever reported for a delete that just happened; never persisted.
    Deleted,
}

impl ServiceStatus {
    /// Sort priority used by `list`
    pub fn priority(self) -> u8 {
        match self {
            Self::Started => 0,
            Self::Stopped => 1,
            Self::Deleted => 2,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "Started"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Scheme of the local origin the runner forwards to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalProtocol {
    #[default]
    Http,
    Https,
    Tcp,
    Ssh,
    Rdp,
}

impl LocalProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Tcp => "tcp",
            Self::Ssh => "ssh",
            Self::Rdp => "rdp",
        }
    }

    /// Origin URL for a local port, e.g. `http://localhost:8080`
    pub fn origin_url(&self, port: Port) -> String {
        format!("{}://localhost:{}", self.as_str(), port)
    }
}

impl FromStr for LocalProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "tcp" => Ok(Self::Tcp),
            "ssh" => Ok(Self::Ssh),
            "rdp" => Ok(Self::Rdp),
            other => Err(format!(
                "unsupported protocol '{other}' (expected http, https, tcp, ssh or rdp)"
            )),
        }
    }
}

impl fmt::Display for LocalProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentialed tunnel identity issued by cloudflared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHandle {
    /// Canonical tunnel name (`<host>-<port>`)
    pub name: String,
    /// Tunnel UUID, taken from the credentials file name
    pub id: String,
    /// Credentials JSON written by `tunnel create`
    pub credentials_path: PathBuf,
}

/// Persisted lifecycle state of one exposed port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub port: Port,
    pub status: ServiceStatus,
    pub identity: IdentityHandle,
    /// Hostname of the current generation; stale while stopped
    #[serde(default)]
    pub public_hostname: Option<String>,
    /// Hostnames of earlier generations whose DNS routes still exist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired_hostnames: Vec<String>,
    #[serde(default)]
    pub runner_config: Option<PathBuf>,
    #[serde(default)]
    pub protocol: LocalProtocol,
    #[serde(default)]
    pub service_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRecord {
    /// A record for an identity that has not been started yet
    pub fn new(port: Port, identity: IdentityHandle, protocol: LocalProtocol) -> Self {
        let now = Utc::now();
        Self {
            port,
            status: ServiceStatus::Stopped,
            identity,
            public_hostname: None,
            retired_hostnames: Vec::new(),
            runner_config: None,
            protocol,
            service_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tunnel_name(&self) -> &str {
        &self.identity.name
    }

    pub fn is_started(&self) -> bool {
        self.status == ServiceStatus::Started
    }

    /// Address clients use to reach the port. Web origins are served over
    /// https by the edge; other protocols need a client-side connector.
    pub fn public_url(&self) -> Option<String> {
        let hostname = self.public_hostname.as_deref()?;
        Some(match self.protocol {
            LocalProtocol::Http | LocalProtocol::Https => format!("https://{hostname}"),
            LocalProtocol::Tcp | LocalProtocol::Ssh | LocalProtocol::Rdp => hostname.to_string(),
        })
    }

    /// Every hostname that may still have a DNS route, current first
    pub fn routed_hostnames(&self) -> impl Iterator<Item = &str> {
        self.public_hostname
            .iter()
            .chain(self.retired_hostnames.iter())
            .map(String::as_str)
    }

    /// Switch to a new generation. Returns the previous runner config, if any.
    pub fn begin_generation(
        &mut self,
        hostname: String,
        runner_config: PathBuf,
        protocol: LocalProtocol,
    ) -> Option<PathBuf> {
        if let Some(previous) = self.public_hostname.take()
            && previous != hostname
            && !self.retired_hostnames.contains(&previous)
        {
            self.retired_hostnames.push(previous);
        }
        self.public_hostname = Some(hostname);
        self.protocol = protocol;
        self.status = ServiceStatus::Started;
        self.touch();
        self.runner_config.replace(runner_config)
    }

    pub fn mark_stopped(&mut self) {
        self.status = ServiceStatus::Stopped;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
