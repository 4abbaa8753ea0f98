//! Tunnel naming and runner configuration files

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::{IdentityHandle, LocalProtocol, Port};
use crate::error::RunnerConfigError;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

/// Derives tunnel names and public hostnames from host + port
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelNaming {
    host: String,
    domain: String,
}

impl TunnelNaming {
    pub fn new(host: &str, domain: &str) -> Self {
        Self {
            host: sanitize_label(host),
            domain: domain.trim_matches('.').to_ascii_lowercase(),
        }
    }

    /// Naming based on the machine hostname unless `host` overrides it
    pub fn detect(host: Option<&str>, domain: &str) -> Self {
        match host {
            Some(host) => Self::new(host, domain),
            None => {
                let host = hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "localhost".to_string());
                Self::new(&host, domain)
            }
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Canonical tunnel name for a port: `<host>-<port>`
    pub fn tunnel_name(&self, port: Port) -> String {
        format!("{}-{}", self.host, port)
    }

    /// A fresh generation label: `<host>-<port>-<random>`
    pub fn generation_label(&self, port: Port) -> String {
        format!("{}-{}", self.tunnel_name(port), random_suffix())
    }

    /// Public hostname for a generation label
    pub fn public_hostname(&self, label: &str) -> String {
        format!("{}.{}", label, self.domain)
    }
}

/// Lowercase DNS label made of `[a-z0-9-]`
fn sanitize_label(raw: &str) -> String {
    let first = raw.split('.').next().unwrap_or(raw);
    let label: String = first
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "localhost".to_string()
    } else {
        label.to_string()
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Configuration read by `cloudflared tunnel --config <file> run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub url: String,
    pub tunnel: String,
    #[serde(rename = "credentials-file")]
    pub credentials_file: PathBuf,
}

impl RunnerConfig {
    pub fn new(identity: &IdentityHandle, protocol: LocalProtocol, port: Port) -> Self {
        Self {
            url: protocol.origin_url(port),
            tunnel: identity.name.clone(),
            credentials_file: identity.credentials_path.clone(),
        }
    }

    /// Path of the configuration for a generation label
    pub fn path_for(dir: &Path, label: &str) -> PathBuf {
        dir.join(format!("{label}.yml"))
    }

    /// Write the configuration as YAML, creating `dir` if needed
    pub fn write(&self, dir: &Path, label: &str) -> Result<PathBuf, RunnerConfigError> {
        fs::create_dir_all(dir).map_err(|source| RunnerConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = Self::path_for(dir, label);
        let yaml = serde_yaml::to_string(self)?;
        fs::write(&path, yaml).map_err(|source| RunnerConfigError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), tunnel = %self.tunnel, "Wrote runner config");
        Ok(path)
    }
}

/// Remove a runner configuration; a missing file is not an error
pub fn remove_runner_config(path: &Path) -> Result<(), RunnerConfigError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed runner config");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RunnerConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn port(n: u16) -> Port {
        Port::new(n).unwrap()
    }

    #[test]
    fn tunnel_name_is_host_and_port() {
        let naming = TunnelNaming::new("DevBox", "example.com");
        assert_eq!(naming.tunnel_name(port(8080)), "devbox-8080");
    }

    #[test]
    fn host_is_sanitized_to_a_dns_label() {
        let naming = TunnelNaming::new("my_box.local", ".Example.com.");
        assert_eq!(naming.host(), "my-box");
        assert_eq!(naming.domain(), "example.com");
        assert_eq!(TunnelNaming::new("__", "x.y").host(), "localhost");
    }

    #[test]
    fn generation_labels_are_unique() {
        let naming = TunnelNaming::new("devbox", "example.com");
        let a = naming.generation_label(port(8080));
        let b = naming.generation_label(port(8080));
        assert!(a.starts_with("devbox-8080-"));
        assert_eq!(a.len(), "devbox-8080-".len() + SUFFIX_LEN);
        assert_ne!(a, b);
        assert_eq!(
            naming.public_hostname(&a),
            format!("{a}.example.com")
        );
    }

    #[test]
    fn suffix_uses_lowercase_alphanumerics() {
        let suffix = random_suffix();
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn runner_config_written_as_yaml() {
        let dir = tempdir().unwrap();
        let identity = IdentityHandle {
            name: "devbox-8080".to_string(),
            id: "abc".to_string(),
            credentials_path: PathBuf::from("/home/dev/.cloudflared/abc.json"),
        };
        let config = RunnerConfig::new(&identity, LocalProtocol::Http, port(8080));
        let path = config.write(dir.path(), "devbox-8080-q1w2e3").unwrap();

        assert_eq!(path, dir.path().join("devbox-8080-q1w2e3.yml"));
        let yaml = fs::read_to_string(&path).unwrap();
        assert!(yaml.contains("url: http://localhost:8080"));
        assert!(yaml.contains("tunnel: devbox-8080"));
        assert!(yaml.contains("credentials-file: /home/dev/.cloudflared/abc.json"));

        remove_runner_config(&path).unwrap();
        assert!(!path.exists());
        // Removing twice is fine
        remove_runner_config(&path).unwrap();
    }
}
