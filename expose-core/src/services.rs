//! Well-known port names

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::tunnel::Port;

const SYSTEM_SERVICES: &str = "/etc/services";

const BUILTIN: &[(u16, &str)] = &[
    (20, "ftp-data"),
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "domain"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap2"),
    (443, "https"),
    (465, "submissions"),
    (587, "submission"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "ms-sql-s"),
    (1883, "mqtt"),
    (3000, "dev-server"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5432, "postgresql"),
    (5672, "amqp"),
    (5900, "vnc"),
    (6379, "redis"),
    (8000, "http-alt"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (9000, "cslistener"),
    (9200, "elasticsearch"),
    (11211, "memcache"),
    (27017, "mongodb"),
];

/// Best-effort port → service name lookup
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    tcp: HashMap<u16, String>,
    udp: HashMap<u16, String>,
}

impl ServiceCatalog {
    /// Built-in names, overridden by `/etc/services` when it is readable
    pub fn load() -> Self {
        let mut catalog = Self::builtin();
        catalog.merge_file(Path::new(SYSTEM_SERVICES));
        catalog
    }

    pub fn builtin() -> Self {
        Self {
            tcp: BUILTIN
                .iter()
                .map(|(port, name)| (*port, (*name).to_string()))
                .collect(),
            udp: HashMap::new(),
        }
    }

    /// Merge entries of a file in `/etc/services` format; unreadable files are ignored
    pub fn merge_file(&mut self, path: &Path) {
        match fs::read_to_string(path) {
            Ok(content) => self.merge(&content),
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping services file"),
        }
    }

    /// Merge `/etc/services` formatted text. The first entry for a port wins.
    pub fn merge(&mut self, content: &str) {
        let mut seen_tcp = HashMap::new();
        let mut seen_udp = HashMap::new();

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let (Some(name), Some(spec)) = (fields.next(), fields.next()) else {
                continue;
            };
            let Some((port, proto)) = spec.split_once('/') else {
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                continue;
            };
            let seen = match proto {
                "tcp" => &mut seen_tcp,
                "udp" => &mut seen_udp,
                _ => continue,
            };
            seen.entry(port).or_insert_with(|| name.to_string());
        }

        self.tcp.extend(seen_tcp);
        self.udp.extend(seen_udp);
    }

    /// Service name for a port, preferring TCP entries
    pub fn lookup(&self, port: Port) -> Option<&str> {
        let port = port.get();
        self.tcp
            .get(&port)
            .or_else(|| self.udp.get(&port))
            .map(String::as_str)
    }
}
