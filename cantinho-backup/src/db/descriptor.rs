//! Connection descriptor resolution.
//!
//! Turns the application's connection URL into the host, port and database
//! name handed to the PostgreSQL command-line tools.

use std::fmt;

const DEFAULT_PORT: &str = "5432";
const FALLBACK_HOST: &str = "db";
const FALLBACK_DATABASE: &str = "cantinho_db";

/// Scheme prefixes stripped before parsing, longest first
const SCHEME_PREFIXES: [&str; 3] = ["jdbc:postgresql://", "postgresql://", "postgres://"];

/// Where the target database lives.
///
/// Resolved again for every operation; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: String,
    pub database_name: String,
}

impl ConnectionDescriptor {
    /// Resolve a connection URL such as `jdbc:postgresql://db:5432/cantinho_db?sslmode=require`.
    ///
    /// Never fails: anything that does not parse yields [`ConnectionDescriptor::fallback`].
    pub fn resolve(url: &str) -> Self {
        match Self::parse(url) {
            Some(descriptor) => descriptor,
            None => {
                // The URL itself is not logged, it may carry credentials.
                tracing::warn!(
                    host = FALLBACK_HOST,
                    database = FALLBACK_DATABASE,
                    "Unparseable database URL, using fallback connection descriptor"
                );
                Self::fallback()
            }
        }
    }

    pub fn fallback() -> Self {
        Self {
            host: FALLBACK_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            database_name: FALLBACK_DATABASE.to_string(),
        }
    }

    fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let rest = SCHEME_PREFIXES
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix))
            .unwrap_or(url);

        let rest = match rest.find('?') {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        let mut segments = rest.split('/');
        let host_port = segments.next().filter(|s| !s.is_empty())?;
        let database_name = segments.next().filter(|s| !s.is_empty())?;

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port.split(':').next().unwrap_or_default();
                port.parse::<u16>().ok()?;
                (host, port)
            }
            None => (host_port, DEFAULT_PORT),
        };
        if host.is_empty() {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            port: port.to_string(),
            database_name: database_name.to_string(),
        })
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database_name)
    }
}
