//! Worker fleet: types, discovery, health tracking and the HTTP client.

mod client;
mod health;
mod source;

pub use client::{LoadRequest, WorkerClient, WorkerClientError, WorkerHealth};
pub use health::HealthMonitor;
pub use source::{run_discovery_loop, EndpointsWorkerSource, StaticWorkerSource, WorkerSource};

use std::fmt;
use std::str::FromStr;

/// Address of a worker as produced by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerAddr {
    pub host: String,
    pub port: u16,
}

impl WorkerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Stable worker identifier, `host:port`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for WorkerAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("invalid worker address '{s}', expected host:port"))?;
        if host.is_empty() {
            return Err(format!("invalid worker address '{s}', empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid worker address '{s}', bad port"))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for WorkerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A worker instance in the fleet.
///
/// Snapshots of this value are handed out by the [`HealthMonitor`]; nothing
/// outside the monitor mutates the registered copy.
#[derive(Debug, Clone)]
pub struct Worker {
    pub host: String,
    pub port: u16,
    pub healthy: bool,
    /// Advisory model count from the registry; repaired by the reconciler.
    pub loaded_models: i64,
}

impl Worker {
    pub fn new(addr: &WorkerAddr) -> Self {
        Self {
            host: addr.host.clone(),
            port: addr.port,
            healthy: false,
            loaded_models: 0,
        }
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// A model identified by name and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub name: String,
    pub version: String,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Canonical `name:version` form, as reported by worker `/health`.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
