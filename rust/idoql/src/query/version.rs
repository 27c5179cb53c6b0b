//! Schema version lookup with a process-wide, injectable get-or-fetch cache.

use super::dialect::ConnectionDescriptor;
use crate::error::{QueryError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    /// Assumed when the version is unknown; every gate falls back to its
    /// legacy expression.
    pub const FLOOR: SchemaVersion = SchemaVersion::new(0, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= SchemaVersion::new(major, minor, patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = QueryError;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(QueryError::SchemaVersion("empty version string".to_string()));
        }

        let mut parts = [0u32; 3];
        for (slot, part) in parts.iter_mut().zip(trimmed.split('.')) {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return Err(QueryError::SchemaVersion(format!(
                    "unparseable version \"{trimmed}\""
                )));
            }
            *slot = digits.parse().map_err(|_| {
                QueryError::SchemaVersion(format!("version part out of range in \"{trimmed}\""))
            })?;
        }

        Ok(SchemaVersion::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Where a schema version comes from when the cache has none.
pub trait VersionSource: Send + Sync {
    fn fetch(&self, connection: &ConnectionDescriptor) -> Result<SchemaVersion>;
}

/// A version known up front, from configuration or a startup probe.
#[derive(Debug, Clone, Default)]
pub struct FixedVersion(pub Option<SchemaVersion>);

impl VersionSource for FixedVersion {
    fn fetch(&self, connection: &ConnectionDescriptor) -> Result<SchemaVersion> {
        match self.0 {
            Some(version) => Ok(version),
            None => {
                warn!(
                    connection = %connection.cache_key(),
                    floor = %SchemaVersion::FLOOR,
                    "schema version unknown, assuming floor"
                );
                Ok(SchemaVersion::FLOOR)
            }
        }
    }
}

/// Memoized schema versions keyed by connection identity.
///
/// Concurrent misses may both fetch; the last write wins.
#[derive(Debug, Default)]
pub struct SchemaVersionCache {
    entries: RwLock<HashMap<String, SchemaVersion>>,
}

impl SchemaVersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, connection: &ConnectionDescriptor) -> Option<SchemaVersion> {
        self.entries.read().get(&connection.cache_key()).copied()
    }

    pub fn insert(&self, connection: &ConnectionDescriptor, version: SchemaVersion) {
        self.entries.write().insert(connection.cache_key(), version);
    }

    pub fn get_or_fetch(
        &self,
        connection: &ConnectionDescriptor,
        source: &dyn VersionSource,
    ) -> Result<SchemaVersion> {
        if let Some(version) = self.get(connection) {
            return Ok(version);
        }

        let version = source.fetch(connection)?;
        debug!(connection = %connection.cache_key(), %version, "schema version cached");
        self.insert(connection, version);
        Ok(version)
    }
}
