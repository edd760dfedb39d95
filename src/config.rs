//! Server configuration
//!
//! This module holds the startup configuration assembled from CLI flags
//! and exposes the parameter lookup backing `CONFIG GET`.

use crate::errors::{ServerError, ServerResult};

/// Runtime configuration for a respkv server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on
    pub port: u16,
    /// Directory holding the persisted RDB snapshot, if any
    pub dir: Option<String>,
    /// Filename of the persisted RDB snapshot inside `dir`
    pub dbfilename: Option<String>,
    /// When set, run as a replica of `(host, port)`
    pub replica_of: Option<(String, u16)>,
}

impl ServerConfig {
    /// Create a new ServerConfig with validation.
    ///
    /// `replica_of` is the raw `--replicaof` flag value, a host and port
    /// separated by whitespace (e.g. `"localhost 6379"`).
    pub fn new(
        port: u16,
        dir: Option<String>,
        dbfilename: Option<String>,
        replica_of: Option<String>,
    ) -> ServerResult<Self> {
        if let Some(ref d) = dir
            && d.trim().is_empty()
        {
            return Err(ServerError::config("dir cannot be empty"));
        }

        if let Some(ref f) = dbfilename {
            if f.trim().is_empty() {
                return Err(ServerError::config("dbfilename cannot be empty"));
            }
            if f.contains('/') {
                return Err(ServerError::config(
                    "dbfilename cannot contain path separators",
                ));
            }
        }

        let replica_of = match replica_of {
            None => None,
            Some(raw) => Some(Self::parse_replica_of(&raw)?),
        };

        Ok(Self {
            port,
            dir,
            dbfilename,
            replica_of,
        })
    }

    fn parse_replica_of(raw: &str) -> ServerResult<(String, u16)> {
        let mut parts = raw.split_whitespace();
        let host = parts
            .next()
            .ok_or_else(|| ServerError::config("replicaof requires \"<host> <port>\""))?;
        let port = parts
            .next()
            .ok_or_else(|| ServerError::config("replicaof requires \"<host> <port>\""))?;
        if parts.next().is_some() {
            return Err(ServerError::config(
                "replicaof takes exactly a host and a port",
            ));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ServerError::config(format!("invalid replicaof port: {}", port)))?;
        Ok((host.to_string(), port))
    }

    /// Whether this instance was started as a replica.
    pub fn is_replica(&self) -> bool {
        self.replica_of.is_some()
    }

    /// Path of the RDB snapshot file, when both `dir` and `dbfilename` are set.
    pub fn rdb_path(&self) -> Option<std::path::PathBuf> {
        match (&self.dir, &self.dbfilename) {
            (Some(dir), Some(file)) => Some(std::path::Path::new(dir).join(file)),
            _ => None,
        }
    }

    /// Look up a `CONFIG GET` parameter.
    ///
    /// Returns `None` for unrecognized parameters; the command layer reports
    /// those with an empty-string value.
    pub fn parameter(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "dir" => Some(self.dir.clone().unwrap_or_default()),
            "dbfilename" => Some(self.dbfilename.clone().unwrap_or_default()),
            _ => None,
        }
    }
}
