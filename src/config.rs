//! Server Configuration Map
//!
//! The read-only parameters exposed through `CONFIG GET`. Values are fixed at
//! startup from the command line and never change afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Immutable parameter name to value map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
    params: BTreeMap<&'static str, String>,
}

impl ServerConfig {
    pub const DIR: &'static str = "dir";
    pub const DBFILENAME: &'static str = "dbfilename";

    /// Builds the map from the startup flags. Absent flags stay unset.
    pub fn new(dir: Option<String>, dbfilename: Option<String>) -> Self {
        let mut params = BTreeMap::new();
        if let Some(dir) = dir {
            params.insert(Self::DIR, dir);
        }
        if let Some(dbfilename) = dbfilename {
            params.insert(Self::DBFILENAME, dbfilename);
        }
        Self { params }
    }

    /// Looks up a parameter, ignoring ASCII case.
    ///
    /// Returns the canonical (lower-case) name with the value.
    pub fn get(&self, param: &str) -> Option<(&'static str, &str)> {
        self.params
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(param))
            .map(|(name, value)| (*name, value.as_str()))
    }

    pub fn dir(&self) -> Option<&str> {
        self.params.get(Self::DIR).map(String::as_str)
    }

    pub fn dbfilename(&self) -> Option<&str> {
        self.params.get(Self::DBFILENAME).map(String::as_str)
    }

    /// `dir/dbfilename`, when both are set.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from(self.dir()?).join(self.dbfilename()?))
    }
}
