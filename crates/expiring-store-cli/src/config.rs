use expiring_store::TimeSpec;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CliError, Result};

/// Which medium the notes live in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// One file per note
    Disk,
    /// A single preferences-style suite file with a key index
    KeyValue,
}

impl FromStr for Backend {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" | "file" => Ok(Backend::Disk),
            "kv" | "keyvalue" => Ok(Backend::KeyValue),
            other => Err(CliError::Config(format!(
                "STORE_BACKEND must be 'disk' or 'kv', got '{other}'"
            ))),
        }
    }
}

/// CLI configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub store_dir: PathBuf,
    pub store_name: String,
    pub backend: Backend,
    pub expiry: TimeSpec,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store_dir = lookup("STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/estore"));

        let store_name = lookup("STORE_NAME").unwrap_or_else(|| "notes".to_string());
        if store_name.is_empty() || store_name.contains(['/', '\\']) {
            return Err(CliError::Config(format!(
                "STORE_NAME must be a plain name, got '{store_name}'"
            )));
        }

        let backend = match lookup("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Disk,
        };

        let expiry = match lookup("STORE_EXPIRY") {
            Some(value) => value
                .parse()
                .map_err(|e| CliError::Config(format!("STORE_EXPIRY: {e}")))?,
            None => TimeSpec::Never,
        };

        Ok(Self {
            store_dir,
            store_name,
            backend,
            expiry,
        })
    }
}
