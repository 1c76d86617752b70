//! Local configuration: `transfer.info` says where and what to back up,
//! `me.info` remembers who we are between runs (see [`identity`]).

pub mod identity;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::network::DEFAULT_PORT;

pub use identity::{Identity, IdentityStore};

pub const TRANSFER_INFO_FILE: &str = "transfer.info";
pub const ME_INFO_FILE: &str = "me.info";

/// Contents of `transfer.info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInfo {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub file_path: PathBuf,
}

impl TransferInfo {
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Line 1 `host[:port]`, line 2 client name, line 3 file to back up
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut lines = content.lines().map(str::trim);

        let address = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or("missing server address on line 1")?;
        let name = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or("missing client name on line 2")?;
        let file_path = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or("missing file path on line 3")?;

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| format!("invalid port {:?}: {}", port, e))?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err("empty server host".to_string());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            name: name.to_string(),
            file_path: PathBuf::from(file_path),
        })
    }
}
