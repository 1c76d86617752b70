use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::ClientId;

/// What the client remembers after registering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub client_id: ClientId,
    /// Base64 private key, as produced by `Crypto::export_private_key`
    pub private_key: String,
}

/// `me.info`: name, hex client id and private key, one per line
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Identity> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        let malformed =
            |what: &str| Error::Config(format!("{}: {}", self.path.display(), what));

        let mut lines = content.lines().map(str::trim);
        let name = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| malformed("missing name on line 1"))?;
        let client_id = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| malformed("missing client id on line 2"))?;
        let private_key = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| malformed("missing private key on line 3"))?;

        Ok(Identity {
            name: name.to_string(),
            client_id: ClientId::from_hex(client_id)?,
            private_key: private_key.to_string(),
        })
    }

    /// Overwrite the store with `identity`
    pub fn save(&self, identity: &Identity) -> Result<()> {
        let content = format!(
            "{}\n{}\n{}\n",
            identity.name,
            identity.client_id.to_hex(),
            identity.private_key
        );
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "Identity saved");
        Ok(())
    }
}
