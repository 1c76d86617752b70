use clap::Parser;
use std::path::PathBuf;

use crate::client::ClientConfig;
use crate::config::{ME_INFO_FILE, TRANSFER_INFO_FILE};
use crate::transfer::{TransferOptions, DEFAULT_CHUNK_SIZE};

#[derive(Parser, Debug)]
#[command(name = "backup-client")]
#[command(about = "Back a file up to an encrypted backup server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Server address, client name and file to back up, one per line
    #[arg(long, default_value = TRANSFER_INFO_FILE)]
    pub transfer_info: PathBuf,

    /// Saved identity, written after the first registration
    #[arg(long, default_value = ME_INFO_FILE)]
    pub me_info: PathBuf,

    /// Plaintext bytes per file chunk
    #[arg(long, short = 'c', default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Verbose output
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            transfer_info: self.transfer_info.clone(),
            me_info: self.me_info.clone(),
            transfer: TransferOptions {
                chunk_size: self.chunk_size,
                show_progress: !self.no_progress,
            },
        }
    }
}
