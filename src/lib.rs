//! Client for an encrypted file backup server: registers or reconnects,
//! exchanges an RSA-wrapped AES session key, then uploads a file in
//! encrypted chunks until the server's checksum matches.

pub mod checksum;
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use client::{run, ClientConfig};
pub use error::{Error, Result};
