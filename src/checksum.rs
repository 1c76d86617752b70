//! POSIX `cksum`, the checksum the backup server computes over a received file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crc::{Crc, Digest, CRC_32_CKSUM};

use crate::error::Result;

const CKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_CKSUM);
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Checksum of an in-memory buffer
pub fn cksum(data: &[u8]) -> u32 {
    let mut digest = CKSUM.digest();
    digest.update(data);
    finish(digest, data.len() as u64)
}

/// Checksum of a file, streamed from disk
pub fn file_cksum(path: &Path) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut digest = CKSUM.digest();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        digest.update(&buffer[..read]);
        total += read as u64;
    }

    Ok(finish(digest, total))
}

// cksum folds the length in, least significant octet first
fn finish(mut digest: Digest<'_, u32>, mut len: u64) -> u32 {
    while len > 0 {
        digest.update(&[(len & 0xff) as u8]);
        len >>= 8;
    }
    digest.finalize()
}
