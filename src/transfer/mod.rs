//! Encrypted chunked upload with checksum confirmation and resend.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::checksum;
use crate::crypto::Crypto;
use crate::error::{Error, Result};
use crate::network::Connection;
use crate::protocol::codec;
use crate::protocol::request::FILE_CHUNK_OVERHEAD;
use crate::protocol::{
    FileChunk, Request, RequestCode, Response, ResponseCode, MAX_TRIES, NAME_LEN,
};
use crate::session::Session;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const AES_BLOCK_SIZE: usize = 16;

/// Largest plaintext chunk whose padded ciphertext still fits the payload size field
pub const MAX_CHUNK_SIZE: usize = u32::MAX as usize - FILE_CHUNK_OVERHEAD - AES_BLOCK_SIZE;

/// Full sends of the file before giving up; the last mismatch is reported
/// with FOURTH_INVALID_CRC
pub const MAX_TRANSFER_ATTEMPTS: usize = MAX_TRIES + 1;

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub show_progress: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: true,
        }
    }
}

/// Progress of one upload
#[derive(Debug, Clone)]
pub struct TransferState {
    pub file_path: PathBuf,
    pub local_checksum: u32,
    /// Last packet number sent in the current attempt
    pub chunk_index: u16,
    pub attempt_count: usize,
}

/// Outcome of a confirmed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub file_name: String,
    pub bytes: u64,
    pub chunks: u16,
    pub attempts: usize,
    pub checksum: u32,
    pub elapsed: Duration,
}

/// Reads a file in fixed-size slices. An empty file yields a single empty slice.
pub struct FileChunker {
    file: File,
    chunk_size: usize,
    total_size: u64,
    bytes_read: u64,
    chunks_read: usize,
}

impl FileChunker {
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "Chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, chunk_size
            )));
        }
        let file = File::open(path)?;
        let total_size = file.metadata()?.len();

        Ok(Self {
            file,
            chunk_size,
            total_size,
            bytes_read: 0,
            chunks_read: 0,
        })
    }

    pub fn total_chunks(&self) -> usize {
        let full = self.total_size.div_ceil(self.chunk_size as u64);
        usize::try_from(full).unwrap_or(usize::MAX).max(1)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Start over from the first chunk
    pub fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.bytes_read = 0;
        self.chunks_read = 0;
        Ok(())
    }

    /// Fails if the file got shorter than it was when the chunker opened it
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.chunks_read >= self.total_chunks() {
            return Ok(None);
        }

        let expected = (self.total_size - self.bytes_read).min(self.chunk_size as u64);
        let mut buffer = Vec::with_capacity(expected as usize);
        (&mut self.file).take(expected).read_to_end(&mut buffer)?;
        if (buffer.len() as u64) < expected {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "file changed during upload: expected {} bytes at offset {}, read {}",
                    expected,
                    self.bytes_read,
                    buffer.len()
                ),
            )));
        }

        self.bytes_read += expected;
        self.chunks_read += 1;
        Ok(Some(buffer))
    }
}

/// Upload `path` over an established session, resending the whole file while
/// the server's checksum disagrees with ours.
pub async fn send_file<S, C>(
    conn: &mut Connection<S>,
    session: &Session<C>,
    path: &Path,
    options: &TransferOptions,
) -> Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Crypto,
{
    let key = session
        .session_key()
        .ok_or_else(|| Error::Crypto("No session key, handshake not completed".to_string()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::Config(format!("{} does not name a file", path.display())))?;
    codec::check_name_len(&file_name, NAME_LEN)?;

    let mut chunker = FileChunker::new(path, options.chunk_size)?;
    let total_chunks = chunker.total_chunks();
    let total_packets = u16::try_from(total_chunks).map_err(|_| Error::FileTooLarge {
        chunks: total_chunks,
        max: u16::MAX as usize,
    })?;

    let mut state = TransferState {
        file_path: path.to_path_buf(),
        local_checksum: checksum::file_cksum(path)?,
        chunk_index: 0,
        attempt_count: 0,
    };
    info!(
        file = %state.file_path.display(),
        bytes = chunker.total_size(),
        chunks = total_packets,
        checksum = state.local_checksum,
        "Sending file"
    );

    let bar = progress_bar(options.show_progress, total_packets);
    let started = Instant::now();

    loop {
        state.attempt_count += 1;
        state.chunk_index = 0;
        chunker.rewind()?;
        bar.set_position(0);
        bar.set_message(format!("attempt {}", state.attempt_count));

        while let Some(plaintext) = chunker.next_chunk()? {
            state.chunk_index += 1;
            let ciphertext = session.crypto().encrypt_with_key(key, &plaintext)?;
            let chunk = FileChunk::new(
                state.chunk_index,
                total_packets,
                &file_name,
                plaintext.len(),
                ciphertext,
            )?;
            conn.send_request(&Request::send_file(session.client_id(), chunk)?)
                .await?;
            bar.inc(1);
        }
        debug!(chunks = state.chunk_index, "All chunks sent, waiting for checksum");

        let response = Response::read(conn).await?;
        let server_checksum = response.checksum()?;

        if server_checksum == state.local_checksum {
            send_crc_verdict(conn, session, RequestCode::ValidCrc, &file_name).await?;
            read_ack(conn).await?;

            let elapsed = started.elapsed();
            bar.finish_with_message("done");
            info!(
                attempts = state.attempt_count,
                "Checksum confirmed, transfer finished in {}",
                humantime::format_duration(round_to_millis(elapsed))
            );
            return Ok(TransferReport {
                file_name,
                bytes: chunker.total_size(),
                chunks: total_packets,
                attempts: state.attempt_count,
                checksum: state.local_checksum,
                elapsed,
            });
        }

        warn!(
            attempt = state.attempt_count,
            local = state.local_checksum,
            server = server_checksum,
            "Checksum mismatch"
        );

        if state.attempt_count >= MAX_TRANSFER_ATTEMPTS {
            send_crc_verdict(conn, session, RequestCode::FourthInvalidCrc, &file_name).await?;
            read_ack(conn).await?;
            bar.abandon_with_message("checksum mismatch");
            return Err(Error::ChecksumMismatchExhausted(state.attempt_count));
        }

        // No response follows INVALID_CRC; the resend starts right away
        send_crc_verdict(conn, session, RequestCode::InvalidCrc, &file_name).await?;
    }
}

async fn send_crc_verdict<S, C>(
    conn: &mut Connection<S>,
    session: &Session<C>,
    code: RequestCode,
    file_name: &str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Crypto,
{
    let request = Request::general(session.client_id(), code, file_name)?;
    conn.send_request(&request).await
}

async fn read_ack<S>(conn: &mut Connection<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = Response::read(conn).await?;
    if response.code() != ResponseCode::MessageReceived {
        warn!("Expected an acknowledgement, server sent {}", response.code());
    }
    Ok(())
}

fn progress_bar(visible: bool, total_chunks: u16) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total_chunks as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40}] {pos}/{len} chunks ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Drop sub-millisecond noise before formatting a duration
pub fn round_to_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
