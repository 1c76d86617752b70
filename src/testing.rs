//! Scripted server and deterministic crypto for protocol tests

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::config::IdentityStore;
use crate::crypto::{Crypto, SessionKey};
use crate::error::{Error, Result};
use crate::network::Connection;
use crate::protocol::codec::{self, REQUEST_HEADER_SIZE};
use crate::protocol::{
    ClientId, FileChunk, RequestCode, RequestHeader, Response, ResponseBody, ResponseCode,
    NAME_LEN, PROTOCOL_VERSION, PUBLIC_KEY_SIZE,
};
use crate::session::Session;

pub const TEST_CLIENT_ID: ClientId = ClientId([0x2a; 16]);

/// Key blob the scripted server hands out; `FakeCrypto` decrypts by reversing it
pub fn encrypted_test_key() -> Vec<u8> {
    (1..=32u8).collect()
}

pub fn decrypted_test_key() -> Vec<u8> {
    (1..=32u8).rev().collect()
}

/// Reversible, length preserving stand-in for RSA and AES
#[derive(Debug, Default)]
pub struct FakeCrypto {
    pub private_key: Option<String>,
    pub keypairs_generated: usize,
}

impl Crypto for FakeCrypto {
    fn generate_keypair(&mut self) -> Result<Vec<u8>> {
        self.keypairs_generated += 1;
        self.private_key = Some(format!("fake-private-key-{}", self.keypairs_generated));
        Ok(vec![0x5a; PUBLIC_KEY_SIZE])
    }

    fn export_private_key(&self) -> Result<String> {
        self.private_key
            .clone()
            .ok_or_else(|| Error::Crypto("No private key loaded".to_string()))
    }

    fn load_private_key(&mut self, encoded: &str) -> Result<()> {
        self.private_key = Some(encoded.to_string());
        Ok(())
    }

    fn decrypt_with_private_key(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.export_private_key()?;
        Ok(data.iter().rev().copied().collect())
    }

    fn encrypt_with_key(&self, key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
        Ok(xor(key.as_bytes(), data))
    }
}

pub fn xor(key: &[u8], data: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}

/// A request as the scripted server saw it
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub header: RequestHeader,
    pub payload: Vec<u8>,
}

impl ReceivedRequest {
    pub fn code(&self) -> RequestCode {
        RequestCode::try_from(self.header.code).expect("client sent an unknown request code")
    }

    /// Name field of a plain or key request
    pub fn name(&self) -> String {
        codec::read_fixed_name(&self.payload, 0, NAME_LEN).unwrap().0
    }

    pub fn file_chunk(&self) -> FileChunk {
        let p = &self.payload;
        let (content_size, offset) = codec::read_u32_le(p, 0).unwrap();
        let (original_size, offset) = codec::read_u32_le(p, offset).unwrap();
        let (packet_number, offset) = codec::read_u16_le(p, offset).unwrap();
        let (total_packets, offset) = codec::read_u16_le(p, offset).unwrap();
        let (name, offset) = codec::read_fixed_name(p, offset, NAME_LEN).unwrap();

        FileChunk {
            content_size,
            original_size,
            packet_number,
            total_packets,
            name,
            ciphertext: p[offset..].to_vec(),
        }
    }
}

pub fn reply(code: ResponseCode, body: ResponseBody) -> Option<Vec<u8>> {
    Some(Response::encode(PROTOCOL_VERSION, code, &body).unwrap())
}

pub fn bare(code: ResponseCode) -> Option<Vec<u8>> {
    reply(code, ResponseBody::Bare { client_id: None })
}

pub fn registered_reply() -> Option<Vec<u8>> {
    reply(
        ResponseCode::SuccessfulRegistration,
        ResponseBody::Bare {
            client_id: Some(TEST_CLIENT_ID),
        },
    )
}

pub fn key_reply(code: ResponseCode) -> Option<Vec<u8>> {
    reply(
        code,
        ResponseBody::WithKey {
            client_id: TEST_CLIENT_ID,
            encrypted_key: encrypted_test_key(),
        },
    )
}

pub fn crc_reply(file_name: &str, content_size: u32, checksum: u32) -> Option<Vec<u8>> {
    reply(
        ResponseCode::FileReceived,
        ResponseBody::CrcResult {
            client_id: TEST_CLIENT_ID,
            content_size,
            file_name: file_name.to_string(),
            checksum,
        },
    )
}

/// Serve one scripted reply per incoming request (`None` = stay silent).
/// The task ends, closing the stream, once the script runs out.
pub fn scripted_server(
    replies: Vec<Option<Vec<u8>>>,
) -> (Connection<DuplexStream>, JoinHandle<Vec<ReceivedRequest>>) {
    let (client, mut server) = tokio::io::duplex(1 << 20);

    let handle = tokio::spawn(async move {
        let mut received = Vec::new();
        for reply in replies {
            let mut header = [0u8; REQUEST_HEADER_SIZE];
            if server.read_exact(&mut header).await.is_err() {
                break;
            }
            let header = RequestHeader::deserialize(&header).unwrap();
            let mut payload = vec![0u8; header.payload_size as usize];
            server.read_exact(&mut payload).await.unwrap();
            received.push(ReceivedRequest { header, payload });

            if let Some(bytes) = reply {
                server.write_all(&bytes).await.unwrap();
            }
        }
        received
    });

    (Connection::new(client, "scripted"), handle)
}

/// Register a session against a server that afterwards plays `replies`.
/// The registration and key requests are dropped from the returned log.
pub async fn registered_session(
    dir: &Path,
    replies: Vec<Option<Vec<u8>>>,
) -> (
    Session<FakeCrypto>,
    Connection<DuplexStream>,
    JoinHandle<Vec<ReceivedRequest>>,
) {
    let mut script = vec![registered_reply(), key_reply(ResponseCode::PublicKeyReceived)];
    script.extend(replies);

    let (mut conn, server) = scripted_server(script);
    let store = IdentityStore::new(dir.join("me.info"));
    let mut session = Session::new("alice", FakeCrypto::default(), store);
    session.register(&mut conn).await.unwrap();

    let server = tokio::spawn(async move {
        let mut received = server.await.unwrap();
        received.drain(..2);
        received
    });
    (session, conn, server)
}
