use bytes::BufMut;

use super::codec::{self, REQUEST_HEADER_SIZE};
use super::{ClientId, RequestCode, NAME_LEN, PROTOCOL_VERSION, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

/// content_size(4) + original_size(4) + packet_number(2) + total_packets(2) + name(255)
pub const FILE_CHUNK_OVERHEAD: usize = 4 + 4 + 2 + 2 + NAME_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl RequestHeader {
    pub fn serialize(&self) -> [u8; REQUEST_HEADER_SIZE] {
        codec::serialize_header(&self.client_id, self.version, self.code, self.payload_size)
    }

    pub fn deserialize(buffer: &[u8]) -> Result<Self> {
        let (client_id, offset) = codec::read_client_id(buffer, 0)?;
        let (version, offset) = codec::read_u8(buffer, offset)?;
        let (code, offset) = codec::read_u16_le(buffer, offset)?;
        let (payload_size, _) = codec::read_u32_le(buffer, offset)?;

        Ok(Self {
            client_id,
            version,
            code,
            payload_size,
        })
    }
}

/// One encrypted slice of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub content_size: u32,
    pub original_size: u32,
    pub packet_number: u16,
    pub total_packets: u16,
    pub name: String,
    pub ciphertext: Vec<u8>,
}

impl FileChunk {
    pub fn new(
        packet_number: u16,
        total_packets: u16,
        name: &str,
        original_size: usize,
        ciphertext: Vec<u8>,
    ) -> Result<Self> {
        codec::check_name_len(name, NAME_LEN)?;
        let content_size =
            u32::try_from(ciphertext.len()).map_err(|_| Error::PayloadTooLarge(ciphertext.len()))?;
        let original_size =
            u32::try_from(original_size).map_err(|_| Error::PayloadTooLarge(original_size))?;

        Ok(Self {
            content_size,
            original_size,
            packet_number,
            total_packets,
            name: name.to_string(),
            ciphertext,
        })
    }

    /// Everything but the ciphertext
    pub fn serialize_short_fields(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(FILE_CHUNK_OVERHEAD);
        self.put_short_fields(&mut buf)?;
        Ok(buf)
    }

    fn put_short_fields<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u32_le(self.content_size);
        buf.put_u32_le(self.original_size);
        buf.put_u16_le(self.packet_number);
        buf.put_u16_le(self.total_packets);
        codec::put_fixed_name(buf, &self.name, NAME_LEN)
    }
}

/// Request payloads, one variant per wire layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Plain { name: String },
    WithKey { name: String, public_key: Vec<u8> },
    FileChunk(FileChunk),
}

impl RequestBody {
    /// Exact number of bytes `serialize` produces
    pub fn encoded_len(&self) -> usize {
        match self {
            RequestBody::Plain { .. } => NAME_LEN,
            RequestBody::WithKey { .. } => NAME_LEN + PUBLIC_KEY_SIZE,
            RequestBody::FileChunk(chunk) => FILE_CHUNK_OVERHEAD + chunk.ciphertext.len(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        match self {
            RequestBody::Plain { name } => {
                codec::put_fixed_name(&mut buf, name, NAME_LEN)?;
            }
            RequestBody::WithKey { name, public_key } => {
                codec::put_fixed_name(&mut buf, name, NAME_LEN)?;
                buf.put_slice(public_key);
            }
            RequestBody::FileChunk(chunk) => {
                chunk.put_short_fields(&mut buf)?;
                buf.put_slice(&chunk.ciphertext);
            }
        }
        Ok(buf)
    }
}

/// A validated request ready to be written to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    header: RequestHeader,
    body: RequestBody,
}

impl Request {
    /// Name-only request (registration, reconnection, CRC acknowledgements)
    pub fn general(id: ClientId, code: RequestCode, name: &str) -> Result<Self> {
        codec::check_name_len(name, NAME_LEN)?;
        Self::new(
            id,
            code,
            RequestBody::Plain {
                name: name.to_string(),
            },
        )
    }

    pub fn send_key(id: ClientId, name: &str, public_key: &[u8]) -> Result<Self> {
        codec::check_name_len(name, NAME_LEN)?;
        if public_key.len() != PUBLIC_KEY_SIZE {
            return Err(Error::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: public_key.len(),
            });
        }
        Self::new(
            id,
            RequestCode::SendPublicKey,
            RequestBody::WithKey {
                name: name.to_string(),
                public_key: public_key.to_vec(),
            },
        )
    }

    pub fn send_file(id: ClientId, chunk: FileChunk) -> Result<Self> {
        codec::check_name_len(&chunk.name, NAME_LEN)?;
        Self::new(id, RequestCode::SendFile, RequestBody::FileChunk(chunk))
    }

    fn new(client_id: ClientId, code: RequestCode, body: RequestBody) -> Result<Self> {
        let len = body.encoded_len();
        let payload_size = u32::try_from(len).map_err(|_| Error::PayloadTooLarge(len))?;

        Ok(Self {
            header: RequestHeader {
                client_id,
                version: PROTOCOL_VERSION,
                code: code.as_u16(),
                payload_size,
            },
            body,
        })
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Header followed by body, as written on the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = self.body.serialize()?;
        let mut bytes = Vec::with_capacity(REQUEST_HEADER_SIZE + body.len());
        bytes.extend_from_slice(&self.header.serialize());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}
