use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::codec::{self, RESPONSE_HEADER_SIZE};
use super::{ClientId, ResponseCode, CLIENT_ID_SIZE, NAME_LEN};
use crate::error::{Error, Result};
use crate::network::Connection;

/// Upper bound on a response payload; the largest legitimate one is a key blob
const MAX_RESPONSE_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl ResponseHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let (version, offset) = codec::read_u8(buffer, 0)?;
        let (code, offset) = codec::read_u16_le(buffer, offset)?;
        let (payload_size, _) = codec::read_u32_le(buffer, offset)?;

        Ok(Self {
            version,
            code,
            payload_size,
        })
    }

    pub fn serialize(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut header = [0u8; RESPONSE_HEADER_SIZE];
        header[0] = self.version;
        header[1..3].copy_from_slice(&self.code.to_le_bytes());
        header[3..7].copy_from_slice(&self.payload_size.to_le_bytes());
        header
    }
}

/// Response payloads. The variant follows from the response code alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// The server leaves the id out of failure and acknowledgement responses
    Bare { client_id: Option<ClientId> },
    WithKey {
        client_id: ClientId,
        encrypted_key: Vec<u8>,
    },
    CrcResult {
        client_id: ClientId,
        content_size: u32,
        file_name: String,
        checksum: u32,
    },
}

impl ResponseBody {
    pub fn parse(code: ResponseCode, payload: &[u8]) -> Result<Self> {
        match code {
            ResponseCode::FileReceived => {
                let (client_id, offset) = codec::read_client_id(payload, 0)?;
                let (content_size, offset) = codec::read_u32_le(payload, offset)?;
                let (file_name, offset) = codec::read_fixed_name(payload, offset, NAME_LEN)?;
                let (checksum, _) = codec::read_u32_le(payload, offset)?;

                Ok(ResponseBody::CrcResult {
                    client_id,
                    content_size,
                    file_name,
                    checksum,
                })
            }
            ResponseCode::PublicKeyReceived | ResponseCode::SuccessfulReconnection => {
                let (client_id, offset) = codec::read_client_id(payload, 0)?;
                Ok(ResponseBody::WithKey {
                    client_id,
                    encrypted_key: payload[offset..].to_vec(),
                })
            }
            _ => {
                let client_id = if payload.len() >= CLIENT_ID_SIZE {
                    Some(codec::read_client_id(payload, 0)?.0)
                } else {
                    None
                };
                Ok(ResponseBody::Bare { client_id })
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            ResponseBody::Bare { client_id } => {
                client_id.map(|id| id.0.to_vec()).unwrap_or_default()
            }
            ResponseBody::WithKey {
                client_id,
                encrypted_key,
            } => {
                let mut buf = client_id.0.to_vec();
                buf.extend_from_slice(encrypted_key);
                buf
            }
            ResponseBody::CrcResult {
                client_id,
                content_size,
                file_name,
                checksum,
            } => {
                let mut buf = Vec::with_capacity(CLIENT_ID_SIZE + 4 + NAME_LEN + 4);
                buf.extend_from_slice(&client_id.0);
                buf.extend_from_slice(&content_size.to_le_bytes());
                let mut name = file_name.as_bytes().to_vec();
                name.resize(NAME_LEN, 0);
                buf.extend_from_slice(&name);
                buf.extend_from_slice(&checksum.to_le_bytes());
                buf
            }
        }
    }
}

/// A parsed server response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    header: ResponseHeader,
    code: ResponseCode,
    body: ResponseBody,
}

impl Response {
    /// Parse a header and its payload. Fails on codes outside the response table.
    pub fn parse(header: ResponseHeader, payload: &[u8]) -> Result<Self> {
        let code = ResponseCode::try_from(header.code)?;
        let body = ResponseBody::parse(code, payload)?;
        Ok(Self { header, code, body })
    }

    /// Read one complete response from the connection
    pub async fn read<S>(conn: &mut Connection<S>) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let header_bytes = conn.receive_exact(RESPONSE_HEADER_SIZE).await?;
        let header = ResponseHeader::parse(&header_bytes)?;
        ResponseCode::try_from(header.code)?;

        let payload_size = header.payload_size as usize;
        if payload_size > MAX_RESPONSE_PAYLOAD {
            return Err(Error::PayloadTooLarge(payload_size));
        }
        let payload = conn.receive_exact(payload_size).await?;

        let response = Self::parse(header, &payload)?;
        debug!(
            version = header.version,
            payload_size,
            "Server responded with code {}",
            response.code
        );
        Ok(response)
    }

    /// Build a response the way the server frames it
    pub fn encode(version: u8, code: ResponseCode, body: &ResponseBody) -> Result<Vec<u8>> {
        let payload = body.serialize();
        let payload_size =
            u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge(payload.len()))?;
        let header = ResponseHeader {
            version,
            code: code.as_u16(),
            payload_size,
        };

        let mut bytes = header.serialize().to_vec();
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn client_id(&self) -> Result<ClientId> {
        match &self.body {
            ResponseBody::Bare {
                client_id: Some(client_id),
            }
            | ResponseBody::WithKey { client_id, .. }
            | ResponseBody::CrcResult { client_id, .. } => Ok(*client_id),
            ResponseBody::Bare { client_id: None } => Err(self.wrong_variant("client id")),
        }
    }

    /// Server checksum, only carried by FILE_RECEIVED
    pub fn checksum(&self) -> Result<u32> {
        match &self.body {
            ResponseBody::CrcResult { checksum, .. } => Ok(*checksum),
            _ => Err(self.wrong_variant("checksum")),
        }
    }

    /// Encrypted session key, only carried by key responses
    pub fn encrypted_key(&self) -> Result<&[u8]> {
        match &self.body {
            ResponseBody::WithKey { encrypted_key, .. } => Ok(encrypted_key.as_slice()),
            _ => Err(self.wrong_variant("encrypted key")),
        }
    }

    fn wrong_variant(&self, field: &'static str) -> Error {
        Error::WrongVariant {
            code: self.code.as_u16(),
            field,
        }
    }
}
