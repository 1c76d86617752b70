pub mod codec;
pub mod request;
pub mod response;

use std::fmt;

use crate::error::{Error, Result};

pub use request::{FileChunk, Request, RequestBody, RequestHeader};
pub use response::{Response, ResponseBody, ResponseHeader};

/// Protocol version carried in every header
pub const PROTOCOL_VERSION: u8 = 3;

pub const CLIENT_ID_SIZE: usize = 16;
pub const NAME_LEN: usize = 255;
pub const PUBLIC_KEY_SIZE: usize = 160;

/// Attempts allowed for each handshake step
pub const MAX_TRIES: usize = 3;

/// Server-assigned client identifier. All zero until registration succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClientId(pub [u8; CLIENT_ID_SIZE]);

impl ClientId {
    pub fn is_unset(&self) -> bool {
        self.0 == [0u8; CLIENT_ID_SIZE]
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| Error::Config(format!("Invalid client id {:?}: {}", text, e)))?;
        let id: [u8; CLIENT_ID_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            Error::Config(format!(
                "Client id must be {} bytes, got {}",
                CLIENT_ID_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(id))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Codes the client sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestCode {
    Registration = 825,
    SendPublicKey = 826,
    Reconnection = 827,
    SendFile = 828,
    ValidCrc = 900,
    InvalidCrc = 901,
    FourthInvalidCrc = 902,
}

impl RequestCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for RequestCode {
    type Error = u16;

    fn try_from(code: u16) -> std::result::Result<Self, u16> {
        Ok(match code {
            825 => Self::Registration,
            826 => Self::SendPublicKey,
            827 => Self::Reconnection,
            828 => Self::SendFile,
            900 => Self::ValidCrc,
            901 => Self::InvalidCrc,
            902 => Self::FourthInvalidCrc,
            other => return Err(other),
        })
    }
}

/// Codes the server answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseCode {
    SuccessfulRegistration = 1600,
    RegistrationFailed = 1601,
    PublicKeyReceived = 1602,
    FileReceived = 1603,
    MessageReceived = 1604,
    SuccessfulReconnection = 1605,
    ReconnectionFailed = 1606,
    GeneralIssue = 1607,
}

impl ResponseCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Human readable meaning, used in logs
    pub fn meaning(self) -> &'static str {
        match self {
            Self::SuccessfulRegistration => "Successful Registration",
            Self::RegistrationFailed => "Registration Failed",
            Self::PublicKeyReceived => "Public Key Received",
            Self::FileReceived => "File Received",
            Self::MessageReceived => "Message Received",
            Self::SuccessfulReconnection => "Successful Reconnection",
            Self::ReconnectionFailed => "Reconnection Failed",
            Self::GeneralIssue => "General Issue",
        }
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        Ok(match code {
            1600 => Self::SuccessfulRegistration,
            1601 => Self::RegistrationFailed,
            1602 => Self::PublicKeyReceived,
            1603 => Self::FileReceived,
            1604 => Self::MessageReceived,
            1605 => Self::SuccessfulReconnection,
            1606 => Self::ReconnectionFailed,
            1607 => Self::GeneralIssue,
            other => return Err(Error::UnknownResponseCode(other)),
        })
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u16(), self.meaning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_hex() {
        let id = ClientId([0xab; CLIENT_ID_SIZE]);
        let parsed = ClientId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(parsed, id);
        assert!(!parsed.is_unset());
        assert!(ClientId::default().is_unset());
    }

    #[test]
    fn test_client_id_rejects_wrong_length() {
        assert!(matches!(ClientId::from_hex("abcd"), Err(Error::Config(_))));
        assert!(matches!(ClientId::from_hex("zz"), Err(Error::Config(_))));
    }

    #[test]
    fn test_response_code_table() {
        for code in 1600..=1607u16 {
            assert_eq!(ResponseCode::try_from(code).unwrap().as_u16(), code);
        }
        assert!(matches!(
            ResponseCode::try_from(9999),
            Err(Error::UnknownResponseCode(9999))
        ));
    }

    #[test]
    fn test_request_code_values() {
        assert_eq!(RequestCode::Registration.as_u16(), 825);
        assert_eq!(RequestCode::FourthInvalidCrc.as_u16(), 902);
        assert_eq!(RequestCode::try_from(828), Ok(RequestCode::SendFile));
        assert_eq!(RequestCode::try_from(1), Err(1));
    }
}
