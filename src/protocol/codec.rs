//! Fixed-layout binary encoding shared by requests and responses.
//!
//! Every integer on the wire is little-endian. Names travel in fixed 255-byte
//! fields padded with nulls, client ids in fixed 16-byte fields.

use bytes::BufMut;

use super::{ClientId, CLIENT_ID_SIZE};
use crate::error::{Error, Result};

/// client_id(16) + version(1) + code(2) + payload_size(4)
pub const REQUEST_HEADER_SIZE: usize = CLIENT_ID_SIZE + 1 + 2 + 4;

/// version(1) + code(2) + payload_size(4)
pub const RESPONSE_HEADER_SIZE: usize = 1 + 2 + 4;

/// Encode a request header
pub fn serialize_header(
    id: &ClientId,
    version: u8,
    code: u16,
    payload_len: u32,
) -> [u8; REQUEST_HEADER_SIZE] {
    let mut header = [0u8; REQUEST_HEADER_SIZE];
    let mut cursor = &mut header[..];
    cursor.put_slice(&id.0);
    cursor.put_u8(version);
    cursor.put_u16_le(code);
    cursor.put_u32_le(payload_len);
    header
}

/// Reject names that leave no room for the terminating null in a `width` field
pub fn check_name_len(name: &str, width: usize) -> Result<()> {
    if name.len() >= width {
        return Err(Error::NameTooLong {
            len: name.len(),
            max: width - 1,
        });
    }
    Ok(())
}

/// Encode `name` into an exactly `width` bytes long, null padded field
pub fn serialize_fixed_name(name: &str, width: usize) -> Result<Vec<u8>> {
    let mut field = Vec::with_capacity(width);
    put_fixed_name(&mut field, name, width)?;
    Ok(field)
}

/// Append `name` as a null padded `width` field to `buf`
pub fn put_fixed_name<B: BufMut>(buf: &mut B, name: &str, width: usize) -> Result<()> {
    check_name_len(name, width)?;
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, width - name.len());
    Ok(())
}

fn read_array<const N: usize>(buffer: &[u8], offset: usize) -> Result<([u8; N], usize)> {
    let end = offset
        .checked_add(N)
        .filter(|&end| end <= buffer.len())
        .ok_or(Error::TruncatedBuffer {
            offset,
            needed: N,
            available: buffer.len().saturating_sub(offset),
        })?;

    let mut out = [0u8; N];
    out.copy_from_slice(&buffer[offset..end]);
    Ok((out, end))
}

pub fn read_u8(buffer: &[u8], offset: usize) -> Result<(u8, usize)> {
    let ([value], offset) = read_array::<1>(buffer, offset)?;
    Ok((value, offset))
}

pub fn read_u16_le(buffer: &[u8], offset: usize) -> Result<(u16, usize)> {
    let (bytes, offset) = read_array::<2>(buffer, offset)?;
    Ok((u16::from_le_bytes(bytes), offset))
}

pub fn read_u32_le(buffer: &[u8], offset: usize) -> Result<(u32, usize)> {
    let (bytes, offset) = read_array::<4>(buffer, offset)?;
    Ok((u32::from_le_bytes(bytes), offset))
}

pub fn read_client_id(buffer: &[u8], offset: usize) -> Result<(ClientId, usize)> {
    let (bytes, offset) = read_array::<CLIENT_ID_SIZE>(buffer, offset)?;
    Ok((ClientId(bytes), offset))
}

/// Decode a null padded field; the value ends at the first null or at `width`
pub fn read_fixed_name(buffer: &[u8], offset: usize, width: usize) -> Result<(String, usize)> {
    let end = offset
        .checked_add(width)
        .filter(|&end| end <= buffer.len())
        .ok_or(Error::TruncatedBuffer {
            offset,
            needed: width,
            available: buffer.len().saturating_sub(offset),
        })?;

    let field = &buffer[offset..end];
    let len = field.iter().position(|&b| b == 0).unwrap_or(width);
    Ok((String::from_utf8_lossy(&field[..len]).into_owned(), end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NAME_LEN;

    #[test]
    fn test_header_layout() {
        let id = ClientId([0x11; CLIENT_ID_SIZE]);
        let header = serialize_header(&id, 3, 825, 255);

        assert_eq!(header.len(), 23);
        assert_eq!(&header[..16], &[0x11; 16]);
        assert_eq!(header[16], 3);
        // 825 = 0x0339
        assert_eq!(&header[17..19], &[0x39, 0x03]);
        assert_eq!(&header[19..23], &[0xff, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_check_name_len_boundary() {
        assert!(check_name_len("", NAME_LEN).is_ok());
        assert!(check_name_len(&"a".repeat(254), NAME_LEN).is_ok());

        match check_name_len(&"a".repeat(255), NAME_LEN) {
            Err(Error::NameTooLong { len, max }) => {
                assert_eq!(len, 255);
                assert_eq!(max, 254);
            }
            other => panic!("Expected NameTooLong, got {:?}", other),
        }
        assert!(matches!(
            check_name_len(&"a".repeat(300), NAME_LEN),
            Err(Error::NameTooLong { .. })
        ));
    }

    #[test]
    fn test_fixed_name_is_null_padded() {
        let field = serialize_fixed_name("alice", NAME_LEN).unwrap();
        assert_eq!(field.len(), NAME_LEN);
        assert_eq!(&field[..5], b"alice");
        assert!(field[5..].iter().all(|&b| b == 0));

        let (name, offset) = read_fixed_name(&field, 0, NAME_LEN).unwrap();
        assert_eq!(name, "alice");
        assert_eq!(offset, NAME_LEN);
    }

    #[test]
    fn test_fixed_name_without_terminator_uses_full_width() {
        let field = [b'x'; 8];
        let (name, _) = read_fixed_name(&field, 0, 8).unwrap();
        assert_eq!(name, "xxxxxxxx");
    }

    #[test]
    fn test_read_integers() {
        let buffer = [0x03, 0x43, 0x06, 0x10, 0x00, 0x00, 0x00];
        let (version, offset) = read_u8(&buffer, 0).unwrap();
        let (code, offset) = read_u16_le(&buffer, offset).unwrap();
        let (size, offset) = read_u32_le(&buffer, offset).unwrap();

        assert_eq!(version, 3);
        assert_eq!(code, 1603);
        assert_eq!(size, 16);
        assert_eq!(offset, buffer.len());
    }

    #[test]
    fn test_read_past_end_is_truncated() {
        let buffer = [0x01, 0x02, 0x03];
        match read_u32_le(&buffer, 0) {
            Err(Error::TruncatedBuffer {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("Expected TruncatedBuffer, got {:?}", other),
        }
        assert!(read_u8(&buffer, 3).is_err());
        assert!(read_u16_le(&buffer, usize::MAX).is_err());
        assert!(read_fixed_name(&buffer, 1, 4).is_err());
    }
}
