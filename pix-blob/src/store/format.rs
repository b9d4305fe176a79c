//! On-disk chunk file format.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "PXCK"
//! 4       1     format version
//! 5       4     chunk index (u32, big endian)
//! 9       4     payload length (u32, big endian)
//! 13      n     payload
//! ```

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const CHUNK_MAGIC: [u8; 4] = *b"PXCK";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 13;

/// Largest payload a single chunk file can describe
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

/// Build the header for chunk `index` carrying `payload_len` bytes
pub fn encode_header(index: u32, payload_len: usize) -> io::Result<Bytes> {
    let len = u32::try_from(payload_len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("chunk payload of {} bytes exceeds format limit", payload_len),
        )
    })?;

    let mut header = BytesMut::with_capacity(HEADER_LEN);
    header.put_slice(&CHUNK_MAGIC);
    header.put_u8(FORMAT_VERSION);
    header.put_u32(index);
    header.put_u32(len);
    Ok(header.freeze())
}

/// Validate a full chunk file and return its payload
pub fn decode_chunk(expected_index: u32, raw: Vec<u8>) -> io::Result<Bytes> {
    if raw.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "chunk {} is truncated ({} bytes)",
            expected_index,
            raw.len()
        )));
    }

    let mut header = &raw[..HEADER_LEN];
    let mut magic = [0u8; 4];
    header.copy_to_slice(&mut magic);
    if magic != CHUNK_MAGIC {
        return Err(corrupt(format!("chunk {} has bad magic", expected_index)));
    }

    let version = header.get_u8();
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "chunk {} has unsupported format version {}",
            expected_index, version
        )));
    }

    let index = header.get_u32();
    if index != expected_index {
        return Err(corrupt(format!(
            "expected chunk {} but file holds chunk {}",
            expected_index, index
        )));
    }

    let len = header.get_u32() as usize;
    let payload_len = raw.len() - HEADER_LEN;
    if len != payload_len {
        return Err(corrupt(format!(
            "chunk {} declares {} bytes but holds {}",
            expected_index, len, payload_len
        )));
    }

    Ok(Bytes::from(raw).slice(HEADER_LEN..))
}

fn corrupt(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_file(index: u32, payload: &[u8]) -> Vec<u8> {
        let mut raw = encode_header(index, payload.len()).unwrap().to_vec();
        raw.extend_from_slice(payload);
        raw
    }

    #[test]
    fn header_layout() {
        let header = encode_header(7, 258).unwrap();
        assert_eq!(header.len(), HEADER_LEN);
        assert_eq!(&header[..4], b"PXCK");
        assert_eq!(header[4], FORMAT_VERSION);
        assert_eq!(&header[5..9], &[0, 0, 0, 7]);
        assert_eq!(&header[9..13], &[0, 0, 1, 2]);
    }

    #[test]
    fn decode_returns_payload() {
        let payload = decode_chunk(3, chunk_file(3, b"pixels")).unwrap();
        assert_eq!(payload, Bytes::from_static(b"pixels"));
    }

    #[test]
    fn decode_rejects_wrong_index() {
        let err = decode_chunk(4, chunk_file(3, b"pixels")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let mut raw = chunk_file(0, b"pixels");
        raw.pop();
        let err = decode_chunk(0, raw).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut raw = chunk_file(0, b"pixels");
        raw[0] = b'X';
        assert!(decode_chunk(0, raw).is_err());
        assert!(decode_chunk(0, vec![1, 2, 3]).is_err());
    }
}
