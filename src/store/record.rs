//! On-disk record codec: length-prefixed key/value pairs with a trailing
//! SHA-1 checksum.
//!
//! Layout (little-endian):
//!
//! ```text
//! offset  size  field
//!   0      4    total_size   (u32) -- total bytes of the record
//!   4      4    key_size kL  (u32)
//!   8      4    value_size vL(u32)
//!  12     kL    key bytes
//! 12+kL   vL    value bytes
//! 12+kL+vL 20   sha1 checksum over bytes [0, total_size-20)
//! ```
//!
//! `total_size = HEADER_SIZE + kL + vL + CHECKSUM_SIZE`.

use std::io::{self, Read};

use sha1::{Digest, Sha1};

use super::error::{Result, StoreError};

/// Bytes occupied by `total_size`, `key_size`, and `value_size`.
pub const HEADER_SIZE: usize = 12;
/// Bytes occupied by the trailing SHA-1 checksum.
pub const CHECKSUM_SIZE: usize = 20;

/// Total on-disk width of a record for the given key/value lengths.
pub fn encoded_len(key: &str, value: &str) -> usize {
    HEADER_SIZE + key.len() + value.len() + CHECKSUM_SIZE
}

/// Encodes `(key, value)` into a single self-delimiting, checksummed record.
pub fn encode(key: &str, value: &str) -> Vec<u8> {
    let total = encoded_len(key, value) as u32;
    let kl = key.len() as u32;
    let vl = value.len() as u32;

    let mut buf = Vec::with_capacity(total as usize);
    buf.extend_from_slice(&total.to_le_bytes());
    buf.extend_from_slice(&kl.to_le_bytes());
    buf.extend_from_slice(&vl.to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value.as_bytes());

    // Checksum covers everything written so far: header + key + value.
    let digest = Sha1::digest(&buf);
    buf.extend_from_slice(&digest);
    buf
}

/// Reads one record from `reader`, positioned at its first byte, and returns
/// `(key, value, total_size)`. Fails with [`StoreError::Corrupt`] on a
/// mid-record truncation and [`StoreError::ChecksumMismatch`] if the trailing
/// checksum does not match the recomputed digest.
///
/// Unlike the upstream Go reader (which peeks the header and payload before
/// discarding them so it can hash the still-buffered bytes), this reads the
/// header, key, and value in order with `read_exact` and hashes as it goes --
/// there is nothing to "un-read" since nothing downstream needs those bytes
/// back.
pub fn read_record<R: Read>(reader: &mut R) -> Result<(String, String, usize)> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_corrupt(reader, &mut header)?;

    let kl = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
    let vl = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;

    let mut key_buf = vec![0u8; kl];
    read_exact_or_corrupt(reader, &mut key_buf)?;
    let mut value_buf = vec![0u8; vl];
    read_exact_or_corrupt(reader, &mut value_buf)?;

    let mut hasher = Sha1::new();
    hasher.update(header);
    hasher.update(&key_buf);
    hasher.update(&value_buf);
    let digest = hasher.finalize();

    let mut checksum = [0u8; CHECKSUM_SIZE];
    read_exact_or_corrupt(reader, &mut checksum)?;
    if checksum.as_slice() != digest.as_slice() {
        return Err(StoreError::ChecksumMismatch);
    }

    let key = String::from_utf8(key_buf).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let value = String::from_utf8(value_buf).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let total = HEADER_SIZE + kl + vl + CHECKSUM_SIZE;
    Ok((key, value, total))
}

/// Reads one record and returns only its value -- the shape `Segment::read_at`
/// needs, since the key is already known by the caller via the index.
pub fn read_value<R: Read>(reader: &mut R) -> Result<String> {
    let (_, value, _) = read_record(reader)?;
    Ok(value)
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::Corrupt("truncated record".to_string())
        } else {
            StoreError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let encoded = encode("hello", "world");
        assert_eq!(encoded.len(), encoded_len("hello", "world"));
        let mut cursor = io::Cursor::new(encoded);
        let (key, value, total) = read_record(&mut cursor).unwrap();
        assert_eq!(key, "hello");
        assert_eq!(value, "world");
        assert_eq!(total, HEADER_SIZE + 5 + 5 + CHECKSUM_SIZE);
    }

    #[test]
    fn round_trips_empty_key_and_value() {
        let encoded = encode("", "");
        let mut cursor = io::Cursor::new(encoded);
        let (key, value, _) = read_record(&mut cursor).unwrap();
        assert_eq!(key, "");
        assert_eq!(value, "");
    }

    #[test]
    fn detects_a_corrupted_checksum() {
        let mut encoded = encode("k", "v");
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let mut cursor = io::Cursor::new(encoded);
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch));
    }

    #[test]
    fn detects_a_corrupted_payload() {
        let mut encoded = encode("k", "value");
        // flip a byte inside the value region, leaving the checksum untouched
        let value_start = HEADER_SIZE + 1;
        encoded[value_start] ^= 0xFF;
        let mut cursor = io::Cursor::new(encoded);
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch));
    }

    #[test]
    fn detects_truncation() {
        let mut encoded = encode("k", "value");
        encoded.truncate(encoded.len() - 3);
        let mut cursor = io::Cursor::new(encoded);
        let err = read_record(&mut cursor).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn multiple_records_read_sequentially() {
        let mut buf = Vec::new();
        buf.extend(encode("a", "1"));
        buf.extend(encode("b", "2"));
        let mut cursor = io::Cursor::new(buf);
        let (k1, v1, _) = read_record(&mut cursor).unwrap();
        let (k2, v2, _) = read_record(&mut cursor).unwrap();
        assert_eq!((k1.as_str(), v1.as_str()), ("a", "1"));
        assert_eq!((k2.as_str(), v2.as_str()), ("b", "2"));
    }
}
