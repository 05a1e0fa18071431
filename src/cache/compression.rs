//! gzip helpers for large cache values.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::CompressionType;
use crate::error::{CacheError, Result};

/// Compresses `data` with the given codec and level.
pub fn compress(kind: CompressionType, data: &[u8], level: u32) -> Result<Vec<u8>> {
    match kind {
        CompressionType::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| CacheError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| CacheError::Compression(e.to_string()))
        }
    }
}

/// Reverses [`compress`].
pub fn decompress(kind: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match kind {
        CompressionType::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| CacheError::Compression(e.to_string()))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repetitive_data_shrinks() {
        let data = "npm@10.2.4 ".repeat(200);
        let packed = compress(CompressionType::Gzip, data.as_bytes(), 6).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(
            decompress(CompressionType::Gzip, &packed).unwrap(),
            data.as_bytes()
        );
    }

    #[test]
    fn test_garbage_fails_to_decompress() {
        assert!(decompress(CompressionType::Gzip, b"not gzip").is_err());
    }
}
