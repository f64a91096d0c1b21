//! Payload compression and integrity hashing for snapshots.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::SnapshotError;

const ZSTD_LEVEL: i32 = 3;

/// Codec applied to a snapshot's serialized state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    #[default]
    Gzip,
    Lz4,
    Zstd,
    None,
}

impl CompressionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::None => "none",
        }
    }

    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>, SnapshotError> {
        match self {
            CompressionAlgorithm::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(data)
                    .map_err(|e| SnapshotError::Compression(format!("gzip: {e}")))?;
                encoder
                    .finish()
                    .map_err(|e| SnapshotError::Compression(format!("gzip: {e}")))
            }
            CompressionAlgorithm::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            CompressionAlgorithm::Zstd => zstd::encode_all(data, ZSTD_LEVEL)
                .map_err(|e| SnapshotError::Compression(format!("zstd: {e}"))),
            CompressionAlgorithm::None => Ok(data.to_vec()),
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>, SnapshotError> {
        match self {
            CompressionAlgorithm::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| SnapshotError::Compression(format!("gzip: {e}")))?;
                Ok(out)
            }
            CompressionAlgorithm::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| SnapshotError::Compression(format!("lz4: {e}"))),
            CompressionAlgorithm::Zstd => zstd::decode_all(data)
                .map_err(|e| SnapshotError::Compression(format!("zstd: {e}"))),
            CompressionAlgorithm::None => Ok(data.to_vec()),
        }
    }
}

impl core::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
