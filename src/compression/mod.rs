// src/compression/mod.rs
//! Decoders for artifact payloads
//!
//! Conda artifacts come as `.tar.bz2` tarballs or as `.conda` zip archives
//! whose members are `.tar.zst` tarballs. Other tar compressions show up in
//! hand-made local channels, so gzip and xz are accepted as well.

use std::io::{self, Read};
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (plain tar)
    None,
    /// Bzip2 (.bz2), the classic conda artifact format
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst), used inside `.conda` archives
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from a file name
    ///
    /// ```
    /// use recipegen::compression::CompressionFormat;
    ///
    /// assert_eq!(CompressionFormat::from_extension("numpy-1.9-0.tar.bz2"), CompressionFormat::Bzip2);
    /// assert_eq!(CompressionFormat::from_extension("info-x.tar.zst"), CompressionFormat::Zstd);
    /// assert_eq!(CompressionFormat::from_extension("data.tar"), CompressionFormat::None);
    /// ```
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".bz2") || path.ends_with(".tbz2") {
            Self::Bzip2
        } else if path.ends_with(".gz") || path.ends_with(".tgz") {
            Self::Gzip
        } else if path.ends_with(".xz") {
            Self::Xz
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect compression format from magic bytes
    ///
    /// Magic bytes:
    /// - Bzip2: `42 5a 68` ("BZh")
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        match data {
            [0x42, 0x5a, 0x68, ..] => Self::Bzip2,
            [0x1f, 0x8b, ..] => Self::Gzip,
            [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00, ..] => Self::Xz,
            [0x28, 0xb5, 0x2f, 0xfd, ..] => Self::Zstd,
            _ => Self::None,
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bzip2 => "bzip2",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
///
/// For `CompressionFormat::None` the reader is returned unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Bzip2 => Ok(Box::new(bzip2::read::BzDecoder::new(reader))),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                format: "zstd",
                source: e,
            })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Decompress a byte slice using the specified format
pub fn decompress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = create_decoder(data, format)?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| CompressionError::Decompression {
            format: format.name(),
            source: e,
        })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CompressionFormat::from_extension("a-1.0-0.tar.bz2"), CompressionFormat::Bzip2);
        assert_eq!(CompressionFormat::from_extension("data.tgz"), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_extension("data.tar.xz"), CompressionFormat::Xz);
        assert_eq!(CompressionFormat::from_extension("pkg-x.tar.zst"), CompressionFormat::Zstd);
        assert_eq!(CompressionFormat::from_extension("plain.txt"), CompressionFormat::None);
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(b"BZh91AY&SY"),
            CompressionFormat::Bzip2
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x28, 0xb5, 0x2f, 0xfd]),
            CompressionFormat::Zstd
        );
        assert_eq!(CompressionFormat::from_magic_bytes(&[0x1f]), CompressionFormat::None);
    }

    #[test]
    fn test_bzip2_roundtrip_through_decoder() {
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(b"package: foo\n").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(
            CompressionFormat::from_magic_bytes(&compressed),
            CompressionFormat::Bzip2
        );
        let plain = decompress(&compressed, CompressionFormat::Bzip2).unwrap();
        assert_eq!(plain, b"package: foo\n");
    }
}
