use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Digest (algorithm:value) used to assert artifact integrity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactDigest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl ArtifactDigest {
    pub fn new(algorithm: DigestAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn sha1_from_bytes(bytes: &[u8]) -> Self {
        Self::new(DigestAlgorithm::Sha1, Sha1::digest(bytes).to_vec())
    }

    pub fn sha256_from_bytes(bytes: &[u8]) -> Self {
        Self::new(DigestAlgorithm::Sha256, Sha256::digest(bytes).to_vec())
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn matches_hex(&self, expected: &str) -> bool {
        self.hex().eq_ignore_ascii_case(expected.trim())
    }
}

impl fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex())
    }
}

enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

/// Reader adapter that hashes everything read through it.
pub struct DigestReader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R, algorithm: DigestAlgorithm) -> Self {
        let hasher = match algorithm {
            DigestAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        };
        Self { inner, hasher }
    }

    pub fn finish(self) -> ArtifactDigest {
        match self.hasher {
            Hasher::Sha1(hasher) => {
                ArtifactDigest::new(DigestAlgorithm::Sha1, hasher.finalize().to_vec())
            }
            Hasher::Sha256(hasher) => {
                ArtifactDigest::new(DigestAlgorithm::Sha256, hasher.finalize().to_vec())
            }
        }
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        match &mut self.hasher {
            Hasher::Sha1(hasher) => hasher.update(&buf[..read]),
            Hasher::Sha256(hasher) => hasher.update(&buf[..read]),
        }
        Ok(read)
    }
}

pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<ArtifactDigest> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {} for hashing", path.display()))?;
    let mut reader = DigestReader::new(BufReader::new(file), algorithm);
    io::copy(&mut reader, &mut io::sink())
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(reader.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_digest_matches_one_shot() {
        let payload = b"bundle bytes".repeat(10_000);
        let mut reader = DigestReader::new(payload.as_slice(), DigestAlgorithm::Sha1);
        io::copy(&mut reader, &mut io::sink()).unwrap();
        assert_eq!(reader.finish(), ArtifactDigest::sha1_from_bytes(&payload));
    }
}
