use digest::Digest;
use sha2::Sha256;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

const READ_BUFFER_SIZE: usize = 65536;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Verification failed: expected {expected}, got {actual}")]
    VerificationFailed {
        expected: ContentDigest,
        actual: ContentDigest,
    },

    #[error("Failed to read {path} for verification: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A SHA-256 content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of_bytes(data: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(data.as_ref()).into())
    }

    /// Streams the file through the hasher without loading it into memory.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

/// Incrementally hashes content and compares it against an expected digest.
pub struct ContentDigestVerifier {
    hasher: Sha256,
    expected_digest: ContentDigest,
}

impl ContentDigestVerifier {
    #[inline]
    pub fn new(expected_digest: ContentDigest) -> Self {
        Self {
            hasher: Sha256::new(),
            expected_digest,
        }
    }

    #[inline]
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        Digest::update(&mut self.hasher, data.as_ref());
    }

    pub fn verify(self) -> Result<(), VerificationError> {
        let actual_digest = ContentDigest(self.hasher.finalize().into());

        if actual_digest == self.expected_digest {
            Ok(())
        } else {
            Err(VerificationError::VerificationFailed {
                expected: self.expected_digest,
                actual: actual_digest,
            })
        }
    }

    /// Verifies the file at `path` by streaming it through the hasher.
    pub fn verify_file(mut self, path: &Path) -> Result<(), VerificationError> {
        let unreadable = |source: std::io::Error| VerificationError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let mut file = std::fs::File::open(path).map_err(unreadable)?;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let bytes_read = file.read(&mut buffer).map_err(unreadable)?;
            if bytes_read == 0 {
                break;
            }
            self.update(&buffer[..bytes_read]);
        }
        self.verify()
    }
}
