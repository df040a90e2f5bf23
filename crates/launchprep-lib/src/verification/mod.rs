pub mod content_digest_hasher;

pub use content_digest_hasher::{ContentDigest, ContentDigestVerifier, VerificationError};
