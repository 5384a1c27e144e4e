//! SHA-2 digests
//!
//! Single-shot and streaming digests over the SHA-2 family, with hex
//! rendering of the result.

use sha2::{Digest, Sha256, Sha384, Sha512};

/// Supported SHA-2 variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sha2Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Sha2Algorithm {
    /// Digest length in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub(crate) fn message_digest(&self) -> openssl::hash::MessageDigest {
        match self {
            Self::Sha256 => openssl::hash::MessageDigest::sha256(),
            Self::Sha384 => openssl::hash::MessageDigest::sha384(),
            Self::Sha512 => openssl::hash::MessageDigest::sha512(),
        }
    }
}

enum State {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// Streaming SHA-2 computation: create, `update` any number of times,
/// `finalize`.
pub struct Sha2 {
    state: State,
}

impl Sha2 {
    pub fn new(algorithm: Sha2Algorithm) -> Self {
        let state = match algorithm {
            Sha2Algorithm::Sha256 => State::Sha256(Sha256::new()),
            Sha2Algorithm::Sha384 => State::Sha384(Sha384::new()),
            Sha2Algorithm::Sha512 => State::Sha512(Sha512::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Sha256(digest) => digest.update(data),
            State::Sha384(digest) => digest.update(data),
            State::Sha512(digest) => digest.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self.state {
            State::Sha256(digest) => digest.finalize().to_vec(),
            State::Sha384(digest) => digest.finalize().to_vec(),
            State::Sha512(digest) => digest.finalize().to_vec(),
        }
    }

    /// Single-shot digest.
    pub fn hash(algorithm: Sha2Algorithm, data: &[u8]) -> Vec<u8> {
        let mut digest = Self::new(algorithm);
        digest.update(data);
        digest.finalize()
    }

    /// Single-shot digest rendered as lowercase hex.
    pub fn hash_hex(algorithm: Sha2Algorithm, data: &[u8]) -> String {
        hex::encode(Self::hash(algorithm, data))
    }
}
