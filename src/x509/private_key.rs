//! Private key generation, PEM import/export and raw signatures

use std::path::Path;

use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::symm::Cipher;

use super::sha2::Sha2Algorithm;
use super::X509Error;

/// Named elliptic curves supported for key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    Prime256v1,
    Secp256k1,
    Secp384r1,
    Secp521r1,
    BrainpoolP256t1,
    BrainpoolP384t1,
    BrainpoolP512t1,
}

impl EcCurve {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "prime256v1" => Self::Prime256v1,
            "secp256k1" => Self::Secp256k1,
            "secp384r1" => Self::Secp384r1,
            "secp521r1" => Self::Secp521r1,
            "brainpoolP256t1" => Self::BrainpoolP256t1,
            "brainpoolP384t1" => Self::BrainpoolP384t1,
            "brainpoolP512t1" => Self::BrainpoolP512t1,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Prime256v1 => "prime256v1",
            Self::Secp256k1 => "secp256k1",
            Self::Secp384r1 => "secp384r1",
            Self::Secp521r1 => "secp521r1",
            Self::BrainpoolP256t1 => "brainpoolP256t1",
            Self::BrainpoolP384t1 => "brainpoolP384t1",
            Self::BrainpoolP512t1 => "brainpoolP512t1",
        }
    }

    fn nid(&self) -> Nid {
        match self {
            Self::Prime256v1 => Nid::X9_62_PRIME256V1,
            Self::Secp256k1 => Nid::SECP256K1,
            Self::Secp384r1 => Nid::SECP384R1,
            Self::Secp521r1 => Nid::SECP521R1,
            Self::BrainpoolP256t1 => Nid::BRAINPOOL_P256T1,
            Self::BrainpoolP384t1 => Nid::BRAINPOOL_P384T1,
            Self::BrainpoolP512t1 => Nid::BRAINPOOL_P512T1,
        }
    }
}

/// Key generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Rsa { bits: u32 },
    Ec { curve: EcCurve },
}

/// An asymmetric private key (RSA or EC).
pub struct PrivateKey {
    pkey: PKey<Private>,
}

impl PrivateKey {
    /// Generate a fresh key.
    pub fn generate(spec: KeySpec) -> Result<Self, X509Error> {
        let pkey = match spec {
            KeySpec::Rsa { bits } => PKey::from_rsa(Rsa::generate(bits)?)?,
            KeySpec::Ec { curve } => {
                let group = EcGroup::from_curve_name(curve.nid())?;
                PKey::from_ec_key(EcKey::generate(&group)?)?
            }
        };
        Ok(Self { pkey })
    }

    /// Load from PEM data, decrypting with `passphrase` when given.
    pub fn from_pem(pem: &str, passphrase: Option<&str>) -> Result<Self, X509Error> {
        let pkey = match passphrase {
            Some(passphrase) => {
                PKey::private_key_from_pem_passphrase(pem.as_bytes(), passphrase.as_bytes())?
            }
            None => PKey::private_key_from_pem(pem.as_bytes())?,
        };
        Ok(Self { pkey })
    }

    pub fn from_pem_file(
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> Result<Self, X509Error> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem, passphrase)
    }

    /// Unencrypted PKCS#8 PEM export.
    pub fn private_pem(&self) -> Result<String, X509Error> {
        let pem = self.pkey.private_key_to_pem_pkcs8()?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    /// Passphrase-encrypted PKCS#8 PEM export (AES-256-CBC).
    pub fn private_pem_encrypted(&self, passphrase: &str) -> Result<String, X509Error> {
        let pem = self
            .pkey
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes())?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    pub fn public_pem(&self) -> Result<String, X509Error> {
        let pem = self.pkey.public_key_to_pem()?;
        Ok(String::from_utf8_lossy(&pem).into_owned())
    }

    /// Whether this is an RSA or EC key.
    pub fn is_rsa(&self) -> bool {
        self.pkey.id() == Id::RSA
    }

    pub fn is_ec(&self) -> bool {
        self.pkey.id() == Id::EC
    }

    /// Key size in bits.
    pub fn bits(&self) -> u32 {
        self.pkey.bits()
    }

    /// Curve name for EC keys, `None` for RSA.
    pub fn curve(&self) -> Option<String> {
        self.pkey
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            .and_then(|nid| nid.short_name().ok().map(str::to_string))
    }

    /// Raw signature over `data` using the given digest.
    pub fn sign(&self, data: &[u8], sha: Sha2Algorithm) -> Result<Vec<u8>, X509Error> {
        let mut signer = Signer::new(sha.message_digest(), &self.pkey)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    /// Signature over a file's contents.
    pub fn sign_file(
        &self,
        path: impl AsRef<Path>,
        sha: Sha2Algorithm,
    ) -> Result<Vec<u8>, X509Error> {
        let data = std::fs::read(path)?;
        self.sign(&data, sha)
    }

    /// Verify a signature with this key's public half.
    pub fn verify(
        &self,
        signature: &[u8],
        data: &[u8],
        sha: Sha2Algorithm,
    ) -> Result<bool, X509Error> {
        let mut verifier = Verifier::new(sha.message_digest(), &self.pkey)?;
        verifier.update(data)?;
        Ok(verifier.verify(signature)?)
    }

    pub(crate) fn pkey(&self) -> &PKeyRef<Private> {
        &self.pkey
    }
}
