//! X.509 primitives
//!
//! Key generation, certificate signing requests, certificate issuance and
//! chain verification for the security and ISO 15118 profiles, plus the
//! SHA-2 and Base64 helpers they lean on.

pub mod base64;
pub mod certificate;
pub mod certificate_request;
pub mod private_key;
pub mod sha2;

pub use certificate::{
    verify_chain, BasicConstraints, BasicConstraintsSpec, Certificate, Extensions, IssueOptions,
};
pub use certificate_request::{CertificateRequest, CsrSubject};
pub use private_key::{EcCurve, KeySpec, PrivateKey};
pub use sha2::{Sha2, Sha2Algorithm};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum X509Error {
    #[error("crypto error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("invalid PEM: {0}")]
    InvalidPem(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
