//! Certificate signing requests

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameRef, X509Req, X509ReqRef};

use super::private_key::PrivateKey;
use super::sha2::Sha2Algorithm;
use super::X509Error;

/// Distinguished-name fields of a CSR subject. Empty fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrSubject {
    pub country: String,
    pub state: String,
    pub location: String,
    pub organization: String,
    pub organization_unit: String,
    pub common_name: String,
    pub email_address: String,
}

/// A certificate signing request.
pub struct CertificateRequest {
    req: X509Req,
    pem: String,
    subject: CsrSubject,
    signature_algorithm: String,
}

impl CertificateRequest {
    /// Build and sign a request for `key` with the given subject.
    ///
    /// Subject entries follow the order C, ST, L, O, OU, CN,
    /// emailAddress, skipping empty fields.
    pub fn new(
        subject: &CsrSubject,
        key: &PrivateKey,
        sha: Sha2Algorithm,
    ) -> Result<Self, X509Error> {
        let name = build_name(subject)?;

        let mut builder = X509Req::builder()?;
        builder.set_subject_name(&name)?;
        builder.set_pubkey(key.pkey())?;
        builder.sign(key.pkey(), sha.message_digest())?;
        let req = builder.build();

        let pem = String::from_utf8_lossy(&req.to_pem()?).into_owned();
        let signature_algorithm = digest_name(sha).to_string();
        Ok(Self {
            req,
            pem,
            subject: subject.clone(),
            signature_algorithm,
        })
    }

    /// Parse a PEM encoded request.
    pub fn from_pem(pem: &str) -> Result<Self, X509Error> {
        let req = X509Req::from_pem(pem.as_bytes())?;
        let subject = read_subject(req.subject_name());
        Ok(Self {
            req,
            pem: pem.to_string(),
            subject,
            signature_algorithm: String::new(),
        })
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn subject(&self) -> &CsrSubject {
        &self.subject
    }

    /// Digest used when this request was created locally; empty for
    /// parsed requests.
    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    pub(crate) fn raw(&self) -> &X509ReqRef {
        &self.req
    }
}

fn digest_name(sha: Sha2Algorithm) -> &'static str {
    match sha {
        Sha2Algorithm::Sha256 => "sha256",
        Sha2Algorithm::Sha384 => "sha384",
        Sha2Algorithm::Sha512 => "sha512",
    }
}

fn build_name(subject: &CsrSubject) -> Result<X509Name, X509Error> {
    let mut builder = X509Name::builder()?;
    let fields = [
        ("C", &subject.country),
        ("ST", &subject.state),
        ("L", &subject.location),
        ("O", &subject.organization),
        ("OU", &subject.organization_unit),
        ("CN", &subject.common_name),
        ("emailAddress", &subject.email_address),
    ];
    for (field, value) in fields {
        if !value.is_empty() {
            builder.append_entry_by_text(field, value)?;
        }
    }
    Ok(builder.build())
}

pub(crate) fn read_subject(name: &X509NameRef) -> CsrSubject {
    let entry = |nid: Nid| -> String {
        name.entries_by_nid(nid)
            .next()
            .and_then(|e| e.data().as_utf8().ok())
            .map(|s| s.to_string())
            .unwrap_or_default()
    };
    CsrSubject {
        country: entry(Nid::COUNTRYNAME),
        state: entry(Nid::STATEORPROVINCENAME),
        location: entry(Nid::LOCALITYNAME),
        organization: entry(Nid::ORGANIZATIONNAME),
        organization_unit: entry(Nid::ORGANIZATIONALUNITNAME),
        common_name: entry(Nid::COMMONNAME),
        email_address: entry(Nid::PKCS9_EMAILADDRESS),
    }
}

/// Render a distinguished name the way it is compared: slash-separated
/// `field=value` pairs in subject order.
pub(crate) fn name_to_string(name: &X509NameRef) -> String {
    let subject = read_subject(name);
    let mut rendered = String::new();
    let fields = [
        ("C", &subject.country),
        ("ST", &subject.state),
        ("L", &subject.location),
        ("O", &subject.organization),
        ("OU", &subject.organization_unit),
        ("CN", &subject.common_name),
        ("emailAddress", &subject.email_address),
    ];
    for (field, value) in fields {
        if !value.is_empty() {
            rendered.push('/');
            rendered.push_str(field);
            rendered.push('=');
            rendered.push_str(value);
        }
    }
    rendered
}
