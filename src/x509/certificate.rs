//! X.509 certificates: parsing, issuance and chain verification

use std::path::Path;

use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::bn::{BigNum, MsbOption};
use openssl::pkey::Id;
use openssl::sign::Verifier;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{GeneralName, X509NameRef, X509Ref, X509ReqRef, X509StoreContext, X509};
use x509_parser::prelude::{FromDer, X509Certificate as ParsedCertificate};

use super::certificate_request::{name_to_string, read_subject, CertificateRequest, CsrSubject};
use super::private_key::PrivateKey;
use super::sha2::{Sha2, Sha2Algorithm};
use super::X509Error;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Basic-constraints extension data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicConstraints {
    pub present: bool,
    pub is_ca: bool,
    pub path_length: Option<u32>,
}

/// X.509v3 extensions surfaced by the stack.
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    pub basic_constraints: BasicConstraints,
    pub subject_alternate_names: Vec<String>,
    pub issuer_alternate_names: Vec<String>,
}

/// Issuance parameters for [`Certificate::issue`] and
/// [`Certificate::self_signed`].
#[derive(Debug, Clone)]
pub struct IssueOptions {
    pub sha: Sha2Algorithm,
    /// Validity in days from now.
    pub days: u32,
    pub basic_constraints: Option<BasicConstraintsSpec>,
    pub subject_alt_names: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct BasicConstraintsSpec {
    pub is_ca: bool,
    pub path_length: Option<u32>,
}

impl IssueOptions {
    pub fn leaf(sha: Sha2Algorithm, days: u32) -> Self {
        Self {
            sha,
            days,
            basic_constraints: None,
            subject_alt_names: Vec::new(),
        }
    }

    pub fn ca(sha: Sha2Algorithm, days: u32, path_length: Option<u32>) -> Self {
        Self {
            sha,
            days,
            basic_constraints: Some(BasicConstraintsSpec {
                is_ca: true,
                path_length,
            }),
            subject_alt_names: Vec::new(),
        }
    }
}

/// An X.509 certificate, possibly carrying a PEM chain.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
    pem: String,
    /// All certificates of the PEM chain, in order, when the input held
    /// more than one block.
    chain: Vec<Certificate>,
    serial: Vec<u8>,
    subject: CsrSubject,
    subject_string: String,
    issuer: CsrSubject,
    issuer_string: String,
    not_before: i64,
    not_after: i64,
    extensions: Extensions,
    signature_algorithm: String,
    public_key_algorithm: String,
    public_key_bits: u32,
    public_key_curve: Option<String>,
    issuer_name_der: Vec<u8>,
    public_key_bits_der: Vec<u8>,
}

impl Certificate {
    // ── Constructors ───────────────────────────────────────

    /// Parse PEM data. Multiple concatenated `BEGIN`/`END` blocks are
    /// split into the certificate chain.
    pub fn from_pem(pem: &str) -> Result<Self, X509Error> {
        let blocks = split_pem_blocks(pem);
        match blocks.len() {
            0 => Err(X509Error::InvalidPem("no certificate block found".into())),
            1 => Self::from_single_block(pem.to_string(), &blocks[0]),
            _ => {
                let mut certificate = Self::from_single_block(pem.to_string(), &blocks[0])?;
                let mut chain = Vec::with_capacity(blocks.len());
                for block in &blocks {
                    chain.push(Self::from_single_block(block.clone(), block)?);
                }
                certificate.chain = chain;
                Ok(certificate)
            }
        }
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, X509Error> {
        Self::from_pem(&std::fs::read_to_string(path)?)
    }

    /// Issue a certificate for `request`, signed by `ca` with `ca_key`.
    pub fn issue(
        request: &CertificateRequest,
        ca: &Certificate,
        ca_key: &PrivateKey,
        options: &IssueOptions,
    ) -> Result<Self, X509Error> {
        let x509 = build_certificate(
            request.raw(),
            Some(&ca.x509),
            ca_key,
            options,
        )?;
        Self::from_x509(x509)
    }

    /// Issue a self-signed certificate for `request` with its own key.
    pub fn self_signed(
        request: &CertificateRequest,
        key: &PrivateKey,
        options: &IssueOptions,
    ) -> Result<Self, X509Error> {
        let x509 = build_certificate(request.raw(), None, key, options)?;
        Self::from_x509(x509)
    }

    fn from_x509(x509: X509) -> Result<Self, X509Error> {
        let pem = String::from_utf8_lossy(&x509.to_pem()?).into_owned();
        Self::from_single_block(pem.clone(), &pem)
    }

    fn from_single_block(pem: String, block: &str) -> Result<Self, X509Error> {
        let x509 = X509::from_pem(block.as_bytes())?;

        let serial = x509.serial_number().to_bn()?.to_vec();
        let subject = read_subject(x509.subject_name());
        let subject_string = name_to_string(x509.subject_name());
        let issuer = read_subject(x509.issuer_name());
        let issuer_string = name_to_string(x509.issuer_name());
        let not_before = asn1_to_unix(x509.not_before())?;
        let not_after = asn1_to_unix(x509.not_after())?;

        let signature_algorithm = x509
            .signature_algorithm()
            .object()
            .nid()
            .long_name()
            .unwrap_or("unknown")
            .to_string();

        let public_key = x509.public_key()?;
        let public_key_algorithm = match public_key.id() {
            Id::RSA => "RSA".to_string(),
            Id::EC => "EC".to_string(),
            other => format!("{:?}", other),
        };
        let public_key_bits = public_key.bits();
        let public_key_curve = public_key
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            .and_then(|nid| nid.short_name().ok().map(str::to_string));

        let mut extensions = Extensions {
            subject_alternate_names: render_general_names(x509.subject_alt_names()),
            issuer_alternate_names: render_general_names(x509.issuer_alt_names()),
            ..Default::default()
        };

        // Basic constraints and the raw DER views come from the parsed
        // TBS structure.
        let der = x509.to_der()?;
        let (_, parsed) = ParsedCertificate::from_der(&der)
            .map_err(|e| X509Error::Parse(e.to_string()))?;
        if let Ok(Some(bc)) = parsed.basic_constraints() {
            extensions.basic_constraints = BasicConstraints {
                present: true,
                is_ca: bc.value.ca,
                path_length: bc.value.path_len_constraint,
            };
        }
        let issuer_name_der = parsed.issuer().as_raw().to_vec();
        let public_key_bits_der = parsed.public_key().subject_public_key.data.to_vec();

        Ok(Self {
            x509,
            pem,
            chain: Vec::new(),
            serial,
            subject,
            subject_string,
            issuer,
            issuer_string,
            not_before,
            not_after,
            extensions,
            signature_algorithm,
            public_key_algorithm,
            public_key_bits,
            public_key_curve,
            issuer_name_der,
            public_key_bits_der,
        })
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn save_pem_file(&self, path: impl AsRef<Path>) -> Result<(), X509Error> {
        std::fs::write(path, &self.pem)?;
        Ok(())
    }

    /// Certificates of the PEM chain, in input order; empty for a single
    /// certificate.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Serial number, big-endian bytes.
    pub fn serial_number(&self) -> &[u8] {
        &self.serial
    }

    /// Serial number as plain lowercase hex.
    pub fn serial_number_hex(&self) -> String {
        hex::encode(&self.serial)
    }

    /// Serial number as colon-delimited lowercase hex.
    pub fn serial_number_colon_hex(&self) -> String {
        self.serial
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Start of validity, UTC seconds since epoch.
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// End of validity, UTC seconds since epoch.
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn subject(&self) -> &CsrSubject {
        &self.subject
    }

    pub fn subject_string(&self) -> &str {
        &self.subject_string
    }

    pub fn issuer(&self) -> &CsrSubject {
        &self.issuer
    }

    pub fn issuer_string(&self) -> &str {
        &self.issuer_string
    }

    /// A certificate is self-signed iff issuer and subject render to the
    /// same string.
    pub fn is_self_signed(&self) -> bool {
        self.issuer_string == self.subject_string
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn signature_algorithm(&self) -> &str {
        &self.signature_algorithm
    }

    /// "RSA" or "EC".
    pub fn public_key_algorithm(&self) -> &str {
        &self.public_key_algorithm
    }

    pub fn public_key_bits(&self) -> u32 {
        self.public_key_bits
    }

    pub fn public_key_curve(&self) -> Option<&str> {
        self.public_key_curve.as_deref()
    }

    // ── OCSP-style hash data ───────────────────────────────

    /// Hash of the DER encoded issuer distinguished name, lowercase hex.
    pub fn issuer_name_hash(&self, sha: Sha2Algorithm) -> String {
        hex::encode(Sha2::hash(sha, &self.issuer_name_der))
    }

    /// Hash of the subject public key bits, lowercase hex.
    pub fn public_key_hash(&self, sha: Sha2Algorithm) -> String {
        hex::encode(Sha2::hash(sha, &self.public_key_bits_der))
    }

    // ── Signature checks ───────────────────────────────────

    /// Verify a raw signature over `data` with this certificate's public
    /// key.
    pub fn verify_signature(
        &self,
        signature: &[u8],
        data: &[u8],
        sha: Sha2Algorithm,
    ) -> Result<bool, X509Error> {
        let public_key = self.x509.public_key()?;
        let mut verifier = Verifier::new(sha.message_digest(), &public_key)?;
        verifier.update(data)?;
        Ok(verifier.verify(signature)?)
    }

    /// Whether this certificate's signature checks out against `issuer`'s
    /// public key.
    pub fn signed_by(&self, issuer: &Certificate) -> bool {
        issuer
            .x509
            .public_key()
            .and_then(|key| self.x509.verify(&key))
            .unwrap_or(false)
    }

    /// Verify this certificate against its own embedded PEM chain.
    pub fn verify(&self) -> bool {
        if self.chain.len() > 1 {
            verify_chain(self, &self.chain, 1)
        } else {
            false
        }
    }
}

/// Standard X.509 path validation of `target` against `chain[start..]`.
///
/// Self-signed chain members become trust anchors, the rest untrusted
/// intermediates. Returns `true` only when a fully validated path from
/// the target to an anchor exists (signatures, validity windows and path
/// length constraints included).
pub fn verify_chain(target: &Certificate, chain: &[Certificate], start: usize) -> bool {
    let result: Result<bool, X509Error> = (|| {
        let mut store = X509StoreBuilder::new()?;
        let mut untrusted = Stack::new()?;
        for certificate in chain.iter().skip(start) {
            if certificate.is_self_signed() {
                store.add_cert(certificate.x509.clone())?;
            } else {
                untrusted.push(certificate.x509.clone())?;
            }
        }
        let store = store.build();
        let mut context = X509StoreContext::new()?;
        let verified =
            context.init(&store, &target.x509, &untrusted, |ctx| ctx.verify_cert())?;
        Ok(verified)
    })();
    result.unwrap_or(false)
}

// ── Internals ──────────────────────────────────────────────────

fn split_pem_blocks(pem: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = pem;
    while let Some(start) = rest.find(PEM_BEGIN) {
        let Some(end) = rest[start..].find(PEM_END) else {
            break;
        };
        let block_end = start + end + PEM_END.len();
        blocks.push(rest[start..block_end].to_string());
        rest = &rest[block_end..];
    }
    blocks
}

fn asn1_to_unix(time: &Asn1TimeRef) -> Result<i64, X509Error> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

fn render_general_names(names: Option<Stack<GeneralName>>) -> Vec<String> {
    let Some(names) = names else {
        return Vec::new();
    };
    names
        .iter()
        .filter_map(|name| {
            name.dnsname()
                .map(str::to_string)
                .or_else(|| name.email().map(str::to_string))
                .or_else(|| name.uri().map(str::to_string))
                .or_else(|| name.ipaddress().map(render_ip))
        })
        .collect()
}

fn render_ip(raw: &[u8]) -> String {
    match raw.len() {
        4 => format!("{}.{}.{}.{}", raw[0], raw[1], raw[2], raw[3]),
        _ => hex::encode(raw),
    }
}

fn build_certificate(
    request: &X509ReqRef,
    issuer: Option<&X509Ref>,
    sign_key: &PrivateKey,
    options: &IssueOptions,
) -> Result<X509, X509Error> {
    let mut builder = X509::builder()?;
    builder.set_version(2)?;

    let serial = {
        let mut bn = BigNum::new()?;
        bn.rand(159, MsbOption::MAYBE_ZERO, false)?;
        bn.to_asn1_integer()?
    };
    builder.set_serial_number(&serial)?;

    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(options.days)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    builder.set_subject_name(request.subject_name())?;
    let issuer_name: &X509NameRef = match issuer {
        Some(ca) => ca.subject_name(),
        None => request.subject_name(),
    };
    builder.set_issuer_name(issuer_name)?;

    let public_key = request.public_key()?;
    builder.set_pubkey(&public_key)?;

    if let Some(spec) = options.basic_constraints {
        let mut constraints = openssl::x509::extension::BasicConstraints::new();
        constraints.critical();
        if spec.is_ca {
            constraints.ca();
        }
        if let Some(length) = spec.path_length {
            constraints.pathlen(length);
        }
        builder.append_extension(constraints.build()?)?;
    }
    if !options.subject_alt_names.is_empty() {
        let mut san = openssl::x509::extension::SubjectAlternativeName::new();
        for name in &options.subject_alt_names {
            san.dns(name);
        }
        let extension = san.build(&builder.x509v3_context(issuer, None))?;
        builder.append_extension(extension)?;
    }

    builder.sign(sign_key.pkey(), options.sha.message_digest())?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::private_key::{EcCurve, KeySpec};

    fn subject(common_name: &str) -> CsrSubject {
        CsrSubject {
            country: "FR".into(),
            organization: "Open OCPP".into(),
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    fn generate_key() -> PrivateKey {
        PrivateKey::generate(KeySpec::Ec {
            curve: EcCurve::Prime256v1,
        })
        .unwrap()
    }

    /// root(CA) -> sub(CA, pathlen 0) -> leaf
    fn build_three_level_chain() -> (Certificate, Certificate, Certificate) {
        let root_key = generate_key();
        let root_csr =
            CertificateRequest::new(&subject("Test Root"), &root_key, Sha2Algorithm::Sha256)
                .unwrap();
        let root = Certificate::self_signed(
            &root_csr,
            &root_key,
            &IssueOptions::ca(Sha2Algorithm::Sha256, 365, None),
        )
        .unwrap();

        let sub_key = generate_key();
        let sub_csr =
            CertificateRequest::new(&subject("Test Sub CA"), &sub_key, Sha2Algorithm::Sha256)
                .unwrap();
        let sub = Certificate::issue(
            &sub_csr,
            &root,
            &root_key,
            &IssueOptions::ca(Sha2Algorithm::Sha256, 365, Some(0)),
        )
        .unwrap();

        let leaf_key = generate_key();
        let leaf_csr =
            CertificateRequest::new(&subject("CP001"), &leaf_key, Sha2Algorithm::Sha256).unwrap();
        let leaf = Certificate::issue(
            &leaf_csr,
            &sub,
            &sub_key,
            &IssueOptions::leaf(Sha2Algorithm::Sha256, 30),
        )
        .unwrap();

        (root, sub, leaf)
    }

    #[test]
    fn self_signed_certificate_properties() {
        let key = generate_key();
        let csr = CertificateRequest::new(&subject("Solo"), &key, Sha2Algorithm::Sha256).unwrap();
        let certificate = Certificate::self_signed(
            &csr,
            &key,
            &IssueOptions::ca(Sha2Algorithm::Sha256, 10, None),
        )
        .unwrap();

        assert!(certificate.is_self_signed());
        assert_eq!(certificate.subject().common_name, "Solo");
        assert_eq!(certificate.issuer().common_name, "Solo");
        assert_eq!(certificate.public_key_algorithm(), "EC");
        assert_eq!(certificate.public_key_curve(), Some("prime256v1"));
        assert!(certificate.extensions().basic_constraints.present);
        assert!(certificate.extensions().basic_constraints.is_ca);
        assert!(certificate.not_before() <= chrono::Utc::now().timestamp());
        assert!(certificate.not_after() > certificate.not_before());
        assert!(certificate.signature_algorithm().to_lowercase().contains("sha256"));
    }

    #[test]
    fn serial_renderings_agree() {
        let (_, _, leaf) = build_three_level_chain();
        assert!(!leaf.serial_number().is_empty());
        assert_eq!(
            leaf.serial_number_hex(),
            leaf.serial_number_colon_hex().replace(':', "")
        );
        assert_eq!(leaf.serial_number_hex(), hex::encode(leaf.serial_number()));
    }

    #[test]
    fn chain_verification_accepts_valid_path() {
        let (root, sub, leaf) = build_three_level_chain();
        assert!(root.is_self_signed());
        assert!(!sub.is_self_signed());
        assert!(!leaf.is_self_signed());
        assert!(leaf.signed_by(&sub));
        assert!(sub.signed_by(&root));
        assert_eq!(sub.extensions().basic_constraints.path_length, Some(0));

        let chain = [sub, root];
        assert!(verify_chain(&leaf, &chain, 0));
    }

    #[test]
    fn chain_verification_rejects_wrong_issuer() {
        let (root, _sub, leaf) = build_three_level_chain();
        // Without the intermediate the leaf cannot reach the anchor.
        let chain = [root];
        assert!(!verify_chain(&leaf, &chain, 0));
    }

    #[test]
    fn chain_verification_rejects_tampered_intermediate() {
        let (root, sub, leaf) = build_three_level_chain();

        // Flip one byte inside the sub certificate's Base64 body.
        let mut bytes = sub.pem().as_bytes().to_vec();
        let body_offset = sub.pem().find('\n').unwrap() + 1 + 40;
        bytes[body_offset] = if bytes[body_offset] == b'A' { b'B' } else { b'A' };
        let pem = String::from_utf8(bytes).unwrap();
        // A changed byte may instead break the DER parse; that also
        // counts as a verification failure.
        match Certificate::from_pem(&pem) {
            Ok(tampered) => {
                let chain = [tampered, root.clone()];
                assert!(!verify_chain(&leaf, &chain, 0));
            }
            Err(_) => {}
        }
        // The untampered chain still verifies.
        assert!(verify_chain(&leaf, &[sub, root], 0));
    }

    #[test]
    fn pem_chain_splits_into_sub_certificates() {
        let (root, sub, leaf) = build_three_level_chain();
        let bundle = format!("{}{}{}", leaf.pem(), sub.pem(), root.pem());
        let parsed = Certificate::from_pem(&bundle).unwrap();
        assert_eq!(parsed.chain().len(), 3);
        assert_eq!(parsed.subject().common_name, "CP001");
        assert_eq!(parsed.chain()[2].subject().common_name, "Test Root");
        // A chain bundle verifies against itself.
        assert!(parsed.verify());
    }

    #[test]
    fn verify_signature_with_certificate_key() {
        let key = generate_key();
        let csr = CertificateRequest::new(&subject("Signer"), &key, Sha2Algorithm::Sha256).unwrap();
        let certificate = Certificate::self_signed(
            &csr,
            &key,
            &IssueOptions::leaf(Sha2Algorithm::Sha256, 5),
        )
        .unwrap();

        let signature = key.sign(b"firmware-image", Sha2Algorithm::Sha256).unwrap();
        assert!(certificate
            .verify_signature(&signature, b"firmware-image", Sha2Algorithm::Sha256)
            .unwrap());
        assert!(!certificate
            .verify_signature(&signature, b"other-image", Sha2Algorithm::Sha256)
            .unwrap());
    }

    #[test]
    fn ocsp_hash_data_is_stable_hex() {
        let (_, _, leaf) = build_three_level_chain();
        let name_hash = leaf.issuer_name_hash(Sha2Algorithm::Sha256);
        let key_hash = leaf.public_key_hash(Sha2Algorithm::Sha256);
        assert_eq!(name_hash.len(), 64);
        assert_eq!(key_hash.len(), 64);
        assert_eq!(name_hash, leaf.issuer_name_hash(Sha2Algorithm::Sha256));
        assert!(name_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
