//! Self-signed X.509 identity certificates.
//!
//! A certificate binds a participant's common name (and optional email) to
//! an RSA public key. It is self-signed with PKCS#1 v1.5 / SHA-256, so it
//! proves possession of the key, not who the participant really is.
//!
//! ```text
//! Subject:  C=BR, ST=Amazonas, L=Manaus, O=UEA, CN=<name>[, emailAddress=<email>]
//! Issuer:   same as subject
//! Validity: now .. now + validity_days
//! Extensions:
//!   basicConstraints      critical  cA=FALSE
//!   keyUsage              critical  digitalSignature, nonRepudiation, keyEncipherment
//!   extendedKeyUsage                emailProtection
//!   subjectAltName                  DNS:localhost[, email:<email>]
//! ```
//!
//! Parsing resolves every field the pipeline needs once, so callers get typed
//! accessors instead of walking attribute lists.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rsa::pkcs1v15::{
    Signature as Pkcs1Signature, SigningKey as Pkcs1SigningKey,
    VerifyingKey as Pkcs1VerifyingKey,
};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::asn1::{
    Any, Ia5String, Ia5StringRef, ObjectIdentifier, PrintableStringRef, SetOfVec, Utf8StringRef,
};
use x509_cert::der::pem::LineEnding;
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::{
    DecodePem, Encode, EncodePem, EncodeValue, FixedTag, Length, Tag, Tagged, Writer,
};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
};
use x509_cert::ext::{AsExtension, Extension};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;
use x509_cert::Certificate;

use crate::config::CertificateSubject;
use crate::error::{Error, Result};

/// Attribute and extension OIDs used in identity certificates
pub mod oid {
    use x509_cert::der::asn1::ObjectIdentifier;

    /// id-at-commonName
    pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
    /// id-at-countryName
    pub const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
    /// id-at-localityName
    pub const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
    /// id-at-stateOrProvinceName
    pub const STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
    /// id-at-organizationName
    pub const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
    /// PKCS#9 emailAddress
    pub const EMAIL_ADDRESS: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");
    /// id-kp-emailProtection
    pub const EMAIL_PROTECTION: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4");
    /// sha256WithRSAEncryption
    pub const SHA256_WITH_RSA: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
}

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// A parsed identity certificate
#[derive(Clone)]
pub struct IdentityCertificate {
    certificate: Certificate,
    pem: String,
    common_name: String,
    email: Option<String>,
    public_key: RsaPublicKey,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl IdentityCertificate {
    /// Issue a self-signed certificate for `private_key`
    pub fn self_signed(
        private_key: &RsaPrivateKey,
        common_name: &str,
        email: Option<&str>,
        subject: &CertificateSubject,
        validity_days: u32,
    ) -> Result<Self> {
        if common_name.trim().is_empty() {
            return Err(Error::CertificateError("Common name must not be empty".into()));
        }

        let name = build_subject(common_name, email, subject)?;

        let validity = Validity::from_now(Duration::from_secs(
            u64::from(validity_days) * SECONDS_PER_DAY,
        ))
        .map_err(|e| Error::CertificateError(format!("Invalid validity: {}", e)))?;

        let spki = SubjectPublicKeyInfoOwned::from_key(private_key.to_public_key())
            .map_err(|e| Error::CertificateError(format!("Failed to encode public key: {}", e)))?;

        let signer = Pkcs1SigningKey::<Sha256>::new(private_key.clone());
        let mut builder = CertificateBuilder::new(
            Profile::Manual { issuer: None },
            random_serial()?,
            validity,
            name,
            spki,
            &signer,
        )
        .map_err(|e| Error::CertificateError(format!("Failed to start certificate: {}", e)))?;

        let mut alt_names = vec![GeneralName::DnsName(ia5(&subject.dns_name)?)];
        if let Some(email) = email {
            alt_names.push(GeneralName::Rfc822Name(ia5(email)?));
        }

        let ext_err =
            |e: x509_cert::builder::Error| Error::CertificateError(format!("Failed to add extension: {}", e));
        builder
            .add_extension(&BasicConstraints {
                ca: false,
                path_len_constraint: None,
            })
            .map_err(ext_err)?;
        builder
            .add_extension(&KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::NonRepudiation | KeyUsages::KeyEncipherment,
            ))
            .map_err(ext_err)?;
        builder
            .add_extension(&CriticalExtendedKeyUsage(vec![oid::EMAIL_PROTECTION]))
            .map_err(ext_err)?;
        builder
            .add_extension(&SubjectAltName(alt_names))
            .map_err(ext_err)?;

        let certificate = builder
            .build::<Pkcs1Signature>()
            .map_err(|e| Error::CertificateError(format!("Failed to sign certificate: {}", e)))?;

        Self::from_certificate(certificate)
    }

    /// Parse a PEM encoded certificate
    pub fn from_pem(pem: &str) -> Result<Self> {
        let certificate = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| Error::CertificateError(format!("Invalid certificate PEM: {}", e)))?;
        Self::from_certificate(certificate)
    }

    fn from_certificate(certificate: Certificate) -> Result<Self> {
        let tbs = &certificate.tbs_certificate;

        let common_name = find_attribute(&tbs.subject, oid::COMMON_NAME)?
            .ok_or_else(|| Error::CertificateError("Certificate has no common name".into()))?;
        let email = find_attribute(&tbs.subject, oid::EMAIL_ADDRESS)?;

        let spki_der = tbs
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::CertificateError(format!("Invalid public key info: {}", e)))?;
        let public_key = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::CertificateError(format!("Not an RSA public key: {}", e)))?;

        let not_before = to_utc(tbs.validity.not_before.to_unix_duration())?;
        let not_after = to_utc(tbs.validity.not_after.to_unix_duration())?;

        let pem = certificate
            .to_pem(LineEnding::LF)
            .map_err(|e| Error::CertificateError(format!("Failed to encode PEM: {}", e)))?;

        Ok(Self {
            certificate,
            pem,
            common_name,
            email,
            public_key,
            not_before,
            not_after,
        })
    }

    /// Subject common name
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Subject email address, if the certificate carries one
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Subject public key
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Start of the validity window
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `at` falls inside the validity window
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// Full subject in RFC 4514 form
    pub fn subject(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }

    /// Serial number as hex
    pub fn serial_hex(&self) -> String {
        hex::encode(self.certificate.tbs_certificate.serial_number.as_bytes())
    }

    /// SHA-256 of the DER encoding, hex
    pub fn fingerprint(&self) -> Result<String> {
        let der = self
            .certificate
            .to_der()
            .map_err(|e| Error::CertificateError(format!("Failed to encode DER: {}", e)))?;
        Ok(hex::encode(Sha256::digest(der)))
    }

    /// PEM text
    pub fn to_pem(&self) -> &str {
        &self.pem
    }

    /// Check the self-signature against the subject's own key
    pub fn verify_self_signature(&self) -> bool {
        if self.certificate.signature_algorithm.oid != oid::SHA256_WITH_RSA {
            return false;
        }
        let Ok(tbs) = self.certificate.tbs_certificate.to_der() else {
            return false;
        };
        let Some(raw) = self.certificate.signature.as_bytes() else {
            return false;
        };
        let Ok(signature) = Pkcs1Signature::try_from(raw) else {
            return false;
        };
        Pkcs1VerifyingKey::<Sha256>::new(self.public_key.clone())
            .verify(&tbs, &signature)
            .is_ok()
    }

    /// Whether the certificate key is the public half of `private_key`
    pub fn matches_private_key(&self, private_key: &RsaPrivateKey) -> bool {
        self.public_key == private_key.to_public_key()
    }
}

impl PartialEq for IdentityCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.pem == other.pem
    }
}

impl Eq for IdentityCertificate {}

impl fmt::Debug for IdentityCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityCertificate")
            .field("common_name", &self.common_name)
            .field("email", &self.email)
            .field("serial", &self.serial_hex())
            .field("not_after", &self.not_after)
            .finish()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// extendedKeyUsage marked critical; the stock type is always non-critical
struct CriticalExtendedKeyUsage(Vec<ObjectIdentifier>);

impl AssociatedOid for CriticalExtendedKeyUsage {
    const OID: ObjectIdentifier = ExtendedKeyUsage::OID;
}

impl FixedTag for CriticalExtendedKeyUsage {
    const TAG: Tag = Tag::Sequence;
}

impl EncodeValue for CriticalExtendedKeyUsage {
    fn value_len(&self) -> x509_cert::der::Result<Length> {
        self.0.value_len()
    }

    fn encode_value(&self, writer: &mut impl Writer) -> x509_cert::der::Result<()> {
        self.0.encode_value(writer)
    }
}

impl AsExtension for CriticalExtendedKeyUsage {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        true
    }
}

fn build_subject(
    common_name: &str,
    email: Option<&str>,
    subject: &CertificateSubject,
) -> Result<Name> {
    let country = PrintableStringRef::new(&subject.country)
        .map_err(|e| Error::CertificateError(format!("Invalid country: {}", e)))?;

    let mut rdns = vec![
        rdn(oid::COUNTRY, encode_any(&country)?)?,
        rdn(oid::STATE, utf8(&subject.state)?)?,
        rdn(oid::LOCALITY, utf8(&subject.locality)?)?,
        rdn(oid::ORGANIZATION, utf8(&subject.organization)?)?,
        rdn(oid::COMMON_NAME, utf8(common_name)?)?,
    ];

    if let Some(email) = email {
        let value = Ia5StringRef::new(email)
            .map_err(|e| Error::CertificateError(format!("Invalid email: {}", e)))?;
        rdns.push(rdn(oid::EMAIL_ADDRESS, encode_any(&value)?)?);
    }

    Ok(RdnSequence(rdns))
}

fn rdn(oid: ObjectIdentifier, value: Any) -> Result<RelativeDistinguishedName> {
    let set = SetOfVec::try_from(vec![AttributeTypeAndValue { oid, value }])
        .map_err(|e| Error::CertificateError(format!("Invalid name attribute: {}", e)))?;
    Ok(RelativeDistinguishedName(set))
}

fn utf8(value: &str) -> Result<Any> {
    let s = Utf8StringRef::new(value)
        .map_err(|e| Error::CertificateError(format!("Invalid name value: {}", e)))?;
    encode_any(&s)
}

fn encode_any(value: &(impl Tagged + EncodeValue)) -> Result<Any> {
    Any::encode_from(value)
        .map_err(|e| Error::CertificateError(format!("Failed to encode attribute: {}", e)))
}

fn ia5(value: &str) -> Result<Ia5String> {
    Ia5String::new(value)
        .map_err(|e| Error::CertificateError(format!("Invalid IA5 string '{}': {}", value, e)))
}

// Positive, non-zero leading byte, 16 bytes.
fn random_serial() -> Result<SerialNumber> {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    SerialNumber::new(&bytes)
        .map_err(|e| Error::CertificateError(format!("Invalid serial number: {}", e)))
}

// Utf8String, PrintableString and IA5String contents are all valid UTF-8.
fn find_attribute(name: &Name, wanted: ObjectIdentifier) -> Result<Option<String>> {
    let found = name
        .0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == wanted);

    match found {
        None => Ok(None),
        Some(atv) => std::str::from_utf8(atv.value.value())
            .map(|s| Some(s.to_string()))
            .map_err(|_| Error::CertificateError(format!("Attribute {} is not text", wanted))),
    }
}

fn to_utc(since_epoch: Duration) -> Result<DateTime<Utc>> {
    let secs = i64::try_from(since_epoch.as_secs())
        .map_err(|_| Error::CertificateError("Validity time out of range".into()))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| Error::CertificateError("Validity time out of range".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_private_key;
    use once_cell::sync::Lazy;

    static KEY: Lazy<RsaPrivateKey> = Lazy::new(|| generate_private_key(2048).unwrap());
    static OTHER_KEY: Lazy<RsaPrivateKey> = Lazy::new(|| generate_private_key(2048).unwrap());

    fn issue(name: &str, email: Option<&str>) -> IdentityCertificate {
        IdentityCertificate::self_signed(&KEY, name, email, &CertificateSubject::default(), 365)
            .unwrap()
    }

    #[test]
    fn test_self_signed_fields() {
        let cert = issue("Carlos Silva", Some("carlos@uea.edu.br"));

        assert_eq!(cert.common_name(), "Carlos Silva");
        assert_eq!(cert.email(), Some("carlos@uea.edu.br"));
        assert_eq!(cert.public_key(), &KEY.to_public_key());
        assert!(cert.matches_private_key(&KEY));
        assert!(!cert.matches_private_key(&OTHER_KEY));

        let subject = cert.subject();
        assert!(subject.contains("CN=Carlos Silva"));
        assert!(subject.contains("O=UEA"));
        assert!(subject.contains("C=BR"));
    }

    #[test]
    fn test_validity_window_is_365_days() {
        let cert = issue("Ana", None);
        let lifetime = cert.not_after() - cert.not_before();
        assert_eq!(lifetime.num_days(), 365);

        let now = Utc::now();
        assert!(cert.is_valid_at(now));
        assert!(!cert.is_valid_at(now + chrono::Duration::days(400)));
        assert!(!cert.is_valid_at(now - chrono::Duration::days(1)));
    }

    #[test]
    fn test_pem_round_trip() {
        let cert = issue("Ana", Some("ana@uea.edu.br"));
        assert!(cert.to_pem().starts_with("-----BEGIN CERTIFICATE-----"));

        let parsed = IdentityCertificate::from_pem(cert.to_pem()).unwrap();
        assert_eq!(parsed, cert);
        assert_eq!(parsed.common_name(), "Ana");
        assert_eq!(parsed.email(), Some("ana@uea.edu.br"));
        assert_eq!(parsed.public_key(), cert.public_key());
        assert_eq!(parsed.fingerprint().unwrap(), cert.fingerprint().unwrap());
    }

    #[test]
    fn test_extension_criticality() {
        let cert = issue("Ana", Some("ana@uea.edu.br"));
        let parsed = IdentityCertificate::from_pem(cert.to_pem()).unwrap();
        let extensions = parsed
            .certificate
            .tbs_certificate
            .extensions
            .clone()
            .unwrap();

        let critical = |oid: ObjectIdentifier| {
            extensions
                .iter()
                .find(|ext| ext.extn_id == oid)
                .map(|ext| ext.critical)
        };
        assert_eq!(critical(ExtendedKeyUsage::OID), Some(true));
        assert_eq!(critical(BasicConstraints::OID), Some(true));
        assert_eq!(critical(KeyUsage::OID), Some(true));
        assert_eq!(critical(SubjectAltName::OID), Some(false));

        let eku = extensions
            .iter()
            .find(|ext| ext.extn_id == ExtendedKeyUsage::OID)
            .unwrap();
        let decoded = <ExtendedKeyUsage as x509_cert::der::Decode>::from_der(
            eku.extn_value.as_bytes(),
        )
        .unwrap();
        assert_eq!(decoded.0, vec![oid::EMAIL_PROTECTION]);
    }

    #[test]
    fn test_self_signature_verifies() {
        let cert = issue("Ana", None);
        assert!(cert.verify_self_signature());
    }

    #[test]
    fn test_serial_numbers_differ() {
        let a = issue("Ana", None);
        let b = issue("Ana", None);
        assert_ne!(a.serial_hex(), b.serial_hex());
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_unicode_common_name() {
        let cert = issue("João Conceição", None);
        let parsed = IdentityCertificate::from_pem(cert.to_pem()).unwrap();
        assert_eq!(parsed.common_name(), "João Conceição");
    }

    #[test]
    fn test_empty_common_name_rejected() {
        let result =
            IdentityCertificate::self_signed(&KEY, "  ", None, &CertificateSubject::default(), 365);
        assert!(matches!(result, Err(Error::CertificateError(_))));
    }

    #[test]
    fn test_non_ascii_email_rejected() {
        let result = IdentityCertificate::self_signed(
            &KEY,
            "Ana",
            Some("anã@uea.edu.br"),
            &CertificateSubject::default(),
            365,
        );
        assert!(matches!(result, Err(Error::CertificateError(_))));
    }

    #[test]
    fn test_garbage_pem_rejected() {
        assert!(IdentityCertificate::from_pem("not a certificate").is_err());
        assert!(IdentityCertificate::from_pem(
            "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"
        )
        .is_err());
    }
}
