//! TLS identity and certificate pinning.

use crate::{CertificateFingerprint, Error, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use x509_parser::certificate::X509Certificate;

/// ALPN identifier for HTTP/3, which carries WebTransport.
pub const ALPN_H3: &[u8] = b"h3";

/// Fixed serial number of every generated certificate.
pub const SERIAL_NUMBER: u64 = 2025;

/// How long a generated certificate stays valid.
///
/// Browsers refuse pinned certificates valid for more than 14 days.
pub const VALIDITY: Duration = Duration::hours(24);

/// The self-signed certificate and key this process serves with.
///
/// Created once at startup and never mutated; both servers share it.
pub struct Identity {
    cert_der: CertificateDer<'static>,
    key_der: PrivatePkcs8KeyDer<'static>,
    fingerprint: CertificateFingerprint,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl Identity {
    /// Generate a new self-signed P-256 certificate for `localhost` / `127.0.0.1`.
    ///
    /// # Example
    /// ```
    /// use common::tls::Identity;
    ///
    /// let identity = Identity::generate().unwrap();
    /// assert_eq!(identity.fingerprint().as_str().len(), 64);
    /// ```
    pub fn generate() -> Result<Self> {
        let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;

        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumber::from(SERIAL_NUMBER));
        params.distinguished_name = DistinguishedName::new();

        // DER times carry whole seconds only
        let now = OffsetDateTime::now_utc().replace_nanosecond(0)?;
        params.not_before = now;
        params.not_after = now + VALIDITY;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.subject_alt_names = vec![
            SanType::DnsName("localhost".try_into()?),
            SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ];

        let cert = params.self_signed(&key_pair)?;
        let cert_der = cert.der().clone();

        // Everything published about the certificate comes from the signed bytes.
        let (not_before, not_after) = {
            let parsed = parse_der(&cert_der)?;
            let validity = parsed.validity();
            (validity.not_before.to_datetime(), validity.not_after.to_datetime())
        };
        let fingerprint = CertificateFingerprint::of(&cert_der);
        debug!(%fingerprint, %not_before, %not_after, "Generated self-signed certificate");

        Ok(Self {
            cert_der,
            key_der: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
            fingerprint,
            not_before,
            not_after,
        })
    }

    /// DER bytes of the certificate, exactly as presented in the TLS handshake.
    pub fn certificate_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    pub fn cert_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.cert_der.clone()]
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key_der.clone_key())
    }

    pub fn fingerprint(&self) -> &CertificateFingerprint {
        &self.fingerprint
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Structured view of the certificate bytes.
    pub fn parsed(&self) -> Result<X509Certificate<'_>> {
        parse_der(&self.cert_der)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("fingerprint", &self.fingerprint)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (rest, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| Error::CertificateParse(e.to_string()))?;
    if !rest.is_empty() {
        return Err(Error::CertificateParse(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(cert)
}

/// Install aws-lc-rs as the process-wide rustls provider.
///
/// Safe to call more than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Certificate verifier that trusts exactly one certificate, by fingerprint.
///
/// This is the native counterpart of the browser's `serverCertificateHashes`:
/// no chain building and no name checks, but the handshake signature must
/// still verify against the pinned certificate's key.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    pinned: CertificateFingerprint,
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    pub fn new(pinned: CertificateFingerprint) -> Self {
        Self {
            pinned,
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        }
    }

    pub fn pinned(&self) -> &CertificateFingerprint {
        &self.pinned
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let presented = CertificateFingerprint::of(end_entity);
        if presented == self.pinned {
            Ok(ServerCertVerified::assertion())
        } else {
            warn!(pinned = %self.pinned, %presented, "Server certificate does not match pin");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client TLS configuration that only trusts the pinned certificate, speaking `h3`.
///
/// Requires a default crypto provider, see [`install_crypto_provider`].
pub fn pinned_client_config(fingerprint: CertificateFingerprint) -> rustls::ClientConfig {
    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier::new(fingerprint)))
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_H3.to_vec()];
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::extensions::GeneralName;

    #[test]
    fn test_fingerprint_matches_der() {
        let identity = Identity::generate().unwrap();
        assert_eq!(
            identity.fingerprint(),
            &CertificateFingerprint::of(identity.certificate_der())
        );
        assert_eq!(identity.cert_chain(), vec![identity.certificate_der().clone()]);
    }

    #[test]
    fn test_each_identity_is_fresh() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_subject_alt_names() {
        let identity = Identity::generate().unwrap();
        let parsed = identity.parsed().unwrap();
        let san = parsed
            .subject_alternative_name()
            .unwrap()
            .expect("certificate has a SAN extension");

        let names = &san.value.general_names;
        assert!(names.contains(&GeneralName::DNSName("localhost")));
        assert!(names.contains(&GeneralName::IPAddress(&[127, 0, 0, 1])));
    }

    #[test]
    fn test_validity_window() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let identity = Identity::generate().unwrap();
        let parsed = identity.parsed().unwrap();
        let validity = parsed.validity();

        assert!(validity.not_before.timestamp() >= before);
        assert_eq!(
            validity.not_after.timestamp() - validity.not_before.timestamp(),
            24 * 60 * 60
        );
        assert_eq!(identity.not_before().unix_timestamp(), validity.not_before.timestamp());
        assert_eq!(identity.not_after() - identity.not_before(), VALIDITY);
    }

    #[test]
    fn test_self_signed_ca() {
        let identity = Identity::generate().unwrap();
        let parsed = identity.parsed().unwrap();

        assert!(parsed.is_ca());
        assert_eq!(parsed.subject(), parsed.issuer());
        assert_eq!(parsed.subject().iter().count(), 0);

        let serial = parsed
            .tbs_certificate
            .raw_serial()
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        assert_eq!(serial, SERIAL_NUMBER);

        let key_usage = parsed.key_usage().unwrap().expect("key usage present");
        assert!(key_usage.value.digital_signature());
        assert!(key_usage.value.key_cert_sign());

        let eku = parsed
            .extended_key_usage()
            .unwrap()
            .expect("extended key usage present");
        assert!(eku.value.client_auth);
        assert!(eku.value.server_auth);
    }

    #[test]
    fn test_pinned_verifier() {
        install_crypto_provider();
        let identity = Identity::generate().unwrap();
        let other = Identity::generate().unwrap();
        let verifier = PinnedCertVerifier::new(identity.fingerprint().clone());
        let name = ServerName::try_from("localhost").unwrap();

        assert!(verifier
            .verify_server_cert(identity.certificate_der(), &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(verifier
            .verify_server_cert(other.certificate_der(), &[], &name, &[], UnixTime::now())
            .is_err());
        assert!(verifier
            .supported_verify_schemes()
            .contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
    }

    #[test]
    fn test_pinned_client_config_alpn() {
        install_crypto_provider();
        let identity = Identity::generate().unwrap();
        let config = pinned_client_config(identity.fingerprint().clone());
        assert_eq!(config.alpn_protocols, vec![b"h3".to_vec()]);
    }
}
