//! Signing credentials and algorithm identifiers.

use crate::error::{WsFedError, WsFedResult};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;

/// XML-DSig / JWS signature algorithm configured per relying party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha1,
    RsaSha256,
    RsaSha384,
    RsaSha512,
}

impl SignatureAlgorithm {
    /// Accepts the XML-DSig URI or a short name such as `rsa-sha256` / `RS256`.
    pub fn parse(value: &str) -> WsFedResult<Self> {
        match value.trim() {
            "http://www.w3.org/2000/09/xmldsig#rsa-sha1" | "rsa-sha1" => Ok(Self::RsaSha1),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" | "rsa-sha256" | "RS256" => {
                Ok(Self::RsaSha256)
            }
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" | "rsa-sha384" | "RS384" => {
                Ok(Self::RsaSha384)
            }
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" | "rsa-sha512" | "RS512" => {
                Ok(Self::RsaSha512)
            }
            other => Err(WsFedError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    #[must_use]
    pub fn message_digest(&self) -> MessageDigest {
        match self {
            Self::RsaSha1 => MessageDigest::sha1(),
            Self::RsaSha256 => MessageDigest::sha256(),
            Self::RsaSha384 => MessageDigest::sha384(),
            Self::RsaSha512 => MessageDigest::sha512(),
        }
    }

    /// JWS equivalent. SHA-1 has no JWS registration.
    pub fn jwt_algorithm(&self) -> WsFedResult<jsonwebtoken::Algorithm> {
        match self {
            Self::RsaSha1 => Err(WsFedError::UnsupportedAlgorithm(
                "rsa-sha1 cannot be used for JWT".to_string(),
            )),
            Self::RsaSha256 => Ok(jsonwebtoken::Algorithm::RS256),
            Self::RsaSha384 => Ok(jsonwebtoken::Algorithm::RS384),
            Self::RsaSha512 => Ok(jsonwebtoken::Algorithm::RS512),
        }
    }
}

/// XML-DSig digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn parse(value: &str) -> WsFedResult<Self> {
        match value.trim() {
            "http://www.w3.org/2000/09/xmldsig#sha1" | "sha1" => Ok(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" | "sha256" => Ok(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" | "sha384" => Ok(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" | "sha512" => Ok(Self::Sha512),
            other => Err(WsFedError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    #[must_use]
    pub fn message_digest(&self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha384 => MessageDigest::sha384(),
            Self::Sha512 => MessageDigest::sha512(),
        }
    }

    /// Base64 digest of `data`.
    pub fn digest_base64(&self, data: &[u8]) -> WsFedResult<String> {
        let digest = openssl::hash::hash(self.message_digest(), data)
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("Digest failed: {e}")))?;
        Ok(STANDARD.encode(digest))
    }
}

/// Parse a PEM certificate, tolerating bare base64 without headers.
pub fn parse_certificate(pem: &str) -> WsFedResult<X509> {
    let pem_data = if pem.contains("-----BEGIN CERTIFICATE-----") {
        pem.to_string()
    } else {
        format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----",
            pem.trim()
        )
    };

    X509::from_pem(pem_data.as_bytes())
        .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid certificate: {e}")))
}

/// Convert an ASN.1 time into a UTC timestamp.
pub fn asn1_to_utc(time: &Asn1TimeRef) -> WsFedResult<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0)
        .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid epoch: {e}")))?;
    let diff = epoch
        .diff(time)
        .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid certificate time: {e}")))?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| WsFedError::InvalidKeyMaterial("Certificate time out of range".to_string()))
}

/// `CN=...,O=...` rendering of the certificate subject.
#[must_use]
pub fn subject_dn(cert: &X509) -> String {
    cert.subject_name()
        .entries()
        .filter_map(|entry| {
            let key = entry.object().nid().short_name().ok()?;
            let value = entry.data().as_utf8().ok()?;
            Some(format!("{key}={value}"))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Base64 DER encoding of a certificate, as carried in `ds:X509Certificate`.
pub fn certificate_base64_der(cert: &X509) -> WsFedResult<String> {
    let der = cert
        .to_der()
        .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Certificate encoding failed: {e}")))?;
    Ok(STANDARD.encode(der))
}

/// An X.509 certificate together with its RSA private key.
#[derive(Clone)]
pub struct SigningCredentials {
    certificate: X509,
    private_key: PKey<Private>,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("subject", &subject_dn(&self.certificate))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl SigningCredentials {
    /// Load credentials from PEM, rejecting a key that does not belong to
    /// the certificate or is not RSA.
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> WsFedResult<Self> {
        let certificate = parse_certificate(certificate_pem)?;
        let private_key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid private key: {e}")))?;

        if private_key.rsa().is_err() {
            return Err(WsFedError::InvalidKeyMaterial(
                "Only RSA signing keys are supported".to_string(),
            ));
        }

        let public_key = certificate
            .public_key()
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid public key: {e}")))?;
        if !public_key.public_eq(&private_key) {
            return Err(WsFedError::InvalidKeyMaterial(
                "Private key does not match certificate".to_string(),
            ));
        }

        Ok(Self {
            certificate,
            private_key,
        })
    }

    #[must_use]
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn certificate_base64_der(&self) -> WsFedResult<String> {
        certificate_base64_der(&self.certificate)
    }

    pub fn certificate_pem(&self) -> WsFedResult<String> {
        let pem = self
            .certificate
            .to_pem()
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Certificate encoding failed: {e}")))?;
        String::from_utf8(pem)
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Certificate PEM not UTF-8: {e}")))
    }

    /// Lowercase hex SHA-256 certificate thumbprint, used as `kid`.
    pub fn key_id(&self) -> WsFedResult<String> {
        let digest = self
            .certificate
            .digest(MessageDigest::sha256())
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Thumbprint failed: {e}")))?;
        Ok(hex::encode(digest))
    }

    /// Base64url SHA-1 certificate thumbprint (JWS `x5t`).
    pub fn x5t(&self) -> WsFedResult<String> {
        let digest = self
            .certificate
            .digest(MessageDigest::sha1())
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Thumbprint failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    #[must_use]
    pub fn subject_dn(&self) -> String {
        subject_dn(&self.certificate)
    }

    pub fn not_before(&self) -> WsFedResult<DateTime<Utc>> {
        asn1_to_utc(self.certificate.not_before())
    }

    pub fn not_after(&self) -> WsFedResult<DateTime<Utc>> {
        asn1_to_utc(self.certificate.not_after())
    }

    /// Sign `data` with PKCS#1 v1.5 padding.
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> WsFedResult<Vec<u8>> {
        let mut signer = Signer::new(algorithm.message_digest(), &self.private_key)
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("Signer init failed: {e}")))?;
        signer
            .update(data)
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("Signing failed: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("Signing failed: {e}")))
    }

    /// Verify a signature against this certificate's public key.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> WsFedResult<bool> {
        let public_key = self
            .certificate
            .public_key()
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid public key: {e}")))?;
        let mut verifier = Verifier::new(algorithm.message_digest(), &public_key)
            .map_err(|e| WsFedError::Internal(format!("Verifier init failed: {e}")))?;
        verifier
            .update(data)
            .map_err(|e| WsFedError::Internal(format!("Verification failed: {e}")))?;
        verifier
            .verify(signature)
            .map_err(|e| WsFedError::Internal(format!("Verification failed: {e}")))
    }

    /// `jsonwebtoken` key built from the PKCS#1 DER private key.
    pub fn jwt_encoding_key(&self) -> WsFedResult<jsonwebtoken::EncodingKey> {
        let der = self
            .private_key
            .rsa()
            .and_then(|rsa| rsa.private_key_to_der())
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Private key export failed: {e}")))?;
        Ok(jsonwebtoken::EncodingKey::from_rsa_der(&der))
    }

    /// `jsonwebtoken` verification key from the certificate.
    pub fn jwt_decoding_key(&self) -> WsFedResult<jsonwebtoken::DecodingKey> {
        let der = self
            .certificate
            .public_key()
            .and_then(|key| key.rsa())
            .and_then(|rsa| rsa.public_key_to_der_pkcs1())
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Public key export failed: {e}")))?;
        Ok(jsonwebtoken::DecodingKey::from_rsa_der(&der))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::SigningCredentials;
    use openssl::asn1::Asn1Time;
    use openssl::bn::{BigNum, MsbOption};
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509NameBuilder, X509};

    /// Self-signed certificate and key PEMs valid from `from` for `days`.
    pub fn generate_pem(cn: &str, from: i64, days: u32) -> (String, String) {
        let rsa = Rsa::generate(2048).unwrap();
        let pkey = PKey::from_rsa(rsa).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix(from).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(from + i64::from(days) * 86_400).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        (
            String::from_utf8(cert.to_pem().unwrap()).unwrap(),
            String::from_utf8(pkey.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        )
    }

    pub fn credentials(cn: &str) -> SigningCredentials {
        let (cert, key) = generate_pem(cn, 1_700_000_000, 3650);
        SigningCredentials::from_pem(&cert, &key).unwrap()
    }
}
