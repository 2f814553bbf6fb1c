//! Token encryption for relying parties that register an encrypting
//! certificate.
//!
//! XML tokens become an XML-Encryption `EncryptedData` element; JWTs become a
//! compact JWE. Both use a fresh AES-256-GCM content key wrapped with
//! RSA-OAEP under the relying party's public key.

use crate::error::{WsFedError, WsFedResult};
use crate::wsfed::protocol::{NS_DSIG, NS_XENC};
use crate::wsfed::signing::{asn1_to_utc, certificate_base64_der, parse_certificate};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Utc};
use openssl::pkey::{PKey, Public};
use openssl::rand::rand_bytes;
use openssl::rsa::Padding;
use openssl::symm::{encrypt_aead, Cipher};
use openssl::x509::X509;

const AES_256_GCM_URI: &str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";
const RSA_OAEP_URI: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
const SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const ELEMENT_TYPE_URI: &str = "http://www.w3.org/2001/04/xmlenc#Element";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A relying party's encryption certificate.
#[derive(Clone)]
pub struct EncryptingCertificate {
    certificate: X509,
    public_key: PKey<Public>,
}

impl std::fmt::Debug for EncryptingCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingCertificate")
            .field("subject", &crate::wsfed::signing::subject_dn(&self.certificate))
            .finish()
    }
}

struct SealedContent {
    wrapped_key: Vec<u8>,
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

impl EncryptingCertificate {
    pub fn from_pem(pem: &str) -> WsFedResult<Self> {
        let certificate = parse_certificate(pem)?;
        let public_key = certificate
            .public_key()
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid public key: {e}")))?;
        if public_key.rsa().is_err() {
            return Err(WsFedError::InvalidKeyMaterial(
                "Encrypting certificate must carry an RSA key".to_string(),
            ));
        }
        Ok(Self {
            certificate,
            public_key,
        })
    }

    /// Whether the certificate's validity window contains `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> WsFedResult<bool> {
        let not_before = asn1_to_utc(self.certificate.not_before())?;
        let not_after = asn1_to_utc(self.certificate.not_after())?;
        Ok(not_before <= at && at < not_after)
    }

    /// Encrypt a serialized XML element into an `xenc:EncryptedData` element.
    pub fn encrypt_xml(&self, element: &str) -> WsFedResult<String> {
        let sealed = self.seal(element.as_bytes(), &[])?;
        let certificate = certificate_base64_der(&self.certificate)?;

        let mut cipher_value =
            Vec::with_capacity(IV_LEN + sealed.ciphertext.len() + TAG_LEN);
        cipher_value.extend_from_slice(&sealed.iv);
        cipher_value.extend_from_slice(&sealed.ciphertext);
        cipher_value.extend_from_slice(&sealed.tag);

        let mut xml = String::new();
        xml.push_str(&format!(
            r#"<xenc:EncryptedData xmlns:xenc="{NS_XENC}" Type="{ELEMENT_TYPE_URI}">"#
        ));
        xml.push_str(&format!(
            r#"<xenc:EncryptionMethod Algorithm="{AES_256_GCM_URI}"/>"#
        ));
        xml.push_str(&format!(r#"<ds:KeyInfo xmlns:ds="{NS_DSIG}">"#));
        xml.push_str("<xenc:EncryptedKey>");
        xml.push_str(&format!(
            r#"<xenc:EncryptionMethod Algorithm="{RSA_OAEP_URI}"><ds:DigestMethod Algorithm="{SHA1_URI}"/></xenc:EncryptionMethod>"#
        ));
        xml.push_str("<ds:KeyInfo><ds:X509Data><ds:X509Certificate>");
        xml.push_str(&certificate);
        xml.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo>");
        xml.push_str("<xenc:CipherData><xenc:CipherValue>");
        xml.push_str(&STANDARD.encode(&sealed.wrapped_key));
        xml.push_str("</xenc:CipherValue></xenc:CipherData>");
        xml.push_str("</xenc:EncryptedKey>");
        xml.push_str("</ds:KeyInfo>");
        xml.push_str("<xenc:CipherData><xenc:CipherValue>");
        xml.push_str(&STANDARD.encode(&cipher_value));
        xml.push_str("</xenc:CipherValue></xenc:CipherData>");
        xml.push_str("</xenc:EncryptedData>");
        Ok(xml)
    }

    /// Wrap a signed compact JWT in a compact JWE (`RSA-OAEP` / `A256GCM`).
    pub fn encrypt_jwe(&self, jwt: &str, kid: Option<&str>) -> WsFedResult<String> {
        let mut header = serde_json::json!({
            "alg": "RSA-OAEP",
            "enc": "A256GCM",
            "cty": "JWT",
            "typ": "JWT",
        });
        if let Some(kid) = kid {
            header["kid"] = serde_json::Value::String(kid.to_string());
        }
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("JWE header: {e}")))?;
        let protected = URL_SAFE_NO_PAD.encode(header_json);

        let sealed = self.seal(jwt.as_bytes(), protected.as_bytes())?;

        Ok(format!(
            "{}.{}.{}.{}.{}",
            protected,
            URL_SAFE_NO_PAD.encode(&sealed.wrapped_key),
            URL_SAFE_NO_PAD.encode(sealed.iv),
            URL_SAFE_NO_PAD.encode(&sealed.ciphertext),
            URL_SAFE_NO_PAD.encode(sealed.tag),
        ))
    }

    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> WsFedResult<SealedContent> {
        let mut content_key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        rand_bytes(&mut content_key)
            .and_then(|()| rand_bytes(&mut iv))
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("RNG failed: {e}")))?;

        let mut tag = [0u8; TAG_LEN];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            &content_key,
            Some(&iv),
            aad,
            plaintext,
            &mut tag,
        )
        .map_err(|e| WsFedError::TokenSerializationFailed(format!("Encryption failed: {e}")))?;

        let rsa = self
            .public_key
            .rsa()
            .map_err(|e| WsFedError::InvalidKeyMaterial(format!("Invalid public key: {e}")))?;
        let mut wrapped_key = vec![0u8; rsa.size() as usize];
        let len = rsa
            .public_encrypt(&content_key, &mut wrapped_key, Padding::PKCS1_OAEP)
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("Key wrap failed: {e}")))?;
        wrapped_key.truncate(len);

        Ok(SealedContent {
            wrapped_key,
            iv,
            ciphertext,
            tag,
        })
    }
}
