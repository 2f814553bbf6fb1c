//! Security token construction: SAML 1.1 and SAML 2.0 assertions with
//! enveloped XML signatures, and RS-signed JWTs.
//!
//! The builder never reads a clock. Every instant comes from the
//! [`TokenRequest`].

use crate::error::{WsFedError, WsFedResult};
use crate::models::principal::AUTHN_METHOD_PASSWORD;
use crate::models::SecurityToken;
use crate::services::key_provider::SigningKey;
use crate::wsfed::encryption::EncryptingCertificate;
use crate::wsfed::protocol::{NS_DSIG, NS_SAML11, NS_SAML20};
use crate::wsfed::signing::{DigestAlgorithm, SignatureAlgorithm};
use crate::wsfed::xml::{canonicalize, format_instant, xml_escape};
use crate::wsfed::Claim;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use xavyo_db::models::TokenType;

const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const NAMEID_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";
const CM_BEARER_SAML11: &str = "urn:oasis:names:tc:SAML:1.0:cm:bearer";
const CM_BEARER_SAML20: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
const AC_CLASS_PREFIX_PASSWORD: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:Password";

/// Registered JWT claim names that issued claims may not overwrite.
const RESERVED_JWT_CLAIMS: &[&str] = &["iss", "aud", "sub", "iat", "nbf", "exp", "jti", "auth_time"];

/// Everything needed to issue one token.
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    pub issuer: &'a str,
    pub audience: &'a str,
    pub subject: &'a str,
    pub claims: &'a [Claim],
    pub authentication_method: &'a str,
    pub authenticated_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub not_on_or_after: DateTime<Utc>,
    pub token_type: TokenType,
    pub signature_algorithm: SignatureAlgorithm,
    pub digest_algorithm: DigestAlgorithm,
}

/// Builds signed (and optionally encrypted) security tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBuilder;

struct Signed {
    serialized: String,
    signature: String,
}

impl TokenBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Issue a token for `request.audience` signed with `signing_key`.
    ///
    /// When `encrypting_key` is given only the encrypted form is returned.
    pub fn build(
        &self,
        request: &TokenRequest<'_>,
        signing_key: &SigningKey,
        encrypting_key: Option<&EncryptingCertificate>,
    ) -> WsFedResult<SecurityToken> {
        if request.not_before >= request.not_on_or_after {
            return Err(WsFedError::TokenSerializationFailed(
                "Token validity window is empty".to_string(),
            ));
        }
        if !signing_key.is_valid_at(request.issued_at) {
            return Err(WsFedError::SigningKeyUnavailable {
                at: request.issued_at,
            });
        }

        let token_id = match request.token_type {
            TokenType::Jwt => Uuid::new_v4().to_string(),
            TokenType::Saml11 | TokenType::Saml20 => format!("_{}", Uuid::new_v4()),
        };

        let signed = match request.token_type {
            TokenType::Saml11 => self.build_saml11(request, &token_id, signing_key)?,
            TokenType::Saml20 => self.build_saml20(request, &token_id, signing_key)?,
            TokenType::Jwt => self.build_jwt(request, &token_id, signing_key)?,
        };

        let (serialized, encrypted) = match encrypting_key {
            None => (signed.serialized, false),
            Some(cert) => {
                let wrapped = match request.token_type {
                    TokenType::Saml20 => format!(
                        r#"<saml:EncryptedAssertion xmlns:saml="{NS_SAML20}">{}</saml:EncryptedAssertion>"#,
                        cert.encrypt_xml(&signed.serialized)?
                    ),
                    TokenType::Saml11 => cert.encrypt_xml(&signed.serialized)?,
                    TokenType::Jwt => cert.encrypt_jwe(&signed.serialized, None)?,
                };
                (wrapped, true)
            }
        };

        let claims = emitted_claims(request.claims, request.token_type);

        tracing::debug!(
            token_id = %token_id,
            audience = %request.audience,
            token_type = %request.token_type.as_str(),
            key_id = %signing_key.key_id,
            encrypted,
            "Security token built"
        );

        Ok(SecurityToken {
            token_id,
            token_type: request.token_type,
            issuer: request.issuer.to_string(),
            audience: request.audience.to_string(),
            subject: request.subject.to_string(),
            not_before: request.not_before,
            not_on_or_after: request.not_on_or_after,
            claims,
            signature: signed.signature,
            signing_key_id: signing_key.key_id.clone(),
            serialized,
            encrypted,
        })
    }

    fn build_saml20(
        &self,
        request: &TokenRequest<'_>,
        assertion_id: &str,
        signing_key: &SigningKey,
    ) -> WsFedResult<Signed> {
        let mut xml = String::new();
        xml.push_str(&format!(
            r#"<saml:Assertion xmlns:saml="{NS_SAML20}" ID="{}" Version="2.0" IssueInstant="{}">"#,
            assertion_id,
            format_instant(request.issued_at)
        ));
        xml.push_str("<saml:Issuer>");
        xml.push_str(&xml_escape(request.issuer));
        xml.push_str("</saml:Issuer>");

        xml.push_str("<saml:Subject>");
        xml.push_str(&format!(
            r#"<saml:NameID Format="{NAMEID_UNSPECIFIED}">{}</saml:NameID>"#,
            xml_escape(request.subject)
        ));
        xml.push_str(&format!(
            r#"<saml:SubjectConfirmation Method="{CM_BEARER_SAML20}"><saml:SubjectConfirmationData NotOnOrAfter="{}"/></saml:SubjectConfirmation>"#,
            format_instant(request.not_on_or_after)
        ));
        xml.push_str("</saml:Subject>");

        xml.push_str(&format!(
            r#"<saml:Conditions NotBefore="{}" NotOnOrAfter="{}">"#,
            format_instant(request.not_before),
            format_instant(request.not_on_or_after)
        ));
        xml.push_str("<saml:AudienceRestriction><saml:Audience>");
        xml.push_str(&xml_escape(request.audience));
        xml.push_str("</saml:Audience></saml:AudienceRestriction>");
        xml.push_str("</saml:Conditions>");

        let grouped = group_claims(request.claims);
        if !grouped.is_empty() {
            xml.push_str("<saml:AttributeStatement>");
            for (claim, values) in &grouped {
                xml.push_str(&format!(
                    r#"<saml:Attribute Name="{}">"#,
                    xml_escape(&claim.claim_type)
                ));
                for value in values {
                    xml.push_str("<saml:AttributeValue>");
                    xml.push_str(&xml_escape(value));
                    xml.push_str("</saml:AttributeValue>");
                }
                xml.push_str("</saml:Attribute>");
            }
            xml.push_str("</saml:AttributeStatement>");
        }

        xml.push_str(&format!(
            r#"<saml:AuthnStatement AuthnInstant="{}"><saml:AuthnContext><saml:AuthnContextClassRef>{}</saml:AuthnContextClassRef></saml:AuthnContext></saml:AuthnStatement>"#,
            format_instant(request.authenticated_at),
            xml_escape(request.authentication_method)
        ));
        xml.push_str("</saml:Assertion>");

        let (signature_xml, signature) = sign_enveloped(
            &xml,
            assertion_id,
            request.signature_algorithm,
            request.digest_algorithm,
            signing_key,
        )?;

        // Schema order puts ds:Signature directly after saml:Issuer.
        let after_issuer = xml
            .find("</saml:Issuer>")
            .map(|pos| pos + "</saml:Issuer>".len())
            .ok_or_else(|| WsFedError::TokenSerializationFailed("Cannot find Issuer".to_string()))?;

        let mut result = String::with_capacity(xml.len() + signature_xml.len());
        result.push_str(&xml[..after_issuer]);
        result.push_str(&signature_xml);
        result.push_str(&xml[after_issuer..]);

        Ok(Signed {
            serialized: result,
            signature,
        })
    }

    fn build_saml11(
        &self,
        request: &TokenRequest<'_>,
        assertion_id: &str,
        signing_key: &SigningKey,
    ) -> WsFedResult<Signed> {
        let subject = format!(
            "<saml:Subject><saml:NameIdentifier Format=\"{NAMEID_UNSPECIFIED}\">{}</saml:NameIdentifier><saml:SubjectConfirmation><saml:ConfirmationMethod>{CM_BEARER_SAML11}</saml:ConfirmationMethod></saml:SubjectConfirmation></saml:Subject>",
            xml_escape(request.subject)
        );

        let mut xml = String::new();
        xml.push_str(&format!(
            r#"<saml:Assertion xmlns:saml="{NS_SAML11}" MajorVersion="1" MinorVersion="1" AssertionID="{}" Issuer="{}" IssueInstant="{}">"#,
            assertion_id,
            xml_escape(request.issuer),
            format_instant(request.issued_at)
        ));

        xml.push_str(&format!(
            r#"<saml:Conditions NotBefore="{}" NotOnOrAfter="{}">"#,
            format_instant(request.not_before),
            format_instant(request.not_on_or_after)
        ));
        xml.push_str("<saml:AudienceRestrictionCondition><saml:Audience>");
        xml.push_str(&xml_escape(request.audience));
        xml.push_str("</saml:Audience></saml:AudienceRestrictionCondition>");
        xml.push_str("</saml:Conditions>");

        let grouped = group_claims(request.claims);
        if !grouped.is_empty() {
            xml.push_str("<saml:AttributeStatement>");
            xml.push_str(&subject);
            for (claim, values) in &grouped {
                let (namespace, name) = claim.split_type();
                xml.push_str(&format!(
                    r#"<saml:Attribute AttributeName="{}" AttributeNamespace="{}">"#,
                    xml_escape(name),
                    xml_escape(namespace)
                ));
                for value in values {
                    xml.push_str("<saml:AttributeValue>");
                    xml.push_str(&xml_escape(value));
                    xml.push_str("</saml:AttributeValue>");
                }
                xml.push_str("</saml:Attribute>");
            }
            xml.push_str("</saml:AttributeStatement>");
        }

        xml.push_str(&format!(
            r#"<saml:AuthenticationStatement AuthenticationMethod="{}" AuthenticationInstant="{}">"#,
            xml_escape(saml11_authentication_method(request.authentication_method)),
            format_instant(request.authenticated_at)
        ));
        xml.push_str(&subject);
        xml.push_str("</saml:AuthenticationStatement>");
        xml.push_str("</saml:Assertion>");

        let (signature_xml, signature) = sign_enveloped(
            &xml,
            assertion_id,
            request.signature_algorithm,
            request.digest_algorithm,
            signing_key,
        )?;

        // SAML 1.1 places ds:Signature last.
        let end = xml
            .rfind("</saml:Assertion>")
            .ok_or_else(|| WsFedError::TokenSerializationFailed("Cannot find Assertion end".to_string()))?;

        let mut result = String::with_capacity(xml.len() + signature_xml.len());
        result.push_str(&xml[..end]);
        result.push_str(&signature_xml);
        result.push_str(&xml[end..]);

        Ok(Signed {
            serialized: result,
            signature,
        })
    }

    fn build_jwt(
        &self,
        request: &TokenRequest<'_>,
        jti: &str,
        signing_key: &SigningKey,
    ) -> WsFedResult<Signed> {
        let algorithm = request.signature_algorithm.jwt_algorithm()?;
        let credentials = &signing_key.credentials;

        let mut header = jsonwebtoken::Header::new(algorithm);
        header.kid = Some(signing_key.key_id.clone());
        header.x5t = Some(credentials.x5t()?);

        let mut payload = serde_json::Map::new();
        payload.insert("iss".into(), request.issuer.into());
        payload.insert("aud".into(), request.audience.into());
        payload.insert("sub".into(), request.subject.into());
        payload.insert("iat".into(), request.issued_at.timestamp().into());
        payload.insert("nbf".into(), request.not_before.timestamp().into());
        payload.insert("exp".into(), request.not_on_or_after.timestamp().into());
        payload.insert("jti".into(), jti.into());
        payload.insert("auth_time".into(), request.authenticated_at.timestamp().into());

        for (claim, values) in group_claims(request.claims) {
            let claim_type = claim.claim_type.as_str();
            if is_reserved_jwt_claim(claim_type) {
                tracing::debug!(claim_type = %claim_type, "Skipping claim that shadows a registered JWT claim");
                continue;
            }
            let value = match values.as_slice() {
                [single] => serde_json::Value::from(*single),
                many => serde_json::Value::from(many.to_vec()),
            };
            payload.insert(claim_type.to_string(), value);
        }

        let token = jsonwebtoken::encode(&header, &payload, &credentials.jwt_encoding_key()?)
            .map_err(|e| WsFedError::TokenSerializationFailed(format!("JWT encoding failed: {e}")))?;
        let signature = token.rsplit('.').next().unwrap_or_default().to_string();

        Ok(Signed {
            serialized: token,
            signature,
        })
    }
}

/// Build an enveloped `ds:Signature` over the element whose ID is
/// `reference_id`. Returns the signature element and its base64 value.
pub(crate) fn sign_enveloped(
    element: &str,
    reference_id: &str,
    signature_algorithm: SignatureAlgorithm,
    digest_algorithm: DigestAlgorithm,
    signing_key: &SigningKey,
) -> WsFedResult<(String, String)> {
    let canonical = canonicalize(element)?;
    let digest = digest_algorithm.digest_base64(canonical.as_bytes())?;

    let mut signed_info = String::new();
    signed_info.push_str(&format!(r#"<ds:SignedInfo xmlns:ds="{NS_DSIG}">"#));
    signed_info.push_str(&format!(r#"<ds:CanonicalizationMethod Algorithm="{EXC_C14N}"/>"#));
    signed_info.push_str(&format!(
        r#"<ds:SignatureMethod Algorithm="{}"/>"#,
        signature_algorithm.uri()
    ));
    signed_info.push_str(&format!(r##"<ds:Reference URI="#{reference_id}">"##));
    signed_info.push_str("<ds:Transforms>");
    signed_info.push_str(&format!(r#"<ds:Transform Algorithm="{ENVELOPED_SIGNATURE}"/>"#));
    signed_info.push_str(&format!(r#"<ds:Transform Algorithm="{EXC_C14N}"/>"#));
    signed_info.push_str("</ds:Transforms>");
    signed_info.push_str(&format!(
        r#"<ds:DigestMethod Algorithm="{}"/>"#,
        digest_algorithm.uri()
    ));
    signed_info.push_str("<ds:DigestValue>");
    signed_info.push_str(&digest);
    signed_info.push_str("</ds:DigestValue>");
    signed_info.push_str("</ds:Reference>");
    signed_info.push_str("</ds:SignedInfo>");

    let canonical_signed_info = canonicalize(&signed_info)?;
    let signature = signing_key
        .credentials
        .sign(signature_algorithm, canonical_signed_info.as_bytes())?;
    let signature_b64 = STANDARD.encode(signature);
    let certificate = signing_key.credentials.certificate_base64_der()?;

    let mut signature_xml = String::new();
    signature_xml.push_str(&format!(r#"<ds:Signature xmlns:ds="{NS_DSIG}">"#));
    signature_xml.push_str(&signed_info);
    signature_xml.push_str("<ds:SignatureValue>");
    signature_xml.push_str(&signature_b64);
    signature_xml.push_str("</ds:SignatureValue>");
    signature_xml.push_str("<ds:KeyInfo><ds:X509Data><ds:X509Certificate>");
    signature_xml.push_str(&certificate);
    signature_xml.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo>");
    signature_xml.push_str("</ds:Signature>");

    Ok((signature_xml, signature_b64))
}

fn is_reserved_jwt_claim(claim_type: &str) -> bool {
    RESERVED_JWT_CLAIMS.contains(&claim_type)
}

/// Claims that end up in the token body: JWTs never carry claims shadowing
/// a registered claim.
fn emitted_claims(claims: &[Claim], token_type: TokenType) -> Vec<Claim> {
    match token_type {
        TokenType::Jwt => claims
            .iter()
            .filter(|c| !is_reserved_jwt_claim(&c.claim_type))
            .cloned()
            .collect(),
        TokenType::Saml11 | TokenType::Saml20 => claims.to_vec(),
    }
}

/// Group claim values by type, in order of first appearance. Each group is
/// keyed by the first claim of its type.
fn group_claims(claims: &[Claim]) -> Vec<(&Claim, Vec<&str>)> {
    let mut grouped: Vec<(&Claim, Vec<&str>)> = Vec::new();
    for claim in claims {
        match grouped
            .iter_mut()
            .find(|(first, _)| first.claim_type == claim.claim_type)
        {
            Some((_, values)) => values.push(&claim.value),
            None => grouped.push((claim, vec![claim.value.as_str()])),
        }
    }
    grouped
}

/// SAML 1.1 has no authentication context classes; map password classes to
/// the 1.1 password method.
fn saml11_authentication_method(method: &str) -> &str {
    if method.starts_with(AC_CLASS_PREFIX_PASSWORD) {
        AUTHN_METHOD_PASSWORD
    } else {
        method
    }
}
