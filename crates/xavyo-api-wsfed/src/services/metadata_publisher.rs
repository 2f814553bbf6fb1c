//! Federation metadata for relying parties.
//!
//! The document lists every signing key that has not expired, including
//! keys whose window has not started yet, so relying parties can pick up a
//! rollover key before it signs anything. Documents are cached per
//! key-material version with a short TTL; the TTL also covers a key
//! crossing its validity boundary without the version changing.

use crate::error::{WsFedError, WsFedResult};
use crate::services::key_provider::{KeyMaterialProvider, PublishedKey};
use crate::services::signin_generator::SignInState;
use crate::services::token_builder::sign_enveloped;
use crate::wsfed::protocol::{NS_DSIG, NS_FED, NS_METADATA, NS_WS_ADDRESSING, NS_XSI};
use crate::wsfed::xml::xml_escape;
use crate::wsfed::{token_type_uri, DigestAlgorithm, SignatureAlgorithm};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use xavyo_core::SharedClock;
use xavyo_db::models::TokenType;

/// Well-known metadata path.
pub const METADATA_PATH: &str = "/FederationMetadata/2007-06/FederationMetadata.xml";

/// Default time-to-live for cached documents (seconds).
pub const DEFAULT_METADATA_CACHE_SECONDS: u64 = 60;

const OFFERED_TOKEN_TYPES: [TokenType; 3] = [TokenType::Saml20, TokenType::Saml11, TokenType::Jwt];

/// A rendered metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    pub entity_id: String,
    pub xml: String,
    /// Published signing keys, ordered by `not_before`.
    pub key_ids: Vec<String>,
    /// Whether the document carries an enveloped signature.
    pub signed: bool,
}

pub struct MetadataPublisher {
    issuer: String,
    passive_endpoint: String,
    key_provider: Arc<dyn KeyMaterialProvider>,
    clock: SharedClock,
    cache: Cache<u64, Arc<MetadataDocument>>,
}

impl MetadataPublisher {
    pub fn new(
        issuer: impl Into<String>,
        passive_endpoint: impl Into<String>,
        key_provider: Arc<dyn KeyMaterialProvider>,
        clock: SharedClock,
        ttl: Duration,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            passive_endpoint: passive_endpoint.into(),
            key_provider,
            clock,
            cache: Cache::builder().max_capacity(8).time_to_live(ttl).build(),
        }
    }

    /// Current metadata document, from cache when the key set is unchanged.
    pub async fn publish(&self) -> WsFedResult<Arc<MetadataDocument>> {
        let version = self
            .key_provider
            .material_version()
            .await
            .map_err(|e| WsFedError::collaborator(SignInState::KeyResolved, e))?;

        if let Some(document) = self.cache.get(&version).await {
            return Ok(document);
        }

        let document = Arc::new(self.render().await?);
        self.cache.insert(version, document.clone()).await;

        tracing::info!(
            material_version = version,
            keys = document.key_ids.len(),
            signed = document.signed,
            "Federation metadata rendered"
        );
        Ok(document)
    }

    async fn render(&self) -> WsFedResult<MetadataDocument> {
        let now = self.clock.now();
        let keys = self
            .key_provider
            .published_signing_keys(now)
            .await
            .map_err(|e| WsFedError::collaborator(SignInState::KeyResolved, e))?;
        let signing_key = self
            .key_provider
            .current_signing_key(now)
            .await
            .map_err(|e| WsFedError::collaborator(SignInState::KeyResolved, e))?;

        let entity_descriptor_id = entity_descriptor_id(&self.issuer);
        let xml = self.entity_descriptor(&entity_descriptor_id, &keys);

        let (xml, signed) = match signing_key {
            Some(key) => {
                let (signature_xml, _) = sign_enveloped(
                    &xml,
                    &entity_descriptor_id,
                    SignatureAlgorithm::RsaSha256,
                    DigestAlgorithm::Sha256,
                    &key,
                )?;
                // ds:Signature is the first child of EntityDescriptor.
                let insert_at = xml.find('>').map(|pos| pos + 1).ok_or_else(|| {
                    WsFedError::TokenSerializationFailed("Malformed metadata".to_string())
                })?;
                let mut signed_xml = String::with_capacity(xml.len() + signature_xml.len());
                signed_xml.push_str(&xml[..insert_at]);
                signed_xml.push_str(&signature_xml);
                signed_xml.push_str(&xml[insert_at..]);
                (signed_xml, true)
            }
            None => {
                tracing::warn!("No current signing key, publishing unsigned metadata");
                (xml, false)
            }
        };

        Ok(MetadataDocument {
            entity_id: self.issuer.clone(),
            xml,
            key_ids: keys.into_iter().map(|k| k.key_id).collect(),
            signed,
        })
    }

    fn entity_descriptor(&self, id: &str, keys: &[PublishedKey]) -> String {
        let mut xml = String::new();
        xml.push_str(&format!(
            r#"<md:EntityDescriptor xmlns:md="{NS_METADATA}" ID="{id}" entityID="{}">"#,
            xml_escape(&self.issuer)
        ));
        xml.push_str(&format!(
            r#"<md:RoleDescriptor xmlns:xsi="{NS_XSI}" xmlns:fed="{NS_FED}" xsi:type="fed:SecurityTokenServiceType" protocolSupportEnumeration="{NS_FED}">"#
        ));

        for key in keys {
            xml.push_str(r#"<md:KeyDescriptor use="signing">"#);
            xml.push_str(&format!(r#"<ds:KeyInfo xmlns:ds="{NS_DSIG}">"#));
            xml.push_str("<ds:X509Data><ds:X509Certificate>");
            xml.push_str(&key.certificate_base64);
            xml.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo>");
            xml.push_str("</md:KeyDescriptor>");
        }

        xml.push_str("<fed:TokenTypesOffered>");
        for token_type in OFFERED_TOKEN_TYPES {
            xml.push_str(&format!(
                r#"<fed:TokenType Uri="{}"/>"#,
                token_type_uri(token_type)
            ));
        }
        xml.push_str("</fed:TokenTypesOffered>");

        xml.push_str("<fed:PassiveRequestorEndpoint>");
        xml.push_str(&format!(
            r#"<wsa:EndpointReference xmlns:wsa="{NS_WS_ADDRESSING}"><wsa:Address>{}</wsa:Address></wsa:EndpointReference>"#,
            xml_escape(&self.passive_endpoint)
        ));
        xml.push_str("</fed:PassiveRequestorEndpoint>");

        xml.push_str("</md:RoleDescriptor>");
        xml.push_str("</md:EntityDescriptor>");
        xml
    }
}

/// Stable XML ID for the issuer's `EntityDescriptor`.
fn entity_descriptor_id(issuer: &str) -> String {
    let digest = openssl::sha::sha256(issuer.as_bytes());
    format!("_{}", hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::key_provider::{InMemoryKeyMaterialProvider, SigningKey};
    use crate::wsfed::signing::test_support::generate_pem;
    use crate::wsfed::SigningCredentials;
    use chrono::{TimeZone, Utc};
    use xavyo_core::FixedClock;

    fn key(cn: &str, from: i64, days: u32) -> SigningKey {
        let (cert, pem) = generate_pem(cn, from, days);
        SigningKey::from_credentials(SigningCredentials::from_pem(&cert, &pem).unwrap()).unwrap()
    }

    fn publisher(keys: Arc<InMemoryKeyMaterialProvider>) -> MetadataPublisher {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        MetadataPublisher::new(
            "https://idp.example",
            "https://idp.example/wsfed",
            keys,
            clock,
            Duration::from_secs(DEFAULT_METADATA_CACHE_SECONDS),
        )
    }

    #[tokio::test]
    async fn test_publishes_current_and_rollover_keys() {
        // 2024-01-01, valid one year; 2024-09-01 onward (future); expired 2020 key.
        let current = key("current", 1_704_067_200, 365);
        let next = key("next", 1_725_148_800, 365);
        let expired = key("expired", 1_600_000_000, 1);
        let keys = Arc::new(InMemoryKeyMaterialProvider::with_keys(vec![
            next.clone(),
            expired.clone(),
            current.clone(),
        ]));

        let doc = publisher(keys).publish().await.unwrap();
        assert_eq!(doc.key_ids, vec![current.key_id.clone(), next.key_id.clone()]);
        assert!(!doc.key_ids.contains(&expired.key_id));
        assert!(doc.signed);
        assert!(doc.xml.contains(r#"entityID="https://idp.example""#));
        assert!(doc.xml.contains("xsi:type=\"fed:SecurityTokenServiceType\""));
        assert!(doc
            .xml
            .contains("<wsa:Address>https://idp.example/wsfed</wsa:Address>"));
        assert_eq!(doc.xml.matches(r#"<md:KeyDescriptor use="signing">"#).count(), 2);
    }

    #[tokio::test]
    async fn test_output_is_deterministic_and_cached() {
        let keys = Arc::new(InMemoryKeyMaterialProvider::with_keys(vec![key(
            "current",
            1_704_067_200,
            365,
        )]));
        let publisher = publisher(keys.clone());

        let first = publisher.publish().await.unwrap();
        let second = publisher.publish().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        keys.add_signing_key(key("next", 1_725_148_800, 365)).await;
        let third = publisher.publish().await.unwrap();
        assert_eq!(third.key_ids.len(), 2);
        assert_eq!(entity_descriptor_id("https://idp.example").len(), 33);
        assert!(third.xml.contains(&format!(
            r#"ID="{}""#,
            entity_descriptor_id("https://idp.example")
        )));
    }

    #[tokio::test]
    async fn test_unsigned_without_current_key() {
        let keys = Arc::new(InMemoryKeyMaterialProvider::with_keys(vec![key(
            "next",
            1_725_148_800,
            365,
        )]));
        let doc = publisher(keys).publish().await.unwrap();
        assert!(!doc.signed);
        assert_eq!(doc.key_ids.len(), 1);
        assert!(!doc.xml.contains("<ds:Signature"));
    }
}
