//! WS-Federation passive requestor vocabulary.

use xavyo_db::models::TokenType;

/// Canonical sign-in action.
pub const WA_SIGNIN: &str = "wsignin1.0";
/// Short sign-in alias some relying parties send.
pub const WA_SIGNIN_SHORT: &str = "signin1.0";
pub const WA_SIGNOUT: &str = "wsignout1.0";
pub const WA_SIGNOUT_CLEANUP: &str = "wsignoutcleanup1.0";

/// Upper bound on the opaque `wctx` echo.
pub const MAX_CONTEXT_LENGTH: usize = 4096;
/// Upper bound on `wreply`.
pub const MAX_REPLY_LENGTH: usize = 2048;
/// Upper bound on `wtrealm`.
pub const MAX_REALM_LENGTH: usize = 1024;

pub const NS_WS_TRUST: &str = "http://schemas.xmlsoap.org/ws/2005/02/trust";
pub const NS_WS_POLICY: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";
pub const NS_WS_ADDRESSING: &str = "http://www.w3.org/2005/08/addressing";
pub const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const NS_FED: &str = "http://docs.oasis-open.org/wsfed/federation/200706";
pub const NS_METADATA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const NS_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const NS_XENC: &str = "http://www.w3.org/2001/04/xmlenc#";
pub const NS_SAML11: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
pub const NS_SAML20: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

pub const TOKEN_TYPE_SAML11: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
pub const TOKEN_TYPE_SAML20: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const TOKEN_TYPE_JWT: &str = "urn:ietf:params:oauth:token-type:jwt";

pub const REQUEST_TYPE_ISSUE: &str = "http://schemas.xmlsoap.org/ws/2005/02/trust/Issue";
pub const KEY_TYPE_BEARER: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/NoProofKey";
pub const ENCODING_BASE64: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// The `wa` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsFedAction {
    SignIn,
    SignOut,
    SignOutCleanup,
}

impl WsFedAction {
    #[must_use]
    pub fn parse(wa: &str) -> Option<Self> {
        match wa {
            WA_SIGNIN | WA_SIGNIN_SHORT => Some(Self::SignIn),
            WA_SIGNOUT => Some(Self::SignOut),
            WA_SIGNOUT_CLEANUP => Some(Self::SignOutCleanup),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => WA_SIGNIN,
            Self::SignOut => WA_SIGNOUT,
            Self::SignOutCleanup => WA_SIGNOUT_CLEANUP,
        }
    }
}

/// WS-Trust token type URI for a configured format.
#[must_use]
pub fn token_type_uri(token_type: TokenType) -> &'static str {
    match token_type {
        TokenType::Saml11 => TOKEN_TYPE_SAML11,
        TokenType::Saml20 => TOKEN_TYPE_SAML20,
        TokenType::Jwt => TOKEN_TYPE_JWT,
    }
}
