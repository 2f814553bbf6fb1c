//! Reply address policy.
//!
//! A requested `wreply` is accepted only if it equals a configured reply URL
//! exactly (case-sensitive, no normalization) or falls under a configured
//! wildcard entry. A wildcard entry ends in `*`; the text before it must be
//! an absolute URL with a path, and a candidate must share its scheme, host
//! and port and carry no userinfo or dot segments. Wildcards never extend
//! the host or climb out of the prefix path.

use crate::error::{WsFedError, WsFedResult};
use url::Url;
use xavyo_db::models::{RelyingParty, REPLY_URL_WILDCARD};

/// Whether `candidate` is allowed by any entry of `configured`.
#[must_use]
pub fn reply_url_matches(candidate: &str, configured: &[String]) -> bool {
    configured.iter().any(|entry| match entry.strip_suffix(REPLY_URL_WILDCARD) {
        Some(prefix) => wildcard_matches(candidate, prefix),
        None => entry == candidate,
    })
}

/// Whether a wildcard prefix (without the trailing `*`) is well-formed.
#[must_use]
pub fn is_valid_wildcard_prefix(prefix: &str) -> bool {
    wildcard_base(prefix).is_some()
}

fn wildcard_base(prefix: &str) -> Option<Url> {
    let (_, rest) = prefix.split_once("://")?;
    // Authority must be closed by a path separator.
    let authority_end = rest.find('/')?;
    if authority_end == 0 || rest[..authority_end].contains('@') {
        return None;
    }
    let base = Url::parse(prefix).ok()?;
    base.host_str()?;
    Some(base)
}

fn wildcard_matches(candidate: &str, prefix: &str) -> bool {
    let Some(base) = wildcard_base(prefix) else {
        tracing::warn!(pattern = %prefix, "Ignoring malformed wildcard reply URL");
        return false;
    };
    if !candidate.starts_with(prefix) || has_dot_segments(candidate) {
        return false;
    }
    let Ok(parsed) = Url::parse(candidate) else {
        return false;
    };
    // The parser also folds `\` into `/`; the resolved path must stay under
    // the prefix path.
    parsed.path().starts_with(base.path())
        && parsed.username().is_empty()
        && parsed.password().is_none()
        && parsed.scheme() == base.scheme()
        && parsed.host_str() == base.host_str()
        && parsed.port_or_known_default() == base.port_or_known_default()
}

/// Whether the path of `candidate` has a `.` or `..` segment, plain or
/// percent-encoded.
fn has_dot_segments(candidate: &str) -> bool {
    let after_scheme = candidate
        .split_once("://")
        .map_or(candidate, |(_, rest)| rest);
    let Some(path_start) = after_scheme.find('/') else {
        return false;
    };
    let path = &after_scheme[path_start..];
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split(['/', '\\']).any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

/// Pick the reply target for a sign-in: the requested `wreply` if allowed,
/// otherwise the party's default, otherwise the registry-wide default.
pub fn resolve_reply(
    relying_party: &RelyingParty,
    requested: Option<&str>,
    registry_default: Option<&str>,
) -> WsFedResult<String> {
    match requested {
        Some(reply) => {
            if reply_url_matches(reply, &relying_party.reply_urls) {
                Ok(reply.to_string())
            } else {
                Err(WsFedError::InvalidReplyUrl {
                    realm: relying_party.realm.clone(),
                    reply: reply.to_string(),
                })
            }
        }
        None => relying_party
            .default_reply()
            .or(registry_default)
            .map(str::to_string)
            .ok_or_else(|| WsFedError::InvalidReplyUrl {
                realm: relying_party.realm.clone(),
                reply: String::new(),
            }),
    }
}
