//! URL normalization and scope classification.
//!
//! Every URL that enters the frontier goes through [`normalize`] first, so
//! two spellings of the same page always dedupe to an identical string:
//! scheme and host lowercased, trailing slash stripped (root path kept as
//! `/`), query preserved verbatim, fragment dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// The top-level label that marks a URL as in-scope for the crawl.
const ONION_SUFFIX: &str = ".onion";

/// A URL in canonical form, used as the dedup key everywhere.
///
/// Only [`normalize`] constructs these, so holding a `NormalizedUrl` means
/// the canonicalization policy has already been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Host portion of the URL, if it parses back cleanly.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// True iff the host ends with the onion top-level label.
    #[must_use]
    pub fn is_in_scope(&self) -> bool {
        self.host().is_some_and(|h| h.ends_with(ONION_SUFFIX))
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a raw URL string.
///
/// A missing scheme is patched up with `http://` before parsing, matching
/// how seed lists are usually written. Malformed input yields `None` and is
/// treated as out-of-scope by callers; this function never fails loudly.
#[must_use]
pub fn normalize(raw: &str) -> Option<NormalizedUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Bare hosts from seed lists get an http:// scheme; anything that
    // parses with a non-http scheme (mailto:, tel:, javascript:) is out
    // of scope and normalizes to nothing.
    let url = match Url::parse(raw) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        Ok(_) => return None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{raw}")).ok()?
        }
        Err(_) => return None,
    };
    url.host_str()?;

    // The url crate already lowercases scheme and host during parsing.
    let mut canonical = format!("{}://{}", url.scheme(), url.host_str()?);
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{port}"));
    }

    let path = url.path();
    if path == "/" || path.is_empty() {
        canonical.push('/');
    } else {
        canonical.push_str(path.trim_end_matches('/'));
    }

    if let Some(query) = url.query() {
        canonical.push('?');
        canonical.push_str(query);
    }

    Some(NormalizedUrl(canonical))
}

/// Scope check on a raw string, tolerating malformed input.
#[must_use]
pub fn is_in_scope(raw: &str) -> bool {
    normalize(raw).is_some_and(|u| u.is_in_scope())
}

/// Standard base+relative URL joining. `None` when the result is unusable.
#[must_use]
pub fn resolve(base: &Url, relative: &str) -> Option<Url> {
    base.join(relative).ok()
}

/// Extract the host for shard-directory naming. Empty-host URLs yield `None`.
#[must_use]
pub fn domain_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
