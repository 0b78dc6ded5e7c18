//! URL normalization invariants: equal-page spellings must produce
//! byte-identical canonical strings, and malformed input must classify as
//! out-of-scope without panicking.

use onioncrawl::urlnorm::{self, NormalizedUrl};
use proptest::prelude::*;

#[test]
fn scheme_case_host_case_trailing_slash_collapse() {
    let expect = urlnorm::normalize("http://example.onion/a/b").unwrap();
    for variant in [
        "HTTP://example.onion/a/b",
        "http://EXAMPLE.ONION/a/b",
        "http://example.onion/a/b/",
        "HtTp://Example.Onion/a/b/",
    ] {
        assert_eq!(urlnorm::normalize(variant).unwrap(), expect, "{variant}");
    }
}

#[test]
fn query_order_is_preserved_verbatim() {
    let a = urlnorm::normalize("http://example.onion/p?b=2&a=1").unwrap();
    let b = urlnorm::normalize("http://example.onion/p?a=1&b=2").unwrap();
    // No invariant is promised across differing query strings.
    assert_ne!(a, b);
    assert_eq!(a.as_str(), "http://example.onion/p?b=2&a=1");
}

#[test]
fn in_scope_iff_onion_host() {
    assert!(urlnorm::is_in_scope("http://x.onion"));
    assert!(urlnorm::is_in_scope("sub.domain.onion/path"));
    assert!(!urlnorm::is_in_scope("http://example.com"));
    assert!(!urlnorm::is_in_scope("http://onion.com"));
    assert!(!urlnorm::is_in_scope(""));
    assert!(!urlnorm::is_in_scope("::::"));
    assert!(!urlnorm::is_in_scope("javascript:void(0)"));
}

#[test]
fn normalization_is_idempotent() {
    let once = urlnorm::normalize("HTTP://Example.Onion/Dir/Page/?q=X#top").unwrap();
    let twice = urlnorm::normalize(once.as_str()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn resolve_joins_relative_against_base() {
    let base = url::Url::parse("http://example.onion/a/b").unwrap();
    assert_eq!(
        urlnorm::resolve(&base, "../c").unwrap().as_str(),
        "http://example.onion/c"
    );
    assert_eq!(
        urlnorm::resolve(&base, "http://other.onion/").unwrap().as_str(),
        "http://other.onion/"
    );
}

#[test]
fn domain_of_extracts_host() {
    assert_eq!(
        urlnorm::domain_of("http://abc.onion/x/y"),
        Some("abc.onion".to_string())
    );
    assert_eq!(urlnorm::domain_of("not a url"), None);
}

proptest! {
    /// Adding a trailing slash or flipping scheme/host case never changes
    /// the canonical form.
    #[test]
    fn canonical_form_ignores_case_and_trailing_slash(
        host in "[a-z][a-z0-9]{2,12}",
        path in "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}",
    ) {
        let plain = format!("http://{host}.onion/{path}");
        let slashed = format!("http://{host}.onion/{path}/");
        let upper = format!("HTTP://{}.ONION/{path}", host.to_uppercase());

        let a: NormalizedUrl = urlnorm::normalize(&plain).unwrap();
        prop_assert_eq!(&a, &urlnorm::normalize(&slashed).unwrap());
        prop_assert_eq!(&a, &urlnorm::normalize(&upper).unwrap());
        prop_assert!(a.is_in_scope());
    }

    /// Arbitrary garbage never panics the normalizer.
    #[test]
    fn normalize_never_panics(input in ".{0,64}") {
        let _ = urlnorm::normalize(&input);
        let _ = urlnorm::is_in_scope(&input);
    }
}
