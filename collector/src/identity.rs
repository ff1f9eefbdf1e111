//! Visitor identity carried by the long-lived `sp` cookie.
//!
//! A visitor presenting a non-empty `sp` cookie keeps that identifier verbatim,
//! whatever its format: identifiers minted by older collectors must survive.
//! Everyone else gets a freshly minted random one. Either way the cookie is
//! set again on the response, sliding its expiry forward by a year.
use std::fmt;

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum_extra::extract::cookie::Cookie;
use time::OffsetDateTime;

use crate::time::one_year_after;
use crate::utils::uuid_v4;

pub const COOKIE_NAME: &str = "sp";

pub trait IdentitySource {
    /// Returns a new identifier, unique with overwhelming probability.
    fn mint(&self) -> String;
}

#[derive(Clone)]
pub struct RandomIdentity {}

impl IdentitySource for RandomIdentity {
    fn mint(&self) -> String {
        uuid_v4().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitorIdentity(String);

impl VisitorIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        VisitorIdentity(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<VisitorIdentity> for String {
    fn from(identity: VisitorIdentity) -> Self {
        identity.0
    }
}

/// First value of the named cookie across all `Cookie` headers, untouched
/// apart from surrounding whitespace and never percent-decoded.
///
/// Headers are split into pairs before any decoding, so a sibling cookie
/// holding non-ASCII bytes does not hide the others.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .flat_map(|value| value.as_bytes().split(|b| *b == b';'))
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_owned())
}

pub fn resolve_identity(headers: &HeaderMap, source: &dyn IdentitySource) -> VisitorIdentity {
    match cookie_value(headers, COOKIE_NAME) {
        Some(existing) if !existing.is_empty() => VisitorIdentity(existing),
        _ => VisitorIdentity(source.mint()),
    }
}

pub fn identity_cookie(
    identity: &VisitorIdentity,
    domain: Option<&str>,
    now: OffsetDateTime,
) -> Cookie<'static> {
    let mut cookie = Cookie::build((COOKIE_NAME, identity.as_str().to_owned()))
        .path("/")
        .expires(one_year_after(now));

    if let Some(domain) = domain.filter(|d| !d.is_empty()) {
        cookie = cookie.domain(domain.to_owned());
    }

    cookie.build()
}

/// Renders the cookie as a `Set-Cookie` header value. Values that are not
/// valid header bytes are logged and left out of the response.
pub fn set_cookie_header(cookie: &Cookie<'_>) -> Option<HeaderValue> {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("could not render identity cookie: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    struct Fixed(&'static str);

    impl IdentitySource for Fixed {
        fn mint(&self) -> String {
            self.0.to_string()
        }
    }

    fn headers_with_cookie(cookie: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(cookie));
        headers
    }

    #[test]
    fn reuses_existing_cookie_verbatim() {
        let headers = headers_with_cookie("_ga=GA1.2.3; sp=not-even-a-uuid%20; other=1");
        let identity = resolve_identity(&headers, &Fixed("minted"));
        assert_eq!(identity.as_str(), "not-even-a-uuid%20");
    }

    #[test]
    fn first_cookie_wins() {
        let mut headers = headers_with_cookie("sp=first");
        headers.append(COOKIE, HeaderValue::from_static("sp=second"));
        assert_eq!(cookie_value(&headers, "sp").as_deref(), Some("first"));
    }

    #[test]
    fn non_ascii_sibling_cookie_does_not_hide_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_bytes("sp=returning-visitor; city=Zürich".as_bytes()).unwrap(),
        );
        let identity = resolve_identity(&headers, &Fixed("minted"));
        assert_eq!(identity.as_str(), "returning-visitor");

        // Latin-1 bytes that are not even valid UTF-8
        headers.insert(
            COOKIE,
            HeaderValue::from_bytes(b"city=Z\xfcrich; sp=returning-visitor").unwrap(),
        );
        let identity = resolve_identity(&headers, &Fixed("minted"));
        assert_eq!(identity.as_str(), "returning-visitor");
    }

    #[test]
    fn mints_when_cookie_missing_or_empty() {
        let source = Fixed("minted");
        assert_eq!(resolve_identity(&HeaderMap::new(), &source).as_str(), "minted");
        assert_eq!(
            resolve_identity(&headers_with_cookie("spx=abc"), &source).as_str(),
            "minted"
        );
        assert_eq!(
            resolve_identity(&headers_with_cookie("sp=; a=b"), &source).as_str(),
            "minted"
        );
    }

    #[test]
    fn random_identities_are_distinct() {
        let source = RandomIdentity {};
        let a = resolve_identity(&HeaderMap::new(), &source);
        let b = resolve_identity(&HeaderMap::new(), &source);
        assert_ne!(a, b);
    }

    #[test]
    fn cookie_carries_domain_and_one_year_expiry() {
        let identity = VisitorIdentity::new("abc");
        let cookie = identity_cookie(
            &identity,
            Some("example.com"),
            datetime!(2026-10-17 08:30:00 UTC),
        );

        assert_eq!(cookie.name(), "sp");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(
            cookie.expires_datetime(),
            Some(datetime!(2027-10-17 08:30:00 UTC))
        );

        let header = set_cookie_header(&cookie).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.starts_with("sp=abc"), "{header}");
        assert!(header.contains("Domain=example.com"), "{header}");
        assert!(header.contains("17 Oct 2027 08:30:00 GMT"), "{header}");
    }

    #[test]
    fn empty_domain_is_omitted() {
        let identity = VisitorIdentity::new("abc");
        let now = datetime!(2026-10-17 08:30:00 UTC);
        assert_eq!(identity_cookie(&identity, Some(""), now).domain(), None);
        assert_eq!(identity_cookie(&identity, None, now).domain(), None);
    }
}
