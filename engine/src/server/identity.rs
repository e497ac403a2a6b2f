//! Caller identity from auth proxy headers

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use sdk::errors::EngineError;

use super::error::ApiError;
use super::ServerState;
use crate::auth::Identity;
use crate::secrets::SecretString;

pub const SUBJECT_HEADER: &str = "X-Auth-Subject";
pub const EMAIL_HEADER: &str = "X-Auth-Email";
pub const NAME_HEADER: &str = "X-Auth-Name";

/// Extractor for the authenticated caller
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<ServerState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        check_proxy_secret(&parts.headers, state.proxy_secret.as_ref())?;
        let identity = identity_from_headers(&parts.headers).ok_or(EngineError::Unauthorized)?;
        Ok(Caller(identity))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let subject = header(headers, SUBJECT_HEADER)?;
    let email = header(headers, EMAIL_HEADER)?;

    let identity = Identity::new(subject, email);
    Some(match header(headers, NAME_HEADER) {
        Some(name) => identity.with_name(name),
        None => identity,
    })
}

/// Reject requests that did not come through the auth proxy
fn check_proxy_secret(headers: &HeaderMap, expected: Option<&SecretString>) -> Result<(), EngineError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let presented = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if constant_time_eq(token, expected.unsecure()) => Ok(()),
        _ => {
            tracing::warn!("Request without a valid proxy secret");
            Err(EngineError::Unauthorized)
        }
    }
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_identity_requires_subject_and_email() {
        assert!(identity_from_headers(&headers(&[("x-auth-subject", "s1")])).is_none());
        assert!(identity_from_headers(&headers(&[("x-auth-email", "a@b.c")])).is_none());

        let identity = identity_from_headers(&headers(&[
            ("x-auth-subject", "s1"),
            ("x-auth-email", "a@b.c"),
            ("x-auth-name", "Ana"),
        ]))
        .unwrap();
        assert_eq!(identity.subject, "s1");
        assert_eq!(identity.name.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_blank_subject_is_rejected() {
        let map = headers(&[("x-auth-subject", "  "), ("x-auth-email", "a@b.c")]);
        assert!(identity_from_headers(&map).is_none());
    }

    #[test]
    fn test_proxy_secret() {
        let secret = SecretString::new("proxy-secret");
        assert!(check_proxy_secret(&HeaderMap::new(), None).is_ok());
        assert!(check_proxy_secret(&HeaderMap::new(), Some(&secret)).is_err());
        assert!(check_proxy_secret(
            &headers(&[("authorization", "Bearer wrong")]),
            Some(&secret)
        )
        .is_err());
        assert!(check_proxy_secret(
            &headers(&[("authorization", "Bearer proxy-secret")]),
            Some(&secret)
        )
        .is_ok());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("proxy-secret", "proxy-secret"));
        assert!(!constant_time_eq("proxy-secret", "proxy-secreT"));
        assert!(!constant_time_eq("proxy-secret", "proxy-secre"));
        assert!(!constant_time_eq("", "x"));
    }
}
