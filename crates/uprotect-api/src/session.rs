// Cookie + CSRF session material for the Protect private API.
//
// A UniFi OS login hands back a `TOKEN` (or `UOS_TOKEN` on newer consoles)
// cookie and an `x-csrf-token` header. Both are replayed on every HTTP
// request and the cookie on the websocket upgrade.

use reqwest::header::{HeaderMap, SET_COOKIE};

const SESSION_COOKIES: [&str; 2] = ["TOKEN", "UOS_TOKEN"];
pub(crate) const CSRF_HEADER: &str = "x-csrf-token";

/// An authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    cookie: String,
    csrf_token: String,
}

impl Session {
    pub fn new(cookie: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            csrf_token: csrf_token.into(),
        }
    }

    /// Build a session from a login response. `None` unless both the
    /// session cookie and the CSRF header are present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let cookie = session_cookie(headers)?;
        let csrf_token = csrf_token(headers)?;
        Some(Self { cookie, csrf_token })
    }

    /// `name=value` pair suitable for a `Cookie` request header.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub(crate) fn set_csrf_token(&mut self, token: String) {
        self.csrf_token = token;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cookie", &"[REDACTED]")
            .field("csrf_token", &"[REDACTED]")
            .finish()
    }
}

/// Find the session cookie among `Set-Cookie` headers.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| SESSION_COOKIES.contains(name) && !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
}

/// Extract a CSRF token header, if present.
pub(crate) fn csrf_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(cookies: &[&'static str], csrf: Option<&'static str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        for c in cookies {
            map.append(SET_COOKIE, HeaderValue::from_static(c));
        }
        if let Some(token) = csrf {
            map.insert(CSRF_HEADER, HeaderValue::from_static(token));
        }
        map
    }

    #[test]
    fn picks_token_cookie_among_others() {
        let map = headers(
            &["other=1; Path=/", "TOKEN=abc.def; Path=/; HttpOnly; Secure"],
            Some("csrf-1"),
        );
        let session = Session::from_headers(&map).expect("session");
        assert_eq!(session.cookie(), "TOKEN=abc.def");
        assert_eq!(session.csrf_token(), "csrf-1");
    }

    #[test]
    fn accepts_uos_token_cookie() {
        let map = headers(&["UOS_TOKEN=xyz; Path=/"], Some("csrf-2"));
        let session = Session::from_headers(&map).expect("session");
        assert_eq!(session.cookie(), "UOS_TOKEN=xyz");
    }

    #[test]
    fn requires_both_cookie_and_csrf() {
        assert!(Session::from_headers(&headers(&["TOKEN=abc"], None)).is_none());
        assert!(Session::from_headers(&headers(&[], Some("csrf"))).is_none());
        assert!(Session::from_headers(&headers(&["TOKEN=; Path=/"], Some("csrf"))).is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let session = Session::new("TOKEN=secret", "csrf-secret");
        let out = format!("{session:?}");
        assert!(!out.contains("secret"));
    }
}
