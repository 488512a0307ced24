use std::time::Duration;

use axum::http::{header, HeaderMap};

/// Cookie carrying the session token for browser flows.
pub const SESSION_COOKIE: &str = "session_token";

/// Cookie binding an OAuth `state` to the browser that started the flow.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Read a cookie value from every `Cookie` header on the request.
pub fn read<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

fn build(name: &str, value: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn session_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    build(SESSION_COOKIE, token, max_age, secure)
}

pub fn clear_session_cookie(secure: bool) -> String {
    build(SESSION_COOKIE, "", Duration::ZERO, secure)
}

/// Short-lived cookie holding the signed OAuth `state` until the callback.
pub fn state_cookie(state: &str, max_age: Duration, secure: bool) -> String {
    build(OAUTH_STATE_COOKIE, state, max_age, secure)
}

pub fn clear_state_cookie(secure: bool) -> String {
    build(OAUTH_STATE_COOKIE, "", Duration::ZERO, secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; session_token=abc.def"));
        headers.append(header::COOKIE, HeaderValue::from_static("other=1"));
        assert_eq!(read(&headers, SESSION_COOKIE), Some("abc.def"));
        assert_eq!(read(&headers, "other"), Some("1"));
        assert_eq!(read(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session_token="));
        assert_eq!(read(&headers, SESSION_COOKIE), None);
    }

    #[test]
    fn cookie_attributes() {
        let cookie = session_cookie("tok", Duration::from_secs(60), true);
        assert_eq!(
            cookie,
            "session_token=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }

    #[test]
    fn state_cookie_round_trips_through_read() {
        let cookie = state_cookie("c2lnbmVk", Duration::from_secs(600), false);
        assert_eq!(
            cookie,
            "oauth_state=c2lnbmVk; Path=/; HttpOnly; SameSite=Lax; Max-Age=600"
        );

        let mut headers = HeaderMap::new();
        let pair = cookie.split(';').next().unwrap();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        assert_eq!(read(&headers, OAUTH_STATE_COOKIE), Some("c2lnbmVk"));
        assert!(clear_state_cookie(true).starts_with("oauth_state=; "));
    }
}
