//! Cookie header parsing and `Set-Cookie` rendering.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use std::{collections::HashMap, fmt};

pub type CookieMap = HashMap<String, String>;

/// Parse a single `Cookie` header value.
///
/// Pairs are split on `;`, names are trimmed and values URL-decoded. A pair without `=` maps to
/// an empty value. When a name repeats, the first occurrence wins (browsers send the most
/// specific path first).
#[must_use]
pub fn parse(header: &str) -> CookieMap {
    let mut cookies = CookieMap::new();
    merge(&mut cookies, header);
    cookies
}

/// Collect cookies from every `Cookie` header on a request (HTTP/2 may split them).
#[must_use]
pub fn from_headers(headers: &HeaderMap) -> CookieMap {
    let mut cookies = CookieMap::new();
    for value in headers.get_all(COOKIE) {
        if let Ok(value) = value.to_str() {
            merge(&mut cookies, value);
        }
    }
    cookies
}

fn merge(cookies: &mut CookieMap, header: &str) {
    for pair in header.split(';') {
        let trimmed = pair.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (name, value) = match trimmed.split_once('=') {
            Some((name, value)) => (name.trim(), decode(value.trim())),
            None => (trimmed, String::new()),
        };
        if name.is_empty() {
            continue;
        }
        cookies.entry(name.to_string()).or_insert(value);
    }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned())
}

/// A single `Set-Cookie` directive with the flags every session cookie carries.
#[derive(Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: &'static str,
    value: String,
    max_age: i64,
}

impl SetCookie {
    #[must_use]
    pub fn new(name: &'static str, value: &str, max_age: i64) -> Self {
        Self {
            name,
            value: value.to_string(),
            max_age,
        }
    }

    /// Directive that tells the browser to drop the cookie.
    #[must_use]
    pub fn expired(name: &'static str) -> Self {
        Self::new(name, "", 0)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    /// # Errors
    /// Returns an error if the rendered directive is not a valid header value.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Max-Age={}; HttpOnly; Secure; SameSite=Lax; Path=/",
            self.name,
            urlencoding::encode(&self.value),
            self.max_age
        )
    }
}

// Values are credentials; keep them out of logs.
impl fmt::Debug for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetCookie")
            .field("name", &self.name)
            .field("value", &"***")
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// Append one `Set-Cookie` header per directive.
///
/// # Errors
/// Returns an error if any directive is not a valid header value; nothing is appended then.
pub fn append_all(headers: &mut HeaderMap, cookies: &[SetCookie]) -> Result<(), InvalidHeaderValue> {
    let values = cookies
        .iter()
        .map(SetCookie::to_header_value)
        .collect::<Result<Vec<_>, _>>()?;
    for value in values {
        headers.append(SET_COOKIE, value);
    }
    Ok(())
}
