//! The cookie-write primitive.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Accepts raw `Set-Cookie`-style strings.
pub trait CookieJar: Send + Sync {
    /// Store a raw cookie string such as `"session=abc; Path=/"`.
    fn set_cookie(&self, raw: &str);

    /// Current cookies as a `Cookie` request header value.
    fn cookie_header(&self) -> String;
}

/// Cookie jar kept in memory. Attributes other than `Max-Age=0` are ignored.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<BTreeMap<String, String>>,
}

impl MemoryCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a single cookie.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl CookieJar for MemoryCookieJar {
    fn set_cookie(&self, raw: &str) {
        let mut parts = raw.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let expired = parts.any(|attr| attr.eq_ignore_ascii_case("max-age=0"));

        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if expired {
            cookies.remove(name);
        } else {
            cookies.insert(name.to_string(), value.trim().to_string());
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
