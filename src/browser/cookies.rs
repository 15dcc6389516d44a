//! Session cookie jar with domain and path matching.

use crate::types::CookieSpec;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lower-cased, without a leading dot.
    pub domain: String,
    pub path: String,
    /// Set when no `Domain` attribute was given; only the exact host
    /// receives the cookie.
    pub host_only: bool,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn is_expired(&self) -> bool {
        self.expires.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    pub fn matches_domain(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if host == self.domain {
            return true;
        }
        !self.host_only && host.ends_with(&format!(".{}", self.domain))
    }

    pub fn matches_path(&self, path: &str) -> bool {
        if self.path == "/" || path == self.path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path[self.path.len()..].starts_with('/'))
    }

    pub fn matches(&self, url: &Url) -> bool {
        if self.is_expired() || (self.secure && url.scheme() != "https") {
            return false;
        }
        let host = url.host_str().unwrap_or("localhost");
        self.matches_domain(host) && self.matches_path(url.path())
    }
}

/// Default cookie path for a request path: everything up to the last `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|at| at.and_utc())
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Parses one `Set-Cookie` header received from `url`.
pub fn parse_set_cookie(header: &str, url: &Url) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: unquote(value).to_string(),
        domain: url.host_str().unwrap_or("localhost").to_ascii_lowercase(),
        path: default_path(url),
        host_only: true,
        expires: None,
        secure: false,
        http_only: false,
    };
    let mut max_age = None;

    for part in parts {
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (key.trim().to_ascii_lowercase(), value.trim()),
            None => (part.trim().to_ascii_lowercase(), ""),
        };
        match key.as_str() {
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "domain" if !value.is_empty() => {
                cookie.domain = value.trim_start_matches('.').to_ascii_lowercase();
                cookie.host_only = false;
            }
            "path" if value.starts_with('/') => cookie.path = value.to_string(),
            "max-age" => max_age = value.parse::<i64>().ok(),
            "expires" => {
                if cookie.expires.is_none() {
                    cookie.expires = parse_expires(unquote(value));
                }
            }
            _ => {}
        }
    }

    // Max-Age wins over Expires.
    if let Some(seconds) = max_age {
        cookie.expires = Some(Utc::now() + Duration::seconds(seconds));
    }
    Some(cookie)
}

/// Cookies keyed by (domain, path, name). Cloning yields an independent
/// jar.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: BTreeMap<(String, String, String), Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values()
    }

    /// Stores `cookie`, replacing any with the same key. An already
    /// expired cookie deletes its key instead.
    pub fn insert(&mut self, cookie: Cookie) {
        let key = (
            cookie.domain.clone(),
            cookie.path.clone(),
            cookie.name.clone(),
        );
        if cookie.is_expired() {
            self.cookies.remove(&key);
        } else {
            self.cookies.insert(key, cookie);
        }
    }

    /// Records every `Set-Cookie` header of a response to `url`.
    pub fn store_response<'h>(&mut self, url: &Url, headers: impl IntoIterator<Item = &'h str>) {
        for header in headers {
            if let Some(cookie) = parse_set_cookie(header, url) {
                self.insert(cookie);
            }
        }
    }

    /// Plants a cookie given by a test, defaulting its domain to the host
    /// of `url`.
    pub fn set(&mut self, spec: &CookieSpec, url: &Url) {
        let (domain, host_only) = match &spec.domain {
            Some(domain) => (domain.trim_start_matches('.').to_ascii_lowercase(), false),
            None => (
                url.host_str().unwrap_or("localhost").to_ascii_lowercase(),
                true,
            ),
        };
        self.insert(Cookie {
            name: spec.name.clone(),
            value: spec.value.clone(),
            domain,
            path: spec.path.clone().unwrap_or_else(|| "/".to_string()),
            host_only,
            expires: spec.expires,
            secure: spec.secure,
            http_only: spec.http_only,
        });
    }

    /// Removes cookies called `name`, narrowed by domain and path when
    /// given. Returns how many were removed.
    pub fn remove(&mut self, name: &str, domain: Option<&str>, path: Option<&str>) -> usize {
        let domain = domain.map(|d| d.trim_start_matches('.').to_ascii_lowercase());
        let before = self.cookies.len();
        self.cookies.retain(|(d, p, n), _| {
            !(n == name
                && domain.as_deref().map_or(true, |wanted| wanted == d)
                && path.map_or(true, |wanted| wanted == p))
        });
        before - self.cookies.len()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn purge_expired(&mut self) {
        self.cookies.retain(|_, cookie| !cookie.is_expired());
    }

    /// Cookies a request to `url` carries, longest path first.
    pub fn matching(&self, url: &Url) -> Vec<&Cookie> {
        let mut cookies: Vec<&Cookie> = self.cookies.values().filter(|c| c.matches(url)).collect();
        cookies.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        cookies
    }

    /// Value for the `Cookie` request header, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .matching(url)
            .into_iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Name to value for every cookie visible at `url`. The most specific
    /// path wins on a name clash.
    pub fn visible(&self, url: &Url) -> BTreeMap<String, String> {
        let mut visible = BTreeMap::new();
        for cookie in self.matching(url) {
            visible
                .entry(cookie.name.clone())
                .or_insert_with(|| cookie.value.clone());
        }
        visible
    }
}
