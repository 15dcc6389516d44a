//! Request plumbing shared by the in-process browser and the API client.

use crate::dom::{FormValue, MULTIPART};
use crate::errors::{BrowserError, Result};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::path::Path;
use std::time::Instant;
use tower::ServiceExt;
use tracing::info;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        self.body = body;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The URL that produced this response.
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// e.g. `"302 Found"`.
    pub fn status_line(&self) -> String {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("");
        format!("{} {}", self.status, reason).trim_end().to_string()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Media type without parameters, lower-cased.
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// `Location` of a 3xx response.
    pub fn redirect_target(&self) -> Option<&str> {
        if (300..400).contains(&self.status) {
            self.header("location")
        } else {
            None
        }
    }
}

type Answer = (u16, Vec<(String, String)>, Vec<u8>);

#[derive(Clone)]
enum Endpoint {
    Router(Router),
    Network(reqwest::Client),
}

/// Where requests are answered: an application's router, in-process with
/// no sockets, or whatever server a URL names across the network.
#[derive(Clone)]
pub struct Application {
    endpoint: Endpoint,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.endpoint {
            Endpoint::Router(_) => f.write_str("Application(in-process)"),
            Endpoint::Network(_) => f.write_str("Application(network)"),
        }
    }
}

impl Application {
    pub fn new(router: Router) -> Self {
        Self {
            endpoint: Endpoint::Router(router),
        }
    }

    /// Sends requests over real sockets. Redirects come back to the caller
    /// unfollowed so the browser can manage cookies and referrers per hop.
    pub fn network() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: Endpoint::Network(client),
        })
    }

    pub fn is_in_process(&self) -> bool {
        matches!(self.endpoint, Endpoint::Router(_))
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let started = Instant::now();
        let method = request.method.clone();
        let url = request.url.clone();
        let (status, headers, body) = match &self.endpoint {
            Endpoint::Router(router) => through_router(router, request).await?,
            Endpoint::Network(client) => over_network(client, request).await?,
        };

        info!(
            "{} {} -> {} ({:.3}sec)",
            method,
            url,
            status,
            started.elapsed().as_secs_f64()
        );
        Ok(HttpResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

async fn through_router(router: &Router, request: HttpRequest) -> Result<Answer> {
    let mut builder = Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    if let Some(host) = request.url.host_str() {
        let host = match request.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        builder = builder.header("host", host);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let http_request = builder
        .body(Body::from(request.body))
        .map_err(|e| BrowserError::Transport(e.to_string()))?;

    let response = router
        .clone()
        .oneshot(http_request)
        .await
        .map_err(|e| BrowserError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = header_pairs(response.headers());
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| BrowserError::Transport(e.to_string()))?
        .to_vec();
    Ok((status, headers, body))
}

async fn over_network(client: &reqwest::Client, request: HttpRequest) -> Result<Answer> {
    let HttpRequest {
        method,
        url,
        headers,
        body,
    } = request;
    let method = reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|e| BrowserError::invalid_value("method", e.to_string()))?;
    let mut builder = client.request(method, url);
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let response = builder
        .body(body)
        .send()
        .await
        .map_err(|e| BrowserError::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = header_pairs(response.headers());
    let body = response
        .bytes()
        .await
        .map_err(|e| BrowserError::Transport(e.to_string()))?
        .to_vec();
    Ok((status, headers, body))
}

fn header_pairs(headers: &axum::http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Resolves `target` against `base`, the way a link is followed.
pub fn join_url(base: &Url, target: &str) -> Result<Url> {
    Ok(base.join(target.trim())?)
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `application/x-www-form-urlencoded` text. Files contribute their file
/// name.
pub fn urlencode(values: &[(String, FormValue)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in values {
        match value {
            FormValue::Text(text) => serializer.append_pair(name, text),
            FormValue::File { path, .. } => serializer.append_pair(name, &file_name(path)),
        };
    }
    serializer.finish()
}

/// `multipart/form-data` payload and its content type. File parts are
/// read from disk.
pub async fn multipart(values: &[(String, FormValue)]) -> Result<(String, Vec<u8>)> {
    let boundary = format!("----fieldtest{}", uuid::Uuid::new_v4().simple());
    let mut body = Vec::new();
    for (name, value) in values {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match value {
            FormValue::Text(text) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        name, text
                    )
                    .as_bytes(),
                );
            }
            FormValue::File { path, mimetype } => {
                let content = tokio::fs::read(path).await.map_err(|e| {
                    BrowserError::invalid_value(name.as_str(), format!("can not read {:?}: {}", path, e))
                })?;
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        name,
                        file_name(path),
                        mimetype
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&content);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    Ok((format!("{}; boundary={}", MULTIPART, boundary), body))
}

/// Builds the request submitting `values` to `url`. GET payloads replace
/// the query string; other methods carry them in the body and keep the
/// URL as given.
pub async fn form_request(
    method: &str,
    mut url: Url,
    enctype: &str,
    values: &[(String, FormValue)],
) -> Result<HttpRequest> {
    if method.eq_ignore_ascii_case("GET") {
        if !values.is_empty() {
            url.set_query(Some(&urlencode(values)));
        }
        return Ok(HttpRequest::get(url));
    }
    let request = HttpRequest::new(method, url);
    if enctype.eq_ignore_ascii_case(MULTIPART) {
        let (content_type, body) = multipart(values).await?;
        Ok(request.body(&content_type, body))
    } else {
        Ok(request.body(
            crate::dom::URLENCODED,
            urlencode(values).into_bytes(),
        ))
    }
}
