//! A cookie-aware HTTP client for exercising an application's API
//! in-process, without a browser.

use crate::browser::cookies::CookieJar;
use crate::browser::http::{form_request, join_url, Application, HttpRequest, HttpResponse};
use crate::browser::inprocess::DEFAULT_BASE_URL;
use crate::dom::{FormValue, MULTIPART, URLENCODED};
use crate::errors::{BrowserError, Result};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Media types `ApiResponse::json` will decode.
pub const JSON_MEDIA_TYPES: &[&str] = &[
    "application/json",
    "application/x-javascript",
    "text/javascript",
    "text/x-javascript",
    "text/x-json",
];

#[derive(Debug, Clone)]
enum Payload {
    Empty,
    Raw { content_type: String, body: Vec<u8> },
    Form(Vec<(String, FormValue)>),
}

/// One API call, built up before it is sent.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    payload: Payload,
}

impl ApiRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            payload: Payload::Empty,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: &str) -> Self {
        Self::new("POST", path)
    }

    pub fn put(path: &str) -> Self {
        Self::new("PUT", path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new("DELETE", path)
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.payload = Payload::Raw {
            content_type: content_type.to_string(),
            body: body.into(),
        };
        self
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.body("application/json", body))
    }

    /// Form pairs, sent as a query string for GET and as an encoded body
    /// otherwise. Any file value switches the body to multipart.
    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FormValue>,
    {
        self.payload = Payload::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    async fn into_http(self, base: &Url) -> Result<HttpRequest> {
        let mut url = join_url(base, &self.path)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }

        let mut request = match self.payload {
            Payload::Empty => HttpRequest::new(&self.method, url),
            Payload::Raw { content_type, body } => {
                HttpRequest::new(&self.method, url).body(&content_type, body)
            }
            Payload::Form(values) => {
                let enctype = if values
                    .iter()
                    .any(|(_, v)| matches!(v, FormValue::File { .. }))
                {
                    MULTIPART
                } else {
                    URLENCODED
                };
                form_request(&self.method, url, enctype, &values).await?
            }
        };
        for (name, value) in self.headers {
            request = request.header(&name, &value);
        }
        Ok(request)
    }
}

/// Sends requests through an application's router, carrying cookies and
/// the referrer from response to response.
#[derive(Debug, Clone)]
pub struct ApiClient {
    app: Application,
    base_url: Url,
    jar: CookieJar,
    referrer: Option<Url>,
}

impl ApiClient {
    pub fn new(router: Router) -> Result<Self> {
        Self::with_application(Application::new(router), DEFAULT_BASE_URL)
    }

    pub fn with_application(app: Application, base_url: &str) -> Result<Self> {
        Ok(Self {
            app,
            base_url: Url::parse(base_url)?,
            jar: CookieJar::new(),
            referrer: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn referrer(&self) -> Option<&Url> {
        self.referrer.as_ref()
    }

    /// Sends `request`. The client itself is unchanged; continue the
    /// session through [`ApiResponse::client`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut http = request.into_http(&self.base_url).await?;
        if let Some(referrer) = &self.referrer {
            http = http.header("Referer", referrer.as_str());
        }
        if let Some(cookies) = self.jar.header_for(&http.url) {
            http = http.header("Cookie", &cookies);
        }

        let response = self.app.send(http).await?;
        let mut jar = self.jar.clone();
        jar.store_response(&response.url, response.header_all("set-cookie"));

        Ok(ApiResponse {
            app: self.app.clone(),
            base_url: self.base_url.clone(),
            jar,
            response,
        })
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post_form<I, K, V>(&self, path: &str, pairs: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FormValue>,
    {
        self.send(ApiRequest::post(path).form(pairs)).await
    }

    pub async fn post_json<T: Serialize>(&self, path: &str, value: &T) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path).json(value)?).await
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    app: Application,
    base_url: Url,
    jar: CookieJar,
    response: HttpResponse,
}

impl ApiResponse {
    pub fn url(&self) -> &Url {
        &self.response.url
    }

    pub fn status_code(&self) -> u16 {
        self.response.status
    }

    /// Status line, e.g. `"201 Created"`.
    pub fn status(&self) -> String {
        self.response.status_line()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.response.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn text(&self) -> String {
        self.response.text()
    }

    /// True for a 200 response declaring one of [`JSON_MEDIA_TYPES`].
    pub fn is_json(&self) -> bool {
        self.status_code() == 200
            && self
                .response
                .media_type()
                .map(|media| JSON_MEDIA_TYPES.contains(&media.as_str()))
                .unwrap_or(false)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if !self.is_json() {
            return Err(BrowserError::state(format!(
                "response is not JSON (status {}, content type {:?})",
                self.status_code(),
                self.header("content-type").unwrap_or("")
            )));
        }
        Ok(serde_json::from_slice(self.body())?)
    }

    /// A client continuing this session: it holds a copy of the cookies
    /// as of this response and sends this response's URL as referrer.
    pub fn client(&self) -> ApiClient {
        ApiClient {
            app: self.app.clone(),
            base_url: self.base_url.clone(),
            jar: self.jar.clone(),
            referrer: Some(self.url().clone()),
        }
    }
}

/// Builds and tears down one API client around a test run.
pub trait ApiClientManager {
    fn backend(&self) -> &str;

    fn create(&mut self) -> Result<ApiClient>;

    fn destroy(&mut self) -> Result<()>;
}
