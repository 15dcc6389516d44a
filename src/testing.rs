//! A fixture web application and helpers for exercising browsers against it.

use crate::browser::InProcessDriver;
use crate::dom::Document;
use axum::body::to_bytes;
use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, Html, IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const FIXTURE_ENTRY_POINT: &str = "fieldtest::testing::fixture";

/// What the fixture saw of one request.
#[derive(Debug, Default)]
struct Echo {
    method: String,
    request_id: String,
    get: Vec<(String, String)>,
    post: Vec<(String, String)>,
    files: Vec<Value>,
    referrer: String,
    cookies: Vec<(String, String)>,
}

fn parse_pairs(input: &[u8]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(input)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    pairs
}

async fn echo(request: Request) -> Echo {
    // Header borrows must end before the body is awaited.
    let (content_type, mut echo) = {
        let header_text = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        let mut cookies: Vec<(String, String)> = header_text(header::COOKIE)
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        cookies.sort();

        let echo = Echo {
            method: request.method().to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
            get: parse_pairs(request.uri().query().unwrap_or("").as_bytes()),
            referrer: header_text(header::REFERER),
            cookies,
            ..Default::default()
        };
        (header_text(header::CONTENT_TYPE), echo)
    };

    if content_type.starts_with("multipart/form-data") {
        if let Ok(mut multipart) = Multipart::from_request(request, &()).await {
            while let Ok(Some(field)) = multipart.next_field().await {
                let name = field.name().unwrap_or_default().to_string();
                match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let mimetype = field
                            .content_type()
                            .unwrap_or("application/octet-stream")
                            .to_string();
                        let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
                        echo.files.push(json!([name, file_name, mimetype, size]));
                    }
                    None => {
                        let text = field.text().await.unwrap_or_default();
                        echo.post.push((name, text));
                    }
                }
            }
            echo.post.sort();
        }
    } else if let Ok(body) = to_bytes(request.into_body(), usize::MAX).await {
        echo.post = parse_pairs(&body);
    }
    echo
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn pairs_json(pairs: &[(String, String)]) -> String {
    let rows: Vec<Value> = pairs.iter().map(|(k, v)| json!([k, v])).collect();
    Value::Array(rows).to_string()
}

fn page(title: &str, head: &str, body: &str, echo: &Echo) -> Response {
    let data = if echo.method == "POST" {
        &echo.post
    } else {
        &echo.get
    };
    Html(format!(
        "<html><head><title>{title}</title>{head}</head><body>\n{body}\n\
         <dl class=\"echo\">\
         <dd id=\"method\">{method}</dd>\
         <dd id=\"request_id\">{request_id}</dd>\
         <dd id=\"get_data\">{get}</dd>\
         <dd id=\"post_data\">{post}</dd>\
         <dd id=\"data\">{data}</dd>\
         <dd id=\"files\">{files}</dd>\
         <dd id=\"cookies\">{cookies}</dd>\
         </dl><p class=\"referrer\" id=\"referrer\">{referrer}</p></body></html>",
        title = escape(title),
        head = head,
        body = body,
        method = echo.method,
        request_id = echo.request_id,
        get = escape(&pairs_json(&echo.get)),
        post = escape(&pairs_json(&echo.post)),
        data = escape(&pairs_json(data)),
        files = escape(&Value::Array(echo.files.clone()).to_string()),
        cookies = escape(&pairs_json(&echo.cookies)),
        referrer = escape(&echo.referrer),
    ))
    .into_response()
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

const METHOD_FIELDS: &str = "<input type=\"text\" name=\"first_name\">\
     <input type=\"text\" name=\"email\"><input type=\"submit\">";

const FORM_PAGES: &[(&str, &str)] = &[
    (
        "/form/methods",
        "<form action=\"/form/methods\">{fields}</form>\
         <form method=\"get\" action=\"/form/methods\">{fields}</form>\
         <form method=\"GET\">{fields}</form>\
         <form method=\"post\" action=\"/form/methods\">{fields}</form>\
         <form method=\"post\">{fields}</form>",
    ),
    (
        "/form/submit",
        "<form method=\"post\" action=\"/form/submit\"><input type=\"text\" name=\"search\"></form>\
         <form method=\"post\" action=\"/form/submit\"><input type=\"text\" name=\"search\">\
         <input type=\"submit\" id=\"named\" name=\"submitA\" value=\"SubmitA\"></form>\
         <form method=\"post\" action=\"/form/submit\"><input type=\"text\" name=\"search\">\
         <input type=\"submit\" id=\"valueless\" name=\"submitA\"></form>\
         <form method=\"post\" action=\"/form/submit\"><input type=\"text\" name=\"search\">\
         <button id=\"go\" name=\"go\" value=\"yes\">Go</button>\
         <button type=\"button\" id=\"plain-button\" name=\"plain\">Plain</button></form>\
         <input type=\"submit\" id=\"floater\" name=\"floater\">",
    ),
    (
        "/form/textareas",
        "<form method=\"post\" action=\"/form/textareas\"><textarea name=\"ta\"></textarea></form>",
    ),
    (
        "/form/multipart",
        "<form method=\"post\" action=\"/form/multipart\" enctype=\"multipart/form-data\">\
         <input type=\"text\" name=\"search\"></form>\
         <form method=\"post\" action=\"/form/multipart\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"file\"></form>",
    ),
    (
        "/form/checkboxes",
        "<form method=\"post\" action=\"/form/checkboxes\">\
         <input type=\"checkbox\" name=\"agree\">\
         <input type=\"checkbox\" name=\"x\" value=\"m1\">\
         <input type=\"checkbox\" name=\"x\" value=\"m2\" checked>\
         <input type=\"checkbox\" name=\"x\" value=\"m3\"></form>",
    ),
    (
        "/form/radios",
        "<form method=\"post\" action=\"/form/radios\">\
         <input type=\"radio\" name=\"r\" value=\"r1\">\
         <input type=\"radio\" name=\"r\" value=\"r2\">\
         <input type=\"radio\" name=\"r\" value=\"r3\">\
         <input type=\"radio\" name=\"r\" value=\"r4\" checked></form>",
    ),
    (
        "/form/select",
        "<form method=\"post\" action=\"/form/select\">\
         <select name=\"plain\"><option>a</option><option value=\"b\">Bee</option></select>\
         <select name=\"many\" multiple><option value=\"1\">one</option>\
         <option value=\"2\" selected>two</option><option value=\"3\">three</option></select></form>",
    ),
];

const DOM_PAGE: &str = "<div id=\"A\"><p class=\"para\">first</p>\
     <p class=\"para\">second <b>bold</b></p></div>\
     <div id=\"hidden\" style=\"display: none\">hidden text</div>\
     <ul id=\"list\"><li>one</li><li>two</li><li>three</li></ul>";

async fn seq_page(step: &'static str, next: Option<&'static str>, request: Request) -> Response {
    let echo = echo(request).await;
    let link = next
        .map(|next| format!("<a href=\"/seq/{}\">next</a>", next))
        .unwrap_or_default();
    page(&format!("seq/{}", step), "", &link, &echo)
}

async fn assign_cookies(count: usize, bounce: Option<String>, request: Request) -> Response {
    let mut set = vec![(header::SET_COOKIE, "cookie1=value1; Path=/".to_string())];
    if count > 1 {
        set.push((header::SET_COOKIE, "cookie2=\"value 2\"; Path=/".to_string()));
    }
    match bounce {
        Some(target) => (StatusCode::FOUND, AppendHeaders(set), [(header::LOCATION, target)])
            .into_response(),
        None => {
            let echo = echo(request).await;
            (AppendHeaders(set), page("assign-cookie", "", "", &echo)).into_response()
        }
    }
}

async fn api_echo(request: Request) -> Json<Value> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let echo = echo(request).await;
    Json(json!({
        "method": echo.method,
        "query": echo.get,
        "form": echo.post,
        "content_type": content_type,
        "referer": echo.referrer,
        "cookies": echo.cookies,
    }))
}

/// Routes of the fixture application.
pub fn fixture_app() -> Router {
    let mut router = Router::new()
        .route(
            "/",
            any(|request: Request| async move {
                let echo = echo(request).await;
                page("index", "", "<a href=\"/seq/a\">start</a>", &echo)
            }),
        )
        .route(
            "/dom",
            get(|request: Request| async move {
                let echo = echo(request).await;
                page("dom", "", DOM_PAGE, &echo)
            }),
        )
        .route("/seq/a", get(|r: Request| seq_page("a", Some("b"), r)))
        .route("/seq/b", get(|r: Request| seq_page("b", Some("c"), r)))
        .route("/seq/c", get(|| async { found("/seq/d") }))
        .route("/seq/d", get(|r: Request| seq_page("d", None, r)))
        .route(
            "/meta-refresh",
            get(|request: Request| async move {
                let echo = echo(request).await;
                page(
                    "refresh",
                    "<meta http-equiv=\"refresh\" content=\"0;url=/seq/d\">",
                    "",
                    &echo,
                )
            }),
        )
        .route("/redirect-loop", get(|| async { found("/redirect-loop") }))
        .route(
            "/assign-cookie/1",
            get(
                |Query(q): Query<HashMap<String, String>>, r: Request| async move {
                    assign_cookies(1, q.get("bounce").cloned(), r).await
                },
            ),
        )
        .route(
            "/assign-cookie/2",
            get(
                |Query(q): Query<HashMap<String, String>>, r: Request| async move {
                    assign_cookies(2, q.get("bounce").cloned(), r).await
                },
            ),
        )
        .route(
            "/cookies",
            get(|request: Request| async move {
                let echo = echo(request).await;
                page("cookies", "", "", &echo)
            }),
        )
        .route("/api/echo", any(api_echo))
        .route(
            "/api/json",
            get(|| async { Json(json!({"name": "fieldtest", "items": [1, 2, 3]})) }),
        )
        .route(
            "/api/created",
            any(|| async { (StatusCode::CREATED, Json(json!({"created": true}))) }),
        )
        .route(
            "/api/login",
            any(|| async {
                (
                    [(header::SET_COOKIE, "session=abc123; Path=/")],
                    Json(json!({"logged_in": true})),
                )
            }),
        );

    for (path, body) in FORM_PAGES {
        let body = body.replace("{fields}", METHOD_FIELDS);
        let title = path.trim_start_matches('/').to_string();
        router = router.route(
            path,
            any(move |request: Request| {
                let body = body.clone();
                let title = title.clone();
                async move {
                    let echo = echo(request).await;
                    page(&title, "", &body, &echo)
                }
            }),
        );
    }
    router
}

pub struct TestHelper;

impl TestHelper {
    pub fn fixture_app() -> Router {
        fixture_app()
    }

    /// An in-process browser over the fixture application, rooted at
    /// `http://localhost/`.
    pub fn in_process_browser() -> InProcessDriver {
        InProcessDriver::new(fixture_app()).expect("the default base URL parses")
    }

    /// Normalized text of the element with `id`, or an empty string.
    pub fn text(document: &Document, id: &str) -> String {
        document
            .lookup(format!("#{}", id).as_str())
            .ok()
            .and_then(|found| found.one().ok())
            .map(|el| el.text_content().into_string())
            .unwrap_or_default()
    }

    pub fn json(document: &Document, id: &str) -> Value {
        serde_json::from_str(&Self::text(document, id)).unwrap_or(Value::Null)
    }

    /// An echoed `[[name, value], ...]` list.
    pub fn pairs(document: &Document, id: &str) -> Vec<(String, String)> {
        match Self::json(document, id) {
            Value::Array(rows) => rows
                .iter()
                .filter_map(|row| {
                    Some((
                        row.get(0)?.as_str()?.to_string(),
                        row.get(1)?.as_str()?.to_string(),
                    ))
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Driver;
    use crate::wait::Wait;

    #[tokio::test]
    async fn test_fixture_echoes_sorted_query() {
        let mut browser = TestHelper::in_process_browser();
        browser
            .open("/form/methods?b=2&a=1", Wait::none())
            .await
            .unwrap();
        let doc = browser.document().unwrap();
        assert_eq!(doc.title().as_deref(), Some("form/methods"));
        assert_eq!(doc.forms().len(), 5);
        assert_eq!(
            TestHelper::pairs(doc, "get_data"),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(TestHelper::text(doc, "method"), "GET");
        assert_eq!(TestHelper::text(doc, "missing"), "");
    }

    #[tokio::test]
    async fn test_echo_reads_headers_and_body() {
        fn assert_send<T: Send>(_: &T) {}

        let request = Request::builder()
            .method("POST")
            .uri("/api/echo?q=1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::REFERER, "http://localhost/from")
            .header(header::COOKIE, "b=2; a=1")
            .body(axum::body::Body::from("y=2&x=1"))
            .unwrap();
        let pending = echo(request);
        assert_send(&pending);

        let seen = pending.await;
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.referrer, "http://localhost/from");
        assert_eq!(seen.get, vec![("q".to_string(), "1".to_string())]);
        assert_eq!(
            seen.post,
            vec![
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(
            seen.cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]
        );
    }
}
