use crate::core::RemoteSession;
use crate::dom::{Locator, Mutation};
use crate::errors::{BrowserError, Result};
use crate::types::ElementEvent;
use serde_json::Value;

/// Quotes `text` as a single-quoted JavaScript string literal.
pub fn js_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\u{2028}' => quoted.push_str("\\u2028"),
            '\u{2029}' => quoted.push_str("\\u2029"),
            ch => quoted.push(ch),
        }
    }
    quoted.push('\'');
    quoted
}

/// Serializes the page with the live state of every form control written
/// into attributes of a detached copy.
pub const SYNC_DOCUMENT_SCRIPT: &str = r#"
(function () {
    var root = document.documentElement;
    var copy = root.cloneNode(true);
    var live = root.querySelectorAll('input, textarea, select');
    var mirror = copy.querySelectorAll('input, textarea, select');
    for (var i = 0; i < live.length && i < mirror.length; i++) {
        var el = live[i], twin = mirror[i], tag = el.tagName.toLowerCase();
        if (tag === 'input') {
            var type = (el.type || 'text').toLowerCase();
            if (type === 'checkbox' || type === 'radio') {
                if (el.checked) { twin.setAttribute('checked', 'checked'); }
                else { twin.removeAttribute('checked'); }
            } else if (type !== 'file') {
                twin.setAttribute('value', el.value);
            }
        } else if (tag === 'textarea') {
            twin.textContent = el.value;
        } else {
            for (var j = 0; j < el.options.length && j < twin.options.length; j++) {
                if (el.options[j].selected) { twin.options[j].setAttribute('selected', 'selected'); }
                else { twin.options[j].removeAttribute('selected'); }
            }
        }
    }
    return copy.outerHTML;
})()
"#;

pub const PAGE_LOADED: &str = "document.readyState == 'complete'";

pub const USER_AGENT_SCRIPT: &str = "navigator.userAgent";

pub const COOKIES_SCRIPT: &str = "document.cookie";

fn with_element(locator: &Locator, body: &str) -> String {
    format!(
        "(function (element) {{ if (element === null) {{ return false; }} {} return true; }})({})",
        body,
        locator.to_js()
    )
}

/// Script mirroring one form-state change into the live page.
pub fn mutation_script(mutation: &Mutation) -> String {
    let fire = "element.dispatchEvent(new Event('input', {bubbles: true})); \
                element.dispatchEvent(new Event('change', {bubbles: true}));";
    match mutation {
        Mutation::Value { target, value } => with_element(
            target,
            &format!("element.value = {}; {}", js_quote(value), fire),
        ),
        Mutation::Typed { target, text, value } => with_element(
            target,
            &format!(
                "var text = {}; \
                 for (var i = 0; i < text.length; i++) {{ \
                   var key = {{key: text.charAt(i), bubbles: true}}; \
                   element.dispatchEvent(new KeyboardEvent('keydown', key)); \
                   element.dispatchEvent(new KeyboardEvent('keypress', key)); \
                   element.dispatchEvent(new KeyboardEvent('keyup', key)); \
                 }} \
                 element.value = {}; {}",
                js_quote(text),
                js_quote(value),
                fire
            ),
        ),
        Mutation::Checked { target, checked } => with_element(
            target,
            &format!("element.checked = {}; {}", checked, fire),
        ),
        Mutation::Selected { target, values } => {
            let wanted: Vec<String> = values.iter().map(|v| js_quote(v)).collect();
            with_element(
                target,
                &format!(
                    "var wanted = [{}]; \
                     for (var i = 0; i < element.options.length; i++) {{ \
                       var option = element.options[i]; \
                       var value = (option.hasAttribute('value') ? option.value : option.text).trim(); \
                       option.selected = wanted.indexOf(value) !== -1; \
                     }} {}",
                    wanted.join(", "),
                    fire
                ),
            )
        }
    }
}

pub fn click_script(target: &Locator) -> String {
    with_element(target, "element.click();")
}

/// Dispatches `event` at the element. Focus goes through `focus()` so the
/// page's focus state moves too.
pub fn event_script(target: &Locator, event: &ElementEvent) -> String {
    let name = js_quote(event.dom_name());
    let body = match event {
        ElementEvent::Focus => {
            "if (typeof element.focus === 'function') { element.focus(); } \
             else { element.dispatchEvent(new FocusEvent('focus')); }"
                .to_string()
        }
        e if e.is_mouse() => format!(
            "element.dispatchEvent(new MouseEvent({}, {{bubbles: true, cancelable: true, view: window}}));",
            name
        ),
        _ => format!(
            "element.dispatchEvent(new Event({}, {{bubbles: true, cancelable: true}}));",
            name
        ),
    };
    with_element(target, &body)
}

/// Submits a form, first adding hidden inputs for `extra` pairs such as
/// the clicked button's name and value.
pub fn submit_script(form: &Locator, extra: &[(String, String)]) -> String {
    let mut body = String::new();
    for (name, value) in extra {
        body.push_str(&format!(
            "var hidden = document.createElement('input'); hidden.type = 'hidden'; \
             hidden.name = {}; hidden.value = {}; element.appendChild(hidden); ",
            js_quote(name),
            js_quote(value)
        ));
    }
    body.push_str("element.submit();");
    with_element(form, &body)
}

pub fn visibility_script(target: &Locator) -> String {
    format!(
        "(function (element) {{ \
           if (element === null) {{ return false; }} \
           var style = window.getComputedStyle(element); \
           return style.display !== 'none' && style.visibility !== 'hidden' \
             && (element.offsetWidth > 0 || element.offsetHeight > 0 || element.getClientRects().length > 0); \
         }})({})",
        target.to_js()
    )
}

pub fn set_cookie_script(cookie: &str) -> String {
    format!("document.cookie = {}; true", js_quote(cookie))
}

/// Expires every cookie visible to the page, on each path prefix of the
/// current location.
pub const CLEAR_COOKIES_SCRIPT: &str = r#"
(function () {
    var names = document.cookie.split(';').map(function (c) { return c.split('=')[0].trim(); });
    var parts = window.location.pathname.split('/');
    var paths = ['/'];
    for (var i = 1; i < parts.length; i++) { paths.push(parts.slice(0, i + 1).join('/')); }
    names.forEach(function (name) {
        if (!name) { return; }
        paths.forEach(function (path) {
            document.cookie = name + '=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=' + path;
        });
    });
    return true;
})()
"#;

pub struct JavaScriptRunner;

impl JavaScriptRunner {
    pub async fn execute(session: &dyn RemoteSession, script: &str) -> Result<Value> {
        session.execute_script(script).await
    }

    pub async fn execute_with_timeout(
        session: &dyn RemoteSession,
        script: &str,
        timeout_ms: u64,
    ) -> Result<Value> {
        let execution = session.execute_script(script);

        tokio::time::timeout(tokio::time::Duration::from_millis(timeout_ms), execution)
            .await
            .map_err(|_| BrowserError::WaitTimeout {
                condition: "script execution".to_string(),
                timeout_ms,
            })?
    }

    /// Polls `condition` until it evaluates to `true` or `timeout_ms`
    /// elapses. The condition is always evaluated at least once.
    pub async fn wait_for_condition(
        session: &dyn RemoteSession,
        condition: &str,
        timeout_ms: u64,
        poll_interval_ms: u64,
    ) -> Result<bool> {
        let start_time = std::time::Instant::now();
        let timeout = tokio::time::Duration::from_millis(timeout_ms);
        let poll_interval = tokio::time::Duration::from_millis(poll_interval_ms);

        loop {
            let result = session.execute_script(condition).await?;
            if result.as_bool() == Some(true) {
                return Ok(true);
            }
            if start_time.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn string(session: &dyn RemoteSession, script: &str) -> Result<String> {
        match session.execute_script(script).await? {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            other => Err(BrowserError::JavaScriptFailed(format!(
                "expected a string result, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_quote_escapes() {
        assert_eq!(js_quote("plain"), "'plain'");
        assert_eq!(js_quote("it's"), "'it\\'s'");
        assert_eq!(js_quote("a\\b\nc"), "'a\\\\b\\nc'");
    }

    #[test]
    fn test_mutation_scripts_target_locator() {
        let script = mutation_script(&Mutation::Checked {
            target: Locator::Id("agree".to_string()),
            checked: true,
        });
        assert!(script.contains("document.getElementById('agree')"));
        assert!(script.contains("element.checked = true"));

        let script = mutation_script(&Mutation::Selected {
            target: Locator::Path("/html/body/form/select".to_string()),
            values: vec!["a".to_string(), "b".to_string()],
        });
        assert!(script.contains("var wanted = ['a', 'b']"));
        assert!(script.contains("XPathResult"));
    }

    #[test]
    fn test_event_scripts() {
        let target = Locator::Id("menu".to_string());
        let script = event_script(&target, &ElementEvent::MouseOver);
        assert!(script.contains("new MouseEvent('mouseover'"));
        assert!(script.contains("document.getElementById('menu')"));

        let script = event_script(&target, &ElementEvent::from("double_click"));
        assert!(script.contains("new MouseEvent('dblclick'"));

        let script = event_script(&target, &ElementEvent::Focus);
        assert!(script.contains("element.focus()"));

        let script = event_script(&target, &ElementEvent::from("blur"));
        assert!(script.contains("new Event('blur'"));
        assert!(!script.contains("MouseEvent"));
    }

    #[test]
    fn test_submit_script_appends_extra_pairs() {
        let form = Locator::Path("/html/body/form".to_string());
        let plain = submit_script(&form, &[]);
        assert!(!plain.contains("createElement"));
        let script = submit_script(&form, &[("go".to_string(), "yes".to_string())]);
        assert!(script.contains("hidden.name = 'go'; hidden.value = 'yes';"));
    }

    #[test]
    fn test_cookie_script_quotes_value() {
        assert_eq!(
            set_cookie_script("a=1; path=/"),
            "document.cookie = 'a=1; path=/'; true"
        );
    }
}
