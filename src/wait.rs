use crate::dom::{Document, Element, Locator};
use crate::errors::{BrowserError, Result};
use crate::utils::javascript::{js_quote, PAGE_LOADED};
use std::fmt;
use std::str::FromStr;

/// How a wait term finds its element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finder {
    Css(String),
    Locator(Locator),
}

impl Finder {
    fn to_js(&self) -> String {
        match self {
            Finder::Css(css) => format!("document.querySelector({})", js_quote(css)),
            Finder::Locator(locator) => locator.to_js(),
        }
    }

    fn present_in(&self, doc: &Document) -> Result<bool> {
        match self {
            Finder::Css(css) => Ok(!doc.select(css)?.is_empty()),
            Finder::Locator(Locator::Id(id)) => Ok(doc
                .select("[id]")?
                .iter()
                .any(|el| el.id() == Some(id.as_str()))),
            Finder::Locator(Locator::Path(path)) => Ok(doc.find_path(path).is_some()),
        }
    }
}

impl fmt::Display for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finder::Css(css) => f.write_str(css),
            Finder::Locator(locator) => write!(f, "{}", locator),
        }
    }
}

impl From<&str> for Finder {
    fn from(css: &str) -> Self {
        Finder::Css(css.to_string())
    }
}

impl From<String> for Finder {
    fn from(css: String) -> Self {
        Finder::Css(css)
    }
}

impl From<Locator> for Finder {
    fn from(locator: Locator) -> Self {
        Finder::Locator(locator)
    }
}

impl From<&Element<'_>> for Finder {
    fn from(element: &Element<'_>) -> Self {
        Finder::Locator(element.locator())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    ElementPresent(Finder),
    ElementNotPresent(Finder),
    EvaluateElement(Finder, String),
    AjaxPending,
    AjaxComplete,
    Or,
}

impl Term {
    fn to_js(&self) -> String {
        match self {
            Term::ElementPresent(finder) => format!("({} !== null)", finder.to_js()),
            Term::ElementNotPresent(finder) => format!("({} === null)", finder.to_js()),
            Term::EvaluateElement(finder, expression) => format!(
                "(function (element) {{ return element !== null && !!({}); }})({})",
                expression,
                finder.to_js()
            ),
            Term::AjaxPending => "(window.jQuery ? window.jQuery.active != 0 : false)".to_string(),
            Term::AjaxComplete => "(window.jQuery ? window.jQuery.active == 0 : true)".to_string(),
            Term::Or => "||".to_string(),
        }
    }

    fn evaluate(&self, doc: &Document) -> Result<bool> {
        match self {
            Term::ElementPresent(finder) => finder.present_in(doc),
            Term::ElementNotPresent(finder) => Ok(!finder.present_in(doc)?),
            Term::EvaluateElement(finder, _) => Err(BrowserError::state(format!(
                "an expression on {} needs a scripting backend to evaluate",
                finder
            ))),
            Term::AjaxPending => Ok(false),
            Term::AjaxComplete | Term::Or => Ok(true),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::ElementPresent(finder) => write!(f, "element_present({})", finder),
            Term::ElementNotPresent(finder) => write!(f, "element_not_present({})", finder),
            Term::EvaluateElement(finder, expression) => {
                write!(f, "evaluate_element({}, {})", finder, expression)
            }
            Term::AjaxPending => f.write_str("ajax_pending()"),
            Term::AjaxComplete => f.write_str("ajax_complete()"),
            Term::Or => f.write_str("or"),
        }
    }
}

/// A compound condition: terms are joined by AND, `or_()` starts a new
/// alternative.
///
/// ```
/// use fieldtest::WaitExpression;
///
/// let expr = WaitExpression::new()
///     .element_present("#a")
///     .or_()
///     .element_present("#b");
/// assert!(expr.to_javascript().contains("||"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitExpression {
    terms: Vec<Term>,
}

impl WaitExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element_present(mut self, finder: impl Into<Finder>) -> Self {
        self.terms.push(Term::ElementPresent(finder.into()));
        self
    }

    pub fn element_not_present(mut self, finder: impl Into<Finder>) -> Self {
        self.terms.push(Term::ElementNotPresent(finder.into()));
        self
    }

    /// Tests `expression` with the found element bound to `element`.
    pub fn evaluate_element(mut self, finder: impl Into<Finder>, expression: &str) -> Self {
        self.terms
            .push(Term::EvaluateElement(finder.into(), expression.to_string()));
        self
    }

    pub fn ajax_pending(mut self) -> Self {
        self.terms.push(Term::AjaxPending);
        self
    }

    pub fn ajax_complete(mut self) -> Self {
        self.terms.push(Term::AjaxComplete);
        self
    }

    pub fn or_(mut self) -> Self {
        self.terms.push(Term::Or);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives().is_empty()
    }

    fn alternatives(&self) -> Vec<&[Term]> {
        self.terms
            .split(|term| *term == Term::Or)
            .filter(|group| !group.is_empty())
            .collect()
    }

    /// Renders the expression as one JavaScript boolean expression.
    pub fn to_javascript(&self) -> String {
        let alternatives = self.alternatives();
        if alternatives.is_empty() {
            return "true".to_string();
        }
        alternatives
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(Term::to_js)
                    .collect::<Vec<_>>()
                    .join(" && ")
            })
            .collect::<Vec<_>>()
            .join(" || ")
            .replace('\n', " ")
    }

    /// Evaluates the presence terms against a parsed document. Nothing is
    /// ever pending in a static document.
    pub fn evaluate(&self, doc: &Document) -> Result<bool> {
        for group in self.alternatives() {
            let mut satisfied = true;
            for term in group {
                if !term.evaluate(doc)? {
                    satisfied = false;
                    break;
                }
            }
            if satisfied {
                return Ok(true);
            }
        }
        Ok(self.alternatives().is_empty())
    }
}

impl fmt::Display for WaitExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .alternatives()
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(Term::to_string)
                    .collect::<Vec<_>>()
                    .join(" and ")
            })
            .collect();
        f.write_str(&rendered.join(" or "))
    }
}

/// What an interaction waits for before the document is resynchronized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFor {
    /// The page finished loading.
    Page,
    /// Sleep for the whole timeout.
    Duration,
    /// No asynchronous requests outstanding.
    Ajax,
    Script(String),
    Element(String),
    NoElement(String),
    Expression(WaitExpression),
}

impl WaitFor {
    /// The predicate a scripting backend polls; `None` for a plain delay.
    pub fn to_javascript(&self) -> Option<String> {
        match self {
            WaitFor::Page => Some(PAGE_LOADED.to_string()),
            WaitFor::Duration => None,
            WaitFor::Ajax => Some(WaitExpression::new().ajax_complete().to_javascript()),
            WaitFor::Script(script) => Some(script.clone()),
            WaitFor::Element(css) => Some(
                WaitExpression::new()
                    .element_present(css.as_str())
                    .to_javascript(),
            ),
            WaitFor::NoElement(css) => Some(
                WaitExpression::new()
                    .element_not_present(css.as_str())
                    .to_javascript(),
            ),
            WaitFor::Expression(expression) => Some(expression.to_javascript()),
        }
    }
}

impl FromStr for WaitFor {
    type Err = BrowserError;

    fn from_str(condition: &str) -> Result<Self> {
        let condition = condition.trim();
        let strip_css = |css: &str| css.strip_prefix("css=").unwrap_or(css).trim().to_string();
        match condition {
            "page" => Ok(WaitFor::Page),
            "duration" => Ok(WaitFor::Duration),
            "ajax" => Ok(WaitFor::Ajax),
            _ => {
                if let Some(script) = condition.strip_prefix("js:") {
                    Ok(WaitFor::Script(script.trim().to_string()))
                } else if let Some(css) = condition.strip_prefix("!element:") {
                    Ok(WaitFor::NoElement(strip_css(css)))
                } else if let Some(css) = condition.strip_prefix("element:") {
                    Ok(WaitFor::Element(strip_css(css)))
                } else {
                    Err(BrowserError::InvalidWaitCondition(condition.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitFor::Page => f.write_str("page"),
            WaitFor::Duration => f.write_str("duration"),
            WaitFor::Ajax => f.write_str("ajax"),
            WaitFor::Script(script) => write!(f, "js:{}", script),
            WaitFor::Element(css) => write!(f, "element:{}", css),
            WaitFor::NoElement(css) => write!(f, "!element:{}", css),
            WaitFor::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

impl From<WaitExpression> for WaitFor {
    fn from(expression: WaitExpression) -> Self {
        WaitFor::Expression(expression)
    }
}

/// Wait options attached to an interaction. Timeouts are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wait {
    pub condition: Option<WaitFor>,
    pub timeout_ms: Option<u64>,
}

impl Wait {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn page() -> Self {
        Self::until(WaitFor::Page)
    }

    pub fn until(condition: impl Into<WaitFor>) -> Self {
        Self {
            condition: Some(condition.into()),
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Parses a condition string; an empty string means no wait.
    pub fn parse(condition: &str, timeout_ms: Option<u64>) -> Result<Self> {
        let condition = match condition.trim() {
            "" => None,
            other => Some(other.parse()?),
        };
        Ok(Self {
            condition,
            timeout_ms,
        })
    }
}

impl From<WaitFor> for Wait {
    fn from(condition: WaitFor) -> Self {
        Wait::until(condition)
    }
}

impl From<WaitExpression> for Wait {
    fn from(expression: WaitExpression) -> Self {
        Wait::until(expression)
    }
}
