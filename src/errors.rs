use std::fmt;
use thiserror::Error;

/// Where a lookup was performed, used to phrase not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Document,
    Fragment,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Document => f.write_str("Document"),
            Scope::Fragment => f.write_str("Fragment"),
        }
    }
}

/// Coarse classification of [`BrowserError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Lookup,
    Value,
    State,
    Timing,
    Transport,
}

#[derive(Error, Debug)]
pub enum BrowserError {
    // Configuration and resolution
    #[error("Configuration {source_name:?} has no section {section:?}")]
    MissingSection {
        section: String,
        source_name: String,
    },

    #[error("Configuration section {section:?} is missing required key {key:?}")]
    MissingConfigKey { section: String, key: String },

    #[error("No backend {backend:?} known for tool {tool:?} (frontend {frontend:?}, configuration {source_name:?})")]
    UnknownBackend {
        tool: String,
        frontend: String,
        backend: String,
        source_name: String,
    },

    #[error("No default target declared for {0:?}")]
    NoDefaultTarget(String),

    #[error("No registered entry point named {0:?}")]
    UnknownEntryPoint(String),

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("{0} is configured but has not been activated")]
    NotActivated(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Lookup
    #[error("{scope} contains no element with id {key:?}")]
    NoSuchId { scope: Scope, key: String },

    #[error("{scope} contains no elements matching {key:?}")]
    NoMatch { scope: Scope, key: String },

    #[error("{scope} contains {count} elements matching id selector {key:?}")]
    AmbiguousId {
        scope: Scope,
        key: String,
        count: usize,
    },

    #[error("Index {index} out of range for {scope} with {len} children")]
    IndexOutOfRange {
        scope: Scope,
        index: usize,
        len: usize,
    },

    #[error("Form has no control named {0:?}")]
    NoSuchField(String),

    #[error("No checkable control named {name:?} has value {value:?}")]
    NoSuchCheckable { name: String, value: String },

    #[error("Element is not part of the current document (generation {held}, current {current})")]
    StaleElement { held: u64, current: u64 },

    #[error("No document has been loaded")]
    NoDocument,

    // Values
    #[error("There is no option with the value {0:?}")]
    NoSuchOption(String),

    #[error("Invalid value for {field:?}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid wait condition {0:?}")]
    InvalidWaitCondition(String),

    // State and contract
    #[error("{0}")]
    InvalidState(String),

    #[error("Operation not supported by the {backend} backend: {operation}")]
    Unsupported { backend: String, operation: String },

    // Timing
    #[error("Timed out after {timeout_ms}ms waiting for {condition}")]
    WaitTimeout { condition: String, timeout_ms: u64 },

    // Transport and process
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Too many redirects ({hops}) starting from {url}")]
    TooManyRedirects { url: String, hops: usize },

    #[error("Server process {message}\n--- output ---\n{output}")]
    ProcessFailed { message: String, output: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

impl BrowserError {
    pub(crate) fn state(message: impl Into<String>) -> Self {
        BrowserError::InvalidState(message.into())
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BrowserError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use BrowserError::*;
        match self {
            MissingSection { .. }
            | MissingConfigKey { .. }
            | UnknownBackend { .. }
            | NoDefaultTarget(_)
            | UnknownEntryPoint(_)
            | NotConfigured(_)
            | NotActivated(_)
            | ConfigParse(_) => ErrorKind::Configuration,
            NoSuchId { .. }
            | NoMatch { .. }
            | AmbiguousId { .. }
            | IndexOutOfRange { .. }
            | NoSuchField(_)
            | NoSuchCheckable { .. }
            | StaleElement { .. }
            | NoDocument => ErrorKind::Lookup,
            NoSuchOption(_)
            | InvalidValue { .. }
            | InvalidSelector { .. }
            | InvalidWaitCondition(_)
            | SerializationError(_) => ErrorKind::Value,
            InvalidState(_) | Unsupported { .. } => ErrorKind::State,
            WaitTimeout { .. } => ErrorKind::Timing,
            LaunchFailed(_)
            | NavigationFailed(_)
            | JavaScriptFailed(_)
            | Transport(_)
            | TooManyRedirects { .. }
            | ProcessFailed { .. }
            | InvalidUrl(_)
            | IoError(_) => ErrorKind::Transport,
        }
    }

    /// True for failures a test framework should report as a failed
    /// assertion rather than an infrastructure fault.
    pub fn is_assertion(&self) -> bool {
        self.kind() == ErrorKind::Timing
    }

    /// Value errors are the ones a remote form fill retries after the
    /// page has had a chance to settle.
    pub fn is_retryable_value(&self) -> bool {
        matches!(
            self,
            BrowserError::NoSuchOption(_) | BrowserError::NoSuchCheckable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_errors_name_key_and_scope() {
        let err = BrowserError::NoSuchId {
            scope: Scope::Document,
            key: "#missingid".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Document"));
        assert!(message.contains("#missingid"));
        assert_eq!(err.kind(), ErrorKind::Lookup);
    }

    #[test]
    fn test_only_wait_timeout_is_assertion() {
        let timeout = BrowserError::WaitTimeout {
            condition: "element:#a".to_string(),
            timeout_ms: 100,
        };
        assert!(timeout.is_assertion());
        assert!(!BrowserError::Transport("refused".to_string()).is_assertion());
        assert!(!BrowserError::state("nope").is_assertion());
    }

    #[test]
    fn test_process_failure_carries_output() {
        let err = BrowserError::ProcessFailed {
            message: "exited during startup".to_string(),
            output: "Address already in use".to_string(),
        };
        assert!(err.to_string().contains("Address already in use"));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
