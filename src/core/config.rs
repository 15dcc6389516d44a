use crate::errors::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A flat string-to-string configuration table.
pub type Section = BTreeMap<String, String>;

pub const DEFAULT_CONFIG_FILE: &str = "fieldtest.toml";

/// Test tools whose backends are configured independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Browser,
    ApiClient,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Browser => "browser",
            Tool::ApiClient => "apiclient",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named sections read from TOML, layered over built-in defaults.
#[derive(Debug, Clone)]
pub struct Configuration {
    source: String,
    sections: BTreeMap<String, Section>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Configuration {
    pub fn builtin() -> Self {
        let mut sections = BTreeMap::new();
        let mut mapping = Section::new();
        mapping.insert("in-process".to_string(), "in-process".to_string());
        mapping.insert("zero".to_string(), "zero".to_string());
        mapping.insert("network".to_string(), "network".to_string());
        mapping.insert("*".to_string(), "remote".to_string());
        sections.insert("default".to_string(), mapping);
        sections.insert("default+browser.zero".to_string(), Section::new());
        sections.insert("default+apiclient.in-process".to_string(), Section::new());
        Self {
            source: "<built-in>".to_string(),
            sections,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BrowserError::MissingSection {
                section: "<file>".to_string(),
                source_name: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Self::load_str(&text, &path.display().to_string())
    }

    /// Parses TOML text; its sections replace built-in sections of the
    /// same name.
    pub fn load_str(text: &str, source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;
        let mut config = Self::builtin();
        config.source = source.to_string();
        for (name, value) in table {
            flatten_section(&name, value, &mut config.sections);
        }
        Ok(config)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn section(&self, name: &str) -> Result<&Section> {
        self.sections
            .get(name)
            .ok_or_else(|| BrowserError::MissingSection {
                section: name.to_string(),
                source_name: self.source.clone(),
            })
    }

    /// Looks up `template` with `{name}` replaced by `name`, then by
    /// `default`.
    pub fn section_with_fallback(&self, template: &str, name: &str) -> Result<&Section> {
        let wanted = template.replace("{name}", name);
        if let Some(section) = self.sections.get(&wanted) {
            return Ok(section);
        }
        let fallback = template.replace("{name}", "default");
        match self.sections.get(&fallback) {
            Some(section) => {
                debug!("Section {:?} not found, using {:?}", wanted, fallback);
                Ok(section)
            }
            None => Err(BrowserError::MissingSection {
                section: wanted,
                source_name: self.source.clone(),
            }),
        }
    }
}

fn scalar(value: toml::Value) -> Option<String> {
    match value {
        toml::Value::String(text) => Some(text),
        toml::Value::Integer(n) => Some(n.to_string()),
        toml::Value::Float(n) => Some(n.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(scalar)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        toml::Value::Table(_) => None,
    }
}

/// `[browser.backends]` parses as nested tables; each level with scalar
/// keys becomes its own dotted section.
fn flatten_section(name: &str, value: toml::Value, sections: &mut BTreeMap<String, Section>) {
    let table = match value {
        toml::Value::Table(table) => table,
        _ => return,
    };
    let mut section = Section::new();
    for (key, value) in table {
        match value {
            toml::Value::Table(_) => {
                flatten_section(&format!("{}.{}", name, key), value, sections)
            }
            other => {
                if let Some(text) = scalar(other) {
                    section.insert(key, text);
                }
            }
        }
    }
    if !section.is_empty() || !sections.contains_key(name) {
        sections.insert(name.to_string(), section);
    }
}

/// Settings supplied by whatever drives the test run. These win over
/// every configuration file value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerOptions {
    pub config_file: Option<PathBuf>,
    pub without_server: bool,
    pub server_url: Option<String>,
    pub frontends: BTreeMap<Tool, String>,
    pub extra: BTreeMap<String, String>,
}

impl RunnerOptions {
    pub fn with_frontend(mut self, tool: Tool, frontend: &str) -> Self {
        self.frontends.insert(tool, frontend.to_string());
        self
    }

    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server_url = Some(url.to_string());
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn frontend(&self, tool: Tool) -> Option<&str> {
        self.frontends.get(&tool).map(String::as_str)
    }

    fn get(&self, key: &str) -> Option<String> {
        match key {
            "server_url" => self.server_url.clone(),
            "without_server" if self.without_server => Some("true".to_string()),
            _ => self.extra.get(key).cloned(),
        }
    }
}

fn spellings(key: &str) -> [String; 2] {
    [key.replace('-', "_"), key.replace('_', "-")]
}

/// Reads `key` from the runner options, then `section`. Dashes and
/// underscores in key names are interchangeable.
pub fn setting(options: &RunnerOptions, section: &Section, key: &str) -> Option<String> {
    let spelled = spellings(key);
    spelled
        .iter()
        .find_map(|k| options.get(k))
        .or_else(|| spelled.iter().find_map(|k| section.get(k).cloned()))
}

pub fn flag(options: &RunnerOptions, section: &Section, key: &str) -> bool {
    setting(options, section, key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
["default+browser.in-process"]
server-entry-point = "fixture"
base_url = "http://localhost/"

["staging+browser.remote"]
server_url = "http://staging.example.com"
timeout = 5000
headless = true

[default-targets]
"default+browser" = "zero"

[browser.backends]
custom = "fieldtest::browser::zero"
"#;

    #[test]
    fn test_builtin_defaults() {
        let config = Configuration::builtin();
        let mapping = config.section("default").unwrap();
        assert_eq!(mapping.get("*").map(String::as_str), Some("remote"));
        assert!(config.has_section("default+browser.zero"));
    }

    #[test]
    fn test_load_str_flattens_and_stringifies() {
        let config = Configuration::load_str(CONFIG, "test.toml").unwrap();
        let remote = config.section("staging+browser.remote").unwrap();
        assert_eq!(remote["timeout"], "5000");
        assert_eq!(remote["headless"], "true");
        let backends = config.section("browser.backends").unwrap();
        assert_eq!(backends["custom"], "fieldtest::browser::zero");
        assert!(config.has_section("default"));
    }

    #[test]
    fn test_section_fallback_and_error() {
        let config = Configuration::load_str(CONFIG, "test.toml").unwrap();
        let section = config
            .section_with_fallback("{name}+browser.in-process", "staging")
            .unwrap();
        assert_eq!(section["server-entry-point"], "fixture");

        let err = config
            .section_with_fallback("{name}+browser.remote", "prod")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("prod+browser.remote"));
        assert!(message.contains("test.toml"));
    }

    #[test]
    fn test_runner_options_win() {
        let config = Configuration::load_str(CONFIG, "test.toml").unwrap();
        let section = config.section("staging+browser.remote").unwrap();
        let options = RunnerOptions::default();
        assert_eq!(
            setting(&options, section, "server-url").as_deref(),
            Some("http://staging.example.com")
        );
        let options = options.with_server_url("http://override");
        assert_eq!(
            setting(&options, section, "server_url").as_deref(),
            Some("http://override")
        );
        assert!(flag(&options, section, "headless"));
        assert!(!flag(&options, section, "without_server"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = Configuration::load(file.path()).unwrap();
        assert_eq!(config.source(), file.path().display().to_string());
        assert!(Configuration::load(Path::new("/no/such/fieldtest.toml")).is_err());
        assert!(matches!(
            Configuration::load_str("[broken", "bad.toml"),
            Err(BrowserError::ConfigParse(_))
        ));
    }
}
