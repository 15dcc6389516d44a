use crate::core::{Configuration, RunnerOptions, Section, Tool};
use crate::errors::{BrowserError, Result};
use crate::lifecycle::registry::{qualified_name, BackendContext};
use tracing::{debug, info};

pub const DEFAULT_FRONTEND: &str = "default";

pub const DEFAULT_TARGETS_SECTION: &str = "default-targets";

/// What a test suite declares about one tool it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub tool: Tool,
    /// Named configuration, e.g. `staging`; sections fall back to
    /// `default`.
    pub configuration: String,
    pub default_target: Option<String>,
}

impl Declaration {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            configuration: "default".to_string(),
            default_target: None,
        }
    }

    pub fn with_configuration(mut self, configuration: &str) -> Self {
        self.configuration = configuration.to_string();
        self
    }

    pub fn with_default_target(mut self, target: &str) -> Self {
        self.default_target = Some(target.to_string());
        self
    }
}

/// A resolved backend: which manager to build and the settings to
/// build it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub tool: Tool,
    pub frontend: String,
    pub backend: String,
    /// Registry name of the manager factory.
    pub entry_point: String,
    pub section: Section,
}

impl Target {
    pub fn context(&self, options: &RunnerOptions) -> BackendContext {
        BackendContext {
            backend: self.backend.clone(),
            section: self.section.clone(),
            options: options.clone(),
        }
    }
}

fn frontend(
    config: &Configuration,
    declaration: &Declaration,
    options: &RunnerOptions,
) -> Result<String> {
    let requested = options
        .frontend(declaration.tool)
        .map(str::to_string)
        .or_else(|| declaration.default_target.clone())
        .unwrap_or_else(|| DEFAULT_FRONTEND.to_string());
    if requested != DEFAULT_FRONTEND {
        return Ok(requested);
    }

    let wanted = format!("{}+{}", declaration.configuration, declaration.tool);
    let targets = config
        .section(DEFAULT_TARGETS_SECTION)
        .map_err(|_| BrowserError::NoDefaultTarget(wanted.clone()))?;
    targets
        .get(&wanted)
        .or_else(|| targets.get(&format!("default+{}", declaration.tool)))
        .cloned()
        .ok_or(BrowserError::NoDefaultTarget(wanted))
}

/// Resolves the frontend a run asks for into a backend, its registry
/// entry point and its settings.
pub fn resolve(
    config: &Configuration,
    declaration: &Declaration,
    options: &RunnerOptions,
) -> Result<Target> {
    let tool = declaration.tool;
    let frontend = frontend(config, declaration, options)?;

    let mapping = config.section_with_fallback("{name}", &declaration.configuration)?;
    let backend = mapping
        .get(&frontend)
        .or_else(|| mapping.get("*"))
        .cloned()
        .ok_or_else(|| BrowserError::UnknownBackend {
            tool: tool.to_string(),
            frontend: frontend.clone(),
            backend: "*".to_string(),
            source_name: config.source().to_string(),
        })?;

    let entry_point = config
        .section(&format!("{}.backends", tool))
        .ok()
        .and_then(|backends| backends.get(&backend).cloned())
        .unwrap_or_else(|| qualified_name(tool, &backend));

    let section = config
        .section_with_fallback(
            &format!("{{name}}+{}.{}", tool, backend),
            &declaration.configuration,
        )?
        .clone();

    info!(
        "Resolved {} frontend {:?} to backend {:?} ({})",
        tool, frontend, backend, entry_point
    );
    debug!("Backend settings: {:?}", section);
    Ok(Target {
        tool,
        frontend,
        backend,
        entry_point,
        section,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[default-targets]
"default+browser" = "zero"
"staging+browser" = "in-process"

[staging]
in-process = "in-process"
"*" = "remote"

["default+browser.in-process"]
server-entry-point = "fieldtest::testing::fixture"

["staging+browser.remote"]
server_url = "http://staging.test"

[browser.backends]
remote = "site::browser::grid"
"#;

    fn config() -> Configuration {
        Configuration::load_str(CONFIG, "fieldtest.toml").unwrap()
    }

    #[test]
    fn test_default_target_falls_back_to_default_configuration() {
        let declaration = Declaration::new(Tool::Browser).with_configuration("qa");
        let target = resolve(&config(), &declaration, &RunnerOptions::default()).unwrap();
        assert_eq!(target.frontend, "zero");
        assert_eq!(target.backend, "zero");
        assert_eq!(target.entry_point, "fieldtest::browser::zero");
        assert!(target.section.is_empty());
    }

    #[test]
    fn test_configuration_specific_target() {
        let declaration = Declaration::new(Tool::Browser).with_configuration("staging");
        let target = resolve(&config(), &declaration, &RunnerOptions::default()).unwrap();
        assert_eq!(target.backend, "in-process");
        assert_eq!(
            target.section.get("server-entry-point").map(String::as_str),
            Some("fieldtest::testing::fixture")
        );
    }

    #[test]
    fn test_runner_frontend_wins_and_star_maps_the_rest() {
        let declaration = Declaration::new(Tool::Browser)
            .with_configuration("staging")
            .with_default_target("zero");
        let options = RunnerOptions::default().with_frontend(Tool::Browser, "firefox");
        let target = resolve(&config(), &declaration, &options).unwrap();
        assert_eq!(target.frontend, "firefox");
        assert_eq!(target.backend, "remote");
        assert_eq!(target.entry_point, "site::browser::grid");
        assert_eq!(
            target.section.get("server_url").map(String::as_str),
            Some("http://staging.test")
        );
    }

    #[test]
    fn test_declared_default_target() {
        let declaration = Declaration::new(Tool::Browser).with_default_target("zero");
        let target = resolve(&Configuration::builtin(), &declaration, &RunnerOptions::default())
            .unwrap();
        assert_eq!(target.backend, "zero");
    }

    #[test]
    fn test_no_default_target() {
        let declaration = Declaration::new(Tool::ApiClient);
        let err = resolve(&Configuration::builtin(), &declaration, &RunnerOptions::default())
            .unwrap_err();
        assert!(matches!(err, BrowserError::NoDefaultTarget(ref key) if key == "default+apiclient"));
    }

    #[test]
    fn test_missing_backend_section_names_it() {
        let declaration = Declaration::new(Tool::Browser).with_default_target("firefox");
        let err = resolve(&Configuration::builtin(), &declaration, &RunnerOptions::default())
            .unwrap_err();
        match err {
            BrowserError::MissingSection {
                section,
                source_name,
            } => {
                assert_eq!(section, "default+browser.remote");
                assert_eq!(source_name, "<built-in>");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_backend_without_star() {
        let config = Configuration::load_str("[default]\nzero = \"zero\"\n", "mini.toml").unwrap();
        let declaration = Declaration::new(Tool::Browser).with_default_target("chrome");
        let err = resolve(&config, &declaration, &RunnerOptions::default()).unwrap_err();
        assert!(matches!(err, BrowserError::UnknownBackend { ref frontend, .. } if frontend == "chrome"));
    }
}
