use anyhow::Context;
use clap::{Parser, Subcommand};
use fieldtest::core::config::DEFAULT_CONFIG_FILE;
use fieldtest::core::{Configuration, Driver, RunnerOptions, Tool};
use fieldtest::lifecycle::{self, Declaration, WebBrowser};
use fieldtest::wait::Wait;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Drive a page through any configured browser backend.
#[derive(Parser)]
#[command(name = "fieldtest")]
#[command(about = "Functional-testing browser over remote, in-process and null backends")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./fieldtest.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named configuration whose sections take precedence over `default`
    #[arg(long, default_value = "default", global = true)]
    configuration: String,

    /// Browser frontend to use instead of the configured default target
    #[arg(long, global = true)]
    frontend: Option<String>,

    /// Base URL of the application under test
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Do not start the configured server command
    #[arg(long, global = true)]
    without_server: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a URL and describe the resulting page
    Open {
        url: String,

        /// Condition to wait for: page, ajax, duration, js:<expr>,
        /// element:<css> or !element:<css>
        #[arg(long)]
        wait_for: Option<String>,

        /// Wait timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn load_configuration(path: Option<&Path>) -> fieldtest::Result<Configuration> {
    match path {
        Some(path) => Configuration::load(path),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Configuration::load(Path::new(DEFAULT_CONFIG_FILE))
        }
        None => Ok(Configuration::builtin()),
    }
}

fn describe(driver: &dyn Driver) -> fieldtest::Result<()> {
    println!("backend:      {}", driver.name());
    println!("capabilities: {}", driver.capabilities());
    println!(
        "status:       {}",
        driver.status().unwrap_or_else(|| "-".to_string())
    );
    println!(
        "location:     {}",
        driver.location().unwrap_or_else(|| "-".to_string())
    );

    let document = driver.document()?;
    if let Some(title) = document.title() {
        println!("title:        {}", title);
    }
    println!();
    println!("{}", document.text_content());

    for (index, form) in document.forms().iter().enumerate() {
        println!();
        println!(
            "form {} ({} {}):",
            index,
            form.method(),
            form.action().unwrap_or("<current page>")
        );
        for name in form.inputs().names() {
            println!("  {}", name);
        }
    }
    Ok(())
}

async fn open(
    browser: &mut WebBrowser,
    url: &str,
    wait_for: Option<&str>,
    timeout: Option<u64>,
) -> fieldtest::Result<()> {
    let wait = Wait::parse(wait_for.unwrap_or(""), timeout)?;
    let driver = browser.activate().await?;
    driver.open(url, wait).await?;
    describe(driver)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    lifecycle::init();

    let config = load_configuration(cli.config.as_deref())
        .context("Failed to load the configuration")?;
    let mut options = RunnerOptions {
        config_file: cli.config.clone(),
        without_server: cli.without_server,
        server_url: cli.server_url.clone(),
        ..Default::default()
    };
    if let Some(frontend) = &cli.frontend {
        options = options.with_frontend(Tool::Browser, frontend);
    }

    match cli.command {
        Commands::Open {
            url,
            wait_for,
            timeout,
        } => {
            let declaration =
                Declaration::new(Tool::Browser).with_configuration(&cli.configuration);
            let mut browser = WebBrowser::new("browser");
            let target = browser
                .configure(&config, &declaration, &options)
                .with_context(|| format!("No browser for configuration {:?}", cli.configuration))?;
            info!(
                "Using {} ({}) from {}",
                target.backend,
                target.frontend,
                config.source()
            );

            let opened = open(&mut browser, &url, wait_for.as_deref(), timeout).await;
            let deactivated = browser.deactivate().await;
            if let Err(err) = &opened {
                error!("Opening {} failed: {}", url, err);
            }
            opened.with_context(|| format!("Failed to open {}", url))?;
            deactivated.context("Failed to shut the browser down")?;
        }
    }
    Ok(())
}
