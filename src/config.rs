use crate::cli::{Cli, OutputFormat, VerbosityLevel};
use crate::parsers::ParserRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;

const APP_NAME: &str = "xml-report-watcher";
const ENV_PREFIX: &str = "XML_REPORT_";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub watch: WatchConfig,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
}

/// Which files are watched, and where
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Directories scanned for reports (non-recursive)
    pub roots: Vec<PathBuf>,
    /// Report dialect key
    pub dialect: String,
    /// Milliseconds between two scans
    pub scan_interval_ms: u64,
    /// Include patterns (glob syntax)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax)
    pub exclude_patterns: Vec<String>,
    /// File extensions to watch
    pub extensions: Vec<String>,
    /// Only files modified after this instant are reported; defaults to startup time
    pub build_start: Option<DateTime<Utc>>,
    /// Directory that reported source paths are made relative to
    pub base_dir: Option<PathBuf>,
}

/// Retry and shutdown timing of the report processor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Attempts without growth before a report is abandoned
    pub retry_budget: u32,
    /// Pause between two attempts on the same report
    pub backoff_ms: u64,
    /// Bound on one wait for a new report
    pub poll_timeout_ms: u64,
    /// How long the queue is drained after the build finished
    pub final_drain_ms: u64,
    /// Fail the run when more inspection errors than this are reported
    pub max_errors: Option<usize>,
    /// Fail the run when more inspection warnings than this are reported
    pub max_warnings: Option<usize>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Debug output
    pub debug: bool,
    /// Quiet mode (warnings and errors only)
    pub quiet: bool,
}

impl OutputConfig {
    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.debug {
            VerbosityLevel::Debug
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    #[default]
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: vec![],
            dialect: "junit".to_string(),
            scan_interval_ms: 100,
            include_patterns: vec![],
            exclude_patterns: vec![],
            extensions: vec!["xml".to_string()],
            build_start: None,
            base_dir: None,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            retry_budget: 100,
            backoff_ms: 300,
            poll_timeout_ms: 500,
            final_drain_ms: 5000,
            max_errors: None,
            max_warnings: None,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub fn load_config(cli: &Cli, registry: &ParserRegistry) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path)?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file()? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config, registry)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            format!("{APP_NAME}.toml"),
            format!("{APP_NAME}.json"),
            format!(".{APP_NAME}.toml"),
            format!(".{APP_NAME}.json"),
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join(APP_NAME);
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Watch settings
        if let Some(roots) = env.get(&format!("{ENV_PREFIX}ROOTS")) {
            config.watch.roots = std::env::split_paths(&roots)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(dialect) = env.get(&format!("{ENV_PREFIX}DIALECT")) {
            config.watch.dialect = dialect;
        }
        if let Some(interval) = parse_env(env, "SCAN_INTERVAL_MS")? {
            config.watch.scan_interval_ms = interval;
        }
        if let Some(extensions) = env.get(&format!("{ENV_PREFIX}EXTENSIONS")) {
            config.watch.extensions = split_list(&extensions);
        }
        if let Some(base_dir) = env.get(&format!("{ENV_PREFIX}BASE_DIR")) {
            config.watch.base_dir = Some(PathBuf::from(base_dir));
        }
        if let Some(start) = env.get(&format!("{ENV_PREFIX}BUILD_START")) {
            let parsed = DateTime::parse_from_rfc3339(&start).map_err(|_| {
                ConfigError::Environment(format!("Invalid {ENV_PREFIX}BUILD_START value: {start}"))
            })?;
            config.watch.build_start = Some(parsed.with_timezone(&Utc));
        }

        // Processing settings
        if let Some(budget) = parse_env(env, "RETRY_BUDGET")? {
            config.processing.retry_budget = budget;
        }
        if let Some(backoff) = parse_env(env, "BACKOFF_MS")? {
            config.processing.backoff_ms = backoff;
        }
        if let Some(timeout) = parse_env(env, "POLL_TIMEOUT_MS")? {
            config.processing.poll_timeout_ms = timeout;
        }
        if let Some(drain) = parse_env(env, "FINAL_DRAIN_MS")? {
            config.processing.final_drain_ms = drain;
        }
        if let Some(limit) = parse_env(env, "MAX_ERRORS")? {
            config.processing.max_errors = Some(limit);
        }
        if let Some(limit) = parse_env(env, "MAX_WARNINGS")? {
            config.processing.max_warnings = Some(limit);
        }

        // Output settings
        if let Some(verbose) = parse_env(env, "VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = parse_env(env, "QUIET")? {
            config.output.quiet = quiet;
        }
        if let Some(format) = env.get(&format!("{ENV_PREFIX}FORMAT")) {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {ENV_PREFIX}FORMAT value: {format}"
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        // Watch settings
        if !cli.roots.is_empty() {
            config.watch.roots = cli.roots.clone();
        }
        if let Some(dialect) = &cli.dialect {
            config.watch.dialect = dialect.clone();
        }
        if let Some(interval) = cli.scan_interval_ms {
            config.watch.scan_interval_ms = interval;
        }
        if let Some(extensions) = cli.get_extensions() {
            config.watch.extensions = extensions;
        }
        if !cli.include_patterns.is_empty() {
            config.watch.include_patterns = cli.include_patterns.clone();
        }
        if !cli.exclude_patterns.is_empty() {
            config.watch.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.since.is_some() {
            config.watch.build_start = cli.since;
        }
        if cli.base_dir.is_some() {
            config.watch.base_dir = cli.base_dir.clone();
        }

        // Processing settings
        if let Some(budget) = cli.retry_budget {
            config.processing.retry_budget = budget;
        }
        if let Some(backoff) = cli.backoff_ms {
            config.processing.backoff_ms = backoff;
        }
        if cli.max_errors.is_some() {
            config.processing.max_errors = cli.max_errors;
        }
        if cli.max_warnings.is_some() {
            config.processing.max_warnings = cli.max_warnings;
        }

        // Output settings
        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose > 0 {
            config.output.verbose = true;
            config.output.debug = cli.verbose > 1;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
            config.output.debug = false;
        }

        config
    }

    /// Merge two configurations (second takes precedence for non-empty values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        // Watch settings
        if !override_config.watch.roots.is_empty() {
            base.watch.roots = override_config.watch.roots;
        }
        base.watch.dialect = override_config.watch.dialect;
        base.watch.scan_interval_ms = override_config.watch.scan_interval_ms;
        if !override_config.watch.extensions.is_empty() {
            base.watch.extensions = override_config.watch.extensions;
        }
        if !override_config.watch.include_patterns.is_empty() {
            base.watch.include_patterns = override_config.watch.include_patterns;
        }
        if !override_config.watch.exclude_patterns.is_empty() {
            base.watch.exclude_patterns = override_config.watch.exclude_patterns;
        }
        if override_config.watch.build_start.is_some() {
            base.watch.build_start = override_config.watch.build_start;
        }
        if override_config.watch.base_dir.is_some() {
            base.watch.base_dir = override_config.watch.base_dir;
        }

        base.processing = override_config.processing;
        base.output = override_config.output;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config, registry: &ParserRegistry) -> Result<()> {
        if config.watch.roots.is_empty() {
            return Err(ConfigError::Validation(
                "At least one root directory must be specified".to_string(),
            ));
        }

        if !registry.contains(&config.watch.dialect) {
            let known: Vec<&str> = registry.keys().collect();
            return Err(ConfigError::Validation(format!(
                "Unknown report dialect '{}' (known: {})",
                config.watch.dialect,
                known.join(", ")
            )));
        }

        if config.watch.scan_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Scan interval must be greater than 0".to_string(),
            ));
        }

        if config.processing.retry_budget == 0 {
            return Err(ConfigError::Validation(
                "Retry budget must be greater than 0".to_string(),
            ));
        }

        if config.processing.poll_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Poll timeout must be greater than 0".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.watch.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }

        for ext in &config.watch.extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {ext}"
                )));
            }
        }

        Ok(())
    }

    /// Instant after which modified files count as build output
    pub fn get_build_start(config: &Config) -> Option<SystemTime> {
        config.watch.build_start.map(SystemTime::from)
    }

    pub fn get_scan_interval(config: &Config) -> Duration {
        Duration::from_millis(config.watch.scan_interval_ms)
    }

    pub fn get_backoff(config: &Config) -> Duration {
        Duration::from_millis(config.processing.backoff_ms)
    }

    pub fn get_poll_timeout(config: &Config) -> Duration {
        Duration::from_millis(config.processing.poll_timeout_ms)
    }

    pub fn get_final_drain(config: &Config) -> Duration {
        Duration::from_millis(config.processing.final_drain_ms)
    }
}

fn parse_env<T: FromStr>(env: &impl EnvProvider, name: &str) -> Result<Option<T>> {
    let key = format!("{ENV_PREFIX}{name}");
    env.get(&key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {key} value: {value}")))
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.watch.roots = vec![PathBuf::from("/build/reports")];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.watch.roots.is_empty());
        assert_eq!(config.watch.dialect, "junit");
        assert_eq!(config.watch.scan_interval_ms, 100);
        assert_eq!(config.watch.extensions, vec!["xml"]);
        assert!(config.watch.include_patterns.is_empty());
        assert!(config.watch.build_start.is_none());

        assert_eq!(config.processing.retry_budget, 100);
        assert_eq!(config.processing.backoff_ms, 300);
        assert_eq!(config.processing.poll_timeout_ms, 500);
        assert_eq!(config.processing.final_drain_ms, 5000);

        assert_eq!(config.output.format, OutputFormatConfig::Human);
        assert_eq!(config.output.verbosity(), VerbosityLevel::Normal);
    }

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[watch]
roots = ["/build/test-results", "/build/other"]
dialect = "testng"
scan_interval_ms = 250
include_patterns = ["TEST-*"]
extensions = ["xml", "trx"]
build_start = "2026-03-01T10:00:00Z"

[processing]
retry_budget = 20
backoff_ms = 50

[output]
format = "json"
verbose = true
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();

        assert_eq!(
            config.watch.roots,
            vec![PathBuf::from("/build/test-results"), PathBuf::from("/build/other")]
        );
        assert_eq!(config.watch.dialect, "testng");
        assert_eq!(config.watch.scan_interval_ms, 250);
        assert_eq!(config.watch.include_patterns, vec!["TEST-*"]);
        assert_eq!(config.watch.extensions, vec!["xml", "trx"]);
        assert_eq!(
            config.watch.build_start.map(|t| t.timestamp()),
            Some(1_772_359_200)
        );

        assert_eq!(config.processing.retry_budget, 20);
        assert_eq!(config.processing.backoff_ms, 50);
        // unspecified values keep their defaults
        assert_eq!(config.processing.final_drain_ms, 5000);

        assert_eq!(config.output.format, OutputFormatConfig::Json);
        assert_eq!(config.output.verbosity(), VerbosityLevel::Verbose);
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json_content = r#"{
  "watch": { "roots": ["reports"], "dialect": "ctest" },
  "processing": { "retry_budget": 3, "poll_timeout_ms": 20 },
  "output": { "quiet": true }
}"#;
        fs::write(&config_path, json_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();
        assert_eq!(config.watch.roots, vec![PathBuf::from("reports")]);
        assert_eq!(config.watch.dialect, "ctest");
        assert_eq!(config.processing.retry_budget, 3);
        assert_eq!(config.processing.poll_timeout_ms, 20);
        assert_eq!(config.output.verbosity(), VerbosityLevel::Quiet);
    }

    #[test]
    fn test_load_without_extension_tries_toml_then_json() {
        let temp_dir = TempDir::new().unwrap();
        let toml_path = temp_dir.path().join("watcherrc");
        fs::write(&toml_path, "[watch]\ndialect = \"nunit\"\n").unwrap();
        assert_eq!(
            ConfigManager::load_from_file(&toml_path).unwrap().watch.dialect,
            "nunit"
        );

        let json_path = temp_dir.path().join("watcherjson");
        fs::write(&json_path, r#"{"watch": {"dialect": "pmd"}}"#).unwrap();
        assert_eq!(
            ConfigManager::load_from_file(&json_path).unwrap().watch.dialect,
            "pmd"
        );
    }

    #[test]
    fn test_unsupported_and_invalid_files() {
        let temp_dir = TempDir::new().unwrap();

        let yaml = temp_dir.path().join("config.yaml");
        fs::write(&yaml, "watch: {}").unwrap();
        assert!(matches!(
            ConfigManager::load_from_file(&yaml),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"
        ));

        let toml_path = temp_dir.path().join("config.toml");
        fs::write(&toml_path, "[watch\nroots = ").unwrap();
        assert!(matches!(
            ConfigManager::load_from_file(&toml_path),
            Err(ConfigError::TomlParsing(_))
        ));

        let json_path = temp_dir.path().join("config.json");
        fs::write(&json_path, "{ \"watch\": ").unwrap();
        assert!(matches!(
            ConfigManager::load_from_file(&json_path),
            Err(ConfigError::JsonParsing(_))
        ));

        assert!(matches!(
            ConfigManager::load_from_file(&temp_dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = MockEnvProvider::new();
        env.set("XML_REPORT_DIALECT", "nunit");
        env.set("XML_REPORT_SCAN_INTERVAL_MS", "40");
        env.set("XML_REPORT_RETRY_BUDGET", " 9 ");
        env.set("XML_REPORT_BACKOFF_MS", "15");
        env.set("XML_REPORT_FINAL_DRAIN_MS", "1000");
        env.set("XML_REPORT_EXTENSIONS", "xml, trx,");
        env.set("XML_REPORT_BUILD_START", "2026-03-01T10:00:00+01:00");
        env.set("XML_REPORT_QUIET", "true");
        env.set("XML_REPORT_FORMAT", "JSON");

        let config = ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();

        assert_eq!(config.watch.dialect, "nunit");
        assert_eq!(config.watch.scan_interval_ms, 40);
        assert_eq!(config.processing.retry_budget, 9);
        assert_eq!(config.processing.backoff_ms, 15);
        assert_eq!(config.processing.final_drain_ms, 1000);
        assert_eq!(config.watch.extensions, vec!["xml", "trx"]);
        assert_eq!(
            config.watch.build_start.map(|t| t.timestamp()),
            Some(1_772_355_600)
        );
        assert!(config.output.quiet);
        assert_eq!(config.output.format, OutputFormatConfig::Json);
    }

    #[test]
    fn test_invalid_environment_values() {
        for (key, value) in [
            ("XML_REPORT_RETRY_BUDGET", "lots"),
            ("XML_REPORT_VERBOSE", "yes"),
            ("XML_REPORT_FORMAT", "xml"),
            ("XML_REPORT_BUILD_START", "noon"),
        ] {
            let mut env = MockEnvProvider::new();
            env.set(key, value);
            let result = ConfigManager::apply_environment_overrides_with(&env, Config::default());
            match result {
                Err(ConfigError::Environment(message)) => assert!(message.contains(key)),
                other => panic!("{key}={value} gave {other:?}"),
            }
        }
    }

    #[test]
    fn test_merge_with_cli() {
        let cli = Cli::try_parse_from([
            "xml-report-watcher",
            "--dialect",
            "trx",
            "--retry-budget",
            "5",
            "--include",
            "*.trx",
            "-e",
            "trx",
            "-q",
            "out/TestResults",
        ])
        .unwrap();

        let mut base = valid_config();
        base.output.verbose = true;
        base.watch.exclude_patterns = vec!["old-*".to_string()];
        let config = ConfigManager::merge_with_cli(base, &cli);

        assert_eq!(config.watch.roots, vec![PathBuf::from("out/TestResults")]);
        assert_eq!(config.watch.dialect, "trx");
        assert_eq!(config.processing.retry_budget, 5);
        assert_eq!(config.processing.backoff_ms, 300);
        assert_eq!(config.watch.include_patterns, vec!["*.trx"]);
        assert_eq!(config.watch.exclude_patterns, vec!["old-*"]);
        assert_eq!(config.watch.extensions, vec!["trx"]);
        assert_eq!(config.output.verbosity(), VerbosityLevel::Quiet);
        assert!(!config.output.verbose);
    }

    #[test]
    fn test_merge_configs() {
        let mut base = valid_config();
        base.watch.include_patterns = vec!["TEST-*".to_string()];

        let mut override_config = Config::default();
        override_config.watch.dialect = "gtest".to_string();
        override_config.processing.retry_budget = 42;

        let merged = ConfigManager::merge_configs(base, override_config);
        assert_eq!(merged.watch.roots, vec![PathBuf::from("/build/reports")]);
        assert_eq!(merged.watch.include_patterns, vec!["TEST-*"]);
        assert_eq!(merged.watch.dialect, "gtest");
        assert_eq!(merged.processing.retry_budget, 42);
    }

    #[test]
    fn test_config_validation() {
        let registry = ParserRegistry::with_builtin();
        assert!(ConfigManager::validate_config(&valid_config(), &registry).is_ok());

        let invalid: Vec<(Box<dyn Fn(&mut Config)>, &str)> = vec![
            (Box::new(|c: &mut Config| c.watch.roots.clear()), "root directory"),
            (Box::new(|c: &mut Config| c.watch.dialect = "xunit".into()), "Unknown report dialect 'xunit'"),
            (Box::new(|c: &mut Config| c.watch.scan_interval_ms = 0), "Scan interval"),
            (Box::new(|c: &mut Config| c.processing.retry_budget = 0), "Retry budget"),
            (Box::new(|c: &mut Config| c.processing.poll_timeout_ms = 0), "Poll timeout"),
            (
                Box::new(|c: &mut Config| {
                    c.output.verbose = true;
                    c.output.quiet = true;
                }),
                "both verbose and quiet",
            ),
            (Box::new(|c: &mut Config| c.watch.extensions.clear()), "file extension"),
            (Box::new(|c: &mut Config| c.watch.extensions = vec![".xml".into()]), "Invalid file extension"),
        ];

        for (mutate, expected) in invalid {
            let mut config = valid_config();
            mutate(&mut config);
            match ConfigManager::validate_config(&config, &registry) {
                Err(ConfigError::Validation(message)) => {
                    assert!(message.contains(expected), "{message} lacks {expected}")
                }
                other => panic!("expected validation error containing {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_load_config_with_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("watch.toml");
        fs::write(
            &config_path,
            "[watch]\nroots = [\"from-file\"]\ndialect = \"nunit\"\n[processing]\nretry_budget = 7\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "xml-report-watcher",
            "--config",
            config_path.to_str().unwrap(),
            "--retry-budget",
            "3",
        ])
        .unwrap();
        let config = ConfigManager::load_config(&cli, &ParserRegistry::with_builtin()).unwrap();
        assert_eq!(config.watch.roots, vec![PathBuf::from("from-file")]);
        assert_eq!(config.watch.dialect, "nunit");
        assert_eq!(config.processing.retry_budget, 3);
    }

    #[test]
    fn test_utility_getters() {
        let mut config = valid_config();
        config.watch.build_start = Some(DateTime::<Utc>::UNIX_EPOCH);

        assert_eq!(ConfigManager::get_scan_interval(&config), Duration::from_millis(100));
        assert_eq!(ConfigManager::get_backoff(&config), Duration::from_millis(300));
        assert_eq!(ConfigManager::get_poll_timeout(&config), Duration::from_millis(500));
        assert_eq!(ConfigManager::get_final_drain(&config), Duration::from_secs(5));
        assert_eq!(ConfigManager::get_build_start(&config), Some(SystemTime::UNIX_EPOCH));
    }
}
