pub mod cli;
pub mod toml_config;

use crate::core::store::{app_id, parse_app_id};
use crate::domain::model::{AppOverride, MissingRoutePolicy};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use toml_config::TomlConfig;

#[cfg(feature = "cli")]
use clap::Parser;

pub const DEFAULT_OUTPUT_DIR: &str = "./generated";
pub const DEFAULT_BASE_PORT: u16 = 5000;
pub const DEFAULT_WORKERS: usize = 4;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// 命令列參數，未指定的值交由 TOML 或預設值決定
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "pairgen")]
#[command(about = "Instantiate paired backend/frontend templates and check they agree")]
pub struct CliConfig {
    /// Directory holding app_<n>_<role>_<name>.md templates
    #[arg(long)]
    pub input_dir: Option<String>,

    #[arg(long)]
    pub output_dir: Option<String>,

    /// First port handed out by the allocator
    #[arg(long)]
    pub base_port: Option<u16>,

    #[arg(long)]
    pub workers: Option<usize>,

    /// Batch file with shared bindings and per-app overrides
    #[arg(long)]
    pub config: Option<String>,

    /// Severity of a frontend route the backend does not declare (error|warn)
    #[arg(long)]
    pub missing_route_policy: Option<MissingRoutePolicy>,

    /// Extra shared binding, NAME=VALUE (repeatable)
    #[arg(long = "bind", value_parser = parse_binding)]
    pub bindings: Vec<(String, String)>,

    #[arg(long, help = "Check and report only, write nothing")]
    pub dry_run: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[cfg(feature = "cli")]
fn parse_binding(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    Ok((name.trim().to_string(), value.to_string()))
}

/// 合併後的批次設定：預設值 < TOML < 命令列
#[derive(Debug, Clone, Serialize)]
pub struct BatchSettings {
    pub input_dir: Option<String>,
    pub output_dir: String,
    pub base_port: u16,
    pub workers: usize,
    pub dry_run: bool,
    pub missing_route_policy: MissingRoutePolicy,
    pub bindings: BTreeMap<String, String>,
    pub apps: BTreeMap<String, AppOverride>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            base_port: DEFAULT_BASE_PORT,
            workers: DEFAULT_WORKERS,
            dry_run: false,
            missing_route_policy: MissingRoutePolicy::default(),
            bindings: BTreeMap::new(),
            apps: BTreeMap::new(),
        }
    }
}

impl BatchSettings {
    pub fn from_toml(config: TomlConfig) -> Self {
        let defaults = Self::default();
        let batch = config.batch;
        // app_07 與 app_7 視為同一個應用
        let apps = config
            .apps
            .into_iter()
            .map(|(key, app)| match parse_app_id(&key) {
                Some(n) => (app_id(n), app),
                None => (key, app),
            })
            .collect();

        Self {
            input_dir: batch.input_dir,
            output_dir: batch.output_dir.unwrap_or(defaults.output_dir),
            base_port: batch.base_port.unwrap_or(defaults.base_port),
            workers: batch.workers.unwrap_or(defaults.workers),
            dry_run: batch.dry_run.unwrap_or(defaults.dry_run),
            missing_route_policy: batch
                .missing_route_policy
                .unwrap_or(defaults.missing_route_policy),
            bindings: config.bindings,
            apps,
        }
    }

    /// 命令列的值覆蓋設定檔
    #[cfg(feature = "cli")]
    pub fn apply_cli(mut self, cli: &CliConfig) -> Self {
        if let Some(dir) = &cli.input_dir {
            self.input_dir = Some(dir.clone());
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(port) = cli.base_port {
            self.base_port = port;
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(policy) = cli.missing_route_policy {
            self.missing_route_policy = policy;
        }
        self.dry_run |= cli.dry_run;
        for (name, value) in &cli.bindings {
            self.bindings.insert(name.clone(), value.clone());
        }
        self
    }

    /// 讀取 `--config` 指定的檔案 (若有) 並套用命令列覆蓋
    #[cfg(feature = "cli")]
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let base = match &cli.config {
            Some(path) => {
                let toml = TomlConfig::from_file(path)?;
                toml.validate()?;
                Self::from_toml(toml)
            }
            None => Self::default(),
        };
        Ok(base.apply_cli(cli))
    }
}

impl Validate for BatchSettings {
    fn validate(&self) -> Result<()> {
        let input_dir = validation::validate_required_field("input_dir", &self.input_dir)?;
        validation::validate_path("input_dir", input_dir)?;
        validation::validate_path("output_dir", &self.output_dir)?;
        validation::validate_positive_number("workers", self.workers, 1)?;
        validation::validate_range("base_port", self.base_port, 1, u16::MAX)?;
        toml_config::validate_bindings("bindings", &self.bindings)?;
        for (id, app) in &self.apps {
            toml_config::validate_bindings(&format!("apps.{}.bindings", id), &app.bindings)?;
        }
        Ok(())
    }
}

impl ConfigProvider for BatchSettings {
    fn input_dir(&self) -> &str {
        self.input_dir.as_deref().unwrap_or_default()
    }

    fn output_dir(&self) -> &str {
        &self.output_dir
    }

    fn base_port(&self) -> u16 {
        self.base_port
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn missing_route_policy(&self) -> MissingRoutePolicy {
        self.missing_route_policy
    }

    fn global_bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    fn app_override(&self, app_id: &str) -> Option<&AppOverride> {
        self.apps.get(app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::PairgenError;

    fn settings(input: Option<&str>) -> BatchSettings {
        BatchSettings {
            input_dir: input.map(str::to_string),
            ..BatchSettings::default()
        }
    }

    #[test]
    fn test_defaults() {
        let s = settings(Some("./templates"));
        assert_eq!(s.output_dir(), "./generated");
        assert_eq!(s.base_port(), 5000);
        assert_eq!(s.workers(), 4);
        assert_eq!(s.missing_route_policy(), MissingRoutePolicy::Error);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_input_dir_is_required() {
        let err = settings(None).validate().unwrap_err();
        assert!(matches!(err, PairgenError::MissingConfigError { .. }));
    }

    #[test]
    fn test_app_keys_are_normalized() {
        let toml = TomlConfig::from_toml_str("[apps.app_03]\nbackend_port = 8000\n").unwrap();
        let s = BatchSettings::from_toml(toml);
        assert_eq!(s.app_override("app_3").and_then(|a| a.backend_port), Some(8000));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut s = settings(Some("./templates"));
        s.workers = 0;
        assert!(s.validate().is_err());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_overrides_toml() {
        let toml = TomlConfig::from_toml_str(
            "[batch]\ninput_dir = \"./a\"\nbase_port = 6000\nworkers = 2\n[bindings]\nAPP_TITLE = \"Toml\"\n",
        )
        .unwrap();
        let cli = CliConfig::parse_from([
            "pairgen",
            "--base-port",
            "7000",
            "--missing-route-policy",
            "warn",
            "--bind",
            "APP_TITLE=Cli",
            "--dry-run",
        ]);

        let s = BatchSettings::from_toml(toml).apply_cli(&cli);
        assert_eq!(s.input_dir(), "./a");
        assert_eq!(s.base_port(), 7000);
        assert_eq!(s.workers(), 2);
        assert_eq!(s.missing_route_policy(), MissingRoutePolicy::Warn);
        assert_eq!(s.global_bindings()["APP_TITLE"], "Cli");
        assert!(s.dry_run());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_bad_bind_argument() {
        assert!(parse_binding("NO_EQUALS").is_err());
        assert_eq!(
            parse_binding("A_B=x=y").unwrap(),
            ("A_B".to_string(), "x=y".to_string())
        );
    }
}
