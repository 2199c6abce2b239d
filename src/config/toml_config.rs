use crate::core::resolver::is_port_placeholder;
use crate::domain::model::{AppOverride, MissingRoutePolicy};
use crate::utils::error::{PairgenError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// 批次設定檔 (`--config batch.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub batch: BatchSection,
    /// 所有應用共用的變數綁定
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    /// 以 app id 為鍵的個別設定
    #[serde(default)]
    pub apps: BTreeMap<String, AppOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSection {
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub base_port: Option<u16>,
    pub workers: Option<usize>,
    pub missing_route_policy: Option<MissingRoutePolicy>,
    pub dry_run: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PairgenError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| PairgenError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${APP_TITLE})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(dir) = &self.batch.input_dir {
            validation::validate_path("batch.input_dir", dir)?;
        }
        if let Some(dir) = &self.batch.output_dir {
            validation::validate_path("batch.output_dir", dir)?;
        }
        if let Some(workers) = self.batch.workers {
            validation::validate_positive_number("batch.workers", workers, 1)?;
        }

        validate_bindings("bindings", &self.bindings)?;

        for (app_id, app) in &self.apps {
            if crate::core::store::parse_app_id(app_id).is_none() {
                return Err(PairgenError::InvalidConfigValueError {
                    field: "apps".to_string(),
                    value: app_id.clone(),
                    reason: "App keys must look like app_<n>".to_string(),
                });
            }
            for (name, port) in [("backend_port", app.backend_port), ("frontend_port", app.frontend_port)] {
                if let Some(port) = port {
                    validation::validate_range(&format!("apps.{}.{}", app_id, name), port, 1, u16::MAX)?;
                }
            }
            validate_bindings(&format!("apps.{}.bindings", app_id), &app.bindings)?;
        }

        Ok(())
    }
}

/// 綁定名稱必須合法，且不可覆寫由埠號分配器管理的 XXXX/YYYY
pub fn validate_bindings(section: &str, bindings: &BTreeMap<String, String>) -> Result<()> {
    for name in bindings.keys() {
        let field = format!("{}.{}", section, name);
        if is_port_placeholder(name) {
            return Err(PairgenError::ConfigValidationError {
                field,
                message: "Port placeholders are assigned by the allocator; use backend_port/frontend_port instead".to_string(),
            });
        }
        validation::validate_variable_name(&field, name)?;
    }
    Ok(())
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_batch_config() {
        let toml_content = r#"
[batch]
input_dir = "./templates"
output_dir = "./out"
base_port = 6000
workers = 8
missing_route_policy = "warn"

[bindings]
APP_TITLE = "Demo"

[apps.app_3]
backend_port = 8000
frontend_port = 8001

[apps.app_3.bindings]
APP_TITLE = "Inventory"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.batch.input_dir.as_deref(), Some("./templates"));
        assert_eq!(config.batch.base_port, Some(6000));
        assert_eq!(config.batch.workers, Some(8));
        assert_eq!(config.batch.missing_route_policy, Some(MissingRoutePolicy::Warn));
        assert_eq!(config.bindings["APP_TITLE"], "Demo");

        let app = &config.apps["app_3"];
        assert_eq!(app.backend_port, Some(8000));
        assert_eq!(app.bindings["APP_TITLE"], "Inventory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_sections_are_optional() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.batch.input_dir.is_none());
        assert!(config.bindings.is_empty());
        assert!(config.apps.is_empty());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PAIRGEN_TEST_TITLE", "From Env");

        let toml_content = r#"
[bindings]
APP_TITLE = "${PAIRGEN_TEST_TITLE}"
DB_NAME = "${PAIRGEN_TEST_UNSET_VAR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.bindings["APP_TITLE"], "From Env");
        assert_eq!(config.bindings["DB_NAME"], "${PAIRGEN_TEST_UNSET_VAR}");

        std::env::remove_var("PAIRGEN_TEST_TITLE");
    }

    #[test]
    fn test_port_placeholder_cannot_be_bound() {
        let config = TomlConfig::from_toml_str("[bindings]\nYYYY = \"9000\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PairgenError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_invalid_binding_name() {
        let config = TomlConfig::from_toml_str("[apps.app_1.bindings]\napp_title = \"x\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_app_key() {
        let config = TomlConfig::from_toml_str("[apps.shop]\nbackend_port = 8000\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = TomlConfig::from_toml_str("[batch]\nworkers = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let err = TomlConfig::from_toml_str("[batch\ninput_dir = 1").unwrap_err();
        assert!(matches!(err, PairgenError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[batch]\ninput_dir = \"./templates\"\nbase_port = 7000\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.batch.base_port, Some(7000));
    }
}
