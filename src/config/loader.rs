//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用 `${VAR}` 环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量，变量不存在时报错
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        // 匹配 ${VAR_NAME} 格式的环境变量
        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {e}")))?;

        let mut result = content.to_string();
        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            let value = std::env::var(var_name).map_err(|_| ConfigError::EnvVarError {
                var: var_name.to_string(),
            })?;
            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;

        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {e}")))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");
        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 当前目录存在 `config.toml` 时优先使用，否则使用用户配置目录下的
/// `health-vitals/config.toml`。
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from("config.toml");
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join(crate::APP_NAME).join("config.toml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealthVitalsError;
    use serial_test::serial;
    use std::io::Write;

    const TEST_CONFIG_TOML: &str = r#"
[global]
timeout_seconds = 5
cache_duration_ms = 2000
log_level = "debug"

[web]
port = 9090
down_status_code = 500

[[checks]]
name = "api"
url = "https://example.com/health"
expected_status_codes = [200, 204]
max_contiguous_fails = 3

[[checks]]
name = "search"
url = "http://search.internal/ping"
method = "HEAD"
interval_seconds = 30
initial_delay_seconds = 5
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[[checks]]
name = "api"
url = "${HV_TEST_API_URL}"

[checks.headers]
"Authorization" = "Bearer ${HV_TEST_API_TOKEN}"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.timeout_seconds, 5);
        assert_eq!(config.global.cache_duration_ms, 2000);
        assert_eq!(config.global.max_concurrent_checks, 16);
        assert_eq!(config.web.port, 9090);
        assert_eq!(config.web.up_status_code, 200);
        assert_eq!(config.web.down_status_code, 500);

        assert_eq!(config.checks.len(), 2);
        assert_eq!(config.checks[0].method, "GET");
        assert_eq!(config.checks[0].expected_status_codes, vec![200, 204]);
        assert_eq!(config.checks[0].max_contiguous_fails, 3);
        assert_eq!(config.checks[1].interval_seconds, Some(30));
        assert_eq!(config.checks[1].expected_status_codes, vec![200]);
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        std::env::set_var("HV_TEST_API_URL", "https://api.example.com/health");
        std::env::set_var("HV_TEST_API_TOKEN", "token-123");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(config.checks[0].url, "https://api.example.com/health");
        assert_eq!(
            config.checks[0].headers.get("Authorization"),
            Some(&"Bearer token-123".to_string())
        );

        std::env::remove_var("HV_TEST_API_URL");
        std::env::remove_var("HV_TEST_API_TOKEN");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        let content = r#"
[[checks]]
name = "api"
url = "${HV_TEST_MISSING_VAR}"
"#;
        let loader = TomlConfigLoader::new(true);
        let err = loader.load_from_string(content).await.unwrap_err();

        assert!(matches!(
            err,
            HealthVitalsError::Config(ConfigError::EnvVarError { .. })
        ));
        assert!(err.to_string().contains("HV_TEST_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_invalid_toml_is_parse_error() {
        let loader = TomlConfigLoader::new(false);
        let err = loader.load_from_string("[[checks]\nname=").await.unwrap_err();
        assert!(matches!(
            err,
            HealthVitalsError::Config(ConfigError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_error() {
        let loader = TomlConfigLoader::new(false);
        let err = loader.load_from_string("[global]\n").await.unwrap_err();
        assert!(matches!(
            err,
            HealthVitalsError::Config(ConfigError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.checks.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = TomlConfigLoader::default();
        let err = loader
            .load_from_file(dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HealthVitalsError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        assert_eq!(loader.substitute_env_vars(content).unwrap(), content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().contains("config.toml"));
    }
}
