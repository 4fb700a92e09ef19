//! 从配置构建检查器

use crate::config::types::{CheckConfig, Config};
use crate::error::{ConfigError, Result};
use crate::health::{Check, CheckerBuilder, HttpProbe, Schedule};
use crate::logging::LoggingSystem;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

/// 根据配置创建检查器构建器
///
/// 已禁用的检查会被跳过。返回的构建器仍可以继续追加监听器、中间件等选项。
pub fn build_checker(config: &Config) -> Result<CheckerBuilder> {
    let global = &config.global;

    let mut builder = CheckerBuilder::new()
        .with_timeout(Duration::from_secs(global.timeout_seconds))
        .with_cache_duration(Duration::from_millis(global.cache_duration_ms))
        .with_max_error_message_length(global.max_error_message_length)
        .with_max_concurrent_checks(global.max_concurrent_checks);

    if !global.details {
        builder = builder.with_disabled_details();
    }

    for check_config in config.checks.iter().filter(|c| c.enabled) {
        builder = builder.with_check(build_check(check_config, config)?);
    }

    Ok(builder)
}

/// 把单个检查配置转换为 HTTP 检查
fn build_check(check_config: &CheckConfig, config: &Config) -> Result<Check> {
    let method = Method::from_bytes(check_config.method.as_bytes()).map_err(|_| {
        ConfigError::ValidationError(format!(
            "检查 {} 的HTTP方法 {} 无效",
            check_config.name, check_config.method
        ))
    })?;

    let mut probe = HttpProbe::new(&check_config.url)?
        .with_method(method)
        .with_expected_status_codes(check_config.expected_status_codes.clone());

    // 检查自身的请求头覆盖全局请求头
    for (key, value) in config.global.headers.iter().chain(&check_config.headers) {
        probe = probe.with_header(key, value);
    }
    if let Some(body) = &check_config.body {
        probe = probe.with_body(body.clone());
    }

    let mut check = Check::new(&check_config.name, Arc::new(probe))
        .with_max_contiguous_fails(check_config.max_contiguous_fails)
        .with_max_time_in_error(Duration::from_secs(check_config.max_time_in_error_seconds))
        .with_status_listener(|_ctx, name, state| {
            if let Some(logging) = LoggingSystem::current() {
                logging.component_status_log(name, state);
            }
        });

    if let Some(timeout) = check_config.timeout_seconds {
        check = check.with_timeout(Duration::from_secs(timeout));
    }
    if let Some(interval) = check_config.interval_seconds {
        check = check.with_schedule(Schedule::Periodic {
            initial_delay: Duration::from_secs(check_config.initial_delay_seconds),
            interval: Duration::from_secs(interval),
        });
    }

    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{GlobalConfig, WebConfig};
    use crate::health::AvailabilityStatus;
    use std::collections::HashMap;

    fn check_config(name: &str, url: &str) -> CheckConfig {
        CheckConfig {
            name: name.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            expected_status_codes: vec![200],
            timeout_seconds: Some(2),
            max_contiguous_fails: 1,
            max_time_in_error_seconds: 0,
            interval_seconds: None,
            initial_delay_seconds: 0,
            enabled: true,
            description: None,
            headers: HashMap::new(),
            body: None,
        }
    }

    #[test]
    fn test_build_check_periodic_schedule() {
        let mut cfg = check_config("search", "http://localhost:9200");
        cfg.interval_seconds = Some(30);
        cfg.initial_delay_seconds = 5;
        cfg.max_contiguous_fails = 3;

        let check = build_check(&cfg, &Config {
            global: GlobalConfig::default(),
            web: WebConfig::default(),
            checks: vec![],
        })
        .unwrap();

        assert_eq!(check.name(), "search");
        assert_eq!(check.policy().max_contiguous_fails, 3);
        assert_eq!(
            check.schedule(),
            Schedule::Periodic {
                initial_delay: Duration::from_secs(5),
                interval: Duration::from_secs(30),
            }
        );
    }

    #[tokio::test]
    async fn test_build_checker_runs_http_checks() {
        let mut server = mockito::Server::new_async().await;
        let healthy = server
            .mock("GET", "/healthy")
            .match_header("x-env", "test")
            .with_status(200)
            .create_async()
            .await;
        let broken = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let mut global = GlobalConfig::default();
        global.headers.insert("x-env".to_string(), "test".to_string());
        let mut disabled = check_config("disabled", &format!("{}/never", server.url()));
        disabled.enabled = false;

        let config = Config {
            global,
            web: WebConfig::default(),
            checks: vec![
                check_config("healthy", &format!("{}/healthy", server.url())),
                check_config("broken", &format!("{}/broken", server.url())),
                disabled,
            ],
        };

        let checker = build_checker(&config).unwrap().build().unwrap();
        assert_eq!(checker.check_names(), vec!["broken", "healthy"]);

        let result = checker.check().await;
        assert_eq!(result.status, AvailabilityStatus::Down);

        let details = result.details.unwrap();
        assert_eq!(details["healthy"].status, AvailabilityStatus::Up);
        assert_eq!(details["broken"].status, AvailabilityStatus::Down);
        assert!(details["broken"].error.as_deref().unwrap().contains("500"));

        healthy.assert_async().await;
        broken.assert_async().await;
    }
}
