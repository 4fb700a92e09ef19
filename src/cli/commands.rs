//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{build_checker, Config, ConfigLoader, TomlConfigLoader};
use crate::error::{HealthVitalsError, Result};
use crate::health::{logging_middleware, CheckContext, CheckerResult, CheckerState};
use crate::logging::LoggingSystem;
use crate::web::{self, HealthHandler};
use async_trait::async_trait;
use std::path::Path;
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
pub async fn load_config(path: &Path) -> Result<Config> {
    TomlConfigLoader::new(true).load_from_file(path).await
}

/// 服务命令：启动健康端点直到收到关闭信号
pub struct ServeCommand;

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Serve { port } = &args.command else {
            return Ok(());
        };

        let mut config = load_config(&args.get_config_path()).await?;
        if let Some(port) = port {
            config.web.port = *port;
        }

        let logging =
            LoggingSystem::setup_logging(LoggingSystem::current_config().unwrap_or_default())?;
        let checker = build_checker(&config)?
            .with_middleware(logging_middleware())
            .with_status_listener(move |_ctx: &CheckContext, state: &CheckerState| {
                logging.system_status_log(state);
            })
            .build()?;

        let handler = HealthHandler::from_config(checker.clone(), &config.web)?;
        let router = web::health_router(handler, &config.web.path);
        let addr = web::socket_addr(&config.web)?;

        info!(
            "健康检查服务启动，检查数量: {}，端点: {}",
            checker.check_names().len(),
            config.web.path
        );
        let served = web::serve(addr, router, shutdown_signal()).await;

        // 无论服务如何退出都要停止周期检查
        checker.stop().await;
        info!("健康检查服务已停止");
        served
    }
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("监听 Ctrl-C 信号失败: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("监听 SIGTERM 信号失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("接收到关闭信号，正在关闭...");
}

/// 检测命令：执行一次健康查询
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Check { format } = &args.command else {
            return Ok(());
        };

        let mut config = load_config(&args.get_config_path()).await?;
        // 一次性查询中所有检查都按需执行
        for check in &mut config.checks {
            check.interval_seconds = None;
        }

        let checker = build_checker(&config)?
            .with_disabled_autostart()
            .with_disabled_cache()
            .build()?;
        let result = checker.check().await;

        println!("{}", render_result(&result, *format)?);

        if result.status.is_down() {
            return Err(HealthVitalsError::Other(anyhow::anyhow!(
                "系统状态异常"
            )));
        }
        Ok(())
    }
}

/// 按输出格式渲染查询结果
pub fn render_result(result: &CheckerResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let mut lines = vec![format!("系统状态: {}", result.status)];
            for (name, state) in result.details.iter().flatten() {
                let mut line = format!("  {} - {}", name, state.status);
                if let Some(error) = &state.error {
                    line.push_str(&format!(" ({error})"));
                }
                lines.push(line);
            }
            Ok(lines.join("\n"))
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(config_path).await?;
        // 探针构造和检查注册也要通过
        build_checker(&config)?.with_disabled_autostart().build()?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  超时时间: {}秒", config.global.timeout_seconds);
            println!("  缓存时长: {}毫秒", config.global.cache_duration_ms);
            println!("  最大并发: {}", config.global.max_concurrent_checks);
            println!("  日志级别: {}", config.global.log_level);
            println!(
                "健康端点: {}:{}{}",
                config.web.bind_address, config.web.port, config.web.path
            );

            println!("检查配置:");
            for (i, check) in config.checks.iter().enumerate() {
                println!("  {}. {} ({} {})", i + 1, check.name, check.method, check.url);
                println!("     期望状态码: {:?}", check.expected_status_codes);
                println!("     连续失败阈值: {}", check.max_contiguous_fails);
                match check.interval_seconds {
                    Some(interval) => println!("     调度: 每{interval}秒"),
                    None => println!("     调度: 按需"),
                }
                println!("     启用状态: {}", if check.enabled { "是" } else { "否" });
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个检查配置", config.checks.len());
        }

        Ok(())
    }
}
