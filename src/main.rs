//! Health Vitals 主程序入口
//!
//! 健康检查聚合服务

use anyhow::{Context, Result};
use clap::Parser;
use health_vitals::cli::args::{Args, Commands};
use health_vitals::cli::commands::{load_config, CheckCommand, Command, ServeCommand, ValidateCommand};
use health_vitals::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 命令行级别优先，其次使用配置文件中的日志设置
    let config = load_config(&args.get_config_path()).await.ok();
    let mut log_config = config
        .as_ref()
        .map(|c| LogConfig {
            json_format: c.global.log_json,
            ..LogConfig::with_level(&c.global.log_level)
        })
        .unwrap_or_default();
    if let Some(level) = args.log_level {
        log_config.level = level.into();
    }

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Health Vitals v{} 启动", health_vitals::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Serve { .. } => Box::new(ServeCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
