//! HTTP 健康端点模块
//!
//! 把 `Checker` 暴露为 HTTP 端点

pub mod handler;

pub use handler::{health_endpoint, health_router, HealthHandler, JsonResultWriter, ResultWriter};

use crate::config::WebConfig;
use crate::error::{ConfigError, Result};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tracing::info;

/// 解析健康端点的监听地址
pub fn socket_addr(config: &WebConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("无效的监听地址: {e}")).into())
}

/// 启动HTTP服务，直到 `shutdown` 完成
pub async fn serve<F>(addr: SocketAddr, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("健康端点已启动: http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("健康端点已关闭");
    Ok(())
}
